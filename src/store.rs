//! Content-addressed object store
//!
//! Objects live under `objects/<40-hex-id>` inside the repository
//! directory, each file holding `kind || 0x00 || payload` verbatim. An
//! object's id is the SHA-1 of that envelope, so identity is purely a
//! function of content: writing the same bytes twice is a no-op, and a
//! read can verify integrity by recomputing the hash.

use crate::error::StoreError;
use crate::types::{ObjectKind, Oid};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const OBJECTS_DIR: &str = "objects";

/// Handle to one store's object directory.
///
/// Stores are addressed explicitly; two handles (e.g. local and remote)
/// can be open at once, which push and fetch rely on.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    objects_dir: PathBuf,
}

impl ObjectStore {
    /// Create a handle rooted at `repo_dir/objects`. Does not touch disk.
    pub fn new(repo_dir: &Path) -> Self {
        ObjectStore {
            objects_dir: repo_dir.join(OBJECTS_DIR),
        }
    }

    /// Create the object directory if it does not exist yet.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.objects_dir)?;
        Ok(())
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    fn object_path(&self, oid: &Oid) -> PathBuf {
        self.objects_dir.join(oid.to_hex())
    }

    /// Hash `data` under `kind`, persist the object, and return its id.
    ///
    /// Idempotent: an object already present is left untouched.
    pub fn hash_object(&self, data: &[u8], kind: ObjectKind) -> Result<Oid, StoreError> {
        let envelope = encode_envelope(kind, data);
        let oid = oid_of(&envelope);

        let path = self.object_path(&oid);
        if !path.exists() {
            write_atomic(&path, &envelope)?;
            trace!(oid = %oid, kind = %kind, bytes = data.len(), "Stored object");
        }
        Ok(oid)
    }

    /// Retrieve an object's payload.
    ///
    /// Verifies that the stored bytes still hash to `oid` and, when
    /// `expected` is given, that the stored kind matches it.
    pub fn get_object(&self, oid: &Oid, expected: Option<ObjectKind>) -> Result<Vec<u8>, StoreError> {
        let envelope = self.read_raw(oid)?;

        let actual = oid_of(&envelope);
        if actual != *oid {
            return Err(StoreError::HashMismatch {
                expected: *oid,
                actual,
            });
        }

        let (kind, payload) = decode_envelope(&envelope)?;
        if let Some(expected) = expected {
            if kind != expected {
                return Err(StoreError::TypeMismatch {
                    expected,
                    actual: kind,
                });
            }
        }
        Ok(payload.to_vec())
    }

    /// The stored kind of an object, without asserting one.
    pub fn object_kind(&self, oid: &Oid) -> Result<ObjectKind, StoreError> {
        let envelope = self.read_raw(oid)?;
        let (kind, _) = decode_envelope(&envelope)?;
        Ok(kind)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.object_path(oid).is_file()
    }

    /// Read an object's raw envelope bytes (kind, NUL, payload).
    pub fn read_raw(&self, oid: &Oid) -> Result<Vec<u8>, StoreError> {
        match fs::read(self.object_path(oid)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(*oid)),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy one object's raw bytes into `dest`, skipping if already present.
    ///
    /// The destination is whichever store the caller names. Returns true
    /// when bytes were actually transferred.
    pub fn copy_to(&self, oid: &Oid, dest: &ObjectStore) -> Result<bool, StoreError> {
        if dest.contains(oid) {
            return Ok(false);
        }
        let envelope = self.read_raw(oid)?;
        write_atomic(&dest.object_path(oid), &envelope)?;
        debug!(oid = %oid, "Copied object between stores");
        Ok(true)
    }

    /// Copy one object from `source` into this store if it is missing here.
    pub fn fetch_missing(&self, oid: &Oid, source: &ObjectStore) -> Result<bool, StoreError> {
        source.copy_to(oid, self)
    }
}

fn encode_envelope(kind: ObjectKind, data: &[u8]) -> Vec<u8> {
    let label = kind.label().as_bytes();
    let mut envelope = Vec::with_capacity(label.len() + 1 + data.len());
    envelope.extend_from_slice(label);
    envelope.push(0);
    envelope.extend_from_slice(data);
    envelope
}

fn decode_envelope(envelope: &[u8]) -> Result<(ObjectKind, &[u8]), StoreError> {
    let nul = envelope
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| StoreError::Malformed("missing NUL separator in envelope".to_string()))?;
    let label = std::str::from_utf8(&envelope[..nul])
        .map_err(|_| StoreError::Malformed("non-UTF-8 kind tag".to_string()))?;
    let kind = ObjectKind::parse(label)
        .ok_or_else(|| StoreError::Malformed(format!("unknown kind tag {label:?}")))?;
    Ok((kind, &envelope[nul + 1..]))
}

fn oid_of(envelope: &[u8]) -> Oid {
    let mut hasher = Sha1::new();
    hasher.update(envelope);
    Oid::from_bytes(hasher.finalize().into())
}

/// Write via temp file + rename so a crashed write never leaves a
/// half-written object under a valid id.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        e
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ObjectStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectStore::new(temp_dir.path());
        store.ensure_layout().unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_hash_and_get_round_trip() {
        let (_tmp, store) = store();
        let oid = store.hash_object(b"hello", ObjectKind::Blob).unwrap();
        let payload = store.get_object(&oid, Some(ObjectKind::Blob)).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn test_hash_is_deterministic() {
        let (_tmp, store) = store();
        let oid1 = store.hash_object(b"same bytes", ObjectKind::Blob).unwrap();
        let oid2 = store.hash_object(b"same bytes", ObjectKind::Blob).unwrap();
        assert_eq!(oid1, oid2);
    }

    #[test]
    fn test_kind_is_part_of_identity() {
        let (_tmp, store) = store();
        let blob = store.hash_object(b"payload", ObjectKind::Blob).unwrap();
        let tree = store.hash_object(b"payload", ObjectKind::Tree).unwrap();
        assert_ne!(blob, tree);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (_tmp, store) = store();
        let oid = Oid::from_hex(&"00".repeat(20)).unwrap();
        assert!(matches!(
            store.get_object(&oid, None),
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.contains(&oid));
    }

    #[test]
    fn test_get_with_wrong_kind_is_type_mismatch() {
        let (_tmp, store) = store();
        let oid = store.hash_object(b"hello", ObjectKind::Blob).unwrap();
        assert!(matches!(
            store.get_object(&oid, Some(ObjectKind::Commit)),
            Err(StoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupted_object_is_hash_mismatch() {
        let (_tmp, store) = store();
        let oid = store.hash_object(b"hello", ObjectKind::Blob).unwrap();
        fs::write(store.object_path(&oid), b"blob\0tampered").unwrap();
        assert!(matches!(
            store.get_object(&oid, None),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_copy_between_stores_is_idempotent() {
        let (_tmp_a, a) = store();
        let (_tmp_b, b) = store();
        let oid = a.hash_object(b"shared", ObjectKind::Blob).unwrap();

        assert!(a.copy_to(&oid, &b).unwrap());
        assert!(!a.copy_to(&oid, &b).unwrap());
        assert_eq!(b.get_object(&oid, Some(ObjectKind::Blob)).unwrap(), b"shared");
    }

    #[test]
    fn test_fetch_missing_pulls_from_source() {
        let (_tmp_a, a) = store();
        let (_tmp_b, b) = store();
        let oid = a.hash_object(b"remote bytes", ObjectKind::Blob).unwrap();

        assert!(b.fetch_missing(&oid, &a).unwrap());
        assert!(b.contains(&oid));
    }
}
