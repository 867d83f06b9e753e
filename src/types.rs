//! Core identifier and value types shared across the object and ref stores.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of an object id in raw bytes (SHA-1).
pub const OID_RAW_LEN: usize = 20;

/// Length of an object id in hex characters.
pub const OID_HEX_LEN: usize = 40;

/// Content-addressed object id: a SHA-1 digest, displayed as 40 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid([u8; OID_RAW_LEN]);

impl Oid {
    /// Wrap a raw 20-byte digest.
    pub fn from_bytes(bytes: [u8; OID_RAW_LEN]) -> Self {
        Oid(bytes)
    }

    /// Parse a 40-character hex string.
    ///
    /// Returns `None` for anything that is not exactly 40 hex digits.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != OID_HEX_LEN {
            return None;
        }
        let mut raw = [0u8; OID_RAW_LEN];
        hex::decode_to_slice(s, &mut raw).ok()?;
        Some(Oid(raw))
    }

    pub fn as_bytes(&self) -> &[u8; OID_RAW_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form for log output.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.to_hex())
    }
}

impl FromStr for Oid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Oid::from_hex(s).ok_or_else(|| format!("not a 40-character hex object id: {s:?}"))
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Oid::from_hex(&s).ok_or_else(|| de::Error::custom(format!("invalid object id: {s:?}")))
    }
}

/// The three object kinds the store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    /// The kind tag as written into the object envelope and tree entries.
    pub fn label(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }

    /// Parse a kind tag. Returns `None` for unknown tags.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            "commit" => Some(ObjectKind::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The stored value of a ref.
///
/// A ref file either holds a direct object id, points symbolically at
/// another ref, or does not exist at all. Modeling all three as one sum
/// type keeps impossible combinations (symbolic + empty, etc.)
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    /// Points straight at an object.
    Direct(Oid),
    /// Points at another ref by name.
    Symbolic(String),
    /// The ref does not exist.
    Absent,
}

impl RefValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, RefValue::Absent)
    }

    /// The object id, if this is a direct value.
    pub fn direct(&self) -> Option<Oid> {
        match self {
            RefValue::Direct(oid) => Some(*oid),
            _ => None,
        }
    }

    /// The target ref name, if this is a symbolic value.
    pub fn symbolic_target(&self) -> Option<&str> {
        match self {
            RefValue::Symbolic(name) => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_hex_round_trip() {
        let hex = "aabbccddeeff00112233445566778899aabbccdd";
        let oid = Oid::from_hex(hex).unwrap();
        assert_eq!(oid.to_hex(), hex);
        assert_eq!(oid.to_string(), hex);
    }

    #[test]
    fn test_oid_rejects_bad_input() {
        assert!(Oid::from_hex("abc").is_none());
        assert!(Oid::from_hex(&"g".repeat(40)).is_none());
        assert!(Oid::from_hex(&"a".repeat(41)).is_none());
    }

    #[test]
    fn test_oid_short_is_prefix() {
        let oid = Oid::from_hex(&"ab".repeat(20)).unwrap();
        assert!(oid.to_hex().starts_with(&oid.short()));
        assert_eq!(oid.short().len(), 10);
    }

    #[test]
    fn test_kind_labels_round_trip() {
        for kind in [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::Commit] {
            assert_eq!(ObjectKind::parse(kind.label()), Some(kind));
        }
        assert_eq!(ObjectKind::parse("branch"), None);
    }

    #[test]
    fn test_ref_value_accessors() {
        let oid = Oid::from_hex(&"01".repeat(20)).unwrap();
        assert_eq!(RefValue::Direct(oid).direct(), Some(oid));
        assert_eq!(RefValue::Symbolic("HEAD".into()).direct(), None);
        assert_eq!(
            RefValue::Symbolic("refs/heads/main".into()).symbolic_target(),
            Some("refs/heads/main")
        );
        assert!(RefValue::Absent.is_absent());
    }
}
