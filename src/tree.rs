//! Tree codec
//!
//! Converts a flat `path -> blob id` mapping into nested, deterministically
//! hashed tree objects and back. A tree object's payload is one line per
//! entry, `"<kind> <id> <name>\n"`, with entries sorted by the
//! `(name, id, kind)` triple so that semantically identical directories
//! always hash identically regardless of input iteration order.

use crate::error::{RepoError, Result};
use crate::store::ObjectStore;
use crate::types::{ObjectKind, Oid};
use std::collections::BTreeMap;
use tracing::instrument;

/// Path separator used in index paths and forbidden inside entry names.
pub const PATH_SEPARATOR: char = '/';

/// One parsed entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub oid: Oid,
    pub kind: ObjectKind,
}

/// Nested grouping of a flat mapping, keyed by path segment.
enum Node {
    Leaf(Oid),
    Dir(BTreeMap<String, Node>),
}

/// Serialize `mapping` as a hierarchy of tree objects, returning the
/// root tree's id.
///
/// Deterministic: the same mapping always produces the same id.
#[instrument(skip(store, mapping), fields(entries = mapping.len()))]
pub fn write_tree(store: &ObjectStore, mapping: &BTreeMap<String, Oid>) -> Result<Oid> {
    let mut root: BTreeMap<String, Node> = BTreeMap::new();

    for (path, oid) in mapping {
        let mut segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let filename = segments.pop().expect("split yields at least one segment");

        let mut current = &mut root;
        for dir in segments {
            let node = current
                .entry(dir.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            current = match node {
                Node::Dir(children) => children,
                Node::Leaf(_) => {
                    return Err(RepoError::ContractViolation(format!(
                        "path {path:?} nests under a path already staged as a file"
                    )))
                }
            };
        }
        current.insert(filename.to_string(), Node::Leaf(*oid));
    }

    write_tree_level(store, &root)
}

fn write_tree_level(store: &ObjectStore, children: &BTreeMap<String, Node>) -> Result<Oid> {
    let mut entries: Vec<TreeEntry> = Vec::with_capacity(children.len());
    for (name, node) in children {
        let (oid, kind) = match node {
            Node::Leaf(oid) => (*oid, ObjectKind::Blob),
            Node::Dir(grandchildren) => (write_tree_level(store, grandchildren)?, ObjectKind::Tree),
        };
        entries.push(TreeEntry {
            name: name.clone(),
            oid,
            kind,
        });
    }

    // sort key is the (name, id, kind) triple; hex order equals byte order
    entries.sort_by(|a, b| {
        (&a.name, a.oid, a.kind.label()).cmp(&(&b.name, b.oid, b.kind.label()))
    });

    let mut payload = String::new();
    for entry in &entries {
        payload.push_str(&format!(
            "{} {} {}\n",
            entry.kind.label(),
            entry.oid,
            entry.name
        ));
    }

    Ok(store.hash_object(payload.as_bytes(), ObjectKind::Tree)?)
}

/// Parse one tree object's entry list.
///
/// Fails with `MalformedTree` on unparseable lines, separator-bearing or
/// `.`/`..` names, and entry kinds other than blob or tree.
pub fn tree_entries(store: &ObjectStore, oid: &Oid) -> Result<Vec<TreeEntry>> {
    let malformed = |reason: String| RepoError::MalformedTree { oid: *oid, reason };

    let bytes = store.get_object(oid, Some(ObjectKind::Tree))?;
    let payload =
        String::from_utf8(bytes).map_err(|_| malformed("non-UTF-8 payload".to_string()))?;

    let mut entries = Vec::new();
    for line in payload.lines() {
        let mut parts = line.splitn(3, ' ');
        let (Some(kind_label), Some(id), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed(format!("unparseable entry {line:?}")));
        };

        let kind = match kind_label {
            "blob" => ObjectKind::Blob,
            "tree" => ObjectKind::Tree,
            other => return Err(malformed(format!("unknown entry kind {other:?}"))),
        };
        let entry_oid =
            Oid::from_hex(id).ok_or_else(|| malformed(format!("invalid object id {id:?}")))?;

        if name.contains(PATH_SEPARATOR) {
            return Err(malformed(format!("entry name {name:?} contains a separator")));
        }
        if name == "." || name == ".." {
            return Err(malformed(format!("entry name {name:?} is reserved")));
        }

        entries.push(TreeEntry {
            name: name.to_string(),
            oid: entry_oid,
            kind,
        });
    }
    Ok(entries)
}

/// Reconstruct the flat `path -> blob id` mapping rooted at `oid`.
///
/// Inverse of [`write_tree`]: full relative paths are rebuilt by joining
/// entry names with the separator.
pub fn get_tree(store: &ObjectStore, oid: &Oid, base_path: &str) -> Result<BTreeMap<String, Oid>> {
    let mut mapping = BTreeMap::new();
    collect_tree(store, oid, base_path, &mut mapping)?;
    Ok(mapping)
}

fn collect_tree(
    store: &ObjectStore,
    oid: &Oid,
    base_path: &str,
    out: &mut BTreeMap<String, Oid>,
) -> Result<()> {
    for entry in tree_entries(store, oid)? {
        let path = format!("{base_path}{}", entry.name);
        match entry.kind {
            ObjectKind::Blob => {
                out.insert(path, entry.oid);
            }
            ObjectKind::Tree => {
                collect_tree(store, &entry.oid, &format!("{path}{PATH_SEPARATOR}"), out)?;
            }
            ObjectKind::Commit => unreachable!("tree_entries rejects commit entries"),
        }
    }
    Ok(())
}
