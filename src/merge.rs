//! Tree-merge collaborator
//!
//! The merge engine computes the base, ours, and theirs trees and then
//! delegates per-path precedence and content merging to this interface.
//! The engine itself never assumes a particular implementation.

use crate::error::Result;
use crate::store::ObjectStore;
use crate::types::{ObjectKind, Oid};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Three-way merge of flat tree mappings.
pub trait TreeMerger {
    /// Produce the merged `path -> blob id` mapping from a common base
    /// and the two sides being merged. Pure with respect to refs: the
    /// store is only used to read blob contents and persist merged ones.
    fn merge_trees(
        &self,
        store: &ObjectStore,
        base: &BTreeMap<String, Oid>,
        ours: &BTreeMap<String, Oid>,
        theirs: &BTreeMap<String, Oid>,
    ) -> Result<BTreeMap<String, Oid>>;
}

/// Default merger: per path, the side that changed relative to the base
/// wins; agreement (including agreement to delete) passes through; when
/// both sides changed a path differently, a conflict-marked blob is
/// written for the user to resolve before committing.
#[derive(Debug, Default)]
pub struct ConflictMarkerMerger;

impl TreeMerger for ConflictMarkerMerger {
    fn merge_trees(
        &self,
        store: &ObjectStore,
        base: &BTreeMap<String, Oid>,
        ours: &BTreeMap<String, Oid>,
        theirs: &BTreeMap<String, Oid>,
    ) -> Result<BTreeMap<String, Oid>> {
        let mut paths: BTreeSet<&String> = BTreeSet::new();
        paths.extend(base.keys());
        paths.extend(ours.keys());
        paths.extend(theirs.keys());

        let mut merged = BTreeMap::new();
        for path in paths {
            let b = base.get(path).copied();
            let o = ours.get(path).copied();
            let t = theirs.get(path).copied();

            let winner = if o == t {
                o
            } else if o == b {
                t
            } else if t == b {
                o
            } else {
                debug!(path = %path, "Conflicting change on both sides");
                Some(conflict_blob(store, o.as_ref(), t.as_ref())?)
            };

            if let Some(oid) = winner {
                merged.insert(path.clone(), oid);
            }
        }
        Ok(merged)
    }
}

fn conflict_blob(store: &ObjectStore, ours: Option<&Oid>, theirs: Option<&Oid>) -> Result<Oid> {
    let read = |oid: Option<&Oid>| -> Result<Vec<u8>> {
        match oid {
            Some(oid) => Ok(store.get_object(oid, Some(ObjectKind::Blob))?),
            None => Ok(Vec::new()),
        }
    };
    let ours_content = read(ours)?;
    let theirs_content = read(theirs)?;

    let mut content = Vec::new();
    content.extend_from_slice(b"<<<<<<< ours\n");
    content.extend_from_slice(&ours_content);
    if !ours_content.ends_with(b"\n") && !ours_content.is_empty() {
        content.push(b'\n');
    }
    content.extend_from_slice(b"=======\n");
    content.extend_from_slice(&theirs_content);
    if !theirs_content.ends_with(b"\n") && !theirs_content.is_empty() {
        content.push(b'\n');
    }
    content.extend_from_slice(b">>>>>>> theirs\n");

    Ok(store.hash_object(&content, ObjectKind::Blob)?)
}
