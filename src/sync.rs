//! Remote synchronization
//!
//! A remote is simply another repository reachable at a filesystem path;
//! both sides are ordinary store handles. Transfer planning is a
//! reachability diff: enumerate the object closure on each side and copy
//! the difference, one idempotent object at a time.

use crate::error::{RepoError, Result};
use crate::graph::{self, ReachableObjects};
use crate::refs::{HEADS_PREFIX, REMOTE_PREFIX};
use crate::repo::Repository;
use crate::types::{Oid, RefValue};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Result of a push: where the remote ref ended up and how many objects
/// actually moved.
#[derive(Debug, Clone)]
pub struct PushReport {
    pub refname: String,
    pub oid: Oid,
    pub objects_transferred: usize,
}

/// Result of a fetch: the tracking refs that were written.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub tracking: Vec<(String, Oid)>,
    pub objects_transferred: usize,
}

/// Mirror the remote's branches into `refs/remote/<branch>` locally,
/// copying any reachable objects the local store lacks first.
#[instrument(skip(local, remote), fields(remote = %remote.workdir().display()))]
pub fn fetch(local: &Repository, remote: &Repository) -> Result<FetchReport> {
    let remote_branches = remote.refs().iter_refs(HEADS_PREFIX, true)?;
    let heads: Vec<Oid> = remote_branches
        .iter()
        .filter_map(|(_, value)| value.direct())
        .collect();

    // Each id is yielded before its payload is read, so copying just
    // ahead of the traversal always finds the bytes it needs.
    let mut transferred = 0usize;
    for oid in ReachableObjects::new(remote.objects(), heads) {
        let oid = oid?;
        if local.objects().fetch_missing(&oid, remote.objects())? {
            transferred += 1;
        }
    }

    let mut tracking = Vec::new();
    for (name, value) in remote_branches {
        let Some(oid) = value.direct() else { continue };
        let branch = name
            .strip_prefix(HEADS_PREFIX)
            .expect("enumerated under the heads prefix");
        let tracking_name = format!("{REMOTE_PREFIX}{branch}");
        local
            .refs()
            .update_ref(&tracking_name, &RefValue::Direct(oid), true)?;
        debug!(tracking = %tracking_name, oid = %oid.short(), "Updated tracking ref");
        tracking.push((tracking_name, oid));
    }

    info!(
        refs = tracking.len(),
        objects = transferred,
        "Fetch complete"
    );
    Ok(FetchReport {
        tracking,
        objects_transferred: transferred,
    })
}

/// Push `refname` to the remote.
///
/// Rejected with `NonFastForward` unless the remote ref is absent or an
/// ancestor of (or equal to) the local value, so remote history is never
/// silently discarded. The transfer set is the local reachable closure
/// minus the remote's.
#[instrument(skip(local, remote), fields(remote = %remote.workdir().display()))]
pub fn push(local: &Repository, remote: &Repository, refname: &str) -> Result<PushReport> {
    let Some(local_oid) = local.refs().get_ref(refname, true)?.direct() else {
        return Err(RepoError::NothingToPush(refname.to_string()));
    };

    if let Some(remote_oid) = remote.refs().get_ref(refname, true)?.direct() {
        if !graph::is_ancestor(local.objects(), &local_oid, &remote_oid)? {
            return Err(RepoError::NonFastForward {
                refname: refname.to_string(),
            });
        }
    }

    // Remote side of the diff: everything reachable from remote refs
    // whose commit object actually exists in the remote store.
    let mut remote_heads = Vec::new();
    for (_, value) in remote.refs().iter_refs("", true)? {
        if let Some(oid) = value.direct() {
            if remote.objects().contains(&oid) {
                remote_heads.push(oid);
            }
        }
    }
    let remote_objects: HashSet<Oid> =
        ReachableObjects::new(remote.objects(), remote_heads).collect::<Result<HashSet<_>>>()?;
    let local_objects: HashSet<Oid> =
        ReachableObjects::new(local.objects(), [local_oid]).collect::<Result<HashSet<_>>>()?;

    let mut transferred = 0usize;
    for oid in local_objects.difference(&remote_objects) {
        if local.objects().copy_to(oid, remote.objects())? {
            transferred += 1;
        }
    }

    remote
        .refs()
        .update_ref(refname, &RefValue::Direct(local_oid), true)?;
    info!(
        oid = %local_oid.short(),
        objects = transferred,
        "Push complete"
    );
    Ok(PushReport {
        refname: refname.to_string(),
        oid: local_oid,
        objects_transferred: transferred,
    })
}
