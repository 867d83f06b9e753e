//! Commit graph
//!
//! Parses commit objects and walks ancestry. Traversals are iterator
//! structs backed by an explicit frontier and visited set rather than
//! recursion, so long histories cost bounded stack and only as much I/O
//! as the caller actually consumes.

use crate::error::{RepoError, Result};
use crate::store::ObjectStore;
use crate::tree;
use crate::types::{ObjectKind, Oid};
use std::collections::{HashSet, VecDeque};

/// A parsed commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Oid,
    /// Ordered parents; the first is the mainline parent.
    pub parents: Vec<Oid>,
    pub message: String,
}

impl Commit {
    pub fn first_parent(&self) -> Option<Oid> {
        self.parents.first().copied()
    }

    /// Serialize to the commit wire format: `tree` line, `parent` lines,
    /// a blank line, then the message verbatim.
    pub fn encode(&self) -> String {
        let mut text = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            text.push_str(&format!("parent {parent}\n"));
        }
        text.push('\n');
        text.push_str(&self.message);
        text
    }
}

/// Fetch and parse one commit.
pub fn get_commit(store: &ObjectStore, oid: &Oid) -> Result<Commit> {
    let malformed = |reason: String| RepoError::MalformedCommit { oid: *oid, reason };

    let bytes = store.get_object(oid, Some(ObjectKind::Commit))?;
    let text =
        String::from_utf8(bytes).map_err(|_| malformed("non-UTF-8 payload".to_string()))?;

    let (header, message) = match text.split_once("\n\n") {
        Some((header, message)) => (header, message),
        None => (text.as_str(), ""),
    };

    let mut tree = None;
    let mut parents = Vec::new();
    for line in header.lines() {
        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| malformed(format!("unparseable header line {line:?}")))?;
        let value_oid = Oid::from_hex(value)
            .ok_or_else(|| malformed(format!("invalid object id in header {line:?}")))?;
        match key {
            "tree" => tree = Some(value_oid),
            "parent" => parents.push(value_oid),
            other => return Err(malformed(format!("unknown field {other:?}"))),
        }
    }

    let tree = tree.ok_or_else(|| malformed("missing tree header".to_string()))?;
    Ok(Commit {
        tree,
        parents,
        message: message.to_string(),
    })
}

/// Lazy breadth-first walk over a commit's ancestor closure.
///
/// Each id is yielded at most once. When a commit is expanded its first
/// parent is prepended to the frontier and the remaining parents are
/// appended, so mainline history is visited before merged-in branches.
pub struct Ancestors<'a> {
    store: &'a ObjectStore,
    frontier: VecDeque<Oid>,
    visited: HashSet<Oid>,
    failed: bool,
}

impl<'a> Ancestors<'a> {
    pub fn new(store: &'a ObjectStore, start: impl IntoIterator<Item = Oid>) -> Self {
        Ancestors {
            store,
            frontier: start.into_iter().collect(),
            visited: HashSet::new(),
            failed: false,
        }
    }
}

impl Iterator for Ancestors<'_> {
    type Item = Result<Oid>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some(oid) = self.frontier.pop_front() {
            if !self.visited.insert(oid) {
                continue;
            }
            let commit = match get_commit(self.store, &oid) {
                Ok(commit) => commit,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };

            let mut parents = commit.parents.into_iter();
            if let Some(first) = parents.next() {
                self.frontier.push_front(first);
            }
            for parent in parents {
                self.frontier.push_back(parent);
            }
            return Some(Ok(oid));
        }
        None
    }
}

/// Lowest common ancestor of `a` and `b`.
///
/// Materializes `a`'s full ancestor set, then walks `b`'s ancestors in
/// traversal order and returns the first member of that set. `None` when
/// the histories are disjoint.
pub fn merge_base(store: &ObjectStore, a: &Oid, b: &Oid) -> Result<Option<Oid>> {
    let ancestors_of_a: HashSet<Oid> =
        Ancestors::new(store, [*a]).collect::<Result<HashSet<_>>>()?;

    for oid in Ancestors::new(store, [*b]) {
        let oid = oid?;
        if ancestors_of_a.contains(&oid) {
            return Ok(Some(oid));
        }
    }
    Ok(None)
}

/// True iff `maybe_ancestor` is in `commit`'s ancestor closure.
///
/// Reflexive: every commit is its own ancestor under this definition.
pub fn is_ancestor(store: &ObjectStore, commit: &Oid, maybe_ancestor: &Oid) -> Result<bool> {
    for oid in Ancestors::new(store, [*commit]) {
        if oid? == *maybe_ancestor {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Lazy enumeration of every object reachable from a set of commits:
/// each ancestor commit's id, followed by the closure of tree and blob
/// ids under its tree, globally deduplicated.
///
/// Every id is yielded before its payload is read, so a streaming
/// consumer can copy the object between stores just in time.
pub struct ReachableObjects<'a> {
    store: &'a ObjectStore,
    commits: Ancestors<'a>,
    visited: HashSet<Oid>,
    pending: Vec<(Oid, ObjectKind)>,
    expand: Option<Oid>,
    failed: bool,
}

impl<'a> ReachableObjects<'a> {
    pub fn new(store: &'a ObjectStore, start: impl IntoIterator<Item = Oid>) -> Self {
        ReachableObjects {
            store,
            commits: Ancestors::new(store, start),
            visited: HashSet::new(),
            pending: Vec::new(),
            expand: None,
            failed: false,
        }
    }

    fn fail(&mut self, e: RepoError) -> Option<Result<Oid>> {
        self.failed = true;
        Some(Err(e))
    }
}

impl Iterator for ReachableObjects<'_> {
    type Item = Result<Oid>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            // a tree yielded on the previous call is expanded now
            if let Some(tree_oid) = self.expand.take() {
                let entries = match tree::tree_entries(self.store, &tree_oid) {
                    Ok(entries) => entries,
                    Err(e) => return self.fail(e),
                };
                for entry in entries {
                    if !self.visited.contains(&entry.oid) {
                        self.pending.push((entry.oid, entry.kind));
                    }
                }
            }

            while let Some((oid, kind)) = self.pending.pop() {
                if !self.visited.insert(oid) {
                    continue;
                }
                if kind == ObjectKind::Tree {
                    self.expand = Some(oid);
                }
                return Some(Ok(oid));
            }

            match self.commits.next() {
                Some(Ok(commit_oid)) => {
                    let commit = match get_commit(self.store, &commit_oid) {
                        Ok(commit) => commit,
                        Err(e) => return self.fail(e),
                    };
                    if !self.visited.contains(&commit.tree) {
                        self.pending.push((commit.tree, ObjectKind::Tree));
                    }
                    return Some(Ok(commit_oid));
                }
                Some(Err(e)) => return self.fail(e),
                None => return None,
            }
        }
    }
}
