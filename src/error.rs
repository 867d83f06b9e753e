//! Error types for the grove version-control engine.

use crate::types::{ObjectKind, Oid};
use std::path::PathBuf;
use thiserror::Error;

/// Object- and ref-persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(Oid),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: Oid, actual: Oid },

    #[error("malformed object: {0}")]
    Malformed(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Graph, merge, and sync errors
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not a grove repository: {0}")]
    NotARepository(PathBuf),

    #[error("malformed tree {oid}: {reason}")]
    MalformedTree { oid: Oid, reason: String },

    #[error("malformed commit {oid}: {reason}")]
    MalformedCommit { oid: Oid, reason: String },

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("push of {refname} rejected: remote history is not an ancestor of local history")]
    NonFastForward { refname: String },

    #[error("nothing to push: {0} is unset")]
    NothingToPush(String),

    #[error("no commits yet")]
    NoCommitsYet,

    #[error("unknown name: {0}")]
    UnknownName(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RepoError>;
