//! Integration tests for merge behavior: fast-forward detection,
//! true merges with MERGE_HEAD, and conflict staging.

use grove::graph;
use grove::merge::ConflictMarkerMerger;
use grove::repo::{MergeOutcome, Repository};
use grove::types::ObjectKind;
use grove::RepoError;
use std::fs;
use tempfile::TempDir;

fn init_repo() -> (TempDir, Repository) {
    let temp = TempDir::new().unwrap();
    let repo = Repository::init(temp.path()).unwrap();
    (temp, repo)
}

fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> grove::Oid {
    fs::write(repo.workdir().join(name), content).unwrap();
    let mut index = repo.load_index().unwrap();
    repo.add(&mut index, [name]).unwrap();
    repo.commit(&index, message).unwrap()
}

fn checkout(repo: &Repository, name: &str) {
    let mut index = repo.load_index().unwrap();
    repo.checkout(&mut index, name, true).unwrap();
}

#[test]
fn test_fast_forward_does_not_create_merge_head() {
    let (_tmp, repo) = init_repo();
    let base = commit_file(&repo, "a.txt", "base", "base");
    repo.create_branch("topic", base).unwrap();
    checkout(&repo, "topic");
    let tip = commit_file(&repo, "a.txt", "ahead", "ahead");

    checkout(&repo, "main");
    let mut index = repo.load_index().unwrap();
    let outcome = repo
        .merge(&mut index, &ConflictMarkerMerger, "topic", true)
        .unwrap();

    assert_eq!(outcome, MergeOutcome::FastForward(tip));
    assert_eq!(repo.head_commit().unwrap(), Some(tip));
    assert_eq!(repo.merge_head().unwrap(), None);
    assert_eq!(
        fs::read_to_string(repo.workdir().join("a.txt")).unwrap(),
        "ahead"
    );
}

#[test]
fn test_true_merge_records_both_parents_head_first() {
    let (_tmp, repo) = init_repo();
    let base = commit_file(&repo, "shared.txt", "shared", "base");
    repo.create_branch("topic", base).unwrap();

    let ours = commit_file(&repo, "main.txt", "main side", "main work");

    checkout(&repo, "topic");
    let theirs = commit_file(&repo, "topic.txt", "topic side", "topic work");

    checkout(&repo, "main");
    let mut index = repo.load_index().unwrap();
    let outcome = repo
        .merge(&mut index, &ConflictMarkerMerger, "topic", true)
        .unwrap();
    assert!(matches!(outcome, MergeOutcome::InProgress { base: b, .. } if b == base));
    assert_eq!(repo.merge_head().unwrap(), Some(theirs));

    let merge_commit = repo.commit(&index, "merge topic into main").unwrap();
    let parsed = graph::get_commit(repo.objects(), &merge_commit).unwrap();
    assert_eq!(parsed.parents, vec![ours, theirs]);
    assert_eq!(repo.merge_head().unwrap(), None);

    // both sides' files survive in the merged tree
    assert!(repo.workdir().join("main.txt").exists());
    assert!(repo.workdir().join("topic.txt").exists());
    assert!(repo.workdir().join("shared.txt").exists());
}

#[test]
fn test_conflicting_edits_stage_marked_blob() {
    let (_tmp, repo) = init_repo();
    let base = commit_file(&repo, "file.txt", "base\n", "base");
    repo.create_branch("topic", base).unwrap();

    commit_file(&repo, "file.txt", "ours\n", "our edit");

    checkout(&repo, "topic");
    commit_file(&repo, "file.txt", "theirs\n", "their edit");

    checkout(&repo, "main");
    let mut index = repo.load_index().unwrap();
    repo.merge(&mut index, &ConflictMarkerMerger, "topic", true)
        .unwrap();

    let staged = index.get("file.txt").unwrap();
    let content = repo
        .objects()
        .get_object(&staged, Some(ObjectKind::Blob))
        .unwrap();
    let text = String::from_utf8(content).unwrap();
    assert!(text.contains("<<<<<<< ours"));
    assert!(text.contains("ours"));
    assert!(text.contains("theirs"));
    assert!(text.contains(">>>>>>> theirs"));
}

#[test]
fn test_ancestor_closure_properties() {
    let (_tmp, repo) = init_repo();
    let c1 = commit_file(&repo, "a.txt", "1", "one");
    let c2 = commit_file(&repo, "a.txt", "2", "two");

    let store = repo.objects();
    assert!(graph::is_ancestor(store, &c1, &c1).unwrap());
    assert!(graph::is_ancestor(store, &c2, &c1).unwrap());
    assert!(!graph::is_ancestor(store, &c1, &c2).unwrap());
}

#[test]
fn test_merge_base_after_single_file_edit() {
    let (_tmp, repo) = init_repo();
    let first = commit_file(&repo, "a.txt", "hello", "first");
    let second = commit_file(&repo, "a.txt", "hello world", "second");

    assert_eq!(
        graph::merge_base(repo.objects(), &first, &second).unwrap(),
        Some(first)
    );
}

#[test]
fn test_merging_unrelated_history_is_rejected() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "a.txt", "here", "local root");

    // an orphan commit with no shared ancestry
    let blob = repo
        .objects()
        .hash_object(b"elsewhere", ObjectKind::Blob)
        .unwrap();
    let mut mapping = std::collections::BTreeMap::new();
    mapping.insert("other.txt".to_string(), blob);
    let tree = grove::tree::write_tree(repo.objects(), &mapping).unwrap();
    let orphan = graph::Commit {
        tree,
        parents: vec![],
        message: "orphan".to_string(),
    };
    let orphan = repo
        .objects()
        .hash_object(orphan.encode().as_bytes(), ObjectKind::Commit)
        .unwrap();

    let mut index = repo.load_index().unwrap();
    assert!(matches!(
        repo.merge(&mut index, &ConflictMarkerMerger, &orphan.to_hex(), false),
        Err(RepoError::ContractViolation(_))
    ));
}
