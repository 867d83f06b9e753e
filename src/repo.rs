//! Repository facade
//!
//! Ties the object store, ref store, tree codec, and commit graph
//! together behind one handle. Store handles are explicit everywhere:
//! two repositories (e.g. local and remote) can be open at once, which
//! push and fetch depend on.

use crate::config::Config;
use crate::error::{RepoError, Result};
use crate::graph::{self, Ancestors, Commit};
use crate::index::Index;
use crate::merge::TreeMerger;
use crate::refs::{
    RefStore, HEADS_PREFIX, HEAD, HEAD_ALIASES, MERGE_HEAD, TAGS_PREFIX,
};
use crate::store::ObjectStore;
use crate::tree;
use crate::types::{ObjectKind, Oid, RefValue};
use crate::worktree;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Name of the repository directory inside a working directory.
pub const GROVE_DIR: &str = ".grove";

/// How a merge request was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No divergence: HEAD moved straight to the other commit.
    FastForward(Oid),
    /// Divergent histories: the merged tree is staged and MERGE_HEAD is
    /// set; the next commit resolves the merge.
    InProgress { base: Oid, other: Oid },
}

/// Snapshot of the repository's current position.
#[derive(Debug, Clone)]
pub struct Status {
    pub head: Option<Oid>,
    /// Current branch name, `None` when HEAD is detached.
    pub branch: Option<String>,
    /// The incoming commit while a merge is pending.
    pub merging: Option<Oid>,
}

/// One opened repository: a working directory plus its `.grove` stores.
#[derive(Debug)]
pub struct Repository {
    workdir: PathBuf,
    repo_dir: PathBuf,
    objects: ObjectStore,
    refs: RefStore,
    config: Config,
}

impl Repository {
    /// Create a fresh repository at `workdir` and point HEAD at the
    /// default branch.
    #[instrument(fields(workdir = %workdir.display()))]
    pub fn init(workdir: &Path) -> Result<Self> {
        let repo_dir = workdir.join(GROVE_DIR);
        fs::create_dir(&repo_dir).map_err(crate::error::StoreError::Io)?;

        let objects = ObjectStore::new(&repo_dir);
        objects.ensure_layout()?;
        let refs = RefStore::new(&repo_dir);

        let config = Config::default();
        config.save(&repo_dir)?;

        refs.update_ref(
            HEAD,
            &RefValue::Symbolic(format!("{HEADS_PREFIX}{}", config.default_branch)),
            false,
        )?;
        info!(branch = %config.default_branch, "Initialized repository");

        Ok(Repository {
            workdir: workdir.to_path_buf(),
            repo_dir,
            objects,
            refs,
            config,
        })
    }

    /// Open an existing repository rooted at `workdir`.
    pub fn open(workdir: &Path) -> Result<Self> {
        let workdir = dunce::canonicalize(workdir)
            .map_err(|_| RepoError::NotARepository(workdir.to_path_buf()))?;
        let repo_dir = workdir.join(GROVE_DIR);
        if !repo_dir.is_dir() {
            return Err(RepoError::NotARepository(workdir));
        }
        let config = Config::load(&repo_dir)?;
        Ok(Repository {
            objects: ObjectStore::new(&repo_dir),
            refs: RefStore::new(&repo_dir),
            workdir,
            repo_dir,
            config,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.repo_dir)
    }

    pub fn load_index(&self) -> Result<Index> {
        Index::load(&self.repo_dir)
    }

    /// The commit HEAD currently resolves to, if any.
    pub fn head_commit(&self) -> Result<Option<Oid>> {
        Ok(self.refs.get_ref(HEAD, true)?.direct())
    }

    /// Stage files into the index, hashing blobs into the object store.
    pub fn add<P: AsRef<Path>>(
        &self,
        index: &mut Index,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<()> {
        worktree::add_paths(&self.objects, index, &self.workdir, GROVE_DIR, paths)?;
        index.save()
    }

    /// Record the staged index as a commit and advance HEAD.
    ///
    /// While a merge is pending, both HEAD and MERGE_HEAD become parents
    /// (HEAD first) and MERGE_HEAD is consumed.
    #[instrument(skip(self, index, message))]
    pub fn commit(&self, index: &Index, message: &str) -> Result<Oid> {
        let tree = tree::write_tree(&self.objects, index.entries())?;

        let mut parents = Vec::new();
        if let Some(head) = self.head_commit()? {
            parents.push(head);
        }
        if let Some(other) = self.refs.get_ref(MERGE_HEAD, true)?.direct() {
            parents.push(other);
            self.refs.delete_ref(MERGE_HEAD, false)?;
        }

        let commit = Commit {
            tree,
            parents,
            message: message.to_string(),
        };
        let oid = self
            .objects
            .hash_object(commit.encode().as_bytes(), ObjectKind::Commit)?;
        self.refs.update_ref(HEAD, &RefValue::Direct(oid), true)?;
        info!(oid = %oid.short(), "Created commit");
        Ok(oid)
    }

    /// Stage a commit's tree and repoint HEAD at it: symbolically when
    /// `name` names a branch, directly (detached) otherwise.
    #[instrument(skip(self, index))]
    pub fn checkout(&self, index: &mut Index, name: &str, update_working: bool) -> Result<Oid> {
        let oid = self.resolve_name(name)?;
        let commit = graph::get_commit(&self.objects, &oid)?;

        index.replace(tree::get_tree(&self.objects, &commit.tree, "")?);
        index.save()?;
        if update_working {
            worktree::materialize(&self.objects, &self.workdir, GROVE_DIR, index.entries())?;
        }

        let head = if self.is_branch(name) {
            RefValue::Symbolic(format!("{HEADS_PREFIX}{name}"))
        } else {
            debug!(oid = %oid.short(), "Detaching HEAD");
            RefValue::Direct(oid)
        };
        self.refs.update_ref(HEAD, &head, false)?;
        Ok(oid)
    }

    /// Move the current branch (through HEAD) to `oid`.
    pub fn reset(&self, oid: Oid) -> Result<()> {
        self.refs.update_ref(HEAD, &RefValue::Direct(oid), true)
    }

    /// Merge another commit into HEAD.
    ///
    /// Fast-forwards when the merge base is HEAD itself; otherwise sets
    /// MERGE_HEAD, stages the collaborator-merged tree, and leaves the
    /// caller to commit.
    #[instrument(skip(self, index, merger))]
    pub fn merge(
        &self,
        index: &mut Index,
        merger: &dyn TreeMerger,
        name: &str,
        update_working: bool,
    ) -> Result<MergeOutcome> {
        let head = self.head_commit()?.ok_or(RepoError::NoCommitsYet)?;
        let other = self.resolve_name(name)?;

        let base = graph::merge_base(&self.objects, &other, &head)?.ok_or_else(|| {
            RepoError::ContractViolation("merge of unrelated histories".to_string())
        })?;
        let c_other = graph::get_commit(&self.objects, &other)?;

        if base == head {
            index.replace(tree::get_tree(&self.objects, &c_other.tree, "")?);
            index.save()?;
            if update_working {
                worktree::materialize(&self.objects, &self.workdir, GROVE_DIR, index.entries())?;
            }
            self.refs.update_ref(HEAD, &RefValue::Direct(other), true)?;
            info!(oid = %other.short(), "Fast-forward merge");
            return Ok(MergeOutcome::FastForward(other));
        }

        self.refs
            .update_ref(MERGE_HEAD, &RefValue::Direct(other), false)?;

        let c_base = graph::get_commit(&self.objects, &base)?;
        let c_head = graph::get_commit(&self.objects, &head)?;
        let merged = merger.merge_trees(
            &self.objects,
            &tree::get_tree(&self.objects, &c_base.tree, "")?,
            &tree::get_tree(&self.objects, &c_head.tree, "")?,
            &tree::get_tree(&self.objects, &c_other.tree, "")?,
        )?;
        index.replace(merged);
        index.save()?;
        if update_working {
            worktree::materialize(&self.objects, &self.workdir, GROVE_DIR, index.entries())?;
        }
        info!(base = %base.short(), other = %other.short(), "Merged in index, commit to conclude");
        Ok(MergeOutcome::InProgress { base, other })
    }

    /// The incoming commit of a pending merge, if one is in progress.
    pub fn merge_head(&self) -> Result<Option<Oid>> {
        Ok(self.refs.get_ref(MERGE_HEAD, false)?.direct())
    }

    pub fn create_branch(&self, name: &str, oid: Oid) -> Result<()> {
        self.refs
            .update_ref(&format!("{HEADS_PREFIX}{name}"), &RefValue::Direct(oid), true)
    }

    pub fn create_tag(&self, name: &str, oid: Oid) -> Result<()> {
        self.refs
            .update_ref(&format!("{TAGS_PREFIX}{name}"), &RefValue::Direct(oid), true)
    }

    pub fn is_branch(&self, name: &str) -> bool {
        matches!(
            self.refs.get_ref(&format!("{HEADS_PREFIX}{name}"), true),
            Ok(value) if !value.is_absent()
        )
    }

    /// All branch names, in enumeration order.
    pub fn branch_names(&self) -> Result<Vec<String>> {
        Ok(self
            .refs
            .iter_refs(HEADS_PREFIX, true)?
            .into_iter()
            .map(|(name, _)| {
                name.strip_prefix(HEADS_PREFIX)
                    .expect("enumerated under the heads prefix")
                    .to_string()
            })
            .collect())
    }

    /// The branch HEAD points at, `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        match self.refs.get_ref(HEAD, false)? {
            RefValue::Symbolic(target) => Ok(target
                .strip_prefix(HEADS_PREFIX)
                .map(|branch| branch.to_string())),
            _ => Ok(None),
        }
    }

    pub fn status(&self) -> Result<Status> {
        Ok(Status {
            head: self.head_commit()?,
            branch: self.current_branch()?,
            merging: self.merge_head()?,
        })
    }

    /// Walk history starting at `start`, mainline first.
    pub fn log(&self, start: Oid) -> Ancestors<'_> {
        Ancestors::new(&self.objects, [start])
    }

    /// Resolve a user-supplied name to a commit id.
    ///
    /// Tries the HEAD aliases, then the name as a ref (bare, under
    /// `refs/`, as a tag, as a branch), then falls back to a literal
    /// 40-hex id. Anything else is `UnknownName`.
    pub fn resolve_name(&self, name: &str) -> Result<Oid> {
        let name = if HEAD_ALIASES.contains(&name) {
            HEAD
        } else {
            name
        };

        let candidates = [
            name.to_string(),
            format!("refs/{name}"),
            format!("{TAGS_PREFIX}{name}"),
            format!("{HEADS_PREFIX}{name}"),
        ];
        for candidate in &candidates {
            if let Some(oid) = self.try_ref(candidate)? {
                return Ok(oid);
            }
        }

        if let Some(oid) = Oid::from_hex(name) {
            return Ok(oid);
        }
        Err(RepoError::UnknownName(name.to_string()))
    }

    /// Dereference one candidate ref name; names the ref store rejects
    /// outright simply don't resolve.
    fn try_ref(&self, candidate: &str) -> Result<Option<Oid>> {
        match self.refs.get_ref(candidate, false) {
            Ok(value) if !value.is_absent() => Ok(self.refs.get_ref(candidate, true)?.direct()),
            Ok(_) => Ok(None),
            Err(RepoError::ContractViolation(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConflictMarkerMerger;
    use tempfile::TempDir;

    fn repo() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        (temp, repo)
    }

    fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> Oid {
        fs::write(repo.workdir().join(name), content).unwrap();
        let mut index = repo.load_index().unwrap();
        repo.add(&mut index, [name]).unwrap();
        repo.commit(&index, message).unwrap()
    }

    #[test]
    fn test_init_points_head_at_default_branch() {
        let (_tmp, repo) = repo();
        assert_eq!(repo.current_branch().unwrap(), Some("main".to_string()));
        assert_eq!(repo.head_commit().unwrap(), None);
    }

    #[test]
    fn test_commit_advances_branch_through_head() {
        let (_tmp, repo) = repo();
        let first = commit_file(&repo, "a.txt", "hello", "first");

        assert_eq!(repo.head_commit().unwrap(), Some(first));
        assert_eq!(
            repo.refs().get_ref("refs/heads/main", true).unwrap().direct(),
            Some(first)
        );

        let second = commit_file(&repo, "a.txt", "hello world", "second");
        let parsed = graph::get_commit(repo.objects(), &second).unwrap();
        assert_eq!(parsed.parents, vec![first]);
    }

    #[test]
    fn test_merge_base_of_linear_edit_is_first_commit() {
        let (_tmp, repo) = repo();
        let first = commit_file(&repo, "a.txt", "hello", "first");
        let second = commit_file(&repo, "a.txt", "hello world", "second");

        assert_eq!(
            graph::merge_base(repo.objects(), &first, &second).unwrap(),
            Some(first)
        );
    }

    #[test]
    fn test_checkout_branch_is_symbolic() {
        let (_tmp, repo) = repo();
        let first = commit_file(&repo, "a.txt", "one", "first");
        repo.create_branch("topic", first).unwrap();

        let mut index = repo.load_index().unwrap();
        repo.checkout(&mut index, "topic", true).unwrap();
        assert_eq!(repo.current_branch().unwrap(), Some("topic".to_string()));
    }

    #[test]
    fn test_checkout_commit_detaches_head() {
        let (_tmp, repo) = repo();
        let first = commit_file(&repo, "a.txt", "one", "first");
        commit_file(&repo, "a.txt", "two", "second");

        let mut index = repo.load_index().unwrap();
        repo.checkout(&mut index, &first.to_hex(), true).unwrap();
        assert_eq!(repo.current_branch().unwrap(), None);
        assert_eq!(repo.head_commit().unwrap(), Some(first));
        assert_eq!(
            fs::read_to_string(repo.workdir().join("a.txt")).unwrap(),
            "one"
        );
    }

    #[test]
    fn test_fast_forward_merge_moves_head_without_merge_head() {
        let (_tmp, repo) = repo();
        let first = commit_file(&repo, "a.txt", "one", "first");
        repo.create_branch("topic", first).unwrap();

        let mut index = repo.load_index().unwrap();
        repo.checkout(&mut index, "topic", true).unwrap();
        let tip = commit_file(&repo, "a.txt", "two", "ahead");

        repo.checkout(&mut index, "main", true).unwrap();
        let mut index = repo.load_index().unwrap();
        let outcome = repo
            .merge(&mut index, &ConflictMarkerMerger, "topic", true)
            .unwrap();

        assert_eq!(outcome, MergeOutcome::FastForward(tip));
        assert_eq!(repo.head_commit().unwrap(), Some(tip));
        assert_eq!(repo.merge_head().unwrap(), None);
    }

    #[test]
    fn test_true_merge_sets_merge_head_and_commit_consumes_it() {
        let (_tmp, repo) = repo();
        let root = commit_file(&repo, "base.txt", "base", "root");
        repo.create_branch("topic", root).unwrap();

        let ours = commit_file(&repo, "ours.txt", "ours", "on main");

        let mut index = repo.load_index().unwrap();
        repo.checkout(&mut index, "topic", true).unwrap();
        let theirs = commit_file(&repo, "theirs.txt", "theirs", "on topic");

        repo.checkout(&mut index, "main", true).unwrap();
        let mut index = repo.load_index().unwrap();
        let outcome = repo
            .merge(&mut index, &ConflictMarkerMerger, "topic", true)
            .unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::InProgress {
                base: root,
                other: theirs
            }
        );
        assert_eq!(repo.merge_head().unwrap(), Some(theirs));

        // both sides' files staged
        assert!(index.get("ours.txt").is_some());
        assert!(index.get("theirs.txt").is_some());

        let merge_commit = repo.commit(&index, "merge topic").unwrap();
        let parsed = graph::get_commit(repo.objects(), &merge_commit).unwrap();
        assert_eq!(parsed.parents, vec![ours, theirs]);
        assert_eq!(repo.merge_head().unwrap(), None);
    }

    #[test]
    fn test_merge_without_commits_is_no_commits_yet() {
        let (_tmp, repo) = repo();
        let mut index = repo.load_index().unwrap();
        assert!(matches!(
            repo.merge(&mut index, &ConflictMarkerMerger, "main", false),
            Err(RepoError::NoCommitsYet)
        ));
    }

    #[test]
    fn test_resolve_name_forms() {
        let (_tmp, repo) = repo();
        let first = commit_file(&repo, "a.txt", "one", "first");
        repo.create_tag("v1", first).unwrap();

        assert_eq!(repo.resolve_name("@").unwrap(), first);
        assert_eq!(repo.resolve_name("HEAD").unwrap(), first);
        assert_eq!(repo.resolve_name("main").unwrap(), first);
        assert_eq!(repo.resolve_name("v1").unwrap(), first);
        assert_eq!(repo.resolve_name("refs/tags/v1").unwrap(), first);
        assert_eq!(repo.resolve_name(&first.to_hex()).unwrap(), first);
        assert!(matches!(
            repo.resolve_name("no-such-thing"),
            Err(RepoError::UnknownName(_))
        ));
    }

    #[test]
    fn test_reset_moves_branch() {
        let (_tmp, repo) = repo();
        let first = commit_file(&repo, "a.txt", "one", "first");
        commit_file(&repo, "a.txt", "two", "second");

        repo.reset(first).unwrap();
        assert_eq!(repo.head_commit().unwrap(), Some(first));
        // still on the branch; reset moved the branch, not HEAD itself
        assert_eq!(repo.current_branch().unwrap(), Some("main".to_string()));
    }

    #[test]
    fn test_open_rejects_plain_directory() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            Repository::open(temp.path()),
            Err(RepoError::NotARepository(_))
        ));
    }

    #[test]
    fn test_branch_names_sorted_enumeration() {
        let (_tmp, repo) = repo();
        let first = commit_file(&repo, "a.txt", "one", "first");
        repo.create_branch("beta", first).unwrap();
        repo.create_branch("alpha", first).unwrap();

        let names = repo.branch_names().unwrap();
        assert_eq!(names, vec!["alpha", "beta", "main"]);
    }
}
