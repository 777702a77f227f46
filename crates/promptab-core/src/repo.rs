//! Prompt repository: staging index, HEAD pointer, and the commit chain.
//!
//! History is strictly linear: a single mutable `HEAD` pointer over
//! immutable, backward-linked commits. No branch namespace exists; that is
//! an explicit scope limit, not an omission.
//!
//! On-disk layout under the hidden repository directory:
//! - `index.json` — staging index, `{"staged": {path: {hash, path}}}`
//! - `HEAD` — plain-text commit digest, absent before the first commit
//! - `objects/<aa>/<rest>` — JSON-serialized blob and commit objects

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cas::fs::FsObjectStore;
use crate::cas::{Digest, ObjectStore};
use crate::error::{PromptabError, Result};
use crate::object::{Commit, Object};

/// Name of the hidden repository directory.
pub const REPO_DIR: &str = ".promptab";

/// One staged entry: a path awaiting commit and the blob it points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedEntry {
    pub hash: Digest,
    pub path: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StagingIndex {
    staged: BTreeMap<String, StagedEntry>,
}

/// A prompt repository rooted at a working directory.
#[derive(Debug)]
pub struct Repository {
    repo_dir: PathBuf,
    store: FsObjectStore,
}

impl Repository {
    /// Initialize a repository under `root`. Idempotent: re-running on an
    /// existing repository leaves it untouched.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let repo_dir = root.as_ref().join(REPO_DIR);
        fs::create_dir_all(&repo_dir)?;
        let store = FsObjectStore::open(&repo_dir)?;

        let index_path = repo_dir.join("index.json");
        if !index_path.exists() {
            write_atomic(&index_path, &serde_json::to_vec_pretty(&StagingIndex::default())?)?;
        }

        info!(path = %repo_dir.display(), "initialized prompt repository");
        Ok(Self { repo_dir, store })
    }

    /// Open an existing repository under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let repo_dir = root.as_ref().join(REPO_DIR);
        if !repo_dir.is_dir() {
            return Err(PromptabError::NotInitialized(
                root.as_ref().display().to_string(),
            ));
        }
        let store = FsObjectStore::open(&repo_dir)?;
        Ok(Self { repo_dir, store })
    }

    /// The backing object store.
    pub fn store(&self) -> &dyn ObjectStore {
        &self.store
    }

    fn index_path(&self) -> PathBuf {
        self.repo_dir.join("index.json")
    }

    fn head_path(&self) -> PathBuf {
        self.repo_dir.join("HEAD")
    }

    /// Directory where test runs are persisted.
    pub fn test_runs_dir(&self) -> PathBuf {
        self.repo_dir.join("test-runs")
    }

    fn load_index(&self) -> Result<StagingIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(StagingIndex::default());
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save_index(&self, index: &StagingIndex) -> Result<()> {
        write_atomic(&self.index_path(), &serde_json::to_vec_pretty(index)?)
    }

    /// Current HEAD digest, or `None` when no commits exist.
    pub fn head(&self) -> Result<Option<Digest>> {
        let path = self.head_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let digest = text
            .trim()
            .parse()
            .map_err(|_| PromptabError::Parse(format!("corrupt HEAD file: {text:?}")))?;
        Ok(Some(digest))
    }

    /// Stage `content` under `path`: writes the blob (idempotent, keyed by
    /// the digest of the content itself) and upserts the staging entry.
    pub fn stage(&self, path: &str, content: &str) -> Result<Digest> {
        if path.is_empty() {
            return Err(PromptabError::Validation("path must not be empty".to_string()));
        }

        let digest = Digest::compute(content.as_bytes());
        let blob = Object::Blob {
            content: content.to_string(),
        };
        let already = self.store.write(&digest, &blob.to_bytes()?)?;
        debug!(path, digest = %digest.short(), deduplicated = already, "staged blob");

        let mut index = self.load_index()?;
        index.staged.insert(
            path.to_string(),
            StagedEntry {
                hash: digest,
                path: path.to_string(),
            },
        );
        self.save_index(&index)?;

        Ok(digest)
    }

    /// Paths currently staged, with their blob digests.
    pub fn staged(&self) -> Result<Vec<StagedEntry>> {
        Ok(self.load_index()?.staged.into_values().collect())
    }

    /// Create a commit from the staging index and advance HEAD.
    ///
    /// One logical transaction: validation failures and object-write
    /// failures leave HEAD and the index untouched. HEAD advances only
    /// after the commit object is durably on disk, and the index is
    /// cleared only after HEAD has moved.
    pub fn commit(&self, message: &str) -> Result<Digest> {
        if message.trim().is_empty() {
            return Err(PromptabError::Validation(
                "commit message must not be empty".to_string(),
            ));
        }

        let index = self.load_index()?;
        if index.staged.is_empty() {
            return Err(PromptabError::Validation(
                "nothing staged to commit".to_string(),
            ));
        }

        let tree: BTreeMap<String, Digest> = index
            .staged
            .iter()
            .map(|(path, entry)| (path.clone(), entry.hash))
            .collect();

        let commit = Object::Commit(Commit {
            tree,
            parent: self.head()?,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        let (digest, bytes) = commit.digest()?;
        self.store.write(&digest, &bytes)?;

        write_atomic(self.head_path().as_path(), digest.to_hex().as_bytes())?;
        self.save_index(&StagingIndex::default())?;

        info!(commit = %digest.short(), "created commit");
        Ok(digest)
    }

    /// Resolve a reference to a commit digest.
    ///
    /// `HEAD` resolves to the current pointer. Any other token is treated
    /// as a digest or digest prefix and matched against the parent chain
    /// walked from HEAD; the first match wins.
    pub fn resolve(&self, reference: &str) -> Result<Digest> {
        let head = self
            .head()?
            .ok_or_else(|| PromptabError::NotFound("no commits yet".to_string()))?;

        if reference == "HEAD" {
            return Ok(head);
        }

        if reference.is_empty() || !reference.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PromptabError::NotFound(format!(
                "invalid reference: {reference}"
            )));
        }

        let mut cursor = Some(head);
        while let Some(digest) = cursor {
            if digest.to_hex().starts_with(&reference.to_ascii_lowercase()) {
                return Ok(digest);
            }
            cursor = self
                .get_commit(&digest)?
                .ok_or_else(|| PromptabError::NotFound(format!("object {digest} is not a commit")))?
                .parent;
        }

        Err(PromptabError::NotFound(format!(
            "unresolvable reference: {reference}"
        )))
    }

    /// Load a commit by digest. Returns `None` when the object is absent
    /// or is not a commit.
    pub fn get_commit(&self, digest: &Digest) -> Result<Option<Commit>> {
        match self.store.read(digest) {
            Ok(bytes) => Ok(Object::from_bytes(&bytes)?.as_commit().cloned()),
            Err(crate::cas::StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the blob content for `digest`.
    pub fn read_blob(&self, digest: &Digest) -> Result<String> {
        let bytes = self.store.read(digest)?;
        Object::from_bytes(&bytes)?
            .as_blob()
            .map(str::to_string)
            .ok_or_else(|| PromptabError::NotFound(format!("object {digest} is not a blob")))
    }

    /// Prompt text for `path` as of `commit`.
    pub fn blob_at(&self, commit: &Commit, path: &str) -> Result<String> {
        let digest = commit
            .tree
            .get(path)
            .ok_or_else(|| PromptabError::NotFound(format!("path not in commit: {path}")))?;
        self.read_blob(digest)
    }

    /// Walk the parent chain from HEAD, newest first, up to `limit` commits.
    pub fn log(&self, limit: usize) -> Result<Vec<(Digest, Commit)>> {
        let mut out = Vec::new();
        let mut cursor = self.head()?;
        while let Some(digest) = cursor {
            if out.len() >= limit {
                break;
            }
            let commit = self
                .get_commit(&digest)?
                .ok_or_else(|| PromptabError::NotFound(format!("missing commit object {digest}")))?;
            cursor = commit.parent;
            out.push((digest, commit));
        }
        Ok(out)
    }
}

/// Write `data` to `path` via a temp file in the same directory plus rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PromptabError::Io(std::io::Error::other("path has no parent")))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| PromptabError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn open_uninitialized_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::open(dir.path()).unwrap_err();
        assert!(matches!(err, PromptabError::NotInitialized(_)));
    }

    #[test]
    fn stage_then_commit_advances_head_and_clears_index() {
        let (_dir, repo) = make_repo();
        repo.stage("prompts/summary.txt", "Summarize: {{text}}").unwrap();
        assert_eq!(repo.staged().unwrap().len(), 1);

        let commit_digest = repo.commit("first version").unwrap();
        assert_eq!(repo.head().unwrap(), Some(commit_digest));
        assert!(repo.staged().unwrap().is_empty());

        let commit = repo.get_commit(&commit_digest).unwrap().unwrap();
        assert_eq!(commit.message, "first version");
        assert!(commit.parent.is_none());
        assert_eq!(
            repo.blob_at(&commit, "prompts/summary.txt").unwrap(),
            "Summarize: {{text}}"
        );
    }

    #[test]
    fn staging_same_content_twice_deduplicates() {
        let (_dir, repo) = make_repo();
        let d1 = repo.stage("a.txt", "same content").unwrap();
        let d2 = repo.stage("b.txt", "same content").unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn empty_message_rejected_without_mutation() {
        let (_dir, repo) = make_repo();
        repo.stage("a.txt", "content").unwrap();

        let err = repo.commit("   ").unwrap_err();
        assert!(matches!(err, PromptabError::Validation(_)));
        assert!(repo.head().unwrap().is_none(), "HEAD untouched");
        assert_eq!(repo.staged().unwrap().len(), 1, "index untouched");
    }

    #[test]
    fn empty_stage_rejected_without_mutation() {
        let (_dir, repo) = make_repo();
        let err = repo.commit("message").unwrap_err();
        assert!(matches!(err, PromptabError::Validation(_)));
        assert!(repo.head().unwrap().is_none());
    }

    #[test]
    fn parent_chain_is_linear_and_terminates() {
        let (_dir, repo) = make_repo();
        repo.stage("p.txt", "v1").unwrap();
        let c1 = repo.commit("one").unwrap();
        repo.stage("p.txt", "v2").unwrap();
        let c2 = repo.commit("two").unwrap();
        repo.stage("p.txt", "v3").unwrap();
        let c3 = repo.commit("three").unwrap();

        let log = repo.log(10).unwrap();
        let digests: Vec<Digest> = log.iter().map(|(d, _)| *d).collect();
        assert_eq!(digests, vec![c3, c2, c1]);
        assert!(log.last().unwrap().1.parent.is_none());
    }

    #[test]
    fn resolve_head_and_prefix() {
        let (_dir, repo) = make_repo();
        repo.stage("p.txt", "v1").unwrap();
        let c1 = repo.commit("one").unwrap();
        repo.stage("p.txt", "v2").unwrap();
        let c2 = repo.commit("two").unwrap();

        assert_eq!(repo.resolve("HEAD").unwrap(), c2);
        assert_eq!(repo.resolve(&c1.to_hex()).unwrap(), c1);
        assert_eq!(repo.resolve(&c1.short()).unwrap(), c1);
        assert_eq!(repo.resolve(&c2.short()).unwrap(), c2);
    }

    #[test]
    fn resolve_unknown_reference_is_not_found() {
        let (_dir, repo) = make_repo();
        repo.stage("p.txt", "v1").unwrap();
        repo.commit("one").unwrap();

        let err = repo.resolve("ffffffff").unwrap_err();
        assert!(matches!(err, PromptabError::NotFound(_)));

        let err = repo.resolve("not-hex!").unwrap_err();
        assert!(matches!(err, PromptabError::NotFound(_)));
    }

    #[test]
    fn get_commit_on_blob_digest_returns_none() {
        let (_dir, repo) = make_repo();
        let blob_digest = repo.stage("p.txt", "just a blob").unwrap();
        assert!(repo.get_commit(&blob_digest).unwrap().is_none());
    }

    #[test]
    fn get_commit_on_missing_digest_returns_none() {
        let (_dir, repo) = make_repo();
        let fake = Digest::compute(b"nothing here");
        assert!(repo.get_commit(&fake).unwrap().is_none());
    }

    #[test]
    fn index_accumulates_across_adds() {
        let (_dir, repo) = make_repo();
        repo.stage("a.txt", "one").unwrap();
        repo.stage("b.txt", "two").unwrap();
        let staged = repo.staged().unwrap();
        assert_eq!(staged.len(), 2);

        // Restaging a path upserts rather than duplicating.
        repo.stage("a.txt", "one revised").unwrap();
        assert_eq!(repo.staged().unwrap().len(), 2);
    }

    #[test]
    fn head_file_contains_plain_hex() {
        let (dir, repo) = make_repo();
        repo.stage("p.txt", "v1").unwrap();
        let c1 = repo.commit("one").unwrap();

        let head_text = std::fs::read_to_string(dir.path().join(REPO_DIR).join("HEAD")).unwrap();
        assert_eq!(head_text.trim(), c1.to_hex());
    }
}
