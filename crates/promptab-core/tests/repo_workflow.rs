//! End-to-end repository workflow: stage, commit, resolve, log, diff.

use promptab_core::{diff_lines, DiffLine, PromptabError, Repository};

#[test]
fn full_versioning_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    // First version.
    repo.stage("prompts/summary.txt", "Summarize: {{text}}").unwrap();
    let c1 = repo.commit("initial summary prompt").unwrap();

    // Second version of the same path.
    repo.stage("prompts/summary.txt", "Summarize in one sentence: {{text}}")
        .unwrap();
    let c2 = repo.commit("tighten the instruction").unwrap();

    // Reopen from disk: state survives the process boundary.
    let repo = Repository::open(dir.path()).unwrap();
    assert_eq!(repo.head().unwrap(), Some(c2));

    // Resolve by HEAD, full digest, and prefix.
    assert_eq!(repo.resolve("HEAD").unwrap(), c2);
    assert_eq!(repo.resolve(&c1.short()).unwrap(), c1);

    // Both versions remain readable; blobs are never mutated.
    let commit1 = repo.get_commit(&c1).unwrap().unwrap();
    let commit2 = repo.get_commit(&c2).unwrap().unwrap();
    let v1 = repo.blob_at(&commit1, "prompts/summary.txt").unwrap();
    let v2 = repo.blob_at(&commit2, "prompts/summary.txt").unwrap();
    assert_eq!(v1, "Summarize: {{text}}");
    assert_eq!(v2, "Summarize in one sentence: {{text}}");

    // Log walks the chain newest first and terminates.
    let log = repo.log(10).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, c2);
    assert_eq!(log[1].0, c1);
    assert!(log[1].1.parent.is_none());

    // Diff between the two versions.
    let diff = diff_lines(&v1, &v2);
    assert_eq!(
        diff,
        vec![
            DiffLine::Removed("Summarize: {{text}}".to_string()),
            DiffLine::Added("Summarize in one sentence: {{text}}".to_string()),
        ]
    );
}

#[test]
fn failed_commit_leaves_repository_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    repo.stage("p.txt", "v1").unwrap();
    let c1 = repo.commit("one").unwrap();

    // Empty stage: commit must fail without moving HEAD.
    let err = repo.commit("two").unwrap_err();
    assert!(matches!(err, PromptabError::Validation(_)));
    assert_eq!(repo.head().unwrap(), Some(c1));

    // Empty message with content staged: index must survive.
    repo.stage("p.txt", "v2").unwrap();
    let err = repo.commit("").unwrap_err();
    assert!(matches!(err, PromptabError::Validation(_)));
    assert_eq!(repo.head().unwrap(), Some(c1));
    assert_eq!(repo.staged().unwrap().len(), 1);

    // The staged content commits cleanly afterwards.
    let c2 = repo.commit("two").unwrap();
    assert_eq!(repo.head().unwrap(), Some(c2));
    assert!(repo.staged().unwrap().is_empty());
}

#[test]
fn multi_path_commit_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    repo.stage("a.txt", "alpha").unwrap();
    repo.stage("b.txt", "beta").unwrap();
    let digest = repo.commit("two files").unwrap();

    let commit = repo.get_commit(&digest).unwrap().unwrap();
    assert_eq!(commit.tree.len(), 2);
    assert_eq!(repo.blob_at(&commit, "a.txt").unwrap(), "alpha");
    assert_eq!(repo.blob_at(&commit, "b.txt").unwrap(), "beta");

    let err = repo.blob_at(&commit, "c.txt").unwrap_err();
    assert!(matches!(err, PromptabError::NotFound(_)));
}
