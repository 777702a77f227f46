//! Tagged object model stored in the content-addressed store.
//!
//! Blobs and commits share one JSON shape with a `type` discriminant.
//! Readers dispatch on the discriminant; a digest pointing at a blob is
//! never mistaken for a commit by structural guessing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cas::Digest;
use crate::error::Result;

/// A stored object: immutable prompt content or a commit snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Object {
    /// Immutable prompt text at a point in time.
    Blob { content: String },

    /// Snapshot of staged paths plus lineage metadata.
    Commit(Commit),
}

/// An immutable commit. `tree` maps staged paths to blob digests; `parent`
/// links commits into a backward chain terminating in `None`.
///
/// `tree` is a `BTreeMap` so serialization order is canonical and the
/// commit digest is a pure function of its content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Commit {
    pub tree: BTreeMap<String, Digest>,
    pub parent: Option<Digest>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Object {
    /// Canonical serialized bytes; the object's digest is computed over these.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Serialize and digest in one step.
    pub fn digest(&self) -> Result<(Digest, Vec<u8>)> {
        let bytes = self.to_bytes()?;
        Ok((Digest::compute(&bytes), bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The commit payload, or `None` when this object is a blob.
    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Object::Commit(commit) => Some(commit),
            Object::Blob { .. } => None,
        }
    }

    /// The blob content, or `None` when this object is a commit.
    pub fn as_blob(&self) -> Option<&str> {
        match self {
            Object::Blob { content } => Some(content),
            Object::Commit(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_serde_roundtrip_with_type_tag() {
        let blob = Object::Blob {
            content: "Summarize: {{text}}".to_string(),
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert!(json.contains("\"type\":\"blob\""));

        let back = Object::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(blob, back);
        assert_eq!(back.as_blob(), Some("Summarize: {{text}}"));
        assert!(back.as_commit().is_none());
    }

    #[test]
    fn commit_serde_roundtrip_with_type_tag() {
        let mut tree = BTreeMap::new();
        tree.insert(
            "prompts/summary.txt".to_string(),
            Digest::compute(b"content"),
        );
        let commit = Object::Commit(Commit {
            tree,
            parent: None,
            message: "initial".to_string(),
            timestamp: Utc::now(),
        });

        let json = serde_json::to_string(&commit).unwrap();
        assert!(json.contains("\"type\":\"commit\""));

        let back = Object::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(commit, back);
        assert!(back.as_blob().is_none());
        assert_eq!(back.as_commit().unwrap().message, "initial");
    }

    #[test]
    fn commit_digest_is_stable_across_serializations() {
        let mut tree = BTreeMap::new();
        tree.insert("b.txt".to_string(), Digest::compute(b"bb"));
        tree.insert("a.txt".to_string(), Digest::compute(b"aa"));
        let commit = Object::Commit(Commit {
            tree,
            parent: Some(Digest::compute(b"parent")),
            message: "msg".to_string(),
            timestamp: "2026-01-01T00:00:00Z".parse().unwrap(),
        });

        let (d1, _) = commit.digest().unwrap();
        let (d2, _) = commit.digest().unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn identical_blob_content_yields_identical_digest() {
        let a = Object::Blob {
            content: "same".to_string(),
        };
        let b = Object::Blob {
            content: "same".to_string(),
        };
        assert_eq!(a.digest().unwrap().0, b.digest().unwrap().0);
    }
}
