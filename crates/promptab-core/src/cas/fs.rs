use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{Digest, ObjectStore, Result, StoreError};

/// Filesystem-backed object store with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`
///
/// The shard prefix bounds directory fan-out to 256 buckets. Writes go to a
/// temp file in the shard directory and are renamed into place, so a
/// half-written object is never visible under its digest.
#[derive(Debug)]
pub struct FsObjectStore {
    objects_dir: PathBuf,
}

impl FsObjectStore {
    /// Open (or create) a store rooted at `root`. Creates `root/objects/`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn object_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }
}

impl ObjectStore for FsObjectStore {
    fn write(&self, digest: &Digest, data: &[u8]) -> Result<bool> {
        let path = self.object_path(digest);

        if path.exists() {
            return Ok(true);
        }

        let shard_dir = path.parent().expect("object path always has parent");
        fs::create_dir_all(shard_dir)?;

        let mut tmp = NamedTempFile::new_in(shard_dir)?;
        tmp.write_all(data)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(false)
    }

    fn read(&self, digest: &Digest) -> Result<Vec<u8>> {
        let path = self.object_path(digest);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(*digest)
            } else {
                StoreError::Io(e)
            }
        })
    }

    fn exists(&self, digest: &Digest) -> Result<bool> {
        let path = self.object_path(digest);
        Ok(path.exists())
    }
}
