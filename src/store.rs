use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder as TempBuilder, NamedTempFile};

use crate::error::{Error, Result};

/// Destination directory for artifacts.
///
/// Writes go to a temporary file in the same directory and are published
/// with an atomic no-clobber rename, so a file under its final name is
/// always complete and concurrent writers never interleave.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

/// Result of publishing a claimed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Written(u64),
    /// Another writer published the same name first.
    AlreadyPresent,
}

impl LocalStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Error::local_state(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.path(filename).is_file()
    }

    /// Start writing `filename`. Dropping the claim without publishing
    /// deletes the partial file.
    pub fn claim(&self, filename: &str) -> Result<Claim> {
        let tmp = TempBuilder::new()
            .prefix(&format!(".{filename}."))
            .suffix(".part")
            .tempfile_in(&self.root)
            .map_err(|e| Error::local_state(&self.root, e))?;
        Ok(Claim {
            tmp,
            target: self.path(filename),
            bytes: 0,
        })
    }
}

pub struct Claim {
    tmp: NamedTempFile,
    target: PathBuf,
    bytes: u64,
}

impl Claim {
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.tmp
            .as_file_mut()
            .write_all(buf)
            .map_err(|e| Error::local_state(self.tmp.path(), e))?;
        self.bytes += buf.len() as u64;
        Ok(())
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn publish(mut self) -> Result<Published> {
        self.tmp
            .as_file_mut()
            .flush()
            .map_err(|e| Error::local_state(self.tmp.path(), e))?;

        let bytes = self.bytes;
        match self.tmp.persist_noclobber(&self.target) {
            Ok(_) => Ok(Published::Written(bytes)),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(Published::AlreadyPresent),
            Err(e) => Err(Error::local_state(&self.target, e.error)),
        }
    }
}
