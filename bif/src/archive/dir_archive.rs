use super::{Archive, ArchivePath};
use crate::error::{Error, Result};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::trace;

/// An archive that maps every object to a file below a root directory,
/// one directory level per path segment.
///
/// If a zstd level is given, objects are compressed on add and decompressed on read.
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
    zstd_level: Option<i32>,
}

impl DirArchive {
    /// Opens (and creates if needed) an archive rooted at `root`
    pub fn new(root: impl Into<PathBuf>, zstd_level: Option<i32>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, zstd_level })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, path: &ArchivePath) -> Result<PathBuf> {
        if path.is_root() {
            return Err(Error::InvalidPath {
                path: path.clone(),
                segment: String::new(),
            });
        }
        let mut res = self.root.clone();
        for segment in path.segments() {
            let valid = !segment.is_empty()
                && segment != "."
                && segment != ".."
                && !segment.contains('/')
                && !segment.contains('\\');
            if !valid {
                return Err(Error::InvalidPath {
                    path: path.clone(),
                    segment: segment.clone(),
                });
            }
            res.push(segment);
        }
        Ok(res)
    }

    /// Removes the directories above `file` that became empty, stopping at the root
    fn prune(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(current) = dir {
            if current == self.root {
                break;
            }
            // fails for directories that still have content
            if fs::remove_dir(current).is_err() {
                break;
            }
            trace!("removed empty directory {}", current.display());
            dir = current.parent();
        }
    }
}

impl Archive for DirArchive {
    fn add(&self, path: &ArchivePath, content: &[u8]) -> Result<()> {
        let file = self.file_path(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        trace!("writing {} bytes to {}", content.len(), file.display());
        match self.zstd_level {
            Some(level) => fs::write(&file, zstd::encode_all(content, level)?)?,
            None => fs::write(&file, content)?,
        }
        Ok(())
    }

    fn remove(&self, path: &ArchivePath) -> Result<()> {
        let file = self.file_path(path)?;
        match fs::remove_file(&file) {
            Err(cause) if cause.kind() != ErrorKind::NotFound => return Err(cause.into()),
            _ => {}
        }
        self.prune(&file);
        Ok(())
    }

    fn read(&self, path: &ArchivePath) -> Result<Vec<u8>> {
        let file = self.file_path(path)?;
        let data = match fs::read(&file) {
            Ok(data) => data,
            Err(cause) if cause.kind() == ErrorKind::NotFound => {
                return Err(Error::ObjectNotFound(path.clone()))
            }
            Err(cause) => return Err(cause.into()),
        };
        if self.zstd_level.is_some() {
            Ok(zstd::decode_all(data.as_slice())?)
        } else {
            Ok(data)
        }
    }
}
