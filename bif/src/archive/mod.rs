//! interface to an archive container
//!
//! The core only ever adds, removes and reads whole objects addressed by an
//! [`ArchivePath`]. How the segments of a path are joined is up to the backend.
use crate::error::Result;
use core::fmt;
use smallvec::SmallVec;
use std::{iter::FromIterator, sync::Arc};

mod dir_archive;
mod mem_archive;
#[cfg(feature = "metrics")]
mod prom;

pub use dir_archive::DirArchive;
pub use mem_archive::MemArchive;
#[cfg(feature = "metrics")]
pub use prom::Metered;
#[cfg(feature = "metrics")]
pub(crate) use prom::register;

/// A hierarchical path inside an archive, as an ordered sequence of segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchivePath(SmallVec<[String; 6]>);

impl ArchivePath {
    /// The empty path. This is the base path of an experiment.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        segments.into_iter().map(Into::into).collect()
    }

    /// Creates a new path with `segment` appended
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut res = self.clone();
        res.0.push(segment.into());
        res
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl FromIterator<String> for ArchivePath {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

pub trait Archive: Send + Sync {
    /// writes or overwrites the object at `path`
    fn add(&self, path: &ArchivePath, content: &[u8]) -> Result<()>;

    /// deletes the object at `path`.
    ///
    /// Deleting an object that is not there is not an error.
    fn remove(&self, path: &ArchivePath) -> Result<()>;

    /// reads the object at `path`, failing with `ObjectNotFound` if it is absent
    fn read(&self, path: &ArchivePath) -> Result<Vec<u8>>;
}

/// An archive, we use dyn to avoid having just another type parameter
pub type ArcArchive = Arc<dyn Archive + 'static>;

impl Archive for ArcArchive {
    fn add(&self, path: &ArchivePath, content: &[u8]) -> Result<()> {
        self.as_ref().add(path, content)
    }

    fn remove(&self, path: &ArchivePath) -> Result<()> {
        self.as_ref().remove(path)
    }

    fn read(&self, path: &ArchivePath) -> Result<Vec<u8>> {
        self.as_ref().read(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_display() {
        let root = ArchivePath::root();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
        let path = root.join("SUBJECT-1").join(".metadata");
        assert_eq!(path.len(), 2);
        assert_eq!(path.last(), Some(".metadata"));
        assert_eq!(path.to_string(), "/SUBJECT-1/.metadata");
        assert_eq!(path, ArchivePath::new(vec!["SUBJECT-1", ".metadata"]));
        // join does not modify the base
        assert!(root.is_root());
    }
}
