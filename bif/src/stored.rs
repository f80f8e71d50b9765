//! single blob json values
use crate::{
    archive::{Archive, ArchivePath},
    error::Result,
    hash::{ContentHash, HashAlgorithm},
};
use core::fmt;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use tracing::debug;

/// A json serializable value that is stored as one object at a fixed path.
///
/// Unlike segmented data, the whole value is rewritten on every `set`.
pub struct StoredData<T> {
    path: ArchivePath,
    content_hash: Option<ContentHash>,
    _t: PhantomData<fn() -> T>,
}

impl<T> StoredData<T> {
    pub fn new(path: ArchivePath) -> Self {
        Self {
            path,
            content_hash: None,
            _t: PhantomData,
        }
    }

    pub fn path(&self) -> &ArchivePath {
        &self.path
    }

    /// digest of the serialized value of the last `set`
    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    pub fn remove(&self, archive: &dyn Archive) -> Result<()> {
        archive.remove(&self.path)
    }
}

impl<T: Serialize + DeserializeOwned> StoredData<T> {
    /// serializes `value` as compact json and writes it
    pub fn set(&mut self, archive: &dyn Archive, hash: HashAlgorithm, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.store(archive, hash, data)
    }

    /// like `set`, but indented for human consumption
    pub fn set_pretty(
        &mut self,
        archive: &dyn Archive,
        hash: HashAlgorithm,
        value: &T,
    ) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store(archive, hash, data)
    }

    pub fn get(&self, archive: &dyn Archive) -> Result<T> {
        let data = archive.read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn store(&mut self, archive: &dyn Archive, hash: HashAlgorithm, data: Vec<u8>) -> Result<()> {
        debug!("storing {} bytes at {}", data.len(), self.path);
        archive.add(&self.path, &data)?;
        self.content_hash = Some(hash.digest(&data));
        Ok(())
    }
}

impl<T> fmt::Debug for StoredData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredData")
            .field("path", &self.path)
            .field("content_hash", &self.content_hash)
            .finish()
    }
}
