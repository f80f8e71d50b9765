use super::{Archive, ArchivePath};
use crate::error::{Error, Result};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// A MemArchive is a pure in memory archive. Mostly useful for testing.
///
/// Clones share the same objects.
#[derive(Clone)]
pub struct MemArchive(Arc<Inner>);

struct Inner {
    objects: Mutex<Objects>,
    max_size: usize,
}

#[derive(Debug, Default)]
struct Objects {
    map: FnvHashMap<ArchivePath, Box<[u8]>>,
    current_size: usize,
}

impl MemArchive {
    /// Creates an archive that will refuse writes once it holds more than `max_size` bytes
    pub fn new(max_size: usize) -> Self {
        Self(Arc::new(Inner {
            objects: Mutex::new(Objects::default()),
            max_size,
        }))
    }

    pub fn unbounded() -> Self {
        Self::new(usize::max_value())
    }

    pub fn into_inner(self) -> Result<FnvHashMap<ArchivePath, Box<[u8]>>> {
        let inner = Arc::try_unwrap(self.0)
            .map_err(|_| Error::StorageUnavailable("archive is still shared".into()))?;
        Ok(inner.objects.into_inner().map)
    }

    /// copy of the current content
    pub fn snapshot(&self) -> FnvHashMap<ArchivePath, Box<[u8]>> {
        self.0.objects.lock().map.clone()
    }

    /// number of objects
    pub fn len(&self) -> usize {
        self.0.objects.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// total number of content bytes
    pub fn size(&self) -> usize {
        self.0.objects.lock().current_size
    }

    pub fn contains(&self, path: &ArchivePath) -> bool {
        self.0.objects.lock().map.contains_key(path)
    }

    /// all paths, sorted
    pub fn paths(&self) -> Vec<ArchivePath> {
        let mut res = self
            .0
            .objects
            .lock()
            .map
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        res.sort();
        res
    }
}

impl Default for MemArchive {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Archive for MemArchive {
    fn add(&self, path: &ArchivePath, content: &[u8]) -> Result<()> {
        let mut objects = self.0.objects.lock();
        let replaced = objects.map.get(path).map(|x| x.len()).unwrap_or_default();
        let new_size = objects.current_size - replaced + content.len();
        if new_size > self.0.max_size {
            return Err(Error::StorageUnavailable("full".into()));
        }
        objects.map.insert(path.clone(), content.into());
        objects.current_size = new_size;
        Ok(())
    }

    fn remove(&self, path: &ArchivePath) -> Result<()> {
        let mut objects = self.0.objects.lock();
        if let Some(old) = objects.map.remove(path) {
            objects.current_size -= old.len();
        }
        Ok(())
    }

    fn read(&self, path: &ArchivePath) -> Result<Vec<u8>> {
        let objects = self.0.objects.lock();
        objects
            .map
            .get(path)
            .map(|x| x.to_vec())
            .ok_or_else(|| Error::ObjectNotFound(path.clone()))
    }
}
