//! values calculated from other nodes, cached by the content hash of their owner
//!
//! [`DerivedData`] keeps its value as a single json object, [`SegmentedDerivedData`] stores a
//! sample sequence in segments like channel data. Both live in a directory
//! `<owner>/AdditionalData-<id>` that holds the payload under a caller chosen file name and a
//! metadata object recording the owner hash as `.targetHash`.
use crate::{
    archive::{Archive, ArchivePath},
    entity::{Entity, EntityKind, HashKey, Metadata, METADATA_FILE_NAME},
    error::{Error, Result},
    experiment::{Experiment, NodeId, DATA_FILE_NAME},
    hash::ContentHash,
    segmented::SegmentedData,
    stored::StoredData,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Removes everything stored for the derived data registered as `key` below `owner`.
///
/// The payload is removed both as a single object and as segments, reading the segments in
/// order until one is missing.
pub(crate) fn remove_stored(archive: &dyn Archive, owner: &ArchivePath, key: &str) -> Result<()> {
    let mut parts = key.split('/');
    let base = owner.join(parts.next().unwrap_or_default());
    let payload = base.join(parts.next().unwrap_or(DATA_FILE_NAME));
    archive.remove(&payload)?;
    let mut index = 0;
    loop {
        let segment = payload.join(format!("SEGMENT-{}", index));
        match archive.read(&segment) {
            Ok(_) => archive.remove(&segment)?,
            Err(Error::ObjectNotFound(_)) => break,
            Err(cause) => return Err(cause),
        }
        index += 1;
    }
    archive.remove(&base.join(METADATA_FILE_NAME))
}

/// The part shared by all kinds of derived data: identity, owner and owner hash
#[derive(Debug)]
struct Attachment {
    entity: Entity,
    owner: NodeId,
    base: ArchivePath,
    /// `<directory>/<file name>`, as recorded by the owner
    key: String,
    target_hash: Option<ContentHash>,
}

impl Attachment {
    fn new(
        experiment: &mut Experiment,
        owner: NodeId,
        file_name: &str,
        metadata: Metadata,
    ) -> Result<Self> {
        if file_name.is_empty() || file_name.contains('/') || file_name == METADATA_FILE_NAME {
            return Err(Error::InvalidPath {
                path: experiment.path(owner)?,
                segment: file_name.to_owned(),
            });
        }
        let entity = Entity::new(EntityKind::Derived, metadata);
        let segment = entity.path_segment().unwrap_or_default();
        let base = experiment.path(owner)?.join(segment.as_str());
        let key = format!("{}/{}", segment, file_name);
        experiment.register_calculated(owner, key.clone())?;
        Ok(Self {
            entity,
            owner,
            base,
            key,
            target_hash: None,
        })
    }

    fn payload_path(&self) -> ArchivePath {
        let file_name = self.key.rsplit('/').next().unwrap_or(DATA_FILE_NAME);
        self.base.join(file_name)
    }

    fn owner_changed(&self, experiment: &Experiment) -> Result<bool> {
        Ok(experiment.content_hash(self.owner)? != self.target_hash.as_ref())
    }

    fn stamp(&mut self, experiment: &Experiment) -> Result<()> {
        self.target_hash = experiment.content_hash(self.owner)?.cloned();
        Ok(())
    }

    fn write_metadata(&mut self, archive: &dyn Archive, hash: Option<ContentHash>) -> Result<()> {
        self.entity.set_content_hash(hash);
        self.entity.write_metadata(
            archive,
            &self.base,
            HashKey::Target,
            self.target_hash.as_ref(),
            &[],
        )
    }

    fn read_metadata(&mut self, archive: &dyn Archive) -> Result<()> {
        let stored = self
            .entity
            .read_metadata(archive, &self.base, HashKey::Target)?;
        *self.entity.metadata_mut() = stored.metadata;
        self.target_hash = stored.hash;
        Ok(())
    }

    fn remove(self, experiment: &mut Experiment) -> Result<()> {
        experiment.remove_derived(self.owner, &self.key)
    }
}

/// A value derived from an owner node, e.g. a summary of a channel.
///
/// The value is recalculated whenever the content hash of the owner differs from the hash
/// the value was calculated for. It is stored as one json object.
pub struct DerivedData<T> {
    attachment: Attachment,
    value: Option<T>,
    stored: StoredData<T>,
}

impl<T: Serialize + DeserializeOwned> DerivedData<T> {
    /// Creates empty derived data stored as `data` and registers it with its owner, so that
    /// the owner's metadata lists it and removing the owner removes it as well.
    pub fn new(experiment: &mut Experiment, owner: impl Into<NodeId>, metadata: Metadata) -> Result<Self> {
        Self::with_file_name(experiment, owner, DATA_FILE_NAME, metadata)
    }

    /// Like `new`, with the value stored as `file_name`
    pub fn with_file_name(
        experiment: &mut Experiment,
        owner: impl Into<NodeId>,
        file_name: &str,
        metadata: Metadata,
    ) -> Result<Self> {
        let attachment = Attachment::new(experiment, owner.into(), file_name, metadata)?;
        Ok(Self {
            stored: StoredData::new(attachment.payload_path()),
            attachment,
            value: None,
        })
    }

    pub fn entity(&self) -> &Entity {
        &self.attachment.entity
    }

    pub fn owner(&self) -> NodeId {
        self.attachment.owner
    }

    /// directory of the derived data
    pub fn path(&self) -> &ArchivePath {
        &self.attachment.base
    }

    /// owner hash the cached value was calculated for
    pub fn target_hash(&self) -> Option<&ContentHash> {
        self.attachment.target_hash.as_ref()
    }

    /// cached value, without checking the owner
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// true if there is no cached value or the owner changed since it was calculated
    pub fn is_stale(&self, experiment: &Experiment) -> Result<bool> {
        Ok(self.value.is_none() || self.attachment.owner_changed(experiment)?)
    }

    /// Returns the cached value, calculating it first if it is stale
    pub fn get_data<F>(&mut self, experiment: &Experiment, calculate: F) -> Result<&T>
    where
        F: FnOnce(&Experiment, NodeId) -> anyhow::Result<T>,
    {
        if self.is_stale(experiment)? {
            let owner = self.attachment.owner;
            debug!("calculating {} for {}", self.attachment.entity.id(), owner);
            let value = calculate(experiment, owner).map_err(Error::Calculation)?;
            self.set_data(experiment, value)?;
        }
        match &self.value {
            Some(value) => Ok(value),
            None => Err(Error::OperationNotPermitted("derived data has no value")),
        }
    }

    /// Replaces the cached value, stamping it with the current hash of the owner
    pub fn set_data(&mut self, experiment: &Experiment, value: T) -> Result<()> {
        self.attachment.stamp(experiment)?;
        self.value = Some(value);
        Ok(())
    }

    /// Writes the value, if any, and the metadata
    pub fn write(&mut self, experiment: &Experiment) -> Result<()> {
        let archive = &**experiment.archive();
        if let Some(value) = &self.value {
            self.stored.set(archive, experiment.config().hash, value)?;
        }
        self.attachment
            .write_metadata(archive, self.stored.content_hash().cloned())
    }

    /// Reads back the metadata and value written by `write`
    pub fn read(&mut self, experiment: &Experiment) -> Result<&T> {
        let archive = &**experiment.archive();
        self.attachment.read_metadata(archive)?;
        Ok(self.value.insert(self.stored.get(archive)?))
    }

    /// Removes the stored objects and unregisters from the owner
    pub fn remove(self, experiment: &mut Experiment) -> Result<()> {
        self.attachment.remove(experiment)
    }
}

/// A sample sequence derived from an owner node, e.g. a filtered channel.
///
/// Samples are written in segments as soon as they are set, like channel data. The content
/// hash is the hash of the segments.
pub struct SegmentedDerivedData {
    attachment: Attachment,
    data: SegmentedData,
}

impl SegmentedDerivedData {
    /// Creates empty derived samples stored as `file_name` in segments of `segment_size`
    /// samples, and registers them with their owner
    pub fn new(
        experiment: &mut Experiment,
        owner: impl Into<NodeId>,
        file_name: &str,
        segment_size: usize,
        metadata: Metadata,
    ) -> Result<Self> {
        let attachment = Attachment::new(experiment, owner.into(), file_name, metadata)?;
        let data = match SegmentedData::new(attachment.payload_path(), segment_size) {
            Ok(data) => data,
            Err(cause) => {
                attachment.remove(experiment)?;
                return Err(cause);
            }
        };
        Ok(Self { attachment, data })
    }

    pub fn entity(&self) -> &Entity {
        &self.attachment.entity
    }

    pub fn owner(&self) -> NodeId {
        self.attachment.owner
    }

    /// directory of the derived data
    pub fn path(&self) -> &ArchivePath {
        &self.attachment.base
    }

    /// owner hash the samples were calculated for
    pub fn target_hash(&self) -> Option<&ContentHash> {
        self.attachment.target_hash.as_ref()
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.data.content_hash()
    }

    /// number of samples
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// true if no samples were set or the owner changed since they were calculated
    pub fn is_stale(&self, experiment: &Experiment) -> Result<bool> {
        Ok(self.data.content_hash().is_none() || self.attachment.owner_changed(experiment)?)
    }

    /// Reads the samples `start..=end`, calculating all samples first if they are stale
    pub fn get_data<F>(
        &mut self,
        experiment: &Experiment,
        start: usize,
        end: Option<usize>,
        calculate: F,
    ) -> Result<Vec<f64>>
    where
        F: FnOnce(&Experiment, NodeId) -> anyhow::Result<Vec<f64>>,
    {
        if self.is_stale(experiment)? {
            let owner = self.attachment.owner;
            debug!("calculating {} for {}", self.attachment.entity.id(), owner);
            let samples = calculate(experiment, owner).map_err(Error::Calculation)?;
            self.set_data(experiment, &samples)?;
        }
        let mode = experiment.config().range_reads;
        self.data.get(&**experiment.archive(), start, end, mode)
    }

    /// Replaces the samples, writing the segments right away, and stamps them with the
    /// current hash of the owner
    pub fn set_data(&mut self, experiment: &Experiment, samples: &[f64]) -> Result<()> {
        let archive = &**experiment.archive();
        self.data.set(archive, experiment.config().hash, samples)?;
        self.attachment.stamp(experiment)
    }

    /// Writes the metadata, the samples are already stored by `set_data`
    pub fn write(&mut self, experiment: &Experiment) -> Result<()> {
        let hash = self.data.content_hash().cloned();
        self.attachment.write_metadata(&**experiment.archive(), hash)
    }

    /// Reads back the metadata and the stored segments, returning the number of samples
    pub fn read(&mut self, experiment: &Experiment) -> Result<usize> {
        let archive = &**experiment.archive();
        self.attachment.read_metadata(archive)?;
        self.data.load(archive, experiment.config().hash)
    }

    /// Removes the stored objects and unregisters from the owner
    pub fn remove(self, experiment: &mut Experiment) -> Result<()> {
        self.attachment.remove(experiment)
    }
}
