use super::{Body, Experiment, NodeId, SessionId};
use crate::{
    entity::{HashKey, Metadata},
    error::{Error, Result},
    event::{SessionEvent, EVENT_FILE_NAME},
    stored::StoredData,
};
use tracing::debug;

impl Experiment {
    /// Reads the stored metadata of a node.
    ///
    /// The node takes over the stored user metadata and content hash, derived data recorded
    /// in the stored object is added to the node's list of derived data.
    pub fn read_metadata(&mut self, node: impl Into<NodeId>) -> Result<Metadata> {
        let id = node.into();
        let path = self.path(id)?;
        let archive = self.archive.clone();
        let node = self.node_mut(id)?;
        let stored = node
            .entity
            .read_metadata(archive.as_ref(), &path, HashKey::Data)?;
        debug!("read metadata of {} from {}", node.entity.id(), path);
        *node.entity.metadata_mut() = stored.metadata.clone();
        node.entity.set_content_hash(stored.hash);
        for segment in stored.calculated {
            if !node.calculated.contains(&segment) {
                node.calculated.push(segment);
            }
        }
        Ok(stored.metadata)
    }

    /// Replaces the in memory events of a session with the stored ones
    pub fn read_events(&mut self, session: SessionId) -> Result<&[SessionEvent]> {
        let path = self.path(session)?.join(EVENT_FILE_NAME);
        let archive = self.archive.clone();
        match &mut self.node_mut(session.into())?.body {
            Body::Session { events } => {
                *events = StoredData::<Vec<SessionEvent>>::new(path).get(archive.as_ref())?;
                Ok(events.as_slice())
            }
            _ => Err(Error::UnknownNode(session.into())),
        }
    }
}
