use super::{slot, Body, Experiment, NodeId};
use crate::{
    archive::Archive,
    derived::remove_stored,
    entity::HashKey,
    error::Result,
    event::{SessionEvent, EVENT_FILE_NAME},
    stored::StoredData,
};
use std::time::Instant;
use tracing::{debug, info, trace};

impl Experiment {
    /// Persists the whole tree.
    ///
    /// Children are written before their parents, so that every hash is computed from
    /// the already updated hashes of the children. Removed nodes are purged from the archive
    /// after the metadata of their former parent has been written.
    pub fn write(&mut self) -> Result<()> {
        let t0 = Instant::now();
        self.write_node(Self::ROOT)?;
        info!(
            "wrote experiment {} in {}ms",
            self.id()?,
            t0.elapsed().as_millis()
        );
        Ok(())
    }

    /// Persists a subtree, see [`Experiment::write`]
    pub fn write_node(&mut self, node: impl Into<NodeId>) -> Result<()> {
        let id = node.into();
        let children = self.node(id)?.children.clone();
        for child in children {
            self.write_node(child)?;
        }
        let path = self.path(id)?;
        let algorithm = self.config.hash;
        let archive = self.archive.clone();
        let hash = {
            let node = self.node(id)?;
            match &node.body {
                Body::Channel { data } => data.as_ref().and_then(|x| x.content_hash()).cloned(),
                _ => {
                    let hashes = node
                        .children
                        .iter()
                        .map(|child| slot(&self.nodes, *child).map(|x| x.entity.content_hash()))
                        .collect::<Result<Vec<_>>>()?;
                    Some(algorithm.combine(hashes))
                }
            }
        };
        let node = self.node_mut(id)?;
        node.entity.set_content_hash(hash);
        node.entity.write_metadata(
            archive.as_ref(),
            &path,
            HashKey::Data,
            node.entity.content_hash(),
            &node.calculated,
        )?;
        if let Body::Session { events } = &node.body {
            let mut stored = StoredData::<Vec<SessionEvent>>::new(path.join(EVENT_FILE_NAME));
            stored.set(archive.as_ref(), algorithm, events)?;
        }
        trace!("wrote {} to {}", id, path);
        let pending = self.node(id)?.pending.clone();
        for (i, child) in pending.iter().enumerate() {
            if let Err(cause) = self.purge(*child) {
                // keep what was not purged yet, so another write can retry
                self.node_mut(id)?.pending.drain(..i);
                return Err(cause);
            }
        }
        self.node_mut(id)?.pending.clear();
        Ok(())
    }

    /// Removes a node and everything below it from the archive and frees its slot
    fn purge(&mut self, id: NodeId) -> Result<()> {
        let node = match self.nodes.get(id.0).and_then(Option::as_ref) {
            Some(node) => node,
            // already purged by an earlier, failed write
            None => return Ok(()),
        };
        let below = node
            .children
            .iter()
            .chain(node.pending.iter())
            .copied()
            .collect::<Vec<_>>();
        for child in below {
            self.purge(child)?;
        }
        let path = self.path(id)?;
        let archive = self.archive.clone();
        let node = slot(&self.nodes, id)?;
        debug!("purging {} at {}", node.entity.id(), path);
        match &node.body {
            Body::Channel { data: Some(data) } => data.remove(archive.as_ref())?,
            Body::Session { .. } => archive.remove(&path.join(EVENT_FILE_NAME))?,
            _ => {}
        }
        for key in &node.calculated {
            remove_stored(archive.as_ref(), &path, key)?;
        }
        node.entity.remove_metadata(archive.as_ref(), &path)?;
        self.nodes[id.0] = None;
        Ok(())
    }

    /// Removes the derived data registered as `key` from the archive and from its owner
    pub(crate) fn remove_derived(&mut self, owner: NodeId, key: &str) -> Result<()> {
        let path = self.path(owner)?;
        remove_stored(self.archive.as_ref(), &path, key)?;
        self.node_mut(owner)?.calculated.retain(|x| x != key);
        Ok(())
    }
}
