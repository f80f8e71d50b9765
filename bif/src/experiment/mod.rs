//! creation and navigation of experiment trees
//!
//! An [`Experiment`] owns all nodes of its tree in an arena. Nodes are addressed by a
//! [`NodeId`], or by one of the typed handles [`SubjectId`], [`SessionId`] and [`ChannelId`].
//! A child refers back to its parent by handle only, which is used to derive its path.
use crate::{
    archive::{ArcArchive, Archive, ArchivePath},
    config::Config,
    entity::{Entity, EntityId, EntityKind, Metadata},
    error::{Error, Result},
    event::SessionEvent,
    hash::ContentHash,
    segmented::SegmentedData,
};
use derive_more::Display;
use std::sync::Arc;
mod read;
mod write;

/// File name below which a channel stores its segments
pub const DATA_FILE_NAME: &str = "data";

/// Handle to a node of an experiment tree
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "#{}", _0)]
pub struct NodeId(usize);

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NodeId);

        impl From<$name> for NodeId {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

typed_id!(
    /// Handle to a subject
    SubjectId
);
typed_id!(
    /// Handle to a session of a subject
    SessionId
);
typed_id!(
    /// Handle to a channel of a session
    ChannelId
);

#[derive(Debug)]
pub(crate) enum Body {
    Experiment,
    Subject,
    Session { events: Vec<SessionEvent> },
    Channel { data: Option<SegmentedData> },
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) entity: Entity,
    pub(crate) parent: Option<NodeId>,
    /// live children, in insertion order
    pub(crate) children: Vec<NodeId>,
    /// children that were removed but not yet purged from the archive
    pub(crate) pending: Vec<NodeId>,
    /// derived data attached to this node, as `<directory>/<file name>`
    pub(crate) calculated: Vec<String>,
    pub(crate) body: Body,
}

impl Node {
    fn new(entity: Entity, parent: Option<NodeId>, body: Body) -> Self {
        Self {
            entity,
            parent,
            children: Vec::new(),
            pending: Vec::new(),
            calculated: Vec::new(),
            body,
        }
    }
}

/// A whole biomedical experiment, the root of a BIF tree.
///
/// Mutations only change the in memory tree, except for channel data which is written
/// to the archive right away. [`Experiment::write`] persists the tree.
pub struct Experiment {
    archive: ArcArchive,
    config: Config,
    nodes: Vec<Option<Node>>,
}

impl Experiment {
    const ROOT: NodeId = NodeId(0);

    pub fn new(archive: impl Archive + 'static, config: Config, metadata: Metadata) -> Self {
        #[cfg(feature = "metrics")]
        let archive = crate::archive::Metered::new(archive);
        let entity = Entity::new(EntityKind::Experiment, metadata);
        Self {
            archive: Arc::new(archive),
            config,
            nodes: vec![Some(Node::new(entity, None, Body::Experiment))],
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn archive(&self) -> &ArcArchive {
        &self.archive
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    /// id of the experiment entity
    pub fn id(&self) -> Result<EntityId> {
        Ok(self.root_node()?.entity.id())
    }

    fn root_node(&self) -> Result<&Node> {
        self.node(Self::ROOT)
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node> {
        slot(&self.nodes, id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        slot_mut(&mut self.nodes, id)
    }

    fn insert(&mut self, parent: NodeId, entity: Entity, body: Body) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        self.node_mut(parent)?.children.push(id);
        self.nodes.push(Some(Node::new(entity, Some(parent), body)));
        Ok(id)
    }

    /// moves `child` from the live to the pending children of `parent`
    fn detach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_id = self.node(parent)?.entity.id();
        let child_id = self.node(child)?.entity.id();
        let node = self.node_mut(parent)?;
        let index = node
            .children
            .iter()
            .position(|x| *x == child)
            .ok_or(Error::NotAChild {
                parent: parent_id,
                child: child_id,
            })?;
        node.children.remove(index);
        node.pending.push(child);
        Ok(())
    }

    fn expect_kind(&self, id: NodeId, kind: EntityKind) -> Result<&Node> {
        let node = self.node(id)?;
        if node.entity.kind() == kind {
            Ok(node)
        } else {
            Err(Error::UnknownNode(id))
        }
    }

    pub fn add_subject(&mut self, metadata: Metadata) -> Result<SubjectId> {
        let entity = Entity::new(EntityKind::Subject, metadata);
        Ok(SubjectId(self.insert(Self::ROOT, entity, Body::Subject)?))
    }

    pub fn add_session(&mut self, subject: SubjectId, metadata: Metadata) -> Result<SessionId> {
        self.expect_kind(subject.0, EntityKind::Subject)?;
        let entity = Entity::new(EntityKind::Session, metadata);
        let body = Body::Session { events: Vec::new() };
        Ok(SessionId(self.insert(subject.0, entity, body)?))
    }

    pub fn add_channel(&mut self, session: SessionId, metadata: Metadata) -> Result<ChannelId> {
        self.expect_kind(session.0, EntityKind::Session)?;
        let entity = Entity::new(EntityKind::Channel, metadata);
        let body = Body::Channel { data: None };
        Ok(ChannelId(self.insert(session.0, entity, body)?))
    }

    /// Marks a subject for deletion. It is purged from the archive by the next `write`.
    pub fn remove_subject(&mut self, subject: SubjectId) -> Result<()> {
        self.detach(Self::ROOT, subject.0)
    }

    /// Marks a session for deletion. It is purged from the archive by the next write of its subject.
    pub fn remove_session(&mut self, subject: SubjectId, session: SessionId) -> Result<()> {
        self.detach(subject.0, session.0)
    }

    /// Marks a channel for deletion. It is purged from the archive by the next write of its session.
    pub fn remove_channel(&mut self, session: SessionId, channel: ChannelId) -> Result<()> {
        self.detach(session.0, channel.0)
    }

    /// The experiment itself can not be deleted
    pub fn remove(&mut self) -> Result<()> {
        Err(Error::OperationNotPermitted(
            "an experiment can not be deleted",
        ))
    }

    pub fn subjects(&self) -> Result<Vec<SubjectId>> {
        let node = self.root_node()?;
        Ok(node.children.iter().copied().map(SubjectId).collect())
    }

    pub fn sessions(&self, subject: SubjectId) -> Result<Vec<SessionId>> {
        let node = self.expect_kind(subject.0, EntityKind::Subject)?;
        Ok(node.children.iter().copied().map(SessionId).collect())
    }

    pub fn channels(&self, session: SessionId) -> Result<Vec<ChannelId>> {
        let node = self.expect_kind(session.0, EntityKind::Session)?;
        Ok(node.children.iter().copied().map(ChannelId).collect())
    }

    /// live children of any node
    pub fn children(&self, node: impl Into<NodeId>) -> Result<&[NodeId]> {
        Ok(&self.node(node.into())?.children)
    }

    /// children that are waiting to be purged by the next write of `node`
    pub fn pending(&self, node: impl Into<NodeId>) -> Result<&[NodeId]> {
        Ok(&self.node(node.into())?.pending)
    }

    pub fn parent(&self, node: impl Into<NodeId>) -> Result<Option<NodeId>> {
        Ok(self.node(node.into())?.parent)
    }

    pub fn entity(&self, node: impl Into<NodeId>) -> Result<&Entity> {
        Ok(&self.node(node.into())?.entity)
    }

    pub fn metadata(&self, node: impl Into<NodeId>) -> Result<&Metadata> {
        Ok(self.node(node.into())?.entity.metadata())
    }

    pub fn metadata_mut(&mut self, node: impl Into<NodeId>) -> Result<&mut Metadata> {
        Ok(self.node_mut(node.into())?.entity.metadata_mut())
    }

    /// content hash as of the last write or read of the node
    pub fn content_hash(&self, node: impl Into<NodeId>) -> Result<Option<&ContentHash>> {
        Ok(self.node(node.into())?.entity.content_hash())
    }

    /// path of the node, derived from its chain of parents
    pub fn path(&self, node: impl Into<NodeId>) -> Result<ArchivePath> {
        let mut segments = Vec::new();
        let mut current = Some(node.into());
        while let Some(id) = current {
            let node = self.node(id)?;
            segments.extend(node.entity.path_segment());
            current = node.parent;
        }
        Ok(segments.into_iter().rev().collect())
    }

    pub fn add_event(&mut self, session: SessionId, event: SessionEvent) -> Result<()> {
        match &mut self.node_mut(session.0)?.body {
            Body::Session { events } => {
                if !event.time.is_finite() {
                    return Err(Error::NonFiniteSample {
                        index: events.len(),
                    });
                }
                events.push(event);
                Ok(())
            }
            _ => Err(Error::UnknownNode(session.0)),
        }
    }

    /// events of a session, in the order they were added
    pub fn events(&self, session: SessionId) -> Result<&[SessionEvent]> {
        match &self.node(session.0)?.body {
            Body::Session { events } => Ok(events),
            _ => Err(Error::UnknownNode(session.0)),
        }
    }

    /// Replaces all samples of a channel, writing its segments to the archive right away
    pub fn set_data(&mut self, channel: ChannelId, samples: &[f64]) -> Result<()> {
        let path = self.path(channel)?.join(DATA_FILE_NAME);
        let segment_size = self.config.segment_size;
        let hash = self.config.hash;
        let node = slot_mut(&mut self.nodes, channel.0)?;
        match &mut node.body {
            Body::Channel { data } => {
                let segmented = match data.take() {
                    Some(segmented) => segmented,
                    None => SegmentedData::new(path, segment_size)?,
                };
                data.insert(segmented).set(self.archive.as_ref(), hash, samples)
            }
            _ => Err(Error::UnknownNode(channel.0)),
        }
    }

    /// Reads the samples `start..=end` of a channel. `end` defaults to the last sample.
    pub fn get_data(&self, channel: ChannelId, start: usize, end: Option<usize>) -> Result<Vec<f64>> {
        let mode = self.config.range_reads;
        match &self.node(channel.0)?.body {
            Body::Channel { data: Some(data) } => data.get(self.archive.as_ref(), start, end, mode),
            Body::Channel { data: None } => {
                let path = self.path(channel)?.join(DATA_FILE_NAME);
                SegmentedData::new(path, self.config.segment_size)?.get(
                    self.archive.as_ref(),
                    start,
                    end,
                    mode,
                )
            }
            _ => Err(Error::UnknownNode(channel.0)),
        }
    }

    /// typed handle of a channel node
    pub fn channel_id(&self, node: NodeId) -> Result<ChannelId> {
        self.expect_kind(node, EntityKind::Channel)?;
        Ok(ChannelId(node))
    }

    /// number of samples of a channel
    pub fn data_len(&self, channel: ChannelId) -> Result<usize> {
        match &self.node(channel.0)?.body {
            Body::Channel { data } => Ok(data.as_ref().map(SegmentedData::len).unwrap_or_default()),
            _ => Err(Error::UnknownNode(channel.0)),
        }
    }

    /// Registers derived data under `owner`, so that it is recorded in the owner's metadata
    /// and purged together with the owner
    pub(crate) fn register_calculated(&mut self, owner: NodeId, key: String) -> Result<()> {
        let node = self.node_mut(owner)?;
        if !node.calculated.contains(&key) {
            node.calculated.push(key);
        }
        Ok(())
    }

    /// `<directory>/<file name>` of every derived data attached to `node`
    pub fn calculated(&self, node: impl Into<NodeId>) -> Result<&[String]> {
        Ok(&self.node(node.into())?.calculated)
    }
}

pub(crate) fn slot(nodes: &[Option<Node>], id: NodeId) -> Result<&Node> {
    nodes
        .get(id.0)
        .and_then(Option::as_ref)
        .ok_or(Error::UnknownNode(id))
}

pub(crate) fn slot_mut(nodes: &mut [Option<Node>], id: NodeId) -> Result<&mut Node> {
    nodes
        .get_mut(id.0)
        .and_then(Option::as_mut)
        .ok_or(Error::UnknownNode(id))
}
