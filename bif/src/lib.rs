//! # BIF, the biosignal format
//!
//! BIF stores biomedical recordings as a tree of entities inside a single archive.
//!
//! ```text
//! Experiment
//! └── SUBJECT-<id>
//!     └── SESSION-<id>          (+ .event)
//!         └── CHANNEL-<id>
//!             └── data/SEGMENT-0, SEGMENT-1, ...
//! ```
//!
//! Every entity has a `.metadata` object, a json object with the user metadata plus a few
//! reserved keys (`.uniqueID`, `.dataHash`, ...). The archive itself is abstract, see
//! [`archive::Archive`]. Anything that can add, remove and read content by a sequence of path
//! segments will do.
//!
//! ## Content hashes
//!
//! Writing an experiment computes a content hash for every node, from the bottom up. A channel
//! hashes its serialized samples, every other node hashes the `-` joined hashes of its children.
//! So the hash of the experiment changes whenever any sample below it changes.
//!
//! Values derived from a node, like a spectrum of a channel, are cached together with the hash of
//! the node they were calculated from. See [`derived::DerivedData`] for single values and
//! [`derived::SegmentedDerivedData`] for sample sequences.
//!
//! ## Channel data
//!
//! Samples are split into segments of a fixed number of samples, each stored as its own json
//! array. Reading a range only touches the segments that intersect the range.
//!
//! ## Deletion
//!
//! Removing a node from its parent only marks it. It is purged from the archive, together with
//! everything below it, the next time the parent is written.
pub mod archive;
pub mod config;
pub mod derived;
pub mod entity;
pub mod error;
pub mod event;
pub mod experiment;
pub mod hash;
pub mod segmented;
pub mod stored;

pub use archive::{ArcArchive, Archive, ArchivePath, DirArchive, MemArchive};
pub use config::{Config, RangeReads};
pub use derived::{DerivedData, SegmentedDerivedData};
pub use entity::{Entity, EntityId, EntityKind, Metadata};
pub use error::{Error, Result};
pub use event::SessionEvent;
pub use experiment::{ChannelId, Experiment, NodeId, SessionId, SubjectId};
pub use hash::{ContentHash, HashAlgorithm};

/// Registers the archive histograms with a prometheus registry
#[cfg(feature = "metrics")]
pub fn register_metrics(registry: &prometheus::Registry) -> Result<()> {
    archive::register(registry)
}
