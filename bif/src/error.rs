use crate::{archive::ArchivePath, entity::EntityId, experiment::NodeId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Object not found: {}", .0)]
    ObjectNotFound(ArchivePath),

    #[error("Storage unavailable: {}", .0)]
    StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("Metadata at {} is corrupt: {}", .path, .reason)]
    MetadataCorrupt { path: ArchivePath, reason: String },

    #[error("{} is not a live child of {}", .child, .parent)]
    NotAChild { parent: EntityId, child: EntityId },

    #[error("Operation not permitted: {}", .0)]
    OperationNotPermitted(&'static str),

    #[error("Unknown node {}", .0)]
    UnknownNode(NodeId),

    #[error("Invalid path segment {:?} in {}", .segment, .path)]
    InvalidPath { path: ArchivePath, segment: String },

    #[error("Index out of bounds: {}, length: {}", .tried, .length)]
    IndexOutOfBounds { length: usize, tried: usize },

    #[error("Invalid config: {}", .0)]
    InvalidConfig(&'static str),

    #[error("Sample {} is not finite", .index)]
    NonFiniteSample { index: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Calculation failed: {}", .0)]
    Calculation(#[from] anyhow::Error),

    #[cfg(feature = "metrics")]
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
}

impl Error {
    /// wrap a backend failure
    pub fn storage(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::StorageUnavailable(Box::new(cause))
    }

    pub(crate) fn corrupt(path: &ArchivePath, reason: impl Into<String>) -> Self {
        Self::MetadataCorrupt {
            path: path.clone(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::storage(value)
    }
}
