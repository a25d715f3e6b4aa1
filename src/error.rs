//! Crate-wide error types.

use thiserror::Error;

use crate::fsnode::FsNode;

/// Convenience alias used throughout the crate.
pub type Result<T, E = MfsError> = std::result::Result<T, E>;

/// A failure surfaced by a [`DagStore`](crate::store::DagStore)
/// implementation.
///
/// The source is boxed so foreign stores can wrap whatever error type they
/// already use.
#[derive(Debug, Error)]
#[error("dag store: {0}")]
pub struct StoreError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    /// Wrap an arbitrary error as a store failure.
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }

    /// Build a store failure from a plain message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self(msg.into().into())
    }
}

/// Errors produced by the overlay engine.
#[derive(Debug, Error)]
pub enum MfsError {
    /// The name does not resolve in the backing store and is not cached.
    #[error("no entry named {0:?}")]
    NotFound(String),

    /// `mkdir` collided with an existing entry. `existing` carries the
    /// overlay handle when the entry is a directory, so callers can
    /// implement ok-if-dir semantics.
    #[error("an entry named {name:?} already exists")]
    AlreadyExists {
        name: String,
        existing: Option<FsNode>,
    },

    /// `add_child` collided with an existing entry.
    #[error("directory already has an entry named {0:?}")]
    DirExists(String),

    /// The DAG node kind is not representable in the overlay.
    #[error("invalid child node kind")]
    InvalidChild,

    /// UnixFS `Metadata` nodes are recognized but unsupported.
    #[error("metadata nodes are not yet implemented")]
    NotYetImplemented,

    /// The backing directory node was unexpectedly not a protobuf node.
    #[error("directory node is not a protobuf node")]
    NotProtobuf,

    /// A node payload could not be decoded.
    #[error("malformed node payload: {0}")]
    Malformed(String),

    /// The overlay's parent chain has been dropped; the tree that owned
    /// this overlay no longer exists.
    #[error("overlay is detached from its tree")]
    Detached,

    /// A propagation message arrived for a name the receiver does not own.
    #[error("propagation for unknown child {0:?}")]
    BadPropagation(String),

    /// The tree's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// A failure from the underlying block store, wrapped with context.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MfsError {
    /// True when the error is a missing-name resolution failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MfsError::NotFound(_))
    }
}
