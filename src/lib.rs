//! Mutable file system (MFS) directory engine over an immutable,
//! content-addressed DAG.
//!
//! Content-addressed DAGs are immutable: any edit produces a new node with
//! a new CID. This crate provides the illusion of a traditional mutable
//! directory tree by keeping an in-memory overlay of pending mutations,
//! reifying them into DAG nodes on demand, and propagating the resulting
//! identifier changes from the edited node up to the [`Root`].
//!
//! ```no_run
//! # async fn demo() -> dag_fs::Result<()> {
//! use std::sync::Arc;
//! use dag_fs::{MemDagStore, MkdirOpts, Root};
//!
//! let store = Arc::new(MemDagStore::new());
//! let root = Root::empty(store, MkdirOpts::default()).await?;
//! let docs = root.dir().mkdir("docs").await?;
//! docs.mkdir("notes").await?;
//! root.flush().await?;
//! let cid = root.root_cid(); // resolves the whole tree from the store
//! # let _ = cid;
//! # Ok(())
//! # }
//! ```

/// Content identifiers and builders.
pub mod cid;
/// Immutable DAG node values and their deterministic encoding.
pub mod dag;
/// The directory overlay: pending-edit cache over a backing directory.
pub mod dir;
/// Crate-wide error types.
pub mod error;
/// The file overlay.
pub mod file;
/// The polymorphic overlay handle and node-kind dispatch.
pub mod fsnode;
/// The propagation terminator and root CID holder.
pub mod root;
/// The injected block-store seam.
pub mod store;
/// The filesystem facet carried inside protobuf node payloads.
pub mod unixfs;
/// Editable view over a single directory node.
pub mod unixfs_dir;

pub use cid::{Cid, CidBuilder, Codec};
pub use dag::{DagLink, DagNode, ProtoNode, RawNode};
pub use dir::DirectoryOverlay;
pub use error::{MfsError, Result, StoreError};
pub use file::FileOverlay;
pub use fsnode::{classify, FsNode, MkdirOpts, NodeListing, NodeType};
pub use root::Root;
pub use store::{DagStore, DagStoreRef, MemDagStore};
pub use unixfs::{UnixfsData, UnixfsKind};
pub use unixfs_dir::UnixfsDir;
