//! The polymorphic overlay handle and the node-kind dispatch point.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use crate::cid::CidBuilder;
use crate::dag::DagNode;
use crate::dir::DirectoryOverlay;
use crate::error::{MfsError, Result};
use crate::file::FileOverlay;
use crate::unixfs::{UnixfsData, UnixfsKind};
use crate::unixfs_dir::DEFAULT_MAX_HAMT_FANOUT;

/// What an overlay is: the `Directory | File` dichotomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Dir,
    File,
}

/// A shared handle to a live overlay.
///
/// At most one live overlay exists per name in a directory; repeated
/// lookups return clones of the same handle (observable as `Arc` pointer
/// identity).
#[derive(Clone)]
pub enum FsNode {
    Dir(Arc<DirectoryOverlay>),
    File(Arc<FileOverlay>),
}

impl FsNode {
    pub fn node_type(&self) -> NodeType {
        match self {
            FsNode::Dir(_) => NodeType::Dir,
            FsNode::File(_) => NodeType::File,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FsNode::Dir(d) => d.name(),
            FsNode::File(f) => f.name(),
        }
    }

    pub fn as_dir(&self) -> Option<&Arc<DirectoryOverlay>> {
        match self {
            FsNode::Dir(d) => Some(d),
            FsNode::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&Arc<FileOverlay>> {
        match self {
            FsNode::File(f) => Some(f),
            FsNode::Dir(_) => None,
        }
    }

    /// Reify the overlay into its current DAG node.
    ///
    /// Boxed because directory reification recurses through cached child
    /// handles of this very type.
    pub fn get_node(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<DagNode>> + Send + 'static>> {
        match self {
            FsNode::Dir(d) => {
                let d = Arc::clone(d);
                Box::pin(async move { d.get_node().await })
            }
            FsNode::File(f) => {
                let f = Arc::clone(f);
                Box::pin(async move { f.get_node().await })
            }
        }
    }

    pub async fn set_mode(&self, mode: u32) -> Result<()> {
        match self {
            FsNode::Dir(d) => d.set_mode(mode).await,
            FsNode::File(f) => f.set_mode(mode).await,
        }
    }

    pub async fn set_mod_time(&self, ts: SystemTime) -> Result<()> {
        match self {
            FsNode::Dir(d) => d.set_mod_time(ts).await,
            FsNode::File(f) => f.set_mod_time(ts).await,
        }
    }

    /// Reify and propagate the result upward through the parent chain.
    pub async fn flush(&self) -> Result<()> {
        match self {
            FsNode::Dir(d) => d.flush().await,
            FsNode::File(f) => f.flush().await,
        }
    }
}

impl fmt::Debug for FsNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsNode::Dir(d) => f.debug_tuple("Dir").field(&d.name()).finish(),
            FsNode::File(file) => f.debug_tuple("File").field(&file.name()).finish(),
        }
    }
}

/// One entry emitted by directory iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeListing {
    pub name: String,
    pub node_type: NodeType,
    /// Logical size for files; 0 for directories.
    pub size: u64,
    /// Rendered CID of the entry's current node.
    pub hash: String,
}

/// Options for creating a directory.
#[derive(Debug, Clone)]
pub struct MkdirOpts {
    /// Dense-link ceiling carried for the external re-sharding decision;
    /// 0 means unbounded.
    pub max_links: usize,
    pub max_hamt_fanout: usize,
    /// Mode bits to stamp on the new directory's metadata.
    pub mode: Option<u32>,
    /// Modification time to stamp on the new directory's metadata.
    pub mod_time: Option<SystemTime>,
    /// Overridden to the parent's builder before use; set the builder
    /// afterwards via `set_cid_builder` if a different one is needed.
    pub cid_builder: CidBuilder,
}

impl Default for MkdirOpts {
    fn default() -> Self {
        Self {
            max_links: 0,
            max_hamt_fanout: DEFAULT_MAX_HAMT_FANOUT,
            mode: None,
            mod_time: None,
            cid_builder: CidBuilder::default(),
        }
    }
}

/// Decide which overlay variant represents a DAG node.
///
/// The single place that understands node formats: protobuf
/// `Directory`/`HAMTShard` nodes are directories; protobuf `File`, `Raw`
/// and `Symlink` nodes, and bare raw leaves, are files. `Metadata` is
/// recognized but unsupported; unknown kinds are not representable.
pub fn classify(node: &DagNode) -> Result<NodeType> {
    match node {
        DagNode::Proto(proto) => match UnixfsData::decode(proto.data())?.kind {
            UnixfsKind::Directory | UnixfsKind::HamtShard => Ok(NodeType::Dir),
            UnixfsKind::File | UnixfsKind::Raw | UnixfsKind::Symlink => Ok(NodeType::File),
            UnixfsKind::Metadata => Err(MfsError::NotYetImplemented),
        },
        DagNode::Raw(_) => Ok(NodeType::File),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::dag::{ProtoNode, RawNode};

    fn proto_of(kind: UnixfsKind) -> DagNode {
        let data = UnixfsData {
            kind,
            filesize: None,
            content: Bytes::new(),
            mode: None,
            mtime: None,
        };
        DagNode::Proto(ProtoNode::new(data.encode(), CidBuilder::default()))
    }

    #[test]
    fn directories_and_shards_classify_as_dir() {
        assert_eq!(
            classify(&proto_of(UnixfsKind::Directory)).unwrap(),
            NodeType::Dir
        );
        assert_eq!(
            classify(&proto_of(UnixfsKind::HamtShard)).unwrap(),
            NodeType::Dir
        );
    }

    #[test]
    fn file_like_kinds_classify_as_file() {
        for kind in [UnixfsKind::File, UnixfsKind::Raw, UnixfsKind::Symlink] {
            assert_eq!(classify(&proto_of(kind)).unwrap(), NodeType::File);
        }
        let raw = DagNode::from(RawNode::new(Bytes::from_static(b"leaf")));
        assert_eq!(classify(&raw).unwrap(), NodeType::File);
    }

    #[test]
    fn metadata_is_not_yet_implemented() {
        assert!(matches!(
            classify(&proto_of(UnixfsKind::Metadata)),
            Err(MfsError::NotYetImplemented)
        ));
    }

    #[test]
    fn garbage_payloads_do_not_classify() {
        let junk = DagNode::Proto(ProtoNode::new(
            Bytes::from_static(&[0xFF, 0, 0]),
            CidBuilder::default(),
        ));
        assert!(classify(&junk).is_err());
    }
}
