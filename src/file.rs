//! Overlay over a single file node.

use std::sync::Weak;
use std::time::SystemTime;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::cid::{CidBuilder, Codec};
use crate::dag::{DagNode, ProtoNode};
use crate::error::{MfsError, Result};
use crate::root::{ChildUpdate, Parent};
use crate::store::DagStoreRef;
use crate::unixfs::UnixfsData;

/// The in-memory view of a file: the current node representing its
/// contents (protobuf or raw), plus the back-reference used to propagate
/// identifier changes upward.
pub struct FileOverlay {
    name: String,
    parent: Weak<dyn Parent>,
    store: DagStoreRef,
    cancel: CancellationToken,
    node: Mutex<DagNode>,
}

impl FileOverlay {
    pub(crate) fn new(
        name: impl Into<String>,
        node: DagNode,
        parent: Weak<dyn Parent>,
        store: DagStoreRef,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            store,
            cancel,
            node: Mutex::new(node),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_live(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MfsError::Cancelled);
        }
        Ok(())
    }

    fn parent(&self) -> Result<std::sync::Arc<dyn Parent>> {
        self.parent.upgrade().ok_or(MfsError::Detached)
    }

    /// Logical file size: the declared size for protobuf files, the byte
    /// length for raw leaves.
    pub async fn size(&self) -> Result<u64> {
        match &*self.node.lock().await {
            DagNode::Proto(proto) => Ok(UnixfsData::decode(proto.data())?.size()),
            DagNode::Raw(raw) => Ok(raw.data().len() as u64),
        }
    }

    /// The current file node.
    pub async fn get_node(&self) -> Result<DagNode> {
        Ok(self.node.lock().await.clone())
    }

    pub async fn set_mode(&self, mode: u32) -> Result<()> {
        self.set_stat(Some(mode), None).await
    }

    pub async fn set_mod_time(&self, ts: SystemTime) -> Result<()> {
        self.set_stat(None, Some(ts)).await
    }

    /// Stamp metadata onto the file node, persist the result, and
    /// propagate the new identifier upward.
    ///
    /// Raw leaves cannot carry metadata, so a stamped raw node is
    /// re-expressed as a protobuf `File` node holding the same content.
    #[instrument(name = "FileOverlay::set_stat", skip_all, fields(file = %self.name))]
    async fn set_stat(&self, mode: Option<u32>, mtime: Option<SystemTime>) -> Result<()> {
        self.ensure_live()?;
        let mut guard = self.node.lock().await;
        let (mut data, links, builder) = match &*guard {
            DagNode::Proto(proto) => (
                UnixfsData::decode(proto.data())?,
                proto.links().to_vec(),
                proto.builder(),
            ),
            DagNode::Raw(raw) => (
                UnixfsData::file(raw.data().clone()),
                Vec::new(),
                CidBuilder::new(1, Codec::DagPb),
            ),
        };
        if let Some(mode) = mode {
            data.set_mode(mode);
        }
        if let Some(ts) = mtime {
            data.set_mod_time(ts);
        }
        let node = DagNode::Proto(ProtoNode::with_links(data.encode(), links, builder));
        self.store.add(&node).await?;
        *guard = node.clone();
        // Release our lock before the parent takes its own.
        drop(guard);

        self.parent()?
            .update_child_entry(ChildUpdate {
                name: self.name.clone(),
                node,
            })
            .await
    }

    /// Persist the current node and re-link ancestors up to the root.
    #[instrument(name = "FileOverlay::flush", skip_all, fields(file = %self.name))]
    pub async fn flush(&self) -> Result<()> {
        self.ensure_live()?;
        let node = self.get_node().await?;
        self.store.add(&node).await?;
        self.parent()?
            .update_child_entry(ChildUpdate {
                name: self.name.clone(),
                node,
            })
            .await
    }
}
