//! The top of the tree: propagation terminator and root CID holder.

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::cid::Cid;
use crate::dag::DagNode;
use crate::dir::DirectoryOverlay;
use crate::error::{MfsError, Result};
use crate::fsnode::{FsNode, MkdirOpts};
use crate::store::DagStoreRef;
use crate::unixfs_dir::UnixfsDir;

/// A propagation message: "child `name` now resolves to `node`".
pub(crate) struct ChildUpdate {
    pub name: String,
    pub node: DagNode,
}

/// Anything that accepts child-entry updates: a directory, or the root.
///
/// Propagation runs strictly child to parent; each receiver applies its
/// local update under its own lock, releases it, then calls up.
#[async_trait]
pub(crate) trait Parent: Send + Sync {
    async fn update_child_entry(&self, update: ChildUpdate) -> Result<()>;

    /// Prepend this receiver's position in the tree to `tail`, walking up
    /// to the root, which contributes the leading `/`.
    fn append_path(&self, tail: &str) -> Result<String>;
}

/// The sole entry whose parent is not another directory.
///
/// Owns the top [`DirectoryOverlay`] and records the CID most recently
/// propagated to it. Dropping the root (or calling [`close`](Root::close))
/// tears the tree down; overlay handles kept past that point fail
/// `Detached` or `Cancelled`.
#[derive(Debug)]
pub struct Root {
    dir: OnceLock<Arc<DirectoryOverlay>>,
    cid: Mutex<Cid>,
    cancel: CancellationToken,
}

impl Root {
    /// Open a root over an existing directory node.
    ///
    /// The node is re-added to the store so the recorded CID always
    /// resolves.
    pub async fn new(store: DagStoreRef, node: DagNode) -> Result<Arc<Self>> {
        store.add(&node).await?;

        let root = Arc::new(Self {
            dir: OnceLock::new(),
            cid: Mutex::new(node.cid()),
            cancel: CancellationToken::new(),
        });
        let parent = {
            let strong: Arc<dyn Parent> = root.clone();
            Arc::downgrade(&strong)
        };
        let dir = DirectoryOverlay::from_node(
            "",
            &node,
            parent,
            store,
            root.cancel.child_token(),
        )?;
        let _ = root.dir.set(dir);
        Ok(root)
    }

    /// Create a root over a brand-new empty directory.
    pub async fn empty(store: DagStoreRef, opts: MkdirOpts) -> Result<Arc<Self>> {
        let dir = UnixfsDir::new(store.clone(), &opts);
        let node = dir.get_node();
        Self::new(store, node).await
    }

    /// The top directory.
    pub fn dir(&self) -> &Arc<DirectoryOverlay> {
        self.dir
            .get()
            .unwrap_or_else(|| unreachable!("root directory is set during construction"))
    }

    /// The CID most recently propagated to the root.
    pub fn root_cid(&self) -> Cid {
        *self.cid.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reify the whole tree and re-link it up to the root.
    pub async fn flush(&self) -> Result<()> {
        self.dir().flush().await
    }

    /// Resolve an absolute `/`-separated path to an overlay handle.
    pub async fn lookup(&self, path: &str) -> Result<FsNode> {
        let mut cur = FsNode::Dir(Arc::clone(self.dir()));
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            let dir = Arc::clone(
                cur.as_dir()
                    .ok_or_else(|| MfsError::NotFound(comp.to_owned()))?,
            );
            cur = dir.child(comp).await?;
        }
        Ok(cur)
    }

    /// Cancel the tree. In-flight and subsequent store-touching operations
    /// fail `Cancelled`; already-applied cache edits are not rolled back.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Parent for Root {
    #[instrument(name = "Root::update_child_entry", skip(self, update), fields(name = %update.name))]
    async fn update_child_entry(&self, update: ChildUpdate) -> Result<()> {
        if update.name != self.dir().name() {
            return Err(MfsError::BadPropagation(update.name));
        }
        let cid = update.node.cid();
        debug!(%cid, "root updated");
        *self.cid.lock().unwrap_or_else(|e| e.into_inner()) = cid;
        Ok(())
    }

    fn append_path(&self, tail: &str) -> Result<String> {
        Ok(format!("/{tail}"))
    }
}
