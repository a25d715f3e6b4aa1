//! The directory overlay: pending-edit cache plus backing directory state.
//!
//! A `DirectoryOverlay` gives one directory of the immutable DAG a mutable
//! face. Reads descend lazily, materializing child overlays on first
//! access and caching them by name; writes edit the backing
//! [`UnixfsDir`] and, on flush, re-serialize the directory and push the
//! resulting identifier change up the parent chain.
//!
//! One async mutex per directory serializes that directory's cache and
//! backing state. No child overlay method is ever invoked while the
//! directory's own lock is held: reification snapshots the cache, collects
//! child nodes with only each child's lock held, then re-acquires the lock
//! to link the results. Propagation likewise applies the local update
//! under the lock, releases it, and only then calls the parent.

use std::sync::{Arc, Weak};
use std::time::SystemTime;

use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace, warn};

use crate::cid::CidBuilder;
use crate::dag::DagNode;
use crate::error::{MfsError, Result};
use crate::file::FileOverlay;
use crate::fsnode::{classify, FsNode, MkdirOpts, NodeListing, NodeType};
use crate::root::{ChildUpdate, Parent};
use crate::store::DagStoreRef;
use crate::unixfs_dir::UnixfsDir;

/// State guarded by the directory's mutex: the backing directory editor
/// and the cache of live child overlays.
struct DirInner {
    dir: UnixfsDir,
    entries: FxHashMap<String, FsNode>,
}

impl std::fmt::Debug for DirInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirInner")
            .field("entries", &self.entries)
            .finish()
    }
}

/// The mutable overlay for one directory node.
pub struct DirectoryOverlay {
    name: String,
    parent: Weak<dyn Parent>,
    self_ref: Weak<DirectoryOverlay>,
    store: DagStoreRef,
    cancel: CancellationToken,
    inner: Mutex<DirInner>,
}

impl std::fmt::Debug for DirectoryOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryOverlay")
            .field("name", &self.name)
            .finish()
    }
}

impl DirectoryOverlay {
    /// Wrap an existing directory node.
    pub(crate) fn from_node(
        name: impl Into<String>,
        node: &DagNode,
        parent: Weak<dyn Parent>,
        store: DagStoreRef,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        let dir = UnixfsDir::from_node(store.clone(), node)?;
        Ok(Self::build(name.into(), parent, store, cancel, dir))
    }

    fn build(
        name: String,
        parent: Weak<dyn Parent>,
        store: DagStoreRef,
        cancel: CancellationToken,
        dir: UnixfsDir,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            name,
            parent,
            self_ref: me.clone(),
            store,
            cancel,
            inner: Mutex::new(DirInner {
                dir,
                entries: FxHashMap::default(),
            }),
        })
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

    fn parent(&self) -> Result<Arc<dyn Parent>> {
        self.parent.upgrade().ok_or(MfsError::Detached)
    }

    /// This overlay as a parent back-reference for a child.
    fn as_parent(&self) -> Weak<dyn Parent> {
        self.self_ref.clone()
    }

    /// Absolute path of this directory, `/`-separated from the root.
    pub fn path(&self) -> Result<String> {
        self.parent()?.append_path(&self.name)
    }

    // ── Child resolution ────────────────────────────────────────────────

    /// Return the child overlay under `name`, materializing and caching it
    /// on first access.
    #[instrument(name = "DirectoryOverlay::child", skip(self), fields(dir = %self.name))]
    pub async fn child(&self, name: &str) -> Result<FsNode> {
        self.ensure_live()?;
        let mut inner = self.inner.lock().await;
        self.child_locked(&mut inner, name).await
    }

    /// Lookup path for callers that already hold the lock.
    async fn child_locked(&self, inner: &mut DirInner, name: &str) -> Result<FsNode> {
        if let Some(entry) = inner.entries.get(name) {
            trace!(name, "cache hit");
            return Ok(entry.clone());
        }
        let node = inner.dir.find(name).await?;
        trace!(name, "materializing child");
        self.cache_node(inner, name, node)
    }

    /// Materialize an overlay of the right variant for `node` and insert
    /// it into the cache.
    fn cache_node(&self, inner: &mut DirInner, name: &str, node: DagNode) -> Result<FsNode> {
        let entry = match classify(&node)? {
            NodeType::Dir => {
                let mut dir = UnixfsDir::from_node(self.store.clone(), &node)?;
                // Sharding limits and the CID builder are not persisted in
                // the DAG; a materialized child inherits the parent's.
                dir.set_max_links(inner.dir.max_links());
                dir.set_max_hamt_fanout(inner.dir.max_hamt_fanout());
                dir.set_cid_builder(inner.dir.cid_builder());
                FsNode::Dir(Self::build(
                    name.to_owned(),
                    self.as_parent(),
                    self.store.clone(),
                    self.cancel.clone(),
                    dir,
                ))
            }
            NodeType::File => FsNode::File(Arc::new(FileOverlay::new(
                name,
                node,
                self.as_parent(),
                self.store.clone(),
                self.cancel.clone(),
            ))),
        };
        inner.entries.insert(name.to_owned(), entry.clone());
        Ok(entry)
    }

    /// Drop the cached overlay for `name` without touching the backing
    /// store. A later access re-materializes from the DAG.
    pub async fn uncache(&self, name: &str) {
        self.inner.lock().await.entries.remove(name);
    }

    // ── Listing ─────────────────────────────────────────────────────────

    /// Every name linked in the backing directory, in its iteration order.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        self.ensure_live()?;
        let inner = self.inner.lock().await;
        let mut out = Vec::new();
        inner.dir.for_each_link(|link| {
            out.push(link.name.clone());
            Ok(())
        })?;
        Ok(out)
    }

    /// Materialize every entry and hand a listing for each to `f`.
    ///
    /// The name set is snapshotted up front; entries are materialized and
    /// reified per-name without holding this directory's lock.
    pub async fn for_each_entry(
        &self,
        mut f: impl FnMut(NodeListing) -> Result<()>,
    ) -> Result<()> {
        for name in self.list_names().await? {
            let entry = self.child(&name).await?;
            let node = entry.get_node().await?;
            let size = match &entry {
                FsNode::File(file) => file.size().await?,
                FsNode::Dir(_) => 0,
            };
            f(NodeListing {
                name,
                node_type: entry.node_type(),
                size,
                hash: node.cid().to_string(),
            })?;
        }
        Ok(())
    }

    /// Collected form of [`for_each_entry`](Self::for_each_entry).
    pub async fn list(&self) -> Result<Vec<NodeListing>> {
        let mut out = Vec::new();
        self.for_each_entry(|listing| {
            out.push(listing);
            Ok(())
        })
        .await?;
        Ok(out)
    }

    // ── Mutation ────────────────────────────────────────────────────────

    /// Create an empty subdirectory named `name`, inheriting this
    /// directory's limits and builder.
    pub async fn mkdir(&self, name: &str) -> Result<Arc<DirectoryOverlay>> {
        let (max_links, max_hamt_fanout) = {
            let inner = self.inner.lock().await;
            (inner.dir.max_links(), inner.dir.max_hamt_fanout())
        };
        self.mkdir_with_opts(
            name,
            MkdirOpts {
                max_links,
                max_hamt_fanout,
                ..MkdirOpts::default()
            },
        )
        .await
    }

    /// Create an empty subdirectory with explicit options.
    ///
    /// The opts-supplied CID builder is overridden by this directory's
    /// current builder; callers needing a different one set it on the new
    /// directory afterwards.
    #[instrument(name = "DirectoryOverlay::mkdir", skip(self, opts), fields(dir = %self.name))]
    pub async fn mkdir_with_opts(
        &self,
        name: &str,
        mut opts: MkdirOpts,
    ) -> Result<Arc<DirectoryOverlay>> {
        self.ensure_live()?;
        let mut inner = self.inner.lock().await;
        match self.child_locked(&mut inner, name).await {
            Ok(existing) => {
                let is_dir = existing.node_type() == NodeType::Dir;
                return Err(MfsError::AlreadyExists {
                    name: name.to_owned(),
                    existing: is_dir.then_some(existing),
                });
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        opts.cid_builder = inner.dir.cid_builder();
        let dir = UnixfsDir::new(self.store.clone(), &opts);
        let node = dir.get_node();
        self.store.add(&node).await?;
        inner.dir.add_child(name, &node)?;

        let child = Self::build(
            name.to_owned(),
            self.as_parent(),
            self.store.clone(),
            self.cancel.clone(),
            dir,
        );
        inner
            .entries
            .insert(name.to_owned(), FsNode::Dir(Arc::clone(&child)));
        Ok(child)
    }

    /// Remove `name` from the cache and the backing directory. A name that
    /// never resolved is not an error here.
    #[instrument(name = "DirectoryOverlay::unlink", skip(self), fields(dir = %self.name))]
    pub async fn unlink(&self, name: &str) -> Result<()> {
        self.ensure_live()?;
        let mut inner = self.inner.lock().await;
        inner.entries.remove(name);
        match inner.dir.remove_child(name) {
            Err(err) if err.is_not_found() => {
                trace!(name, "unlink of absent name");
                Ok(())
            }
            other => other,
        }
    }

    /// Link an externally built node under `name`.
    ///
    /// Fails [`MfsError::DirExists`] when the name already resolves. No
    /// overlay is materialized eagerly; the next [`child`](Self::child)
    /// call does that.
    #[instrument(name = "DirectoryOverlay::add_child", skip(self, node), fields(dir = %self.name))]
    pub async fn add_child(&self, name: &str, node: DagNode) -> Result<()> {
        self.ensure_live()?;
        let mut inner = self.inner.lock().await;
        match self.child_locked(&mut inner, name).await {
            Ok(_) => return Err(MfsError::DirExists(name.to_owned())),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        self.store.add(&node).await?;
        inner.dir.add_child(name, &node)
    }

    // ── Reification & propagation ───────────────────────────────────────

    /// Reify pending cache entries into the backing directory and return
    /// the resulting node, persisted to the store.
    ///
    /// Runs in phases so no child lock is taken under our own: snapshot
    /// the cache, collect each child's current node, then re-link under
    /// the lock, skipping names unlinked in between, so a concurrent
    /// `unlink` is never resurrected.
    async fn reify(&self, clean: bool) -> Result<DagNode> {
        self.ensure_live()?;
        let pending: Vec<(String, FsNode)> = {
            let inner = self.inner.lock().await;
            inner
                .entries
                .iter()
                .map(|(name, entry)| (name.clone(), entry.clone()))
                .collect()
        };

        let mut reified = Vec::with_capacity(pending.len());
        for (name, entry) in pending {
            let node = entry.get_node().await?;
            reified.push((name, node));
        }

        let mut inner = self.inner.lock().await;
        for (name, node) in reified {
            if inner.entries.contains_key(&name) {
                inner.dir.add_child(&name, &node)?;
            }
        }
        if clean {
            inner.entries.clear();
        }
        let node = inner.dir.get_node();
        self.store.add(&node).await?;
        Ok(node)
    }

    /// The current directory node with all pending edits applied. The
    /// reified subtree is persisted, so the returned CID resolves fully
    /// from the store.
    pub async fn get_node(&self) -> Result<DagNode> {
        self.reify(false).await
    }

    /// Like [`get_node`](Self::get_node), but clears the entries cache
    /// after a successful pass; children are re-read from the DAG on next
    /// access.
    pub async fn get_node_clean(&self) -> Result<DagNode> {
        self.reify(true).await
    }

    /// Reify and push the resulting identifier up the parent chain.
    #[instrument(name = "DirectoryOverlay::flush", skip(self), fields(dir = %self.name))]
    pub async fn flush(&self) -> Result<()> {
        let node = self.reify(false).await?;
        self.parent()?
            .update_child_entry(ChildUpdate {
                name: self.name.clone(),
                node,
            })
            .await
    }

    /// Apply one propagated child update under the lock: re-link the
    /// child, rebuild the directory node, and persist it.
    ///
    /// The returned node is freshly built by the backing directory and
    /// aliases none of its internal storage.
    async fn local_update(&self, update: ChildUpdate) -> Result<DagNode> {
        self.ensure_live()?;
        let mut inner = self.inner.lock().await;
        inner.dir.add_child(&update.name, &update.node)?;
        let node = inner.dir.get_node();
        if node.as_proto().is_none() {
            return Err(MfsError::NotProtobuf);
        }
        self.store.add(&node).await?;
        Ok(node)
    }

    // ── Metadata ────────────────────────────────────────────────────────

    pub async fn set_mode(&self, mode: u32) -> Result<()> {
        self.set_stat(Some(mode), None).await
    }

    pub async fn set_mod_time(&self, ts: SystemTime) -> Result<()> {
        self.set_stat(None, Some(ts)).await
    }

    /// Stamp metadata onto the directory node: reify, rewrite the payload
    /// with the links preserved, persist, propagate, then swap in a fresh
    /// backing directory over the new node, carrying the limits and
    /// builder, which are not persisted.
    #[instrument(name = "DirectoryOverlay::set_stat", skip_all, fields(dir = %self.name))]
    async fn set_stat(&self, mode: Option<u32>, mtime: Option<SystemTime>) -> Result<()> {
        let proto = self.get_node().await?.into_proto()?;
        let mut data = crate::unixfs::UnixfsData::decode(proto.data())?;
        if let Some(mode) = mode {
            data.set_mode(mode);
        }
        if let Some(ts) = mtime {
            data.set_mod_time(ts);
        }
        let node = DagNode::Proto(crate::dag::ProtoNode::with_links(
            data.encode(),
            proto.links().to_vec(),
            proto.builder(),
        ));
        self.store.add(&node).await?;
        self.parent()?
            .update_child_entry(ChildUpdate {
                name: self.name.clone(),
                node: node.clone(),
            })
            .await?;

        let mut inner = self.inner.lock().await;
        let mut dir = UnixfsDir::from_node(self.store.clone(), &node)?;
        dir.set_max_links(inner.dir.max_links());
        dir.set_max_hamt_fanout(inner.dir.max_hamt_fanout());
        dir.set_cid_builder(inner.dir.cid_builder());
        inner.dir = dir;
        Ok(())
    }

    // ── Backing-store settings ──────────────────────────────────────────

    pub async fn cid_builder(&self) -> CidBuilder {
        self.inner.lock().await.dir.cid_builder()
    }

    pub async fn set_cid_builder(&self, builder: CidBuilder) {
        self.inner.lock().await.dir.set_cid_builder(builder);
    }
}

#[async_trait::async_trait]
impl Parent for DirectoryOverlay {
    /// Apply the child's update locally, then continue the propagation
    /// upward with our own new node, all the way to the root.
    async fn update_child_entry(&self, update: ChildUpdate) -> Result<()> {
        let node = self.local_update(update).await?;
        let Ok(parent) = self.parent() else {
            warn!(dir = %self.name, "propagation target dropped");
            return Err(MfsError::Detached);
        };
        parent
            .update_child_entry(ChildUpdate {
                name: self.name.clone(),
                node,
            })
            .await
    }

    fn append_path(&self, tail: &str) -> Result<String> {
        let joined = if self.name.is_empty() {
            tail.to_owned()
        } else if tail.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.name, tail)
        };
        self.parent()?.append_path(&joined)
    }
}
