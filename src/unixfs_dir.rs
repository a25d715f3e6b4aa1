//! Editable view over a single directory node.
//!
//! [`UnixfsDir`] owns the mutable link set and metadata for one directory
//! and turns them back into an immutable [`DagNode`] on demand. The dense
//! layout is the only one produced here; `max_links` and `max_hamt_fanout`
//! are carried (and inherited by children) for the external re-sharding
//! decision, and foreign `HAMTShard` nodes decode as flat link sets.

use std::collections::BTreeMap;
use std::time::SystemTime;

use tracing::trace;

use crate::dag::{DagLink, DagNode, ProtoNode};
use crate::error::{MfsError, Result};
use crate::fsnode::MkdirOpts;
use crate::store::DagStoreRef;
use crate::unixfs::{UnixfsData, UnixfsKind};
use crate::cid::CidBuilder;

/// Default shard fanout carried by new directories.
pub const DEFAULT_MAX_HAMT_FANOUT: usize = 256;

/// Editable single-directory state.
pub struct UnixfsDir {
    store: DagStoreRef,
    data: UnixfsData,
    links: BTreeMap<String, DagLink>,
    builder: CidBuilder,
    max_links: usize,
    max_hamt_fanout: usize,
}

impl UnixfsDir {
    /// An empty directory configured from `opts`.
    pub fn new(store: DagStoreRef, opts: &MkdirOpts) -> Self {
        let mut data = UnixfsData::directory();
        if let Some(mode) = opts.mode {
            data.set_mode(mode);
        }
        if let Some(ts) = opts.mod_time {
            data.set_mod_time(ts);
        }
        Self {
            store,
            data,
            links: BTreeMap::new(),
            builder: opts.cid_builder,
            max_links: opts.max_links,
            max_hamt_fanout: opts.max_hamt_fanout,
        }
    }

    /// Rebuild the editable view from a persisted directory node.
    ///
    /// Sharding limits reset to defaults; callers materializing a child
    /// directory overwrite them with the parent's values, since they are
    /// not persisted in the DAG.
    pub fn from_node(store: DagStoreRef, node: &DagNode) -> Result<Self> {
        let proto = node.as_proto().ok_or(MfsError::NotProtobuf)?;
        let data = UnixfsData::decode(proto.data())?;
        match data.kind {
            UnixfsKind::Directory | UnixfsKind::HamtShard => {}
            _ => return Err(MfsError::Malformed("node is not a directory".into())),
        }
        let links = proto
            .links()
            .iter()
            .map(|l| (l.name.clone(), l.clone()))
            .collect();
        Ok(Self {
            store,
            data,
            links,
            builder: proto.builder(),
            max_links: 0,
            max_hamt_fanout: DEFAULT_MAX_HAMT_FANOUT,
        })
    }

    /// Link `node` under `name`, replacing any existing entry by that name.
    pub fn add_child(&mut self, name: &str, node: &DagNode) -> Result<()> {
        let link = DagLink {
            name: name.to_owned(),
            cid: node.cid(),
            size: node.size(),
        };
        if self.links.insert(name.to_owned(), link).is_some() {
            trace!(name, "replaced existing directory link");
        }
        Ok(())
    }

    /// Drop the link under `name`. Fails [`MfsError::NotFound`] when absent.
    pub fn remove_child(&mut self, name: &str) -> Result<()> {
        self.links
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| MfsError::NotFound(name.to_owned()))
    }

    /// Resolve `name` to its node via the store.
    pub async fn find(&self, name: &str) -> Result<DagNode> {
        let link = self
            .links
            .get(name)
            .ok_or_else(|| MfsError::NotFound(name.to_owned()))?;
        Ok(self.store.get(&link.cid).await?)
    }

    /// Visit every link in iteration (name) order.
    pub fn for_each_link(&self, mut f: impl FnMut(&DagLink) -> Result<()>) -> Result<()> {
        for link in self.links.values() {
            f(link)?;
        }
        Ok(())
    }

    /// The current directory node.
    ///
    /// Builds a fresh node on every call; the returned value aliases no
    /// internal storage and later edits never mutate it.
    pub fn get_node(&self) -> DagNode {
        DagNode::Proto(ProtoNode::with_links(
            self.data.encode(),
            self.links.values().cloned().collect(),
            self.builder,
        ))
    }

    pub fn cid_builder(&self) -> CidBuilder {
        self.builder
    }

    pub fn set_cid_builder(&mut self, builder: CidBuilder) {
        self.builder = builder;
    }

    pub fn max_links(&self) -> usize {
        self.max_links
    }

    pub fn set_max_links(&mut self, max_links: usize) {
        self.max_links = max_links;
    }

    pub fn max_hamt_fanout(&self) -> usize {
        self.max_hamt_fanout
    }

    pub fn set_max_hamt_fanout(&mut self, fanout: usize) {
        self.max_hamt_fanout = fanout;
    }

    /// Stamp mode bits and/or a modification time onto the directory
    /// metadata. `None` fields are left untouched.
    pub fn set_stat(&mut self, mode: Option<u32>, mtime: Option<SystemTime>) {
        if let Some(mode) = mode {
            self.data.set_mode(mode);
        }
        if let Some(ts) = mtime {
            self.data.set_mod_time(ts);
        }
    }
}
