//! The injected block-store seam.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cid::Cid;
use crate::dag::DagNode;
use crate::error::StoreError;

/// Stores immutable nodes keyed by content identifier.
///
/// Implementations must be content-addressed (`add` is idempotent by CID)
/// and safe for concurrent use; the whole overlay tree shares one store.
#[async_trait]
pub trait DagStore: Send + Sync {
    /// Persist a node. Adding the same node twice is a no-op.
    async fn add(&self, node: &DagNode) -> Result<(), StoreError>;

    /// Fetch a node by CID. A missing block is a store failure: unlinking
    /// never deletes blocks, so anything once added must resolve.
    async fn get(&self, cid: &Cid) -> Result<DagNode, StoreError>;
}

/// Shared handle to an injected store.
pub type DagStoreRef = Arc<dyn DagStore>;

/// In-memory [`DagStore`] over a sharded concurrent map.
///
/// Backs the test suites and small demos; real deployments inject their own
/// store.
#[derive(Default)]
pub struct MemDagStore {
    blocks: scc::HashMap<Cid, DagNode>,
}

impl MemDagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blocks held.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub async fn contains(&self, cid: &Cid) -> bool {
        self.blocks.contains_async(cid).await
    }
}

#[async_trait]
impl DagStore for MemDagStore {
    async fn add(&self, node: &DagNode) -> Result<(), StoreError> {
        // Content-addressed: an occupied slot already holds this exact node.
        let _ = self.blocks.insert_async(node.cid(), node.clone()).await;
        Ok(())
    }

    async fn get(&self, cid: &Cid) -> Result<DagNode, StoreError> {
        self.blocks
            .read_async(cid, |_, node| node.clone())
            .await
            .ok_or_else(|| StoreError::message(format!("block {cid} not found")))
    }
}
