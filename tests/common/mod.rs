#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use bytes::Bytes;

use dag_fs::{
    CidBuilder, DagNode, MemDagStore, MkdirOpts, ProtoNode, RawNode, Root, UnixfsData,
};

/// An empty root over a fresh in-memory store.
pub async fn empty_root() -> (Arc<Root>, Arc<MemDagStore>) {
    let store = Arc::new(MemDagStore::new());
    let root = Root::empty(store.clone(), MkdirOpts::default())
        .await
        .expect("empty root");
    (root, store)
}

/// A protobuf file node holding `content` inline.
pub fn file_node(content: &[u8]) -> DagNode {
    DagNode::Proto(ProtoNode::new(
        UnixfsData::file(Bytes::copy_from_slice(content)).encode(),
        CidBuilder::default(),
    ))
}

/// A bare raw leaf.
pub fn raw_node(content: &[u8]) -> DagNode {
    DagNode::Raw(RawNode::new(Bytes::copy_from_slice(content)))
}
