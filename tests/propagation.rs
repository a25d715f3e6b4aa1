//! Upward propagation: flush, root CID recording, re-opening a tree from
//! its CID, and failure surfacing on detached or cancelled trees.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use dag_fs::{DagStore, MfsError, Root, UnixfsData};

use common::{empty_root, file_node, raw_node};

/// A flushed tree re-opens from its root CID and walks the same way.
#[tokio::test]
async fn flushed_tree_reopens_from_the_root_cid() {
    let (root, store) = empty_root().await;
    let a = root.dir().mkdir("a").await.unwrap();
    let b = a.mkdir("b").await.unwrap();
    root.flush().await.unwrap();

    assert_eq!(b.path().unwrap(), "/a/b");

    let root_cid = root.root_cid();
    let node = store.get(&root_cid).await.unwrap();
    let reopened = Root::new(store.clone(), node).await.unwrap();

    let walked = reopened.lookup("/a/b").await.unwrap();
    assert!(walked.as_dir().is_some());
    assert_eq!(walked.as_dir().unwrap().path().unwrap(), "/a/b");
}

/// The root CID is a pure function of the tree's content.
#[tokio::test]
async fn root_cid_is_deterministic() {
    let mut cids = Vec::new();
    for _ in 0..2 {
        let (root, _store) = empty_root().await;
        let a = root.dir().mkdir("a").await.unwrap();
        a.mkdir("b").await.unwrap();
        root.flush().await.unwrap();
        cids.push(root.root_cid());
    }
    assert_eq!(cids[0], cids[1]);
}

/// After a child flush, the root's recorded node links the
/// child at exactly the CID the child reports.
#[tokio::test]
async fn flush_links_the_child_at_its_current_cid() {
    let (root, store) = empty_root().await;
    let a = root.dir().mkdir("a").await.unwrap();
    a.add_child("f", file_node(b"content")).await.unwrap();

    a.flush().await.unwrap();

    let a_cid = a.get_node().await.unwrap().cid();
    let root_node = store.get(&root.root_cid()).await.unwrap();
    let link = root_node
        .links()
        .iter()
        .find(|l| l.name == "a")
        .expect("root node links 'a'");
    assert_eq!(link.cid, a_cid);
}

/// An unflushed mkdir is invisible at the root until flush.
#[tokio::test]
async fn root_cid_moves_only_on_propagation() {
    let (root, _store) = empty_root().await;
    let before = root.root_cid();

    root.dir().mkdir("a").await.unwrap();
    assert_eq!(root.root_cid(), before, "mkdir alone must not move the root");

    root.flush().await.unwrap();
    assert_ne!(root.root_cid(), before);
}

/// File metadata edits propagate to the root without an explicit flush.
#[tokio::test]
async fn file_set_mode_propagates_to_the_root() {
    let (root, store) = empty_root().await;
    let a = root.dir().mkdir("a").await.unwrap();
    a.add_child("f", file_node(b"data")).await.unwrap();
    root.flush().await.unwrap();
    let before = root.root_cid();

    let f = a.child("f").await.unwrap();
    f.set_mode(0o644).await.unwrap();

    assert_ne!(root.root_cid(), before);

    // The stamped mode is reachable from the new root.
    let reopened = Root::new(store.clone(), store.get(&root.root_cid()).await.unwrap())
        .await
        .unwrap();
    let walked = reopened.lookup("/a/f").await.unwrap();
    let proto = walked.get_node().await.unwrap().into_proto().unwrap();
    assert_eq!(UnixfsData::decode(proto.data()).unwrap().mode, Some(0o644));
}

/// A raw leaf stamped with metadata is re-expressed as a protobuf file of
/// the same content and size.
#[tokio::test]
async fn stamping_a_raw_leaf_rewrites_it_as_a_file_node() {
    let (root, _store) = empty_root().await;
    root.dir().add_child("leaf", raw_node(b"12345")).await.unwrap();

    let leaf = root.dir().child("leaf").await.unwrap();
    let file = leaf.as_file().unwrap();
    file.set_mode(0o600).await.unwrap();

    assert_eq!(file.size().await.unwrap(), 5);
    let proto = file.get_node().await.unwrap().into_proto().unwrap();
    let data = UnixfsData::decode(proto.data()).unwrap();
    assert_eq!(data.mode, Some(0o600));
    assert_eq!(&data.content[..], b"12345");
}

/// Directory metadata edits propagate and the directory keeps working
/// against its replaced backing state.
#[tokio::test]
async fn dir_set_mode_propagates_and_the_dir_stays_usable() {
    let (root, _store) = empty_root().await;
    let a = root.dir().mkdir("a").await.unwrap();
    a.mkdir("keep").await.unwrap();
    root.flush().await.unwrap();
    let before = root.root_cid();

    a.set_mode(0o750).await.unwrap();
    assert_ne!(root.root_cid(), before);

    a.mkdir("more").await.unwrap();
    let mut names = a.list_names().await.unwrap();
    names.sort();
    assert_eq!(names, ["keep", "more"]);
}

/// Overlay handles kept past the root's lifetime fail `Detached`.
#[tokio::test]
async fn operations_on_a_dropped_tree_fail_detached() {
    let (root, _store) = empty_root().await;
    let a = root.dir().mkdir("a").await.unwrap();
    drop(root);

    assert!(matches!(a.flush().await.unwrap_err(), MfsError::Detached));
    assert!(matches!(a.path().unwrap_err(), MfsError::Detached));
}

/// Closing the root cancels store-touching operations tree-wide.
#[tokio::test]
async fn close_cancels_the_tree() {
    let (root, _store) = empty_root().await;
    let a = root.dir().mkdir("a").await.unwrap();

    root.close();

    assert!(matches!(
        a.mkdir("x").await.unwrap_err(),
        MfsError::Cancelled
    ));
    assert!(matches!(
        root.dir().child("a").await.unwrap_err(),
        MfsError::Cancelled
    ));
    assert!(matches!(
        root.dir().list_names().await.unwrap_err(),
        MfsError::Cancelled
    ));
}

/// Re-opening over a non-directory node is rejected.
#[tokio::test]
async fn root_requires_a_directory_node() {
    let store = Arc::new(dag_fs::MemDagStore::new());
    let err = Root::new(store.clone(), file_node(b"not a dir"))
        .await
        .unwrap_err();
    assert!(matches!(err, MfsError::Malformed(_)));

    let err = Root::new(store, raw_node(b"leaf")).await.unwrap_err();
    assert!(matches!(err, MfsError::NotProtobuf));
}
