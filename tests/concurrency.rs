//! Concurrent access: per-directory serialization, cross-directory
//! parallelism, and cache identity under racing lookups.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use dag_fs::{DagStore, MfsError, Root};

use common::{empty_root, file_node};

/// Writers in unrelated subtrees make progress in parallel and both
/// edits survive the flush.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unrelated_writes_both_land() {
    let (root, store) = empty_root().await;
    let left = root.dir().mkdir("left").await.unwrap();
    let right = root.dir().mkdir("right").await.unwrap();

    let l = tokio::spawn({
        let left = Arc::clone(&left);
        async move { left.mkdir("x").await.map(|_| ()) }
    });
    let r = tokio::spawn({
        let right = Arc::clone(&right);
        async move { right.mkdir("y").await.map(|_| ()) }
    });
    l.await.unwrap().unwrap();
    r.await.unwrap().unwrap();

    root.flush().await.unwrap();

    let mut names = root.dir().list_names().await.unwrap();
    names.sort();
    assert_eq!(names, ["left", "right"]);

    // Both leaves are reachable from the new root CID.
    let reopened = Root::new(store.clone(), store.get(&root.root_cid()).await.unwrap())
        .await
        .unwrap();
    assert!(reopened.lookup("/left/x").await.unwrap().as_dir().is_some());
    assert!(reopened.lookup("/right/y").await.unwrap().as_dir().is_some());
}

/// Racing lookups of one name all land on the same overlay instance.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_lookups_share_one_overlay() {
    let (root, _store) = empty_root().await;
    root.dir().add_child("f", file_node(b"data")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let dir = Arc::clone(root.dir());
        handles.push(tokio::spawn(async move {
            dir.child("f").await.unwrap()
        }));
    }

    let mut files = Vec::new();
    for h in handles {
        files.push(h.await.unwrap());
    }
    let first = files[0].as_file().unwrap();
    for entry in &files[1..] {
        assert!(
            Arc::ptr_eq(first, entry.as_file().unwrap()),
            "every racing lookup must return the cached overlay"
        );
    }
}

/// Racing mkdirs of one name produce exactly one winner; the losers all
/// observe the winner's overlay.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_mkdirs_have_one_winner() {
    let (root, _store) = empty_root().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let dir = Arc::clone(root.dir());
        handles.push(tokio::spawn(async move { dir.mkdir("dup").await }));
    }

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(d) => winners.push(d),
            Err(MfsError::AlreadyExists { existing, .. }) => {
                losers.push(existing.expect("collision with a directory"))
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), 7);
    for loser in &losers {
        assert!(Arc::ptr_eq(loser.as_dir().unwrap(), &winners[0]));
    }
    assert_eq!(root.dir().list_names().await.unwrap(), ["dup"]);
}

/// Flushes racing mutations in other subtrees neither deadlock nor lose
/// updates: every edit is visible after the final flush.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn flush_races_with_writers_without_losing_updates() {
    let (root, store) = empty_root().await;
    let mut dirs = Vec::new();
    for i in 0..4 {
        dirs.push(root.dir().mkdir(&format!("d{i}")).await.unwrap());
    }

    let mut handles = Vec::new();
    for (i, dir) in dirs.iter().enumerate() {
        let dir = Arc::clone(dir);
        handles.push(tokio::spawn(async move {
            for j in 0..4 {
                dir.add_child(&format!("f{i}-{j}"), file_node(format!("{i}/{j}").as_bytes()))
                    .await
                    .unwrap();
            }
        }));
        let root = Arc::clone(&root);
        handles.push(tokio::spawn(async move {
            // Interleaved flushes must stay consistent, whatever subset of
            // the writes they observe.
            root.flush().await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    root.flush().await.unwrap();

    let reopened = Root::new(store.clone(), store.get(&root.root_cid()).await.unwrap())
        .await
        .unwrap();
    for i in 0..4 {
        for j in 0..4 {
            let walked = reopened.lookup(&format!("/d{i}/f{i}-{j}")).await.unwrap();
            assert!(walked.as_file().is_some());
        }
    }
}
