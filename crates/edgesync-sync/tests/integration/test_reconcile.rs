//! Integration tests for consistency-gated deletion

use edgesync_core::domain::ledger::Ledger;
use edgesync_sync::{SyncError, SyncRequest};
use tempfile::TempDir;

use crate::common::{self, entry_for, key, prefix, write_file, MemoryStore};

/// Store with `site/x` and `site/y` tracked and in place
fn tracked_store() -> std::sync::Arc<MemoryStore> {
    let store = MemoryStore::new();
    let ledger: Ledger = [
        (key("site/x"), entry_for(b"xx")),
        (key("site/y"), entry_for(b"yyy")),
    ]
    .into_iter()
    .collect();
    store.insert_ledger("site.meta.json", &ledger);
    store.insert("site/x", b"xx".to_vec());
    store.insert("site/y", b"yyy".to_vec());
    store
}

#[tokio::test]
async fn test_deletes_only_untracked_objects() {
    let store = tracked_store();
    store.insert("site/z", b"zzzz".to_vec());
    store.insert("site/old.meta.json", b"{}".to_vec());
    store.insert("other/keep", b"k".to_vec());

    let request = SyncRequest::new(prefix("site")).with_delete(true);
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.delete_failed, 0);
    assert_eq!(store.deletes(), vec!["site/z"]);
    assert!(store.object("site/old.meta.json").is_some());
    assert!(store.object("other/keep").is_some());
    assert!(store.object("site.meta.json").is_some());
}

#[tokio::test]
async fn test_size_mismatch_blocks_every_delete() {
    let store = tracked_store();
    store.insert("site/y", b"yyyy".to_vec());
    store.insert("site/z", b"zzzz".to_vec());

    let request = SyncRequest::new(prefix("site")).with_delete(true);
    let result = common::synchronizer(&store).sync(&request).await;

    let report = match result {
        Err(SyncError::Consistency(report)) => report,
        other => panic!("expected consistency failure, got {other:?}"),
    };
    assert!(report.missing.is_empty());
    assert_eq!(report.size_mismatch.len(), 1);
    assert_eq!(report.size_mismatch[0].key, key("site/y"));
    assert_eq!(report.size_mismatch[0].ledger_size, 3);
    assert_eq!(report.size_mismatch[0].remote_size, 4);
    assert!(store.deletes().is_empty());
}

#[tokio::test]
async fn test_missing_object_blocks_every_delete() {
    let store = MemoryStore::new();
    let ledger: Ledger = [
        (key("site/x"), entry_for(b"xx")),
        (key("site/lost"), entry_for(b"l")),
    ]
    .into_iter()
    .collect();
    store.insert_ledger("site.meta.json", &ledger);
    store.insert("site/x", b"xx".to_vec());
    store.insert("site/z", b"z".to_vec());

    let request = SyncRequest::new(prefix("site")).with_delete(true);
    let result = common::synchronizer(&store).sync(&request).await;

    match result {
        Err(SyncError::Consistency(report)) => {
            assert_eq!(report.missing, vec![key("site/lost")]);
            assert!(report.to_string().contains("1 missing"));
        }
        other => panic!("expected consistency failure, got {other:?}"),
    }
    assert!(store.deletes().is_empty());
}

#[tokio::test]
async fn test_listing_failure_aborts_without_deleting() {
    let store = tracked_store();
    store.insert("site/z", b"z".to_vec());
    store.fail_listing();

    let request = SyncRequest::new(prefix("site")).with_delete(true);
    let result = common::synchronizer(&store).sync(&request).await;

    assert!(matches!(result, Err(SyncError::Listing(_))));
    assert!(store.deletes().is_empty());
}

#[tokio::test]
async fn test_delete_after_upload_uses_fresh_ledger() {
    let store = MemoryStore::new();
    store.insert("site/stale.js", b"old".to_vec());
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "app.js", b"new");

    let request = SyncRequest::new(prefix("site"))
        .with_local_dir(dir.path())
        .with_delete(true);
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(store.deletes(), vec!["site/stale.js"]);
    assert!(store.object("site/app.js").is_some());
}

#[tokio::test]
async fn test_root_prefix_keeps_ledger_document() {
    let store = MemoryStore::new();
    let ledger: Ledger = [(key("a.txt"), entry_for(b"a"))].into_iter().collect();
    store.insert_ledger(".meta.json", &ledger);
    store.insert("a.txt", b"a".to_vec());
    store.insert("b.txt", b"b".to_vec());

    let request = SyncRequest::new(prefix("")).with_delete(true);
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(store.deletes(), vec!["b.txt"]);
    assert!(store.object(".meta.json").is_some());
}

#[tokio::test]
async fn test_paginated_listing_reaches_every_extra() {
    let store = tracked_store();
    for i in 0..7 {
        store.insert(&format!("site/extra-{i}"), b"e".to_vec());
    }
    store.set_page_size(2);

    let request = SyncRequest::new(prefix("site")).with_delete(true);
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.deleted, 7);
    assert_eq!(store.keys(), vec!["site.meta.json", "site/x", "site/y"]);
}

#[tokio::test]
async fn test_failed_delete_does_not_stop_the_batch() {
    let store = tracked_store();
    store.insert("site/z1", b"z".to_vec());
    store.insert("site/z2", b"z".to_vec());
    store.fail_delete("site/z1");

    let request = SyncRequest::new(prefix("site")).with_delete(true);
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.delete_failed, 1);
    assert_eq!(store.deletes(), vec!["site/z2"]);
    assert!(store.object("site/z1").is_some());
    assert!(store.object("site/z2").is_none());
}

#[tokio::test]
async fn test_damaged_ledger_entry_still_gates_deletion() {
    let store = MemoryStore::new();
    let md5 = entry_for(b"xx").md5.unwrap();
    let body = format!(
        r#"{{"site/x":{{"size":2,"md5":"{md5}","etag":"{md5}"}},"site/odd.bin":{{"size":"n/a"}}}}"#
    );
    store.insert("site.meta.json", body.into_bytes());
    store.insert("site/x", b"xx".to_vec());
    store.insert("site/odd.bin", b"odd!".to_vec());
    store.insert("site/z", b"z".to_vec());

    let request = SyncRequest::new(prefix("site")).with_delete(true);
    let result = common::synchronizer(&store).sync(&request).await;

    match result {
        Err(SyncError::Consistency(report)) => {
            assert!(report.missing.is_empty());
            assert_eq!(report.size_mismatch.len(), 1);
            assert_eq!(report.size_mismatch[0].key, key("site/odd.bin"));
            assert_eq!(report.size_mismatch[0].ledger_size, 0);
            assert_eq!(report.size_mismatch[0].remote_size, 4);
        }
        other => panic!("expected consistency failure, got {other:?}"),
    }
    assert!(store.deletes().is_empty());
    assert!(store.object("site/odd.bin").is_some());
}
