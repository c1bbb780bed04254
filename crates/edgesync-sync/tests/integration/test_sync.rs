//! Integration tests for scan, diff, upload and ledger maintenance

use edgesync_core::domain::ledger::{Ledger, LedgerEntry};
use edgesync_sync::SyncRequest;
use tempfile::TempDir;

use crate::common::{self, entry_for, key, prefix, rewrite_file, write_file, MemoryStore};

#[tokio::test]
async fn test_new_files_are_uploaded_and_recorded() {
    let store = MemoryStore::new();
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "index.html", b"<html></html>");
    write_file(dir.path(), "assets/app.js", b"console.log(1)");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.scanned_local, 2);
    assert_eq!(summary.to_upload, 2);
    assert_eq!(summary.uploaded, 2);
    assert_eq!(summary.upload_failed, 0);
    assert!(summary.ledger_saved);

    let ledger = store.ledger("site.meta.json");
    assert_eq!(ledger.len(), 2);
    assert_eq!(
        ledger.get(&key("site/index.html")),
        Some(&entry_for(b"<html></html>"))
    );
    assert!(ledger.contains(&key("site/assets/app.js")));

    let stored = store.object("site/assets/app.js").unwrap();
    assert_eq!(stored.body, b"console.log(1)");
    assert_eq!(
        stored.metadata.get("md5").map(String::as_str),
        entry_for(b"console.log(1)").md5.as_deref()
    );
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let store = MemoryStore::new();
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"alpha");
    write_file(dir.path(), "b/c.txt", b"gamma");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let sync = common::synchronizer(&store);
    sync.sync(&request).await.unwrap();
    store.reset_calls();

    let summary = sync.sync(&request).await.unwrap();

    assert_eq!(summary.to_upload, 0);
    assert_eq!(summary.uploaded, 0);
    assert!(!summary.ledger_saved);
    assert_eq!(summary.ledger_entries, 2);
    assert!(store.puts().is_empty());
}

#[tokio::test]
async fn test_existing_ledger_only_new_file_uploaded() {
    let store = MemoryStore::new();
    let ledger: Ledger = [(key("p/a.txt"), entry_for(b"hello"))].into_iter().collect();
    store.insert_ledger("p.meta.json", &ledger);
    store.insert("p/a.txt", b"hello".to_vec());

    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"hello");
    write_file(dir.path(), "b.txt", b"world!");

    let request = SyncRequest::new(prefix("p")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.scanned_remote, 1);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(store.puts(), vec!["p/b.txt", "p.meta.json"]);

    let saved = store.ledger("p.meta.json");
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.get(&key("p/b.txt")), Some(&entry_for(b"world!")));
}

#[tokio::test]
async fn test_touched_file_is_rehashed_not_reuploaded() {
    let store = MemoryStore::new();
    let dir = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let cache_path = cache.path().join("hashes.json");
    write_file(dir.path(), "a.txt", b"12345");

    let request = SyncRequest::new(prefix("site"))
        .with_local_dir(dir.path())
        .with_hash_cache(Some(cache_path.clone()));
    let sync = common::synchronizer(&store);
    sync.sync(&request).await.unwrap();
    assert!(cache_path.exists());
    store.reset_calls();

    // Same bytes, new mtime: the cached hash is stale, the fresh one matches.
    rewrite_file(dir.path(), "a.txt", b"12345", 100);
    let summary = sync.sync(&request).await.unwrap();
    assert_eq!(summary.uploaded, 0);
    assert_eq!(summary.hashed_bytes, 5);
    assert!(store.puts().is_empty());

    // Same size, different bytes.
    rewrite_file(dir.path(), "a.txt", b"54321", 200);
    let summary = sync.sync(&request).await.unwrap();
    assert_eq!(summary.uploaded, 1);
    assert_eq!(store.object("site/a.txt").unwrap().body, b"54321");
    assert_eq!(
        store.ledger("site.meta.json").get(&key("site/a.txt")),
        Some(&entry_for(b"54321"))
    );
}

#[tokio::test]
async fn test_multipart_etag_without_md5_forces_upload() {
    let store = MemoryStore::new();
    let body = vec![7u8; 3000];
    let entry = LedgerEntry {
        size: 3000,
        md5: None,
        etag: Some(format!("{}-3", entry_for(&body).md5.unwrap())),
        extra: Default::default(),
    };
    let ledger: Ledger = [(key("site/big.bin"), entry)].into_iter().collect();
    store.insert_ledger("site.meta.json", &ledger);

    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "big.bin", &body);

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let sync = common::synchronizer(&store);
    let summary = sync.sync(&request).await.unwrap();
    assert_eq!(summary.uploaded, 1);

    // The store reports a multipart etag; the recorded md5 keeps the next
    // run from re-uploading.
    let saved = store.ledger("site.meta.json");
    let recorded = saved.get(&key("site/big.bin")).unwrap();
    assert!(recorded.etag().unwrap().ends_with("-3"));
    assert_eq!(recorded.md5, entry_for(&body).md5);

    let summary = sync.sync(&request).await.unwrap();
    assert_eq!(summary.uploaded, 0);
}

#[tokio::test]
async fn test_single_part_etag_without_md5_is_trusted() {
    let store = MemoryStore::new();
    let digest = entry_for(b"abc").md5.unwrap();
    let entry = LedgerEntry {
        size: 3,
        md5: None,
        etag: Some(format!("\"{digest}\"")),
        extra: Default::default(),
    };
    let ledger: Ledger = [(key("site/a.txt"), entry)].into_iter().collect();
    store.insert_ledger("site.meta.json", &ledger);

    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"abc");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.uploaded, 0);
    assert!(!summary.ledger_saved);
}

#[tokio::test]
async fn test_manifests_upload_after_content() {
    let store = MemoryStore::new();
    let dir = TempDir::new().unwrap();
    for name in ["a.js", "b.css", "c.html", "d/e.png"] {
        write_file(dir.path(), name, name.as_bytes());
    }
    write_file(dir.path(), "app.version", b"1");
    write_file(dir.path(), "d/assets.version", b"2");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();
    assert_eq!(summary.uploaded, 6);

    let puts = store.puts();
    let position = |k: &str| puts.iter().position(|p| p == k).unwrap();
    let last_content = ["site/a.js", "site/b.css", "site/c.html", "site/d/e.png"]
        .iter()
        .map(|k| position(k))
        .max()
        .unwrap();
    assert!(position("site/app.version") > last_content);
    assert!(position("site/d/assets.version") > last_content);
    assert_eq!(puts.last().map(String::as_str), Some("site.meta.json"));
}

#[tokio::test]
async fn test_failed_upload_leaves_ledger_entry_untouched() {
    let store = MemoryStore::new();
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"aaa");
    write_file(dir.path(), "b.txt", b"bbb");
    store.fail_put("site/b.txt");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let sync = common::synchronizer(&store);
    let summary = sync.sync(&request).await.unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.upload_failed, 1);
    assert_eq!(summary.failures[0].key, "site/b.txt");
    assert!(summary.failures[0].error.contains("injected"));
    assert_eq!(summary.total_bytes, 3);

    let ledger = store.ledger("site.meta.json");
    assert!(ledger.contains(&key("site/a.txt")));
    assert!(!ledger.contains(&key("site/b.txt")));

    // The failed file is picked up again on the next run.
    store.clear_failures();
    store.reset_calls();
    let summary = sync.sync(&request).await.unwrap();
    assert_eq!(summary.uploaded, 1);
    assert_eq!(store.puts(), vec!["site/b.txt", "site.meta.json"]);
}

#[tokio::test]
async fn test_unreadable_ledger_is_rebuilt() {
    let store = MemoryStore::new();
    store.insert("site.meta.json", b"{not json".to_vec());
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"aaa");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.scanned_remote, 0);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(store.ledger("site.meta.json").len(), 1);
}

#[tokio::test]
async fn test_ledger_download_error_starts_from_empty() {
    let store = MemoryStore::new();
    store.insert_ledger(
        "site.meta.json",
        &[(key("site/old.txt"), entry_for(b"old"))].into_iter().collect(),
    );
    store.fail_downloads();
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"aaa");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.scanned_remote, 0);
    assert_eq!(summary.uploaded, 1);
    assert!(summary.ledger_saved);
    let saved = store.ledger("site.meta.json");
    assert_eq!(saved.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["site/a.txt"]);
}

#[tokio::test]
async fn test_damaged_entry_survives_ledger_rewrite() {
    let store = MemoryStore::new();
    let md5 = entry_for(b"aaa").md5.unwrap();
    let body = format!(
        r#"{{"site/a.txt":{{"size":3,"md5":"{md5}","etag":"{md5}"}},"site/odd.bin":{{"size":"n/a","owner":"ops"}}}}"#
    );
    store.insert("site.meta.json", body.into_bytes());
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"aaa");
    write_file(dir.path(), "c.txt", b"ccc");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.scanned_remote, 2);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(store.puts(), vec!["site/c.txt", "site.meta.json"]);

    let saved = store.ledger("site.meta.json");
    assert_eq!(saved.len(), 3);
    let odd = saved.get(&key("site/odd.bin")).unwrap();
    assert_eq!(odd.size, 0);
    assert_eq!(odd.extra["owner"], "ops");
}

#[tokio::test]
async fn test_reupload_keeps_foreign_entry_fields() {
    let store = MemoryStore::new();
    let mut old = entry_for(b"old");
    old.extra
        .insert("lastModified".to_string(), serde_json::json!("2024-01-01"));
    let ledger: Ledger = [(key("site/a.txt"), old)].into_iter().collect();
    store.insert_ledger("site.meta.json", &ledger);
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"newer");

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.uploaded, 1);
    let saved = store.ledger("site.meta.json");
    let entry = saved.get(&key("site/a.txt")).unwrap();
    assert_eq!(entry.size, 5);
    assert_eq!(entry.md5, entry_for(b"newer").md5);
    assert_eq!(entry.extra["lastModified"], "2024-01-01");
}

#[tokio::test]
async fn test_prune_drops_entries_for_deleted_files() {
    let store = MemoryStore::new();
    let ledger: Ledger = [
        (key("site/a.txt"), entry_for(b"aaa")),
        (key("site/gone.txt"), entry_for(b"old")),
    ]
    .into_iter()
    .collect();
    store.insert_ledger("site.meta.json", &ledger);

    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"aaa");

    let request = SyncRequest::new(prefix("site"))
        .with_local_dir(dir.path())
        .with_prune(true);
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.uploaded, 0);
    assert_eq!(summary.pruned, 1);
    assert!(summary.ledger_saved);
    let saved = store.ledger("site.meta.json");
    assert_eq!(saved.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["site/a.txt"]);
}

#[tokio::test]
async fn test_without_prune_entries_are_kept() {
    let store = MemoryStore::new();
    let ledger: Ledger = [(key("site/gone.txt"), entry_for(b"old"))]
        .into_iter()
        .collect();
    store.insert_ledger("site.meta.json", &ledger);
    let dir = TempDir::new().unwrap();

    let request = SyncRequest::new(prefix("site")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.pruned, 0);
    assert!(!summary.ledger_saved);
    assert_eq!(summary.ledger_entries, 1);
}

#[tokio::test]
async fn test_local_file_named_like_ledger_is_skipped() {
    let store = MemoryStore::new();
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), ".meta.json", b"{}");
    write_file(dir.path(), "a.txt", b"aaa");

    let request = SyncRequest::new(prefix("")).with_local_dir(dir.path());
    let summary = common::synchronizer(&store).sync(&request).await.unwrap();

    assert_eq!(summary.scanned_local, 1);
    assert_eq!(summary.uploaded, 1);
    let ledger = store.ledger(".meta.json");
    assert_eq!(ledger.len(), 1);
    assert!(ledger.contains(&key("a.txt")));
}

#[tokio::test]
async fn test_missing_local_dir_fails_before_upload() {
    let store = MemoryStore::new();
    let request = SyncRequest::new(prefix("site")).with_local_dir("/nonexistent/edgesync/site");

    let result = common::synchronizer(&store).sync(&request).await;

    assert!(matches!(result, Err(edgesync_sync::SyncError::Scan(_))));
    assert!(store.puts().is_empty());
}
