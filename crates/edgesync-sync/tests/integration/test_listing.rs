//! Integration tests for paginated listings

use edgesync_core::{domain::records::RemoteObject, ports::object_store::ListPage};
use edgesync_sync::listing::{list_all_objects, list_folders};
use edgesync_sync::SyncError;

use crate::common::{key, prefix, MemoryStore};

fn page(keys: &[&str], truncated: bool, marker: Option<&str>) -> ListPage {
    ListPage {
        items: keys.iter().map(|k| RemoteObject::new(key(k), 1)).collect(),
        truncated,
        next_marker: marker.map(str::to_string),
        common_prefixes: Vec::new(),
    }
}

#[tokio::test]
async fn test_three_pages_with_and_without_markers() {
    let store = MemoryStore::new();
    store.script_pages(vec![
        page(&["p/a", "p/b"], true, Some("p/b")),
        page(&["p/c"], true, None),
        page(&["p/d"], false, None),
    ]);

    let objects = list_all_objects(store.as_ref(), "p/").await.unwrap();

    let keys: Vec<_> = objects.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["p/a", "p/b", "p/c", "p/d"]);

    let markers: Vec<_> = store
        .list_requests()
        .into_iter()
        .map(|r| r.marker)
        .collect();
    assert_eq!(
        markers,
        vec![None, Some("p/b".to_string()), Some("p/c".to_string())]
    );
}

#[tokio::test]
async fn test_truncated_empty_page_ends_listing() {
    let store = MemoryStore::new();
    store.script_pages(vec![page(&["p/a"], true, Some("p/a")), page(&[], true, None)]);

    let objects = list_all_objects(store.as_ref(), "p/").await.unwrap();

    assert_eq!(objects.len(), 1);
    assert_eq!(store.list_requests().len(), 2);
}

#[tokio::test]
async fn test_generated_pages_cover_store() {
    let store = MemoryStore::new();
    for i in 0..5 {
        store.insert(&format!("p/{i}"), vec![0u8; i]);
    }
    store.insert("q/other", b"x".to_vec());
    store.set_page_size(2);

    let objects = list_all_objects(store.as_ref(), "p/").await.unwrap();

    assert_eq!(objects.len(), 5);
    assert_eq!(objects[&key("p/4")].size, 4);
    assert_eq!(store.list_requests().len(), 3);
}

#[tokio::test]
async fn test_listing_error_is_not_an_empty_result() {
    let store = MemoryStore::new();
    store.insert("p/a", b"a".to_vec());
    store.fail_listing();

    let result = list_all_objects(store.as_ref(), "p/").await;

    assert!(matches!(result, Err(SyncError::Listing(_))));
}

#[tokio::test]
async fn test_list_folders_one_level() {
    let store = MemoryStore::new();
    store.insert("site/index.html", b"i".to_vec());
    store.insert("site/css/main.css", b"c".to_vec());
    store.insert("site/js/app.js", b"j".to_vec());
    store.insert("site/js/vendor/lib.js", b"l".to_vec());
    store.insert("other/x", b"x".to_vec());

    let folders = list_folders(store.as_ref(), &prefix("site")).await.unwrap();

    assert_eq!(folders, vec!["site/css/", "site/js/"]);
}
