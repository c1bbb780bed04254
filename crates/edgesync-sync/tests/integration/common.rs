//! Shared test helpers for sync integration tests
//!
//! Provides an in-memory [`IObjectStore`] with call tracking and failure
//! injection, plus small local-tree builders.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::anyhow;
use edgesync_core::{
    domain::{
        ledger::{Ledger, LedgerEntry},
        newtypes::{KeyPrefix, ObjectKey},
        records::RemoteObject,
    },
    ports::object_store::{IObjectStore, ListPage, ListRequest, PutBody, PutOptions, PutReceipt},
};
use edgesync_sync::hash_cache::hash_bytes;
use edgesync_sync::ledger::{parse_ledger, serialize_ledger};
use edgesync_sync::{SyncSettings, Synchronizer};

/// An object held by [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub etag: String,
    pub metadata: BTreeMap<String, String>,
}

/// In-memory object store
///
/// Etags follow the usual S3 shape: the body MD5 for single-part puts and
/// `<md5>-<parts>` when the body exceeds the part size.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    page_size: Mutex<Option<usize>>,
    scripted_pages: Mutex<VecDeque<ListPage>>,
    fail_puts: Mutex<BTreeSet<String>>,
    fail_deletes: Mutex<BTreeSet<String>>,
    fail_get: AtomicBool,
    fail_list: AtomicBool,
    puts: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    list_requests: Mutex<Vec<ListRequest>>,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store an object directly, bypassing call tracking
    pub fn insert(&self, key: &str, body: impl Into<Vec<u8>>) {
        let body = body.into();
        let etag = hash_bytes(&body).unwrap().to_string();
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                etag,
                metadata: BTreeMap::new(),
            },
        );
    }

    /// Store a ledger document
    pub fn insert_ledger(&self, key: &str, ledger: &Ledger) {
        self.insert(key, serialize_ledger(ledger).unwrap());
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Parse the ledger document stored at `key`
    pub fn ledger(&self, key: &str) -> Ledger {
        let object = self.object(key).expect("ledger document missing");
        parse_ledger(&object.body).expect("ledger document invalid")
    }

    /// Limit generated listing pages to `n` items
    pub fn set_page_size(&self, n: usize) {
        *self.page_size.lock().unwrap() = Some(n);
    }

    /// Serve these pages, in order, before falling back to generated ones
    pub fn script_pages(&self, pages: Vec<ListPage>) {
        self.scripted_pages.lock().unwrap().extend(pages);
    }

    pub fn fail_put(&self, key: &str) {
        self.fail_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.fail_deletes.lock().unwrap().insert(key.to_string());
    }

    /// Make every download fail as a transport error
    pub fn fail_downloads(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        self.fail_puts.lock().unwrap().clear();
        self.fail_deletes.lock().unwrap().clear();
        self.fail_get.store(false, Ordering::SeqCst);
        self.fail_list.store(false, Ordering::SeqCst);
    }

    pub fn fail_listing(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    /// Keys of successful puts, in completion order
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        self.puts.lock().unwrap().clear();
        self.deletes.lock().unwrap().clear();
        self.list_requests.lock().unwrap().clear();
    }

    pub fn deletes(&self) -> Vec<String> {
        let mut deletes = self.deletes.lock().unwrap().clone();
        deletes.sort();
        deletes
    }

    pub fn list_requests(&self) -> Vec<ListRequest> {
        self.list_requests.lock().unwrap().clone()
    }

    fn generated_page(&self, request: &ListRequest) -> ListPage {
        let objects = self.objects.lock().unwrap();
        let page_size = self
            .page_size
            .lock()
            .unwrap()
            .unwrap_or(request.max_keys as usize);

        let mut page = ListPage::default();
        let mut prefixes = BTreeSet::new();
        let candidates = objects
            .iter()
            .filter(|(k, _)| k.starts_with(&request.prefix))
            .filter(|(k, _)| request.marker.as_deref().map_or(true, |m| k.as_str() > m));

        for (key, object) in candidates {
            if page.items.len() + prefixes.len() >= page_size {
                page.truncated = true;
                break;
            }
            let rest = &key[request.prefix.len()..];
            if let Some(delim) = request.delimiter.as_deref() {
                if let Some(pos) = rest.find(delim) {
                    prefixes.insert(format!("{}{}", request.prefix, &rest[..pos + delim.len()]));
                    continue;
                }
            }
            page.items.push(
                RemoteObject::new(key.parse().unwrap(), object.body.len() as u64)
                    .with_etag(format!("\"{}\"", object.etag)),
            );
        }

        page.common_prefixes = prefixes.into_iter().collect();
        if page.truncated {
            page.next_marker = page.items.last().map(|o| o.key.to_string());
        }
        page
    }
}

#[async_trait::async_trait]
impl IObjectStore for MemoryStore {
    async fn list_objects(&self, request: &ListRequest) -> anyhow::Result<ListPage> {
        self.list_requests.lock().unwrap().push(request.clone());
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("listing unavailable"));
        }
        if let Some(page) = self.scripted_pages.lock().unwrap().pop_front() {
            return Ok(page);
        }
        Ok(self.generated_page(request))
    }

    async fn get_object(&self, key: &ObjectKey) -> anyhow::Result<Option<Vec<u8>>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(anyhow!("download unavailable"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key.as_str())
            .map(|o| o.body.clone()))
    }

    async fn put_object(
        &self,
        key: &ObjectKey,
        body: PutBody,
        options: &PutOptions,
    ) -> anyhow::Result<PutReceipt> {
        if self.fail_puts.lock().unwrap().contains(key.as_str()) {
            return Err(anyhow!("injected put failure for {key}"));
        }

        let body = match body {
            PutBody::File(path) => std::fs::read(path)?,
            PutBody::Bytes(bytes) => bytes,
        };
        let md5 = hash_bytes(&body)?.to_string();
        let part_size = options.part_size.max(1);
        let etag = if body.len() as u64 > part_size {
            let parts = (body.len() as u64 + part_size - 1) / part_size;
            format!("{md5}-{parts}")
        } else {
            md5
        };

        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                etag: etag.clone(),
                metadata: options.metadata.clone(),
            },
        );
        self.puts.lock().unwrap().push(key.to_string());
        Ok(PutReceipt {
            etag: Some(format!("\"{etag}\"")),
        })
    }

    async fn delete_object(&self, key: &ObjectKey) -> anyhow::Result<()> {
        if self.fail_deletes.lock().unwrap().contains(key.as_str()) {
            return Err(anyhow!("injected delete failure for {key}"));
        }
        self.objects.lock().unwrap().remove(key.as_str());
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Settings tuned for tests: small parts and no progress throttling
#[allow(dead_code)]
pub fn test_settings() -> SyncSettings {
    SyncSettings {
        threads: 4,
        hash_chunk_bytes: 1024,
        part_size: 1024,
        progress_interval: Duration::from_millis(0),
        ..SyncSettings::default()
    }
}

#[allow(dead_code)]
pub fn synchronizer(store: &Arc<MemoryStore>) -> Synchronizer {
    Synchronizer::new(store.clone(), test_settings())
}

/// Write `contents` to `root/rel`, creating parent directories
#[allow(dead_code)]
pub fn write_file(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
}

/// Rewrite a file and move its mtime so a cached hash no longer applies
#[allow(dead_code)]
pub fn rewrite_file(root: &Path, rel: &str, contents: &[u8], mtime_offset_secs: u64) {
    let path = root.join(rel);
    std::fs::write(&path, contents).unwrap();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(mtime_offset_secs))
        .unwrap();
}

/// Ledger entry carrying the true digest of `contents`
#[allow(dead_code)]
pub fn entry_for(contents: &[u8]) -> LedgerEntry {
    LedgerEntry::uploaded(contents.len() as u64, &hash_bytes(contents).unwrap(), None)
}

#[allow(dead_code)]
pub fn key(s: &str) -> ObjectKey {
    s.parse().unwrap()
}

#[allow(dead_code)]
pub fn prefix(s: &str) -> KeyPrefix {
    KeyPrefix::new(s)
}
