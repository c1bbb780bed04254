//! Persistent content-hash cache
//!
//! Maps a file identity `"<path>|<mtime seconds>|<size>"` to the file's hex
//! MD5. A changed mtime or size produces a different identity, so a stale
//! hash can never be returned for a modified file.
//!
//! The cache file is a flat JSON object. Loading and saving are best-effort:
//! a missing or corrupt file yields an empty cache, and a failed save only
//! costs rehashing on the next run.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use edgesync_core::domain::{errors::DomainError, newtypes::ContentHash};
use md5::{Digest, Md5};
use tracing::{debug, info, warn};

/// Hash of a file together with the stat it was taken under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub md5: ContentHash,
    pub size: u64,
    pub mtime: i64,
    /// True when served from the cache without reading the file
    pub cached: bool,
}

/// Identity-keyed MD5 cache shared by diff and upload workers
#[derive(Debug)]
pub struct HashCache {
    entries: Mutex<HashMap<String, String>>,
    chunk_size: usize,
}

impl HashCache {
    /// Create an empty cache hashing with reads of `chunk_size` bytes
    pub fn new(chunk_size: usize) -> Self {
        Self::from_entries(HashMap::new(), chunk_size)
    }

    pub fn from_entries(entries: HashMap<String, String>, chunk_size: usize) -> Self {
        Self {
            entries: Mutex::new(entries),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Load the cache file at `path`
    ///
    /// Never fails: an absent file or one that is not a JSON object of
    /// strings gives an empty cache.
    pub fn load(path: &Path, chunk_size: usize) -> Self {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Hash cache not found, starting empty");
                return Self::new(chunk_size);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read hash cache");
                return Self::new(chunk_size);
            }
        };

        match serde_json::from_slice::<HashMap<String, String>>(&content) {
            Ok(entries) => {
                info!(path = %path.display(), entries = entries.len(), "Loaded hash cache");
                Self::from_entries(entries, chunk_size)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse hash cache");
                Self::new(chunk_size)
            }
        }
    }

    /// Write the cache to `path` atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let body = {
            let entries = self
                .entries
                .lock()
                .map_err(|_| anyhow::anyhow!("hash cache lock poisoned"))?;
            serde_json::to_vec(&*entries)?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &body).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move cache into place at {}", path.display()))?;

        debug!(path = %path.display(), bytes = body.len(), "Saved hash cache");
        Ok(())
    }

    /// Number of cached identities
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the identity key for a file
    pub fn identity(path: &Path, mtime: i64, size: u64) -> String {
        format!("{}|{}|{}", path.display(), mtime, size)
    }

    /// Path embedded in an identity key
    ///
    /// Split from the right so paths containing `|` survive.
    pub fn identity_path(identity: &str) -> &str {
        identity.rsplitn(3, '|').nth(2).unwrap_or(identity)
    }

    /// Drop entries whose path is not among `live_paths`
    ///
    /// Returns the number of entries removed.
    pub fn prune<'a, I>(&self, live_paths: I) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let live: HashSet<String> = live_paths
            .into_iter()
            .map(|p| p.display().to_string())
            .collect();

        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|identity, _| live.contains(Self::identity_path(identity)));
        let removed = before - entries.len();

        if removed > 0 {
            info!(removed, "Cleaned stale entries from hash cache");
        }
        removed
    }

    /// Return the file's MD5, from the cache when its identity is unchanged
    ///
    /// Blocking: call from `spawn_blocking`. If the file changes while it is
    /// being hashed, nothing is cached and an error is returned.
    pub fn get_or_compute(&self, path: &Path) -> io::Result<FileDigest> {
        let (mtime, size) = stat(path)?;
        let identity = Self::identity(path, mtime, size);

        let hit = self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&identity).cloned());
        if let Some(hex) = hit {
            if let Ok(md5) = ContentHash::new(hex) {
                return Ok(FileDigest {
                    md5,
                    size,
                    mtime,
                    cached: true,
                });
            }
        }

        let md5 = hash_file(path, self.chunk_size)?;

        let (mtime_after, size_after) = stat(path)?;
        if (mtime_after, size_after) != (mtime, size) {
            return Err(io::Error::new(
                ErrorKind::Other,
                format!("file changed while hashing: {}", path.display()),
            ));
        }

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(identity, md5.as_str().to_string());
        }

        Ok(FileDigest {
            md5,
            size,
            mtime,
            cached: false,
        })
    }
}

/// Whole-second mtime and size of a file
fn stat(path: &Path) -> io::Result<(i64, u64)> {
    let metadata = std::fs::metadata(path)?;
    let mtime = match metadata.modified()?.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    };
    Ok((mtime, metadata.len()))
}

/// Stream a file through MD5 in `chunk_size` reads
pub fn hash_file(path: &Path, chunk_size: usize) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    ContentHash::from_digest(&hasher.finalize())
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))
}

/// MD5 of an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> Result<ContentHash, DomainError> {
    ContentHash::from_digest(&Md5::digest(data))
}
