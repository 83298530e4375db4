//! On-disk cache of library bundles.
//!
//! # Storage Layout
//!
//! ```text
//! <cache>/libraries/
//! ├── H5P.Column-1.18/
//! │   ├── .h5pack-entry.json    # identity, archive digest, stored_at
//! │   ├── library.json
//! │   └── scripts/…
//! └── .tmp-<key>-<uuid>/        # staging dir, renamed into place when complete
//! ```
//!
//! Entries are written into a staging directory and renamed into place, so
//! readers never observe a half-written library. Two processes racing on the
//! same miss both download; the loser discards its staging directory. An
//! explicit [`LibraryStore::put`] replaces whatever entry is already there.
//!
//! A fetched package archive often ships the requested library's
//! dependencies too. Those are cached on the same miss, so resolving them
//! later needs no further downloads.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::archive::extract_libraries;
use super::source::LibrarySource;
use crate::domain::{LibraryBundle, LibraryIdentifier, LIBRARY_MANIFEST};
use crate::error::{CompileError, Result};

/// Per-entry bookkeeping file, never part of the bundle's assets
pub const ENTRY_RECORD: &str = ".h5pack-entry.json";

/// Metadata recorded next to every cached library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub identifier: LibraryIdentifier,

    /// SHA-256 of the fetched archive (absent for bundles stored via `put`)
    #[serde(default)]
    pub sha256: Option<String>,

    pub stored_at: DateTime<Utc>,

    /// Number of library files, manifest included
    pub files: usize,
}

/// Library cache backed by a remote source for misses
pub struct LibraryStore {
    root: PathBuf,
    source: Arc<dyn LibrarySource>,
    loaded: Mutex<HashMap<String, Arc<LibraryBundle>>>,
}

impl LibraryStore {
    /// Create a store rooted at `root` (usually `<cache>/libraries`)
    pub fn new(root: impl Into<PathBuf>, source: Arc<dyn LibrarySource>) -> Self {
        Self {
            root: root.into(),
            source,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry directory for `id`; names that could leave the root are refused
    fn entry_dir(&self, id: &LibraryIdentifier) -> Result<PathBuf> {
        if !id.has_valid_name() {
            return Err(CompileError::Integrity {
                requested: id.clone(),
                found: format!("'{}' is not a valid library machine name", id.name),
            });
        }
        Ok(self.root.join(id.cache_key()))
    }

    fn staging_dir(&self, key: &str) -> PathBuf {
        self.root.join(format!(".tmp-{}-{}", key, Uuid::new_v4()))
    }

    fn loaded(&self) -> MutexGuard<'_, HashMap<String, Arc<LibraryBundle>>> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the library is available without a network call
    pub async fn has(&self, id: &LibraryIdentifier) -> bool {
        let memoized = self.loaded().contains_key(&id.cache_key());
        if memoized {
            return true;
        }
        let Ok(dir) = self.entry_dir(id) else {
            return false;
        };
        fs::try_exists(dir.join(LIBRARY_MANIFEST)).await.unwrap_or(false)
    }

    /// Get a library, fetching and caching it on a miss
    #[instrument(skip(self), fields(library = %id))]
    pub async fn get(&self, id: &LibraryIdentifier) -> Result<Arc<LibraryBundle>> {
        let key = id.cache_key();
        let memoized = self.loaded().get(&key).cloned();
        if let Some(bundle) = memoized {
            return Ok(bundle);
        }

        if let Some(bundle) = self.load(id).await? {
            debug!("Cache hit");
            let bundle = Arc::new(bundle);
            self.loaded().insert(key, Arc::clone(&bundle));
            return Ok(bundle);
        }

        info!(source = %self.source.describe(id), "Cache miss, fetching library");
        let bytes = self.source.fetch(id).await?;
        let (bundle, siblings) = extract_libraries(id, &bytes)?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let bundle = self
            .save(id, bundle, Some(digest.clone()), Overwrite::No)
            .await?;
        for (claimed, sibling) in siblings {
            self.adopt(claimed, sibling, &digest).await;
        }
        Ok(bundle)
    }

    /// Store a bundle under `id`, replacing any existing entry; its manifest must match `id`
    pub async fn put(&self, id: &LibraryIdentifier, bundle: LibraryBundle) -> Result<Arc<LibraryBundle>> {
        self.save(id, bundle, None, Overwrite::Yes).await
    }

    async fn save(
        &self,
        id: &LibraryIdentifier,
        bundle: LibraryBundle,
        sha256: Option<String>,
        overwrite: Overwrite,
    ) -> Result<Arc<LibraryBundle>> {
        if !bundle.identifier.same_version(id) {
            return Err(CompileError::Integrity {
                requested: id.clone(),
                found: format!("bundle declares {}", bundle.identifier),
            });
        }

        self.persist(&bundle, sha256, overwrite).await?;
        let bundle = Arc::new(bundle);
        self.loaded().insert(id.cache_key(), Arc::clone(&bundle));
        Ok(bundle)
    }

    /// Cache a library that arrived inside another library's archive
    async fn adopt(&self, claimed: LibraryIdentifier, bundle: LibraryBundle, digest: &str) {
        if self.has(&claimed).await {
            return;
        }
        match self
            .save(&claimed, bundle, Some(digest.to_string()), Overwrite::No)
            .await
        {
            Ok(_) => debug!(library = %claimed, "Cached library shipped in package"),
            Err(err) => warn!(library = %claimed, error = %err, "Skipping library shipped in package"),
        }
    }

    /// Remove a library from the cache; returns whether it was present
    pub async fn evict(&self, id: &LibraryIdentifier) -> Result<bool> {
        self.loaded().remove(&id.cache_key());

        let dir = self.entry_dir(id)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| CompileError::cache(&dir, e))?;

        info!(library = %id, "Evicted library from cache");
        Ok(true)
    }

    /// List all cached entries, sorted by key
    pub async fn list(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(entries);
        }

        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| CompileError::cache(&self.root, e))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CompileError::cache(&self.root, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let record = entry.path().join(ENTRY_RECORD);
            if let Ok(raw) = fs::read(&record).await {
                if let Ok(parsed) = serde_json::from_slice::<CacheEntry>(&raw) {
                    entries.push(parsed);
                }
            }
        }

        entries.sort_by_key(|e| e.identifier.cache_key());
        Ok(entries)
    }

    /// Load a cached bundle from disk
    async fn load(&self, id: &LibraryIdentifier) -> Result<Option<LibraryBundle>> {
        let dir = self.entry_dir(id)?;
        if !fs::try_exists(dir.join(LIBRARY_MANIFEST)).await.unwrap_or(false) {
            return Ok(None);
        }

        let assets = read_tree(&dir).await?;
        let bundle =
            LibraryBundle::from_assets(assets).map_err(|message| CompileError::cache(&dir, message))?;

        if !bundle.identifier.same_version(id) {
            return Err(CompileError::cache(
                &dir,
                format!("cached entry declares {}, evict it and retry", bundle.identifier),
            ));
        }

        Ok(Some(bundle))
    }

    /// Write a bundle to a staging dir, then rename it into place
    async fn persist(
        &self,
        bundle: &LibraryBundle,
        sha256: Option<String>,
        overwrite: Overwrite,
    ) -> Result<()> {
        let target = self.entry_dir(&bundle.identifier)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CompileError::cache(&self.root, e))?;

        let key = bundle.identifier.cache_key();
        let staging = self.staging_dir(&key);
        if let Err(err) = write_entry(&staging, bundle, sha256).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(err);
        }

        if overwrite == Overwrite::Yes {
            if let Err(err) = self.retire(&target, &key).await {
                let _ = fs::remove_dir_all(&staging).await;
                return Err(err);
            }
        }

        let renamed = fs::rename(&staging, &target).await;
        let Err(err) = renamed else {
            debug!(library = %bundle.identifier, "Stored library in cache");
            return Ok(());
        };

        let _ = fs::remove_dir_all(&staging).await;
        if fs::try_exists(target.join(LIBRARY_MANIFEST)).await.unwrap_or(false) {
            // Another writer finished first; its content is equivalent
            debug!(library = %bundle.identifier, "Cache entry already written by another process");
            return Ok(());
        }
        Err(CompileError::cache(&target, err))
    }

    /// Move an existing entry aside and delete it
    async fn retire(&self, target: &Path, key: &str) -> Result<()> {
        if !fs::try_exists(target).await.unwrap_or(false) {
            return Ok(());
        }
        let retired = self.staging_dir(key);
        fs::rename(target, &retired)
            .await
            .map_err(|e| CompileError::cache(target, e))?;
        let _ = fs::remove_dir_all(&retired).await;
        Ok(())
    }
}

/// Whether a write may replace an entry that is already on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overwrite {
    Yes,
    No,
}

async fn write_entry(dir: &Path, bundle: &LibraryBundle, sha256: Option<String>) -> Result<()> {
    for (relative, data) in &bundle.assets {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CompileError::cache(parent, e))?;
        }
        fs::write(&path, data)
            .await
            .map_err(|e| CompileError::cache(&path, e))?;
    }

    let record = CacheEntry {
        identifier: bundle.identifier.clone(),
        sha256,
        stored_at: Utc::now(),
        files: bundle.assets.len(),
    };
    let json = serde_json::to_vec_pretty(&record).map_err(|e| CompileError::cache(dir, e))?;
    let record_path = dir.join(ENTRY_RECORD);
    fs::write(&record_path, json)
        .await
        .map_err(|e| CompileError::cache(&record_path, e))
}

/// Read all files under `dir` keyed by `/`-joined relative path
async fn read_tree(dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![(dir.to_path_buf(), String::new())];

    while let Some((current, prefix)) = pending.pop() {
        let mut entries = fs::read_dir(&current)
            .await
            .map_err(|e| CompileError::cache(&current, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CompileError::cache(&current, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let relative = format!("{}{}", prefix, name);
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CompileError::cache(entry.path(), e))?;

            if file_type.is_dir() {
                pending.push((entry.path(), format!("{}/", relative)));
            } else if relative != ENTRY_RECORD {
                let data = fs::read(entry.path())
                    .await
                    .map_err(|e| CompileError::cache(entry.path(), e))?;
                files.insert(relative, data);
            }
        }
    }

    Ok(files)
}
