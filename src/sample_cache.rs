use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use xxhash_rust::xxh64::xxh64;

use crate::error::{Result, SyncError};
use crate::series_index::TimeSeriesIndex;
use crate::types::IndexedSample;

/// On-disk form of a decoded and sorted telemetry table.
#[derive(Debug, Serialize, Deserialize)]
struct CachedTable {
    source_key: String,
    created_at: String,
    columns: Vec<String>,
    rows: Vec<IndexedSample>,
}

/// Disk cache of sorted telemetry rows, keyed by source content.
///
/// # File Format
/// Cache files: `{cache_dir}/samples_{key}.json.gz`
/// - gzip-compressed JSON of the sorted rows plus column names
/// - `key` is derived from the raw source bytes, so an edited CSV
///   never hits a stale entry
///
/// The index never touches this type; callers decide when to read or
/// write it and hand the rows to [`TimeSeriesIndex::from_sorted`].
pub struct SampleCache {
    cache_dir: PathBuf,
}

impl SampleCache {
    /// Open a cache directory, creating it when missing.
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)
                .map_err(|e| SyncError::Cache(format!("Failed to create cache dir: {}", e)))?;
        }
        Ok(SampleCache { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Content identity of a source file: byte length plus its xxh64
    /// digest (seed 0), stable across builds.
    pub fn content_key(bytes: &[u8]) -> String {
        format!("{:x}_{:016x}", bytes.len(), xxh64(bytes, 0))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("samples_{}.json.gz", key))
    }

    /// Write an index under `key`.
    pub fn store(&self, key: &str, index: &TimeSeriesIndex) -> Result<PathBuf> {
        let path = self.entry_path(key);
        let table = CachedTable {
            source_key: key.to_string(),
            created_at: Utc::now().to_rfc3339(),
            columns: index.columns().to_vec(),
            rows: index.rows().to_vec(),
        };

        // write to a sibling and rename so readers never see half a file
        let tmp = path.with_extension("gz.tmp");
        let file = File::create(&tmp)
            .map_err(|e| SyncError::Cache(format!("Failed to create cache file: {}", e)))?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, &table)
            .map_err(|e| SyncError::Cache(format!("Failed to serialize rows: {}", e)))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| SyncError::Cache(format!("Failed to finalize compression: {}", e)))?;
        writer
            .flush()
            .map_err(|e| SyncError::Cache(format!("Failed to flush cache file: {}", e)))?;
        drop(writer);
        fs::rename(&tmp, &path)
            .map_err(|e| SyncError::Cache(format!("Failed to move cache file: {}", e)))?;

        info!("Cached {} rows to {}", index.len(), path.display());
        Ok(path)
    }

    /// Read the index stored under `key`.
    ///
    /// A missing entry is `Ok(None)`, not an error.
    pub fn load(&self, key: &str) -> Result<Option<TimeSeriesIndex>> {
        let path = self.entry_path(key);
        if !path.exists() {
            debug!("Cache miss for {}", key);
            return Ok(None);
        }

        let file = File::open(&path)
            .map_err(|e| SyncError::Cache(format!("Failed to open cache file: {}", e)))?;
        let decoder = GzDecoder::new(BufReader::new(file));
        let table: CachedTable = serde_json::from_reader(decoder)
            .map_err(|e| SyncError::Cache(format!("Failed to decode cache: {}", e)))?;

        if table.source_key != key {
            return Err(SyncError::Cache(format!(
                "cache entry {} belongs to {}",
                key, table.source_key
            )));
        }

        debug!("Cache hit for {} (written {})", key, table.created_at);
        TimeSeriesIndex::from_sorted(table.rows, table.columns).map(Some)
    }

    /// Load from cache when possible, otherwise decode `bytes` and cache the
    /// result. A broken cache entry is logged and rebuilt.
    pub fn load_or_build<F>(&self, bytes: &[u8], build: F) -> Result<TimeSeriesIndex>
    where
        F: FnOnce(&[u8]) -> Result<TimeSeriesIndex>,
    {
        let key = Self::content_key(bytes);
        match self.load(&key) {
            Ok(Some(index)) => return Ok(index),
            Ok(None) => {}
            Err(e) => warn!("Ignoring unusable cache entry {}: {}", key, e),
        }

        let index = build(bytes)?;
        if let Err(e) = self.store(&key, &index) {
            warn!("Failed to write sample cache: {}", e);
        }
        Ok(index)
    }

    /// Remove cache files older than `max_age_days`. Returns how many went.
    pub fn prune_older_than(&self, max_age_days: u32) -> Result<usize> {
        let max_age = Duration::from_secs(max_age_days as u64 * 86400);
        let now = SystemTime::now();
        let mut removed = 0;

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| SyncError::Cache(format!("Failed to read cache dir: {}", e)))?;

        for entry in entries {
            let entry = entry.map_err(|e| SyncError::Cache(format!("Failed to read entry: {}", e)))?;
            let path = entry.path();

            // `.tmp` covers writes interrupted before the rename
            if !path
                .extension()
                .map(|e| e == "gz" || e == "tmp")
                .unwrap_or(false)
            {
                continue;
            }

            let age = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if let Some(age) = age {
                if age > max_age {
                    match fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) => warn!("Failed to delete old cache {}: {}", path.display(), e),
                    }
                }
            }
        }

        Ok(removed)
    }
}
