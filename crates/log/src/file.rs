//! File-backed append-only log.
//!
//! Layout inside the log directory:
//! ```text
//! log.meta.json              - schema version, key, entry count
//! entries/
//!   000000-1a2b3c4d.entry.zst - one zstd-compressed record per entry
//! integrity/
//!   manifest.json            - hash chain manifest
//! ```
//!
//! The manifest is the commit point: an entry exists once the manifest naming
//! it has been written. Entry files are named by index and content hash, so
//! writing a new file never clobbers one the manifest still references.

use crate::{AppendOnlyLog, LogError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use wayback_common::LogKey;

/// Current on-disk schema version.
pub const LOG_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "log.meta.json";
const ENTRIES_DIR: &str = "entries";
const INTEGRITY_DIR: &str = "integrity";
const MANIFEST_FILE: &str = "manifest.json";

/// Tuning knobs for file-backed logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// zstd compression level for entry files.
    pub compression_level: i32,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            compression_level: 3,
        }
    }
}

/// Metadata stored in log.meta.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMeta {
    pub log_schema_version: u32,
    pub key: LogKey,
    pub entry_count: u64,
}

/// A single entry in the integrity manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Integrity manifest: one entry per log record, each chained to the previous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug)]
struct Opened {
    meta: LogMeta,
    manifest: IntegrityManifest,
}

/// Append-only log persisted as one compressed file per entry.
#[derive(Debug)]
pub struct FileLog {
    root: PathBuf,
    key: LogKey,
    options: LogOptions,
    state: Option<Opened>,
}

impl FileLog {
    /// Bind a log to a directory. Nothing touches the disk until [`open`](AppendOnlyLog::open).
    pub fn new(root: impl AsRef<Path>, key: LogKey) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            key,
            options: LogOptions::default(),
            state: None,
        }
    }

    pub fn with_options(mut self, options: LogOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the path to the log directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the metadata, if the log is open.
    pub fn meta(&self) -> Option<&LogMeta> {
        self.state.as_ref().map(|s| &s.meta)
    }

    /// Get the integrity manifest, if the log is open.
    pub fn manifest(&self) -> Option<&IntegrityManifest> {
        self.state.as_ref().map(|s| &s.manifest)
    }

    /// Verify the whole hash chain: continuity and every entry file's hash.
    pub async fn verify_integrity(&self) -> Result<(), LogError> {
        let opened = self.opened()?;
        let mut prev_hash: Option<String> = None;
        for entry in &opened.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(LogError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }

            let data = tokio::fs::read(self.entry_path(&entry.filename)).await?;
            let actual = sha256_hex(&data);
            if actual != entry.sha256 {
                tracing::warn!(file = %entry.filename, "entry hash mismatch");
                return Err(LogError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual,
                });
            }

            prev_hash = Some(entry.sha256.clone());
        }
        Ok(())
    }

    fn opened(&self) -> Result<&Opened, LogError> {
        self.state.as_ref().ok_or(LogError::Closed)
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(INTEGRITY_DIR).join(MANIFEST_FILE)
    }

    fn entry_path(&self, filename: &str) -> PathBuf {
        self.root.join(ENTRIES_DIR).join(filename)
    }

    /// Compress `value` and write it as the entry at `index`, chained to `prev`.
    /// The entry is not part of the log until a manifest naming it is committed.
    async fn write_entry(
        &self,
        index: u64,
        prev: Option<&ManifestEntry>,
        value: &[u8],
    ) -> Result<ManifestEntry, LogError> {
        let compressed = zstd_compress(value, self.options.compression_level)?;
        let sha256 = sha256_hex(&compressed);
        let filename = format!("{:06}-{}.entry.zst", index, &sha256[..8]);
        tokio::fs::write(self.entry_path(&filename), &compressed).await?;
        tracing::trace!(index, file = %filename, bytes = compressed.len(), "wrote entry file");
        Ok(ManifestEntry {
            filename,
            sha256,
            prev_hash: prev.map(|p| p.sha256.clone()),
        })
    }

    /// Persist `manifest` as the new log contents, then refresh meta.
    async fn commit(&mut self, manifest: IntegrityManifest) -> Result<(), LogError> {
        let manifest_path = self.manifest_path();
        let meta_path = self.meta_path();
        let mut meta = self.opened()?.meta.clone();
        meta.entry_count = manifest.entries.len() as u64;

        write_json_atomic(&manifest_path, &manifest).await?;
        // The manifest is already durable; a stale count is repaired on open.
        if let Err(err) = write_json_atomic(&meta_path, &meta).await {
            tracing::warn!(key = %self.key, "failed to update log meta: {err}");
        }

        if let Some(opened) = self.state.as_mut() {
            opened.meta = meta;
            opened.manifest = manifest;
        }
        Ok(())
    }

    /// Best-effort removal of entry files that are no longer referenced.
    async fn remove_entries(&self, discarded: &[ManifestEntry], keep: Option<&str>) {
        for entry in discarded {
            if Some(entry.filename.as_str()) == keep {
                continue;
            }
            if let Err(err) = tokio::fs::remove_file(self.entry_path(&entry.filename)).await {
                tracing::warn!(file = %entry.filename, "failed to remove discarded entry: {err}");
            }
        }
    }

    /// Best-effort removal of an entry file whose manifest commit failed.
    async fn remove_uncommitted(&self, filename: &str) {
        if let Err(err) = tokio::fs::remove_file(self.entry_path(filename)).await {
            tracing::warn!(file = %filename, "failed to remove uncommitted entry: {err}");
        }
    }

    async fn load_or_init(&self) -> Result<Opened, LogError> {
        let meta_path = self.meta_path();
        let manifest_path = self.manifest_path();

        if !tokio::fs::try_exists(&meta_path).await? {
            let meta = LogMeta {
                log_schema_version: LOG_SCHEMA_VERSION,
                key: self.key,
                entry_count: 0,
            };
            let manifest = IntegrityManifest::default();
            write_json_atomic(&manifest_path, &manifest).await?;
            write_json_atomic(&meta_path, &meta).await?;
            tracing::debug!(key = %self.key, root = %self.root.display(), "created log");
            return Ok(Opened { meta, manifest });
        }

        let mut meta: LogMeta = serde_json::from_slice(&tokio::fs::read(&meta_path).await?)?;
        if meta.log_schema_version != LOG_SCHEMA_VERSION {
            return Err(LogError::SchemaMismatch {
                file_version: meta.log_schema_version,
                expected_version: LOG_SCHEMA_VERSION,
            });
        }
        if meta.key != self.key {
            return Err(LogError::KeyMismatch {
                expected: self.key,
                found: meta.key,
            });
        }

        let manifest: IntegrityManifest = if tokio::fs::try_exists(&manifest_path).await? {
            serde_json::from_slice(&tokio::fs::read(&manifest_path).await?)?
        } else {
            IntegrityManifest::default()
        };

        let committed = manifest.entries.len() as u64;
        if meta.entry_count != committed {
            tracing::warn!(
                key = %self.key,
                meta_count = meta.entry_count,
                manifest_count = committed,
                "log meta disagrees with manifest, repairing from manifest"
            );
            meta.entry_count = committed;
            write_json_atomic(&meta_path, &meta).await?;
        }

        Ok(Opened { meta, manifest })
    }
}

#[async_trait]
impl AppendOnlyLog for FileLog {
    fn key(&self) -> LogKey {
        self.key
    }

    async fn open(&mut self) -> Result<(), LogError> {
        if self.state.is_some() {
            return Ok(());
        }
        tokio::fs::create_dir_all(self.root.join(ENTRIES_DIR)).await?;
        tokio::fs::create_dir_all(self.root.join(INTEGRITY_DIR)).await?;

        let opened = self.load_or_init().await?;
        tracing::debug!(key = %self.key, len = opened.manifest.entries.len(), "opened log");
        self.state = Some(opened);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LogError> {
        if self.state.take().is_some() {
            tracing::debug!(key = %self.key, "closed log");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn len(&self) -> u64 {
        self.state
            .as_ref()
            .map_or(0, |s| s.manifest.entries.len() as u64)
    }

    async fn append(&mut self, value: Vec<u8>) -> Result<u64, LogError> {
        let mut manifest = self.opened()?.manifest.clone();
        let index = manifest.entries.len() as u64;
        let entry = self
            .write_entry(index, manifest.entries.last(), &value)
            .await?;
        let filename = entry.filename.clone();
        manifest.entries.push(entry);

        if let Err(err) = self.commit(manifest).await {
            self.remove_uncommitted(&filename).await;
            return Err(err);
        }
        Ok(index + 1)
    }

    async fn get(&self, index: u64) -> Result<Vec<u8>, LogError> {
        let opened = self.opened()?;
        let len = opened.manifest.entries.len() as u64;
        let entry = opened
            .manifest
            .entries
            .get(index as usize)
            .ok_or(LogError::IndexOutOfRange { index, len })?;

        let compressed = tokio::fs::read(self.entry_path(&entry.filename)).await?;
        let actual = sha256_hex(&compressed);
        if actual != entry.sha256 {
            tracing::warn!(index, file = %entry.filename, "entry hash mismatch on read");
            return Err(LogError::IntegrityMismatch {
                expected: entry.sha256.clone(),
                actual,
            });
        }
        zstd_decompress(&compressed)
    }

    async fn truncate(&mut self, new_len: u64) -> Result<(), LogError> {
        let mut manifest = self.opened()?.manifest.clone();
        let len = manifest.entries.len() as u64;
        if new_len > len {
            return Err(LogError::TruncateBeyondEnd {
                requested: new_len,
                len,
            });
        }
        if new_len == len {
            return Ok(());
        }

        let discarded = manifest.entries.split_off(new_len as usize);
        self.commit(manifest).await?;
        tracing::debug!(key = %self.key, from = len, to = new_len, "truncated log");
        self.remove_entries(&discarded, None).await;
        Ok(())
    }

    async fn truncate_and_append(&mut self, new_len: u64, value: Vec<u8>) -> Result<u64, LogError> {
        let mut manifest = self.opened()?.manifest.clone();
        let len = manifest.entries.len() as u64;
        if new_len > len {
            return Err(LogError::TruncateBeyondEnd {
                requested: new_len,
                len,
            });
        }

        let discarded = manifest.entries.split_off(new_len as usize);
        let entry = self
            .write_entry(new_len, manifest.entries.last(), &value)
            .await?;
        let filename = entry.filename.clone();
        manifest.entries.push(entry);

        if let Err(err) = self.commit(manifest).await {
            // Identical content may share a name with a still-committed entry.
            if !discarded.iter().any(|d| d.filename == filename) {
                self.remove_uncommitted(&filename).await;
            }
            return Err(err);
        }
        if !discarded.is_empty() {
            tracing::debug!(key = %self.key, from = len, to = new_len, "forked log");
        }
        self.remove_entries(&discarded, Some(filename.as_str())).await;
        Ok(new_len + 1)
    }
}

/// Write JSON to a sibling temp file and rename it over `path`.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), LogError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn zstd_compress(data: &[u8], level: i32) -> Result<Vec<u8>, LogError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, LogError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
