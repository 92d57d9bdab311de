use crate::{FileLog, LogError, LogOptions};
use std::path::{Path, PathBuf};
use wayback_common::{LogKey, LogSelector};

const LOGS_DIR: &str = "logs";

/// Directory holding any number of file-backed logs, one per key.
///
/// ```text
/// <root>/logs/<key hex>/   - one FileLog directory per log
/// ```
#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
    options: LogOptions,
}

impl LogStore {
    /// Open or create a store at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let root = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(LOGS_DIR)).await?;
        tracing::debug!(root = %root.display(), "opened log store");
        Ok(Self {
            root,
            options: LogOptions::default(),
        })
    }

    /// Options applied to every log handed out by [`get`](Self::get).
    pub fn with_options(mut self, options: LogOptions) -> Self {
        self.options = options;
        self
    }

    /// Get an unopened handle to the log addressed by `selector`.
    ///
    /// Handles are independent: two handles on one key share the on-disk data
    /// but not their in-memory view of it.
    pub fn get(&self, selector: &LogSelector) -> FileLog {
        let key = selector.key();
        FileLog::new(self.log_dir(&key), key).with_options(self.options.clone())
    }

    /// Keys of every log present in the store, sorted.
    pub async fn keys(&self) -> Result<Vec<LogKey>, LogError> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join(LOGS_DIR)).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_string_lossy().parse::<LogKey>() {
                Ok(key) => keys.push(key),
                Err(err) => {
                    tracing::warn!(dir = ?name, "skipping foreign directory in store: {err}");
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_dir(&self, key: &LogKey) -> PathBuf {
        self.root.join(LOGS_DIR).join(key.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppendOnlyLog;

    #[tokio::test]
    async fn store_open_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::open(tmp.path().join("data")).await.unwrap();
        assert!(store.root().join("logs").is_dir());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn named_and_keyed_selectors_reach_same_log() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::open(tmp.path()).await.unwrap();

        let mut by_name = store.get(&LogSelector::default());
        by_name.open().await.unwrap();
        by_name.append(b"entry".to_vec()).await.unwrap();
        let key = by_name.key();
        by_name.close().await.unwrap();

        let mut by_key = store.get(&LogSelector::Key(key));
        by_key.open().await.unwrap();
        assert_eq!(by_key.len(), 1);
        assert_eq!(by_key.get(0).await.unwrap(), b"entry");
    }

    #[tokio::test]
    async fn keys_lists_opened_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::open(tmp.path()).await.unwrap();
        for name in ["a", "b"] {
            let mut log = store.get(&LogSelector::name(name));
            log.open().await.unwrap();
        }
        std::fs::create_dir_all(tmp.path().join("logs").join("not-a-key")).unwrap();

        let keys = store.keys().await.unwrap();
        let mut expected = vec![LogKey::from_name("a"), LogKey::from_name("b")];
        expected.sort();
        assert_eq!(keys, expected);
    }
}
