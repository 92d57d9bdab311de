use crate::{AppendOnlyLog, LogError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use wayback_common::LogKey;

#[derive(Debug, Default)]
struct Shared {
    records: Vec<Vec<u8>>,
    fail_appends: usize,
    fail_truncates: usize,
    fail_reads: usize,
}

/// In-memory append-only log.
///
/// Records live behind a shared pointer so several handles (see
/// [`handle`](Self::handle)) can attach to the same log, the way several
/// history instances attach to one on-disk log. Each handle has its own
/// open/closed state.
///
/// Failure injection (`fail_next_*`) makes the next N calls of that kind
/// return [`LogError::Unavailable`] without touching the records.
#[derive(Debug)]
pub struct MemoryLog {
    key: LogKey,
    shared: Arc<Mutex<Shared>>,
    open: bool,
}

impl MemoryLog {
    pub fn new(key: LogKey) -> Self {
        Self {
            key,
            shared: Arc::new(Mutex::new(Shared::default())),
            open: false,
        }
    }

    /// A new, unopened handle onto the same records.
    pub fn handle(&self) -> Self {
        Self {
            key: self.key,
            shared: Arc::clone(&self.shared),
            open: false,
        }
    }

    pub fn fail_next_appends(&self, count: usize) {
        self.lock().fail_appends = count;
    }

    pub fn fail_next_truncates(&self, count: usize) {
        self.lock().fail_truncates = count;
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.lock().fail_reads = count;
    }

    /// Copy of every record, for inspection.
    pub fn records(&self) -> Vec<Vec<u8>> {
        self.lock().records.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // Every critical section leaves `Shared` consistent, so a poisoned
        // lock still guards valid data.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), LogError> {
        if self.open {
            Ok(())
        } else {
            Err(LogError::Closed)
        }
    }
}

fn take_failure(counter: &mut usize, what: &str) -> Result<(), LogError> {
    if *counter > 0 {
        *counter -= 1;
        return Err(LogError::Unavailable(format!("injected {what} failure")));
    }
    Ok(())
}

#[async_trait]
impl AppendOnlyLog for MemoryLog {
    fn key(&self) -> LogKey {
        self.key
    }

    async fn open(&mut self) -> Result<(), LogError> {
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LogError> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn len(&self) -> u64 {
        if !self.open {
            return 0;
        }
        self.lock().records.len() as u64
    }

    async fn append(&mut self, value: Vec<u8>) -> Result<u64, LogError> {
        self.ensure_open()?;
        let mut shared = self.lock();
        take_failure(&mut shared.fail_appends, "append")?;
        shared.records.push(value);
        Ok(shared.records.len() as u64)
    }

    async fn get(&self, index: u64) -> Result<Vec<u8>, LogError> {
        self.ensure_open()?;
        let mut shared = self.lock();
        take_failure(&mut shared.fail_reads, "read")?;
        let len = shared.records.len() as u64;
        shared
            .records
            .get(index as usize)
            .cloned()
            .ok_or(LogError::IndexOutOfRange { index, len })
    }

    async fn truncate(&mut self, new_len: u64) -> Result<(), LogError> {
        self.ensure_open()?;
        let mut shared = self.lock();
        let len = shared.records.len() as u64;
        if new_len > len {
            return Err(LogError::TruncateBeyondEnd {
                requested: new_len,
                len,
            });
        }
        take_failure(&mut shared.fail_truncates, "truncate")?;
        shared.records.truncate(new_len as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_log() -> MemoryLog {
        let mut log = MemoryLog::new(LogKey::from_name("test"));
        log.open().await.unwrap();
        log
    }

    #[tokio::test]
    async fn append_get_truncate() {
        let mut log = open_log().await;
        assert_eq!(log.append(b"a".to_vec()).await.unwrap(), 1);
        assert_eq!(log.append(b"b".to_vec()).await.unwrap(), 2);
        assert_eq!(log.get(1).await.unwrap(), b"b");

        log.truncate(1).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(matches!(
            log.get(1).await,
            Err(LogError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[tokio::test]
    async fn truncate_beyond_end_is_rejected() {
        let mut log = open_log().await;
        log.append(b"a".to_vec()).await.unwrap();
        assert!(matches!(
            log.truncate(3).await,
            Err(LogError::TruncateBeyondEnd { requested: 3, len: 1 })
        ));
    }

    #[tokio::test]
    async fn closed_log_rejects_operations() {
        let mut log = open_log().await;
        log.append(b"a".to_vec()).await.unwrap();
        log.close().await.unwrap();
        log.close().await.unwrap();
        assert_eq!(log.len(), 0);
        assert!(matches!(log.get(0).await, Err(LogError::Closed)));
        assert!(matches!(log.append(b"b".to_vec()).await, Err(LogError::Closed)));
    }

    #[tokio::test]
    async fn handles_share_records() {
        let mut first = open_log().await;
        first.append(b"a".to_vec()).await.unwrap();

        let mut second = first.handle();
        assert!(!second.is_open());
        second.open().await.unwrap();
        assert_eq!(second.len(), 1);
        second.append(b"b".to_vec()).await.unwrap();
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn injected_failure_leaves_records_alone() {
        let mut log = open_log().await;
        log.append(b"a".to_vec()).await.unwrap();
        log.fail_next_appends(1);
        assert!(matches!(
            log.append(b"b".to_vec()).await,
            Err(LogError::Unavailable(_))
        ));
        assert_eq!(log.len(), 1);
        assert_eq!(log.append(b"b".to_vec()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn truncate_and_append_forks() {
        let mut log = open_log().await;
        for r in [b"a", b"b", b"c"] {
            log.append(r.to_vec()).await.unwrap();
        }
        assert_eq!(log.truncate_and_append(1, b"d".to_vec()).await.unwrap(), 2);
        assert_eq!(log.records(), vec![b"a".to_vec(), b"d".to_vec()]);
    }

    #[tokio::test]
    async fn truncate_and_append_restores_tail_on_failure() {
        let mut log = open_log().await;
        for r in [b"a", b"b", b"c"] {
            log.append(r.to_vec()).await.unwrap();
        }
        log.fail_next_appends(1);
        assert!(log.truncate_and_append(1, b"d".to_vec()).await.is_err());
        assert_eq!(
            log.records(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[tokio::test]
    async fn truncate_and_append_failed_truncate_changes_nothing() {
        let mut log = open_log().await;
        log.append(b"a".to_vec()).await.unwrap();
        log.append(b"b".to_vec()).await.unwrap();
        log.fail_next_truncates(1);
        assert!(log.truncate_and_append(0, b"c".to_vec()).await.is_err());
        assert_eq!(log.records(), vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
