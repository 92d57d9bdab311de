use crate::LogError;
use async_trait::async_trait;
use wayback_common::LogKey;

/// Ordered, durable sequence of opaque records.
///
/// Indices are 0-based. The only mutations are [`append`](Self::append) at the
/// tip and [`truncate`](Self::truncate) from the end; records are never
/// rewritten in place.
#[async_trait]
pub trait AppendOnlyLog: Send + Sync {
    /// Key addressing this log.
    fn key(&self) -> LogKey;

    /// Make the log ready for use. Opening an already open log is a no-op.
    async fn open(&mut self) -> Result<(), LogError>;

    /// Release underlying resources. Safe to call more than once.
    async fn close(&mut self) -> Result<(), LogError>;

    /// Whether the log has been opened and not yet closed.
    fn is_open(&self) -> bool;

    /// Current number of records. Zero while the log is closed.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Durably add one record at the tip. Returns the new length.
    async fn append(&mut self, value: Vec<u8>) -> Result<u64, LogError>;

    /// Read the record at `index`, which must be below [`len`](Self::len).
    async fn get(&self, index: u64) -> Result<Vec<u8>, LogError>;

    /// Discard every record at or beyond `new_len`. Irreversible.
    async fn truncate(&mut self, new_len: u64) -> Result<(), LogError>;

    /// Truncate to `new_len`, then append `value`, as one unit.
    ///
    /// Either both steps take effect or the log keeps its previous contents.
    /// This default reads the discarded tail first and re-appends it if the
    /// append fails; implementations that can commit both steps in a single
    /// write should override it.
    async fn truncate_and_append(&mut self, new_len: u64, value: Vec<u8>) -> Result<u64, LogError> {
        let len = self.len();
        if new_len > len {
            return Err(LogError::TruncateBeyondEnd {
                requested: new_len,
                len,
            });
        }

        let mut tail = Vec::with_capacity((len - new_len) as usize);
        for index in new_len..len {
            tail.push(self.get(index).await?);
        }
        if !tail.is_empty() {
            self.truncate(new_len).await?;
        }

        match self.append(value).await {
            Ok(len) => Ok(len),
            Err(err) => {
                tracing::warn!(
                    key = %self.key(),
                    restored = tail.len(),
                    "append after truncate failed, restoring discarded records: {err}"
                );
                for record in tail {
                    if let Err(restore_err) = self.append(record).await {
                        tracing::error!(
                            key = %self.key(),
                            "failed to restore record: {restore_err}"
                        );
                        break;
                    }
                }
                Err(err)
            }
        }
    }
}
