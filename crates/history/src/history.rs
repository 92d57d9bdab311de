use crate::{HistoryConfig, HistoryError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use wayback_common::{LogKey, SessionId};
use wayback_log::AppendOnlyLog;

/// Index of the virtual initial state. Never stored in the log.
pub const INITIAL_INDEX: i64 = -1;

/// Fired after every successful navigation or push.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigated<T> {
    pub session: SessionId,
    /// New cursor position; [`INITIAL_INDEX`] for the virtual initial state.
    pub index: i64,
    /// New state; `None` exactly at the virtual initial state.
    pub state: Option<T>,
}

/// Point-in-time view of a history's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStatus {
    pub position: i64,
    pub length: u64,
    pub session_min_index: i64,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

#[derive(Debug)]
struct Cursor<T> {
    index: i64,
    state: Option<T>,
}

impl<T> Cursor<T> {
    fn initial() -> Self {
        Self {
            index: INITIAL_INDEX,
            state: None,
        }
    }
}

#[derive(Debug)]
struct Inner<L, T> {
    log: L,
    cursor: Cursor<T>,
    session_min_index: i64,
    open: bool,
}

impl<L: AppendOnlyLog, T> Inner<L, T> {
    fn len(&self) -> i64 {
        self.log.len() as i64
    }

    fn reachable(&self, delta: i64) -> bool {
        let target = self.cursor.index.saturating_add(delta);
        target == INITIAL_INDEX || (target >= self.session_min_index && target < self.len())
    }

    /// Bring the cursor back inside the log if another writer shrank it.
    /// Returns whether the cursor moved.
    fn reconcile(&mut self) -> bool {
        let len = self.len();
        self.session_min_index = self.session_min_index.min(len);
        if self.cursor.index < len {
            return false;
        }
        tracing::warn!(
            position = self.cursor.index,
            len,
            "log shrank below cursor, returning to initial state"
        );
        self.cursor = Cursor::initial();
        true
    }
}

/// Browser-style back/forward history whose entries live in an append-only log.
///
/// The cursor sits in `[-1, length - 1]`, where `-1` is the virtual initial
/// state. [`go`](Self::go) moves within existing entries; [`push_state`](Self::push_state)
/// is the only operation that writes, and pushing from behind the tip
/// discards every entry after the cursor.
///
/// All operations on one instance are serialized: each read-then-move and
/// truncate-then-append runs under a single lock, so no caller observes a
/// half-applied transition. Wrap the history in an `Arc` to share it.
pub struct NavigationHistory<L, T> {
    session: SessionId,
    key: LogKey,
    inner: Mutex<Inner<L, T>>,
    events: broadcast::Sender<Navigated<T>>,
}

impl<L, T> NavigationHistory<L, T>
where
    L: AppendOnlyLog,
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Open `log` and start a session at the virtual initial state.
    pub async fn open(mut log: L, config: HistoryConfig) -> Result<Self, HistoryError> {
        log.open().await?;

        let session = SessionId::new();
        let key = log.key();
        let len = log.len();
        let session_min_index = config.session_bound.min_index(len);
        let (events, _) = broadcast::channel(config.notify_capacity.max(1));

        tracing::debug!(%session, %key, len, session_min_index, "opened navigation history");

        Ok(Self {
            session,
            key,
            inner: Mutex::new(Inner {
                log,
                cursor: Cursor::initial(),
                session_min_index,
                open: true,
            }),
            events,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Key of the underlying log.
    pub fn key(&self) -> LogKey {
        self.key
    }

    /// Receive a [`Navigated`] notification for every successful move or push.
    pub fn subscribe(&self) -> broadcast::Receiver<Navigated<T>> {
        self.events.subscribe()
    }

    /// Number of persisted entries. Zero once closed.
    pub async fn length(&self) -> u64 {
        self.inner.lock().await.log.len()
    }

    /// Current cursor index; [`INITIAL_INDEX`] at the virtual initial state.
    pub async fn position(&self) -> i64 {
        self.inner.lock().await.cursor.index
    }

    /// Current state; `None` at the virtual initial state.
    pub async fn state(&self) -> Option<T> {
        self.inner.lock().await.cursor.state.clone()
    }

    pub async fn session_min_index(&self) -> i64 {
        self.inner.lock().await.session_min_index
    }

    /// Snapshot of the cursor and its reachability, taken under one lock.
    ///
    /// Like [`peek`](Self::peek), this first catches up with truncations made
    /// by other writers.
    pub async fn status(&self) -> Result<HistoryStatus, HistoryError> {
        let mut inner = self.lock_open().await?;
        self.reconcile(&mut inner);
        Ok(HistoryStatus {
            position: inner.cursor.index,
            length: inner.log.len(),
            session_min_index: inner.session_min_index,
            can_go_back: inner.reachable(-1),
            can_go_forward: inner.reachable(1),
        })
    }

    /// Read the entry at `index` without moving the cursor.
    pub async fn entry(&self, index: u64) -> Result<T, HistoryError> {
        let inner = self.lock_open().await?;
        let bytes = inner.log.get(index).await?;
        decode(&bytes)
    }

    /// Whether `go(delta)` would move. The virtual initial state is always reachable.
    ///
    /// Never moves the cursor on its own account. If another writer truncated
    /// the log below the cursor, the cursor returns to the virtual initial
    /// state first and subscribers are notified of that move.
    pub async fn peek(&self, delta: i64) -> Result<bool, HistoryError> {
        let mut inner = self.lock_open().await?;
        self.reconcile(&mut inner);
        Ok(inner.reachable(delta))
    }

    /// Move the cursor by `delta` and return the state there.
    ///
    /// An unreachable target leaves everything untouched and returns the
    /// current state. `go(0)` re-reads the current entry and notifies again.
    /// If the read fails the cursor does not move.
    pub async fn go(&self, delta: i64) -> Result<Option<T>, HistoryError> {
        let mut inner = self.lock_open().await?;
        self.reconcile(&mut inner);

        if !inner.reachable(delta) {
            tracing::trace!(
                session = %self.session,
                position = inner.cursor.index,
                delta,
                "navigation target unreachable"
            );
            return Ok(inner.cursor.state.clone());
        }

        let from = inner.cursor.index;
        let target = from.saturating_add(delta);
        let state = if target == INITIAL_INDEX {
            None
        } else {
            let bytes = inner.log.get(target as u64).await?;
            Some(decode::<T>(&bytes)?)
        };

        inner.cursor = Cursor {
            index: target,
            state: state.clone(),
        };
        tracing::debug!(session = %self.session, from, to = target, "navigated");
        self.notify(target, state.clone());
        Ok(state)
    }

    pub async fn back(&self) -> Result<Option<T>, HistoryError> {
        self.go(-1).await
    }

    pub async fn forward(&self) -> Result<Option<T>, HistoryError> {
        self.go(1).await
    }

    /// Record `state` as the new tip and move to it. Returns the new length.
    ///
    /// If the cursor is behind the tip, every entry after it is discarded
    /// first. Truncation and append go through one
    /// [`truncate_and_append`](AppendOnlyLog::truncate_and_append) call, so a
    /// failure leaves both the log and the cursor as they were.
    pub async fn push_state(&self, state: T) -> Result<u64, HistoryError> {
        let bytes = encode(&state)?;
        let mut inner = self.lock_open().await?;
        self.reconcile(&mut inner);

        let len = inner.log.len();
        let position = inner.cursor.index;
        let new_len = if position == len as i64 - 1 {
            inner.log.append(bytes).await?
        } else {
            let keep = (position + 1) as u64;
            tracing::debug!(session = %self.session, len, keep, "forking history");
            let new_len = inner.log.truncate_and_append(keep, bytes).await?;
            inner.session_min_index = inner.session_min_index.min(keep as i64);
            new_len
        };

        let index = new_len as i64 - 1;
        inner.cursor = Cursor {
            index,
            state: Some(state.clone()),
        };
        tracing::debug!(session = %self.session, index, "pushed state");
        self.notify(index, Some(state));
        Ok(new_len)
    }

    /// Close the underlying log. Later operations return [`HistoryError::NotReady`].
    pub async fn close(&self) -> Result<(), HistoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.open {
            return Ok(());
        }
        inner.open = false;
        inner.log.close().await?;
        tracing::debug!(session = %self.session, "closed navigation history");
        Ok(())
    }

    async fn lock_open(&self) -> Result<MutexGuard<'_, Inner<L, T>>, HistoryError> {
        let inner = self.inner.lock().await;
        if !inner.open {
            return Err(HistoryError::NotReady);
        }
        Ok(inner)
    }

    fn reconcile(&self, inner: &mut Inner<L, T>) {
        if inner.reconcile() {
            self.notify(INITIAL_INDEX, None);
        }
    }

    fn notify(&self, index: i64, state: Option<T>) {
        // No subscribers is fine.
        let _ = self.events.send(Navigated {
            session: self.session,
            index,
            state,
        });
    }
}

fn encode<T: Serialize>(state: &T) -> Result<Vec<u8>, HistoryError> {
    let mut buf = Vec::new();
    ciborium::into_writer(state, &mut buf).map_err(|e| HistoryError::Encode(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, HistoryError> {
    ciborium::from_reader(bytes).map_err(|e| HistoryError::Decode(e.to_string()))
}
