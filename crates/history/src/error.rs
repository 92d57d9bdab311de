use wayback_log::LogError;

/// Errors from navigation history operations.
///
/// Navigating to an unreachable position is not an error; see
/// [`NavigationHistory::go`](crate::NavigationHistory::go).
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history is closed")]
    NotReady,
    #[error("storage failure: {0}")]
    Storage(#[from] LogError),
    #[error("failed to encode state: {0}")]
    Encode(String),
    #[error("failed to decode state: {0}")]
    Decode(String),
}
