use serde::{Deserialize, Serialize};

/// Lowest index a freshly opened history may navigate to.
///
/// The bound is set when the history is opened. It only ever moves down, and
/// only when a fork from the initial state truncates the log below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBound {
    /// Entries written by earlier sessions are out of reach; a session starts
    /// at the virtual initial state and only sees entries it pushes itself.
    #[default]
    Tail,
    /// Every persisted entry is reachable, as if the session had written them.
    Start,
}

impl SessionBound {
    /// Minimum reachable index for a log of length `len` at open time.
    pub fn min_index(self, len: u64) -> i64 {
        match self {
            Self::Tail => len as i64,
            Self::Start => 0,
        }
    }
}

/// Configuration for a navigation history instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// How far into previously persisted entries a new session may navigate.
    pub session_bound: SessionBound,
    /// Capacity of the navigation notification channel.
    pub notify_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            session_bound: SessionBound::Tail,
            notify_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_bound_starts_past_existing_entries() {
        assert_eq!(SessionBound::Tail.min_index(0), 0);
        assert_eq!(SessionBound::Tail.min_index(3), 3);
        assert_eq!(SessionBound::Start.min_index(3), 0);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: HistoryConfig = serde_json::from_str(r#"{"session_bound":"start"}"#).unwrap();
        assert_eq!(config.session_bound, SessionBound::Start);
        assert_eq!(config.notify_capacity, 64);
    }

    #[test]
    fn empty_config_is_default() {
        let config: HistoryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, HistoryConfig::default());
    }
}
