use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Name used when a log is requested without an explicit name or key.
pub const DEFAULT_LOG_NAME: &str = "history";

/// Namespace prefix mixed into name-derived keys.
const NAME_NAMESPACE: &[u8] = b"wayback/log-name/";

/// Errors from parsing a log key.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid hex in log key: {0}")]
    InvalidHex(String),
    #[error("log key must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Unique identifier for one navigation session (one opened history instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-byte key addressing one append-only log.
///
/// Rendered as 64 lowercase hex characters, which is also the name of the
/// log's directory inside a store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogKey([u8; 32]);

impl LogKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the key for a named log. The same name always yields the same key.
    pub fn from_name(name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(NAME_NAMESPACE);
        hasher.update(name.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for LogKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        let len = bytes.len();
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(len))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogKey({})", &self.to_hex()[..8])
    }
}

impl Serialize for LogKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for LogKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a caller names the log it wants: by human-readable name or by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSelector {
    Name(String),
    Key(LogKey),
}

impl LogSelector {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Select by a hex-encoded key.
    pub fn key_hex(hex: &str) -> Result<Self, KeyError> {
        Ok(Self::Key(hex.parse()?))
    }

    /// Resolve the selector to the key of the log it addresses.
    pub fn key(&self) -> LogKey {
        match self {
            Self::Name(name) => LogKey::from_name(name),
            Self::Key(key) => *key,
        }
    }
}

impl Default for LogSelector {
    fn default() -> Self {
        Self::Name(DEFAULT_LOG_NAME.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_uniqueness() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn name_derived_key_is_stable() {
        assert_eq!(LogKey::from_name("history"), LogKey::from_name("history"));
        assert_ne!(LogKey::from_name("history"), LogKey::from_name("other"));
    }

    #[test]
    fn key_hex_round_trip() {
        let key = LogKey::from_name("history");
        let parsed: LogKey = key.to_hex().parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(key.to_hex().len(), 64);
    }

    #[test]
    fn key_rejects_bad_input() {
        assert!(matches!("zz".parse::<LogKey>(), Err(KeyError::InvalidHex(_))));
        assert_eq!("abcd".parse::<LogKey>(), Err(KeyError::InvalidLength(2)));
    }

    #[test]
    fn default_selector_is_history() {
        let sel = LogSelector::default();
        assert_eq!(sel, LogSelector::name(DEFAULT_LOG_NAME));
        assert_eq!(sel.key(), LogKey::from_name("history"));
    }

    #[test]
    fn key_selector_resolves_to_itself() {
        let key = LogKey::from_bytes([7; 32]);
        let sel = LogSelector::key_hex(&key.to_hex()).unwrap();
        assert_eq!(sel.key(), key);
    }

    #[test]
    fn key_serializes_as_hex_string() {
        let key = LogKey::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: LogKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
