//! Shared identifiers used across the wayback crates.
//!
//! # Invariants
//! - A `LogKey` is always exactly 32 bytes.
//! - Name-derived keys are deterministic across processes and platforms.

mod types;

pub use types::{DEFAULT_LOG_NAME, KeyError, LogKey, LogSelector, SessionId};
