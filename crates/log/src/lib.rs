//! Append-only logs: the durable storage underneath navigation history.
//!
//! # Invariants
//! - Entries are never modified after writing; the log only grows by append
//!   and shrinks by truncation from the end.
//! - Every on-disk entry is covered by a sha256 hash chain.
//! - A failed write leaves the log's observable length unchanged.

mod append_only;
mod error;
mod file;
mod memory;
mod store;

pub use append_only::AppendOnlyLog;
pub use error::LogError;
pub use file::{FileLog, IntegrityManifest, LOG_SCHEMA_VERSION, LogMeta, LogOptions, ManifestEntry};
pub use memory::MemoryLog;
pub use store::LogStore;
