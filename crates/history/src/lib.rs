//! Navigation history: browser-style back/forward over a durable append-only log.
//!
//! # Invariants
//! - The cursor stays within `[-1, length - 1]`; `-1` is the virtual initial
//!   state and is never written to the log.
//! - The cached state is `None` exactly at the virtual initial state.
//! - After a push the cursor is at the tip.
//! - Pushing from behind the tip discards every later entry; navigation never
//!   creates or destroys entries.
//! - A failed storage operation leaves the cursor where it was.

mod config;
mod error;
mod history;

pub use config::{HistoryConfig, SessionBound};
pub use error::HistoryError;
pub use history::{HistoryStatus, INITIAL_INDEX, Navigated, NavigationHistory};
