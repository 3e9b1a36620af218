//! JSONL event log
//!
//! A tracing layer that appends every event as one JSON object per line, so
//! a client session can be replayed or queried afterwards.
//!
//! ```text
//! {"ts":"2026-10-19T09:12:03.511Z","level":"info","target":"feedsync_core::sync::engine","msg":"Opened subscription","fields":{"collection":"posts","id":1}}
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use feedsync_core::logging::JsonlLayer;
//! use tracing_subscriber::prelude::*;
//!
//! let jsonl = JsonlLayer::create("session.jsonl")?;
//! tracing_subscriber::registry()
//!     .with(jsonl)
//!     .with(tracing_subscriber::fmt::layer())
//!     .init();
//! ```
//!
//! ```bash
//! # Failed writes and live query faults
//! jq 'select(.level == "error" or .level == "warn")' session.jsonl
//! ```

mod entry;
mod layer;

pub use entry::{read_entries, LogEntry};
pub use layer::JsonlLayer;
