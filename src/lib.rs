//! # keyline
//!
//! Key-indexed random access over append-only newline-delimited JSON:
//! - Streaming writer with exact byte-offset accounting
//! - Persisted or rebuilt key → offset index
//! - Point and batch reads with bounded, seek-ordered concurrency
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   records    ┌─────────────────────────────┐
//! │    Caller    │─────────────►│           Writer            │
//! └──────┬───────┘              │  LineSink (128 KiB buffer)  │
//!        │                      └──────┬───────────────┬──────┘
//!        │                             │               │
//!        │                             ▼               ▼
//!        │                      ┌─────────────┐ ┌─────────────┐
//!        │                      │  data.jsonl │ │ data.index  │
//!        │                      │ (one record │ │ [{key,      │
//!        │                      │  per line)  │ │   offset}]  │
//!        │                      └──────▲──────┘ └──────┬──────┘
//!        │                             │ seek + read   │ restore
//!        │                      ┌──────┴───────────────▼──────┐
//!        └─────────────────────►│           Reader            │
//!          read_by_key(s)       │ IndexStore + ReadPermits    │
//!                               └─────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use keyline::{Reader, Writer};
//! use serde::{Deserialize, Serialize};
//! use std::path::Path;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Order {
//!     id: String,
//!     total: u64,
//! }
//!
//! # fn main() -> keyline::Result<()> {
//! let orders = vec![Order { id: "a".into(), total: 1 }];
//! let mut writer = Writer::new(|o: &Order| o.id.clone());
//! writer.write_to(&orders, Path::new("orders.jsonl"))?;
//!
//! let reader: Reader<Order, String> = Reader::open("orders.jsonl")?;
//! let order = reader.read_by_key(&"a".to_string())?;
//! assert_eq!(order.map(|o| o.total), Some(1));
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cancel;
pub mod codec;
pub mod config;
pub mod error;
pub mod paths;

pub mod index;
pub mod reader;
pub mod writer;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cancel::CancellationToken;
pub use codec::{JsonCodec, RecordCodec};
pub use config::{ReaderConfig, WriterConfig};
pub use error::{KeylineError, Result};
pub use index::{IndexEntry, IndexStore, RecordKey};
pub use paths::default_index_path;
pub use reader::{PermitStats, Reader, ReaderBuilder};
pub use writer::{WriteSummary, Writer};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of keyline
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
