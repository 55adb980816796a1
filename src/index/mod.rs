//! Index Module
//!
//! In-memory key → byte-offset map for a data file.
//!
//! ## Responsibilities
//! - O(1) upsert and lookup
//! - Persist to / restore from a compact JSON index file
//! - Rebuild from the data file with a byte-exact linear scan
//!
//! ## Index File Format
//! ```text
//! [{"key":<key>,"offset":<u64>},{"key":<key>,"offset":<u64>},...]
//! ```
//! Element order is unspecified. Written without indentation.

mod restore;
mod scan;
mod store;

use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use store::IndexStore;

pub(crate) use scan::{is_blank, trim_line};

/// Bounds every key type must satisfy
pub trait RecordKey:
    Eq + Hash + Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<K> RecordKey for K where
    K: Eq + Hash + Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// One persisted (key, offset) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexEntry<K> {
    pub key: K,
    pub offset: u64,
}

/// Borrowing form of [`IndexEntry`] used while persisting
#[derive(Serialize)]
pub(crate) struct IndexEntryRef<'a, K> {
    pub key: &'a K,
    pub offset: u64,
}
