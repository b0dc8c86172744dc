//! Filter metadata resolution.
//!
//! # Data Flow
//! ```text
//! metadata file (JSON)
//!     → file_store.rs (parse into an immutable snapshot)
//!     → ArcSwap<MetadataDocument>
//!     → account_meta / resolve_filters per request
//!
//! On file change:
//!     watcher.rs detects change
//!     → file_store.rs reloads
//!     → atomic swap of the snapshot (previous kept on failure)
//! ```
//!
//! # Design Decisions
//! - Lookups never block on a lock held by the filter core
//! - Container filter sets replace the account set, they are not merged
//! - Unknown accounts have filtering disabled and no filters

pub mod file_store;
pub mod watcher;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::context::RequestContext;
use crate::filter::error::MetadataLookupError;
use crate::filter::spec::FilterSet;

pub use file_store::{FileMetadataStore, MetadataDocument};
pub use watcher::MetadataWatcher;

/// Account-level metadata relevant to filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    /// Whether requests for this account are filtered at all.
    #[serde(default)]
    pub filtering_enabled: bool,

    /// Remaining account metadata, passed through untouched.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// Source of account metadata and configured filter sets.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn account_meta(&self, account: &str) -> Result<AccountMeta, MetadataLookupError>;

    /// Full filter set configured for the object targeted by `context`.
    async fn resolve_filters(&self, context: &RequestContext) -> Result<FilterSet, MetadataLookupError>;
}
