//! Metadata store backed by a JSON file.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::context::RequestContext;
use crate::filter::error::MetadataLookupError;
use crate::filter::spec::FilterSet;
use crate::metadata::{AccountMeta, MetadataStore};

/// Parsed metadata file.
///
/// ```json
/// {
///   "accounts": {
///     "AUTH_test": {
///       "filtering_enabled": true,
///       "filters": { "1": { "tier": "proxy", "kind": "native", "when": "pre_put", "entry_point": "audit" } },
///       "containers": { "logs": { } }
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub accounts: HashMap<String, AccountEntry>,
}

/// Metadata and filters of one account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountEntry {
    #[serde(default)]
    pub filtering_enabled: bool,

    #[serde(default)]
    pub meta: BTreeMap<String, String>,

    /// Filters applied to every container of the account.
    #[serde(default)]
    pub filters: FilterSet,

    /// Per-container filter sets, replacing `filters` for that container.
    #[serde(default)]
    pub containers: HashMap<String, FilterSet>,
}

/// Serves lookups from an in-memory snapshot of a JSON file.
pub struct FileMetadataStore {
    path: Option<PathBuf>,
    snapshot: ArcSwap<MetadataDocument>,
}

impl FileMetadataStore {
    /// Load the store from `path`.
    pub fn load(path: &Path) -> Result<Self, MetadataLookupError> {
        let document = read_document(path)?;
        tracing::info!(path = ?path, accounts = document.accounts.len(), "Filter metadata loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            snapshot: ArcSwap::from_pointee(document),
        })
    }

    /// Store serving a fixed document, with nothing to reload.
    pub fn from_document(document: MetadataDocument) -> Self {
        Self {
            path: None,
            snapshot: ArcSwap::from_pointee(document),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the file. On failure the current snapshot stays in place.
    pub fn reload(&self) -> Result<usize, MetadataLookupError> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot.load().accounts.len());
        };
        let document = read_document(path)?;
        let accounts = document.accounts.len();
        self.snapshot.store(Arc::new(document));
        Ok(accounts)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<MetadataDocument> {
        self.snapshot.load_full()
    }
}

fn read_document(path: &Path) -> Result<MetadataDocument, MetadataLookupError> {
    let content = fs::read_to_string(path)
        .map_err(|e| MetadataLookupError::Unavailable(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content).map_err(|e| MetadataLookupError::Malformed(e.to_string()))
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn account_meta(&self, account: &str) -> Result<AccountMeta, MetadataLookupError> {
        Ok(self
            .snapshot
            .load()
            .accounts
            .get(account)
            .map(|entry| AccountMeta {
                filtering_enabled: entry.filtering_enabled,
                meta: entry.meta.clone(),
            })
            .unwrap_or_default())
    }

    async fn resolve_filters(&self, context: &RequestContext) -> Result<FilterSet, MetadataLookupError> {
        let snapshot = self.snapshot.load();
        let Some(entry) = snapshot.accounts.get(context.account()) else {
            return Ok(FilterSet::new());
        };
        Ok(entry
            .containers
            .get(context.container())
            .unwrap_or(&entry.filters)
            .clone())
    }
}

impl std::fmt::Debug for FileMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMetadataStore")
            .field("path", &self.path)
            .field("accounts", &self.snapshot.load().accounts.len())
            .finish()
    }
}
