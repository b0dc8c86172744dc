//! Metadata file watcher for hot reload.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::metadata::file_store::FileMetadataStore;

/// Reloads a [`FileMetadataStore`] whenever its file changes.
pub struct MetadataWatcher {
    path: PathBuf,
    store: Arc<FileMetadataStore>,
}

impl MetadataWatcher {
    /// Returns `None` for stores that are not backed by a file.
    pub fn new(store: Arc<FileMetadataStore>) -> Option<Self> {
        let path = store.path()?.to_path_buf();
        Some(Self { path, store })
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let store = self.store.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        match store.reload() {
                            Ok(accounts) => {
                                tracing::info!(accounts, "Filter metadata reloaded");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload filter metadata, keeping current snapshot");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Metadata watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Metadata watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataDocument;

    #[test]
    fn test_in_memory_store_has_nothing_to_watch() {
        let store = Arc::new(FileMetadataStore::from_document(MetadataDocument::default()));
        assert!(MetadataWatcher::new(store).is_none());
    }
}
