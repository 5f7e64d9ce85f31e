//! The library facade: store, index, and query engine wired together.
//!
//! [`Library`] owns a [`FsStore`] and an [`InvertedIndex`] loaded from the
//! snapshot next to it, and keeps the two consistent:
//!
//! - **ingest**: `put` into the store, then update the index and persist
//!   its snapshot. A snapshot failure never undoes the `put`; it is
//!   reported as [`IndexStatus::Degraded`].
//! - **remove**: delete from the store, then retract from the index.
//! - **rebuild**: re-derive the whole index from the store.
//!
//! On open, the snapshot is compared against the store listing (ids and
//! content hashes). Any difference marks the index degraded until the next
//! rebuild.
//!
//! Ingest, remove, and rebuild run one at a time under a single async
//! write lock held from the store write through the snapshot save, so a
//! rebuild never installs a listing that misses a concurrent ingest.
//! Queries take no library lock.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use research_library_core::index::{IndexStats, InvertedIndex, LexicalIndex};
use research_library_core::models::{Resource, ResourceId, ResourceSummary};
use research_library_core::query::{Answer, QueryEngine, QueryParams};
use research_library_core::store::{PutOutcome, PutStatus, ResourceStore};
use research_library_core::{LibraryError, Result};
use serde::Serialize;
use tokio::sync::MutexGuard;

use crate::config::Config;
use crate::fs_store::FsStore;
use crate::index_file;

/// Health of the index relative to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexStatus {
    Consistent,
    Degraded { reason: String },
}

impl IndexStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, IndexStatus::Degraded { .. })
    }
}

/// Result of [`Library::ingest`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    #[serde(flatten)]
    pub outcome: PutOutcome,
    pub index: IndexStatus,
}

/// Result of [`Library::rebuild`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    pub documents: usize,
    pub terms: usize,
    /// Resources listed but gone by the time they were read.
    pub skipped: usize,
}

/// Counters for `rlib stats`.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub resources: usize,
    pub index: IndexStats,
    pub status: IndexStatus,
    pub top_terms: Vec<(String, usize)>,
}

pub struct Library {
    config: Config,
    store: FsStore,
    index: InvertedIndex,
    index_path: PathBuf,
    status: Mutex<IndexStatus>,
    /// Held across every store write, index mutation, and snapshot save.
    write_lock: tokio::sync::Mutex<()>,
}

impl Library {
    /// Open the store and load the index snapshot.
    ///
    /// A missing or stale snapshot does not fail the open: unless the store
    /// is empty, the library starts with an empty index in
    /// [`IndexStatus::Degraded`].
    pub async fn open(config: Config) -> Result<Self> {
        let store = FsStore::open(&config.store.root).await?;
        let tokenizer = config.index.tokenizer_config();
        let index_path = config.index_path();

        let loaded = index_file::load(&index_path, &tokenizer).await;
        let store_empty = loaded.is_err() && store.list().await?.is_empty();

        let (index, status) = match loaded {
            Ok(index) => (index, IndexStatus::Consistent),
            // An empty index is accurate for an empty store.
            Err(_) if store_empty => (InvertedIndex::new(&tokenizer), IndexStatus::Consistent),
            Err(e) => {
                let reason = match e {
                    LibraryError::IndexDegraded(reason) => reason,
                    other => other.to_string(),
                };
                (InvertedIndex::new(&tokenizer), IndexStatus::Degraded { reason })
            }
        };

        let library = Self {
            config,
            store,
            index,
            index_path,
            status: Mutex::new(status),
            write_lock: tokio::sync::Mutex::new(()),
        };
        library.check_index().await?;
        if let IndexStatus::Degraded { reason } = library.status() {
            tracing::warn!(%reason, "index degraded; run `rlib rebuild`");
        }
        Ok(library)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &FsStore {
        &self.store
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn status(&self) -> IndexStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_status(&self, status: IndexStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Keep the first recorded reason; a degraded index stays degraded
    /// until rebuilt.
    fn degrade(&self, reason: String) -> IndexStatus {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if !status.is_degraded() {
            *status = IndexStatus::Degraded { reason };
        }
        status.clone()
    }

    /// Compare the index with the store and record the result.
    pub async fn check_index(&self) -> Result<IndexStatus> {
        let _guard = self.write_lock.lock().await;
        if self.status().is_degraded() {
            return Ok(self.status());
        }

        let stored: Vec<ResourceSummary> = self.store.list().await?;
        let indexed = self.index.content_hashes();

        let missing = stored.iter().filter(|s| !indexed.contains_key(&s.id)).count();
        let stale = stored
            .iter()
            .filter(|s| indexed.get(&s.id).is_some_and(|h| *h != s.content_hash))
            .count();
        let dangling = indexed.len() + missing - stored.len();

        if missing + stale + dangling > 0 {
            return Ok(self.degrade(format!(
                "index out of sync with store ({} missing, {} stale, {} dangling)",
                missing, stale, dangling
            )));
        }
        Ok(IndexStatus::Consistent)
    }

    /// Store `resource` and index it.
    ///
    /// Store failures are returned. Index persistence failures are not:
    /// they are logged and reported in [`IngestReport::index`].
    pub async fn ingest(&self, resource: Resource) -> Result<IngestReport> {
        let guard = self.write_lock.lock().await;
        let outcome = self.store.put(&resource).await?;

        let index = if outcome.status == PutStatus::Unchanged && self.index.contains(&outcome.id) {
            self.status()
        } else {
            self.index.insert(&resource.with_seq(outcome.seq));
            self.persist(&guard).await
        };
        drop(guard);

        tracing::info!(id = %outcome.id, status = ?outcome.status, "ingested resource");
        Ok(IngestReport { outcome, index })
    }

    /// Delete a resource and retract it from the index.
    pub async fn remove(&self, id: &ResourceId) -> Result<IndexStatus> {
        let guard = self.write_lock.lock().await;
        self.store.delete(id).await?;
        if !self.index.remove(id) {
            tracing::debug!(%id, "removed resource was not indexed");
        }
        Ok(self.persist(&guard).await)
    }

    /// Rebuild the index from every resource in the store.
    ///
    /// The new state is assembled off to the side and swapped in whole, so
    /// concurrent queries see either the old or the new index.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let guard = self.write_lock.lock().await;
        self.rebuild_locked(&guard).await
    }

    async fn rebuild_locked(&self, _guard: &MutexGuard<'_, ()>) -> Result<RebuildReport> {
        let summaries = self.store.list().await?;
        let mut builder = self.index.builder();
        let mut skipped = 0;
        for summary in &summaries {
            match self.store.get(&summary.id).await {
                Ok(resource) => builder.add(&resource),
                Err(LibraryError::NotFound(id)) => {
                    tracing::warn!(%id, "resource vanished during rebuild");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        self.index.install(builder);

        if let Err(e) = index_file::save(&self.index_path, &self.index).await {
            self.degrade(e.to_string());
            return Err(e);
        }
        self.set_status(IndexStatus::Consistent);

        let stats = self.index.stats();
        tracing::info!(documents = stats.documents, terms = stats.terms, "rebuilt index");
        Ok(RebuildReport {
            documents: stats.documents,
            terms: stats.terms,
            skipped,
        })
    }

    /// Rebuild if the index is degraded. Returns the report when a rebuild
    /// ran.
    pub async fn ensure_index(&self) -> Result<Option<RebuildReport>> {
        if !self.status().is_degraded() {
            return Ok(None);
        }
        let guard = self.write_lock.lock().await;
        // Another caller may have repaired it while we waited.
        match self.status() {
            IndexStatus::Degraded { reason } => {
                tracing::info!(%reason, "rebuilding degraded index");
                self.rebuild_locked(&guard).await.map(Some)
            }
            IndexStatus::Consistent => Ok(None),
        }
    }

    /// Answer a question from the local library.
    pub async fn answer(&self, question: &str, params: QueryParams) -> Result<Answer> {
        QueryEngine::new(&self.store, &self.index, params)
            .answer(question)
            .await
    }

    /// Query parameters from config.
    pub fn query_params(&self) -> QueryParams {
        self.config.query.params()
    }

    pub async fn list(&self) -> Result<Vec<ResourceSummary>> {
        self.store.list().await
    }

    pub async fn get(&self, id: &ResourceId) -> Result<Resource> {
        self.store.get(id).await
    }

    /// Attach a summary. Summaries are not indexed.
    pub async fn set_summary(&self, id: &ResourceId, summary: &str) -> Result<()> {
        self.store.set_summary(id, summary).await
    }

    pub async fn stats(&self) -> Result<LibraryStats> {
        Ok(LibraryStats {
            resources: self.store.list().await?.len(),
            index: self.index.stats(),
            status: self.check_index().await?,
            top_terms: self.index.top_terms(10),
        })
    }

    /// Save the snapshot. The caller holds `write_lock`, so the last save
    /// carries the newest state.
    async fn persist(&self, _guard: &MutexGuard<'_, ()>) -> IndexStatus {
        match index_file::save(&self.index_path, &self.index).await {
            Ok(()) => self.status(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist index snapshot");
                self.degrade(e.to_string())
            }
        }
    }
}
