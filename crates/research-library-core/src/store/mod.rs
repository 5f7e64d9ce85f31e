//! Storage abstraction for Research Library.
//!
//! The [`ResourceStore`] trait is the only way the index and query engine
//! reach resource content, enabling pluggable backends (the filesystem
//! store in the application crate, [`memory::InMemoryStore`] for tests).
//!
//! Implementations must be `Send + Sync` and must never expose a partially
//! written resource to [`get`](ResourceStore::get) or
//! [`list`](ResourceStore::list).

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Resource, ResourceId, ResourceSummary};

/// What [`ResourceStore::put`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PutStatus {
    /// First time this id was stored.
    Created,
    /// Same id and same content hash: nothing was rewritten.
    Unchanged,
    /// Same id, different content: rewritten in place.
    Updated,
}

/// Result of a [`ResourceStore::put`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutOutcome {
    pub id: ResourceId,
    /// Insertion sequence of the stored resource. Updates keep the
    /// sequence of the original insertion.
    pub seq: u64,
    pub status: PutStatus,
}

/// Abstract resource storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](ResourceStore::put) | Store a resource idempotently |
/// | [`get`](ResourceStore::get) | Load a full resource |
/// | [`list`](ResourceStore::list) | Summaries in insertion order |
/// | [`delete`](ResourceStore::delete) | Remove a resource |
/// | [`set_summary`](ResourceStore::set_summary) | Attach a summary |
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Store `resource`. Re-putting an id with an unchanged content hash is
    /// a no-op; a changed hash rewrites the resource.
    async fn put(&self, resource: &Resource) -> Result<PutOutcome>;

    /// Load a resource, or [`LibraryError::NotFound`](crate::LibraryError::NotFound).
    async fn get(&self, id: &ResourceId) -> Result<Resource>;

    /// Summaries of all resources, ordered by insertion sequence ascending.
    async fn list(&self) -> Result<Vec<ResourceSummary>>;

    /// Remove a resource, or [`LibraryError::NotFound`](crate::LibraryError::NotFound).
    async fn delete(&self, id: &ResourceId) -> Result<()>;

    /// Attach or replace the summary of an existing resource.
    async fn set_summary(&self, id: &ResourceId, summary: &str) -> Result<()>;
}
