//! In-memory [`ResourceStore`] implementation for tests and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Writers hold the lock for
//! the whole put, so readers observe either the old or the new resource.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{LibraryError, Result};
use crate::models::{Resource, ResourceId, ResourceSummary};

use super::{PutOutcome, PutStatus, ResourceStore};

#[derive(Default)]
struct Inner {
    resources: HashMap<ResourceId, Resource>,
    next_seq: u64,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resources
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn put(&self, resource: &Resource) -> Result<PutOutcome> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = inner.resources.get(&resource.id) {
            let seq = existing.seq;
            if existing.content_hash == resource.content_hash {
                return Ok(PutOutcome {
                    id: resource.id.clone(),
                    seq,
                    status: PutStatus::Unchanged,
                });
            }
            inner
                .resources
                .insert(resource.id.clone(), resource.clone().with_seq(seq));
            return Ok(PutOutcome {
                id: resource.id.clone(),
                seq,
                status: PutStatus::Updated,
            });
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner
            .resources
            .insert(resource.id.clone(), resource.clone().with_seq(seq));
        Ok(PutOutcome {
            id: resource.id.clone(),
            seq,
            status: PutStatus::Created,
        })
    }

    async fn get(&self, id: &ResourceId) -> Result<Resource> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<ResourceSummary>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<ResourceSummary> =
            inner.resources.values().map(Resource::summarize).collect();
        summaries.sort_by_key(|s| s.seq);
        Ok(summaries)
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .resources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| LibraryError::NotFound(id.clone()))
    }

    async fn set_summary(&self, id: &ResourceId, summary: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let resource = inner
            .resources
            .get_mut(id)
            .ok_or_else(|| LibraryError::NotFound(id.clone()))?;
        resource.summary = Some(summary.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use chrono::Utc;

    fn page(url: &str, content: &str) -> Resource {
        Resource::new(
            Source::Url {
                url: url.to_string(),
            },
            url,
            content,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = InMemoryStore::new();
        let r = page("https://a", "alpha");
        let first = store.put(&r).await.unwrap();
        let second = store.put(&r).await.unwrap();
        assert_eq!(first.status, PutStatus::Created);
        assert_eq!(second.status, PutStatus::Unchanged);
        assert_eq!(first.id, second.id);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_sequence() {
        let store = InMemoryStore::new();
        store.put(&page("https://a", "alpha")).await.unwrap();
        store.put(&page("https://b", "beta")).await.unwrap();
        let outcome = store.put(&page("https://a", "alpha v2")).await.unwrap();
        assert_eq!(outcome.status, PutStatus::Updated);
        assert_eq!(outcome.seq, 1);

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].id, ResourceId::from_url("https://a"));
        let stored = store.get(&outcome.id).await.unwrap();
        assert_eq!(stored.content, "alpha v2");
    }

    #[tokio::test]
    async fn test_missing_ids() {
        let store = InMemoryStore::new();
        let id = ResourceId::from_url("https://nowhere");
        assert!(store.get(&id).await.unwrap_err().is_not_found());
        assert!(store.delete(&id).await.unwrap_err().is_not_found());
        assert!(store.set_summary(&id, "x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_and_summary() {
        let store = InMemoryStore::new();
        let outcome = store.put(&page("https://a", "alpha")).await.unwrap();
        store.set_summary(&outcome.id, "about alpha").await.unwrap();
        assert_eq!(
            store.get(&outcome.id).await.unwrap().summary.as_deref(),
            Some("about alpha")
        );
        store.delete(&outcome.id).await.unwrap();
        assert!(store.is_empty());
    }
}
