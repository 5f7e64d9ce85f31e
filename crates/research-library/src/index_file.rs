//! Index snapshot persistence (`index.json`).
//!
//! The snapshot is a derived cache of the store. Anything wrong with it is
//! reported as [`LibraryError::IndexDegraded`] so the caller can rebuild
//! instead of failing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use research_library_core::index::{IndexSnapshot, InvertedIndex};
use research_library_core::tokenize::TokenizerConfig;
use research_library_core::{LibraryError, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Load the snapshot at `path` for an index using `tokenizer`.
pub async fn load(path: &Path, tokenizer: &TokenizerConfig) -> Result<InvertedIndex> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LibraryError::degraded(format!(
                "no index snapshot at {}",
                path.display()
            )));
        }
        Err(e) => {
            return Err(LibraryError::degraded(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )));
        }
    };

    let snapshot: IndexSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
        LibraryError::degraded(format!("unreadable snapshot {}: {}", path.display(), e))
    })?;

    InvertedIndex::from_snapshot(tokenizer, snapshot)
}

/// Write a snapshot of `index` to `path` via a temp file and rename.
pub async fn save(path: &Path, index: &InvertedIndex) -> Result<()> {
    let snapshot = index.snapshot();
    let json = serde_json::to_vec(&snapshot)
        .map_err(|e| LibraryError::corrupt(path.display(), e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LibraryError::storage(format!("creating {}", parent.display()), e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(
        ".tmp-{}-{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|e| LibraryError::storage(format!("writing {}", tmp.display()), e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
            tracing::warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp snapshot");
        }
        return Err(LibraryError::storage(format!("replacing {}", path.display()), e));
    }

    tracing::debug!(
        path = %path.display(),
        documents = snapshot.documents.len(),
        "saved index snapshot"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use research_library_core::index::LexicalIndex;
    use research_library_core::models::{Resource, Source};

    fn doc(url: &str, seq: u64, content: &str) -> Resource {
        Resource::new(Source::Url { url: url.into() }, url, content, Utc::now()).with_seq(seq)
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        let config = TokenizerConfig::default();

        let index = InvertedIndex::new(&config);
        index.insert(&doc("https://a", 1, "quantum computing uses qubits"));
        index.insert(&doc("https://b", 2, "classical computing uses bits"));
        save(&path, &index).await.unwrap();

        let loaded = load(&path, &config).await.unwrap();
        assert_eq!(loaded.stats(), index.stats());
        let terms = vec!["qubits".to_string()];
        assert_eq!(loaded.search(&terms), index.search(&terms));
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("index.json"), &TokenizerConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LibraryError::IndexDegraded(_)));
    }

    #[tokio::test]
    async fn test_garbage_snapshot_is_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, b"{\"format_version\": ").unwrap();
        let err = load(&path, &TokenizerConfig::default()).await.err().unwrap();
        assert!(matches!(err, LibraryError::IndexDegraded(_)));
    }
}
