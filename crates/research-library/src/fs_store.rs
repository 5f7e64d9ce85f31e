//! Filesystem-backed [`ResourceStore`].
//!
//! # Layout
//!
//! ```text
//! <root>/resources/<id>/current.json       {"generation": N}
//! <root>/resources/<id>/g<N>/meta.json     metadata (ResourceMeta)
//! <root>/resources/<id>/g<N>/content.txt   normalized plain text
//! <root>/resources/<id>/g<N>/raw.bin       original bytes, optional
//! ```
//!
//! # Visibility
//!
//! A new resource directory is written completely under a dot-prefixed
//! staging name and renamed into place, so readers see either no resource
//! or a whole one. An update writes the next generation next to the live
//! one and then replaces `current.json` through a temp file and rename.
//! Readers follow the pointer, so an existing resource never disappears
//! while it is being replaced, and a failed update leaves the old
//! generation live. The superseded generation is deleted afterwards; a
//! reader that loses that race retries.
//!
//! Leftovers of interrupted writes (staging and trash directories, unused
//! generations, temp pointers) are swept on [`FsStore::open`].
//!
//! Writers are serialized through an async mutex that also holds the
//! highest sequence number handed out; readers take no lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use research_library_core::models::{sha256_hex, Resource, ResourceId, ResourceSummary, Source};
use research_library_core::store::{PutOutcome, PutStatus, ResourceStore};
use research_library_core::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const RESOURCES_DIR: &str = "resources";
const POINTER_FILE: &str = "current.json";
const META_FILE: &str = "meta.json";
const CONTENT_FILE: &str = "content.txt";
const RAW_FILE: &str = "raw.bin";
const STAGING_PREFIX: &str = ".staging-";
const TRASH_PREFIX: &str = ".trash-";

const META_SCHEMA_VERSION: u32 = 1;
const FIRST_GENERATION: u64 = 1;
const READ_ATTEMPTS: usize = 8;

static NONCE: AtomicU64 = AtomicU64::new(0);

/// On-disk metadata for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResourceMeta {
    schema_version: u32,
    id: ResourceId,
    seq: u64,
    source: Source,
    title: String,
    fetched_at: DateTime<Utc>,
    content_hash: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    has_raw: bool,
}

impl ResourceMeta {
    fn from_resource(resource: &Resource, seq: u64) -> Self {
        Self {
            schema_version: META_SCHEMA_VERSION,
            id: resource.id.clone(),
            seq,
            source: resource.source.clone(),
            title: resource.title.clone(),
            fetched_at: resource.fetched_at,
            content_hash: resource.content_hash.clone(),
            summary: resource.summary.clone(),
            has_raw: resource.raw.is_some(),
        }
    }

    fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            id: self.id.clone(),
            seq: self.seq,
            title: self.title.clone(),
            source: self.source.clone(),
            fetched_at: self.fetched_at,
            content_hash: self.content_hash.clone(),
        }
    }
}

/// Contents of `current.json`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Pointer {
    generation: u64,
}

/// Result of reading one resource.
enum Read<T> {
    Missing,
    /// The generation we followed was superseded and deleted under us.
    Torn,
    Complete(T),
}

/// Resource store rooted at a directory.
pub struct FsStore {
    root: PathBuf,
    /// Highest `seq` handed out. Writers hold this lock for the whole write.
    last_seq: Mutex<u64>,
}

impl FsStore {
    /// Open (creating if needed) a store under `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            root: root.into(),
            last_seq: Mutex::new(0),
        };
        let dir = store.resources_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LibraryError::storage(format!("creating {}", dir.display()), e))?;

        let mut last_seq = store.last_seq.lock().await;
        let swept = store.sweep_leftovers().await?;
        if swept > 0 {
            tracing::info!(swept, "removed leftovers of interrupted writes");
        }
        *last_seq = store.scan().await?.iter().map(|m| m.seq).max().unwrap_or(0);
        drop(last_seq);
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resources_dir(&self) -> PathBuf {
        self.root.join(RESOURCES_DIR)
    }

    fn resource_dir(&self, id: &ResourceId) -> PathBuf {
        self.resources_dir().join(id.as_str())
    }

    fn scratch_dir(&self, prefix: &str, id: &ResourceId) -> PathBuf {
        self.resources_dir().join(scratch_name(prefix, id.as_str()))
    }

    /// Delete staging and trash directories, unused generations, and temp
    /// pointers left behind by a crash. Caller holds the writer lock.
    async fn sweep_leftovers(&self) -> Result<usize> {
        let dir = self.resources_dir();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err("reading", &dir))?;
        let mut swept = 0;
        while let Some(entry) = entries.next_entry().await.map_err(io_err("reading", &dir))? {
            let name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path();
            if name.starts_with(STAGING_PREFIX) || name.starts_with(TRASH_PREFIX) {
                remove_path(&path).await?;
                swept += 1;
            } else if name.parse::<ResourceId>().is_ok() {
                swept += self.sweep_resource(&path).await?;
            }
        }
        Ok(swept)
    }

    /// Remove everything in a resource directory except the pointer and the
    /// generation it names.
    async fn sweep_resource(&self, dir: &Path) -> Result<usize> {
        let Some(pointer) = read_pointer(dir).await? else {
            tracing::warn!(path = %dir.display(), "resource dir without {}, leaving it", POINTER_FILE);
            return Ok(0);
        };
        let live = generation_name(pointer.generation);
        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err("reading", dir))?;
        let mut swept = 0;
        while let Some(entry) = entries.next_entry().await.map_err(io_err("reading", dir))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name != POINTER_FILE && name != live {
                remove_path(&entry.path()).await?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// Follow the pointer under `dir` once and read that generation's meta.
    async fn read_meta_once(&self, dir: &Path) -> Result<Read<(u64, ResourceMeta)>> {
        let Some(pointer) = read_pointer(dir).await? else {
            return Ok(Read::Missing);
        };
        let path = generation_dir(dir, pointer.generation).join(META_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Read::Torn),
            Err(e) => return Err(LibraryError::storage(format!("reading {}", path.display()), e)),
        };
        let meta = serde_json::from_slice(&bytes)
            .map_err(|e| LibraryError::corrupt(path.display(), e))?;
        Ok(Read::Complete((pointer.generation, meta)))
    }

    /// Live generation and metadata of the resource under `dir`. `None` when
    /// there is no such resource.
    async fn read_meta(&self, dir: &Path) -> Result<Option<(u64, ResourceMeta)>> {
        retry_torn(dir, || self.read_meta_once(dir)).await
    }

    async fn scan(&self) -> Result<Vec<ResourceMeta>> {
        let dir = self.resources_dir();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err("reading", &dir))?;
        let mut metas = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err("reading", &dir))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if name.parse::<ResourceId>().is_err() {
                tracing::warn!(entry = %name, "ignoring unexpected entry in store");
                continue;
            }
            if let Some((_, meta)) = self.read_meta(&entry.path()).await? {
                metas.push(meta);
            }
        }
        metas.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.id.cmp(&b.id)));
        Ok(metas)
    }

    /// Write one complete generation directory at `target`.
    async fn write_generation(
        &self,
        target: &Path,
        resource: &Resource,
        meta: &ResourceMeta,
    ) -> Result<()> {
        tokio::fs::create_dir(target)
            .await
            .map_err(io_err("creating", target))?;

        let written = async {
            write_file(&target.join(CONTENT_FILE), resource.content.as_bytes()).await?;
            if let Some(raw) = &resource.raw {
                write_file(&target.join(RAW_FILE), raw).await?;
            }
            write_meta(&target.join(META_FILE), meta).await
        }
        .await;

        if let Err(e) = written {
            cleanup(target).await;
            return Err(e);
        }
        Ok(())
    }

    /// Publish a new resource: stage the directory with its first generation
    /// and pointer, then rename it into place.
    async fn create(&self, dir: &Path, resource: &Resource, meta: &ResourceMeta) -> Result<()> {
        let staging = self.scratch_dir(STAGING_PREFIX, &resource.id);
        tokio::fs::create_dir(&staging)
            .await
            .map_err(io_err("creating", &staging))?;

        let staged = async {
            self.write_generation(&generation_dir(&staging, FIRST_GENERATION), resource, meta)
                .await?;
            write_pointer(&staging, FIRST_GENERATION).await?;
            tokio::fs::rename(&staging, dir)
                .await
                .map_err(io_err("publishing", dir))
        }
        .await;

        if staged.is_err() {
            cleanup(&staging).await;
        }
        staged
    }

    /// Replace the live generation of an existing resource. The old
    /// generation stays live until the pointer swap succeeds.
    async fn replace(
        &self,
        dir: &Path,
        current: u64,
        resource: &Resource,
        meta: &ResourceMeta,
    ) -> Result<()> {
        let next = current + 1;
        let next_dir = generation_dir(dir, next);
        self.write_generation(&next_dir, resource, meta).await?;

        if let Err(e) = write_pointer(dir, next).await {
            cleanup(&next_dir).await;
            return Err(e);
        }

        let old_dir = generation_dir(dir, current);
        if let Err(e) = tokio::fs::remove_dir_all(&old_dir).await {
            // Swept on next open.
            tracing::warn!(path = %old_dir.display(), error = %e, "failed to delete superseded generation");
        }
        Ok(())
    }

    async fn read_resource(&self, dir: &Path) -> Result<Read<Resource>> {
        let (generation, meta) = match self.read_meta_once(dir).await? {
            Read::Missing => return Ok(Read::Missing),
            Read::Torn => return Ok(Read::Torn),
            Read::Complete(found) => found,
        };
        let gen_dir = generation_dir(dir, generation);

        let content_path = gen_dir.join(CONTENT_FILE);
        let content = match tokio::fs::read_to_string(&content_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Read::Torn),
            Err(e) => return Err(LibraryError::storage(format!("reading {}", content_path.display()), e)),
        };
        if sha256_hex(content.as_bytes()) != meta.content_hash {
            return Err(LibraryError::storage(
                format!("reading {}", content_path.display()),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "content does not match its recorded hash",
                ),
            ));
        }

        let raw = if meta.has_raw {
            let raw_path = gen_dir.join(RAW_FILE);
            match tokio::fs::read(&raw_path).await {
                Ok(raw) => Some(raw),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Read::Torn),
                Err(e) => return Err(LibraryError::storage(format!("reading {}", raw_path.display()), e)),
            }
        } else {
            None
        };

        Ok(Read::Complete(Resource {
            id: meta.id,
            seq: meta.seq,
            source: meta.source,
            title: meta.title,
            fetched_at: meta.fetched_at,
            content,
            content_hash: meta.content_hash,
            raw,
            summary: meta.summary,
        }))
    }
}

#[async_trait]
impl ResourceStore for FsStore {
    async fn put(&self, resource: &Resource) -> Result<PutOutcome> {
        let mut last_seq = self.last_seq.lock().await;
        let dir = self.resource_dir(&resource.id);

        let (seq, status) = match self.read_meta(&dir).await? {
            Some((_, existing)) if existing.content_hash == resource.content_hash => {
                tracing::debug!(id = %resource.id, "content unchanged, skipping write");
                return Ok(PutOutcome {
                    id: resource.id.clone(),
                    seq: existing.seq,
                    status: PutStatus::Unchanged,
                });
            }
            Some((generation, existing)) => {
                let meta = ResourceMeta::from_resource(resource, existing.seq);
                self.replace(&dir, generation, resource, &meta).await?;
                (existing.seq, PutStatus::Updated)
            }
            None => {
                let seq = *last_seq + 1;
                let meta = ResourceMeta::from_resource(resource, seq);
                self.create(&dir, resource, &meta).await?;
                *last_seq = seq;
                (seq, PutStatus::Created)
            }
        };

        tracing::debug!(id = %resource.id, seq, ?status, "stored resource");
        Ok(PutOutcome {
            id: resource.id.clone(),
            seq,
            status,
        })
    }

    async fn get(&self, id: &ResourceId) -> Result<Resource> {
        let path = self.resource_dir(id);
        let dir = path.as_path();
        retry_torn(dir, || self.read_resource(dir))
            .await?
            .ok_or_else(|| LibraryError::NotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<ResourceSummary>> {
        Ok(self.scan().await?.iter().map(ResourceMeta::summary).collect())
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        let _guard = self.last_seq.lock().await;
        let dir = self.resource_dir(id);
        if self.read_meta(&dir).await?.is_none() {
            return Err(LibraryError::NotFound(id.clone()));
        }

        let trash = self.scratch_dir(TRASH_PREFIX, id);
        tokio::fs::rename(&dir, &trash)
            .await
            .map_err(io_err("moving aside", &dir))?;
        if let Err(e) = tokio::fs::remove_dir_all(&trash).await {
            // Swept on next open.
            tracing::warn!(path = %trash.display(), error = %e, "failed to delete resource dir");
        }
        tracing::debug!(%id, "deleted resource");
        Ok(())
    }

    async fn set_summary(&self, id: &ResourceId, summary: &str) -> Result<()> {
        let _guard = self.last_seq.lock().await;
        let dir = self.resource_dir(id);
        let (generation, mut meta) = self
            .read_meta(&dir)
            .await?
            .ok_or_else(|| LibraryError::NotFound(id.clone()))?;
        meta.summary = Some(summary.to_string());

        let gen_dir = generation_dir(&dir, generation);
        let path = gen_dir.join(META_FILE);
        let tmp = gen_dir.join(format!(".{}.tmp", META_FILE));
        write_meta(&tmp, &meta).await?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(io_err("replacing", &path))?;
        Ok(())
    }
}

/// Run `read` until it sees a whole resource or none, retrying reads that
/// lost a race with a writer.
async fn retry_torn<T, F, Fut>(dir: &Path, mut read: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Read<T>>>,
{
    for _ in 0..READ_ATTEMPTS {
        match read().await? {
            Read::Missing => return Ok(None),
            Read::Complete(found) => return Ok(Some(found)),
            Read::Torn => {
                tracing::debug!(path = %dir.display(), "read raced with a writer, retrying");
                tokio::task::yield_now().await;
            }
        }
    }
    Err(LibraryError::storage(
        format!("reading {}", dir.display()),
        std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "resource kept changing while being read",
        ),
    ))
}

fn generation_name(generation: u64) -> String {
    format!("g{}", generation)
}

fn generation_dir(dir: &Path, generation: u64) -> PathBuf {
    dir.join(generation_name(generation))
}

fn scratch_name(prefix: &str, stem: &str) -> String {
    let nonce = NONCE.fetch_add(1, Ordering::Relaxed);
    format!("{}{}-{}-{}", prefix, stem, std::process::id(), nonce)
}

/// `None` when `dir` or its pointer does not exist.
async fn read_pointer(dir: &Path) -> Result<Option<Pointer>> {
    let path = dir.join(POINTER_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LibraryError::storage(format!("reading {}", path.display()), e)),
    };
    let pointer = serde_json::from_slice(&bytes).map_err(|e| LibraryError::corrupt(path.display(), e))?;
    Ok(Some(pointer))
}

/// Point `dir` at `generation` through a temp file and rename.
async fn write_pointer(dir: &Path, generation: u64) -> Result<()> {
    let path = dir.join(POINTER_FILE);
    let tmp = dir.join(scratch_name(".", POINTER_FILE));
    let json = serde_json::to_vec(&Pointer { generation })
        .map_err(|e| LibraryError::corrupt(path.display(), e))?;
    write_file(&tmp, &json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        cleanup(&tmp).await;
        return Err(LibraryError::storage(format!("replacing {}", path.display()), e));
    }
    Ok(())
}

async fn remove_path(path: &Path) -> Result<()> {
    let removed = if tokio::fs::metadata(path)
        .await
        .map_err(io_err("checking", path))?
        .is_dir()
    {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    removed.map_err(io_err("removing", path))
}

/// Best-effort removal after a failed write.
async fn cleanup(path: &Path) {
    if let Err(e) = remove_path(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to clean up after write error");
    }
}

fn io_err<'a>(action: &'a str, path: &'a Path) -> impl FnOnce(std::io::Error) -> LibraryError + 'a {
    move |e| LibraryError::storage(format!("{} {}", action, path.display()), e)
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(io_err("writing", path))
}

async fn write_meta(path: &Path, meta: &ResourceMeta) -> Result<()> {
    let json = serde_json::to_vec_pretty(meta).map_err(|e| LibraryError::corrupt(path.display(), e))?;
    write_file(path, &json).await
}
