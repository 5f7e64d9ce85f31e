//! Core data models: resource identifiers, provenance, and stored resources.
//!
//! A [`Resource`] is the unit of knowledge kept in the library. Its
//! [`ResourceId`] is derived deterministically from where it came from, so
//! ingesting the same source twice lands on the same id.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::LibraryError;

/// Number of hex characters kept from the SHA-256 digest for new ids.
const ID_HEX_LEN: usize = 12;

/// Stable resource identifier: a lowercase hex prefix of a SHA-256 digest.
///
/// Parsing accepts 8 to 16 hex characters so ids minted with a different
/// prefix length still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Id for a resource identified by its URL.
    pub fn from_url(url: &str) -> Self {
        Self(sha256_hex(url.as_bytes())[..ID_HEX_LEN].to_string())
    }

    /// Id for a resource identified by its content (local files).
    pub fn from_content(content: &str) -> Self {
        Self(sha256_hex(content.as_bytes())[..ID_HEX_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourceId {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = (8..=16).contains(&s.len())
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(LibraryError::InvalidId(s.to_string()))
        }
    }
}

impl TryFrom<String> for ResourceId {
    type Error = LibraryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a resource came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// A fetched web page.
    Url { url: String },
    /// A local file.
    File { path: PathBuf },
    /// A hit returned by a web search for `query`.
    Search { query: String, url: String },
}

impl Source {
    /// Derive the resource id for this source.
    ///
    /// URL-backed sources hash the URL; files hash their content, so an
    /// edited file becomes a new resource.
    pub fn resource_id(&self, content: &str) -> ResourceId {
        match self {
            Source::Url { url } | Source::Search { url, .. } => ResourceId::from_url(url),
            Source::File { .. } => ResourceId::from_content(content),
        }
    }

    /// Short locator suitable for display (URL or path).
    pub fn locator(&self) -> String {
        match self {
            Source::Url { url } | Source::Search { url, .. } => url.clone(),
            Source::File { path } => format!("file://{}", path.display()),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Search { query, url } => write!(f, "{} (search: {:?})", url, query),
            other => f.write_str(&other.locator()),
        }
    }
}

/// A stored, normalized text document with metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    /// Store-assigned insertion sequence; `0` until the resource is stored.
    pub seq: u64,
    pub source: Source,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
    /// Normalized plain-text body. This is what gets indexed.
    pub content: String,
    /// SHA-256 (hex) of `content`.
    pub content_hash: String,
    /// Original bytes (e.g. HTML), kept for provenance only.
    #[serde(skip)]
    pub raw: Option<Vec<u8>>,
    /// Attached later by the summarize use case.
    pub summary: Option<String>,
}

impl Resource {
    /// Build a new, not yet stored resource. The id and content hash are
    /// derived from `source` and `content`.
    pub fn new(
        source: Source,
        title: impl Into<String>,
        content: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        Self {
            id: source.resource_id(&content),
            seq: 0,
            source,
            title: title.into(),
            fetched_at,
            content_hash: sha256_hex(content.as_bytes()),
            content,
            raw: None,
            summary: None,
        }
    }

    pub fn with_raw(mut self, raw: Vec<u8>) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn summarize(&self) -> ResourceSummary {
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

/// Listing row for a stored resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub id: ResourceId,
    pub seq: u64,
    pub title: String,
    pub source: Source,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_id_is_stable() {
        let a = ResourceId::from_url("https://example.com/a");
        let b = ResourceId::from_url("https://example.com/a");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 12);
        assert_ne!(a, ResourceId::from_url("https://example.com/b"));
    }

    #[test]
    fn test_search_source_ids_by_url() {
        let search = Source::Search {
            query: "rust".into(),
            url: "https://rust-lang.org".into(),
        };
        let url = Source::Url {
            url: "https://rust-lang.org".into(),
        };
        assert_eq!(search.resource_id("x"), url.resource_id("y"));
    }

    #[test]
    fn test_file_source_ids_by_content() {
        let a = Source::File {
            path: PathBuf::from("/tmp/a.md"),
        };
        let b = Source::File {
            path: PathBuf::from("/tmp/b.md"),
        };
        assert_eq!(a.resource_id("same body"), b.resource_id("same body"));
        assert_ne!(a.resource_id("one"), a.resource_id("two"));
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        assert!("abcdef012345".parse::<ResourceId>().is_ok());
        assert!("ABCDEF012345".parse::<ResourceId>().is_err());
        assert!("abc".parse::<ResourceId>().is_err());
        assert!("../../etc/passwd".parse::<ResourceId>().is_err());
    }

    #[test]
    fn test_id_serde_as_string() {
        let id = ResourceId::from_url("https://example.com");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: ResourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ResourceId>("\"nope\"").is_err());
    }

    #[test]
    fn test_new_resource_hashes_content() {
        let r = Resource::new(
            Source::Url {
                url: "https://example.com".into(),
            },
            "Example",
            "hello",
            Utc::now(),
        );
        assert_eq!(r.content_hash, sha256_hex(b"hello"));
        assert_eq!(r.seq, 0);
        assert_eq!(r.summarize().title, "Example");
    }
}
