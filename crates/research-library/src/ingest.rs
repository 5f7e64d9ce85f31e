//! File ingestion for `rlib ingest`.
//!
//! A path is either a single text file or a directory walked with
//! `walkdir` and filtered by the `[ingest]` include/exclude globs. Each file
//! becomes one [`Resource`]. Provenance defaults to the file itself; a
//! `--url` (optionally with `--query`) records web provenance instead, which
//! is how content fetched by an outer tool enters the library.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use research_library_core::models::{Resource, Source};
use research_library_core::store::PutStatus;
use walkdir::WalkDir;

use crate::config::{Config, IngestConfig};
use crate::library::{IndexStatus, Library};

/// Lines this long or longer are never taken as a title.
const MAX_TITLE_LINE_CHARS: usize = 200;

/// Provenance overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub url: Option<String>,
    pub query: Option<String>,
    pub title: Option<String>,
    pub raw: Option<PathBuf>,
}

/// Files under `path` selected by the ingest globs, sorted.
///
/// A plain file is returned as-is, without glob filtering.
pub fn collect_files(path: &Path, ingest: &IngestConfig) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        bail!("Path does not exist: {}", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let include_set = build_globset(&ingest.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(ingest.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(ingest.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file = entry.path();
        let relative = file.strip_prefix(path).unwrap_or(file);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(file.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Read `path` into a resource, applying `options`. Fails on a file with
/// no content.
pub fn build_resource(path: &Path, options: &IngestOptions) -> Result<Resource> {
    match load_resource(path, options)? {
        Some(resource) => Ok(resource),
        None => bail!("No content in {}", path.display()),
    }
}

/// Like [`build_resource`], but `None` for a blank file.
pub fn load_resource(path: &Path, options: &IngestOptions) -> Result<Option<Resource>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    if content.trim().is_empty() {
        return Ok(None);
    }

    let source = match (&options.url, &options.query) {
        (Some(url), Some(query)) => Source::Search {
            query: query.clone(),
            url: url.clone(),
        },
        (Some(url), None) => Source::Url { url: url.clone() },
        (None, Some(_)) => bail!("--query requires --url"),
        (None, None) => Source::File {
            path: std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
        },
    };

    let fallback = match &source {
        Source::File { .. } => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string()),
        other => other.locator(),
    };
    let title = options
        .title
        .clone()
        .unwrap_or_else(|| extract_title(&content, &fallback));

    let mut resource = Resource::new(source, title, content, Utc::now());
    if let Some(raw_path) = &options.raw {
        let raw = std::fs::read(raw_path)
            .with_context(|| format!("Failed to read raw file {}", raw_path.display()))?;
        resource = resource.with_raw(raw);
    }
    Ok(Some(resource))
}

/// Pick a display title for a document.
///
/// In order: a `title:` key in YAML (`---`) or TOML (`+++`) frontmatter, the
/// first `# ` heading, the first non-empty line shorter than 200
/// characters, then `fallback`.
pub fn extract_title(content: &str, fallback: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();

    let mut body = &lines[..];
    if let Some(delimiter) = lines
        .first()
        .map(|l| l.trim())
        .filter(|l| *l == "---" || *l == "+++")
    {
        let rest = &lines[1..];
        let end = rest.iter().position(|l| l.trim() == delimiter);
        let front = &rest[..end.unwrap_or(rest.len())];

        for line in front {
            let line = line.trim();
            let Some((key, value)) = line.split_once(':').or_else(|| line.split_once('=')) else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("title") {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }
        body = match end {
            Some(end) => &rest[end + 1..],
            None => &[],
        };
    }

    for line in body {
        let line = line.trim();
        if let Some(heading) = line.strip_prefix("# ") {
            return heading.trim().to_string();
        }
        if !line.is_empty()
            && !line.starts_with("---")
            && !line.starts_with("+++")
            && line.chars().count() < MAX_TITLE_LINE_CHARS
        {
            return line.to_string();
        }
    }

    fallback.to_string()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// CLI entry point for `rlib ingest`.
pub async fn run_ingest(config: &Config, path: &Path, options: &IngestOptions) -> Result<()> {
    if path.is_dir() && (options.url.is_some() || options.title.is_some() || options.raw.is_some())
    {
        bail!("--url, --title and --raw apply to a single file, not a directory");
    }
    let files = collect_files(path, &config.ingest)?;
    if files.is_empty() {
        println!("No matching files under {}", path.display());
        return Ok(());
    }

    let library = Library::open(config.clone()).await?;
    let walking = path.is_dir();

    let (mut created, mut updated, mut unchanged, mut skipped) = (0usize, 0usize, 0usize, 0usize);
    let mut degraded: Option<String> = None;
    for file in &files {
        let resource = if walking {
            match load_resource(file, options)? {
                Some(resource) => resource,
                None => {
                    tracing::warn!(file = %file.display(), "skipping file with no content");
                    println!("{:<9} {}", "skipped", file.display());
                    skipped += 1;
                    continue;
                }
            }
        } else {
            build_resource(file, options)?
        };
        let title = resource.title.clone();
        let report = library
            .ingest(resource)
            .await
            .with_context(|| format!("Failed to ingest {}", file.display()))?;

        let label = match report.outcome.status {
            PutStatus::Created => {
                created += 1;
                "created"
            }
            PutStatus::Updated => {
                updated += 1;
                "updated"
            }
            PutStatus::Unchanged => {
                unchanged += 1;
                "unchanged"
            }
        };
        println!("{:<9} [{}] {}", label, report.outcome.id, title);

        if let IndexStatus::Degraded { reason } = report.index {
            degraded = Some(reason);
        }
    }

    println!("ingest {}", path.display());
    println!("  files: {}", files.len());
    println!("  created: {}", created);
    println!("  updated: {}", updated);
    println!("  unchanged: {}", unchanged);
    println!("  skipped: {}", skipped);
    if let Some(reason) = degraded {
        eprintln!("Warning: index degraded ({}). Run `rlib rebuild`.", reason);
    }
    println!("ok");

    Ok(())
}
