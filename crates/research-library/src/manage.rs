//! Maintenance commands: `init`, `rebuild`, `remove`, `annotate`.

use anyhow::{Context, Result};
use research_library_core::models::ResourceId;

use crate::config::Config;
use crate::library::{IndexStatus, Library};

/// Create the store layout and an index snapshot. Idempotent.
pub async fn run_init(config: &Config) -> Result<()> {
    let library = Library::open(config.clone()).await?;
    if !config.index_path().exists() || library.status().is_degraded() {
        library.rebuild().await?;
    }
    println!(
        "Library initialized at {}.",
        config.store.root.display()
    );
    Ok(())
}

pub async fn run_rebuild(config: &Config) -> Result<()> {
    let library = Library::open(config.clone()).await?;
    let report = library.rebuild().await.context("Rebuild failed")?;
    println!("rebuild");
    println!("  documents: {}", report.documents);
    println!("  terms: {}", report.terms);
    if report.skipped > 0 {
        println!("  skipped (vanished): {}", report.skipped);
    }
    println!("ok");
    Ok(())
}

pub async fn run_remove(config: &Config, id: &str) -> Result<()> {
    let id: ResourceId = id.parse()?;
    let library = Library::open(config.clone()).await?;
    let status = library.remove(&id).await?;
    println!("Removed {}.", id);
    if let IndexStatus::Degraded { reason } = status {
        eprintln!("Warning: index degraded ({}). Run `rlib rebuild`.", reason);
    }
    Ok(())
}

pub async fn run_annotate(config: &Config, id: &str, summary: &str) -> Result<()> {
    let id: ResourceId = id.parse()?;
    let library = Library::open(config.clone()).await?;
    library.set_summary(&id, summary).await?;
    println!("Summary attached to {}.", id);
    Ok(())
}
