//! Resource retrieval by id (`rlib get`).

use anyhow::Result;
use research_library_core::models::{Resource, ResourceId};
use serde::Serialize;

use crate::config::Config;
use crate::library::Library;

/// JSON shape of `rlib get --json`.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceResponse {
    #[serde(flatten)]
    pub resource: Resource,
    pub has_raw: bool,
    pub raw_bytes: usize,
}

/// Load a resource by its id string.
pub async fn get_resource(library: &Library, id: &str) -> Result<Resource> {
    let id: ResourceId = id.parse()?;
    Ok(library.get(&id).await?)
}

/// CLI entry point: prints metadata and content, exits 1 if missing.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let library = Library::open(config.clone()).await?;
    let resource = match get_resource(&library, id).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if json {
        let response = ResourceResponse {
            has_raw: resource.raw.is_some(),
            raw_bytes: resource.raw.as_ref().map_or(0, Vec::len),
            resource,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("--- Resource ---");
    println!("id:           {}", resource.id);
    println!("title:        {}", resource.title);
    println!("source:       {}", resource.source);
    println!(
        "fetched_at:   {}",
        resource.fetched_at.format("%Y-%m-%dT%H:%M:%SZ")
    );
    println!("seq:          {}", resource.seq);
    println!("content_hash: {}", resource.content_hash);
    if let Some(raw) = &resource.raw {
        println!("raw:          {} bytes", raw.len());
    }
    if let Some(summary) = &resource.summary {
        println!("summary:      {}", summary);
    }
    println!();

    println!("--- Content ---");
    println!("{}", resource.content);

    Ok(())
}
