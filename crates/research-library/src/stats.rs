//! Library statistics and index health (`rlib stats`).

use anyhow::Result;

use crate::config::Config;
use crate::library::{IndexStatus, Library};

/// Run the stats command: open the library and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let library = Library::open(config.clone()).await?;
    let stats = library.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let snapshot_size = std::fs::metadata(config.index_path())
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Research Library Stats");
    println!("======================");
    println!();
    println!("  Store:       {}", config.store.root.display());
    println!("  Index:       {}", config.index_path().display());
    println!("  Index size:  {}", format_bytes(snapshot_size));
    println!();
    println!("  Resources:   {}", stats.resources);
    println!("  Indexed:     {}", stats.index.documents);
    println!("  Terms:       {}", stats.index.terms);
    println!("  Tokens:      {}", stats.index.total_tokens);
    println!("  Avg length:  {:.1}", stats.index.average_length());
    match &stats.status {
        IndexStatus::Consistent => println!("  Health:      consistent"),
        IndexStatus::Degraded { reason } => {
            println!("  Health:      degraded ({})", reason);
            println!("               run `rlib rebuild` to repair");
        }
    }

    if !stats.top_terms.is_empty() {
        println!();
        println!("  Most common terms:");
        println!("  {:<24} {:>6}", "TERM", "DOCS");
        println!("  {}", "-".repeat(31));
        for (term, df) in &stats.top_terms {
            println!("  {:<24} {:>6}", term, df);
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
