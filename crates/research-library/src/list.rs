//! `rlib list`: resources in insertion order.

use anyhow::Result;

use crate::config::Config;
use crate::library::Library;

pub async fn run_list(config: &Config, json: bool) -> Result<()> {
    let library = Library::open(config.clone()).await?;
    let resources = library.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resources)?);
        return Ok(());
    }

    if resources.is_empty() {
        println!("No resources.");
        return Ok(());
    }

    println!(
        "{:<5} {:<12}  {:<10}  {:<40}  {}",
        "SEQ", "ID", "FETCHED", "TITLE", "SOURCE"
    );
    println!("{}", "-".repeat(96));
    for r in &resources {
        println!(
            "{:<5} {:<12}  {:<10}  {:<40}  {}",
            r.seq,
            r.id,
            r.fetched_at.format("%Y-%m-%d"),
            truncate(&r.title, 40),
            r.source.locator()
        );
    }
    println!();
    println!("{} resource(s)", resources.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ünïcödé títle", 6), "ünïcö…");
    }
}
