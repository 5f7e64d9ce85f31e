//! `rlib query`: answer a question from the local library.
//!
//! A degraded index is rebuilt before answering. "No local match" is a
//! normal outcome (exit status 0), printed distinctly so callers can fall
//! back to a web search.

use anyhow::Result;
use research_library_core::query::{Answer, Citation};
use serde_json::json;

use crate::config::Config;
use crate::library::Library;

/// Options for [`run_query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub explain: bool,
    pub json: bool,
}

/// Answer `question` and return the result, rebuilding the index first if
/// it is degraded.
pub async fn answer_question(
    library: &Library,
    question: &str,
    options: &QueryOptions,
) -> Result<Answer> {
    if let Some(report) = library.ensure_index().await? {
        tracing::info!(documents = report.documents, "index rebuilt before query");
    }

    let mut params = library.query_params();
    if let Some(top_k) = options.top_k {
        anyhow::ensure!(top_k >= 1, "--top-k must be >= 1");
        params.top_k = top_k;
    }
    params.explain = options.explain;

    Ok(library.answer(question, params).await?)
}

/// CLI entry point for `rlib query`.
pub async fn run_query(config: &Config, question: &str, options: &QueryOptions) -> Result<()> {
    let library = Library::open(config.clone()).await?;
    let answer = answer_question(&library, question, options).await?;

    if options.json {
        let body = match &answer {
            Answer::NoLocalMatch => json!({
                "status": "no_local_match",
                "question": question,
            }),
            Answer::Citations(citations) => json!({
                "status": "ok",
                "question": question,
                "citations": citations,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    match answer {
        Answer::NoLocalMatch => {
            println!("No local match.");
            println!("Nothing in the library matches this question; try ingesting sources or a web search.");
        }
        Answer::Citations(citations) => {
            for (i, citation) in citations.iter().enumerate() {
                print_citation(i + 1, citation);
            }
        }
    }
    Ok(())
}

fn print_citation(rank: usize, citation: &Citation) {
    println!("{}. [{:.4}] {}", rank, citation.score, citation.title);
    println!("    source: {}", citation.source);
    println!(
        "    excerpt: \"{}\"",
        citation.snippet.replace('\n', " ").trim()
    );
    println!(
        "    bytes: {}..{}",
        citation.snippet_range.start, citation.snippet_range.end
    );
    println!("    matched: {}", citation.matched_terms.join(", "));
    if let Some(explain) = &citation.explain {
        println!("    explain (N = {}):", explain.documents);
        for term in &explain.terms {
            println!(
                "      {:<16} tf={} df={} idf={:.4} weight={:.4}",
                term.term, term.tf, term.df, term.idf, term.weight
            );
        }
    }
    println!("    id: {}", citation.resource_id);
    println!();
}
