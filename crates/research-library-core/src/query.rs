//! Query engine: turns a question into ranked citations.
//!
//! The engine tokenizes the question with the index's tokenizer, ranks
//! candidates with [`LexicalIndex::search`], re-reads the top `top_k`
//! resources from the [`ResourceStore`], and cuts a snippet around the
//! earliest occurrence of any matched term. It never mutates either side.
//!
//! When nothing matches, the result is [`Answer::NoLocalMatch`]; callers
//! may fall back to a live web search on that signal.

use std::collections::HashSet;
use std::ops::Range;

use serde::Serialize;

use crate::error::{LibraryError, Result};
use crate::index::{LexicalIndex, SearchHit, TermScore};
use crate::models::{Resource, ResourceId, Source};
use crate::store::ResourceStore;
use crate::tokenize::Tokenizer;

/// Query tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct QueryParams {
    /// Maximum number of citations returned.
    pub top_k: usize,
    /// Characters kept on each side of the matched term.
    pub snippet_context_chars: usize,
    /// Characters taken from the start of the content when no matched
    /// term occurs in it.
    pub fallback_snippet_chars: usize,
    /// If true, populate [`Citation::explain`].
    pub explain: bool,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            snippet_context_chars: 80,
            fallback_snippet_chars: 200,
            explain: false,
        }
    }
}

/// Scoring breakdown for a citation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreExplanation {
    /// Number of documents in the index when the query ran.
    pub documents: usize,
    /// Contribution of each matched query term.
    pub terms: Vec<TermScore>,
}

/// Evidence for an answer: a ranked resource and the passage that matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub resource_id: ResourceId,
    pub title: String,
    pub source: Source,
    pub score: f64,
    pub snippet: String,
    /// Byte range of `snippet` within the resource content.
    pub snippet_range: Range<usize>,
    /// Byte range of the matched term occurrence, if one was found.
    pub match_range: Option<Range<usize>>,
    pub matched_terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// Outcome of [`QueryEngine::answer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Ranked citations, best first. Never empty.
    Citations(Vec<Citation>),
    /// The local library has nothing relevant.
    NoLocalMatch,
}

impl Answer {
    pub fn is_no_local_match(&self) -> bool {
        matches!(self, Answer::NoLocalMatch)
    }

    pub fn citations(&self) -> &[Citation] {
        match self {
            Answer::Citations(c) => c,
            Answer::NoLocalMatch => &[],
        }
    }
}

/// A snippet cut from resource content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub text: String,
    pub range: Range<usize>,
    pub match_range: Option<Range<usize>>,
}

/// Read-only question answering over a store and an index.
pub struct QueryEngine<'a, S: ?Sized, I: ?Sized> {
    store: &'a S,
    index: &'a I,
    params: QueryParams,
}

impl<'a, S, I> QueryEngine<'a, S, I>
where
    S: ResourceStore + ?Sized,
    I: LexicalIndex + ?Sized,
{
    pub fn new(store: &'a S, index: &'a I, params: QueryParams) -> Self {
        Self {
            store,
            index,
            params,
        }
    }

    /// Attach a per-term score breakdown to each citation.
    pub fn with_explain(mut self, explain: bool) -> Self {
        self.params.explain = explain;
        self
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Answer `question` from the local library.
    ///
    /// Hits whose resource has disappeared from the store are skipped.
    /// Any other store failure is returned as-is.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let terms = self.index.tokenizer().terms(question);
        if terms.is_empty() {
            tracing::debug!(question, "question has no indexable terms");
            return Ok(Answer::NoLocalMatch);
        }

        let hits = self.index.search(&terms);
        if hits.is_empty() {
            return Ok(Answer::NoLocalMatch);
        }
        let documents = self.index.stats().documents;

        let mut citations = Vec::new();
        for hit in hits.into_iter().take(self.params.top_k) {
            let resource = match self.store.get(&hit.id).await {
                Ok(r) => r,
                Err(LibraryError::NotFound(id)) => {
                    tracing::warn!(%id, "indexed resource missing from store; rebuild the index");
                    continue;
                }
                Err(e) => return Err(e),
            };
            citations.push(self.cite(hit, &resource, documents));
        }

        if citations.is_empty() {
            Ok(Answer::NoLocalMatch)
        } else {
            Ok(Answer::Citations(citations))
        }
    }

    fn cite(&self, hit: SearchHit, resource: &Resource, documents: usize) -> Citation {
        let matched_terms: Vec<String> = hit.terms.iter().map(|t| t.term.clone()).collect();
        let snippet = extract_snippet(
            self.index.tokenizer(),
            &resource.content,
            &matched_terms,
            &self.params,
        );
        Citation {
            resource_id: hit.id,
            title: resource.title.clone(),
            source: resource.source.clone(),
            score: hit.score,
            snippet: snippet.text,
            snippet_range: snippet.range,
            match_range: snippet.match_range,
            matched_terms,
            explain: self.params.explain.then_some(ScoreExplanation {
                documents,
                terms: hit.terms,
            }),
        }
    }
}

/// Cut a snippet around the earliest occurrence of any of `terms` in
/// `content`, or take the head of the content if none occurs.
pub fn extract_snippet(
    tokenizer: &Tokenizer,
    content: &str,
    terms: &[String],
    params: &QueryParams,
) -> Snippet {
    let wanted: HashSet<&str> = terms.iter().map(String::as_str).collect();
    let first = tokenizer
        .tokens(content)
        .into_iter()
        .find(|t| wanted.contains(t.term.as_str()));

    match first {
        Some(token) => {
            let start = back_chars(content, token.start, params.snippet_context_chars);
            let end = forward_chars(content, token.end, params.snippet_context_chars);
            Snippet {
                text: content[start..end].to_string(),
                range: start..end,
                match_range: Some(token.start..token.end),
            }
        }
        None => {
            let end = forward_chars(content, 0, params.fallback_snippet_chars);
            Snippet {
                text: content[..end].to_string(),
                range: 0..end,
                match_range: None,
            }
        }
    }
}

/// Byte offset `n` characters before `pos` (clamped to 0).
fn back_chars(s: &str, pos: usize, n: usize) -> usize {
    if n == 0 {
        return pos;
    }
    s[..pos]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map_or(0, |(i, _)| i)
}

/// Byte offset `n` characters after `pos` (clamped to the end).
fn forward_chars(s: &str, pos: usize, n: usize) -> usize {
    s[pos..]
        .char_indices()
        .nth(n)
        .map_or(s.len(), |(i, _)| pos + i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InvertedIndex;
    use crate::models::Source;
    use crate::store::memory::InMemoryStore;
    use crate::tokenize::TokenizerConfig;
    use chrono::Utc;
    use std::sync::Arc;

    fn page(url: &str, content: &str) -> Resource {
        Resource::new(
            Source::Url {
                url: url.to_string(),
            },
            format!("Title of {}", url),
            content,
            Utc::now(),
        )
    }

    async fn library(contents: &[(&str, &str)]) -> (InMemoryStore, InvertedIndex) {
        let store = InMemoryStore::new();
        let index = InvertedIndex::new(&TokenizerConfig::default());
        for (url, content) in contents {
            let r = page(url, content);
            let outcome = store.put(&r).await.unwrap();
            index.insert(&r.with_seq(outcome.seq));
        }
        (store, index)
    }

    #[tokio::test]
    async fn test_end_to_end_ranking() {
        let (store, index) = library(&[
            ("https://a", "quantum computing uses qubits"),
            ("https://b", "classical computing uses bits"),
            ("https://c", "the weather today is sunny"),
        ])
        .await;
        let engine = QueryEngine::new(&store, &index, QueryParams::default());
        let answer = engine.answer("computing qubits").await.unwrap();
        let ids: Vec<ResourceId> = answer
            .citations()
            .iter()
            .map(|c| c.resource_id.clone())
            .collect();
        assert_eq!(
            ids,
            vec![
                ResourceId::from_url("https://a"),
                ResourceId::from_url("https://b")
            ]
        );
        assert!(!ids.contains(&ResourceId::from_url("https://c")));
        assert_eq!(answer.citations()[0].title, "Title of https://a");
    }

    #[tokio::test]
    async fn test_empty_index_is_no_local_match() {
        let store = InMemoryStore::new();
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let engine = QueryEngine::new(&store, &index, QueryParams::default());
        assert_eq!(
            engine.answer("anything").await.unwrap(),
            Answer::NoLocalMatch
        );
        assert!(engine.answer("the a of").await.unwrap().is_no_local_match());
    }

    #[tokio::test]
    async fn test_top_k_limits_results() {
        let (store, index) = library(&[
            ("https://1", "rust one"),
            ("https://2", "rust two"),
            ("https://3", "rust three"),
        ])
        .await;
        let params = QueryParams {
            top_k: 2,
            ..QueryParams::default()
        };
        let engine = QueryEngine::new(&store, &index, params);
        assert_eq!(engine.answer("rust").await.unwrap().citations().len(), 2);
    }

    #[tokio::test]
    async fn test_snippet_contains_first_occurrence() {
        let filler = "lorem ipsum dolor sit amet ".repeat(20);
        let content = format!("{}the Qubits are fragile. More qubits later.", filler);
        let offset = content.find("Qubits").unwrap();
        let (store, index) = library(&[("https://a", content.as_str()), ("https://b", "other")]).await;

        let engine = QueryEngine::new(&store, &index, QueryParams::default());
        let answer = engine.answer("qubits").await.unwrap();
        let citation = &answer.citations()[0];
        assert!(citation.snippet_range.start <= offset);
        assert!(citation.snippet_range.end >= offset + "Qubits".len());
        assert_eq!(citation.match_range, Some(offset..offset + 6));
        assert_eq!(&content[citation.snippet_range.clone()], citation.snippet);
        assert!(citation.snippet_range.start > 0);
    }

    #[tokio::test]
    async fn test_explain_breakdown() {
        let (store, index) = library(&[
            ("https://a", "quantum computing uses qubits"),
            ("https://b", "classical computing uses bits"),
        ])
        .await;
        let engine = QueryEngine::new(&store, &index, QueryParams::default()).with_explain(true);
        assert!(engine.params().explain);
        let answer = engine.answer("qubits computing").await.unwrap();
        let top = &answer.citations()[0];
        let explain = top.explain.as_ref().unwrap();
        assert_eq!(explain.documents, 2);
        let sum: f64 = explain.terms.iter().map(|t| t.weight).sum();
        assert!((sum - top.score).abs() < 1e-12);
        assert_eq!(top.matched_terms, ["qubits", "computing"]);
    }

    #[tokio::test]
    async fn test_missing_resource_is_skipped() {
        let (store, index) = library(&[("https://a", "alpha beta")]).await;
        store
            .delete(&ResourceId::from_url("https://a"))
            .await
            .unwrap();
        let engine = QueryEngine::new(&store, &index, QueryParams::default());
        assert!(engine.answer("alpha").await.unwrap().is_no_local_match());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_answers_match_sequential() {
        let (store, index) = library(&[
            ("https://a", "quantum computing uses qubits"),
            ("https://b", "classical computing uses bits"),
            ("https://c", "computing history"),
        ])
        .await;
        let store = Arc::new(store);
        let index = Arc::new(index);
        let expected = QueryEngine::new(store.as_ref(), index.as_ref(), QueryParams::default())
            .answer("computing qubits")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (store, index) = (Arc::clone(&store), Arc::clone(&index));
            handles.push(tokio::spawn(async move {
                QueryEngine::new(store.as_ref(), index.as_ref(), QueryParams::default())
                    .answer("computing qubits")
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), expected);
        }
    }

    #[test]
    fn test_fallback_snippet_is_head() {
        let tokenizer = Tokenizer::default();
        let params = QueryParams {
            fallback_snippet_chars: 5,
            ..QueryParams::default()
        };
        let s = extract_snippet(&tokenizer, "héllo world", &["absent".to_string()], &params);
        assert_eq!(s.text, "héllo");
        assert_eq!(s.range, 0.."héllo".len());
        assert!(s.match_range.is_none());
    }

    #[test]
    fn test_snippet_window_respects_char_boundaries() {
        let tokenizer = Tokenizer::default();
        let params = QueryParams {
            snippet_context_chars: 2,
            ..QueryParams::default()
        };
        let s = extract_snippet(&tokenizer, "ééé target ééé", &["target".to_string()], &params);
        assert_eq!(s.text, "é target é");
    }
}
