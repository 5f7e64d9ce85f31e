//! Inverted lexical index with TF-IDF scoring.
//!
//! The index owns postings (`term → resource id → term frequency`) and the
//! corpus statistics needed for scoring. It never stores content and can be
//! rebuilt from the resource store alone.
//!
//! # Scoring
//!
//! ```text
//! score(term, doc) = tf(term, doc) × ln((N + 1) / (df(term) + 1))
//! ```
//!
//! where `N` is the number of indexed documents and `df` the number of
//! documents containing the term. A query's aggregate score for a document
//! is the sum over the distinct query terms the document contains.
//! Documents containing none of the terms are not returned. Ties break by
//! store insertion sequence (earliest first), then by id.
//!
//! # Concurrency
//!
//! All state sits behind one `RwLock`. Searches share the read lock.
//! Mutations tokenize outside the lock and hold the write lock only while
//! applying the result; [`InvertedIndex::install`] swaps a fully built
//! staging state in one assignment.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};
use crate::models::{Resource, ResourceId};
use crate::tokenize::{Tokenizer, TokenizerConfig};

/// Snapshot layout version written by [`InvertedIndex::snapshot`].
///
/// Version 2: terms are ASCII-only.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 2;

/// Smoothed inverse document frequency.
pub fn idf(documents: usize, document_frequency: usize) -> f64 {
    ((documents as f64 + 1.0) / (document_frequency as f64 + 1.0)).ln()
}

/// Per-term contribution to a document's aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermScore {
    pub term: String,
    pub tf: u32,
    pub df: usize,
    pub idf: f64,
    pub weight: f64,
}

/// A ranked search candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: ResourceId,
    pub seq: u64,
    pub score: f64,
    /// Contributions of each matched query term, in query order.
    pub terms: Vec<TermScore>,
}

/// Global corpus counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub terms: usize,
    pub total_tokens: u64,
}

impl IndexStats {
    pub fn average_length(&self) -> f64 {
        if self.documents == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.documents as f64
        }
    }
}

/// Per-document statistics as persisted in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub seq: u64,
    /// Token count after stopword removal.
    pub length: usize,
    /// Hash of the content the postings were derived from.
    pub content_hash: String,
}

/// Serializable form of the whole index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub format_version: u32,
    pub tokenizer: TokenizerConfig,
    pub documents: BTreeMap<ResourceId, DocumentStats>,
    pub postings: BTreeMap<String, BTreeMap<ResourceId, u32>>,
}

/// Operations every lexical index backend provides.
pub trait LexicalIndex: Send + Sync {
    /// Tokenizer used for both documents and queries.
    fn tokenizer(&self) -> &Tokenizer;

    /// Index `resource`, replacing any postings previously held for its id.
    fn insert(&self, resource: &Resource);

    /// Retract all postings for `id`. Returns `false` if it was not indexed.
    fn remove(&self, id: &ResourceId) -> bool;

    /// Discard everything and index `resources`.
    fn rebuild(&self, resources: &[Resource]);

    /// TF-IDF weight of `term` in `id`; `0.0` when absent.
    fn score(&self, term: &str, id: &ResourceId) -> f64;

    /// Rank documents against already tokenized query terms.
    fn search(&self, terms: &[String]) -> Vec<SearchHit>;

    fn stats(&self) -> IndexStats;
}

#[derive(Debug, Clone)]
struct DocEntry {
    seq: u64,
    length: usize,
    content_hash: String,
    terms: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct IndexState {
    documents: HashMap<ResourceId, DocEntry>,
    postings: HashMap<String, HashMap<ResourceId, u32>>,
    total_tokens: u64,
}

/// Term frequencies of one resource, computed outside any lock.
struct Analyzed {
    id: ResourceId,
    seq: u64,
    length: usize,
    content_hash: String,
    counts: BTreeMap<String, u32>,
}

fn analyze(tokenizer: &Tokenizer, resource: &Resource) -> Analyzed {
    let tokens = tokenizer.tokens(&resource.content);
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in &tokens {
        *counts.entry(token.term.clone()).or_insert(0) += 1;
    }
    Analyzed {
        id: resource.id.clone(),
        seq: resource.seq,
        length: tokens.len(),
        content_hash: resource.content_hash.clone(),
        counts,
    }
}

impl IndexState {
    fn apply(&mut self, analyzed: Analyzed) {
        self.retract(&analyzed.id);
        for (term, tf) in &analyzed.counts {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(analyzed.id.clone(), *tf);
        }
        self.total_tokens += analyzed.length as u64;
        self.documents.insert(
            analyzed.id,
            DocEntry {
                seq: analyzed.seq,
                length: analyzed.length,
                content_hash: analyzed.content_hash,
                terms: analyzed.counts.into_keys().collect(),
            },
        );
    }

    fn retract(&mut self, id: &ResourceId) -> bool {
        let Some(doc) = self.documents.remove(id) else {
            return false;
        };
        for term in &doc.terms {
            if let Some(list) = self.postings.get_mut(term) {
                list.remove(id);
                if list.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_tokens -= doc.length as u64;
        true
    }

    fn term_score(&self, term: &str, id: &ResourceId) -> Option<TermScore> {
        let list = self.postings.get(term)?;
        let tf = *list.get(id)?;
        let df = list.len();
        let idf = idf(self.documents.len(), df);
        Some(TermScore {
            term: term.to_string(),
            tf,
            df,
            idf,
            weight: tf as f64 * idf,
        })
    }
}

/// Staging area for a rebuild. Filled without touching the live index,
/// then published with [`InvertedIndex::install`].
pub struct IndexBuilder {
    tokenizer: Tokenizer,
    state: IndexState,
}

impl IndexBuilder {
    pub fn add(&mut self, resource: &Resource) {
        let analyzed = analyze(&self.tokenizer, resource);
        self.state.apply(analyzed);
    }

    pub fn len(&self) -> usize {
        self.state.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.documents.is_empty()
    }
}

/// In-memory inverted index.
pub struct InvertedIndex {
    tokenizer: Tokenizer,
    state: RwLock<IndexState>,
}

impl InvertedIndex {
    pub fn new(config: &TokenizerConfig) -> Self {
        Self {
            tokenizer: Tokenizer::new(config),
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Restore an index from a snapshot.
    ///
    /// Fails with [`LibraryError::IndexDegraded`] when the snapshot was
    /// written by another format version or tokenizer configuration, or
    /// references documents it has no statistics for.
    pub fn from_snapshot(config: &TokenizerConfig, snapshot: IndexSnapshot) -> Result<Self> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(LibraryError::degraded(format!(
                "snapshot format {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        let tokenizer = Tokenizer::new(config);
        if snapshot.tokenizer.normalized() != *tokenizer.config() {
            return Err(LibraryError::degraded(
                "snapshot was built with different tokenizer settings",
            ));
        }

        let mut state = IndexState::default();
        for (id, doc) in snapshot.documents {
            state.total_tokens += doc.length as u64;
            state.documents.insert(
                id,
                DocEntry {
                    seq: doc.seq,
                    length: doc.length,
                    content_hash: doc.content_hash,
                    terms: Vec::new(),
                },
            );
        }
        for (term, list) in snapshot.postings {
            let mut postings = HashMap::with_capacity(list.len());
            for (id, tf) in list {
                let doc = state.documents.get_mut(&id).ok_or_else(|| {
                    LibraryError::degraded(format!("posting for '{}' references unknown {}", term, id))
                })?;
                doc.terms.push(term.clone());
                postings.insert(id, tf);
            }
            if !postings.is_empty() {
                state.postings.insert(term, postings);
            }
        }

        Ok(Self {
            tokenizer,
            state: RwLock::new(state),
        })
    }

    /// Serializable copy of the current state.
    pub fn snapshot(&self) -> IndexSnapshot {
        let state = self.read();
        IndexSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            tokenizer: self.tokenizer.config().clone(),
            documents: state
                .documents
                .iter()
                .map(|(id, doc)| {
                    (
                        id.clone(),
                        DocumentStats {
                            seq: doc.seq,
                            length: doc.length,
                            content_hash: doc.content_hash.clone(),
                        },
                    )
                })
                .collect(),
            postings: state
                .postings
                .iter()
                .map(|(term, list)| {
                    (
                        term.clone(),
                        list.iter().map(|(id, tf)| (id.clone(), *tf)).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Empty staging area sharing this index's tokenizer.
    pub fn builder(&self) -> IndexBuilder {
        IndexBuilder {
            tokenizer: self.tokenizer.clone(),
            state: IndexState::default(),
        }
    }

    /// Replace the live state with a completed staging area.
    pub fn install(&self, builder: IndexBuilder) {
        let documents = builder.state.documents.len();
        *self.write() = builder.state;
        tracing::debug!(documents, "installed rebuilt index");
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.read().documents.contains_key(id)
    }

    /// Indexed ids ordered by insertion sequence.
    pub fn document_ids(&self) -> Vec<ResourceId> {
        let state = self.read();
        let mut docs: Vec<(&ResourceId, u64)> =
            state.documents.iter().map(|(id, d)| (id, d.seq)).collect();
        docs.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));
        docs.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Content hash each indexed document was built from.
    pub fn content_hashes(&self) -> BTreeMap<ResourceId, String> {
        self.read()
            .documents
            .iter()
            .map(|(id, doc)| (id.clone(), doc.content_hash.clone()))
            .collect()
    }

    pub fn document_frequency(&self, term: &str) -> usize {
        self.read().postings.get(term).map_or(0, |list| list.len())
    }

    pub fn document_length(&self, id: &ResourceId) -> Option<usize> {
        self.read().documents.get(id).map(|d| d.length)
    }

    /// The `limit` terms with the highest document frequency.
    pub fn top_terms(&self, limit: usize) -> Vec<(String, usize)> {
        let state = self.read();
        let mut terms: Vec<(String, usize)> = state
            .postings
            .iter()
            .map(|(term, list)| (term.clone(), list.len()))
            .collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        terms.truncate(limit);
        terms
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LexicalIndex for InvertedIndex {
    fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    fn insert(&self, resource: &Resource) {
        let analyzed = analyze(&self.tokenizer, resource);
        self.write().apply(analyzed);
    }

    fn remove(&self, id: &ResourceId) -> bool {
        self.write().retract(id)
    }

    fn rebuild(&self, resources: &[Resource]) {
        let mut builder = self.builder();
        for resource in resources {
            builder.add(resource);
        }
        self.install(builder);
    }

    fn score(&self, term: &str, id: &ResourceId) -> f64 {
        self.read()
            .term_score(term, id)
            .map_or(0.0, |s| s.weight)
    }

    fn search(&self, terms: &[String]) -> Vec<SearchHit> {
        let mut seen = BTreeSet::new();
        let unique: Vec<&str> = terms
            .iter()
            .map(String::as_str)
            .filter(|t| seen.insert(*t))
            .collect();

        let state = self.read();
        let mut hits: HashMap<&ResourceId, SearchHit> = HashMap::new();
        for term in unique {
            let Some(list) = state.postings.get(term) else {
                continue;
            };
            for id in list.keys() {
                let Some(contribution) = state.term_score(term, id) else {
                    continue;
                };
                let hit = hits.entry(id).or_insert_with(|| SearchHit {
                    id: id.clone(),
                    seq: state.documents.get(id).map_or(u64::MAX, |d| d.seq),
                    score: 0.0,
                    terms: Vec::new(),
                });
                hit.score += contribution.weight;
                hit.terms.push(contribution);
            }
        }
        let mut ranked: Vec<SearchHit> = hits.into_values().collect();
        drop(state);

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
                .then(a.id.cmp(&b.id))
        });
        ranked
    }

    fn stats(&self) -> IndexStats {
        let state = self.read();
        IndexStats {
            documents: state.documents.len(),
            terms: state.postings.len(),
            total_tokens: state.total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use chrono::Utc;

    fn doc(url: &str, seq: u64, content: &str) -> Resource {
        Resource::new(
            Source::Url {
                url: url.to_string(),
            },
            url,
            content,
            Utc::now(),
        )
        .with_seq(seq)
    }

    fn terms(index: &InvertedIndex, q: &str) -> Vec<String> {
        index.tokenizer().terms(q)
    }

    fn corpus() -> Vec<Resource> {
        vec![
            doc("https://a", 1, "quantum computing uses qubits"),
            doc("https://b", 2, "classical computing uses bits"),
            doc("https://c", 3, "the weather today is sunny"),
        ]
    }

    #[test]
    fn test_ranks_quantum_above_classical() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        for r in corpus() {
            index.insert(&r);
        }
        let hits = index.search(&terms(&index, "computing qubits"));
        let ids: Vec<&ResourceId> = hits.iter().map(|h| &h.id).collect();
        let all = corpus();
        assert_eq!(ids, vec![&all[0].id, &all[1].id]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_score_formula() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let all = corpus();
        for r in &all {
            index.insert(r);
        }
        let expected = 1.0 * (4.0f64 / 2.0).ln();
        assert!((index.score("qubits", &all[0].id) - expected).abs() < 1e-12);
        let computing = (4.0f64 / 3.0).ln();
        assert!((index.score("computing", &all[1].id) - computing).abs() < 1e-12);
        assert_eq!(index.score("qubits", &all[1].id), 0.0);
        assert_eq!(index.score("missing", &all[0].id), 0.0);
    }

    #[test]
    fn test_term_in_every_document_scores_zero_but_matches() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        index.insert(&doc("https://a", 1, "shared alpha"));
        index.insert(&doc("https://b", 2, "shared beta"));
        let hits = index.search(&terms(&index, "shared"));
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score == 0.0));
        assert_eq!(hits[0].seq, 1);
    }

    #[test]
    fn test_reinsert_does_not_double_count() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let r = doc("https://a", 1, "rust rust ownership");
        index.insert(&r);
        index.insert(&r);
        let stats = index.stats();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.total_tokens, 3);
        assert_eq!(index.document_frequency("rust"), 1);
        let hits = index.search(&terms(&index, "rust"));
        assert_eq!(hits[0].terms[0].tf, 2);
    }

    #[test]
    fn test_reinsert_with_new_content_retracts_old_terms() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let mut r = doc("https://a", 1, "old words here");
        index.insert(&r);
        r.content = "fresh text".to_string();
        index.insert(&r);
        assert!(index.search(&terms(&index, "old words")).is_empty());
        assert_eq!(index.search(&terms(&index, "fresh")).len(), 1);
        assert_eq!(index.document_length(&r.id), Some(2));
    }

    #[test]
    fn test_remove() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let all = corpus();
        for r in &all {
            index.insert(r);
        }
        assert!(index.remove(&all[0].id));
        assert!(!index.remove(&all[0].id));
        assert_eq!(index.document_frequency("qubits"), 0);
        assert_eq!(index.document_frequency("computing"), 1);
        assert_eq!(index.stats().documents, 2);
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        assert!(index.search(&terms(&index, "anything at all")).is_empty());
        assert_eq!(index.stats().average_length(), 0.0);
    }

    #[test]
    fn test_duplicate_query_terms_count_once() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let all = corpus();
        for r in &all {
            index.insert(r);
        }
        let once = index.search(&terms(&index, "qubits"));
        let twice = index.search(&terms(&index, "qubits qubits"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_tie_breaks_by_insertion_sequence() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let late = doc("https://late", 9, "identical words");
        let early = doc("https://early", 2, "identical words");
        index.insert(&late);
        index.insert(&early);
        for _ in 0..5 {
            let hits = index.search(&terms(&index, "identical"));
            assert_eq!(hits[0].id, early.id);
            assert_eq!(hits[1].id, late.id);
            assert_eq!(hits[0].score, hits[1].score);
        }
    }

    #[test]
    fn test_rebuild_matches_any_insert_order() {
        let all = corpus();
        let forward = InvertedIndex::new(&TokenizerConfig::default());
        forward.rebuild(&all);

        let reversed = InvertedIndex::new(&TokenizerConfig::default());
        for r in all.iter().rev() {
            reversed.insert(r);
        }
        reversed.insert(&doc("https://stale", 7, "qubits stale"));
        reversed.remove(&ResourceId::from_url("https://stale"));

        for q in ["computing qubits", "uses", "sunny weather", "nothing"] {
            let qt = terms(&forward, q);
            assert_eq!(forward.search(&qt), reversed.search(&qt), "query {:?}", q);
        }
        assert_eq!(forward.snapshot(), reversed.snapshot());
    }

    #[test]
    fn test_rebuild_drops_stale_documents() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let all = corpus();
        for r in &all {
            index.insert(r);
        }
        index.rebuild(&all[1..]);
        assert!(!index.contains(&all[0].id));
        assert!(index.search(&terms(&index, "qubits")).is_empty());
        assert_eq!(index.document_ids(), vec![all[1].id.clone(), all[2].id.clone()]);
    }

    #[test]
    fn test_score_monotonic_in_term_frequency() {
        let filler = doc("https://filler", 0, "bananas only");
        let other = doc("https://other", 1, "apples and pears");
        let base = doc("https://target", 2, "apples oranges");
        let boosted = doc("https://target", 2, "apples apples apples oranges");

        let score_of = |target: &Resource| {
            let index = InvertedIndex::new(&TokenizerConfig::default());
            index.insert(&filler);
            index.insert(&other);
            index.insert(target);
            let hits = index.search(&terms(&index, "apples"));
            let mine = hits.iter().find(|h| h.id == target.id).unwrap().score;
            let theirs = hits.iter().find(|h| h.id == other.id).unwrap().score;
            mine - theirs
        };
        assert!(score_of(&boosted) > score_of(&base));
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_search() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        for r in corpus() {
            index.insert(&r);
        }
        let json = serde_json::to_string(&index.snapshot()).unwrap();
        let snapshot: IndexSnapshot = serde_json::from_str(&json).unwrap();
        let restored = InvertedIndex::from_snapshot(&TokenizerConfig::default(), snapshot).unwrap();
        let q = terms(&index, "computing qubits");
        assert_eq!(index.search(&q), restored.search(&q));
        assert_eq!(index.stats(), restored.stats());

        // Retraction still works after a restore.
        let a = &corpus()[0];
        assert!(restored.remove(&a.id));
        assert_eq!(restored.document_frequency("computing"), 1);
    }

    #[test]
    fn test_snapshot_with_other_tokenizer_is_degraded() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let other = TokenizerConfig {
            min_token_len: 3,
            ..TokenizerConfig::default()
        };
        let err = InvertedIndex::from_snapshot(&other, index.snapshot()).err().unwrap();
        assert!(matches!(err, LibraryError::IndexDegraded(_)));
    }

    #[test]
    fn test_snapshot_from_older_format_is_degraded() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        let mut snapshot = index.snapshot();
        snapshot.format_version = 1;
        let err = InvertedIndex::from_snapshot(&TokenizerConfig::default(), snapshot)
            .err()
            .unwrap();
        assert!(matches!(err, LibraryError::IndexDegraded(_)));
    }

    #[test]
    fn test_snapshot_with_dangling_posting_is_degraded() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        index.insert(&doc("https://a", 1, "alpha"));
        let mut snapshot = index.snapshot();
        snapshot.documents.clear();
        let err = InvertedIndex::from_snapshot(&TokenizerConfig::default(), snapshot)
            .err()
            .unwrap();
        assert!(matches!(err, LibraryError::IndexDegraded(_)));
    }

    #[test]
    fn test_concurrent_searches_match_sequential() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        for r in corpus() {
            index.insert(&r);
        }
        let q = terms(&index, "computing qubits uses");
        let expected = index.search(&q);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| index.search(&q))).collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }

    #[test]
    fn test_top_terms() {
        let index = InvertedIndex::new(&TokenizerConfig::default());
        for r in corpus() {
            index.insert(&r);
        }
        let top = index.top_terms(2);
        assert_eq!(top[0], ("computing".to_string(), 2));
        assert_eq!(top[1], ("uses".to_string(), 2));
    }
}
