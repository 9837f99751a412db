//! Multi-factor reranking of search results
//!
//! Re-scores an initial candidate set with a weighted combination of the
//! raw vector similarity, query keyword overlap, and a length preference:
//!
//! `composite = w_vector * similarity + w_keyword * overlap + w_length * length_norm`
//!
//! Weights are applied as raw multipliers and are never renormalized; the
//! defaults sum to 1.0 but arbitrary non-negative weights are accepted
//! as-is. Reranking only reorders and annotates: it never adds, drops or
//! truncates candidates, and equal composite scores keep their input order.

use crate::retrieval::SearchResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Weights for the three rerank signals
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RerankWeights {
    pub vector: f32,
    pub keyword: f32,
    pub length: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            vector: 0.5,
            keyword: 0.3,
            length: 0.2,
        }
    }
}

/// Multi-factor reranker
#[derive(Debug, Clone)]
pub struct Reranker {
    weights: RerankWeights,
    ideal_length: usize,
}

/// Terms carrying no retrieval signal, dropped before overlap scoring
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "of", "to", "in", "on", "at", "for",
    "and", "or", "what", "which", "where", "when", "who", "how", "do", "does",
    "的", "了", "是", "在", "和", "吗", "呢", "什么",
];

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9]+").unwrap())
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Lowercased alphanumeric words plus individual CJK characters
fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut terms: Vec<String> = word_regex()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect();
    terms.extend(lower.chars().filter(|c| is_cjk(*c)).map(|c| c.to_string()));
    terms
}

impl Reranker {
    pub fn new(weights: RerankWeights, ideal_length: usize) -> Self {
        Self {
            weights,
            ideal_length,
        }
    }

    /// Rerank candidates by composite score, descending
    ///
    /// Pure and infallible on well-formed input; the output is a
    /// permutation of the input with `rerank_score` filled in.
    pub fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let query_terms = self.query_terms(query);

        let mut scored: Vec<SearchResult> = results
            .into_iter()
            .map(|mut result| {
                let composite = self.weights.vector * result.score
                    + self.weights.keyword * self.keyword_overlap(&query_terms, &result.content)
                    + self.weights.length * self.length_norm(&result.content);
                result.rerank_score = Some(composite);
                result
            })
            .collect();

        // Stable sort: equal composites keep their original rank
        scored.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(Ordering::Equal)
        });
        scored
    }

    fn query_terms(&self, query: &str) -> Vec<String> {
        tokenize(query)
            .into_iter()
            .filter(|t| !STOP_WORDS.contains(&t.as_str()))
            .collect()
    }

    /// Fraction of query terms present in the candidate content, in [0, 1]
    fn keyword_overlap(&self, query_terms: &[String], content: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let content_terms: HashSet<String> = tokenize(content).into_iter().collect();
        let hits = query_terms
            .iter()
            .filter(|t| content_terms.contains(*t))
            .count();
        hits as f32 / query_terms.len() as f32
    }

    /// Length preference: rises with content length, saturates at the
    /// configured ideal length
    fn length_norm(&self, content: &str) -> f32 {
        if self.ideal_length == 0 {
            return 1.0;
        }
        let chars = content.chars().count();
        (chars as f32 / self.ideal_length as f32).min(1.0)
    }
}
