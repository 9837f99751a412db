//! Needle-in-a-haystack retrieval accuracy test
//!
//! Plants a single known fact among synthesized filler documents, ingests
//! the corpus through the retrieval pipeline, and checks at which rank the
//! fact comes back for a query. A fixed seed reproduces the exact same
//! corpus and rank, so regressions show up as rank changes.

use super::HarnessError;
use crate::document::Document;
use crate::retrieval::{RetrievalPipeline, SearchRequest};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration for a needle test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedleConfig {
    /// Number of filler documents in the haystack
    pub haystack_size: usize,
    /// Where to insert the needle; drawn from the seeded RNG when unset
    pub needle_position: Option<usize>,
    /// Query text; defaults to the needle itself
    pub query: Option<String>,
    /// Number of results to retrieve
    pub limit: usize,
    /// The run counts as a success when the needle ranks within this
    pub success_top_k: usize,
    /// Seed for haystack synthesis; fixed seed = identical corpus and rank
    pub seed: u64,
    /// Filler template; `{}` is replaced with the document number
    pub filler_template: String,
    /// Override the pipeline's reranking toggle
    pub use_reranking: Option<bool>,
}

impl Default for NeedleConfig {
    fn default() -> Self {
        Self {
            haystack_size: 100,
            needle_position: None,
            query: None,
            limit: 5,
            success_top_k: 1,
            seed: 42,
            filler_template: "这是文档编号{}的内容。".to_string(),
            use_reranking: None,
        }
    }
}

/// Outcome of one needle test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedleReport {
    pub needle: String,
    pub haystack_size: usize,
    pub needle_position: usize,
    pub query: String,
    pub limit: usize,
    /// Whether the needle chunk appeared in the results at all
    pub found: bool,
    /// 1-based rank of the needle chunk; `None` = not found
    pub rank: Option<usize>,
    /// Whether the rank satisfied `success_top_k`
    pub success: bool,
    /// Raw scores of the returned results, in rank order
    pub top_scores: Vec<f32>,
    /// Contents of the returned results, in rank order
    pub retrieved: Vec<String>,
    /// Trial number within a matrix run (0 for single runs)
    pub trial: usize,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

/// Document id given to the planted needle; its chunks share the prefix
const NEEDLE_DOC_ID: &str = "needle";

/// Needle-in-a-haystack harness over a retrieval pipeline
pub struct NeedleHarness {
    pipeline: RetrievalPipeline,
}

impl NeedleHarness {
    pub fn new(pipeline: RetrievalPipeline) -> Self {
        Self { pipeline }
    }

    /// Access the wrapped pipeline (e.g. for stats after a run)
    pub fn pipeline(&self) -> &RetrievalPipeline {
        &self.pipeline
    }

    /// Generate the filler documents for a haystack of the given size
    fn generate_haystack(&self, size: usize, template: &str) -> Vec<String> {
        (0..size)
            .map(|i| template.replacen("{}", &i.to_string(), 1))
            .collect()
    }

    /// Run one needle test: setup, ingest, query, score, report
    ///
    /// The pipeline is reset first; the harness owns its corpus and the
    /// corpus is discarded with the next reset.
    pub fn run(&self, needle: &str, config: &NeedleConfig) -> Result<NeedleReport, HarnessError> {
        if needle.trim().is_empty() {
            return Err(HarnessError::InvalidConfig(
                "Needle text cannot be empty".to_string(),
            ));
        }
        if config.limit == 0 || config.success_top_k == 0 {
            return Err(HarnessError::InvalidConfig(
                "limit and success_top_k must be at least 1".to_string(),
            ));
        }

        // Setup: synthesize the haystack and plant the needle
        let fillers = self.generate_haystack(config.haystack_size, &config.filler_template);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let position = match config.needle_position {
            Some(p) => p.min(config.haystack_size),
            None => rng.gen_range(0..=config.haystack_size),
        };

        let mut documents: Vec<Document> = fillers
            .iter()
            .enumerate()
            .map(|(i, content)| Document::with_id(format!("filler-{}", i), content))
            .collect();
        documents.insert(position, Document::with_id(NEEDLE_DOC_ID, needle));

        info!(
            "Needle setup: {} fillers, needle at position {}",
            config.haystack_size, position
        );

        // Ingest
        self.pipeline.reset()?;
        self.pipeline.add(&documents)?;

        // Query
        let query = config.query.clone().unwrap_or_else(|| needle.to_string());
        let mut request = SearchRequest::new(&query, config.limit);
        request.use_reranking = config.use_reranking;
        let results = self.pipeline.search(&request)?;

        // Score: 1-based rank of the first needle chunk in the results
        let needle_prefix = format!("{}::", NEEDLE_DOC_ID);
        let rank = results
            .iter()
            .position(|r| r.chunk_id.starts_with(&needle_prefix))
            .map(|i| i + 1);
        let found = rank.is_some();
        let success = rank.map(|r| r <= config.success_top_k).unwrap_or(false);

        info!(
            "Needle result: found={}, rank={:?}, success={}",
            found, rank, success
        );

        Ok(NeedleReport {
            needle: needle.to_string(),
            haystack_size: config.haystack_size,
            needle_position: position,
            query,
            limit: config.limit,
            found,
            rank,
            success,
            top_scores: results.iter().map(|r| r.score).collect(),
            retrieved: results.into_iter().map(|r| r.content).collect(),
            trial: 0,
            finished_at: Utc::now(),
        })
    }

    /// Run the test across several haystack sizes with repeated trials
    ///
    /// Each (size, trial) cell derives its own seed from the base seed so
    /// the whole matrix is reproducible.
    pub fn run_matrix(
        &self,
        needle: &str,
        haystack_sizes: &[usize],
        trials_per_size: usize,
        base: &NeedleConfig,
    ) -> Result<Vec<NeedleReport>, HarnessError> {
        if haystack_sizes.is_empty() || trials_per_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "Matrix needs at least one haystack size and one trial".to_string(),
            ));
        }

        let mut reports = Vec::with_capacity(haystack_sizes.len() * trials_per_size);
        for &size in haystack_sizes {
            for trial in 0..trials_per_size {
                let config = NeedleConfig {
                    haystack_size: size,
                    needle_position: None,
                    seed: base
                        .seed
                        .wrapping_mul(31)
                        .wrapping_add(size as u64)
                        .wrapping_add(trial as u64),
                    ..base.clone()
                };
                let mut report = self.run(needle, &config)?;
                report.trial = trial;
                reports.push(report);
            }
        }
        Ok(reports)
    }
}
