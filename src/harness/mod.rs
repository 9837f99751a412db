//! Evaluation harnesses
//!
//! Test drivers that sit above the retrieval pipeline and the generation
//! capability: [`NeedleHarness`] measures retrieval accuracy by planting a
//! known fact in a synthetic corpus, [`LongContextHarness`] measures a
//! model's ability to answer from a long document depending on where the
//! fact sits in it.

mod long_context;
mod needle;

pub use long_context::{
    AnswerMatcher, CellResult, LongContextConfig, LongContextHarness, LongContextReport,
    LongContextTask, NeedlePosition, TrialOutcome, TrialRecord,
};
pub use needle::{NeedleConfig, NeedleHarness, NeedleReport};

use crate::generation::GenerationError;
use crate::retrieval::PipelineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Invalid harness configuration: {0}")]
    InvalidConfig(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

/// Cooperative cancellation flag
///
/// A harness checks the flag between cells, never mid-trial, so a running
/// trial always finishes and gets scored before the run stops.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
