//! Long-context position test
//!
//! Measures a generation model's ability to answer a question from a long
//! document depending on where the answer sits. For every (context length,
//! needle position) cell the harness synthesizes a filler document of the
//! target length, inserts the needle at the target depth, asks the model
//! the question, and classifies the answer. Trials inside a cell run
//! concurrently; cells run in sequence so cancellation can take effect
//! between them without losing a scored trial.

use super::{CancelFlag, HarnessError};
use crate::generation::GenerationProvider;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Where the needle is inserted, as a fraction of the document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedlePosition {
    Beginning,
    Middle,
    End,
    /// Arbitrary depth in [0, 1]
    Fraction(f32),
}

impl NeedlePosition {
    /// Normalized depth of this position
    pub fn fraction(&self) -> f32 {
        match self {
            Self::Beginning => 0.0,
            Self::Middle => 0.5,
            Self::End => 1.0,
            Self::Fraction(f) => f.clamp(0.0, 1.0),
        }
    }

    /// Parse a CLI argument: a named position or a bare fraction
    pub fn parse_position(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "beginning" | "start" => Some(Self::Beginning),
            "middle" => Some(Self::Middle),
            "end" => Some(Self::End),
            other => other.parse::<f32>().ok().map(Self::Fraction),
        }
    }
}

impl fmt::Display for NeedlePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginning => write!(f, "beginning"),
            Self::Middle => write!(f, "middle"),
            Self::End => write!(f, "end"),
            Self::Fraction(v) => write!(f, "{:.2}", v),
        }
    }
}

/// How a model response is judged against the expected answer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMatcher {
    /// Case-insensitive containment of the expected answer
    Substring,
    /// Fraction of the expected answer's characters present in the
    /// response must reach `min_overlap`
    Fuzzy { min_overlap: f32 },
}

impl AnswerMatcher {
    pub fn matches(&self, expected: &str, response: &str) -> bool {
        match self {
            Self::Substring => response
                .to_lowercase()
                .contains(&expected.to_lowercase()),
            Self::Fuzzy { min_overlap } => {
                let expected_chars: Vec<char> = expected
                    .to_lowercase()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                if expected_chars.is_empty() {
                    return false;
                }
                let response_lower = response.to_lowercase();
                let hits = expected_chars
                    .iter()
                    .filter(|c| response_lower.contains(**c))
                    .count();
                hits as f32 / expected_chars.len() as f32 >= *min_overlap
            }
        }
    }
}

/// Configuration for a long-context run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongContextConfig {
    /// Context length budgets, in characters
    pub context_lengths: Vec<usize>,
    /// Needle positions to test
    pub positions: Vec<NeedlePosition>,
    /// Trials per (length, position) cell
    pub trials_per_config: usize,
    /// Response classification
    pub matcher: AnswerMatcher,
    /// Maximum concurrent trials within a cell
    pub max_concurrent: usize,
    /// Seed for random needle generation
    pub seed: u64,
}

impl Default for LongContextConfig {
    fn default() -> Self {
        Self {
            context_lengths: vec![1000, 4000],
            positions: vec![
                NeedlePosition::Beginning,
                NeedlePosition::Middle,
                NeedlePosition::End,
            ],
            trials_per_config: 3,
            matcher: AnswerMatcher::Substring,
            max_concurrent: 4,
            seed: 42,
        }
    }
}

/// The fact to plant, the question to ask, and the expected answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongContextTask {
    pub needle: String,
    pub query: String,
    pub expected_answer: String,
}

impl LongContextTask {
    /// Generate a task with a unique magic number so repeated trials
    /// cannot hit a response cache
    pub fn random(rng: &mut impl Rng) -> Self {
        const CITIES: &[&str] = &["杭州", "北京", "上海", "深圳", "广州", "成都"];
        let number: u32 = rng.gen_range(10000..=99999);
        let city = CITIES[rng.gen_range(0..CITIES.len())];
        Self {
            needle: format!("特殊信息：在{}市，魔法数字是{}。这是一个重要的标记。", city, number),
            query: "魔法数字是多少？".to_string(),
            expected_answer: number.to_string(),
        }
    }
}

/// How a single trial ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    Correct,
    Incorrect,
    /// Infrastructure failure, kept apart from wrong answers so accuracy
    /// is not conflated with provider breakage
    Failed(String),
}

/// Raw record of one trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub context_length: usize,
    pub position: NeedlePosition,
    pub trial: usize,
    pub outcome: TrialOutcome,
    pub response: Option<String>,
    /// Index at which the needle was inserted among the filler segments
    pub needle_index: usize,
    pub filler_count: usize,
}

/// Aggregate for one (length, position) cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellResult {
    pub context_length: usize,
    pub position: NeedlePosition,
    pub trial_count: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub failures: usize,
    /// correct / (correct + incorrect); failures are excluded
    pub accuracy: f32,
}

/// Full run output: the accuracy matrix plus every raw trial record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongContextReport {
    pub cells: Vec<CellResult>,
    pub records: Vec<TrialRecord>,
    /// True when the run stopped early on a cancellation request
    pub cancelled: bool,
    /// When the run finished
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl LongContextReport {
    /// Accuracy for a single cell, if it was run
    pub fn accuracy(&self, context_length: usize, position: NeedlePosition) -> Option<f32> {
        self.cells
            .iter()
            .find(|c| c.context_length == context_length && c.position == position)
            .map(|c| c.accuracy)
    }
}

const SYSTEM_PROMPT: &str = "你是一个智能助手。请仔细阅读提供的文档，从中找到准确的信息来回答问题。\n\n只回答问题，不要添加额外的解释。";

/// Long-context harness over a generation provider
pub struct LongContextHarness {
    provider: Arc<dyn GenerationProvider>,
    config: LongContextConfig,
}

impl LongContextHarness {
    /// Create a harness, validating the configuration up front
    ///
    /// A configuration that would produce cells with zero trials is
    /// rejected here rather than silently reporting zero accuracy later.
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        config: LongContextConfig,
    ) -> Result<Self, HarnessError> {
        if config.trials_per_config == 0 {
            return Err(HarnessError::InvalidConfig(
                "trials_per_config must be at least 1".to_string(),
            ));
        }
        if config.context_lengths.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "context_lengths cannot be empty".to_string(),
            ));
        }
        if config.positions.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "positions cannot be empty".to_string(),
            ));
        }
        if config.max_concurrent == 0 {
            return Err(HarnessError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if let AnswerMatcher::Fuzzy { min_overlap } = config.matcher {
            if !(0.0..=1.0).contains(&min_overlap) {
                return Err(HarnessError::InvalidConfig(
                    "fuzzy min_overlap must be within [0, 1]".to_string(),
                ));
            }
        }
        Ok(Self { provider, config })
    }

    /// Run the full length x position matrix for one task
    ///
    /// The cancellation flag is honored between cells: trials of the
    /// current cell finish and are scored before the run stops.
    pub async fn run(
        &self,
        task: &LongContextTask,
        cancel: &CancelFlag,
    ) -> Result<LongContextReport, HarnessError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut cells = Vec::new();
        let mut records = Vec::new();
        let mut cancelled = false;

        'cells: for &length in &self.config.context_lengths {
            for &position in &self.config.positions {
                if cancel.is_cancelled() {
                    warn!("Cancellation requested, stopping before cell ({}, {})", length, position);
                    cancelled = true;
                    break 'cells;
                }

                let cell_records = self
                    .run_cell(task, length, position, semaphore.clone())
                    .await;

                let correct = cell_records
                    .iter()
                    .filter(|r| r.outcome == TrialOutcome::Correct)
                    .count();
                let incorrect = cell_records
                    .iter()
                    .filter(|r| r.outcome == TrialOutcome::Incorrect)
                    .count();
                let failures = cell_records.len() - correct - incorrect;
                let scored = correct + incorrect;
                let accuracy = if scored > 0 {
                    correct as f32 / scored as f32
                } else {
                    0.0
                };

                info!(
                    "Cell ({} chars, {}): accuracy {:.2} ({} correct, {} incorrect, {} failed)",
                    length, position, accuracy, correct, incorrect, failures
                );

                cells.push(CellResult {
                    context_length: length,
                    position,
                    trial_count: cell_records.len(),
                    correct,
                    incorrect,
                    failures,
                    accuracy,
                });
                records.extend(cell_records);
            }
        }

        Ok(LongContextReport {
            cells,
            records,
            cancelled,
            finished_at: chrono::Utc::now(),
        })
    }

    /// Run every trial of one cell, bounded by the semaphore
    async fn run_cell(
        &self,
        task: &LongContextTask,
        length: usize,
        position: NeedlePosition,
        semaphore: Arc<Semaphore>,
    ) -> Vec<TrialRecord> {
        let mut handles = Vec::with_capacity(self.config.trials_per_config);

        for trial in 0..self.config.trials_per_config {
            let (document, needle_index, filler_count) =
                synthesize_context(length, position.fraction(), &task.needle);
            let user_message = format!("文档内容：\n{}\n\n问题：{}", document, task.query);

            let provider = self.provider.clone();
            let permit_sem = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit_sem
                    .acquire_owned()
                    .await
                    .map_err(|e| e.to_string())?;
                tokio::task::spawn_blocking(move || {
                    provider
                        .generate(SYSTEM_PROMPT, &user_message)
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| e.to_string())?
            });
            handles.push((trial, needle_index, filler_count, handle));
        }

        let mut cell_records = Vec::with_capacity(handles.len());
        for (trial, needle_index, filler_count, handle) in handles {
            let (outcome, response) = match handle.await {
                Ok(Ok(response)) => {
                    let outcome = if self.config.matcher.matches(&task.expected_answer, &response)
                    {
                        TrialOutcome::Correct
                    } else {
                        TrialOutcome::Incorrect
                    };
                    (outcome, Some(response))
                }
                Ok(Err(reason)) => (TrialOutcome::Failed(reason), None),
                Err(join_error) => (TrialOutcome::Failed(join_error.to_string()), None),
            };

            cell_records.push(TrialRecord {
                context_length: length,
                position,
                trial,
                outcome,
                response,
                needle_index,
                filler_count,
            });
        }
        cell_records
    }
}

/// Build a document of roughly `length` characters with the needle at the
/// given depth
///
/// Deterministic for a given (length, fraction, needle): filler segments
/// are numbered sequences, the needle index is the rounded fraction of the
/// segment count, and everything is joined with blank lines.
fn synthesize_context(length: usize, fraction: f32, needle: &str) -> (String, usize, usize) {
    let mut fillers = Vec::new();
    let mut total = 0usize;
    let mut i = 0usize;
    while total < length {
        let segment = format!("这是第{}段背景资料，描述一些无关紧要的日常事务，仅用于填充上下文。", i);
        total += segment.chars().count();
        fillers.push(segment);
        i += 1;
    }

    let filler_count = fillers.len();
    let needle_index = ((fraction * filler_count as f32).round() as usize).min(filler_count);
    fillers.insert(needle_index, needle.to_string());

    (fillers.join("\n\n"), needle_index, filler_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that answers correctly only when the needle text made it
    /// into the prompt
    struct EchoProvider {
        answer: String,
        calls: AtomicUsize,
    }

    impl GenerationProvider for EchoProvider {
        fn generate(
            &self,
            _system_prompt: &str,
            user_message: &str,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if user_message.contains("魔法数字") {
                Ok(format!("魔法数字是{}。", self.answer))
            } else {
                Ok("文档中没有相关信息。".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct FailingProvider;

    impl GenerationProvider for FailingProvider {
        fn generate(&self, _: &str, _: &str) -> Result<String, GenerationError> {
            Err(GenerationError::GenerationFailed("connection reset".to_string()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn task() -> LongContextTask {
        LongContextTask {
            needle: "特殊信息：在杭州市，魔法数字是54321。这是一个重要的标记。".to_string(),
            query: "魔法数字是多少？".to_string(),
            expected_answer: "54321".to_string(),
        }
    }

    #[test]
    fn test_zero_trials_fails_fast() {
        let provider = Arc::new(EchoProvider {
            answer: "54321".to_string(),
            calls: AtomicUsize::new(0),
        });
        let config = LongContextConfig {
            trials_per_config: 0,
            ..LongContextConfig::default()
        };
        assert!(matches!(
            LongContextHarness::new(provider, config),
            Err(HarnessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_axes_fail_fast() {
        let provider = Arc::new(FailingProvider);
        let config = LongContextConfig {
            context_lengths: vec![],
            ..LongContextConfig::default()
        };
        assert!(LongContextHarness::new(provider, config).is_err());
    }

    #[test]
    fn test_position_fractions() {
        assert_eq!(NeedlePosition::Beginning.fraction(), 0.0);
        assert_eq!(NeedlePosition::Middle.fraction(), 0.5);
        assert_eq!(NeedlePosition::End.fraction(), 1.0);
        assert_eq!(NeedlePosition::Fraction(2.0).fraction(), 1.0);
        assert_eq!(NeedlePosition::parse_position("middle"), Some(NeedlePosition::Middle));
        assert_eq!(
            NeedlePosition::parse_position("0.25"),
            Some(NeedlePosition::Fraction(0.25))
        );
        assert_eq!(NeedlePosition::parse_position("sideways"), None);
    }

    #[test]
    fn test_synthesize_context_places_needle() {
        let (doc, index, count) = synthesize_context(1000, 0.0, "NEEDLE");
        assert_eq!(index, 0);
        assert!(doc.starts_with("NEEDLE"));
        assert!(count > 0);

        let (doc, index, count) = synthesize_context(1000, 1.0, "NEEDLE");
        assert_eq!(index, count);
        assert!(doc.ends_with("NEEDLE"));

        let (doc, _, _) = synthesize_context(1000, 0.5, "NEEDLE");
        assert!(doc.chars().count() >= 1000);
    }

    #[test]
    fn test_matchers() {
        assert!(AnswerMatcher::Substring.matches("54321", "答案是 54321。"));
        assert!(!AnswerMatcher::Substring.matches("54321", "不知道"));
        assert!(AnswerMatcher::Substring.matches("Paris", "the answer is PARIS"));

        let fuzzy = AnswerMatcher::Fuzzy { min_overlap: 0.6 };
        assert!(fuzzy.matches("54321", "包含 5 4 3 的回答"));
        assert!(!fuzzy.matches("54321", "完全无关"));
    }

    #[tokio::test]
    async fn test_single_cell_aggregation() {
        let provider = Arc::new(EchoProvider {
            answer: "54321".to_string(),
            calls: AtomicUsize::new(0),
        });
        let config = LongContextConfig {
            context_lengths: vec![1000],
            positions: vec![NeedlePosition::Middle],
            trials_per_config: 5,
            ..LongContextConfig::default()
        };
        let harness = LongContextHarness::new(provider.clone(), config).unwrap();

        let report = harness.run(&task(), &CancelFlag::new()).await.unwrap();

        assert_eq!(report.cells.len(), 1);
        let cell = &report.cells[0];
        assert_eq!(cell.trial_count, 5);
        assert_eq!(cell.correct, 5);
        assert!((0.0..=1.0).contains(&cell.accuracy));
        assert_eq!(cell.accuracy, 1.0);
        assert_eq!(report.records.len(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            report.accuracy(1000, NeedlePosition::Middle),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_count_as_incorrect() {
        let config = LongContextConfig {
            context_lengths: vec![500],
            positions: vec![NeedlePosition::Beginning],
            trials_per_config: 3,
            ..LongContextConfig::default()
        };
        let harness = LongContextHarness::new(Arc::new(FailingProvider), config).unwrap();

        let report = harness.run(&task(), &CancelFlag::new()).await.unwrap();
        let cell = &report.cells[0];

        assert_eq!(cell.failures, 3);
        assert_eq!(cell.correct, 0);
        assert_eq!(cell.incorrect, 0);
        // No scored trials: accuracy reports 0 but failures say why
        assert_eq!(cell.accuracy, 0.0);
    }

    #[tokio::test]
    async fn test_cancellation_between_cells() {
        let provider = Arc::new(EchoProvider {
            answer: "54321".to_string(),
            calls: AtomicUsize::new(0),
        });
        let harness =
            LongContextHarness::new(provider, LongContextConfig::default()).unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = harness.run(&task(), &cancel).await.unwrap();

        assert!(report.cancelled);
        assert!(report.cells.is_empty());
    }

    #[test]
    fn test_random_task_is_seedable() {
        use rand::SeedableRng;
        let mut a = rand::rngs::StdRng::seed_from_u64(9);
        let mut b = rand::rngs::StdRng::seed_from_u64(9);
        let task_a = LongContextTask::random(&mut a);
        let task_b = LongContextTask::random(&mut b);
        assert_eq!(task_a.needle, task_b.needle);
        assert_eq!(task_a.expected_answer, task_b.expected_answer);
        assert!(task_a.needle.contains(&task_a.expected_answer));
    }
}
