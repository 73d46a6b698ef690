pub mod digit_span;
pub mod nback;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use digit_span::{DigitSpanConfig, DigitSpanStage, DigitSpanTest, Phase, SpanResults};
pub use nback::{expected_matches, NBackConfig, NBackStage, NBackTest, ResponseRecord};

pub type StartCallback = Arc<dyn Fn() + Send + Sync>;
pub type ScoreCallback = Arc<dyn Fn(u8) + Send + Sync>;
pub type StopCallback = Arc<dyn Fn() + Send + Sync>;

/// Which slot of the session result a step's score fills.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StepMetric {
    DigitSpan,
    CognitiveLoad,
}

/// What the session orchestrator needs from a test.
pub trait AssessmentStep: Send + Sync {
    fn label(&self) -> &str;

    fn metric(&self) -> StepMetric;

    /// Starts the test, or restarts it from scratch.
    fn start(&self);

    /// Cancels pending timers. A finished test keeps its score; an unfinished
    /// one returns to its instructions.
    fn cancel(&self);

    /// Called every time the test (re)starts.
    fn on_start(&self, callback: StartCallback);

    /// Called once per completed run with the run's score.
    fn on_score(&self, callback: ScoreCallback);

    /// Score of the last completed run.
    fn score(&self) -> Option<u8>;
}
