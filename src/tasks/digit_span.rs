use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::events::{AssessmentEvent, Outbox, SharedSink};
use crate::scoring::percent;
use crate::sequence::{random_source, Alphabet, StimulusSource};
use crate::timer::Scheduler;
use crate::utils::lock;

use super::{AssessmentStep, ScoreCallback, StartCallback, StepMetric, StopCallback};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DigitSpanConfig {
    /// Sequence length each phase starts at.
    pub initial_length: usize,

    /// Ceiling for in-phase length growth.
    pub max_length: usize,

    /// Attempts before a phase ends. With more than one, a correct answer
    /// lengthens the next sequence.
    pub attempts_per_phase: u32,

    /// Display time per digit.
    pub cadence_ms: u64,
}

impl Default for DigitSpanConfig {
    fn default() -> Self {
        Self {
            initial_length: 3,
            max_length: 9,
            attempts_per_phase: 1,
            cadence_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Forward,
    Backward,
}

impl Phase {
    /// The answer the participant has to type for `shown`.
    pub fn expected(&self, shown: &[char]) -> Vec<char> {
        match self {
            Phase::Forward => shown.to_vec(),
            Phase::Backward => shown.iter().rev().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DigitSpanStage {
    #[default]
    Instructions,
    Show,
    Input,
    Done,
}

/// Longest sequence recalled per phase, in digits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpanResults {
    pub forward: usize,
    pub backward: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub phase: Phase,
    pub length: usize,
    pub expected: String,
    pub observed: String,
    pub correct: bool,
}

struct DigitSpanInner {
    stage: DigitSpanStage,
    phase: Phase,
    length: usize,
    attempts_in_phase: u32,
    best_in_phase: Option<usize>,
    sequence: Vec<char>,
    shown: usize,
    input: String,
    attempts: usize,
    correct: usize,
    spans: SpanResults,
    records: Vec<AttemptRecord>,
    score: Option<u8>,
    epoch: u64,
    scheduler: Scheduler,
    source: StimulusSource,
    on_start: Vec<StartCallback>,
    on_score: Vec<ScoreCallback>,
    on_stop: Vec<StopCallback>,
}

impl DigitSpanInner {
    /// Abandons the current run's timers; anything they fire later is stale.
    fn invalidate(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.scheduler.cancel_all();
    }

    fn reset(&mut self, config: &DigitSpanConfig) {
        self.invalidate();
        self.stage = DigitSpanStage::Instructions;
        self.phase = Phase::Forward;
        self.length = config.initial_length;
        self.attempts_in_phase = 0;
        self.best_in_phase = None;
        self.sequence.clear();
        self.shown = 0;
        self.input.clear();
        self.attempts = 0;
        self.correct = 0;
        self.spans = SpanResults::default();
        self.records.clear();
        self.score = None;
    }
}

/// Forward-then-backward digit span test.
///
/// Cheap to clone; clones drive the same test. Must be started inside a tokio
/// runtime, which paces the digit presentation.
#[derive(Clone)]
pub struct DigitSpanTest {
    shared: Arc<Mutex<DigitSpanInner>>,
    config: DigitSpanConfig,
    sink: SharedSink,
    label: String,
}

impl DigitSpanTest {
    pub fn new(config: DigitSpanConfig, sink: SharedSink) -> Self {
        let length = config.initial_length;
        Self {
            shared: Arc::new(Mutex::new(DigitSpanInner {
                stage: DigitSpanStage::Instructions,
                phase: Phase::Forward,
                length,
                attempts_in_phase: 0,
                best_in_phase: None,
                sequence: Vec::new(),
                shown: 0,
                input: String::new(),
                attempts: 0,
                correct: 0,
                spans: SpanResults::default(),
                records: Vec::new(),
                score: None,
                epoch: 0,
                scheduler: Scheduler::new(),
                source: random_source(),
                on_start: Vec::new(),
                on_score: Vec::new(),
                on_stop: Vec::new(),
            })),
            config,
            sink,
            label: "Memory Span".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Replaces the random digit generator, e.g. to replay fixed sequences.
    pub fn with_stimulus_source(self, source: StimulusSource) -> Self {
        lock(&self.shared).source = source;
        self
    }

    pub fn on_stop(&self, callback: StopCallback) {
        lock(&self.shared).on_stop.push(callback);
    }

    pub fn stage(&self) -> DigitSpanStage {
        lock(&self.shared).stage
    }

    pub fn phase(&self) -> Phase {
        lock(&self.shared).phase
    }

    /// Sequence of the current attempt, as shown to the participant.
    pub fn sequence(&self) -> Vec<char> {
        lock(&self.shared).sequence.clone()
    }

    pub fn input(&self) -> String {
        lock(&self.shared).input.clone()
    }

    pub fn spans(&self) -> SpanResults {
        lock(&self.shared).spans
    }

    pub fn records(&self) -> Vec<AttemptRecord> {
        lock(&self.shared).records.clone()
    }

    /// Replaces the answer buffer. Only digit strings are accepted, and only
    /// while an answer is expected; anything else leaves the buffer as it was.
    pub fn type_input(&self, text: &str) -> bool {
        let mut inner = lock(&self.shared);
        if inner.stage != DigitSpanStage::Input || !text.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        inner.input = text.to_string();
        true
    }

    /// Scores the answer buffer against the current sequence. Returns whether
    /// it was correct, or `None` when no answer is expected.
    pub fn submit(&self) -> Option<bool> {
        let mut outbox = Outbox::new();
        let correct = {
            let mut inner = lock(&self.shared);
            if inner.stage != DigitSpanStage::Input {
                return None;
            }
            let correct = self.score_attempt(&mut inner);
            self.after_attempt(&mut inner, correct, &mut outbox);
            correct
        };
        outbox.deliver(self.sink.as_ref());
        Some(correct)
    }

    fn score_attempt(&self, inner: &mut DigitSpanInner) -> bool {
        let expected = inner.phase.expected(&inner.sequence);
        let observed = std::mem::take(&mut inner.input);
        let correct = observed.chars().eq(expected.iter().copied());

        inner.attempts += 1;
        inner.attempts_in_phase += 1;
        if correct {
            inner.correct += 1;
            let length = inner.length;
            inner.best_in_phase = Some(inner.best_in_phase.map_or(length, |best| best.max(length)));
        }
        inner.records.push(AttemptRecord {
            phase: inner.phase,
            length: inner.length,
            expected: expected.into_iter().collect(),
            observed,
            correct,
        });

        log_info!(
            "digit span {:?} attempt at length {}: {}",
            inner.phase,
            inner.length,
            if correct { "correct" } else { "incorrect" }
        );
        correct
    }

    fn after_attempt(&self, inner: &mut DigitSpanInner, correct: bool, outbox: &mut Outbox) {
        if inner.attempts_in_phase < self.config.attempts_per_phase.max(1) {
            if correct {
                inner.length = (inner.length + 1).min(self.config.max_length.max(1));
            }
            self.begin_show(inner, outbox);
            return;
        }

        let span = inner
            .best_in_phase
            .unwrap_or_else(|| self.config.initial_length.saturating_sub(1));
        match inner.phase {
            Phase::Forward => {
                inner.spans.forward = span;
                inner.phase = Phase::Backward;
                inner.length = self.config.initial_length;
                inner.attempts_in_phase = 0;
                inner.best_in_phase = None;
                self.begin_show(inner, outbox);
            }
            Phase::Backward => {
                inner.spans.backward = span;
                self.finish(inner, outbox);
            }
        }
    }

    fn finish(&self, inner: &mut DigitSpanInner, outbox: &mut Outbox) {
        inner.invalidate();
        inner.stage = DigitSpanStage::Done;
        let score = percent(inner.correct, inner.attempts);
        inner.score = Some(score);

        log_info!(
            "digit span done: {}/{} correct, score {}%, spans {:?}",
            inner.correct,
            inner.attempts,
            score,
            inner.spans
        );

        outbox.event(AssessmentEvent::DigitSpanScored {
            score,
            spans: inner.spans,
        });
        outbox.event(AssessmentEvent::DigitSpanStopped);
        for callback in &inner.on_score {
            let callback = callback.clone();
            outbox.call(move || callback(score));
        }
        for callback in &inner.on_stop {
            let callback = callback.clone();
            outbox.call(move || callback());
        }
    }

    fn begin_show(&self, inner: &mut DigitSpanInner, outbox: &mut Outbox) {
        inner.invalidate();
        let length = inner.length;
        inner.sequence = (inner.source)(length, Alphabet::Digits);
        inner.shown = 0;
        inner.input.clear();
        inner.stage = DigitSpanStage::Show;

        log_debug!("showing {:?} sequence of {} digits", inner.phase, length);

        if inner.sequence.is_empty() {
            inner.stage = DigitSpanStage::Input;
            outbox.event(AssessmentEvent::DigitSpanAwaitingInput {
                phase: inner.phase,
                length,
            });
            return;
        }

        let epoch = inner.epoch;
        let cadence = Duration::from_millis(self.config.cadence_ms.max(1));
        inner.scheduler.every(
            cadence,
            show_tick(Arc::downgrade(&self.shared), self.sink.clone(), epoch),
        );
    }
}

/// Reveals one digit per tick, then opens the answer field one tick after the
/// last digit.
fn show_tick(
    shared: Weak<Mutex<DigitSpanInner>>,
    sink: SharedSink,
    epoch: u64,
) -> impl FnMut() -> ControlFlow<()> + Send + 'static {
    move || {
        let Some(shared) = shared.upgrade() else {
            return ControlFlow::Break(());
        };

        let mut outbox = Outbox::new();
        let flow = {
            let mut inner = lock(&shared);
            if inner.epoch != epoch || inner.stage != DigitSpanStage::Show {
                return ControlFlow::Break(());
            }

            if let Some(&digit) = inner.sequence.get(inner.shown) {
                outbox.event(AssessmentEvent::DigitShown {
                    phase: inner.phase,
                    position: inner.shown,
                    digit,
                });
                inner.shown += 1;
                ControlFlow::Continue(())
            } else {
                inner.stage = DigitSpanStage::Input;
                inner.input.clear();
                outbox.event(AssessmentEvent::DigitSpanAwaitingInput {
                    phase: inner.phase,
                    length: inner.sequence.len(),
                });
                ControlFlow::Break(())
            }
        };
        outbox.deliver(sink.as_ref());
        flow
    }
}

impl AssessmentStep for DigitSpanTest {
    fn label(&self) -> &str {
        &self.label
    }

    fn metric(&self) -> StepMetric {
        StepMetric::DigitSpan
    }

    fn start(&self) {
        let mut outbox = Outbox::new();
        {
            let mut inner = lock(&self.shared);
            inner.reset(&self.config);

            outbox.event(AssessmentEvent::DigitSpanStarted);
            for callback in &inner.on_start {
                let callback = callback.clone();
                outbox.call(move || callback());
            }
            self.begin_show(&mut inner, &mut outbox);
        }
        log_info!("digit span test started");
        outbox.deliver(self.sink.as_ref());
    }

    fn cancel(&self) {
        let mut inner = lock(&self.shared);
        match inner.stage {
            DigitSpanStage::Show | DigitSpanStage::Input => {
                inner.reset(&self.config);
                log_info!("digit span test cancelled mid-run");
            }
            DigitSpanStage::Instructions | DigitSpanStage::Done => inner.invalidate(),
        }
    }

    fn on_start(&self, callback: StartCallback) {
        lock(&self.shared).on_start.push(callback);
    }

    fn on_score(&self, callback: ScoreCallback) {
        lock(&self.shared).on_score.push(callback);
    }

    fn score(&self) -> Option<u8> {
        lock(&self.shared).score
    }
}
