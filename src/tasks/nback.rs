use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::events::{AssessmentEvent, Outbox, SharedSink};
use crate::scoring::percent;
use crate::sequence::{random_source, Alphabet, StimulusSource};
use crate::timer::{Scheduler, TimerHandle};
use crate::utils::lock;

use super::{AssessmentStep, ScoreCallback, StartCallback, StepMetric};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct NBackConfig {
    /// How many positions back a letter has to match.
    pub n: usize,
    pub sequence_length: usize,
    /// Response deadline per letter.
    pub interval_ms: u64,
}

impl Default for NBackConfig {
    fn default() -> Self {
        Self {
            n: 2,
            sequence_length: 20,
            interval_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum NBackStage {
    #[default]
    Instructions,
    Test,
    Results,
}

/// Outcome of one letter. `observed` is `None` when the deadline passed
/// without an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub position: usize,
    pub stimulus: char,
    pub expected: bool,
    pub observed: Option<bool>,
    pub correct: bool,
}

/// Whether each position repeats the letter `n` positions earlier.
pub fn expected_matches(sequence: &[char], n: usize) -> Vec<bool> {
    (0..sequence.len())
        .map(|i| i >= n && sequence[i] == sequence[i - n])
        .collect()
}

struct NBackInner {
    stage: NBackStage,
    sequence: Vec<char>,
    position: usize,
    records: Vec<ResponseRecord>,
    accuracy: Option<u8>,
    epoch: u64,
    scheduler: Scheduler,
    deadline: Option<TimerHandle>,
    source: StimulusSource,
    on_start: Vec<StartCallback>,
    on_score: Vec<ScoreCallback>,
}

impl NBackInner {
    fn invalidate(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.deadline = None;
        self.scheduler.cancel_all();
    }

    fn expected_at(&self, position: usize, n: usize) -> bool {
        position >= n && self.sequence[position] == self.sequence[position - n]
    }
}

/// Everything a deadline callback needs to drive the test forward.
#[derive(Clone)]
struct Wiring {
    shared: Weak<Mutex<NBackInner>>,
    sink: SharedSink,
    n: usize,
    deadline: Duration,
}

/// N-back sustained attention test.
///
/// Each letter is open for `interval_ms`; the first of "answer" and
/// "deadline" decides the position's record. Cheap to clone; must be started
/// inside a tokio runtime.
#[derive(Clone)]
pub struct NBackTest {
    shared: Arc<Mutex<NBackInner>>,
    config: NBackConfig,
    sink: SharedSink,
    label: String,
}

impl NBackTest {
    pub fn new(config: NBackConfig, sink: SharedSink) -> Self {
        Self {
            shared: Arc::new(Mutex::new(NBackInner {
                stage: NBackStage::Instructions,
                sequence: Vec::new(),
                position: 0,
                records: Vec::new(),
                accuracy: None,
                epoch: 0,
                scheduler: Scheduler::new(),
                deadline: None,
                source: random_source(),
                on_start: Vec::new(),
                on_score: Vec::new(),
            })),
            config,
            sink,
            label: "Cognitive Load".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Replaces the random letter generator, e.g. to replay a fixed sequence.
    pub fn with_stimulus_source(self, source: StimulusSource) -> Self {
        lock(&self.shared).source = source;
        self
    }

    pub fn config(&self) -> &NBackConfig {
        &self.config
    }

    pub fn stage(&self) -> NBackStage {
        lock(&self.shared).stage
    }

    /// Position currently on screen.
    pub fn position(&self) -> usize {
        lock(&self.shared).position
    }

    pub fn sequence(&self) -> Vec<char> {
        lock(&self.shared).sequence.clone()
    }

    pub fn records(&self) -> Vec<ResponseRecord> {
        lock(&self.shared).records.clone()
    }

    /// Answers the letter on screen. Returns false when no letter is open,
    /// including when its deadline already fired.
    pub fn respond(&self, is_match: bool) -> bool {
        let mut outbox = Outbox::new();
        {
            let mut inner = lock(&self.shared);
            if inner.stage != NBackStage::Test {
                return false;
            }
            if let Some(deadline) = inner.deadline.take() {
                deadline.cancel();
            }
            record(&mut inner, &self.wiring(), Some(is_match), &mut outbox);
        }
        outbox.deliver(self.sink.as_ref());
        true
    }

    fn wiring(&self) -> Wiring {
        Wiring {
            shared: Arc::downgrade(&self.shared),
            sink: self.sink.clone(),
            n: self.config.n,
            deadline: Duration::from_millis(self.config.interval_ms.max(1)),
        }
    }
}

/// Appends the record for the open position and moves on.
fn record(inner: &mut NBackInner, wiring: &Wiring, observed: Option<bool>, outbox: &mut Outbox) {
    let position = inner.position;
    let expected = inner.expected_at(position, wiring.n);
    let record = ResponseRecord {
        position,
        stimulus: inner.sequence[position],
        expected,
        observed,
        correct: observed == Some(expected),
    };
    log_debug!(
        "n-back position {}: expected {}, observed {:?}",
        position,
        expected,
        observed
    );
    inner.records.push(record.clone());
    outbox.event(AssessmentEvent::NBackResponse { record });

    inner.position += 1;
    present(inner, wiring, outbox);
}

/// Shows the letter at the current position with a fresh deadline, or closes
/// the test after the last one.
fn present(inner: &mut NBackInner, wiring: &Wiring, outbox: &mut Outbox) {
    let position = inner.position;
    let Some(&letter) = inner.sequence.get(position) else {
        finish(inner, outbox);
        return;
    };

    outbox.event(AssessmentEvent::NBackStimulus { position, letter });

    let epoch = inner.epoch;
    let on_deadline = wiring.clone();
    let handle = inner.scheduler.after(wiring.deadline, move || {
        deadline_fired(on_deadline, epoch, position);
    });
    inner.deadline = Some(handle);
}

fn deadline_fired(wiring: Wiring, epoch: u64, position: usize) {
    let Some(shared) = wiring.shared.upgrade() else {
        return;
    };

    let mut outbox = Outbox::new();
    {
        let mut inner = lock(&shared);
        // An answer, a restart or a cancel got here first.
        if inner.epoch != epoch || inner.stage != NBackStage::Test || inner.position != position {
            return;
        }
        inner.deadline = None;
        record(&mut inner, &wiring, None, &mut outbox);
    }
    outbox.deliver(wiring.sink.as_ref());
}

fn finish(inner: &mut NBackInner, outbox: &mut Outbox) {
    inner.invalidate();
    inner.stage = NBackStage::Results;

    let correct = inner.records.iter().filter(|r| r.correct).count();
    let accuracy = percent(correct, inner.sequence.len());
    inner.accuracy = Some(accuracy);

    log_info!(
        "n-back done: {}/{} correct, accuracy {}%",
        correct,
        inner.sequence.len(),
        accuracy
    );

    outbox.event(AssessmentEvent::NBackCompleted { accuracy });
    for callback in &inner.on_score {
        let callback = callback.clone();
        outbox.call(move || callback(accuracy));
    }
}

impl AssessmentStep for NBackTest {
    fn label(&self) -> &str {
        &self.label
    }

    fn metric(&self) -> StepMetric {
        StepMetric::CognitiveLoad
    }

    fn start(&self) {
        let wiring = self.wiring();
        let mut outbox = Outbox::new();
        {
            let mut inner = lock(&self.shared);
            inner.invalidate();
            let sequence = (inner.source)(self.config.sequence_length, Alphabet::Letters);
            inner.sequence = sequence;
            inner.records.clear();
            inner.accuracy = None;
            inner.position = 0;
            inner.stage = NBackStage::Test;

            for callback in &inner.on_start {
                let callback = callback.clone();
                outbox.call(move || callback());
            }
            present(&mut inner, &wiring, &mut outbox);
        }
        log_info!(
            "{}-back test started with {} letters",
            self.config.n,
            self.config.sequence_length
        );
        outbox.deliver(self.sink.as_ref());
    }

    fn cancel(&self) {
        let mut inner = lock(&self.shared);
        inner.invalidate();
        if inner.stage == NBackStage::Test {
            inner.stage = NBackStage::Instructions;
            inner.records.clear();
            inner.position = 0;
            log_info!("n-back test cancelled mid-run");
        }
    }

    fn on_start(&self, callback: StartCallback) {
        lock(&self.shared).on_start.push(callback);
    }

    fn on_score(&self, callback: ScoreCallback) {
        lock(&self.shared).on_score.push(callback);
    }

    fn score(&self) -> Option<u8> {
        lock(&self.shared).accuracy
    }
}
