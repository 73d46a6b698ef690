use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::{AssessmentEvent, SharedSink};
use crate::focus::FocusMonitor;
use crate::scoring::percent;
use crate::tasks::{AssessmentStep, StepMetric};
use crate::utils::lock;

use super::{SessionRecord, SessionResult};

/// Latest score reported by each kind of step in the current session.
type ScoreSlots = Arc<Mutex<HashMap<StepMetric, u8>>>;

/// Walks a participant through an ordered list of tests and bundles their
/// scores with the focus average once the last one is done.
pub struct Stepper {
    steps: Vec<Box<dyn AssessmentStep>>,
    monitor: FocusMonitor,
    sink: SharedSink,
    scores: ScoreSlots,
    current: usize,
    session_id: String,
    started_at: DateTime<Utc>,
    record: Option<SessionRecord>,
}

impl Stepper {
    pub fn new(
        steps: Vec<Box<dyn AssessmentStep>>,
        monitor: FocusMonitor,
        sink: SharedSink,
    ) -> Result<Self> {
        ensure!(!steps.is_empty(), "a session needs at least one step");

        let scores: ScoreSlots = Arc::new(Mutex::new(HashMap::new()));
        for step in &steps {
            let focus = monitor.clone();
            step.on_start(Arc::new(move || {
                // A monitor already running for an earlier step keeps going.
                focus.start();
            }));

            let slots = scores.clone();
            let metric = step.metric();
            step.on_score(Arc::new(move |score| {
                lock(&slots).insert(metric, score);
            }));
        }

        let stepper = Self {
            steps,
            monitor,
            sink,
            scores,
            current: 0,
            session_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            record: None,
        };
        log::info!(
            "session {} ready with steps {:?}",
            stepper.session_id,
            stepper.labels()
        );
        Ok(stepper)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn monitor(&self) -> &FocusMonitor {
        &self.monitor
    }

    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.label()).collect()
    }

    pub fn current_label(&self) -> &str {
        self.steps[self.current].label()
    }

    pub fn current_step(&self) -> &dyn AssessmentStep {
        self.steps[self.current].as_ref()
    }

    /// Share of the session reached, counting the current step as reached.
    pub fn progress_percent(&self) -> u8 {
        percent(self.current + 1, self.steps.len())
    }

    pub fn is_finished(&self) -> bool {
        self.record.is_some()
    }

    pub fn result(&self) -> Option<SessionResult> {
        self.record.as_ref().map(|record| record.result)
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    /// Starts (or restarts) the current step. Ignored once the session is
    /// finished.
    pub fn start_current(&self) {
        if self.is_finished() {
            return;
        }
        let step = &self.steps[self.current];
        log::info!("starting step {} ({})", self.current + 1, step.label());
        step.start();
    }

    /// Moves past the current step. On the last step this finalizes the
    /// session and returns its result; calling it again returns the same
    /// result without finalizing twice.
    pub fn advance(&mut self) -> Option<SessionResult> {
        if let Some(record) = &self.record {
            return Some(record.result);
        }

        self.steps[self.current].cancel();
        if self.current + 1 < self.steps.len() {
            self.current += 1;
            return None;
        }

        Some(self.finalize())
    }

    /// Steps back one test, keeping the scores reported so far.
    pub fn previous(&mut self) {
        if self.is_finished() || self.current == 0 {
            return;
        }
        self.steps[self.current].cancel();
        self.current -= 1;
    }

    /// Abandons the current session and prepares a fresh one at the first
    /// step.
    pub fn restart(&mut self) {
        for step in &self.steps {
            step.cancel();
        }
        if let Some(discarded) = self.monitor.stop() {
            log::debug!("discarded focus average {}% on restart", discarded);
        }
        lock(&self.scores).clear();
        self.record = None;
        self.current = 0;
        self.session_id = Uuid::new_v4().to_string();
        self.started_at = Utc::now();
        log::info!("session restarted as {}", self.session_id);
    }

    fn finalize(&mut self) -> SessionResult {
        let average_focus_level = self.monitor.stop().unwrap_or(0);
        let scores = lock(&self.scores).clone();
        let result = SessionResult {
            digit_span_score: scores.get(&StepMetric::DigitSpan).copied().unwrap_or(0),
            cognitive_load_score: scores.get(&StepMetric::CognitiveLoad).copied().unwrap_or(0),
            average_focus_level,
        };

        log::info!("session {} finished: {:?}", self.session_id, result);
        self.record = Some(SessionRecord::new(
            self.session_id.clone(),
            self.started_at,
            result,
        ));
        self.sink.emit(AssessmentEvent::SessionFinished { result });
        result
    }
}
