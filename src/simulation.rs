use std::sync::Arc;

use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{self, Duration};

use crate::events::{AssessmentEvent, SharedSink};
use crate::focus::FocusMonitor;
use crate::gaze::{GazeDevice, SimulatedGaze, Viewport};
use crate::session::{SessionRecord, Stepper};
use crate::settings::AssessmentSettings;
use crate::tasks::{expected_matches, AssessmentStep, DigitSpanTest, NBackTest, Phase};

/// How the scripted participant and the simulated tracker behave.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub viewport: Viewport,
    pub gaze_rate_hz: u32,
    /// Chance that a gaze sample lands near the screen center.
    pub focus_probability: f64,
    /// Chance that an answer is right.
    pub accuracy: f64,
    /// Chance that an n-back letter goes unanswered.
    pub miss_rate: f64,
    pub reaction: Duration,
    /// Fixed seed for reproducible answers; random when `None`.
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            gaze_rate_hz: 30,
            focus_probability: 0.8,
            accuracy: 0.85,
            miss_rate: 0.05,
            reaction: Duration::from_millis(600),
            seed: None,
        }
    }
}

/// Answers on behalf of a participant, right with probability `accuracy`.
struct Participant {
    rng: StdRng,
    accuracy: f64,
    miss_rate: f64,
    reaction: Duration,
}

impl Participant {
    fn new(options: &SimulationOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            accuracy: options.accuracy.clamp(0.0, 1.0),
            miss_rate: options.miss_rate.clamp(0.0, 1.0),
            reaction: options.reaction,
        }
    }

    fn recall(&mut self, phase: Phase, shown: &[char]) -> String {
        let mut answer = phase.expected(shown);
        if !self.rng.gen_bool(self.accuracy) {
            if let Some(first) = answer.first_mut() {
                *first = if *first == '9' { '1' } else { (*first as u8 + 1) as char };
            }
        }
        answer.into_iter().collect()
    }

    fn judge(&mut self, is_match: bool) -> Option<bool> {
        if self.rng.gen_bool(self.miss_rate) {
            return None;
        }
        Some(if self.rng.gen_bool(self.accuracy) {
            is_match
        } else {
            !is_match
        })
    }
}

/// Runs one complete session, digit span then n-back, with a simulated gaze
/// tracker and a scripted participant, in real time on the current runtime.
pub async fn run_session(
    settings: &AssessmentSettings,
    options: SimulationOptions,
) -> Result<SessionRecord> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink: SharedSink = Arc::new(tx);

    let gaze = Arc::new(SimulatedGaze::new(
        options.viewport,
        options.gaze_rate_hz,
        options.focus_probability,
    ));
    let monitor = FocusMonitor::new(
        settings.focus.clone(),
        Some(GazeDevice::new(gaze)),
        sink.clone(),
    );
    let digit_span = DigitSpanTest::new(settings.digit_span.clone(), sink.clone());
    let nback = NBackTest::new(settings.n_back.clone(), sink.clone());
    let n = settings.n_back.n;

    let steps: Vec<Box<dyn AssessmentStep>> =
        vec![Box::new(digit_span.clone()), Box::new(nback.clone())];
    let mut stepper = Stepper::new(steps, monitor, sink)?;
    let mut participant = Participant::new(&options);

    stepper.start_current();
    while let Some(event) = rx.recv().await {
        match event {
            AssessmentEvent::FocusTick {
                focus_ratio,
                running_average,
                elapsed_secs,
            } => {
                log::debug!(
                    "[{}s] focus {}% (average {}%)",
                    elapsed_secs,
                    focus_ratio,
                    running_average
                );
            }
            AssessmentEvent::DigitSpanAwaitingInput { phase, length } => {
                time::sleep(participant.reaction * length as u32).await;
                let answer = participant.recall(phase, &digit_span.sequence());
                digit_span.type_input(&answer);
                digit_span.submit();
            }
            AssessmentEvent::DigitSpanScored { score, spans } => {
                log::info!(
                    "digit span scored {}% (forward {}, backward {})",
                    score,
                    spans.forward,
                    spans.backward
                );
            }
            AssessmentEvent::DigitSpanStopped => {
                stepper.advance();
                stepper.start_current();
            }
            AssessmentEvent::NBackStimulus { position, .. } => {
                time::sleep(participant.reaction).await;
                let is_match = expected_matches(&nback.sequence(), n)
                    .get(position)
                    .copied()
                    .unwrap_or(false);
                // Skip the answer if the deadline already moved on.
                if let Some(answer) = participant.judge(is_match) {
                    if nback.position() == position {
                        nback.respond(answer);
                    }
                }
            }
            AssessmentEvent::NBackCompleted { accuracy } => {
                log::info!("n-back accuracy {}%", accuracy);
                if stepper.advance().is_some() {
                    break;
                }
            }
            _ => {}
        }
    }

    stepper
        .record()
        .cloned()
        .ok_or_else(|| anyhow!("event stream closed before the session finished"))
}
