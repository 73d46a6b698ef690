use std::sync::Arc;

use lecog_lib::events::{AssessmentEvent, SharedSink};
use lecog_lib::focus::{FocusConfig, FocusMonitor};
use lecog_lib::gaze::{GazeDevice, PushGaze, Viewport};
use lecog_lib::session::{SessionResult, Stepper};
use lecog_lib::tasks::{
    expected_matches, AssessmentStep, DigitSpanConfig, DigitSpanStage, DigitSpanTest, NBackConfig,
    NBackTest,
};
use tokio::sync::mpsc;
use tokio::time::{self, Duration};

const NBACK_LETTERS: &str = "ABABCDCDEFEFGHGHIJIJ";

struct Session {
    stepper: Stepper,
    digit_span: DigitSpanTest,
    nback: NBackTest,
    events: mpsc::UnboundedReceiver<AssessmentEvent>,
}

fn session(gaze: Arc<PushGaze>) -> Session {
    let (tx, events) = mpsc::unbounded_channel();
    let sink: SharedSink = Arc::new(tx);

    // Three-second buckets so the whole digit span test spans exactly three.
    let focus = FocusConfig {
        interval_ms: 3000,
        ..FocusConfig::default()
    };
    let monitor = FocusMonitor::new(focus, Some(GazeDevice::new(gaze)), sink.clone());

    let mut digits = vec!["123", "456"].into_iter();
    let digit_span = DigitSpanTest::new(DigitSpanConfig::default(), sink.clone())
        .with_stimulus_source(Box::new(move |_, _| {
            digits.next().unwrap_or("999").chars().collect()
        }));
    let nback = NBackTest::new(NBackConfig::default(), sink.clone())
        .with_stimulus_source(Box::new(|_, _| NBACK_LETTERS.chars().collect()));

    let steps: Vec<Box<dyn AssessmentStep>> =
        vec![Box::new(digit_span.clone()), Box::new(nback.clone())];
    let stepper = Stepper::new(steps, monitor, sink).unwrap();

    Session {
        stepper,
        digit_span,
        nback,
        events,
    }
}

fn look(gaze: &PushGaze, hits: usize) {
    for i in 0..10 {
        if i < hits {
            gaze.push(900.0, 500.0);
        } else {
            gaze.push(50.0, 1000.0);
        }
    }
}

fn answer(test: &DigitSpanTest, text: &str) {
    assert_eq!(test.stage(), DigitSpanStage::Input);
    assert!(test.type_input(text));
    test.submit();
}

#[tokio::test(start_paused = true)]
async fn full_session_produces_expected_result() {
    let gaze = Arc::new(PushGaze::new(Viewport::default()));
    let mut s = session(gaze.clone());

    s.stepper.start_current();
    time::sleep(Duration::from_millis(500)).await;
    look(&gaze, 9);

    // Forward sequence fully shown and the answer field open at 4s.
    time::sleep(Duration::from_millis(4000)).await;
    answer(&s.digit_span, "123");
    look(&gaze, 7);

    time::sleep(Duration::from_millis(2000)).await;
    look(&gaze, 8);

    time::sleep(Duration::from_millis(3000)).await;
    answer(&s.digit_span, "654");
    assert_eq!(s.digit_span.score(), Some(100));

    assert_eq!(s.stepper.advance(), None);
    s.stepper.start_current();

    let expected = expected_matches(&NBACK_LETTERS.chars().collect::<Vec<_>>(), 2);
    for (i, is_match) in expected.into_iter().enumerate() {
        let response = if i < 15 { is_match } else { !is_match };
        assert!(s.nback.respond(response));
    }
    assert_eq!(s.nback.score(), Some(75));

    let result = s.stepper.advance();
    let expected = SessionResult {
        digit_span_score: 100,
        cognitive_load_score: 75,
        average_focus_level: 80,
    };
    assert_eq!(result, Some(expected));
    assert_eq!(gaze.end_count(), 1);
    assert!(!gaze.has_listener());

    let mut finished = Vec::new();
    let mut ticks = Vec::new();
    while let Ok(event) = s.events.try_recv() {
        match event {
            AssessmentEvent::SessionFinished { result } => finished.push(result),
            AssessmentEvent::FocusTick { focus_ratio, .. } => ticks.push(focus_ratio),
            _ => {}
        }
    }
    assert_eq!(finished, [expected]);
    assert_eq!(ticks, [90, 70, 80]);
}

#[tokio::test(start_paused = true)]
async fn failing_tracker_still_completes_with_zero_focus() {
    let gaze = Arc::new(PushGaze::failing(Viewport::default()));
    let mut s = session(gaze.clone());

    s.stepper.start_current();
    time::sleep(Duration::from_millis(4500)).await;
    answer(&s.digit_span, "123");
    time::sleep(Duration::from_millis(4500)).await;
    answer(&s.digit_span, "000");

    s.stepper.advance();
    s.stepper.start_current();
    // Let every letter time out.
    time::sleep(Duration::from_millis(31_000)).await;
    assert_eq!(s.nback.records().len(), 20);

    let result = s.stepper.advance().unwrap();
    assert_eq!(result.digit_span_score, 50);
    assert_eq!(result.average_focus_level, 0);
    // Every timed-out letter counts as incorrect.
    assert_eq!(result.cognitive_load_score, 0);
    assert!(!gaze.has_listener());
}
