use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::session::SessionResult;
use crate::tasks::digit_span::{Phase, SpanResults};
use crate::tasks::nback::ResponseRecord;

/// Everything the engine reports to the surrounding application.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AssessmentEvent {
    #[serde(rename_all = "camelCase")]
    FocusTick {
        focus_ratio: u8,
        running_average: u8,
        elapsed_secs: u64,
    },
    FocusStopped {
        average: u8,
    },
    DigitSpanStarted,
    DigitShown {
        phase: Phase,
        position: usize,
        digit: char,
    },
    DigitSpanAwaitingInput {
        phase: Phase,
        length: usize,
    },
    DigitSpanScored {
        score: u8,
        spans: SpanResults,
    },
    DigitSpanStopped,
    NBackStimulus {
        position: usize,
        letter: char,
    },
    NBackResponse {
        record: ResponseRecord,
    },
    NBackCompleted {
        accuracy: u8,
    },
    SessionFinished {
        result: SessionResult,
    },
}

/// Receives engine events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AssessmentEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: AssessmentEvent) {}
}

impl EventSink for UnboundedSender<AssessmentEvent> {
    fn emit(&self, event: AssessmentEvent) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.send(event);
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(AssessmentEvent) + Send + Sync,
{
    fn emit(&self, event: AssessmentEvent) {
        (self.0)(event)
    }
}

pub type SharedSink = Arc<dyn EventSink>;

pub fn noop_sink() -> SharedSink {
    Arc::new(NoopSink)
}

/// Notifications collected while a component lock is held and delivered
/// after it is released, so callbacks may call back into the component.
#[derive(Default)]
pub(crate) struct Outbox {
    events: Vec<AssessmentEvent>,
    calls: Vec<Box<dyn FnOnce() + Send>>,
}

impl Outbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn event(&mut self, event: AssessmentEvent) {
        self.events.push(event);
    }

    pub(crate) fn call<F>(&mut self, call: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.calls.push(Box::new(call));
    }

    /// Callbacks run first, then events go out, both in the order recorded.
    /// A sink that sees a completion event can rely on the score hooks having
    /// already run.
    pub(crate) fn deliver(self, sink: &dyn EventSink) {
        for call in self.calls {
            call();
        }
        for event in self.events {
            sink.emit(event);
        }
    }
}
