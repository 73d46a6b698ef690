use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use serde::Serialize;
use tokio::{runtime::Handle, time::Duration};

use crate::events::{AssessmentEvent, Outbox, SharedSink};
use crate::gaze::{AttentionRegion, GazeDevice, GazeLease, GazeListener, GazeStream};
use crate::timer::Scheduler;
use crate::utils::lock;

use super::{BucketMetric, FocusConfig, FocusState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const STOPWATCH_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSnapshot {
    pub running: bool,
    pub focus_ratio: u8,
    pub running_average: u8,
    pub elapsed_secs: u64,
    pub buckets: usize,
}

struct MonitorInner {
    state: FocusState,
    scheduler: Scheduler,
    lease: Option<GazeLease>,
}

/// Turns the live gaze stream into a focus score.
///
/// Cheap to clone; clones share one session. The session's timers and gaze
/// listener only hold weak references, so dropping the last clone cancels the
/// timers and releases the gaze stream.
#[derive(Clone)]
pub struct FocusMonitor {
    shared: Arc<Mutex<MonitorInner>>,
    device: Option<GazeDevice>,
    config: FocusConfig,
    sink: SharedSink,
}

impl FocusMonitor {
    /// `device` is `None` when no gaze tracker exists at all; such a monitor
    /// never starts.
    pub fn new(config: FocusConfig, device: Option<GazeDevice>, sink: SharedSink) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MonitorInner {
                state: FocusState::new(),
                scheduler: Scheduler::new(),
                lease: None,
            })),
            device,
            config,
            sink,
        }
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared).state.running
    }

    /// Starts a monitoring session. Returns false, doing nothing, when a
    /// session is already running, the gaze device is missing or leased
    /// elsewhere, or there is no tokio runtime to drive the timers.
    pub fn start(&self) -> bool {
        if self.is_running() {
            return false;
        }
        let Some(device) = &self.device else {
            log_warn!("focus monitor has no gaze device; not starting");
            return false;
        };
        if Handle::try_current().is_err() {
            log_warn!("focus monitor needs a tokio runtime; not starting");
            return false;
        }
        let Some(lease) = device.acquire() else {
            return false;
        };

        let mut inner = lock(&self.shared);
        if inner.state.running {
            drop(inner);
            drop(lease);
            return false;
        }

        let epoch = inner.state.begin(Utc::now());
        lease.listen(self.sample_listener(lease.stream(), epoch));
        inner.lease = Some(lease);

        inner.scheduler.cancel_all();
        let period = Duration::from_millis(self.config.interval_ms.max(1));
        inner
            .scheduler
            .every(period, bucket_tick(Arc::downgrade(&self.shared), self.sink.clone(), epoch));
        inner
            .scheduler
            .every(STOPWATCH_PERIOD, stopwatch_tick(Arc::downgrade(&self.shared), epoch));

        log_info!(
            "focus monitoring started (bucket {}ms, epoch {})",
            self.config.interval_ms,
            epoch
        );
        true
    }

    /// Ends the session and returns the average focus over all closed buckets,
    /// or `None` when no session was running.
    pub fn stop(&self) -> Option<u8> {
        let mut outbox = Outbox::new();
        let (average, lease) = {
            let mut inner = lock(&self.shared);
            if !inner.state.running {
                return None;
            }
            let average = inner.state.finish();
            inner.scheduler.cancel_all();
            outbox.event(AssessmentEvent::FocusStopped { average });
            (average, inner.lease.take())
        };

        // Released outside the lock: the stream may be delivering a sample
        // that is waiting for it.
        drop(lease);

        log_info!(
            "focus monitoring stopped after {}s, average {}%",
            self.snapshot().elapsed_secs,
            average
        );
        outbox.deliver(self.sink.as_ref());
        Some(average)
    }

    pub fn snapshot(&self) -> FocusSnapshot {
        let inner = lock(&self.shared);
        FocusSnapshot {
            running: inner.state.running,
            focus_ratio: inner.state.current_ratio(),
            running_average: inner.state.running_average(),
            elapsed_secs: inner.state.stopwatch.elapsed_secs,
            buckets: inner.state.history().len(),
        }
    }

    pub fn history(&self) -> Vec<BucketMetric> {
        lock(&self.shared).state.history().to_vec()
    }

    fn sample_listener(&self, stream: &Arc<dyn GazeStream>, epoch: u64) -> GazeListener {
        let shared = Arc::downgrade(&self.shared);
        let stream = Arc::downgrade(stream);
        let fraction = self.config.region_fraction;

        Box::new(move |sample| {
            let (Some(shared), Some(stream)) = (shared.upgrade(), stream.upgrade()) else {
                return;
            };
            let hit = AttentionRegion::centered(stream.viewport(), fraction).contains(sample);

            let mut inner = lock(&shared);
            if inner.state.running && inner.state.epoch == epoch {
                inner.state.record_sample(hit);
            }
        })
    }
}

fn bucket_tick(
    shared: Weak<Mutex<MonitorInner>>,
    sink: SharedSink,
    epoch: u64,
) -> impl FnMut() -> ControlFlow<()> + Send + 'static {
    move || {
        let Some(shared) = shared.upgrade() else {
            return ControlFlow::Break(());
        };

        let mut outbox = Outbox::new();
        {
            let mut inner = lock(&shared);
            if !inner.state.running || inner.state.epoch != epoch {
                return ControlFlow::Break(());
            }
            let bucket = inner.state.close_bucket();
            let running_average = inner.state.running_average();
            let elapsed_secs = inner.state.stopwatch.elapsed_secs;
            log_debug!(
                "bucket closed: {}/{} hits, ratio {}%, average {}%",
                bucket.hits,
                bucket.total,
                bucket.focus_ratio,
                running_average
            );
            outbox.event(AssessmentEvent::FocusTick {
                focus_ratio: bucket.focus_ratio,
                running_average,
                elapsed_secs,
            });
        }
        outbox.deliver(sink.as_ref());
        ControlFlow::Continue(())
    }
}

fn stopwatch_tick(
    shared: Weak<Mutex<MonitorInner>>,
    epoch: u64,
) -> impl FnMut() -> ControlFlow<()> + Send + 'static {
    move || {
        let Some(shared) = shared.upgrade() else {
            return ControlFlow::Break(());
        };
        let mut inner = lock(&shared);
        if !inner.state.running || inner.state.epoch != epoch {
            return ControlFlow::Break(());
        }
        inner.state.stopwatch.tick();
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{noop_sink, FnSink};
    use crate::gaze::{PushGaze, Viewport};
    use tokio::time;

    const CENTER: (f64, f64) = (500.0, 500.0);
    const CORNER: (f64, f64) = (10.0, 10.0);

    fn monitor_with(stream: Arc<PushGaze>, sink: SharedSink) -> FocusMonitor {
        FocusMonitor::new(
            FocusConfig::default(),
            Some(GazeDevice::new(stream)),
            sink,
        )
    }

    fn push_bucket(stream: &PushGaze, hits: usize, total: usize) {
        for i in 0..total {
            let (x, y) = if i < hits { CENTER } else { CORNER };
            stream.push(x, y);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn averages_bucket_ratios() {
        let stream = Arc::new(PushGaze::new(Viewport::new(1000.0, 1000.0)));
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let seen = ticks.clone();
        let sink: SharedSink = Arc::new(FnSink(move |event| {
            if let AssessmentEvent::FocusTick {
                focus_ratio,
                running_average,
                ..
            } = event
            {
                seen.lock().unwrap().push((focus_ratio, running_average));
            }
        }));
        let monitor = monitor_with(stream.clone(), sink);
        assert!(monitor.start());

        // Samples at t=0, 1.5s, 2.5s land in buckets closing at 1s, 2s, 3s.
        push_bucket(&stream, 8, 10);
        time::sleep(Duration::from_millis(1500)).await;
        push_bucket(&stream, 6, 10);
        time::sleep(Duration::from_millis(1000)).await;
        push_bucket(&stream, 10, 10);
        time::sleep(Duration::from_millis(1000)).await;

        assert_eq!(
            ticks.lock().unwrap().as_slice(),
            [(80, 80), (60, 70), (100, 80)]
        );
        assert_eq!(monitor.stop(), Some(80));
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_is_zero() {
        let stream = Arc::new(PushGaze::new(Viewport::new(1000.0, 1000.0)));
        let monitor = monitor_with(stream.clone(), noop_sink());
        assert!(monitor.start());
        push_bucket(&stream, 5, 5);
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(monitor.stop(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_and_double_stop_are_noops() {
        let stream = Arc::new(PushGaze::new(Viewport::default()));
        let monitor = monitor_with(stream.clone(), noop_sink());

        assert_eq!(monitor.stop(), None);
        assert!(monitor.start());
        assert!(!monitor.start());
        assert_eq!(stream.begin_count(), 1);

        assert!(monitor.stop().is_some());
        assert_eq!(monitor.stop(), None);
        assert_eq!(stream.end_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_stream_and_ignores_late_samples() {
        let stream = Arc::new(PushGaze::new(Viewport::new(1000.0, 1000.0)));
        let monitor = monitor_with(stream.clone(), noop_sink());
        monitor.start();
        time::sleep(Duration::from_millis(1500)).await;
        monitor.stop();

        assert!(!stream.has_listener());
        assert!(!stream.push(CENTER.0, CENTER.1));

        time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(monitor.snapshot().buckets, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_device_gives_flat_zero() {
        let stream = Arc::new(PushGaze::failing(Viewport::default()));
        let monitor = monitor_with(stream.clone(), noop_sink());

        assert!(monitor.start());
        assert!(!stream.push(CENTER.0, CENTER.1));
        time::sleep(Duration::from_millis(2500)).await;

        assert!(monitor.history().iter().all(|b| b.focus_ratio == 0));
        assert_eq!(monitor.stop(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_device_never_starts() {
        let monitor = FocusMonitor::new(FocusConfig::default(), None, noop_sink());
        assert!(!monitor.start());
        assert_eq!(monitor.stop(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn second_monitor_on_same_device_cannot_start() {
        let stream = Arc::new(PushGaze::new(Viewport::default()));
        let device = GazeDevice::new(stream.clone());
        let first = FocusMonitor::new(FocusConfig::default(), Some(device.clone()), noop_sink());
        let second = FocusMonitor::new(FocusConfig::default(), Some(device), noop_sink());

        assert!(first.start());
        assert!(!second.start());
        first.stop();
        assert!(second.start());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_seconds_count_while_running() {
        let stream = Arc::new(PushGaze::new(Viewport::default()));
        let monitor = monitor_with(stream, noop_sink());
        monitor.start();
        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(monitor.snapshot().elapsed_secs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_monitor_releases_device() {
        let stream = Arc::new(PushGaze::new(Viewport::default()));
        let device = GazeDevice::new(stream.clone());
        {
            let monitor =
                FocusMonitor::new(FocusConfig::default(), Some(device.clone()), noop_sink());
            monitor.start();
            time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!device.is_leased());
        assert_eq!(stream.end_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_clears_history() {
        let stream = Arc::new(PushGaze::new(Viewport::new(1000.0, 1000.0)));
        let monitor = monitor_with(stream.clone(), noop_sink());
        monitor.start();
        push_bucket(&stream, 1, 1);
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(monitor.stop(), Some(100));

        monitor.start();
        assert_eq!(monitor.snapshot().buckets, 0);
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(monitor.stop(), Some(0));
    }
}
