use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::device::{GazeListener, GazeStream};
use super::region::{GazeSample, Viewport};
use crate::utils::lock;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::log_debug;

type SharedListener = Arc<dyn Fn(GazeSample) + Send + Sync>;

/// Synthetic gaze source for headless runs. Each sample lands near the screen
/// center with probability `focus_probability`, anywhere on screen otherwise.
pub struct SimulatedGaze {
    viewport: Viewport,
    sample_interval: Duration,
    focus_probability: f64,
    listener: Arc<Mutex<Option<SharedListener>>>,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SimulatedGaze {
    pub fn new(viewport: Viewport, sample_rate_hz: u32, focus_probability: f64) -> Self {
        let rate = sample_rate_hz.max(1);
        Self {
            viewport,
            sample_interval: Duration::from_micros(1_000_000 / u64::from(rate)),
            focus_probability: focus_probability.clamp(0.0, 1.0),
            listener: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
        }
    }

    fn draw(rng: &mut StdRng, viewport: Viewport, focus_probability: f64) -> GazeSample {
        if rng.gen_bool(focus_probability) {
            let (cx, cy) = viewport.center();
            let dx = rng.gen_range(-0.2..=0.2) * viewport.width;
            let dy = rng.gen_range(-0.2..=0.2) * viewport.height;
            GazeSample::new(cx + dx, cy + dy)
        } else {
            GazeSample::new(
                rng.gen_range(0.0..=viewport.width),
                rng.gen_range(0.0..=viewport.height),
            )
        }
    }
}

impl GazeStream for SimulatedGaze {
    fn begin(&self) -> Result<()> {
        let Ok(runtime) = Handle::try_current() else {
            bail!("simulated gaze needs a tokio runtime");
        };

        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let listener = self.listener.clone();
        let viewport = self.viewport;
        let focus_probability = self.focus_probability;
        let sample_interval = self.sample_interval;

        let handle = runtime.spawn(async move {
            let mut ticker = time::interval(sample_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut rng = StdRng::from_entropy();
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = lock(&listener).clone();
                        if let Some(current) = current {
                            let sample = SimulatedGaze::draw(&mut rng, viewport, focus_probability);
                            log_debug!("simulated gaze sample ({:.0}, {:.0})", sample.x, sample.y);
                            current(sample);
                        }
                    }
                }
            }
        });

        *worker = Some((token, handle));
        Ok(())
    }

    fn end(&self) {
        if let Some((token, handle)) = lock(&self.worker).take() {
            token.cancel();
            handle.abort();
        }
    }

    fn set_gaze_listener(&self, listener: GazeListener) {
        *lock(&self.listener) = Some(Arc::from(listener));
    }

    fn clear_gaze_listener(&self) {
        lock(&self.listener).take();
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

impl Drop for SimulatedGaze {
    fn drop(&mut self) {
        self.end();
    }
}
