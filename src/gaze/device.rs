use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use log::{info, warn};

use super::region::{GazeSample, Viewport};

pub type GazeListener = Box<dyn Fn(GazeSample) + Send + Sync>;

/// The external gaze-coordinate source (camera tracker, replay file, ...).
pub trait GazeStream: Send + Sync {
    /// Powers up the tracker. Called once per lease.
    fn begin(&self) -> Result<()>;
    /// Releases whatever `begin` acquired.
    fn end(&self);
    fn set_gaze_listener(&self, listener: GazeListener);
    fn clear_gaze_listener(&self);
    /// Current screen size, read for every sample.
    fn viewport(&self) -> Viewport;
}

/// Handle to the process-wide gaze stream. Only one lease may be alive at a
/// time.
#[derive(Clone)]
pub struct GazeDevice {
    stream: Arc<dyn GazeStream>,
    leased: Arc<AtomicBool>,
}

impl GazeDevice {
    pub fn new(stream: Arc<dyn GazeStream>) -> Self {
        Self {
            stream,
            leased: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_leased(&self) -> bool {
        self.leased.load(Ordering::SeqCst)
    }

    /// Takes exclusive use of the stream and starts it. Returns `None` while
    /// another lease is alive. A stream that fails to start still yields a
    /// lease, but one that never delivers samples.
    pub fn acquire(&self) -> Option<GazeLease> {
        if self
            .leased
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("gaze stream already in use; ignoring second subscriber");
            return None;
        }

        let started = match self.stream.begin() {
            Ok(()) => {
                info!("gaze stream started");
                true
            }
            Err(err) => {
                warn!("gaze stream failed to initialize: {err:#}");
                false
            }
        };

        Some(GazeLease {
            stream: self.stream.clone(),
            leased: self.leased.clone(),
            started,
        })
    }
}

/// Exclusive use of the gaze stream. Dropping it detaches the listener, ends
/// the stream and frees the device for the next session.
pub struct GazeLease {
    stream: Arc<dyn GazeStream>,
    leased: Arc<AtomicBool>,
    started: bool,
}

impl GazeLease {
    /// Whether the stream came up; a dead lease never delivers samples.
    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn stream(&self) -> &Arc<dyn GazeStream> {
        &self.stream
    }

    pub fn listen(&self, listener: GazeListener) {
        if self.started {
            self.stream.set_gaze_listener(listener);
        }
    }
}

impl Drop for GazeLease {
    fn drop(&mut self) {
        if self.started {
            self.stream.clear_gaze_listener();
            self.stream.end();
            info!("gaze stream released");
        }
        self.leased.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaze::PushGaze;

    #[test]
    fn second_lease_is_refused_until_first_drops() {
        let stream = Arc::new(PushGaze::new(Viewport::default()));
        let device = GazeDevice::new(stream.clone());

        let first = device.acquire().expect("first lease");
        assert!(device.is_leased());
        assert!(device.acquire().is_none());

        drop(first);
        assert!(!device.is_leased());
        assert!(device.acquire().is_some());
    }

    #[test]
    fn dropping_lease_detaches_and_ends_stream() {
        let stream = Arc::new(PushGaze::new(Viewport::default()));
        let device = GazeDevice::new(stream.clone());

        {
            let lease = device.acquire().expect("lease");
            lease.listen(Box::new(|_| {}));
            assert!(stream.has_listener());
            assert_eq!(stream.begin_count(), 1);
        }

        assert!(!stream.has_listener());
        assert_eq!(stream.end_count(), 1);
    }

    #[test]
    fn failed_begin_yields_silent_lease() {
        let stream = Arc::new(PushGaze::failing(Viewport::default()));
        let device = GazeDevice::new(stream.clone());

        let lease = device.acquire().expect("lease");
        assert!(!lease.is_started());
        lease.listen(Box::new(|_| {}));
        assert!(!stream.has_listener());

        drop(lease);
        assert_eq!(stream.end_count(), 0);
        assert!(!device.is_leased());
    }
}
