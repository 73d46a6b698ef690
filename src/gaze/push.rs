use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{bail, Result};

use super::device::{GazeListener, GazeStream};
use super::region::{GazeSample, Viewport};
use crate::utils::lock;

type SharedListener = Arc<dyn Fn(GazeSample) + Send + Sync>;

/// Gaze stream fed by the host: every `push` is one sample. Useful when the
/// tracker lives in another process and samples arrive over IPC.
pub struct PushGaze {
    listener: Mutex<Option<SharedListener>>,
    viewport: Mutex<Viewport>,
    fail_on_begin: bool,
    begins: AtomicUsize,
    ends: AtomicUsize,
}

impl PushGaze {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            listener: Mutex::new(None),
            viewport: Mutex::new(viewport),
            fail_on_begin: false,
            begins: AtomicUsize::new(0),
            ends: AtomicUsize::new(0),
        }
    }

    /// A stream whose `begin` always fails, as when no camera is attached.
    pub fn failing(viewport: Viewport) -> Self {
        Self {
            fail_on_begin: true,
            ..Self::new(viewport)
        }
    }

    /// Delivers one sample. Returns false when nobody is listening.
    pub fn push(&self, x: f64, y: f64) -> bool {
        let listener = lock(&self.listener).clone();
        match listener {
            Some(listener) => {
                listener(GazeSample::new(x, y));
                true
            }
            None => false,
        }
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *lock(&self.viewport) = viewport;
    }

    pub fn has_listener(&self) -> bool {
        lock(&self.listener).is_some()
    }

    pub fn begin_count(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn end_count(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

impl GazeStream for PushGaze {
    fn begin(&self) -> Result<()> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_begin {
            bail!("no camera available");
        }
        Ok(())
    }

    fn end(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }

    fn set_gaze_listener(&self, listener: GazeListener) {
        *lock(&self.listener) = Some(Arc::from(listener));
    }

    fn clear_gaze_listener(&self) {
        lock(&self.listener).take();
    }

    fn viewport(&self) -> Viewport {
        *lock(&self.viewport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_without_listener_is_dropped() {
        let stream = PushGaze::new(Viewport::default());
        assert!(!stream.push(1.0, 2.0));
    }

    #[test]
    fn push_reaches_listener() {
        let stream = PushGaze::new(Viewport::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        stream.set_gaze_listener(Box::new(move |sample| sink.lock().unwrap().push(sample)));

        assert!(stream.push(3.0, 4.0));
        assert_eq!(seen.lock().unwrap().as_slice(), [GazeSample::new(3.0, 4.0)]);

        stream.clear_gaze_listener();
        assert!(!stream.push(5.0, 6.0));
    }
}
