use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Whole-second wall clock shown next to the focus readout. It carries no
/// scoring weight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stopwatch {
    pub status: TimerStatus,
    pub elapsed_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, start_at: DateTime<Utc>) {
        *self = Self {
            status: TimerStatus::Running,
            elapsed_secs: 0,
            started_at: Some(start_at),
        };
    }

    /// Advances one second while running and returns the new count.
    pub fn tick(&mut self) -> u64 {
        if self.status == TimerStatus::Running {
            self.elapsed_secs = self.elapsed_secs.saturating_add(1);
        }
        self.elapsed_secs
    }

    pub fn stop(&mut self) {
        if self.status == TimerStatus::Running {
            self.status = TimerStatus::Stopped;
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }
}
