use std::future::Future;
use std::ops::ControlFlow;

use tokio::{
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// A group of timers owned by one component and cancelled as a unit.
///
/// Every timer runs as a tokio task racing its deadline against the group's
/// cancellation token. `cancel_all` fires the token, aborts the tasks and arms
/// a fresh token for whatever the component schedules next. Callbacks must
/// still check their own epoch: a task that already passed its deadline can be
/// waiting on the component lock while the group is cancelled.
pub struct Scheduler {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Cancels a single one-shot timer without touching the rest of the group.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Runs `tick` every `period`, first one period from now, until it
    /// returns `ControlFlow::Break` or the group is cancelled.
    pub fn every<F>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let token = self.token.clone();
        self.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if tick().is_break() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Runs `fire` once after `delay` unless the returned handle or the group
    /// is cancelled first.
    pub fn after<F>(&mut self, delay: Duration, fire: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.token.child_token();
        let task_token = token.clone();
        self.spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {}
                _ = time::sleep(delay) => fire(),
            }
        });
        TimerHandle { token }
    }

    pub fn cancel_all(&mut self) {
        self.token.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.token = CancellationToken::new();
    }

    /// Number of timers that have not finished yet.
    pub fn pending(&mut self) -> usize {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.len()
    }

    fn spawn<Fut>(&mut self, future: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(future));
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
