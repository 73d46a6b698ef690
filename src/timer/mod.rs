pub mod scheduler;
pub mod state;

pub use scheduler::{Scheduler, TimerHandle};
pub use state::{Stopwatch, TimerStatus};
