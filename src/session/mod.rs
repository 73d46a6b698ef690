mod models;
mod stepper;

pub use models::{SessionRecord, SessionResult};
pub use stepper::Stepper;
