pub mod config;
pub mod monitor;
pub mod state;

pub use config::FocusConfig;
pub use monitor::{FocusMonitor, FocusSnapshot};
pub use state::{BucketMetric, FocusState};
