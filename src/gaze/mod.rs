pub mod device;
pub mod push;
pub mod region;
pub mod simulated;

pub use device::{GazeDevice, GazeLease, GazeListener, GazeStream};
pub use push::PushGaze;
pub use region::{AttentionRegion, GazeSample, Viewport};
pub use simulated::SimulatedGaze;
