pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, ViewportConfig, ParametersConfig, TimingConfig, InitialConditions, OutputConfig, OutputFormat, ChangeEvent};
pub use sim_params::{SimParams, ParameterRange, GRAVITY_RANGE, LENGTH_MULTIPLIER_RANGE, SPEED_MULTIPLIER_RANGE};
pub use snapshot::{FrameSnapshot, PendulumPose, SquareRegion, Viewport};
pub use vecmath::Vec2;
