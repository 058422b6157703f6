use serde::{Serialize, Deserialize};
use crate::sim_params::SimParams;
use crate::vecmath::Vec2;

/// Size of the host drawing surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Viewport { width, height }
    }
}

/// The centered square that holds the pendulum grid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SquareRegion {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

/// Joint positions of one double pendulum: suspension point, joint between the arms, free end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendulumPose {
    pub origin: Vec2,
    pub elbow: Vec2,
    pub tip: Vec2,
}

/// Everything the renderer needs to draw one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Number of ticks applied since the last configure.
    pub frame: u64,
    /// Simulated time since the last configure (`frame * dt`).
    pub time: f64,
    pub viewport: Viewport,
    pub square: SquareRegion,
    /// Parameters in effect when the snapshot was taken.
    pub params: SimParams,
    /// One pose per pendulum, in grid cell order.
    pub poses: Vec<PendulumPose>,
}
