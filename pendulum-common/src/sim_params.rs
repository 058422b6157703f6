use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounds, slider step and default of one tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    /// Slider increment. Must be the reciprocal of a whole number (0.1, 0.25, ...).
    pub step: f64,
    pub default: f64,
}

pub const GRAVITY_RANGE: ParameterRange = ParameterRange {
    name: "gravity",
    min: 0.1,
    max: 5.0,
    step: 0.1,
    default: 1.0,
};

pub const LENGTH_MULTIPLIER_RANGE: ParameterRange = ParameterRange {
    name: "length_multiplier",
    min: 0.5,
    max: 2.0,
    step: 0.1,
    default: 0.7,
};

pub const SPEED_MULTIPLIER_RANGE: ParameterRange = ParameterRange {
    name: "speed_multiplier",
    min: 0.1,
    max: 3.0,
    step: 0.1,
    default: 1.0,
};

impl ParameterRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Rounds `value` to the nearest slider step, then clamps it into `[min, max]`.
    pub fn snap(&self, value: f64) -> f64 {
        let steps_per_unit = (1.0 / self.step).round();
        let snapped = (value * steps_per_unit).round() / steps_per_unit;
        snapped.clamp(self.min, self.max)
    }
}

/// Global physical parameters, applied uniformly to every pendulum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    pub gravity: f64,
    pub length_multiplier: f64,
    pub speed_multiplier: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            gravity: GRAVITY_RANGE.default,
            length_multiplier: LENGTH_MULTIPLIER_RANGE.default,
            speed_multiplier: SPEED_MULTIPLIER_RANGE.default,
        }
    }
}

impl SimParams {
    pub fn new(gravity: f64, length_multiplier: f64, speed_multiplier: f64) -> Self {
        SimParams { gravity, length_multiplier, speed_multiplier }
    }

    /// Snaps every parameter onto its slider grid and range.
    /// Returns the snapped parameters and the names of those that changed.
    pub fn snapped(&self) -> (SimParams, Vec<&'static str>) {
        let mut adjusted = Vec::new();
        let mut snap = |range: &ParameterRange, value: f64| {
            let s = range.snap(value);
            if (s - value).abs() > 1e-9 {
                adjusted.push(range.name);
            }
            s
        };
        let params = SimParams {
            gravity: snap(&GRAVITY_RANGE, self.gravity),
            length_multiplier: snap(&LENGTH_MULTIPLIER_RANGE, self.length_multiplier),
            speed_multiplier: snap(&SPEED_MULTIPLIER_RANGE, self.speed_multiplier),
        };
        (params, adjusted)
    }

    pub fn is_finite(&self) -> bool {
        self.gravity.is_finite() && self.length_multiplier.is_finite() && self.speed_multiplier.is_finite()
    }
}

// Matches the one-decimal slider labels.
impl fmt::Display for SimParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gravity {:.1} | length x{:.1} | speed x{:.1}",
            self.gravity, self.length_multiplier, self.speed_multiplier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_slider_defaults() {
        let p = SimParams::default();
        assert_eq!(p.gravity, 1.0);
        assert_eq!(p.length_multiplier, 0.7);
        assert_eq!(p.speed_multiplier, 1.0);
        assert!(GRAVITY_RANGE.contains(p.gravity));
        assert!(LENGTH_MULTIPLIER_RANGE.contains(p.length_multiplier));
        assert!(SPEED_MULTIPLIER_RANGE.contains(p.speed_multiplier));
    }

    #[test]
    fn snap_rounds_to_step_and_clamps() {
        assert_eq!(GRAVITY_RANGE.snap(2.34), 2.3);
        assert_eq!(GRAVITY_RANGE.snap(9.0), 5.0);
        assert_eq!(GRAVITY_RANGE.snap(0.0), 0.1);
        assert_eq!(LENGTH_MULTIPLIER_RANGE.snap(0.7), 0.7);
        assert_eq!(SPEED_MULTIPLIER_RANGE.snap(-3.0), 0.1);
    }

    #[test]
    fn snapped_reports_adjusted_names() {
        let (p, adjusted) = SimParams::new(7.0, 0.7, 1.0).snapped();
        assert_eq!(p.gravity, 5.0);
        assert_eq!(adjusted, vec!["gravity"]);

        let (_, none) = SimParams::default().snapped();
        assert!(none.is_empty());
    }

    #[test]
    fn display_uses_one_decimal() {
        let s = SimParams::new(1.24, 0.7, 3.0).to_string();
        assert_eq!(s, "gravity 1.2 | length x0.7 | speed x3.0");
    }
}
