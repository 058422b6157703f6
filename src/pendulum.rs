use anyhow::Result;
use pendulum_common::{PendulumPose, SimParams, Vec2};
use rand::distr::Uniform;
use rand::Rng;
use std::f64::consts::FRAC_PI_2;

/// Arms never exceed this fraction of their grid cell, whatever the length multiplier.
pub const MAX_ARM_FRACTION_OF_CELL: f64 = 0.4;
/// Base length range of the upper arm, before the length multiplier.
pub const ARM1_BASE_LENGTH: (f64, f64) = (10.0, 14.0);
/// Base length range of the lower arm, before the length multiplier.
pub const ARM2_BASE_LENGTH: (f64, f64) = (20.0, 25.0);
pub const MASS_RANGE: (f64, f64) = (0.5, 2.0);
/// Both arms start horizontal, pointing right.
pub const INITIAL_ANGLE: f64 = FRAC_PI_2;

/// One rigid link of a double pendulum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arm {
    length: f64,
    mass: f64,
    /// Radians from the downward vertical. Never wrapped.
    pub angle: f64,
    pub angular_velocity: f64,
}

impl Arm {
    /// Creates an arm at rest. Fails on a non-positive mass or a negative length,
    /// both of which would break the equations of motion.
    pub fn new(length: f64, mass: f64, angle: f64) -> Result<Self> {
        anyhow::ensure!(
            mass.is_finite() && mass > 0.0,
            "arm mass must be positive and finite (got {})",
            mass
        );
        anyhow::ensure!(
            length.is_finite() && length >= 0.0,
            "arm length must be non-negative and finite (got {})",
            length
        );
        Ok(Arm { length, mass, angle, angular_velocity: 0.0 })
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }
}

/// Two arms, the second hanging from the tip of the first, suspended at a fixed origin.
#[derive(Debug, Clone, PartialEq)]
pub struct DoublePendulum {
    pub arm1: Arm,
    pub arm2: Arm,
    origin: Vec2,
}

impl DoublePendulum {
    pub fn new(origin: Vec2, arm1: Arm, arm2: Arm) -> Self {
        DoublePendulum { arm1, arm2, origin }
    }

    /// Draws arm lengths and masses for a pendulum hanging in a cell of `cell_size`.
    /// Lengths are scaled by the length multiplier first, then capped to 40% of the cell.
    pub fn random<R: Rng>(
        origin: Vec2,
        cell_size: f64,
        params: &SimParams,
        rng: &mut R,
    ) -> Result<Self> {
        let cap = cell_size * MAX_ARM_FRACTION_OF_CELL;
        let arm1_len = Uniform::new(ARM1_BASE_LENGTH.0, ARM1_BASE_LENGTH.1)?;
        let arm2_len = Uniform::new(ARM2_BASE_LENGTH.0, ARM2_BASE_LENGTH.1)?;
        let mass = Uniform::new(MASS_RANGE.0, MASS_RANGE.1)?;

        let arm1 = Arm::new(
            cap.min(rng.sample(&arm1_len) * params.length_multiplier),
            rng.sample(&mass),
            INITIAL_ANGLE,
        )?;
        let arm2 = Arm::new(
            cap.min(rng.sample(&arm2_len) * params.length_multiplier),
            rng.sample(&mass),
            INITIAL_ANGLE,
        )?;
        Ok(DoublePendulum::new(origin, arm1, arm2))
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Forward kinematics: positions of the joint between the arms and of the free end.
    pub fn pose(&self) -> PendulumPose {
        let elbow = self.origin + Vec2::from_polar_down(self.arm1.length, self.arm1.angle);
        let tip = elbow + Vec2::from_polar_down(self.arm2.length, self.arm2.angle);
        PendulumPose { origin: self.origin, elbow, tip }
    }

    /// True while every angle and angular velocity is a finite number.
    pub fn is_finite(&self) -> bool {
        self.arm1.angle.is_finite()
            && self.arm1.angular_velocity.is_finite()
            && self.arm2.angle.is_finite()
            && self.arm2.angular_velocity.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn arm_rejects_invalid_mass() {
        assert!(Arm::new(10.0, 0.0, 0.0).is_err());
        assert!(Arm::new(10.0, -1.0, 0.0).is_err());
        assert!(Arm::new(10.0, f64::NAN, 0.0).is_err());
        assert!(Arm::new(-1.0, 1.0, 0.0).is_err());
        assert!(Arm::new(0.0, 1.0, 0.0).is_ok());
    }

    #[test]
    fn pose_at_zero_angles_hangs_straight_down() {
        let origin = Vec2::new(50.0, 20.0);
        let p = DoublePendulum::new(
            origin,
            Arm::new(10.0, 1.0, 0.0).unwrap(),
            Arm::new(15.0, 1.0, 0.0).unwrap(),
        );
        let pose = p.pose();
        assert_eq!(pose.origin, origin);
        assert!((pose.elbow.x - 50.0).abs() < 1e-12);
        assert!((pose.elbow.y - 30.0).abs() < 1e-12);
        assert!((pose.tip.x - 50.0).abs() < 1e-12);
        assert!((pose.tip.y - 45.0).abs() < 1e-12);
    }

    #[test]
    fn random_pendulum_starts_horizontal_at_rest() {
        let mut rng = StdRng::seed_from_u64(7);
        let p = DoublePendulum::random(Vec2::new(0.0, 0.0), 70.0, &SimParams::default(), &mut rng).unwrap();
        for arm in [p.arm1, p.arm2] {
            assert_eq!(arm.angle, INITIAL_ANGLE);
            assert_eq!(arm.angular_velocity, 0.0);
            assert!(arm.mass() >= MASS_RANGE.0 && arm.mass() < MASS_RANGE.1);
        }
        // Default multiplier and a 70px cell leave lengths uncapped.
        assert!(p.arm1.length() >= 7.0 && p.arm1.length() < 9.8 + 1e-12);
        assert!(p.arm2.length() >= 14.0 && p.arm2.length() < 17.5 + 1e-12);
    }

    #[test]
    fn lengths_never_exceed_cell_cap() {
        let mut rng = StdRng::seed_from_u64(11);
        for &cell in &[0.0, 5.0, 30.0, 70.0, 500.0] {
            for &mult in &[0.5, 0.7, 1.3, 2.0, 10.0] {
                let params = SimParams::new(1.0, mult, 1.0);
                for _ in 0..20 {
                    let p = DoublePendulum::random(Vec2::zero(), cell, &params, &mut rng).unwrap();
                    assert!(p.arm1.length() <= cell * MAX_ARM_FRACTION_OF_CELL);
                    assert!(p.arm2.length() <= cell * MAX_ARM_FRACTION_OF_CELL);
                }
            }
        }
    }

    #[test]
    fn non_finite_state_is_detected() {
        let mut p = DoublePendulum::new(
            Vec2::zero(),
            Arm::new(1.0, 1.0, 0.0).unwrap(),
            Arm::new(1.0, 1.0, 0.0).unwrap(),
        );
        assert!(p.is_finite());
        p.arm2.angular_velocity = f64::INFINITY;
        assert!(!p.is_finite());
    }
}
