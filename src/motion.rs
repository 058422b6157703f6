use crate::pendulum::DoublePendulum;
use pendulum_common::SimParams;

/// Fixed time increment applied by every tick.
pub const TIME_STEP: f64 = 0.05;

/// Angular accelerations of both arms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accelerations {
    pub arm1: f64,
    pub arm2: f64,
}

/// Evaluates the coupled equations of motion of a frictionless double pendulum.
///
/// Reads the whole state before anything is written, so both accelerations are
/// consistent with the same instant. The shared denominator is at least `2 * m1`,
/// which is positive for any pendulum built through [`crate::pendulum::Arm::new`].
/// A zero-length arm (zero-area viewport) has no dynamics and gets zero acceleration.
#[inline(always)]
pub fn angular_accelerations(p: &DoublePendulum, gravity: f64) -> Accelerations {
    let (t1, w1, m1, l1) = (p.arm1.angle, p.arm1.angular_velocity, p.arm1.mass(), p.arm1.length());
    let (t2, w2, m2, l2) = (p.arm2.angle, p.arm2.angular_velocity, p.arm2.mass(), p.arm2.length());
    if l1 == 0.0 || l2 == 0.0 {
        return Accelerations { arm1: 0.0, arm2: 0.0 };
    }
    let g = gravity;

    let delta = t1 - t2;
    let (sin_d, cos_d) = delta.sin_cos();
    let den = 2.0 * m1 + m2 - m2 * (2.0 * t1 - 2.0 * t2).cos();

    let a1 = (-g * (2.0 * m1 + m2) * t1.sin()
        - m2 * g * (t1 - 2.0 * t2).sin()
        - 2.0 * sin_d * m2 * (w2 * w2 * l2 + w1 * w1 * l1 * cos_d))
        / (l1 * den);

    let a2 = (2.0 * sin_d
        * (w1 * w1 * l1 * (m1 + m2) + g * (m1 + m2) * t1.cos() + w2 * w2 * l2 * m2 * cos_d))
        / (l2 * den);

    Accelerations { arm1: a1, arm2: a2 }
}

/// Semi-implicit Euler step. The speed multiplier scales only the velocity increment;
/// the angle advances by the updated velocity times the unscaled `dt`.
#[inline(always)]
pub fn integrate(p: &mut DoublePendulum, acc: Accelerations, dt: f64, speed_multiplier: f64) {
    p.arm1.angular_velocity += acc.arm1 * dt * speed_multiplier;
    p.arm2.angular_velocity += acc.arm2 * dt * speed_multiplier;

    p.arm1.angle += p.arm1.angular_velocity * dt;
    p.arm2.angle += p.arm2.angular_velocity * dt;
}

/// Advances one pendulum by one tick.
pub fn step(p: &mut DoublePendulum, params: &SimParams) {
    let acc = angular_accelerations(p, params.gravity);
    integrate(p, acc, TIME_STEP, params.speed_multiplier);
}
