use crate::grid::{compute_layout, GridLayout};
use crate::motion::{self, TIME_STEP};
use crate::pendulum::DoublePendulum;
use crate::scheduler::{CancellationToken, FrameRequest, FrameScheduler};
use anyhow::Result;
use log::{debug, info, trace};
use pendulum_common::{FrameSnapshot, SimParams, Viewport};
use rand::rngs::StdRng;

/// Number of pendulums in the grid.
pub const POPULATION_SIZE: usize = 81;

/// Owns the pendulum population and drives it frame by frame.
///
/// The population is empty until the first [`configure`](Self::configure).
pub struct SimulationDriver<S: FrameScheduler> {
    scheduler: S,
    token: CancellationToken,
    /// The next frame, requested at the end of the previous one.
    pending_frame: Option<FrameRequest>,
    /// RNG for arm lengths and masses. Advances on every configure.
    rng: StdRng,
    population_size: usize,
    params: SimParams,
    viewport: Viewport,
    layout: GridLayout,
    pendulums: Vec<DoublePendulum>,
    /// Ticks applied since the last configure.
    frame: u64,
}

impl<S: FrameScheduler> SimulationDriver<S> {
    pub fn new(scheduler: S, rng: StdRng) -> Self {
        Self::with_population(scheduler, rng, POPULATION_SIZE)
    }

    pub fn with_population(scheduler: S, rng: StdRng, population_size: usize) -> Self {
        let viewport = Viewport::default();
        SimulationDriver {
            scheduler,
            token: CancellationToken::new(),
            pending_frame: None,
            rng,
            population_size,
            params: SimParams::default(),
            viewport,
            layout: compute_layout(0, viewport),
            pendulums: Vec::new(),
            frame: 0,
        }
    }

    /// Rebuilds the whole population for new parameters or a new viewport size.
    ///
    /// Any frame already requested is cancelled first so only one loop ever advances
    /// the population. All angles and velocities are discarded.
    pub fn configure(&mut self, params: SimParams, viewport: Viewport) -> Result<()> {
        if let Some(request) = self.pending_frame.take() {
            self.scheduler.cancel_frame(request);
        }

        let layout = compute_layout(self.population_size, viewport);
        debug!(
            "Grid layout: {}x{} cells of {:.2}px in square ({:.1}, {:.1}) size {:.1}",
            layout.grid_dim, layout.grid_dim, layout.cell_size, layout.square.x, layout.square.y, layout.square.size
        );

        let pendulums = layout
            .origins
            .iter()
            .map(|&origin| DoublePendulum::random(origin, layout.cell_size, &params, &mut self.rng))
            .collect::<Result<Vec<_>>>()?;

        self.params = params;
        self.viewport = viewport;
        self.layout = layout;
        self.pendulums = pendulums;
        self.frame = 0;

        info!(
            "Configured {} pendulums for {}x{} viewport ({})",
            self.pendulums.len(),
            viewport.width,
            viewport.height,
            params
        );
        Ok(())
    }

    /// Host resize event.
    pub fn reconfigure_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.configure(self.params, viewport)
    }

    /// Host slider event.
    pub fn reconfigure_params(&mut self, params: SimParams) -> Result<()> {
        self.configure(params, self.viewport)
    }

    /// Advances every pendulum by one time step.
    pub fn tick(&mut self) {
        let params = self.params;
        self.pendulums.iter_mut().for_each(|p| motion::step(p, &params));
        self.frame += 1;
    }

    /// Joint positions of every pendulum in their current state.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            frame: self.frame,
            time: self.frame as f64 * TIME_STEP,
            viewport: self.viewport,
            square: self.layout.square,
            params: self.params,
            poses: self.pendulums.iter().map(DoublePendulum::pose).collect(),
        }
    }

    /// Runs up to `frames` frames: wait for the scheduler, hand the current snapshot to
    /// `on_frame`, then tick. Returns how many frames ran before the count was reached,
    /// the loop was stopped, or a frame request was cancelled.
    pub fn run<F>(&mut self, frames: u64, mut on_frame: F) -> Result<u64>
    where
        F: FnMut(&FrameSnapshot) -> Result<()>,
    {
        let mut completed = 0;
        while completed < frames {
            if self.token.is_cancelled() {
                debug!("Animation loop cancelled after {} frames", completed);
                break;
            }
            let request = match self.pending_frame.take() {
                Some(r) => r,
                None => self.scheduler.request_frame(),
            };
            if !self.scheduler.wait_for(request) {
                debug!("Frame request {:?} was cancelled", request);
                break;
            }

            let snapshot = self.snapshot();
            on_frame(&snapshot)?;
            self.tick();
            completed += 1;
            trace!("Frame {} done", self.frame);

            self.pending_frame = Some(self.scheduler.request_frame());
        }
        Ok(completed)
    }

    /// Tears the loop down: withdraws the pending frame and cancels the token.
    /// A stopped driver never runs another frame.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(request) = self.pending_frame.take() {
            self.scheduler.cancel_frame(request);
        }
    }

    /// Token that stops [`run`](Self::run) from outside the frame callback's return value.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn pendulums(&self) -> &[DoublePendulum] {
        &self.pendulums
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Number of pendulums whose state has stopped being finite.
    pub fn non_finite_count(&self) -> usize {
        self.pendulums.iter().filter(|p| !p.is_finite()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pendulum::{ARM1_BASE_LENGTH, ARM2_BASE_LENGTH, MASS_RANGE, MAX_ARM_FRACTION_OF_CELL};
    use crate::scheduler::FixedRateScheduler;
    use rand::SeedableRng;

    /// Fires every request immediately and records cancellations.
    #[derive(Default)]
    struct RecordingScheduler {
        next_id: u64,
        pending: Option<u64>,
        cancelled: Vec<u64>,
    }

    impl FrameScheduler for RecordingScheduler {
        fn request_frame(&mut self) -> FrameRequest {
            self.next_id += 1;
            self.pending = Some(self.next_id);
            FrameRequest(self.next_id)
        }

        fn cancel_frame(&mut self, request: FrameRequest) {
            if self.pending == Some(request.0) {
                self.pending = None;
            }
            self.cancelled.push(request.0);
        }

        fn wait_for(&mut self, request: FrameRequest) -> bool {
            let fired = self.pending == Some(request.0);
            self.pending = None;
            fired
        }
    }

    fn driver() -> SimulationDriver<FixedRateScheduler> {
        SimulationDriver::new(FixedRateScheduler::unpaced(), StdRng::seed_from_u64(1234))
    }

    #[test]
    fn configure_builds_full_population() {
        let mut d = driver();
        assert!(d.pendulums().is_empty());
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        assert_eq!(d.pendulums().len(), POPULATION_SIZE);
        assert_eq!(d.layout().grid_dim, 9);
        for (p, origin) in d.pendulums().iter().zip(&d.layout().origins) {
            assert_eq!(p.origin(), *origin);
        }
    }

    #[test]
    fn tick_preserves_origins_and_counts_frames() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        let origins: Vec<_> = d.pendulums().iter().map(|p| p.origin()).collect();
        for _ in 0..50 {
            d.tick();
        }
        assert_eq!(d.frame(), 50);
        let after: Vec<_> = d.pendulums().iter().map(|p| p.origin()).collect();
        assert_eq!(origins, after);
        assert!(d.pendulums().iter().any(|p| p.arm1.angular_velocity != 0.0));
    }

    #[test]
    fn snapshot_matches_forward_kinematics() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        d.tick();
        let snap = d.snapshot();
        assert_eq!(snap.frame, 1);
        assert!((snap.time - TIME_STEP).abs() < 1e-12);
        assert_eq!(snap.poses.len(), POPULATION_SIZE);
        for (pose, p) in snap.poses.iter().zip(d.pendulums()) {
            let l1 = pose.origin.distance(pose.elbow);
            let l2 = pose.elbow.distance(pose.tip);
            assert!((l1 - p.arm1.length()).abs() < 1e-9);
            assert!((l2 - p.arm2.length()).abs() < 1e-9);
        }
    }

    #[test]
    fn initial_snapshot_has_horizontal_arms() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        let snap = d.snapshot();
        for (pose, p) in snap.poses.iter().zip(d.pendulums()) {
            assert!((pose.elbow.y - pose.origin.y).abs() < 1e-9);
            assert!((pose.elbow.x - pose.origin.x - p.arm1.length()).abs() < 1e-9);
            assert!((pose.tip.x - pose.elbow.x - p.arm2.length()).abs() < 1e-9);
        }
    }

    #[test]
    fn reconfigure_redraws_values_within_same_bounds() {
        let mut d = driver();
        let params = SimParams::default();
        let viewport = Viewport::new(900.0, 900.0);
        d.configure(params, viewport).unwrap();
        let first: Vec<_> = d.pendulums().to_vec();
        d.configure(params, viewport).unwrap();
        let second: Vec<_> = d.pendulums().to_vec();

        assert_ne!(first, second);
        let cap = d.layout().cell_size * MAX_ARM_FRACTION_OF_CELL;
        for p in first.iter().chain(&second) {
            let m = params.length_multiplier;
            assert!(p.arm1.length() >= ARM1_BASE_LENGTH.0 * m && p.arm1.length() <= cap.min(ARM1_BASE_LENGTH.1 * m));
            assert!(p.arm2.length() >= ARM2_BASE_LENGTH.0 * m && p.arm2.length() <= cap.min(ARM2_BASE_LENGTH.1 * m));
            for mass in [p.arm1.mass(), p.arm2.mass()] {
                assert!(mass >= MASS_RANGE.0 && mass < MASS_RANGE.1);
            }
        }
    }

    #[test]
    fn configure_resets_motion() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        for _ in 0..20 {
            d.tick();
        }
        d.reconfigure_params(SimParams::new(2.0, 1.0, 1.5)).unwrap();
        assert_eq!(d.frame(), 0);
        assert_eq!(d.params().gravity, 2.0);
        assert!(d.pendulums().iter().all(|p| p.arm1.angular_velocity == 0.0 && p.arm2.angular_velocity == 0.0));
    }

    #[test]
    fn resize_moves_origins() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        d.reconfigure_viewport(Viewport::new(1600.0, 900.0)).unwrap();
        assert_eq!(d.viewport(), Viewport::new(1600.0, 900.0));
        assert!((d.pendulums()[0].origin().x - 520.0).abs() < 1e-9);
    }

    #[test]
    fn zero_viewport_keeps_running() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(0.0, 0.0)).unwrap();
        assert_eq!(d.pendulums().len(), POPULATION_SIZE);
        for p in d.pendulums() {
            assert_eq!(p.arm1.length(), 0.0);
            assert_eq!(p.arm2.length(), 0.0);
        }
        d.tick();
        let snap = d.snapshot();
        assert!(snap.poses.iter().all(|pose| pose.tip == pose.origin));
    }

    #[test]
    fn default_population_stays_finite_for_ten_thousand_ticks() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        for _ in 0..10_000 {
            d.tick();
        }
        assert_eq!(d.non_finite_count(), 0);
    }

    #[test]
    fn run_draws_before_advancing() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        let mut seen = Vec::new();
        let ran = d
            .run(5, |snap| {
                seen.push(snap.frame);
                Ok(())
            })
            .unwrap();
        assert_eq!(ran, 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(d.frame(), 5);
        assert!(d.scheduler().has_pending());
    }

    #[test]
    fn configure_cancels_pending_frame() {
        let mut d = SimulationDriver::new(RecordingScheduler::default(), StdRng::seed_from_u64(5));
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        d.run(3, |_| Ok(())).unwrap();
        let pending = d.scheduler().pending.expect("next frame requested");

        d.configure(SimParams::default(), Viewport::new(600.0, 600.0)).unwrap();
        assert_eq!(d.scheduler().cancelled, vec![pending]);
        assert!(d.scheduler().pending.is_none());

        // The loop resumes on a fresh request.
        assert_eq!(d.run(2, |_| Ok(())).unwrap(), 2);
        assert_eq!(d.frame(), 2);
    }

    #[test]
    fn stop_ends_the_loop() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        d.run(1, |_| Ok(())).unwrap();
        d.stop();
        assert!(!d.scheduler().has_pending());
        assert!(d.cancellation_token().is_cancelled());
        assert_eq!(d.run(10, |_| Ok(())).unwrap(), 0);
    }

    #[test]
    fn token_cancelled_inside_callback_stops_after_current_frame() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        let token = d.cancellation_token();
        let ran = d
            .run(100, |snap| {
                if snap.frame == 2 {
                    token.cancel();
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(ran, 3);
    }

    #[test]
    fn callback_error_propagates() {
        let mut d = driver();
        d.configure(SimParams::default(), Viewport::new(900.0, 900.0)).unwrap();
        let result = d.run(10, |_| anyhow::bail!("renderer gone"));
        assert!(result.is_err());
        assert_eq!(d.frame(), 0);
    }
}
