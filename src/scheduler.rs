use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared stop flag for an animation loop. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handle to one requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(pub u64);

/// Source of frame callbacks, the host's "call me before the next repaint".
pub trait FrameScheduler {
    /// Requests one future frame. Only the most recent request can fire.
    fn request_frame(&mut self) -> FrameRequest;

    /// Withdraws a request. Cancelling a request that already fired is a no-op.
    fn cancel_frame(&mut self, request: FrameRequest);

    /// Blocks until `request` fires. Returns `false` if it was cancelled or superseded.
    fn wait_for(&mut self, request: FrameRequest) -> bool;
}

/// Fires frames at a fixed rate, or immediately when no rate is set.
#[derive(Debug)]
pub struct FixedRateScheduler {
    frame_interval: Option<Duration>,
    next_deadline: Option<Instant>,
    next_id: u64,
    pending: Option<u64>,
}

impl FixedRateScheduler {
    /// `frame_rate_hz <= 0` disables pacing.
    pub fn new(frame_rate_hz: f64) -> Self {
        let frame_interval = if frame_rate_hz > 0.0 {
            Some(Duration::from_secs_f64(1.0 / frame_rate_hz))
        } else {
            None
        };
        FixedRateScheduler { frame_interval, next_deadline: None, next_id: 0, pending: None }
    }

    /// A scheduler that fires every request as soon as it is awaited.
    #[cfg(test)]
    pub fn unpaced() -> Self {
        Self::new(0.0)
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl FrameScheduler for FixedRateScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        let id = self.next_id;
        self.next_id += 1;
        self.pending = Some(id);
        if let Some(interval) = self.frame_interval {
            let now = Instant::now();
            // Keep a steady cadence, but never try to catch up on missed frames.
            let deadline = match self.next_deadline {
                Some(d) if d > now => d,
                _ => now + interval,
            };
            self.next_deadline = Some(deadline);
        }
        FrameRequest(id)
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        if self.pending == Some(request.0) {
            self.pending = None;
            log::trace!("Cancelled frame request {}", request.0);
        }
    }

    fn wait_for(&mut self, request: FrameRequest) -> bool {
        if self.pending != Some(request.0) {
            return false;
        }
        if let (Some(interval), Some(deadline)) = (self.frame_interval, self.next_deadline) {
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
            self.next_deadline = Some(deadline + interval);
        }
        self.pending = None;
        true
    }
}
