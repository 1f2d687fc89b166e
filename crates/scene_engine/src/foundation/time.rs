//! Time management utilities

use std::time::{Duration, Instant};

/// High-precision timer for frame timing
#[derive(Debug)]
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since timer creation
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the average FPS since timer creation
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

/// Simple stopwatch for measuring elapsed time
#[derive(Debug)]
pub struct Stopwatch {
    start_time: Option<Instant>,
    elapsed: Duration,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// Create a new stopped stopwatch
    pub fn new() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a new stopwatch and start it immediately
    pub fn start_new() -> Self {
        let mut stopwatch = Self::new();
        stopwatch.start();
        stopwatch
    }

    /// Start the stopwatch
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Stop the stopwatch and accumulate elapsed time
    pub fn stop(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        let running = self.start_time.map_or(Duration::ZERO, |start| start.elapsed());
        self.elapsed + running
    }
}

/// Frame-rate limiter used by the pipeline manager
///
/// With no target the pacer never sleeps.
#[derive(Debug)]
pub struct FramePacer {
    frame_budget: Option<Duration>,
    frame_start: Instant,
}

impl FramePacer {
    /// Create a pacer for the given target frames per second
    pub fn new(target_fps: Option<u32>) -> Self {
        let frame_budget = target_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)));
        Self {
            frame_budget,
            frame_start: Instant::now(),
        }
    }

    /// Mark the start of a frame
    pub fn begin_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Time left in the current frame's budget
    pub fn remaining(&self) -> Duration {
        self.frame_budget
            .map_or(Duration::ZERO, |budget| budget.saturating_sub(self.frame_start.elapsed()))
    }

    /// Sleep out whatever is left of the frame budget
    pub fn end_frame(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_pacer_never_waits() {
        let mut pacer = FramePacer::new(None);
        pacer.begin_frame();
        assert_eq!(pacer.remaining(), Duration::ZERO);

        let zero = FramePacer::new(Some(0));
        assert_eq!(zero.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_pacer_budget_bounded_by_target() {
        let mut pacer = FramePacer::new(Some(10));
        pacer.begin_frame();
        assert!(pacer.remaining() <= Duration::from_millis(100));
    }

    #[test]
    fn test_timer_counts_frames() {
        let mut timer = Timer::new();
        timer.update();
        timer.update();
        assert_eq!(timer.frame_count(), 2);
        assert!(timer.total_time() >= 0.0);
    }
}
