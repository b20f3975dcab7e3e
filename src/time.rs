use std::time::{Duration, Instant};

/// Longest step fed to the simulation; keeps damping sane after a stall.
const MAX_DELTA: Duration = Duration::from_millis(100);

pub struct Time {
    start: Instant,
    last: Instant,
    pub delta: Duration,
    frames: u64,
}

impl Time {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self { start: now, last: now, delta: Duration::ZERO, frames: 0 }
    }

    pub fn tick(&mut self) -> Instant {
        let now = Instant::now();
        self.tick_at(now);
        now
    }

    pub fn tick_at(&mut self, now: Instant) {
        self.delta = now.saturating_duration_since(self.last).min(MAX_DELTA);
        self.last = now;
        self.frames += 1;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}
