//! Lightweight wall-clock instrumentation, in the spirit of the `Timer::default()` /
//! `timer.dur_ms()` pattern used to break down per-iteration cost in the propagation tree.

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Timer { start: Instant::now() }
    }
}

impl Timer {
    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    pub fn dur_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.
    }

    pub fn dur_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
