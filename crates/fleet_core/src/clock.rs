use std::time::Instant;

use bevy_ecs::prelude::Resource;

/// Time scale used when the requested one is not a positive finite number.
pub const DEFAULT_TIME_SCALE: f64 = 1.0;

/// Real-time simulation clock.
///
/// Each call to [`SimulationClock::advance`] turns the wall-clock time elapsed since the
/// previous call into simulated seconds, multiplied by the time scale. While paused the
/// clock keeps tracking wall-clock time but hands out zero, so resuming never produces
/// a catch-up jump.
#[derive(Debug, Clone, Resource)]
pub struct SimulationClock {
    last_timestamp: Option<Instant>,
    running: bool,
    time_scale: f64,
    elapsed_secs: f64,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(false, DEFAULT_TIME_SCALE)
    }
}

impl SimulationClock {
    pub fn new(running: bool, time_scale: f64) -> Self {
        Self {
            last_timestamp: None,
            running,
            time_scale: sanitize_time_scale(time_scale),
            elapsed_secs: 0.0,
        }
    }

    /// Simulated seconds for the frame ending at `now`.
    pub fn advance(&mut self, now: Instant) -> f64 {
        let real_secs = self
            .last_timestamp
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_timestamp = Some(now);
        if !self.running {
            return 0.0;
        }
        let dt = real_secs * self.time_scale;
        self.elapsed_secs += dt;
        dt
    }

    /// Account for simulated time that was not derived from the wall clock
    /// (fixed-step headless runs).
    pub fn record_manual_step(&mut self, dt_secs: f64) {
        if dt_secs.is_finite() && dt_secs > 0.0 {
            self.elapsed_secs += dt_secs;
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Returns the scale actually applied.
    pub fn set_time_scale(&mut self, time_scale: f64) -> f64 {
        self.time_scale = sanitize_time_scale(time_scale);
        self.time_scale
    }

    /// Simulated seconds since the clock was created or last reset.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn reset(&mut self, running: bool, time_scale: f64) {
        *self = Self::new(running, time_scale);
    }
}

fn sanitize_time_scale(time_scale: f64) -> f64 {
    if time_scale.is_finite() && time_scale > 0.0 {
        time_scale
    } else {
        DEFAULT_TIME_SCALE
    }
}
