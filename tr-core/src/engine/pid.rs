//! Cooling PID regulator
//!
//! Drives the fan from the temperature error above a cooling target.
//!
//! # How It Works
//!
//! 1. **Cut-off**: At or below the target the fan is off and the integral and
//!    derivative memory are cleared.
//!
//! 2. **PID**: Above the target the output is `kp*e + ki*∫e dt + kd*de/dt`, with
//!    elapsed time measured between calls so irregular frame spacing is fine.
//!    `kp` is derived so an error equal to `delta_range` saturates on its own.
//!
//! 3. **Output shaping**: Values under `min_out` become 0 (the motor cannot
//!    spin that slowly) and the high side is clamped to `max_out`.

use std::time::Instant;

use crate::constants::pid as pid_const;

#[derive(Debug, Clone)]
pub struct CoolingRegulator {
    target: f32,
    kp: f32,
    ki: f32,
    kd: f32,
    prev_error: f32,
    integral: f32,
    prev_time: Option<Instant>,
    min_out: u8,
    max_out: u8,
}

impl CoolingRegulator {
    /// Create a regulator for `target` (°C) that saturates at `delta_range` °C of error
    pub fn new(target: f32, delta_range: f32) -> Self {
        let delta_range = if delta_range > 0.0 {
            delta_range
        } else {
            pid_const::DEFAULT_DELTA_RANGE
        };
        Self {
            target,
            kp: pid_const::FULL_SCALE / delta_range,
            ki: pid_const::DEFAULT_KI,
            kd: pid_const::DEFAULT_KD,
            prev_error: 0.0,
            integral: 0.0,
            prev_time: None,
            min_out: pid_const::DEFAULT_MIN_OUT,
            max_out: pid_const::DEFAULT_MAX_OUT,
        }
    }

    /// Override the integral and derivative gains
    pub fn with_gains(mut self, ki: f32, kd: f32) -> Self {
        self.ki = ki.max(0.0);
        self.kd = kd.max(0.0);
        self
    }

    /// Set the output window (noise floor and ceiling)
    pub fn with_output_limits(mut self, min_out: u8, max_out: u8) -> Self {
        self.min_out = min_out.min(max_out);
        self.max_out = max_out;
        self
    }

    /// Fan duty for `temperature` measured at `now`
    pub fn compute(&mut self, temperature: f32, now: Instant) -> u8 {
        let error = temperature - self.target;

        if error <= 0.0 {
            self.prev_error = 0.0;
            self.integral = 0.0;
            self.prev_time = Some(now);
            return 0;
        }

        let dt = self
            .prev_time
            .map(|prev| now.saturating_duration_since(prev).as_secs_f32())
            .unwrap_or(0.0);

        let max_out = f32::from(self.max_out);

        self.integral += error * dt;
        if self.ki > 0.0 {
            let limit = max_out / self.ki;
            self.integral = self.integral.clamp(-limit, limit);
        }

        let derivative = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };

        let output = self.kp * error + self.ki * self.integral + self.kd * derivative;

        self.prev_error = error;
        self.prev_time = Some(now);

        if output < f32::from(self.min_out) {
            0
        } else if output > max_out {
            self.max_out
        } else {
            // Truncation toward zero; output is within [min_out, max_out] here
            output as u8
        }
    }

    /// Move the target without clearing integral or derivative memory
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn kp(&self) -> f32 {
        self.kp
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn prev_error(&self) -> f32 {
        self.prev_error
    }
}
