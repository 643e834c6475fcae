//! Per-frame climate controller
//!
//! Owns every piece of control state. `process` is a pure function of that
//! state and the reading; no I/O happens here.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use tr_error::{Result, TerrariumError};
use tr_protocol::{ActuatorCommand, SensorReading, Settings};

use crate::constants::{guard as guard_const, hysteresis as hyst_const, pid as pid_const};
use crate::engine::{AirQualityGuard, CoolingRegulator, HeatingSwitch, HumiditySwitch};

/// Tuning knobs that stay fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlTuning {
    /// Error (°C) at which the proportional term alone saturates
    pub delta_range: f32,
    pub ki: f32,
    pub kd: f32,
    pub min_out: u8,
    pub max_out: u8,
    /// Cooling target = temp_target * (1 + ratio)
    pub cooling_offset_ratio: f32,
    pub heat_hysteresis: f32,
    pub humidity_hysteresis: f32,
    pub guard_cooldown: u32,
    pub humidity_emergency_margin: f32,
    pub smog_release_ratio: f32,
    pub humidity_vent_duty: u8,
}

impl Default for ControlTuning {
    fn default() -> Self {
        Self {
            delta_range: pid_const::DEFAULT_DELTA_RANGE,
            ki: pid_const::DEFAULT_KI,
            kd: pid_const::DEFAULT_KD,
            min_out: pid_const::DEFAULT_MIN_OUT,
            max_out: pid_const::DEFAULT_MAX_OUT,
            cooling_offset_ratio: pid_const::DEFAULT_COOLING_OFFSET_RATIO,
            heat_hysteresis: hyst_const::DEFAULT_HEAT_BAND,
            humidity_hysteresis: hyst_const::DEFAULT_HUMIDITY_BAND,
            guard_cooldown: guard_const::DEFAULT_COOLDOWN_FRAMES,
            humidity_emergency_margin: guard_const::DEFAULT_HUMIDITY_MARGIN,
            smog_release_ratio: guard_const::DEFAULT_SMOG_RELEASE_RATIO,
            humidity_vent_duty: guard_const::DEFAULT_HUMIDITY_VENT_DUTY,
        }
    }
}

impl ControlTuning {
    pub fn validate(&self) -> Result<()> {
        if !(self.delta_range > 0.0) {
            return Err(TerrariumError::invalid_config("delta_range", "must be positive"));
        }
        if self.ki < 0.0 || self.kd < 0.0 {
            return Err(TerrariumError::invalid_config("ki/kd", "gains must not be negative"));
        }
        if self.min_out > self.max_out {
            return Err(TerrariumError::invalid_config(
                "min_out",
                format!("{} is above max_out {}", self.min_out, self.max_out),
            ));
        }
        if self.heat_hysteresis < 0.0 || self.humidity_hysteresis < 0.0 {
            return Err(TerrariumError::invalid_config("hysteresis", "bands must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.smog_release_ratio) {
            return Err(TerrariumError::invalid_config("smog_release_ratio", "must be within 0.0..=1.0"));
        }
        Ok(())
    }

    fn cooling_target(&self, temp_target: f32) -> f32 {
        temp_target * (1.0 + self.cooling_offset_ratio)
    }
}

/// Read-only view of the controller for telemetry and logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSnapshot {
    pub settings: Settings,
    pub last_command: ActuatorCommand,
    pub cooling_target: f32,
    pub clear_smog: bool,
    pub clear_humidity: bool,
    pub trigger_delay: u32,
}

pub struct Controller {
    settings: Settings,
    tuning: ControlTuning,
    cooling: CoolingRegulator,
    heating: HeatingSwitch,
    humidity: HumiditySwitch,
    guard: AirQualityGuard,
    last_command: ActuatorCommand,
}

impl Controller {
    pub fn new(settings: Settings, tuning: ControlTuning) -> Self {
        let cooling = CoolingRegulator::new(tuning.cooling_target(settings.temp_target), tuning.delta_range)
            .with_gains(tuning.ki, tuning.kd)
            .with_output_limits(tuning.min_out, tuning.max_out);
        let heating = HeatingSwitch::new(settings.temp_target).with_band(tuning.heat_hysteresis);
        let humidity = HumiditySwitch::new(settings.hum_target).with_band(tuning.humidity_hysteresis);
        let guard = AirQualityGuard::new(tuning.guard_cooldown)
            .with_humidity_margin(tuning.humidity_emergency_margin)
            .with_release_ratio(tuning.smog_release_ratio)
            .with_humidity_vent_duty(tuning.humidity_vent_duty);

        Self {
            settings,
            tuning,
            cooling,
            heating,
            humidity,
            guard,
            last_command: ActuatorCommand::IDLE,
        }
    }

    /// Run one control cycle with the reading's own arrival time
    pub fn process(&mut self, reading: &SensorReading) -> ActuatorCommand {
        self.process_at(reading, reading.received_at)
    }

    /// Run one control cycle at an explicit time
    pub fn process_at(&mut self, reading: &SensorReading, now: Instant) -> ActuatorCommand {
        let verdict = self.guard.evaluate(
            reading.air_quality,
            reading.humidity,
            self.settings.aq_threshold,
            self.settings.hum_target,
        );

        let fan_speed = match verdict.fan_override {
            Some(duty) => duty,
            None => self.cooling.compute(reading.temperature, now),
        };

        let mist_on = if verdict.suppress_mist {
            false
        } else {
            self.humidity.update(reading.humidity)
        };

        let heat_on = self.heating.update(reading.temperature);

        self.guard.observe_mist(mist_on);

        let command = ActuatorCommand {
            fan_speed,
            heat_on,
            mist_on,
        };

        debug!(
            temperature = reading.temperature,
            humidity = reading.humidity,
            air_quality = reading.air_quality,
            fan_speed,
            heat_on,
            mist_on,
            "Control cycle"
        );

        self.last_command = command;
        command
    }

    /// Apply a new settings snapshot, touching only the subsystems whose field changed
    pub fn update_settings(&mut self, new: Settings) {
        if new == self.settings {
            return;
        }

        if new.temp_target != self.settings.temp_target {
            let cooling_target = self.tuning.cooling_target(new.temp_target);
            self.cooling.set_target(cooling_target);
            self.heating.set_setpoint(new.temp_target);
            info!(
                from = self.settings.temp_target,
                to = new.temp_target,
                cooling_target,
                "Temperature target updated"
            );
            self.settings.temp_target = new.temp_target;
        }

        if new.hum_target != self.settings.hum_target {
            self.humidity.set_hum(new.hum_target);
            info!(from = self.settings.hum_target, to = new.hum_target, "Humidity target updated");
            self.settings.hum_target = new.hum_target;
        }

        if new.aq_threshold != self.settings.aq_threshold {
            info!(from = self.settings.aq_threshold, to = new.aq_threshold, "Air quality threshold updated");
            self.settings.aq_threshold = new.aq_threshold;
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn last_command(&self) -> ActuatorCommand {
        self.last_command
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            settings: self.settings,
            last_command: self.last_command,
            cooling_target: self.cooling.target(),
            clear_smog: self.guard.clear_smog(),
            clear_humidity: self.guard.clear_humidity(),
            trigger_delay: self.guard.trigger_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tr_protocol::parse_frame;

    fn controller(temp: f32, hum: f32, aq: f32) -> Controller {
        Controller::new(Settings::new(temp, hum, aq), ControlTuning::default())
    }

    fn reading(t: f32, h: f32, q: f32, at: Instant) -> SensorReading {
        SensorReading::new(t, h, q, at)
    }

    #[test]
    fn test_cooling_target_is_offset_from_setpoint() {
        let ctrl = controller(25.0, 30.0, 250.0);
        assert!((ctrl.snapshot().cooling_target - 26.25).abs() < 1e-4);
    }

    #[test]
    fn test_single_reading_at_setpoint() {
        let t0 = Instant::now();
        let mut ctrl = controller(25.0, 40.0, 200.0);
        let cmd = ctrl.process(&parse_frame(b"25.0;60.0;100", t0).unwrap());

        // Humidity 60 is more than 10 above the 40 target, so the guard vents at 170
        // even though the regulator itself asks for nothing.
        assert_eq!(cmd.fan_speed, 170);
        assert!(ctrl.snapshot().clear_humidity);
        assert_eq!(cmd.heat_on, 25.0 < 25.0 - 0.5);
        assert!(!cmd.mist_on);

        let mut ctrl = controller(25.0, 55.0, 200.0);
        let cmd = ctrl.process(&parse_frame(b"25.0;60.0;100", t0).unwrap());
        assert_eq!(cmd, ActuatorCommand::IDLE);
    }

    #[test]
    fn test_rising_temperature_reaches_saturation() {
        let t0 = Instant::now();
        let mut ctrl = controller(25.0, 60.0, 500.0);
        let mut last = 0;
        let mut temps = vec![25.0, 26.0, 27.0, 28.0, 29.0];
        temps.extend(std::iter::repeat(30.0).take(10));
        for (i, t) in temps.iter().enumerate() {
            let cmd = ctrl.process(&reading(*t, 60.0, 100.0, t0 + Duration::from_secs(i as u64)));
            assert!(cmd.fan_speed >= last);
            last = cmd.fan_speed;
        }
        assert_eq!(last, 255);
    }

    #[test]
    fn test_malformed_frame_leaves_state_untouched() {
        let t0 = Instant::now();
        let mut a = controller(25.0, 60.0, 200.0);
        let mut b = controller(25.0, 60.0, 200.0);

        let first = reading(27.0, 55.0, 100.0, t0);
        a.process(&first);
        b.process(&first);

        assert!(parse_frame(b"abc;def", t0 + Duration::from_secs(1)).is_err());

        let next = reading(28.5, 58.0, 120.0, t0 + Duration::from_secs(2));
        assert_eq!(a.process(&next), b.process(&next));
    }

    #[test]
    fn test_smog_suppresses_mist_and_saturates_fan() {
        let t0 = Instant::now();
        let mut ctrl = controller(25.0, 60.0, 200.0);
        let cmd = ctrl.process(&reading(24.0, 40.0, 300.0, t0));
        assert_eq!(cmd.fan_speed, 255);
        assert!(!cmd.mist_on);
        assert!(cmd.heat_on);
    }

    #[test]
    fn test_misting_disarms_smog_detection() {
        let t0 = Instant::now();
        let mut ctrl = controller(25.0, 60.0, 200.0);
        let cmd = ctrl.process(&reading(25.0, 40.0, 100.0, t0));
        assert!(cmd.mist_on);
        assert_eq!(ctrl.snapshot().trigger_delay, 90);

        for i in 1..=90 {
            let cmd = ctrl.process(&reading(25.0, 40.0, 400.0, t0 + Duration::from_secs(i)));
            assert!(cmd.mist_on);
            assert_ne!(cmd.fan_speed, 255);
        }
        let cmd = ctrl.process(&reading(25.0, 40.0, 400.0, t0 + Duration::from_secs(91)));
        assert_eq!(cmd.fan_speed, 255);
        assert!(!cmd.mist_on);
    }

    #[test]
    fn test_update_settings_retargets_changed_fields_only() {
        let t0 = Instant::now();
        let mut ctrl = controller(25.0, 60.0, 200.0);
        ctrl.process(&reading(20.0, 70.0, 100.0, t0));
        assert!(ctrl.last_command().heat_on);

        ctrl.update_settings(Settings::new(18.0, 60.0, 200.0));
        let snap = ctrl.snapshot();
        assert!((snap.cooling_target - 18.9).abs() < 1e-4);
        assert_eq!(snap.settings.hum_target, 60.0);

        // Heater state is preserved until the next reading crosses the new band
        let cmd = ctrl.process(&reading(20.0, 70.0, 100.0, t0 + Duration::from_secs(1)));
        assert!(!cmd.heat_on);

        ctrl.update_settings(Settings::new(18.0, 80.0, 150.0));
        let cmd = ctrl.process(&reading(17.0, 70.0, 100.0, t0 + Duration::from_secs(2)));
        assert!(cmd.mist_on);
        assert_eq!(ctrl.settings().aq_threshold, 150.0);
    }

    #[test]
    fn test_tuning_validation() {
        assert!(ControlTuning::default().validate().is_ok());
        let bad = ControlTuning {
            min_out: 200,
            max_out: 100,
            ..ControlTuning::default()
        };
        assert!(bad.validate().is_err());
        let bad = ControlTuning {
            delta_range: 0.0,
            ..ControlTuning::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_tuning_partial_json() {
        let tuning: ControlTuning = serde_json::from_str(r#"{"guard_cooldown": 10}"#).unwrap();
        assert_eq!(tuning.guard_cooldown, 10);
        assert_eq!(tuning.max_out, 255);
    }
}
