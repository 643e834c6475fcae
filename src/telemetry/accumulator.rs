/*
 * This file is part of Terrarium.
 *
 * Copyright (C) 2025 Terrarium contributors
 *
 * Terrarium is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Terrarium is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Terrarium. If not, see <https://www.gnu.org/licenses/>.
 */

//! Activity accumulator shared between the control loop and the upload task
//!
//! The sticky bits remember whether an actuator ran at any point since the
//! last upload, however briefly.

use parking_lot::Mutex;

use tr_protocol::{status_bits, ActuatorCommand, SensorReading, Settings, TelemetryRecord};

#[derive(Debug, Clone, Copy, PartialEq)]
struct LatestValues {
    temperature: f32,
    humidity: f32,
    air_quality: f32,
}

#[derive(Debug)]
struct AccumulatorState {
    latest: Option<LatestValues>,
    settings: Settings,
    fan_triggered: bool,
    mist_triggered: bool,
    heat_triggered: bool,
}

/// Latest reading plus sticky actuator bits
///
/// Every access holds the lock only for the field updates themselves.
#[derive(Debug)]
pub struct TelemetryAccumulator {
    state: Mutex<AccumulatorState>,
}

impl TelemetryAccumulator {
    pub fn new(settings: Settings) -> Self {
        Self {
            state: Mutex::new(AccumulatorState {
                latest: None,
                settings,
                fan_triggered: false,
                mist_triggered: false,
                heat_triggered: false,
            }),
        }
    }

    /// Fold one control cycle into the window
    pub fn record(&self, reading: &SensorReading, command: &ActuatorCommand, settings: &Settings) {
        let mut state = self.state.lock();
        state.latest = Some(LatestValues {
            temperature: reading.temperature,
            humidity: reading.humidity,
            air_quality: reading.air_quality,
        });
        state.settings = *settings;
        state.fan_triggered |= command.fan_active();
        state.mist_triggered |= command.mist_on;
        state.heat_triggered |= command.heat_on;
    }

    /// Build the next upload and open a new window
    ///
    /// Returns `None` (leaving the bits alone) until a first reading arrives.
    pub fn take_record(&self) -> Option<TelemetryRecord> {
        let mut state = self.state.lock();
        let latest = state.latest?;

        let record = TelemetryRecord {
            temperature: latest.temperature,
            humidity: latest.humidity,
            air_quality: latest.air_quality,
            temp_target: state.settings.temp_target,
            hum_target: state.settings.hum_target,
            status: status_bits(state.fan_triggered, state.mist_triggered),
            heater: u8::from(state.heat_triggered),
            aq_threshold: state.settings.aq_threshold,
        };

        state.fan_triggered = false;
        state.mist_triggered = false;
        state.heat_triggered = false;

        Some(record)
    }

    /// (fan, mist, heat)
    pub fn sticky_bits(&self) -> (bool, bool, bool) {
        let state = self.state.lock();
        (state.fan_triggered, state.mist_triggered, state.heat_triggered)
    }
}
