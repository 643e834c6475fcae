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

//! Test utilities and fakes shared by the unit tests

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use tr_core::{ControlTuning, Controller};
use tr_error::{Result, TerrariumError};
use tr_protocol::{ActuatorCommand, SensorReading, Settings, TelemetryRecord};

use crate::service::ControlLoop;
use crate::telemetry::{TelemetryAccumulator, TelemetryBackend};

pub fn sample_reading(temperature: f32) -> SensorReading {
    SensorReading::new(temperature, 55.0, 120.0, Instant::now())
}

pub fn sample_command(fan_speed: u8, heat_on: bool, mist_on: bool) -> ActuatorCommand {
    ActuatorCommand {
        fan_speed,
        heat_on,
        mist_on,
    }
}

/// Control loop with a 2 s send interval, plus its settings sender and accumulator
pub fn test_control_loop(
    settings: Settings,
) -> (ControlLoop, mpsc::Sender<Settings>, Arc<TelemetryAccumulator>) {
    let (tx, rx) = mpsc::channel(4);
    let acc = Arc::new(TelemetryAccumulator::new(settings));
    let controller = Controller::new(settings, ControlTuning::default());
    let control = ControlLoop::new(controller, acc.clone(), rx, Duration::from_secs(2));
    (control, tx, acc)
}

/// In-memory backend that records successful uploads
#[derive(Default)]
pub struct FakeBackend {
    uploads: Mutex<Vec<TelemetryRecord>>,
    failing_uploads: Mutex<u32>,
    remote_settings: Mutex<Option<std::result::Result<Settings, String>>>,
    settings_fetches: Mutex<u32>,
}

impl FakeBackend {
    pub fn uploads(&self) -> Vec<TelemetryRecord> {
        self.uploads.lock().clone()
    }

    /// Make the next `n` uploads fail
    pub fn fail_uploads(&self, n: u32) {
        *self.failing_uploads.lock() = n;
    }

    pub fn set_remote_settings(&self, settings: Result<Settings>) {
        *self.remote_settings.lock() = Some(settings.map_err(|e| e.to_string()));
    }

    pub fn settings_fetches(&self) -> u32 {
        *self.settings_fetches.lock()
    }
}

impl TelemetryBackend for FakeBackend {
    fn upload(&self, record: &TelemetryRecord) -> impl Future<Output = Result<String>> + Send {
        let result = {
            let mut failing = self.failing_uploads.lock();
            if *failing > 0 {
                *failing -= 1;
                Err(TerrariumError::RemoteRejected {
                    status: 200,
                    body: "0".to_string(),
                })
            } else {
                let mut uploads = self.uploads.lock();
                uploads.push(*record);
                Ok(uploads.len().to_string())
            }
        };
        async move { result }
    }

    fn fetch_settings(&self) -> impl Future<Output = Result<Settings>> + Send {
        *self.settings_fetches.lock() += 1;
        let result = match self.remote_settings.lock().clone() {
            Some(Ok(settings)) => Ok(settings),
            Some(Err(msg)) => Err(TerrariumError::malformed_settings(msg)),
            None => Err(TerrariumError::http("connection refused")),
        };
        async move { result }
    }
}
