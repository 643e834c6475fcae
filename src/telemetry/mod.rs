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

//! Background synchronisation with the remote service
//!
//! Two independent tasks: one uploads the accumulated window every interval,
//! the other polls the settings channel and hands new settings to the control
//! loop. Failures are logged and retried on the next tick.

mod accumulator;
mod thingspeak;

pub use accumulator::TelemetryAccumulator;
pub use thingspeak::{check_upload_response, ThingSpeakClient};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tr_error::{Result, TerrariumError};
use tr_protocol::{Settings, TelemetryRecord};

use crate::service::Shutdown;

/// Log every failure up to this many in a row, then every Nth
const FAILURE_LOG_EVERY: u32 = 10;

/// Remote endpoint for uploads and settings
pub trait TelemetryBackend: Send + Sync + 'static {
    /// Push one record; returns the remote entry id
    fn upload(&self, record: &TelemetryRecord) -> impl Future<Output = Result<String>> + Send;

    /// Latest settings record
    fn fetch_settings(&self) -> impl Future<Output = Result<Settings>> + Send;
}

/// Receiver of settings pulled from the remote channel
#[cfg_attr(test, mockall::automock)]
pub trait SettingsSink: Send + Sync {
    fn apply(&self, settings: Settings) -> Result<()>;
}

impl SettingsSink for mpsc::Sender<Settings> {
    fn apply(&self, settings: Settings) -> Result<()> {
        self.try_send(settings).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TerrariumError::generic("settings channel full"),
            mpsc::error::TrySendError::Closed(_) => TerrariumError::generic("control loop is gone"),
        })
    }
}

fn log_failure(what: &str, consecutive: u32, error: &TerrariumError) {
    if consecutive <= FAILURE_LOG_EVERY || consecutive % FAILURE_LOG_EVERY == 0 {
        warn!(consecutive, "{} failed: {}", what, error);
    }
}

/// Upload the accumulated window every `interval` until shutdown
///
/// Sleeps first so the initial upload carries a full window.
pub async fn run_upload_loop<B: TelemetryBackend>(
    backend: Arc<B>,
    accumulator: Arc<TelemetryAccumulator>,
    interval: Duration,
    shutdown: Arc<Shutdown>,
) {
    info!(interval_ms = interval.as_millis() as u64, "Telemetry upload loop started");
    let mut failures: u32 = 0;

    while shutdown.sleep(interval).await {
        let Some(record) = accumulator.take_record() else {
            debug!("No reading yet, skipping upload");
            continue;
        };

        let result = tokio::select! {
            r = backend.upload(&record) => r,
            _ = shutdown.wait() => break,
        };

        match result {
            Ok(entry) => {
                if failures > 0 {
                    info!(after = failures, "Telemetry upload recovered");
                }
                failures = 0;
                debug!(entry = %entry, status = record.status, heater = record.heater, "Telemetry uploaded");
            }
            Err(e) => {
                failures += 1;
                log_failure("Telemetry upload", failures, &e);
            }
        }
    }

    info!("Telemetry upload loop stopped");
}

/// Poll the settings channel every `interval` until shutdown
///
/// Polls once immediately. Only settings that differ from the last ones
/// delivered are forwarded.
pub async fn run_settings_poll<B, S>(backend: Arc<B>, sink: S, interval: Duration, shutdown: Arc<Shutdown>)
where
    B: TelemetryBackend,
    S: SettingsSink,
{
    info!(interval_ms = interval.as_millis() as u64, "Settings poll loop started");
    let mut delivered: Option<Settings> = None;
    let mut failures: u32 = 0;

    loop {
        let result = tokio::select! {
            r = backend.fetch_settings() => r,
            _ = shutdown.wait() => break,
        };

        match result {
            Ok(settings) => {
                failures = 0;
                if delivered != Some(settings) {
                    match sink.apply(settings) {
                        Ok(()) => {
                            debug!(?settings, "Remote settings forwarded");
                            delivered = Some(settings);
                        }
                        Err(e) => warn!("Could not forward settings: {}", e),
                    }
                }
            }
            Err(e) => {
                failures += 1;
                log_failure("Settings poll", failures, &e);
            }
        }

        if !shutdown.sleep(interval).await {
            break;
        }
    }

    info!("Settings poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_command, sample_reading, FakeBackend};
    use mockall::predicate::eq;

    #[tokio::test(start_paused = true)]
    async fn test_upload_loop_sends_sticky_window() {
        let backend = Arc::new(FakeBackend::default());
        let acc = Arc::new(TelemetryAccumulator::new(Settings::default()));
        let shutdown = Arc::new(Shutdown::new());

        let handle = tokio::spawn(run_upload_loop(
            backend.clone(),
            acc.clone(),
            Duration::from_secs(15),
            shutdown.clone(),
        ));

        acc.record(&sample_reading(28.0), &sample_command(200, false, false), &Settings::default());
        acc.record(&sample_reading(25.0), &sample_command(0, false, false), &Settings::default());

        tokio::time::sleep(Duration::from_secs(16)).await;
        let uploads = backend.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].status, 1);
        assert_eq!(uploads[0].temperature, 25.0);

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_is_retried_next_tick() {
        let backend = Arc::new(FakeBackend::default());
        backend.fail_uploads(1);
        let acc = Arc::new(TelemetryAccumulator::new(Settings::default()));
        let shutdown = Arc::new(Shutdown::new());
        acc.record(&sample_reading(25.0), &sample_command(0, false, true), &Settings::default());

        let handle = tokio::spawn(run_upload_loop(
            backend.clone(),
            acc.clone(),
            Duration::from_secs(15),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(31)).await;
        // The failed window is not re-queued: latest wins
        let uploads = backend.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].status, 0);

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_poll_forwards_changes_only() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_remote_settings(Ok(Settings::new(26.0, 70.0, 200.0)));
        let shutdown = Arc::new(Shutdown::new());

        let mut sink = MockSettingsSink::new();
        sink.expect_apply()
            .with(eq(Settings::new(26.0, 70.0, 200.0)))
            .times(1)
            .returning(|_| Ok(()));

        let handle = tokio::spawn(run_settings_poll(
            backend.clone(),
            sink,
            Duration::from_secs(15),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(backend.settings_fetches() >= 3);

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_poll_skips_malformed_records() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_remote_settings(Err(TerrariumError::malformed_settings("field2 missing")));
        let shutdown = Arc::new(Shutdown::new());
        let (tx, mut rx) = mpsc::channel(4);

        let handle = tokio::spawn(run_settings_poll(
            backend.clone(),
            tx,
            Duration::from_secs(15),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        backend.set_remote_settings(Ok(Settings::new(22.0, 40.0, 300.0)));
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(rx.try_recv().unwrap(), Settings::new(22.0, 40.0, 300.0));

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[test]
    fn test_sender_sink_reports_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(tx.apply(Settings::default()).is_ok());
        assert!(tx.apply(Settings::default()).is_err());
    }
}
