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

//! Daemon service: shutdown signalling, the per-frame control loop and link supervision

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tr_core::constants::remote;
use tr_core::Controller;
use tr_error::Result;
use tr_protocol::{encode_command, parse_frame, Settings};

use crate::config::{DaemonConfig, LinkConfig};
use crate::link::{open_link, LineReader};
use crate::telemetry::{run_settings_poll, run_upload_loop, TelemetryAccumulator, ThingSpeakClient};

// ============================================================================
// Shutdown
// ============================================================================

/// Process-wide stop signal that every sleep in the daemon can be woken by
#[derive(Debug, Default)]
pub struct Shutdown {
    triggered: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe to call from any thread, including a signal handler thread
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been triggered
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent trigger is not missed
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration`; returns `false` if shutdown interrupted the sleep
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_triggered(),
            _ = self.wait() => false,
        }
    }
}

// ============================================================================
// Control loop
// ============================================================================

/// Counters for one control loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub discarded: u64,
    pub sent: u64,
}

/// Reads frames, runs the controller and writes rate-limited commands
///
/// Owns the controller outright; settings from the poll task arrive over a
/// channel and are applied between frames.
pub struct ControlLoop {
    controller: Controller,
    accumulator: Arc<TelemetryAccumulator>,
    settings_rx: mpsc::Receiver<Settings>,
    send_interval: Duration,
    last_send: Option<Instant>,
    stats: LoopStats,
}

impl ControlLoop {
    pub fn new(
        controller: Controller,
        accumulator: Arc<TelemetryAccumulator>,
        settings_rx: mpsc::Receiver<Settings>,
        send_interval: Duration,
    ) -> Self {
        Self {
            controller,
            accumulator,
            settings_rx,
            send_interval,
            last_send: None,
            stats: LoopStats::default(),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn apply_settings(&mut self, settings: Settings) {
        self.controller.update_settings(settings);
    }

    /// Run one raw line through the controller
    ///
    /// Returns the outbound command line when the send interval has elapsed.
    /// A malformed line is an error and leaves every piece of state untouched.
    pub fn handle_line(&mut self, raw: &[u8], now: Instant) -> Result<Option<String>> {
        let reading = parse_frame(raw, now.into_std())?;
        self.stats.frames += 1;

        let command = self.controller.process(&reading);
        let settings = self.controller.settings();
        self.accumulator.record(&reading, &command, &settings);

        let due = match self.last_send {
            None => true,
            Some(last) => now.duration_since(last) >= self.send_interval,
        };
        if !due {
            return Ok(None);
        }

        self.last_send = Some(now);
        self.stats.sent += 1;
        Ok(Some(encode_command(&command, &settings)))
    }

    /// Serve one link session until shutdown (`Ok`) or a transport fault (`Err`)
    pub async fn run<R, W>(&mut self, reader: R, writer: &mut W, shutdown: &Shutdown) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = LineReader::new(reader);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    info!(frames = self.stats.frames, sent = self.stats.sent, "Control loop shutting down");
                    return Ok(());
                }

                Some(settings) = self.settings_rx.recv() => {
                    self.apply_settings(settings);
                }

                line = lines.next_line() => {
                    let raw = match line {
                        Ok(raw) => raw,
                        Err(e) if e.is_frame_fault() => {
                            self.stats.discarded += 1;
                            warn!("Discarding inbound line: {}", e);
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    debug!("RX: {}", String::from_utf8_lossy(&raw).trim_end());

                    match self.handle_line(&raw, Instant::now()) {
                        Ok(Some(out)) => {
                            writer.write_all(out.as_bytes()).await?;
                            writer.flush().await?;
                            debug!("TX: {}", out.trim_end());
                        }
                        Ok(None) => {}
                        Err(e) => {
                            self.stats.discarded += 1;
                            warn!("Discarding inbound line: {}", e);
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Daemon
// ============================================================================

/// Keep a link open and serve it, reopening after `reopen_delay` on loss
pub async fn supervise_link(control: &mut ControlLoop, link: &LinkConfig, shutdown: &Shutdown) {
    while !shutdown.is_triggered() {
        match open_link(link) {
            Ok((port, stream)) => {
                let (rd, mut wr) = tokio::io::split(stream);
                match control.run(BufReader::new(rd), &mut wr, shutdown).await {
                    Ok(()) => break,
                    Err(e) => warn!(port = %port, "Serial link lost: {}", e),
                }
            }
            Err(e) => warn!("{}", e),
        }

        info!(delay_ms = link.reopen_delay_ms, "Reopening serial link after delay");
        if !shutdown.sleep(link.reopen_delay()).await {
            break;
        }
    }
}

/// Wire everything together and run until shutdown
pub async fn run(config: DaemonConfig, shutdown: Arc<Shutdown>) -> Result<()> {
    let settings = config.defaults;
    let controller = Controller::new(settings, config.control.tuning.clone());
    let accumulator = Arc::new(TelemetryAccumulator::new(settings));
    let (settings_tx, settings_rx) = mpsc::channel(remote::SETTINGS_CHANNEL_CAPACITY);

    let mut tasks = Vec::new();
    if config.telemetry.enabled {
        let backend = Arc::new(ThingSpeakClient::new(&config.telemetry)?);

        if config.telemetry.upload_enabled() {
            tasks.push(tokio::spawn(run_upload_loop(
                backend.clone(),
                accumulator.clone(),
                config.telemetry.upload_interval(),
                shutdown.clone(),
            )));
        } else {
            info!("No write key configured - telemetry upload disabled");
        }

        if config.telemetry.poll_enabled() {
            tasks.push(tokio::spawn(run_settings_poll(
                backend,
                settings_tx,
                config.telemetry.poll_interval(),
                shutdown.clone(),
            )));
        } else {
            info!("No settings channel configured - using local setpoints only");
        }
    } else {
        info!("Telemetry disabled");
    }

    info!(
        temp_target = settings.temp_target,
        hum_target = settings.hum_target,
        aq_threshold = settings.aq_threshold,
        "Controller initialised"
    );

    let mut control = ControlLoop::new(controller, accumulator, settings_rx, config.control.send_interval());
    supervise_link(&mut control, &config.link, &shutdown).await;

    shutdown.trigger();
    for task in tasks {
        let _ = task.await;
    }

    let stats = control.stats();
    info!(frames = stats.frames, discarded = stats.discarded, sent = stats.sent, "Service stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_control_loop;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_shutdown() {
        let shutdown = Arc::new(Shutdown::new());
        let s = shutdown.clone();
        let handle = tokio::spawn(async move { s.sleep(Duration::from_secs(3600)).await });
        tokio::task::yield_now().await;
        shutdown.trigger();
        assert!(!handle.await.unwrap());
        assert!(!shutdown.sleep(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_shutdown() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_are_rate_limited() {
        let (mut control, _tx, _acc) = test_control_loop(Settings::default());
        let t0 = Instant::now();

        assert!(control.handle_line(b"25.0;30.0;100\n", t0).unwrap().is_some());
        assert!(control
            .handle_line(b"25.0;30.0;100\n", t0 + Duration::from_millis(500))
            .unwrap()
            .is_none());
        assert!(control
            .handle_line(b"25.0;30.0;100\n", t0 + Duration::from_millis(1999))
            .unwrap()
            .is_none());
        assert!(control
            .handle_line(b"25.0;30.0;100\n", t0 + Duration::from_millis(2000))
            .unwrap()
            .is_some());

        let stats = control.stats();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_line_changes_nothing() {
        let (mut control, _tx, acc) = test_control_loop(Settings::default());
        let t0 = Instant::now();

        assert!(control.handle_line(b"abc;def\n", t0).is_err());
        assert_eq!(control.stats().frames, 0);
        assert!(acc.take_record().is_none());

        // Rate limiter was not consumed by the bad line
        let out = control.handle_line(b"24.0;28.0;100\n", t0).unwrap();
        assert_eq!(out.as_deref(), Some("0;255;1;25.00;30.00\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_echoed_after_update() {
        let (mut control, _tx, _acc) = test_control_loop(Settings::default());
        control.apply_settings(Settings::new(26.5, 70.0, 250.0));
        let out = control.handle_line(b"26.0;71.0;100\n", Instant::now()).unwrap();
        assert_eq!(out.as_deref(), Some("0;0;0;26.50;70.00\n"));
    }
}
