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

//! Serial link to the microcontroller
//!
//! Port discovery and a line reader that is safe to use as a `select!` branch.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use tr_error::{Result, TerrariumError};
use tr_protocol::MAX_FRAME_SIZE;

use crate::config::LinkConfig;

/// Probe the configured ports in order and open the first one that responds
pub fn open_link(config: &LinkConfig) -> Result<(String, SerialStream)> {
    let mut failures = Vec::new();

    for port in &config.ports {
        match tokio_serial::new(port.as_str(), config.baud_rate).open_native_async() {
            Ok(stream) => {
                info!(port = %port, baud = config.baud_rate, "Serial link opened");
                return Ok((port.clone(), stream));
            }
            Err(e) => {
                debug!(port = %port, "Could not open serial port: {}", e);
                failures.push(format!("{}: {}", port, e));
            }
        }
    }

    Err(TerrariumError::link(format!(
        "no serial port available ({})",
        failures.join("; ")
    )))
}

/// Splits a byte stream into `\n`-terminated lines
///
/// Partial lines survive cancellation: bytes are only taken out of the inner
/// reader once they have been copied into the pending buffer. Lines longer
/// than `max_len` are dropped whole and reported as `FrameTooLong`.
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
    max_len: usize,
    overflow: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_len(inner, MAX_FRAME_SIZE)
    }

    pub fn with_max_len(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            pending: Vec::with_capacity(64),
            max_len,
            overflow: 0,
        }
    }

    /// Next complete line including its terminator
    ///
    /// Returns `LinkClosed` on end of stream.
    pub async fn next_line(&mut self) -> Result<Vec<u8>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Err(TerrariumError::LinkClosed);
            }

            let (chunk_len, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(idx) => (idx + 1, true),
                None => (available.len(), false),
            };

            if self.overflow > 0 {
                self.overflow += chunk_len;
            } else if self.pending.len() + chunk_len > self.max_len {
                self.overflow = self.pending.len() + chunk_len;
                self.pending.clear();
            } else {
                self.pending.extend_from_slice(&available[..chunk_len]);
            }
            self.inner.consume(chunk_len);

            if complete {
                if self.overflow > 0 {
                    let size = std::mem::take(&mut self.overflow);
                    return Err(TerrariumError::FrameTooLong {
                        size,
                        max_size: self.max_len,
                    });
                }
                return Ok(std::mem::take(&mut self.pending));
            }
        }
    }
}
