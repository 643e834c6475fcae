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

//! Terrarium - enclosure climate regulator
//!
//! Reads sensor frames from a microcontroller over a serial link, runs the
//! control engine from `tr-core` and writes actuator commands back, while
//! background tasks exchange telemetry and setpoints with a remote service.

pub mod config;
pub mod link;
pub mod logger;
pub mod service;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;
