//! Terrarium Core Library
//!
//! Climate control engine for an enclosure driven by a serial microcontroller.
//!
//! # Module Structure
//!
//! - `engine/` - Cooling PID, heater and mister hysteresis switches, air-quality guard
//! - `controller` - Per-frame orchestration and settings updates
//! - `constants` - Tuning defaults, intervals and paths
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use tr_core::{ControlTuning, Controller};
//! use tr_protocol::{parse_frame, Settings};
//!
//! let mut controller = Controller::new(Settings::default(), ControlTuning::default());
//! let reading = parse_frame(b"24.0;28.0;120", Instant::now()).unwrap();
//! let command = controller.process(&reading);
//! assert!(command.heat_on);
//! ```

pub mod constants;
pub mod controller;
pub mod engine;

pub use controller::{ControlTuning, Controller, ControllerSnapshot};
pub use engine::{AirQualityGuard, CoolingRegulator, GuardVerdict, HeatingSwitch, HumiditySwitch};
