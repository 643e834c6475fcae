//! Control engines
//!
//! One continuous regulator (fan), two hysteresis switches (heater, mister)
//! and the air-quality override that sits in front of them.

mod guard;
mod hysteresis;
mod pid;

pub use guard::{AirQualityGuard, GuardVerdict};
pub use hysteresis::{HeatingSwitch, HumiditySwitch};
pub use pid::CoolingRegulator;
