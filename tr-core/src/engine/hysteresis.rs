//! Two-state hysteresis switches for the heater and the mister

use crate::constants::hysteresis as hyst_const;

/// Heater switch with a symmetric dead-band around the setpoint
///
/// Turns on below `setpoint - band`, off above `setpoint + band`, and holds
/// its state anywhere in between.
#[derive(Debug, Clone)]
pub struct HeatingSwitch {
    setpoint: f32,
    band: f32,
    active: bool,
}

impl HeatingSwitch {
    pub fn new(setpoint: f32) -> Self {
        Self {
            setpoint,
            band: hyst_const::DEFAULT_HEAT_BAND,
            active: false,
        }
    }

    pub fn with_band(mut self, band: f32) -> Self {
        self.band = band.max(0.0);
        self
    }

    pub fn update(&mut self, temperature: f32) -> bool {
        if !self.active && temperature < self.setpoint - self.band {
            self.active = true;
        } else if self.active && temperature > self.setpoint + self.band {
            self.active = false;
        }
        self.active
    }

    /// Retarget without touching the current on/off state
    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Mister switch
///
/// With the default zero band this is a plain threshold: on below the
/// setpoint, off above it, unchanged at exact equality.
#[derive(Debug, Clone)]
pub struct HumiditySwitch {
    setpoint: f32,
    band: f32,
    active: bool,
}

impl HumiditySwitch {
    pub fn new(setpoint: f32) -> Self {
        Self {
            setpoint,
            band: hyst_const::DEFAULT_HUMIDITY_BAND,
            active: false,
        }
    }

    pub fn with_band(mut self, band: f32) -> Self {
        self.band = band.max(0.0);
        self
    }

    pub fn update(&mut self, humidity: f32) -> bool {
        if humidity < self.setpoint - self.band {
            self.active = true;
        } else if humidity > self.setpoint + self.band {
            self.active = false;
        }
        self.active
    }

    pub fn set_hum(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
