//! Air-quality override with misting cooldown
//!
//! Two independent latches decide whether the enclosure is vented regardless
//! of the cooling regulator:
//!
//! - **smog**: set when air quality exceeds the threshold while detection is
//!   armed, released at `release_ratio * threshold`. Suppresses misting.
//! - **humidity**: set above `hum_target + margin`, released at `hum_target`.
//!
//! Misting makes the air-quality sensor read high for a while, so detection is
//! disarmed for `cooldown` frames every time the mister switches on.

use tracing::info;

use crate::constants::guard as guard_const;

/// What the guard wants from this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuardVerdict {
    /// Fixed fan duty that replaces the regulator output
    pub fan_override: Option<u8>,
    /// Misting must stay off regardless of the humidity switch
    pub suppress_mist: bool,
}

#[derive(Debug, Clone)]
pub struct AirQualityGuard {
    clear_smog: bool,
    clear_humidity: bool,
    trigger_delay: u32,
    cooldown: u32,
    humidity_margin: f32,
    release_ratio: f32,
    humidity_vent_duty: u8,
    mist_was_on: bool,
}

impl Default for AirQualityGuard {
    fn default() -> Self {
        Self::new(guard_const::DEFAULT_COOLDOWN_FRAMES)
    }
}

impl AirQualityGuard {
    pub fn new(cooldown: u32) -> Self {
        Self {
            clear_smog: false,
            clear_humidity: false,
            trigger_delay: 0,
            cooldown,
            humidity_margin: guard_const::DEFAULT_HUMIDITY_MARGIN,
            release_ratio: guard_const::DEFAULT_SMOG_RELEASE_RATIO,
            humidity_vent_duty: guard_const::DEFAULT_HUMIDITY_VENT_DUTY,
            mist_was_on: false,
        }
    }

    pub fn with_humidity_margin(mut self, margin: f32) -> Self {
        self.humidity_margin = margin.max(0.0);
        self
    }

    pub fn with_release_ratio(mut self, ratio: f32) -> Self {
        self.release_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_humidity_vent_duty(mut self, duty: u8) -> Self {
        self.humidity_vent_duty = duty;
        self
    }

    /// Update both latches for one frame and count the cooldown down
    ///
    /// Detection is armed only if the countdown was already zero when the frame
    /// arrived, so arming blocks exactly `cooldown` subsequent frames.
    pub fn evaluate(&mut self, air_quality: f32, humidity: f32, aq_threshold: f32, hum_target: f32) -> GuardVerdict {
        let armed = self.trigger_delay == 0;
        self.trigger_delay = self.trigger_delay.saturating_sub(1);

        if !self.clear_smog && armed && air_quality > aq_threshold {
            self.clear_smog = true;
            info!(air_quality, aq_threshold, "Air quality above threshold, venting at full speed");
        } else if self.clear_smog && air_quality <= aq_threshold * self.release_ratio {
            self.clear_smog = false;
            info!(air_quality, "Air quality recovered, smog venting stopped");
        }

        if !self.clear_humidity && humidity > hum_target + self.humidity_margin {
            self.clear_humidity = true;
            info!(humidity, hum_target, "Humidity far above target, venting");
        } else if self.clear_humidity && humidity <= hum_target {
            self.clear_humidity = false;
            info!(humidity, "Humidity back at target, venting stopped");
        }

        let fan_override = if self.clear_smog {
            Some(guard_const::SMOG_VENT_DUTY)
        } else if self.clear_humidity {
            Some(self.humidity_vent_duty)
        } else {
            None
        };

        GuardVerdict {
            fan_override,
            suppress_mist: self.clear_smog,
        }
    }

    /// Report the mister state actually commanded this frame; arms the cooldown when it switches on
    pub fn observe_mist(&mut self, mist_on: bool) {
        if mist_on && !self.mist_was_on {
            self.trigger_delay = self.cooldown;
        }
        self.mist_was_on = mist_on;
    }

    pub fn clear_smog(&self) -> bool {
        self.clear_smog
    }

    pub fn clear_humidity(&self) -> bool {
        self.clear_humidity
    }

    pub fn trigger_delay(&self) -> u32 {
        self.trigger_delay
    }
}
