//! Constants and configuration defaults for Terrarium
//!
//! Centralizes all tuning values, intervals and device paths.
//! Never use magic numbers in other files - add them here first.

use std::time::Duration;

/// Cooling PID parameters
pub mod pid {
    /// Conceptual full-scale output used to derive Kp (`Kp = FULL_SCALE / delta_range`)
    pub const FULL_SCALE: f32 = 255.0;

    /// Temperature error (°C) at which the proportional term alone saturates
    pub const DEFAULT_DELTA_RANGE: f32 = 5.0;

    pub const DEFAULT_KI: f32 = 2.0;

    pub const DEFAULT_KD: f32 = 0.5;

    /// Noise floor: outputs below this are forced to 0 (the fan motor stalls)
    pub const DEFAULT_MIN_OUT: u8 = 170;

    pub const DEFAULT_MAX_OUT: u8 = 255;

    /// Cooling target sits this fraction above the temperature setpoint
    pub const DEFAULT_COOLING_OFFSET_RATIO: f32 = 0.05;
}

/// Hysteresis switch parameters
pub mod hysteresis {
    /// Heating dead-band on either side of the setpoint (°C)
    pub const DEFAULT_HEAT_BAND: f32 = 0.5;

    /// Humidity dead-band (%RH); 0 gives a single-threshold toggle
    pub const DEFAULT_HUMIDITY_BAND: f32 = 0.0;
}

/// Air-quality guard parameters
pub mod guard {
    /// Frames during which smog detection stays disarmed after misting starts
    pub const DEFAULT_COOLDOWN_FRAMES: u32 = 90;

    /// Humidity above `hum_target + margin` triggers emergency venting
    pub const DEFAULT_HUMIDITY_MARGIN: f32 = 10.0;

    /// Smog clears once air quality falls to this fraction of the threshold
    pub const DEFAULT_SMOG_RELEASE_RATIO: f32 = 0.9;

    /// Fan duty while venting smog
    pub const SMOG_VENT_DUTY: u8 = 255;

    /// Fan duty while venting excess humidity
    pub const DEFAULT_HUMIDITY_VENT_DUTY: u8 = 170;
}

/// Serial link defaults
pub mod link {
    use super::*;

    /// Candidate device paths, probed in order
    pub const DEFAULT_PORTS: [&str; 4] = ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2", "/dev/ttyUSB3"];

    pub const DEFAULT_BAUD_RATE: u32 = 9600;

    /// Delay before probing the ports again after the link drops
    pub const REOPEN_DELAY: Duration = Duration::from_secs(5);
}

/// Loop timing
pub mod timing {
    use super::*;

    /// Minimum interval between two outbound actuator commands
    pub const SEND_INTERVAL: Duration = Duration::from_millis(2000);

    /// Telemetry upload cadence
    pub const UPLOAD_INTERVAL: Duration = Duration::from_secs(15);

    /// Remote settings poll cadence
    pub const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(15);

    /// Timeout for a single remote request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Remote service defaults
pub mod remote {
    pub const DEFAULT_BASE_URL: &str = "https://api.thingspeak.com";

    /// Capacity of the settings channel between the poll task and the control loop
    pub const SETTINGS_CHANNEL_CAPACITY: usize = 4;
}

/// Configuration paths and environment variables
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "/etc/terrarium/config.json";

    pub const CONFIG_ENV: &str = "TERRARIUM_CONFIG";

    pub const LOG_ENV: &str = "TERRARIUM_LOG";

    pub const WRITE_KEY_ENV: &str = "TS_LOGS_WRITE_API_KEY";

    pub const SETTINGS_CHANNEL_ENV: &str = "TS_SETTINGS_CHANNEL_ID";

    pub const READ_KEY_ENV: &str = "TS_SETTINGS_READ_API_KEY";

    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}
