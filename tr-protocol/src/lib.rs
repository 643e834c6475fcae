use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use tr_error::{Result, TerrariumError};

/// Maximum inbound frame size in bytes (a sensor line is ~20 bytes)
pub const MAX_FRAME_SIZE: usize = 256;

/// Field separator used in both directions on the serial line
pub const FIELD_SEPARATOR: char = ';';

/// Mandatory leading fields of an inbound frame: temperature, humidity, air quality
pub const MIN_FRAME_FIELDS: usize = 3;

/// Heater PWM value sent when the heater is on (the heater is switched, not modulated)
pub const HEAT_PWM_ON: u8 = 255;

/// Status bit reported when the fan ran at least once since the last upload
pub const STATUS_FAN: u8 = 1;

/// Status bit reported when the mister ran at least once since the last upload
pub const STATUS_MIST: u8 = 2;

/// Setpoints exchanged with the remote settings channel
///
/// Always exchanged wholesale; consumers diff field by field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Temperature setpoint (°C)
    pub temp_target: f32,
    /// Relative humidity setpoint (%RH)
    pub hum_target: f32,
    /// Air-quality index above which the enclosure is vented at full speed
    pub aq_threshold: f32,
}

impl Settings {
    pub fn new(temp_target: f32, hum_target: f32, aq_threshold: f32) -> Self {
        Self {
            temp_target,
            hum_target,
            aq_threshold,
        }
    }

    /// Any finite value is accepted; NaN or infinity would poison the controllers.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("temp_target", self.temp_target),
            ("hum_target", self.hum_target),
            ("aq_threshold", self.aq_threshold),
        ] {
            if !value.is_finite() {
                return Err(TerrariumError::invalid_config(name, format!("{} is not finite", value)));
            }
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temp_target: 25.0,
            hum_target: 30.0,
            aq_threshold: 250.0,
        }
    }
}

/// One decoded sensor frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature: f32,
    pub humidity: f32,
    pub air_quality: f32,
    pub received_at: Instant,
}

impl SensorReading {
    pub fn new(temperature: f32, humidity: f32, air_quality: f32, received_at: Instant) -> Self {
        Self {
            temperature,
            humidity,
            air_quality,
            received_at,
        }
    }
}

/// Actuator outputs for one control cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorCommand {
    /// Fan duty cycle (0-255)
    pub fan_speed: u8,
    pub heat_on: bool,
    pub mist_on: bool,
}

impl ActuatorCommand {
    /// Everything off
    pub const IDLE: ActuatorCommand = ActuatorCommand {
        fan_speed: 0,
        heat_on: false,
        mist_on: false,
    };

    pub fn fan_active(&self) -> bool {
        self.fan_speed > 0
    }

    pub fn heat_pwm(&self) -> u8 {
        if self.heat_on {
            HEAT_PWM_ON
        } else {
            0
        }
    }

    pub fn mist_flag(&self) -> u8 {
        u8::from(self.mist_on)
    }
}

// ============================================================================
// Frame codec
// ============================================================================

/// Decode one inbound line `temperature;humidity;air_quality[;...]`
///
/// The line terminator is optional. Trailing fields (the controller echoes its
/// own state after the readings) are ignored.
pub fn parse_frame(raw: &[u8], received_at: Instant) -> Result<SensorReading> {
    if raw.len() > MAX_FRAME_SIZE {
        return Err(TerrariumError::FrameTooLong {
            size: raw.len(),
            max_size: MAX_FRAME_SIZE,
        });
    }

    let line = std::str::from_utf8(raw).map_err(|_| TerrariumError::FrameEncoding)?;
    let line = line.trim();
    if line.is_empty() {
        return Err(TerrariumError::EmptyFrame);
    }

    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() < MIN_FRAME_FIELDS {
        return Err(TerrariumError::FrameFieldCount {
            found: fields.len(),
            expected: MIN_FRAME_FIELDS,
        });
    }

    let temperature = parse_field(&fields, 0)?;
    let humidity = parse_field(&fields, 1)?;
    let air_quality = parse_field(&fields, 2)?;

    Ok(SensorReading::new(temperature, humidity, air_quality, received_at))
}

fn parse_field(fields: &[&str], index: usize) -> Result<f32> {
    let raw = fields[index].trim();
    match raw.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TerrariumError::FrameField {
            index,
            value: raw.to_string(),
        }),
    }
}

/// Encode an outbound line `fan_speed;heat_pwm;mist;set_temp;set_hum\n`
pub fn encode_command(command: &ActuatorCommand, settings: &Settings) -> String {
    format!(
        "{fan}{sep}{heat}{sep}{mist}{sep}{temp:.2}{sep}{hum:.2}\n",
        fan = command.fan_speed,
        heat = command.heat_pwm(),
        mist = command.mist_flag(),
        temp = settings.temp_target,
        hum = settings.hum_target,
        sep = FIELD_SEPARATOR,
    )
}

// ============================================================================
// Telemetry wire types
// ============================================================================

/// Combine the fan and mist activity bits into the uploaded status field
pub fn status_bits(fan: bool, mist: bool) -> u8 {
    let mut status = 0;
    if fan {
        status |= STATUS_FAN;
    }
    if mist {
        status |= STATUS_MIST;
    }
    status
}

/// One telemetry upload (field1..field8 of the logs channel)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub temperature: f32,
    pub humidity: f32,
    pub air_quality: f32,
    pub temp_target: f32,
    pub hum_target: f32,
    /// Activity bitmask, see [`STATUS_FAN`] and [`STATUS_MIST`]
    pub status: u8,
    /// 1 when the heater ran at least once since the last upload
    pub heater: u8,
    pub aq_threshold: f32,
}

impl TelemetryRecord {
    /// Query parameters for the upload request, credential first
    pub fn query_pairs(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", api_key.to_string()),
            ("field1", self.temperature.to_string()),
            ("field2", self.humidity.to_string()),
            ("field3", self.air_quality.to_string()),
            ("field4", self.temp_target.to_string()),
            ("field5", self.hum_target.to_string()),
            ("field6", self.status.to_string()),
            ("field7", self.heater.to_string()),
            ("field8", self.aq_threshold.to_string()),
        ]
    }
}

/// Last entry of the settings channel
///
/// The remote service stores every field as a string, but numbers are accepted too.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFeedEntry {
    #[serde(default)]
    pub entry_id: Option<u64>,
    #[serde(default)]
    pub field1: Option<Value>,
    #[serde(default)]
    pub field2: Option<Value>,
    #[serde(default)]
    pub field3: Option<Value>,
}

impl SettingsFeedEntry {
    pub fn to_settings(&self) -> Result<Settings> {
        let settings = Settings {
            temp_target: numeric_field("field1", self.field1.as_ref())?,
            hum_target: numeric_field("field2", self.field2.as_ref())?,
            aq_threshold: numeric_field("field3", self.field3.as_ref())?,
        };
        settings
            .validate()
            .map_err(|e| TerrariumError::malformed_settings(e.to_string()))?;
        Ok(settings)
    }
}

fn numeric_field(name: &str, value: Option<&Value>) -> Result<f32> {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .map(|n| n as f32)
        .ok_or_else(|| TerrariumError::malformed_settings(format!("{} missing or not numeric: {:?}", name, value)))
}

/// Parse the body of a "last entry" response into settings
pub fn parse_settings_feed(body: &str) -> Result<Settings> {
    let entry: SettingsFeedEntry = serde_json::from_str(body)
        .map_err(|e| TerrariumError::malformed_settings(format!("invalid JSON: {}", e)))?;
    entry.to_settings()
}
