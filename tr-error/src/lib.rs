//! Unified error handling for Terrarium
//!
//! This crate provides a single error type used across all Terrarium components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using TerrariumError
pub type Result<T> = std::result::Result<T, TerrariumError>;

/// Unified error type for all Terrarium operations
#[derive(thiserror::Error, Debug)]
pub enum TerrariumError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // ============================================================================
    // Serial Frame Errors
    // ============================================================================
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Frame has {found} fields, expected at least {expected}")]
    FrameFieldCount {
        found: usize,
        expected: usize,
    },

    #[error("Frame field {index} is not a number: {value:?}")]
    FrameField {
        index: usize,
        value: String,
    },

    #[error("Frame is not valid UTF-8")]
    FrameEncoding,

    #[error("Frame too long: {size} bytes (max {max_size} bytes)")]
    FrameTooLong {
        size: usize,
        max_size: usize,
    },

    // ============================================================================
    // Link Errors
    // ============================================================================
    #[error("Link error: {0}")]
    Link(String),

    #[error("Link closed by peer")]
    LinkClosed,

    // ============================================================================
    // Remote Service Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Remote service rejected request (status {status}): {body:?}")]
    RemoteRejected {
        status: u16,
        body: String,
    },

    #[error("Malformed settings record: {0}")]
    MalformedSettings(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl TerrariumError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a link error from a string
    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }

    /// Create an HTTP error from a string
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a malformed settings error from a string
    pub fn malformed_settings(msg: impl Into<String>) -> Self {
        Self::MalformedSettings(msg.into())
    }

    /// True for faults that only affect a single inbound line
    pub fn is_frame_fault(&self) -> bool {
        matches!(
            self,
            Self::EmptyFrame
                | Self::FrameFieldCount { .. }
                | Self::FrameField { .. }
                | Self::FrameEncoding
                | Self::FrameTooLong { .. }
        )
    }
}

// Allow converting from String to TerrariumError
impl From<String> for TerrariumError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to TerrariumError
impl From<&str> for TerrariumError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
