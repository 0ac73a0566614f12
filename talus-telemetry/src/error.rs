//! Error types for telemetry recording and readback.

use thiserror::Error;

/// Errors raised by the telemetry layer.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Channel registration is closed once recording has started.
    #[error("telemetry recording already started, registration is closed")]
    RegistrationClosed,

    /// Recording must be started before flushing snapshots.
    #[error("telemetry recording not started")]
    NotStarted,

    /// Channel names must be unique.
    #[error("duplicate telemetry channel: {0}")]
    DuplicateChannel(String),

    /// A file did not start with the expected magic bytes.
    #[error("invalid telemetry magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// A file was written by an unsupported format version.
    #[error("unsupported telemetry version: {0}")]
    UnsupportedVersion(u32),

    /// The header section could not be parsed.
    #[error("malformed telemetry header: {0}")]
    MalformedHeader(String),

    /// Underlying I/O failure.
    #[error("telemetry i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;
