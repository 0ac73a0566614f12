//! Telemetry recorder: channel registry plus chunked row storage.
//!
//! Lifecycle: register constants and channels, then [`Recorder::start`], then
//! one [`Recorder::flush_snapshot`] per published sample. Rows are appended
//! to bounded in-memory chunks; a fresh chunk is opened when the current one
//! fills up, so a long run grows by chunk-sized allocations instead of
//! reallocating one giant buffer.
//!
//! # Row format
//!
//! Every row is fixed-width: `[time: f32 LE, ints: i64 LE …, floats: f64 LE …]`.
//! The header is a NUL-terminated field list with the constants block wrapped
//! in `START_CONSTANTS` / `START_COLUMNS` markers and the column names closed
//! by `START_DATA`.

use std::collections::HashSet;

use crate::error::{Result, TelemetryError};

/// Marker opening the constants block of a header.
pub const START_CONSTANTS: &str = "START_CONSTANTS";
/// Marker separating constants from column names.
pub const START_COLUMNS: &str = "START_COLUMNS";
/// Marker closing the column names, after which rows follow.
pub const START_DATA: &str = "START_DATA";

/// Name of the time column anchoring every trace.
pub const TIME_COLUMN: &str = "time";

/// Upper bound on the byte size of one storage chunk.
pub(crate) const MAX_CHUNK_BYTES: usize = 256 * 1024;

/// Handle to a registered integer channel.
#[derive(Debug, Clone, Copy)]
pub struct IntChannel(pub(crate) usize);

/// Handle to a registered float channel.
#[derive(Debug, Clone, Copy)]
pub struct FloatChannel(pub(crate) usize);

/// Telemetry recorder.
#[derive(Debug, Default)]
pub struct Recorder {
    pub(crate) constants: Vec<(String, String)>,
    pub(crate) int_names: Vec<String>,
    pub(crate) float_names: Vec<String>,
    ints: Vec<i64>,
    floats: Vec<f64>,
    pub(crate) chunks: Vec<Vec<u8>>,
    started: bool,
    names: HashSet<String>,
    rows: usize,
}

impl Recorder {
    /// Create an empty recorder, open for registration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constant, recorded once in the header.
    pub fn register_constant(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        if self.started {
            return Err(TelemetryError::RegistrationClosed);
        }
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(TelemetryError::DuplicateChannel(name));
        }
        self.constants.push((name, value.into()));
        Ok(())
    }

    /// Register an integer channel.
    pub fn register_int(&mut self, name: impl Into<String>) -> Result<IntChannel> {
        if self.started {
            return Err(TelemetryError::RegistrationClosed);
        }
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(TelemetryError::DuplicateChannel(name));
        }
        self.int_names.push(name);
        self.ints.push(0);
        Ok(IntChannel(self.ints.len() - 1))
    }

    /// Register a float channel.
    pub fn register_float(&mut self, name: impl Into<String>) -> Result<FloatChannel> {
        if self.started {
            return Err(TelemetryError::RegistrationClosed);
        }
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(TelemetryError::DuplicateChannel(name));
        }
        self.float_names.push(name);
        self.floats.push(0.0);
        Ok(FloatChannel(self.floats.len() - 1))
    }

    /// Close registration and begin recording.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(TelemetryError::RegistrationClosed);
        }
        self.started = true;
        self.chunks.clear();
        self.rows = 0;
        Ok(())
    }

    /// Whether recording has started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Update the current value of an integer channel.
    pub fn set_int(&mut self, channel: IntChannel, value: i64) {
        self.ints[channel.0] = value;
    }

    /// Update the current value of a float channel.
    pub fn set_float(&mut self, channel: FloatChannel, value: f64) {
        self.floats[channel.0] = value;
    }

    /// Byte width of one row.
    #[must_use]
    pub fn row_bytes(&self) -> usize {
        4 + 8 * self.ints.len() + 8 * self.floats.len()
    }

    /// Number of recorded rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append one row holding the current channel values at time `t`.
    pub fn flush_snapshot(&mut self, t: f64) -> Result<()> {
        if !self.started {
            return Err(TelemetryError::NotStarted);
        }

        let row_bytes = self.row_bytes();
        let need_new_chunk = match self.chunks.last() {
            None => true,
            Some(chunk) => chunk.len() + row_bytes > MAX_CHUNK_BYTES,
        };
        if need_new_chunk {
            let rows_per_chunk = (MAX_CHUNK_BYTES / row_bytes).max(1);
            self.chunks.push(Vec::with_capacity(rows_per_chunk * row_bytes));
        }

        let chunk = self
            .chunks
            .last_mut()
            .ok_or(TelemetryError::NotStarted)?;
        #[allow(clippy::cast_possible_truncation)]
        chunk.extend_from_slice(&(t as f32).to_le_bytes());
        for value in &self.ints {
            chunk.extend_from_slice(&value.to_le_bytes());
        }
        for value in &self.floats {
            chunk.extend_from_slice(&value.to_le_bytes());
        }
        self.rows += 1;
        Ok(())
    }

    /// The full header field list, markers included.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(
            3 + self.constants.len() + 1 + self.int_names.len() + self.float_names.len(),
        );
        header.push(START_CONSTANTS.to_owned());
        for (name, value) in &self.constants {
            header.push(format!("{name}={value}"));
        }
        header.push(START_COLUMNS.to_owned());
        header.push(TIME_COLUMN.to_owned());
        header.extend(self.int_names.iter().cloned());
        header.extend(self.float_names.iter().cloned());
        header.push(START_DATA.to_owned());
        header
    }
}
