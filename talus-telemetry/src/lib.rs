//! Time-indexed telemetry recording.
//!
//! A [`Recorder`] collects named integer and float channels plus one-off
//! constants, then appends one fixed-width row per published snapshot into
//! bounded in-memory chunks. The trace can be serialized to a binary file
//! (magic + version header, NUL-terminated field list, little-endian rows),
//! read back, or dumped as text. [`TelemetryLog`] is the decoded form:
//! header fields plus an `N × K` matrix whose first column is time.
//!
//! ```
//! use talus_telemetry::Recorder;
//!
//! let mut recorder = Recorder::new();
//! let energy = recorder.register_float("energy")?;
//! recorder.start()?;
//!
//! recorder.set_float(energy, 4.2);
//! recorder.flush_snapshot(0.0)?;
//!
//! let log = recorder.log();
//! assert_eq!(log.columns(), &["time", "energy"]);
//! assert_eq!(log.matrix.nrows(), 1);
//! # Ok::<(), talus_telemetry::TelemetryError>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]

mod error;
mod log;
mod recorder;

pub use error::{Result, TelemetryError};
pub use log::{TelemetryLog, MAGIC, VERSION};
pub use recorder::{
    FloatChannel, IntChannel, Recorder, START_COLUMNS, START_CONSTANTS, START_DATA, TIME_COLUMN,
};
