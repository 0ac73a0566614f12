//! Binary serialization and matrix readout of a recorded trace.
//!
//! # File format
//!
//! 1. **Magic bytes**: `TLG1` (4 bytes)
//! 2. **Version**: `u32` little-endian
//! 3. **Field count**: `u32`, then that many NUL-terminated header fields
//!    (markers included)
//! 4. **Section sizes**: `u32` integer-channel count, `u32` float-channel
//!    count, `u64` row count
//! 5. **Rows**: fixed-width `[time: f32, ints: i64 …, floats: f64 …]`, all
//!    little-endian

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::DMatrix;

use crate::error::{Result, TelemetryError};
use crate::recorder::{Recorder, START_COLUMNS, START_CONSTANTS, START_DATA};

/// Magic bytes identifying a telemetry file.
pub const MAGIC: [u8; 4] = *b"TLG1";

/// Current format version.
pub const VERSION: u32 = 1;

/// A fully decoded trace: header fields plus a time-anchored value matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryLog {
    /// Header field list, markers included.
    pub header: Vec<String>,
    /// One row per snapshot; column 0 is time, then integer channels cast to
    /// `f64`, then float channels.
    pub matrix: DMatrix<f64>,
}

impl TelemetryLog {
    /// The column names (`time` first), without markers.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        let start = self
            .header
            .iter()
            .position(|f| f == START_COLUMNS)
            .map_or(0, |i| i + 1);
        let end = self
            .header
            .iter()
            .position(|f| f == START_DATA)
            .unwrap_or(self.header.len());
        &self.header[start..end]
    }

    /// The recorded constants as `(name, value)` pairs.
    #[must_use]
    pub fn constants(&self) -> Vec<(&str, &str)> {
        let start = self
            .header
            .iter()
            .position(|f| f == START_CONSTANTS)
            .map_or(0, |i| i + 1);
        let end = self
            .header
            .iter()
            .position(|f| f == START_COLUMNS)
            .unwrap_or(start);
        self.header[start..end]
            .iter()
            .filter_map(|f| f.split_once('='))
            .collect()
    }

    /// Write the text dump: comma-separated constants, a blank line, then the
    /// comma-separated column names and CSV rows.
    pub fn write_txt<W: Write>(&self, writer: &mut W) -> Result<()> {
        let constants: Vec<String> = self
            .constants()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        writeln!(writer, "{}", constants.join(", "))?;
        writeln!(writer)?;
        writeln!(writer, "{}", self.columns().join(", "))?;
        for i in 0..self.matrix.nrows() {
            let row: Vec<String> = self.matrix.row(i).iter().map(|v| format!("{v}")).collect();
            writeln!(writer, "{}", row.join(", "))?;
        }
        Ok(())
    }

    /// Write the text dump to a file.
    pub fn write_txt_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_txt(&mut writer)
    }
}

impl Recorder {
    /// Decode the recorded rows into a [`TelemetryLog`].
    #[must_use]
    pub fn log(&self) -> TelemetryLog {
        let n_ints = self.int_names.len();
        let n_floats = self.float_names.len();
        let row_bytes = self.row_bytes();

        let mut values = Vec::with_capacity(self.rows() * (1 + n_ints + n_floats));
        for chunk in &self.chunks {
            decode_rows(chunk, n_ints, n_floats, row_bytes, &mut values);
        }

        TelemetryLog {
            header: self.header(),
            matrix: DMatrix::from_row_slice(self.rows(), 1 + n_ints + n_floats, &values),
        }
    }

    /// Write the trace in binary form.
    pub fn write_binary_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;

        let header = self.header();
        #[allow(clippy::cast_possible_truncation)]
        writer.write_all(&(header.len() as u32).to_le_bytes())?;
        for field in &header {
            writer.write_all(field.as_bytes())?;
            writer.write_all(&[0])?;
        }

        #[allow(clippy::cast_possible_truncation)]
        writer.write_all(&(self.int_names.len() as u32).to_le_bytes())?;
        #[allow(clippy::cast_possible_truncation)]
        writer.write_all(&(self.float_names.len() as u32).to_le_bytes())?;
        writer.write_all(&(self.rows() as u64).to_le_bytes())?;

        for chunk in &self.chunks {
            writer.write_all(chunk)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the trace to a binary file.
    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_binary_to(&mut writer)
    }

    /// Read a binary trace back.
    pub fn read_binary_from<R: Read>(reader: &mut R) -> Result<TelemetryLog> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(TelemetryError::InvalidMagic(magic));
        }
        let version = read_u32(reader)?;
        if version != VERSION {
            return Err(TelemetryError::UnsupportedVersion(version));
        }

        let n_fields = read_u32(reader)? as usize;
        let mut header = Vec::with_capacity(n_fields);
        for _ in 0..n_fields {
            header.push(read_nul_string(reader)?);
        }

        let n_ints = read_u32(reader)? as usize;
        let n_floats = read_u32(reader)? as usize;
        let n_rows = usize::try_from(read_u64(reader)?)
            .map_err(|_| TelemetryError::MalformedHeader("row count overflow".into()))?;

        let row_bytes = 4 + 8 * n_ints + 8 * n_floats;
        let mut raw = vec![0u8; n_rows * row_bytes];
        reader.read_exact(&mut raw)?;

        let mut values = Vec::with_capacity(n_rows * (1 + n_ints + n_floats));
        decode_rows(&raw, n_ints, n_floats, row_bytes, &mut values);

        Ok(TelemetryLog {
            header,
            matrix: DMatrix::from_row_slice(n_rows, 1 + n_ints + n_floats, &values),
        })
    }

    /// Read a binary trace file.
    pub fn read_binary(path: impl AsRef<Path>) -> Result<TelemetryLog> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_binary_from(&mut reader)
    }
}

fn decode_rows(bytes: &[u8], n_ints: usize, n_floats: usize, row_bytes: usize, out: &mut Vec<f64>) {
    for row in bytes.chunks_exact(row_bytes) {
        let mut offset = 0;
        let time = f32::from_le_bytes([row[0], row[1], row[2], row[3]]);
        out.push(f64::from(time));
        offset += 4;
        for _ in 0..n_ints {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&row[offset..offset + 8]);
            #[allow(clippy::cast_precision_loss)]
            out.push(i64::from_le_bytes(buf) as f64);
            offset += 8;
        }
        for _ in 0..n_floats {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&row[offset..offset + 8]);
            out.push(f64::from_le_bytes(buf));
            offset += 8;
        }
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_nul_string<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }
    String::from_utf8(bytes)
        .map_err(|e| TelemetryError::MalformedHeader(format!("non-utf8 field: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_recorder() -> Recorder {
        let mut recorder = Recorder::new();
        recorder.register_constant("scenario", "drop-test").unwrap();
        let iter = recorder.register_int("iter").unwrap();
        let qz = recorder.register_float("base.trans_z").unwrap();
        let energy = recorder.register_float("energy").unwrap();
        recorder.start().unwrap();

        for i in 0..5 {
            recorder.set_int(iter, i);
            recorder.set_float(qz, 1.0 - 0.1 * i as f64);
            recorder.set_float(energy, 9.81 * (1.0 - 0.1 * i as f64));
            recorder.flush_snapshot(i as f64 * 1e-3).unwrap();
        }
        recorder
    }

    #[test]
    fn test_log_matrix_shape_and_time_column() {
        let log = sample_recorder().log();

        assert_eq!(log.matrix.nrows(), 5);
        assert_eq!(log.matrix.ncols(), 4);
        assert_eq!(log.columns(), &["time", "iter", "base.trans_z", "energy"]);
        for i in 0..5 {
            assert_relative_eq!(log.matrix[(i, 0)], i as f64 * 1e-3, epsilon = 1e-9);
            assert_eq!(log.matrix[(i, 1)], i as f64);
        }
    }

    #[test]
    fn test_binary_roundtrip_preserves_log() {
        let recorder = sample_recorder();
        let reference = recorder.log();

        let mut bytes = Vec::new();
        recorder.write_binary_to(&mut bytes).unwrap();
        let decoded = Recorder::read_binary_from(&mut bytes.as_slice()).unwrap();

        assert_eq!(decoded.header, reference.header);
        assert_eq!(decoded.matrix, reference.matrix);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = Vec::new();
        sample_recorder().write_binary_to(&mut bytes).unwrap();
        bytes[0] = b'X';

        assert!(matches!(
            Recorder::read_binary_from(&mut bytes.as_slice()),
            Err(TelemetryError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = Vec::new();
        sample_recorder().write_binary_to(&mut bytes).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());

        assert!(matches!(
            Recorder::read_binary_from(&mut bytes.as_slice()),
            Err(TelemetryError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_txt_dump_layout() {
        let log = sample_recorder().log();
        let mut out = Vec::new();
        log.write_txt(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), "scenario=drop-test");
        assert_eq!(lines.next().unwrap(), "");
        assert_eq!(lines.next().unwrap(), "time, iter, base.trans_z, energy");
        assert_eq!(lines.count(), 5);
    }

    #[test]
    fn test_constants_parsed() {
        let log = sample_recorder().log();
        assert_eq!(log.constants(), vec![("scenario", "drop-test")]);
    }
}
