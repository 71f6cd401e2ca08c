//! Tape and capture-file I/O.
//!
//! Tapes load in one of two encodings: `alpha` (raw bytes, carriage returns
//! dropped) or `hex` (whitespace-separated two-digit bytes). Device output
//! saves as a hex dump, as sanitized ASCII or as the raw byte stream.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use comtran_core::io::IoState;
use thiserror::Error;

use crate::program::{self, ParseResult};

/// A failure while loading or saving a tape file.
#[derive(Debug, Error)]
pub enum TapeError {
    /// The file could not be read.
    #[error("unable to open {path}: {source}")]
    Read {
        /// The offending path.
        path: String,
        /// The underlying I/O failure.
        source: std::io::Error,
    },
    /// The file produced no bytes.
    #[error("no bytes parsed from {0}")]
    Empty(String),
    /// The file could not be written.
    #[error("unable to write {path}: {source}")]
    Write {
        /// The offending path.
        path: String,
        /// The underlying I/O failure.
        source: std::io::Error,
    },
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Load a tape file into the input channel.
///
/// The encoding follows `io.alpha_mode`: alpha tapes are raw bytes minus
/// `\r`, anything else parses as a hex byte stream. Loading rewinds the
/// read cursor and drops any pending interrupt.
///
/// # Errors
///
/// Fails when the file cannot be read or yields no bytes.
pub fn load_tape(path: &Path, io: &mut IoState) -> Result<ParseResult, TapeError> {
    let content = fs::read(path).map_err(|source| TapeError::Read {
        path: display(path),
        source,
    })?;

    let (bytes, result) = if io.alpha_mode {
        let bytes: Vec<u8> = content.into_iter().filter(|&c| c != b'\r').collect();
        let result = ParseResult {
            parsed: bytes.len(),
            skipped: 0,
        };
        (bytes, result)
    } else {
        program::parse_hex_stream(&String::from_utf8_lossy(&content))
    };

    if bytes.is_empty() {
        return Err(TapeError::Empty(display(path)));
    }

    io.input_data = bytes;
    io.input_pos = 0;
    io.interrupt = false;
    Ok(result)
}

/// Save the tape output channel, hex or ASCII per the display mode latches.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub fn save_tape(path: &Path, io: &IoState) -> Result<(), TapeError> {
    if io.alpha_mode {
        save_ascii(path, &io.output_data, true)
    } else {
        save_hex_dump(path, &io.output_data)
    }
}

/// Save a byte stream exactly, optionally terminated with a newline.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub fn save_bytes(path: &Path, data: &[u8], append_newline: bool) -> Result<(), TapeError> {
    let mut out = data.to_vec();
    if append_newline && out.last() != Some(&b'\n') {
        out.push(b'\n');
    }
    fs::write(path, out).map_err(|source| TapeError::Write {
        path: display(path),
        source,
    })
}

/// Save a byte stream as text: printable ASCII, `\n` and `\t` verbatim,
/// anything else replaced by `.` and `\r` dropped.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub fn save_ascii(path: &Path, data: &[u8], append_newline: bool) -> Result<(), TapeError> {
    let mut text = String::with_capacity(data.len());
    for &value in data {
        match value {
            b'\r' => {}
            b'\n' | b'\t' => text.push(char::from(value)),
            32..=126 => text.push(char::from(value)),
            _ => text.push('.'),
        }
    }
    if append_newline && !text.ends_with('\n') {
        text.push('\n');
    }
    fs::write(path, text).map_err(|source| TapeError::Write {
        path: display(path),
        source,
    })
}

/// Save a byte stream as uppercase two-digit hex, sixteen bytes per line.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub fn save_hex_dump(path: &Path, data: &[u8]) -> Result<(), TapeError> {
    let mut text = String::new();
    for (i, value) in data.iter().enumerate() {
        if i % 16 == 0 && i != 0 {
            text.push('\n');
        } else if i % 16 != 0 {
            text.push(' ');
        }
        let _ = write!(text, "{value:02X}");
    }
    text.push('\n');
    fs::write(path, text).map_err(|source| TapeError::Write {
        path: display(path),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("ct10-tape-{}-{name}", std::process::id()))
    }

    #[test]
    fn alpha_tape_strips_carriage_returns() {
        let path = scratch("alpha-in");
        fs::write(&path, b"AB\r\nCD").unwrap();

        let mut io = IoState::new();
        io.alpha_mode = true;
        let result = load_tape(&path, &mut io).unwrap();
        assert_eq!(io.input_data, b"AB\nCD");
        assert_eq!(result.parsed, 5);
        assert!(!io.interrupt);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn hex_tape_parses_tokens_and_counts_skips() {
        let path = scratch("hex-in");
        fs::write(&path, "41 0x42 zz\n43").unwrap();

        let mut io = IoState::new();
        io.hex_mode = true;
        let result = load_tape(&path, &mut io).unwrap();
        assert_eq!(io.input_data, vec![0x41, 0x42, 0x43]);
        assert_eq!(result.skipped, 1);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn empty_tape_is_an_error() {
        let path = scratch("empty-in");
        fs::write(&path, "zz\n").unwrap();

        let mut io = IoState::new();
        assert!(matches!(
            load_tape(&path, &mut io),
            Err(TapeError::Empty(_))
        ));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn hex_dump_wraps_at_sixteen_bytes() {
        let path = scratch("hex-out");
        let data: Vec<u8> = (0..18).collect();
        save_hex_dump(&path, &data).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00 01 02"));
        assert_eq!(lines[1], "10 11");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn ascii_save_sanitizes_control_bytes() {
        let path = scratch("ascii-out");
        save_ascii(&path, b"OK\x01\tend", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "OK.\tend\n");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn raw_save_preserves_bytes() {
        let path = scratch("raw-out");
        save_bytes(&path, &[0x00, 0xFF], false).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x00, 0xFF]);
        fs::remove_file(&path).unwrap();
    }
}
