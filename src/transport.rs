//! Fixed-size records on a byte stream.
//!
//! ```text
//! record := brightness (1 byte) || packed frame (width * height / 8 bytes)
//! ```
//!
//! Records follow each other with no header or delimiter; both ends agree on
//! the geometry out of band. The reader side blocks on the stream and
//! publishes every complete record into a [`FrameState`]; the writer side is
//! what a client uses to feed the driver.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::codec::{CodecError, PackedFrame};
use crate::geometry::PanelGeometry;
use crate::state::FrameState;

/// Result of one [`RecordReader::read_record`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete record
    Record {
        /// Brightness byte
        brightness: u8,
        /// Packed frame
        frame: PackedFrame,
    },
    /// The stream ended cleanly at a record boundary
    Closed,
    /// The stream ended inside a record
    Truncated {
        /// Bytes of the incomplete record that did arrive
        received: usize,
    },
}

/// How the input side finished.
#[derive(Debug)]
pub enum InputEnd {
    /// End of stream at a record boundary
    Closed,
    /// End of stream inside a record; the partial record was discarded
    Truncated {
        /// Bytes of the incomplete record
        received: usize,
    },
    /// The stop flag was raised before the next read
    Stopped,
    /// A read failed
    Failed(io::Error),
}

/// What the input side did before it finished.
#[derive(Debug)]
pub struct ReaderSummary {
    /// Complete records published
    pub records: u64,
    /// Why reading stopped
    pub end: InputEnd,
}

impl ReaderSummary {
    /// Whether the input ended in a way that counts as a clean shutdown: at
    /// least one record arrived and the stream was closed (or the driver was
    /// asked to stop).
    #[must_use]
    pub fn is_clean(&self) -> bool {
        match self.end {
            InputEnd::Closed | InputEnd::Truncated { .. } => self.records > 0,
            InputEnd::Stopped => true,
            InputEnd::Failed(_) => false,
        }
    }
}

/// Reads whole records from a stream.
#[derive(Debug)]
pub struct RecordReader<R> {
    input: R,
    geometry: PanelGeometry,
    buffer: Vec<u8>,
}

impl<R: Read> RecordReader<R> {
    /// Wrap `input` for records of `geometry`.
    pub fn new(input: R, geometry: PanelGeometry) -> Self {
        Self {
            input,
            geometry,
            buffer: vec![0; geometry.record_size()],
        }
    }

    /// Block until a whole record has been read or the stream ends.
    ///
    /// # Errors
    ///
    /// Returns any read error other than [`ErrorKind::Interrupted`], which is
    /// retried.
    pub fn read_record(&mut self) -> io::Result<ReadOutcome> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.input.read(&mut self.buffer[filled..]) {
                Ok(0) => {
                    return Ok(if filled == 0 {
                        ReadOutcome::Closed
                    } else {
                        ReadOutcome::Truncated { received: filled }
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        let brightness = self.buffer[0];
        let frame = PackedFrame::from_bytes(self.geometry, self.buffer[1..].to_vec())
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        Ok(ReadOutcome::Record { brightness, frame })
    }

    /// Give the stream back.
    pub fn into_inner(self) -> R {
        self.input
    }
}

/// Publish every record of `input` into `state` until the stream ends or
/// `stop` is raised.
///
/// `stop` is checked before each read. A read that is already blocked is not
/// interrupted by it. Raising `stop` once the input is done is left to the
/// caller, so it can hand the summary over first.
pub fn pump<R: Read>(
    input: R,
    geometry: PanelGeometry,
    state: &FrameState,
    stop: &AtomicBool,
) -> ReaderSummary {
    let mut reader = RecordReader::new(input, geometry);
    let mut records = 0u64;
    let end = loop {
        if stop.load(Ordering::Acquire) {
            break InputEnd::Stopped;
        }
        match reader.read_record() {
            Ok(ReadOutcome::Record { brightness, frame }) => {
                let sequence = state.publish(brightness, frame);
                if records == 0 {
                    info!(brightness, "first frame received");
                }
                records += 1;
                debug!(sequence, brightness, "published frame");
            }
            Ok(ReadOutcome::Closed) => break InputEnd::Closed,
            Ok(ReadOutcome::Truncated { received }) => {
                warn!(
                    received,
                    expected = geometry.record_size(),
                    "input closed inside a record, discarding it"
                );
                break InputEnd::Truncated { received };
            }
            Err(e) => break InputEnd::Failed(e),
        }
    };
    info!(records, end = ?end, "input finished");
    ReaderSummary { records, end }
}

/// Write one record.
///
/// # Errors
///
/// Returns the writer's error, or [`ErrorKind::InvalidInput`] wrapping a
/// [`CodecError::SizeMismatch`] when `frame` does not belong to `geometry`.
pub fn write_record<W: Write>(
    output: &mut W,
    geometry: &PanelGeometry,
    brightness: u8,
    frame: &PackedFrame,
) -> io::Result<()> {
    if frame.as_bytes().len() != geometry.packed_size() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            CodecError::SizeMismatch {
                expected: geometry.packed_size(),
                actual: frame.as_bytes().len(),
            },
        ));
    }
    output.write_all(&[brightness])?;
    output.write_all(frame.as_bytes())?;
    output.flush()
}
