//! Assignment of panel signals to GPIO lines.
//!
//! The panel takes eight parallel column-data signals, a shift clock, a
//! latch strobe, an active-low output enable and a binary row address. The
//! defaults below use BCM numbering; the data lines are the ones the panel
//! has always been wired to.

use thiserror::Error;

use crate::geometry::PanelGeometry;
use crate::mask::{line_mask, REGISTER_WIDTH};

/// Column-data lines, indexed by bit position within a packed byte
pub const DATA_LINES: [u8; 8] = [20, 21, 26, 16, 19, 13, 6, 5];

/// Shift clock
pub const CLOCK_LINE: u8 = 27;

/// Latch strobe
pub const LATCH_LINE: u8 = 22;

/// Output enable, active low
pub const OUTPUT_ENABLE_LINE: u8 = 4;

/// Row address lines A, B, C, D, E, F (least significant first)
pub const ADDRESS_LINES: [u8; 6] = [17, 18, 23, 24, 25, 12];

/// Errors in a line assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    /// A line number does not fit the SET/CLR registers.
    #[error("GPIO line {0} is outside the 32-bit output register")]
    LineOutOfRange(u8),
    /// Two signals share one line.
    #[error("GPIO line {0} is assigned twice")]
    DuplicateLine(u8),
    /// The geometry has more rows than the address lines can select.
    #[error("{rows} rows need {needed} row-address lines but only {wired} are wired")]
    TooManyRows {
        /// Rows to scan
        rows: usize,
        /// Address lines required
        needed: usize,
        /// Address lines available
        wired: usize,
    },
}

/// Fail on any line that is out of range or appears twice.
pub(crate) fn check_lines(lines: &[u8]) -> Result<(), WiringError> {
    let mut seen = 0u32;
    for &line in lines {
        if line >= REGISTER_WIDTH {
            return Err(WiringError::LineOutOfRange(line));
        }
        if seen & (1 << line) != 0 {
            return Err(WiringError::DuplicateLine(line));
        }
        seen |= 1 << line;
    }
    Ok(())
}

/// Number of address lines needed to select one of `rows` rows.
#[must_use]
pub const fn address_bits(rows: usize) -> usize {
    if rows <= 1 {
        0
    } else {
        (usize::BITS - (rows - 1).leading_zeros()) as usize
    }
}

/// Full line assignment of one panel chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wiring {
    /// Column-data lines by bit position
    pub data: [u8; 8],
    /// Shift clock line
    pub clock: u8,
    /// Latch strobe line
    pub latch: u8,
    /// Output enable line (active low)
    pub output_enable: u8,
    /// Row address lines, least significant first
    pub address: Vec<u8>,
}

impl Default for Wiring {
    fn default() -> Self {
        Self {
            data: DATA_LINES,
            clock: CLOCK_LINE,
            latch: LATCH_LINE,
            output_enable: OUTPUT_ENABLE_LINE,
            address: ADDRESS_LINES.to_vec(),
        }
    }
}

impl Wiring {
    /// Every line this wiring drives
    #[must_use]
    pub fn all_lines(&self) -> Vec<u8> {
        let mut lines = self.data.to_vec();
        lines.extend([self.clock, self.latch, self.output_enable]);
        lines.extend(&self.address);
        lines
    }

    /// Validate the assignment against a geometry.
    ///
    /// # Errors
    ///
    /// Returns a [`WiringError`] on an out-of-range or shared line, or when
    /// the geometry has more rows than the address lines can select.
    pub fn check(&self, geometry: &PanelGeometry) -> Result<(), WiringError> {
        let needed = address_bits(geometry.height());
        if needed > self.address.len() {
            return Err(WiringError::TooManyRows {
                rows: geometry.height(),
                needed,
                wired: self.address.len(),
            });
        }
        check_lines(&self.all_lines())
    }

    /// Mask of the shift clock line
    #[must_use]
    pub const fn clock_mask(&self) -> u32 {
        1 << self.clock
    }

    /// Mask of the latch line
    #[must_use]
    pub const fn latch_mask(&self) -> u32 {
        1 << self.latch
    }

    /// Mask of the output enable line
    #[must_use]
    pub const fn output_enable_mask(&self) -> u32 {
        1 << self.output_enable
    }

    /// Mask of all row address lines
    #[must_use]
    pub fn address_mask(&self) -> u32 {
        line_mask(u32::MAX, &self.address)
    }

    /// SET pattern that drives the address lines to `row`
    #[must_use]
    pub fn row_mask(&self, row: usize) -> u32 {
        line_mask(u32::try_from(row).unwrap_or(u32::MAX), &self.address)
    }

    /// Mask of every driven line
    #[must_use]
    pub fn all_mask(&self) -> u32 {
        line_mask(u32::MAX, &self.all_lines())
    }
}
