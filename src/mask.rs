//! Byte to GPIO register lookup table.
//!
//! The eight column-data signals of the panel are wired to eight arbitrary
//! GPIO lines. Driving them one bit at a time costs eight conditional
//! register writes per byte, which does not leave enough time in a row slot
//! on a Pi. The table collapses that to one lookup and one write per byte:
//! entry `b` is the value that, written to the SET register, raises exactly
//! the lines whose bit is set in `b`.
//!
//! ```rust
//! use led_panel_sink::mask::BitMaskTable;
//! use led_panel_sink::wiring::DATA_LINES;
//!
//! let table = BitMaskTable::new(DATA_LINES).unwrap();
//! // bit 0 is wired to GPIO 20
//! assert_eq!(table.get(0b0000_0001), 1 << 20);
//! assert_eq!(table.get(0), 0);
//! ```

use crate::wiring::{check_lines, WiringError};

/// Number of GPIO lines covered by one SET/CLR register.
pub const REGISTER_WIDTH: u8 = 32;

/// Register mask with one bit per line in `lines`, taking bit `p` of `value`
/// to line `lines[p]`.
///
/// Bits of `value` beyond `lines.len()` are ignored.
#[must_use]
pub fn line_mask(value: u32, lines: &[u8]) -> u32 {
    lines
        .iter()
        .enumerate()
        .filter(|(bit, _)| (value >> bit) & 1 == 1)
        .fold(0, |mask, (_, &line)| mask | (1 << line))
}

/// Immutable 256-entry table from a packed byte to a SET register pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct BitMaskTable {
    lines: [u8; 8],
    masks: [u32; 256],
}

impl BitMaskTable {
    /// Build the table for the given bit position → GPIO line mapping.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::LineOutOfRange`] if a line does not fit the
    /// 32-bit register and [`WiringError::DuplicateLine`] if two bit
    /// positions share a line.
    pub fn new(lines: [u8; 8]) -> Result<Self, WiringError> {
        check_lines(&lines)?;
        let mut masks = [0u32; 256];
        for (byte, mask) in (0u32..).zip(masks.iter_mut()) {
            *mask = line_mask(byte, &lines);
        }
        Ok(Self { lines, masks })
    }

    /// SET pattern for `byte`
    #[inline]
    #[must_use]
    pub fn get(&self, byte: u8) -> u32 {
        self.masks[usize::from(byte)]
    }

    /// CLR pattern for `byte`: the data lines that must go low.
    ///
    /// Writing `get(byte)` to SET and `clear_mask(byte)` to CLR leaves every
    /// data line in its intended state and touches no other line.
    #[inline]
    #[must_use]
    pub fn clear_mask(&self, byte: u8) -> u32 {
        !self.masks[usize::from(byte)] & self.data_mask()
    }

    /// All data lines
    #[inline]
    #[must_use]
    pub fn data_mask(&self) -> u32 {
        self.masks[255]
    }

    /// Line assignment the table was built from
    #[must_use]
    pub fn lines(&self) -> [u8; 8] {
        self.lines
    }

    /// Recover the byte that a register value encodes.
    ///
    /// Lines outside the data lines are ignored.
    #[must_use]
    pub fn decode(&self, register: u32) -> u8 {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, &line)| (register >> line) & 1 == 1)
            .fold(0u8, |byte, (bit, _)| byte | (1 << bit))
    }
}

impl core::fmt::Debug for BitMaskTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BitMaskTable")
            .field("lines", &self.lines)
            .field("data_mask", &format_args!("{:#034b}", self.data_mask()))
            .finish()
    }
}
