//! Memory-mapped GPIO registers of the BCM283x family.
//!
//! `/dev/gpiomem` exposes the GPIO register block to unprivileged members of
//! the `gpio` group. The block is laid out as 32-bit words:
//!
//! | word  | register  | use                                           |
//! |-------|-----------|-----------------------------------------------|
//! | 0..=5 | GPFSEL0-5 | 3-bit function select, ten lines per register |
//! | 7     | GPSET0    | writing 1 raises lines 0-31                   |
//! | 10    | GPCLR0    | writing 1 lowers lines 0-31                   |
//! | 13    | GPLEV0    | current level of lines 0-31                   |
//!
//! SET and CLR only act on the bits written as 1, so a whole group of lines
//! changes with one store and no read-modify-write.
//!
//! # Safety
//! The mapping is accessed with volatile loads and stores through raw
//! pointers derived from the [`MmapMut`]. Offsets are constants inside the
//! mapped page, and the mapping lives as long as the [`GpioMem`].

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use bitfield::bitfield;
use memmap2::{MmapMut, MmapOptions};
use thiserror::Error;
use tracing::{debug, info};

use crate::lines::OutputLines;
use crate::wiring::{check_lines, Wiring, WiringError};

/// Default device node
pub const GPIO_MEM_PATH: &str = "/dev/gpiomem";

/// Bytes mapped from the device, one page
const BLOCK_SIZE: usize = 4096;

const FUNCTION_SELECT_OFFSET: usize = 0;
const SET_OFFSET: usize = 7;
const CLEAR_OFFSET: usize = 10;
const LEVEL_OFFSET: usize = 13;

/// Lines per function select register
const LINES_PER_SELECT: u8 = 10;

/// Pin function codes of a GPFSEL field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Function {
    /// Input, the reset state of every line
    Input = 0b000,
    /// Push-pull output
    Output = 0b001,
}

bitfield! {
    /// One GPFSEL register.
    ///
    /// Ten 3-bit fields; field `n` holds the function of line
    /// `10 * register + n`. Bits 31-30 are reserved.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    struct FunctionSelect(u32);
    impl Debug;
    u8, function, set_function: 2, 0, 10;
}

impl FunctionSelect {
    /// Return a copy with line slot `slot` set to `function`.
    #[must_use]
    fn with(mut self, slot: usize, function: Function) -> Self {
        self.set_function(slot, function as u8);
        self
    }
}

/// Failure to acquire the GPIO registers.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// The line assignment cannot be driven.
    #[error(transparent)]
    Wiring(#[from] WiringError),
    /// The device node could not be opened.
    #[error("cannot open {path} for reading and writing: {source}")]
    Open {
        /// Device path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
    /// The register page could not be mapped.
    #[error("cannot map the GPIO registers from {path}: {source}")]
    Map {
        /// Device path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
}

/// Exclusive owner of the memory-mapped GPIO register block.
///
/// Opening configures every line of the [`Wiring`] as an output in its safe
/// state (output enable high, everything else low). Releasing, which also
/// happens on drop, puts the lines back in that state and restores the
/// function select registers found at open.
pub struct GpioMem {
    map: MmapMut,
    safe_mask: u32,
    drive_mask: u32,
    saved_selects: Vec<(usize, u32)>,
    released: bool,
}

impl GpioMem {
    /// Map the registers and claim the lines of `wiring`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Wiring`] for an out-of-range or shared line,
    /// before the device is touched. Otherwise returns a [`HardwareError`]
    /// when the device cannot be opened or mapped, typically for lack of
    /// permission or on a machine that is not a Raspberry Pi.
    pub fn open(path: &Path, wiring: &Wiring) -> Result<Self, HardwareError> {
        check_lines(&wiring.all_lines())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|source| HardwareError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        // SAFETY: the GPIO page is device memory that no other part of this
        // process maps, and it is only accessed through volatile operations.
        let map = unsafe { MmapOptions::new().len(BLOCK_SIZE).map_mut(&file) }.map_err(
            |source| HardwareError::Map {
                path: path.to_path_buf(),
                source,
            },
        )?;
        info!(path = %path.display(), "mapped GPIO registers");

        let lines = wiring.all_lines();
        let mut gpio = Self {
            map,
            safe_mask: wiring.output_enable_mask(),
            drive_mask: wiring.all_mask(),
            saved_selects: Vec::new(),
            released: false,
        };

        // levels first so no line glitches high when it turns into an output
        gpio.write_safe_levels();
        for register in 0..6 {
            let owned: Vec<u8> = lines
                .iter()
                .copied()
                .filter(|line| usize::from(line / LINES_PER_SELECT) == register)
                .collect();
            if owned.is_empty() {
                continue;
            }
            let original = gpio.read_word(FUNCTION_SELECT_OFFSET + register);
            gpio.saved_selects.push((register, original));
            let select = owned.iter().fold(FunctionSelect(original), |select, line| {
                select.with(usize::from(line % LINES_PER_SELECT), Function::Output)
            });
            debug!(register, from = original, to = select.0, "function select");
            gpio.write_word(FUNCTION_SELECT_OFFSET + register, select.0);
        }
        Ok(gpio)
    }

    /// Current levels of lines 0-31
    #[must_use]
    pub fn levels(&self) -> u32 {
        self.read_word(LEVEL_OFFSET)
    }

    fn write_safe_levels(&mut self) {
        self.write_word(SET_OFFSET, self.safe_mask);
        self.write_word(CLEAR_OFFSET, self.drive_mask & !self.safe_mask);
    }

    #[inline]
    fn read_word(&self, offset: usize) -> u32 {
        debug_assert!(offset * 4 < BLOCK_SIZE);
        // SAFETY: offset is one of the register constants, inside the
        // mapped page and 4-byte aligned since the page is.
        unsafe { self.map.as_ptr().cast::<u32>().add(offset).read_volatile() }
    }

    #[inline]
    fn write_word(&mut self, offset: usize, value: u32) {
        debug_assert!(offset * 4 < BLOCK_SIZE);
        // SAFETY: see `read_word`.
        unsafe {
            self.map
                .as_mut_ptr()
                .cast::<u32>()
                .add(offset)
                .write_volatile(value);
        }
    }
}

impl OutputLines for GpioMem {
    #[inline]
    fn set(&mut self, mask: u32) {
        self.write_word(SET_OFFSET, mask);
    }

    #[inline]
    fn clear(&mut self, mask: u32) {
        self.write_word(CLEAR_OFFSET, mask);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.write_safe_levels();
        let saved = core::mem::take(&mut self.saved_selects);
        for (register, value) in saved {
            self.write_word(FUNCTION_SELECT_OFFSET + register, value);
        }
        self.released = true;
        info!("released GPIO lines");
    }
}

impl Drop for GpioMem {
    fn drop(&mut self) {
        self.release();
    }
}

impl core::fmt::Debug for GpioMem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GpioMem")
            .field("drive_mask", &format_args!("{:#034b}", self.drive_mask))
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_select_construction() {
        let select = FunctionSelect::default();
        assert_eq!(select.0, 0);
        for slot in 0..10 {
            assert_eq!(select.function(slot), Function::Input as u8);
        }
    }

    #[test]
    fn test_function_select_slots() {
        let select = FunctionSelect(0).with(0, Function::Output);
        assert_eq!(select.0, 0b001);

        let select = FunctionSelect(0).with(9, Function::Output);
        assert_eq!(select.0, 0b001 << 27);

        let select = FunctionSelect(0)
            .with(2, Function::Output)
            .with(5, Function::Output);
        assert_eq!(select.0, (0b001 << 6) | (0b001 << 15));
    }

    #[test]
    fn test_function_select_preserves_other_slots() {
        // alternate functions on neighbouring lines must survive
        let original = (0b100 << 3) | (0b111 << 12);
        let select = FunctionSelect(original).with(2, Function::Output);
        assert_eq!(select.function(1), 0b100);
        assert_eq!(select.function(4), 0b111);
        assert_eq!(select.function(2), 0b001);

        let select = select.with(1, Function::Output);
        assert_eq!(select.function(1), 0b001);
        assert_eq!(select.function(4), 0b111);
    }

    #[test]
    fn test_function_select_default_register_two() {
        // register 2 as the panel was always configured: lines 20, 21, 26 and 27
        let select = [20u8, 21, 26, 27].iter().fold(FunctionSelect(0), |s, line| {
            s.with(usize::from(line % LINES_PER_SELECT), Function::Output)
        });
        assert_eq!(select.0, 0b0000_0000_0010_0100_0000_0000_0000_1001);
    }

    /// A zeroed register page in a scratch file, standing in for the device.
    fn register_file(name: &str, words: &[(usize, u32)]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "led-panel-sink-{}-{name}",
            std::process::id()
        ));
        let mut page = vec![0u8; BLOCK_SIZE];
        for &(offset, value) in words {
            page[offset * 4..offset * 4 + 4].copy_from_slice(&value.to_ne_bytes());
        }
        std::fs::write(&path, page).unwrap();
        path
    }

    fn word(page: &[u8], offset: usize) -> u32 {
        u32::from_ne_bytes(page[offset * 4..offset * 4 + 4].try_into().unwrap())
    }

    #[test]
    fn test_open_release_file_backed() {
        let wiring = Wiring::default();
        // lines 20-22 start in an alternate function
        let path = register_file("open-release", &[(FUNCTION_SELECT_OFFSET + 2, 0x124)]);

        let mut gpio = GpioMem::open(&path, &wiring).unwrap();
        // lines 20-27 are all driven
        assert_eq!(gpio.read_word(FUNCTION_SELECT_OFFSET + 2), 0x0024_9249);
        assert_eq!(gpio.read_word(SET_OFFSET), wiring.output_enable_mask());
        assert_eq!(
            gpio.read_word(CLEAR_OFFSET),
            wiring.all_mask() & !wiring.output_enable_mask()
        );

        gpio.set(1 << 20);
        assert_eq!(gpio.read_word(SET_OFFSET), 1 << 20);
        gpio.release();
        gpio.release();
        drop(gpio);

        let page = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(word(&page, FUNCTION_SELECT_OFFSET + 2), 0x124);
        assert_eq!(word(&page, FUNCTION_SELECT_OFFSET), 0);
        assert_eq!(word(&page, FUNCTION_SELECT_OFFSET + 1), 0);
        assert_eq!(word(&page, SET_OFFSET), 0x10);
        assert_eq!(word(&page, CLEAR_OFFSET), 0x0FFF_3060);
    }

    #[test]
    fn test_drop_restores_function_selects() {
        let path = register_file("drop", &[(FUNCTION_SELECT_OFFSET, 0x3F)]);
        let gpio = GpioMem::open(&path, &Wiring::default()).unwrap();
        // lines 4, 5 and 6 switched to outputs, lines 0 and 1 untouched
        assert_eq!(
            gpio.read_word(FUNCTION_SELECT_OFFSET),
            0x3F | (0b001 << 12) | (0b001 << 15) | (0b001 << 18)
        );
        drop(gpio);

        let page = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(word(&page, FUNCTION_SELECT_OFFSET), 0x3F);
    }

    #[test]
    fn test_open_rejects_bad_wiring_before_device() {
        let wiring = Wiring {
            clock: 40,
            ..Wiring::default()
        };
        // the path does not exist, so only validation can answer
        let result = GpioMem::open(Path::new("/nonexistent/gpiomem"), &wiring);
        assert!(matches!(
            result,
            Err(HardwareError::Wiring(WiringError::LineOutOfRange(40)))
        ));

        let shared = Wiring {
            latch: 20,
            ..Wiring::default()
        };
        assert!(matches!(
            GpioMem::open(Path::new("/nonexistent/gpiomem"), &shared),
            Err(HardwareError::Wiring(WiringError::DuplicateLine(20)))
        ));
    }

    #[test]
    fn test_open_missing_device() {
        let result = GpioMem::open(Path::new("/nonexistent/gpiomem"), &Wiring::default());
        match result {
            Err(HardwareError::Open { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/gpiomem"));
            }
            other => panic!("expected an open error, got {other:?}"),
        }
    }
}
