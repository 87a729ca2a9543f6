//! The scan loop.
//!
//! The panel only ever lights one row at a time. Every row slot the
//! renderer
//!
//! 1. drives the row address lines to the row number,
//! 2. streams the row's packed bytes onto the eight data lines, one
//!    [`BitMaskTable`] lookup and one SET/CLR pair per byte, pulsing the
//!    shift clock after each,
//! 3. pulses the latch so the shifted bytes reach the LED drivers,
//! 4. pulls output enable low for `slot * brightness / 255`, cut short at
//!    the end of the slot, and then blanks for the rest of it.
//!
//! Step 4 is the only grayscale mechanism: one bit-plane shown for a
//! brightness-dependent share of each slot. A full pass over all rows takes
//! `1 / refresh_rate` seconds whatever the brightness. The current snapshot
//! is loaded afresh for every row, so a frame published mid-pass shows up
//! from the next row on.
//!
//! Nothing in here can fail once the renderer is built; the loop only ends
//! when the stop flag is seen after a full pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::info;

use crate::geometry::PanelGeometry;
use crate::lines::OutputLines;
use crate::mask::BitMaskTable;
use crate::state::{FrameState, Snapshot};
use crate::wiring::{Wiring, WiringError};

/// Full panel passes per second unless configured otherwise.
pub const DEFAULT_REFRESH_HZ: u32 = 200;

/// Shortest row slot for which every brightness step still changes the
/// on-time by at least a nanosecond.
pub const MIN_ROW_SLOT: Duration = Duration::from_nanos(255);

/// Waits shorter than this are spun instead of slept.
const SPIN_THRESHOLD: Duration = Duration::from_micros(200);

/// Errors in the refresh timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimingError {
    /// A refresh rate of zero.
    #[error("the refresh rate must be at least 1 Hz")]
    ZeroRate,
    /// The rate leaves less than [`MIN_ROW_SLOT`] per row.
    #[error("{refresh_hz} Hz over {rows} rows leaves less than 255 ns per row")]
    TooFast {
        /// Requested rate
        refresh_hz: u32,
        /// Rows per pass
        rows: usize,
    },
}

/// On-time of a row for `brightness` within a slot of `slot`.
///
/// Strictly increasing in `brightness` for any slot of at least
/// [`MIN_ROW_SLOT`], zero at brightness 0 and exactly `slot` at 255.
#[must_use]
pub fn illumination(slot: Duration, brightness: u8) -> Duration {
    let nanos = slot.as_nanos() * u128::from(brightness) / 255;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Row slot length derived from a refresh rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    refresh_hz: u32,
    row_slot: Duration,
}

impl ScanTiming {
    /// Timing for `refresh_hz` full passes per second over `geometry`.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError::ZeroRate`] for 0 Hz and
    /// [`TimingError::TooFast`] when a row slot would be shorter than
    /// [`MIN_ROW_SLOT`].
    pub fn new(refresh_hz: u32, geometry: &PanelGeometry) -> Result<Self, TimingError> {
        if refresh_hz == 0 {
            return Err(TimingError::ZeroRate);
        }
        let rows = geometry.height();
        let too_fast = TimingError::TooFast { refresh_hz, rows };
        let slots_per_second = u64::from(refresh_hz)
            .checked_mul(u64::try_from(rows).map_err(|_| too_fast)?)
            .ok_or(too_fast)?;
        let row_slot = Duration::from_nanos(1_000_000_000 / slots_per_second);
        if row_slot < MIN_ROW_SLOT {
            return Err(too_fast);
        }
        Ok(Self {
            refresh_hz,
            row_slot,
        })
    }

    /// Target passes per second
    #[must_use]
    pub const fn refresh_hz(&self) -> u32 {
        self.refresh_hz
    }

    /// Time given to each row
    #[must_use]
    pub const fn row_slot(&self) -> Duration {
        self.row_slot
    }

    /// On-time of a row at `brightness`
    #[must_use]
    pub fn illumination(&self, brightness: u8) -> Duration {
        illumination(self.row_slot, brightness)
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    /// Full passes completed
    pub passes: u64,
    /// Time spent in the loop
    pub elapsed: Duration,
    /// Sequence number of the last snapshot drawn
    pub last_sequence: u64,
}

impl RenderStats {
    /// Achieved passes per second
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn refresh_rate(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds == 0.0 {
            0.0
        } else {
            self.passes as f64 / seconds
        }
    }
}

/// Sleep for the bulk of the wait and spin for the last stretch.
fn wait_until(deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;
        if remaining > SPIN_THRESHOLD {
            thread::sleep(remaining - SPIN_THRESHOLD);
        } else {
            core::hint::spin_loop();
        }
    }
}

/// Drives a panel from a [`FrameState`] through borrowed output lines.
pub struct Renderer<'a, L: OutputLines> {
    lines: &'a mut L,
    geometry: PanelGeometry,
    timing: ScanTiming,
    table: BitMaskTable,
    clock: u32,
    latch: u32,
    output_enable: u32,
    address: u32,
    row_masks: Vec<u32>,
}

impl<'a, L: OutputLines> Renderer<'a, L> {
    /// Build a renderer and blank the panel.
    ///
    /// # Errors
    ///
    /// Returns a [`WiringError`] if `wiring` does not fit `geometry`.
    pub fn new(
        lines: &'a mut L,
        geometry: PanelGeometry,
        wiring: &Wiring,
        timing: ScanTiming,
    ) -> Result<Self, WiringError> {
        wiring.check(&geometry)?;
        let table = BitMaskTable::new(wiring.data)?;
        let row_masks = (0..geometry.height()).map(|row| wiring.row_mask(row)).collect();
        let mut renderer = Self {
            lines,
            geometry,
            timing,
            table,
            clock: wiring.clock_mask(),
            latch: wiring.latch_mask(),
            output_enable: wiring.output_enable_mask(),
            address: wiring.address_mask(),
            row_masks,
        };
        renderer.blank();
        Ok(renderer)
    }

    /// Geometry being scanned
    #[must_use]
    pub const fn geometry(&self) -> &PanelGeometry {
        &self.geometry
    }

    /// Timing in use
    #[must_use]
    pub const fn timing(&self) -> &ScanTiming {
        &self.timing
    }

    /// Turn the LEDs off (output enable high).
    #[inline]
    pub fn blank(&mut self) {
        self.lines.set(self.output_enable);
    }

    #[inline]
    fn enable(&mut self) {
        self.lines.clear(self.output_enable);
    }

    /// Drive the address lines to `row`.
    #[inline]
    pub fn select_row(&mut self, row: usize) {
        let mask = self.row_masks[row];
        self.lines.clear(self.address & !mask);
        self.lines.set(mask);
    }

    /// Stream packed bytes onto the data lines, one clock pulse per byte.
    #[inline]
    pub fn shift_columns(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.lines.set(self.table.get(byte));
            self.lines.clear(self.table.clear_mask(byte));
            self.lines.set(self.clock);
            self.lines.clear(self.clock);
        }
    }

    /// Move the shifted bytes to the LED drivers.
    #[inline]
    pub fn latch(&mut self) {
        self.lines.set(self.latch);
        self.lines.clear(self.latch);
    }

    /// Light the latched row for `on`, then blank until the slot that began
    /// at `slot_start` is over.
    ///
    /// The lit time never runs past the end of the slot, so time spent
    /// shifting comes out of the on-time and the slot length stays fixed.
    pub fn illuminate(&mut self, on: Duration, slot_start: Instant) {
        let slot_end = slot_start + self.timing.row_slot;
        if !on.is_zero() {
            let lit_until = (Instant::now() + on).min(slot_end);
            self.enable();
            wait_until(lit_until);
        }
        self.blank();
        wait_until(slot_end);
    }

    /// Draw one row of `snapshot` in the slot starting at `slot_start`.
    pub fn scan_row(&mut self, row: usize, snapshot: &Snapshot, slot_start: Instant) {
        self.select_row(row);
        self.shift_columns(snapshot.frame.row(&self.geometry, row));
        self.latch();
        self.illuminate(self.timing.illumination(snapshot.brightness), slot_start);
    }

    /// One full pass over every row. Returns the sequence number of the
    /// snapshot used for the last row.
    ///
    /// Slots are laid out back to back from the start of the pass, so a row
    /// that overruns is made up by the rows after it.
    pub fn refresh(&mut self, state: &FrameState) -> u64 {
        let pass_start = Instant::now();
        let mut slot_start = pass_start;
        let mut sequence = 0;
        for row in 0..self.geometry.height() {
            let snapshot = state.load();
            self.scan_row(row, &snapshot, slot_start);
            sequence = snapshot.sequence;
            slot_start += self.timing.row_slot;
        }
        sequence
    }

    /// Refresh until `stop` is seen after a pass. The panel is left blank.
    pub fn run(&mut self, state: &FrameState, stop: &AtomicBool) -> RenderStats {
        info!(
            refresh_hz = self.timing.refresh_hz,
            row_slot_ns = self.timing.row_slot.as_nanos(),
            rows = self.geometry.height(),
            "scan loop starting"
        );
        let started = Instant::now();
        let mut passes = 0;
        let mut last_sequence;
        loop {
            last_sequence = self.refresh(state);
            passes += 1;
            if stop.load(Ordering::Acquire) {
                break;
            }
        }
        self.blank();
        let stats = RenderStats {
            passes,
            elapsed: started.elapsed(),
            last_sequence,
        };
        info!(
            passes = stats.passes,
            refresh_rate = format_args!("{:.1}", stats.refresh_rate()),
            last_sequence,
            "scan loop stopped"
        );
        stats
    }
}

impl<L: OutputLines> core::fmt::Debug for Renderer<'_, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Renderer")
            .field("geometry", &self.geometry)
            .field("timing", &self.timing)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
