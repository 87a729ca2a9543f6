//! The output line seam between the renderer and the hardware.
//!
//! The renderer only ever raises or lowers groups of lines through
//! [`OutputLines`]. On a Pi that is [`crate::gpio::GpioMem`]; everywhere else
//! it is [`SimulatedLines`], which keeps the line levels in memory and can
//! record every write for inspection.

/// A bank of up to 32 output lines that can be raised and lowered in groups.
pub trait OutputLines {
    /// Raise every line set in `mask`.
    fn set(&mut self, mask: u32);

    /// Lower every line set in `mask`.
    fn clear(&mut self, mask: u32);

    /// Put every line in its safe state and give the lines back.
    ///
    /// Must be idempotent; it runs on every exit path, possibly twice.
    fn release(&mut self);
}

impl<T: OutputLines + ?Sized> OutputLines for &mut T {
    #[inline]
    fn set(&mut self, mask: u32) {
        (**self).set(mask);
    }

    #[inline]
    fn clear(&mut self, mask: u32) {
        (**self).clear(mask);
    }

    fn release(&mut self) {
        (**self).release();
    }
}

/// One write recorded by [`SimulatedLines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineWrite {
    /// Lines raised
    Set(u32),
    /// Lines lowered
    Clear(u32),
}

/// In-memory line controller.
#[derive(Debug, Default, Clone)]
pub struct SimulatedLines {
    levels: u32,
    writes: u64,
    history: Option<Vec<LineWrite>>,
    safe_levels: u32,
    released: bool,
}

impl SimulatedLines {
    /// A controller that only tracks the current levels.
    ///
    /// `safe_levels` are the levels `release` leaves the lines in; for the
    /// panel that is the output enable line high and everything else low.
    #[must_use]
    pub fn new(safe_levels: u32) -> Self {
        Self {
            levels: safe_levels,
            safe_levels,
            ..Self::default()
        }
    }

    /// A controller that additionally records every write.
    #[must_use]
    pub fn recording(safe_levels: u32) -> Self {
        Self {
            history: Some(Vec::new()),
            ..Self::new(safe_levels)
        }
    }

    /// Current line levels
    #[must_use]
    pub const fn levels(&self) -> u32 {
        self.levels
    }

    /// Number of writes since creation
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Recorded writes, empty unless built with [`SimulatedLines::recording`]
    #[must_use]
    pub fn history(&self) -> &[LineWrite] {
        self.history.as_deref().unwrap_or_default()
    }

    /// Drop the recorded writes, keeping the levels.
    pub fn take_history(&mut self) -> Vec<LineWrite> {
        self.history
            .as_mut()
            .map(core::mem::take)
            .unwrap_or_default()
    }

    /// Whether `release` has run
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    fn record(&mut self, write: LineWrite) {
        self.writes += 1;
        if let Some(history) = self.history.as_mut() {
            history.push(write);
        }
    }
}

impl OutputLines for SimulatedLines {
    fn set(&mut self, mask: u32) {
        self.levels |= mask;
        self.record(LineWrite::Set(mask));
    }

    fn clear(&mut self, mask: u32) {
        self.levels &= !mask;
        self.record(LineWrite::Clear(mask));
    }

    fn release(&mut self) {
        self.levels = self.safe_levels;
        self.released = true;
    }
}

/// Line controller that discards every write, for benchmarks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLines;

impl OutputLines for NullLines {
    #[inline]
    fn set(&mut self, mask: u32) {
        core::hint::black_box(mask);
    }

    #[inline]
    fn clear(&mut self, mask: u32) {
        core::hint::black_box(mask);
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clear_levels() {
        let mut lines = SimulatedLines::new(0);
        lines.set(0b1010);
        assert_eq!(lines.levels(), 0b1010);
        lines.clear(0b0010);
        assert_eq!(lines.levels(), 0b1000);
        lines.set(0b0001);
        assert_eq!(lines.levels(), 0b1001);
        assert_eq!(lines.writes(), 3);
        assert!(lines.history().is_empty());
    }

    #[test]
    fn test_recording() {
        let mut lines = SimulatedLines::recording(0);
        lines.set(1);
        lines.clear(1);
        assert_eq!(lines.history(), &[LineWrite::Set(1), LineWrite::Clear(1)]);
        assert_eq!(lines.take_history().len(), 2);
        assert!(lines.history().is_empty());
    }

    #[test]
    fn test_release_restores_safe_levels() {
        let mut lines = SimulatedLines::new(1 << 4);
        lines.clear(1 << 4);
        lines.set(0xFF00);
        assert!(!lines.is_released());
        lines.release();
        lines.release();
        assert!(lines.is_released());
        assert_eq!(lines.levels(), 1 << 4);
    }

    #[test]
    fn test_mut_ref_forwards() {
        let mut lines = SimulatedLines::new(0);
        {
            let mut borrowed = &mut lines;
            OutputLines::set(&mut borrowed, 0b11);
            OutputLines::clear(&mut borrowed, 0b01);
        }
        assert_eq!(lines.levels(), 0b10);
    }
}
