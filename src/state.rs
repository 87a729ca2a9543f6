//! The most recently received frame, shared between the transport thread and
//! the renderer.
//!
//! Snapshots are immutable and reference counted. Publishing builds the new
//! [`Arc`] outside the lock and only swaps the pointer under it; loading
//! clones the pointer under the lock. Both are O(1) whatever the frame size,
//! so the writer never holds the renderer up for longer than a pointer swap
//! and the renderer never sees a frame that is half old and half new.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::codec::PackedFrame;
use crate::geometry::PanelGeometry;

/// One complete record: a brightness and the frame it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Fraction of each row slot, out of 255, that the row is lit
    pub brightness: u8,
    /// Pixels
    pub frame: PackedFrame,
    /// Position in the publish order; 0 is the initial blank frame
    pub sequence: u64,
}

impl Snapshot {
    /// The all-off frame at brightness 0.
    #[must_use]
    pub fn blank(geometry: PanelGeometry) -> Self {
        Self {
            brightness: 0,
            frame: PackedFrame::blank(geometry),
            sequence: 0,
        }
    }
}

/// Latest-value-wins holder of the current [`Snapshot`].
#[derive(Debug)]
pub struct FrameState {
    current: Mutex<Arc<Snapshot>>,
}

impl FrameState {
    /// State holding the blank frame.
    #[must_use]
    pub fn new(geometry: PanelGeometry) -> Self {
        Self {
            current: Mutex::new(Arc::new(Snapshot::blank(geometry))),
        }
    }

    /// Replace the current snapshot with `brightness` and `frame`.
    ///
    /// Returns the sequence number given to the new snapshot. Frames that
    /// were published but never loaded are simply dropped.
    pub fn publish(&self, brightness: u8, frame: PackedFrame) -> u64 {
        let mut next = Arc::new(Snapshot {
            brightness,
            frame,
            sequence: 0,
        });
        let mut current = self.lock();
        let sequence = current.sequence + 1;
        // the new Arc is not shared yet
        if let Some(snapshot) = Arc::get_mut(&mut next) {
            snapshot.sequence = sequence;
        }
        let previous = core::mem::replace(&mut *current, next);
        drop(current);
        drop(previous);
        sequence
    }

    /// The current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Snapshot>> {
        // a panic elsewhere cannot leave a half-written Arc behind
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
