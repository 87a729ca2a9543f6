//! Process-level orchestration: one transport thread feeding a
//! [`FrameState`], the renderer on the calling thread, and the lines released
//! whichever way the run ends.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use thiserror::Error;
use tracing::{info, warn};

use crate::geometry::{GeometryError, PanelGeometry};
use crate::gpio::HardwareError;
use crate::lines::OutputLines;
use crate::render::{RenderStats, Renderer, ScanTiming, TimingError, DEFAULT_REFRESH_HZ};
use crate::state::FrameState;
use crate::transport::{pump, InputEnd, ReaderSummary};
use crate::wiring::{Wiring, WiringError};

/// Everything that can stop the driver before or instead of rendering.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    /// Bad tiling factors
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    /// Line assignment does not fit
    Wiring(#[from] WiringError),
    #[error(transparent)]
    /// Refresh rate not achievable
    Timing(#[from] TimingError),
    #[error(transparent)]
    /// GPIO registers unavailable
    Hardware(#[from] HardwareError),
    #[error("cannot start the transport thread: {0}")]
    /// Thread creation failed
    Spawn(#[source] io::Error),
    #[error("cannot install the signal handlers: {0}")]
    /// Signal registration failed
    Signal(#[source] io::Error),
}

/// Validated driver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Panel size
    pub geometry: PanelGeometry,
    /// Line assignment
    pub wiring: Wiring,
    /// Row slot length
    pub timing: ScanTiming,
}

impl DriverConfig {
    /// Resolve and validate a configuration with the default wiring.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] for zero or oversized tiling factors, a
    /// geometry with more rows than the address lines can select, or a
    /// refresh rate that leaves less than 255 ns per row.
    pub fn new(tiles_x: u32, tiles_y: u32, refresh_hz: u32) -> Result<Self, DriverError> {
        Self::with_wiring(tiles_x, tiles_y, refresh_hz, Wiring::default())
    }

    /// As [`DriverConfig::new`] with an explicit line assignment.
    ///
    /// # Errors
    ///
    /// See [`DriverConfig::new`]; additionally fails on out-of-range or
    /// shared lines.
    pub fn with_wiring(
        tiles_x: u32,
        tiles_y: u32,
        refresh_hz: u32,
        wiring: Wiring,
    ) -> Result<Self, DriverError> {
        let geometry = PanelGeometry::resolve(tiles_x, tiles_y)?;
        wiring.check(&geometry)?;
        let timing = ScanTiming::new(refresh_hz, &geometry)?;
        Ok(Self {
            geometry,
            wiring,
            timing,
        })
    }

    /// Default refresh rate for a tiling
    ///
    /// # Errors
    ///
    /// See [`DriverConfig::new`].
    pub fn with_default_rate(tiles_x: u32, tiles_y: u32) -> Result<Self, DriverError> {
        Self::new(tiles_x, tiles_y, DEFAULT_REFRESH_HZ)
    }
}

/// Why a run ended.
#[derive(Debug)]
pub enum Shutdown {
    /// The input finished first
    Input(ReaderSummary),
    /// The stop flag was raised from outside, normally by a signal
    Signalled,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct Outcome {
    /// Why the run ended
    pub shutdown: Shutdown,
    /// Renderer counters
    pub render: RenderStats,
}

impl Outcome {
    /// Process exit status for this outcome.
    ///
    /// 0 after a signal or after an input that delivered at least one
    /// record and then closed, 1 for an input that closed before the first
    /// record or failed.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match &self.shutdown {
            Shutdown::Input(summary) => u8::from(!summary.is_clean()),
            Shutdown::Signalled => 0,
        }
    }
}

/// Releases the lines when dropped, including while unwinding.
struct ReleaseGuard<'a, L: OutputLines>(&'a mut L);

impl<L: OutputLines> Drop for ReleaseGuard<'_, L> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Render `input` onto `lines` until the input ends or `stop` is raised.
///
/// The input is read on a thread named `transport`; rendering happens on the
/// calling thread. `lines` are released before this returns, on success and
/// on error alike. After a signal the transport thread may still be blocked
/// in a read; it is left behind and ends with the process.
///
/// # Errors
///
/// Returns a [`DriverError`] if the renderer cannot be built for the
/// configuration or the transport thread cannot be started. Input errors are
/// not errors of the run; they are reported in the [`Outcome`].
pub fn run<R, L>(
    config: &DriverConfig,
    input: R,
    lines: &mut L,
    stop: &Arc<AtomicBool>,
) -> Result<Outcome, DriverError>
where
    R: Read + Send + 'static,
    L: OutputLines,
{
    let guard = ReleaseGuard(lines);
    let mut renderer = Renderer::new(&mut *guard.0, config.geometry, &config.wiring, config.timing)?;
    info!(geometry = %config.geometry, "driver starting");

    let state = Arc::new(FrameState::new(config.geometry));
    let (summary_tx, summary_rx) = mpsc::channel();
    let transport = {
        let state = Arc::clone(&state);
        let stop = Arc::clone(stop);
        let geometry = config.geometry;
        thread::Builder::new()
            .name("transport".into())
            .spawn(move || {
                let summary = pump(input, geometry, &state, &stop);
                // the receiver outlives the renderer loop
                let _ = summary_tx.send(summary);
                stop.store(true, Ordering::Release);
            })
            .map_err(DriverError::Spawn)?
    };

    let render = renderer.run(&state, stop);
    drop(renderer);
    drop(guard);

    let shutdown = match summary_rx.try_recv() {
        Ok(summary) => {
            if transport.join().is_err() {
                warn!("transport thread panicked after reporting");
            }
            Shutdown::Input(summary)
        }
        Err(_) if transport.is_finished() => {
            warn!("transport thread ended without a summary");
            Shutdown::Input(ReaderSummary {
                records: 0,
                end: InputEnd::Failed(io::Error::other("transport thread panicked")),
            })
        }
        Err(_) => Shutdown::Signalled,
    };
    match &shutdown {
        Shutdown::Input(summary) => info!(records = summary.records, "input finished, lines released"),
        Shutdown::Signalled => info!("stop requested, lines released"),
    }
    Ok(Outcome { shutdown, render })
}
