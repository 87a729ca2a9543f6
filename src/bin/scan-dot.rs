//! Demo client: a single dot walking the panel row by row, written to
//! standard output as driver records.
//!
//! ```text
//! scan-dot 2 1 | led-panel-sink 2 1
//! ```

use std::io::{self, ErrorKind};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use embedded_graphics::pixelcolor::Gray8;
use embedded_graphics::prelude::*;
use led_panel_sink::codec::{pack, Frame};
use led_panel_sink::geometry::PanelGeometry;
use led_panel_sink::transport::write_record;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Scan a single lit dot across the panel")]
struct Args {
    /// Modules side by side
    tiles_x: u32,
    /// Modules stacked vertically
    tiles_y: u32,
    /// Brightness sent with every frame
    #[arg(long, default_value_t = 50)]
    brightness: u8,
    /// Stop after this many frames instead of running forever
    #[arg(long)]
    frames: Option<u64>,
    /// Pause between frames in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,
}

/// Position after `position` in row-major order, wrapping at the end.
fn advance(position: Point, size: Size) -> Point {
    if position.x + 1 < size.width as i32 {
        Point::new(position.x + 1, position.y)
    } else if position.y + 1 < size.height as i32 {
        Point::new(0, position.y + 1)
    } else {
        Point::zero()
    }
}

fn run(args: &Args) -> io::Result<u64> {
    let geometry = PanelGeometry::resolve(args.tiles_x, args.tiles_y)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    info!(%geometry, brightness = args.brightness, "scanning");

    let mut frame = Frame::new(geometry);
    let size = frame.size();
    let mut position = Point::zero();
    let mut stdout = io::stdout().lock();
    let mut sent = 0u64;
    while args.frames.is_none_or(|limit| sent < limit) {
        frame.erase();
        let Ok(()) = Pixel(position, Gray8::WHITE).draw(&mut frame);
        write_record(&mut stdout, &geometry, args.brightness, &pack(&frame))?;
        sent += 1;
        position = advance(position, size);
        if args.interval_ms > 0 {
            thread::sleep(Duration::from_millis(args.interval_ms));
        }
    }
    Ok(sent)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    match run(&args) {
        Ok(sent) => {
            info!(sent, "done");
            ExitCode::SUCCESS
        }
        // the driver went away
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            info!("output closed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_wraps_rows_then_panel() {
        let size = Size::new(3, 2);
        assert_eq!(advance(Point::new(0, 0), size), Point::new(1, 0));
        assert_eq!(advance(Point::new(2, 0), size), Point::new(0, 1));
        assert_eq!(advance(Point::new(2, 1), size), Point::new(0, 0));
    }

    #[test]
    fn test_advance_visits_every_pixel() {
        let size = Size::new(32, 16);
        let mut position = Point::zero();
        let mut visited = std::collections::HashSet::new();
        for _ in 0..32 * 16 {
            assert!(visited.insert(position));
            position = advance(position, size);
        }
        assert_eq!(position, Point::zero());
    }
}
