use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use led_panel_sink::driver::{self, DriverConfig, DriverError};
use led_panel_sink::gpio::{GpioMem, GPIO_MEM_PATH};
use led_panel_sink::lines::SimulatedLines;
use led_panel_sink::render::DEFAULT_REFRESH_HZ;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Drive tiled 32x16 LED modules from `[brightness][packed frame]` records
/// read on standard input.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Modules side by side
    tiles_x: u32,
    /// Modules stacked vertically
    tiles_y: u32,
    /// Full panel passes per second
    #[arg(long, default_value_t = DEFAULT_REFRESH_HZ)]
    refresh_rate: u32,
    /// Drive in-memory lines instead of the GPIO registers
    #[arg(long)]
    simulate: bool,
    /// GPIO register device
    #[arg(long, default_value = GPIO_MEM_PATH)]
    gpio_mem: PathBuf,
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
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<u8, DriverError> {
    let config = DriverConfig::new(args.tiles_x, args.tiles_y, args.refresh_rate)?;
    info!(
        geometry = %config.geometry,
        record_size = config.geometry.record_size(),
        refresh_hz = config.timing.refresh_hz(),
        row_slot_ns = config.timing.row_slot().as_nanos(),
        "configured"
    );

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop)).map_err(DriverError::Signal)?;
    }

    let outcome = if args.simulate {
        info!("simulating the GPIO lines");
        let mut lines = SimulatedLines::new(config.wiring.output_enable_mask());
        driver::run(&config, io::stdin(), &mut lines, &stop)?
    } else {
        let mut lines = GpioMem::open(&args.gpio_mem, &config.wiring)?;
        driver::run(&config, io::stdin(), &mut lines, &stop)?
    };
    info!(
        passes = outcome.render.passes,
        refresh_rate = format_args!("{:.1}", outcome.render.refresh_rate()),
        exit_code = outcome.exit_code(),
        "done"
    );
    Ok(outcome.exit_code())
}
