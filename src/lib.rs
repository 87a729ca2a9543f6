//! Scan-loop driver for tiled monochrome LED dot-matrix panels.
//!
//! ## How the panels work
//!
//! Each module is a 32 × 16 grid of single-colour LEDs behind a chain of
//! shift registers. Nothing on the module remembers an image: the host has
//! to keep re-sending it, one row at a time, fast enough that the eye sees a
//! steady picture.
//!
//! ### Signal names
//! - **D0–D7** – Eight parallel column-data inputs; every clock edge moves eight pixels into the chain
//! - **CLK** – Shift clock
//! - **LAT / STB** – Latch; copies the shift-register contents to the LED drivers
//! - **OE** – Output enable (active LOW): LEDs are lit while OE is LOW and blanked while it is HIGH
//! - **A B C D (E F)** – Binary row address; selects the one row that is lit
//!
//! ### Row scanning
//! 1. The address lines are set to row N.
//! 2. The row's packed bytes are clocked into the chain, eight pixels per clock.
//! 3. LAT is pulsed so the drivers take over the new data.
//! 4. OE goes LOW for a share of the row slot set by the brightness, then HIGH for the rest.
//! 5. Steps 1–4 repeat for every row; a whole pass takes `1 / refresh_rate` seconds.
//!
//! ### Brightness
//! There is one bit per pixel, so the only grey level is global: each row is
//! lit for `slot * brightness / 255` of its slot. Brightness 0 never lights
//! the panel.
//!
//! ## Crate layout
//!
//! - [`geometry`] – tiling factors to panel size
//! - [`codec`] – grayscale frames, 1-bit packing, and an `embedded-graphics` canvas
//! - [`transport`] – the `[brightness][packed frame]` record stream
//! - [`state`] – the latest frame, shared between the input thread and the renderer
//! - [`wiring`] and [`mask`] – which GPIO line carries which signal, and the byte → register table
//! - [`lines`] and [`gpio`] – the output line seam, simulated and memory-mapped
//! - [`render`] – the scan loop
//! - [`driver`] – threads, shutdown and exit status
//!
//! ## Multiple modules
//! Modules are tiled into one larger panel, `tiles_x` wide and `tiles_y`
//! high. The driver treats the result as one `32 * tiles_x` × `16 * tiles_y`
//! canvas; a 2 × 1 tiling is a 64 × 16 display.
//!
//! ```rust
//! use embedded_graphics::pixelcolor::Gray8;
//! use embedded_graphics::prelude::*;
//! use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
//! use led_panel_sink::codec::{pack, Frame};
//! use led_panel_sink::geometry::PanelGeometry;
//!
//! let geometry = PanelGeometry::resolve(2, 1).unwrap();
//! let mut frame = Frame::new(geometry);
//! Rectangle::new(Point::new(0, 0), Size::new(8, 1))
//!     .into_styled(PrimitiveStyle::with_fill(Gray8::WHITE))
//!     .draw(&mut frame)
//!     .unwrap();
//!
//! let packed = pack(&frame);
//! assert_eq!(packed.as_bytes().len(), 128);
//! assert_eq!(packed.as_bytes()[0], 0xFF);
//! assert_eq!(packed.lit_count(), 8);
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod codec;
pub mod driver;
pub mod geometry;
pub mod gpio;
pub mod lines;
pub mod mask;
pub mod render;
pub mod state;
pub mod transport;
pub mod wiring;

/// Columns of one module
pub const MODULE_WIDTH: usize = 32;

/// Rows of one module
pub const MODULE_HEIGHT: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{compute_height, compute_packed_size, compute_width};

    #[test]
    fn test_module_size() {
        // one clock moves eight pixels, so a module row is whole bytes
        assert_eq!(MODULE_WIDTH % 8, 0);
        assert_eq!(MODULE_WIDTH * MODULE_HEIGHT / 8, 64);
    }

    #[test]
    fn test_documentation_examples() {
        const TILES_X: usize = 2;
        const TILES_Y: usize = 1;
        const WIDTH: usize = compute_width(TILES_X);
        const HEIGHT: usize = compute_height(TILES_Y);
        const PACKED: usize = compute_packed_size(WIDTH, HEIGHT);

        assert_eq!(WIDTH, 64);
        assert_eq!(HEIGHT, 16);
        assert_eq!(PACKED, 128);
    }
}
