//! Grayscale frames and their packed one-bit-per-pixel wire form.
//!
//! A [`Frame`] is what a client draws into: a `height × width` grid of 8-bit
//! intensities that implements the `embedded-graphics` [`DrawTarget`] trait
//! with [`Gray8`] as its colour. [`pack`] thresholds it at 128 and groups
//! eight row-major pixels into one byte.
//!
//! # Bit order
//! Bytes are filled most significant bit first: pixel `8k` lands in bit 7 of
//! byte `k` and pixel `8k + 7` in bit 0. [`unpack`] uses the same convention
//! and the renderer never reorders bits, so the leftmost pixel of every byte
//! is driven on the line assigned to bit 7.
//!
//! # Example
//! ```rust
//! use embedded_graphics::pixelcolor::Gray8;
//! use embedded_graphics::prelude::*;
//! use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
//! use led_panel_sink::codec::{pack, Frame};
//! use led_panel_sink::geometry::PanelGeometry;
//!
//! let geometry = PanelGeometry::resolve(1, 1).unwrap();
//! let mut frame = Frame::new(geometry);
//!
//! Rectangle::new(Point::new(0, 0), Size::new(8, 1))
//!     .into_styled(PrimitiveStyle::with_fill(Gray8::WHITE))
//!     .draw(&mut frame)
//!     .unwrap();
//!
//! let packed = pack(&frame);
//! assert_eq!(packed.as_bytes()[0], 0xFF);
//! assert_eq!(packed.as_bytes()[1], 0x00);
//! ```

use core::convert::Infallible;

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::pixelcolor::{Gray8, GrayColor};
use embedded_graphics::prelude::{OriginDimensions, Point, Size};
use thiserror::Error;

use crate::geometry::PanelGeometry;

/// Pixels at or above this intensity are lit.
pub const THRESHOLD: u8 = 128;

/// Errors returned when wrapping caller supplied buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A pixel grid does not match the configured geometry.
    #[error("expected {expected} pixels, got {actual}")]
    ShapeMismatch {
        /// Pixel count of the configured geometry
        expected: usize,
        /// Pixel count supplied
        actual: usize,
    },
    /// A packed frame does not have the configured length.
    #[error("expected a packed frame of {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Packed size of the configured geometry
        expected: usize,
        /// Byte count supplied
        actual: usize,
    },
}

/// Grayscale pixel grid in row-major order.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    geometry: PanelGeometry,
    pixels: Vec<u8>,
}

impl Frame {
    /// Create an all-black frame.
    #[must_use]
    pub fn new(geometry: PanelGeometry) -> Self {
        Self {
            geometry,
            pixels: vec![0; geometry.pixel_count()],
        }
    }

    /// Wrap a row-major pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ShapeMismatch`] when `pixels` does not hold
    /// exactly `width * height` values.
    pub fn from_pixels(geometry: PanelGeometry, pixels: Vec<u8>) -> Result<Self, CodecError> {
        if pixels.len() != geometry.pixel_count() {
            return Err(CodecError::ShapeMismatch {
                expected: geometry.pixel_count(),
                actual: pixels.len(),
            });
        }
        Ok(Self { geometry, pixels })
    }

    /// Geometry this frame was built for
    #[must_use]
    pub const fn geometry(&self) -> PanelGeometry {
        self.geometry
    }

    /// Row-major pixel intensities
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Intensity at `(x, y)`, or `None` outside the frame.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.geometry.width() || y >= self.geometry.height() {
            return None;
        }
        Some(self.pixels[y * self.geometry.width() + x])
    }

    /// Set the intensity at `(x, y)`. Coordinates outside the frame are
    /// ignored.
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        if x >= self.geometry.width() || y >= self.geometry.height() {
            return;
        }
        let width = self.geometry.width();
        self.pixels[y * width + x] = value;
    }

    /// Set every pixel to zero.
    pub fn erase(&mut self) {
        self.pixels.fill(0);
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame")
            .field("geometry", &self.geometry)
            .field("lit", &self.pixels.iter().filter(|&&p| p >= THRESHOLD).count())
            .finish()
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(self.geometry.width() as u32, self.geometry.height() as u32)
    }
}

impl DrawTarget for Frame {
    type Color = Gray8;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for embedded_graphics::Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 {
                continue;
            }
            self.set(x as usize, y as usize, color.luma());
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.pixels.fill(color.luma());
        Ok(())
    }
}

/// One-bit-per-pixel frame, exactly `geometry.packed_size()` bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PackedFrame {
    bytes: Box<[u8]>,
}

impl PackedFrame {
    /// A frame with every pixel off.
    #[must_use]
    pub fn blank(geometry: PanelGeometry) -> Self {
        Self {
            bytes: vec![0; geometry.packed_size()].into_boxed_slice(),
        }
    }

    /// Wrap bytes received from the wire.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SizeMismatch`] when the length differs from the
    /// geometry's packed size.
    pub fn from_bytes(geometry: PanelGeometry, bytes: Vec<u8>) -> Result<Self, CodecError> {
        if bytes.len() != geometry.packed_size() {
            return Err(CodecError::SizeMismatch {
                expected: geometry.packed_size(),
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Packed bytes in wire order
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Packed bytes of one row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is not below `geometry.height()` or the frame was
    /// built for a different geometry.
    #[must_use]
    pub fn row(&self, geometry: &PanelGeometry, row: usize) -> &[u8] {
        &self.bytes[geometry.row_range(row)]
    }

    /// Number of lit pixels
    #[must_use]
    pub fn lit_count(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }
}

impl core::fmt::Debug for PackedFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PackedFrame")
            .field("len", &self.bytes.len())
            .field("lit", &self.lit_count())
            .finish()
    }
}

/// Threshold and pack a frame.
#[must_use]
pub fn pack(frame: &Frame) -> PackedFrame {
    let bytes = frame
        .pixels
        .chunks(8)
        .map(|chunk| {
            chunk.iter().enumerate().fold(0u8, |byte, (bit, &pixel)| {
                if pixel >= THRESHOLD {
                    byte | (0x80 >> bit)
                } else {
                    byte
                }
            })
        })
        .collect::<Vec<u8>>();
    PackedFrame {
        bytes: bytes.into_boxed_slice(),
    }
}

/// Expand a packed frame back into a frame whose pixels are 0 or 255.
#[must_use]
pub fn unpack(packed: &PackedFrame, geometry: PanelGeometry) -> Frame {
    let mut pixels = Vec::with_capacity(geometry.pixel_count());
    for byte in packed.as_bytes() {
        for bit in 0..8 {
            pixels.push(if byte & (0x80 >> bit) != 0 { 255 } else { 0 });
        }
    }
    pixels.truncate(geometry.pixel_count());
    Frame { geometry, pixels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};
    use proptest::prelude::*;

    fn geometry() -> PanelGeometry {
        PanelGeometry::resolve(1, 1).unwrap()
    }

    #[test]
    fn test_pack_threshold() {
        let mut frame = Frame::new(geometry());
        frame.set(0, 0, 127);
        frame.set(1, 0, 128);
        frame.set(2, 0, 255);
        let packed = pack(&frame);
        assert_eq!(packed.as_bytes()[0], 0b0110_0000);
        assert_eq!(packed.lit_count(), 2);
    }

    #[test]
    fn test_pack_msb_first() {
        let mut frame = Frame::new(geometry());
        frame.set(0, 0, 255);
        frame.set(15, 0, 255);
        let packed = pack(&frame);
        assert_eq!(packed.as_bytes()[0], 0x80);
        assert_eq!(packed.as_bytes()[1], 0x01);
    }

    #[test]
    fn test_pack_row_major() {
        let geometry = geometry();
        let mut frame = Frame::new(geometry);
        frame.set(0, 1, 255);
        let packed = pack(&frame);
        // row 1 starts after the 4 bytes of row 0
        assert_eq!(packed.row(&geometry, 0), &[0, 0, 0, 0]);
        assert_eq!(packed.row(&geometry, 1), &[0x80, 0, 0, 0]);
        assert_eq!(packed.as_bytes().len(), geometry.packed_size());
    }

    #[test]
    fn test_from_pixels_shape_mismatch() {
        let result = Frame::from_pixels(geometry(), vec![0; 10]);
        assert_eq!(
            result,
            Err(CodecError::ShapeMismatch {
                expected: 512,
                actual: 10
            })
        );
    }

    #[test]
    fn test_packed_from_bytes_size_mismatch() {
        let result = PackedFrame::from_bytes(geometry(), vec![0; 65]);
        assert_eq!(
            result,
            Err(CodecError::SizeMismatch {
                expected: 64,
                actual: 65
            })
        );
        assert!(PackedFrame::from_bytes(geometry(), vec![0; 64]).is_ok());
    }

    #[test]
    fn test_get_set_bounds() {
        let mut frame = Frame::new(geometry());
        frame.set(32, 0, 255);
        frame.set(0, 16, 255);
        assert_eq!(frame.get(32, 0), None);
        assert_eq!(frame.get(0, 16), None);
        assert!(frame.pixels().iter().all(|&p| p == 0));

        frame.set(31, 15, 200);
        assert_eq!(frame.get(31, 15), Some(200));
        frame.erase();
        assert_eq!(frame.get(31, 15), Some(0));
    }

    #[test]
    fn test_origin_dimensions() {
        let frame = Frame::new(PanelGeometry::resolve(2, 3).unwrap());
        assert_eq!(frame.size(), Size::new(64, 48));
    }

    #[test]
    fn test_draw_target_rectangle() {
        let geometry = geometry();
        let mut frame = Frame::new(geometry);
        Rectangle::new(Point::new(8, 2), Size::new(8, 2))
            .into_styled(PrimitiveStyle::with_fill(Gray8::WHITE))
            .draw(&mut frame)
            .unwrap();

        let packed = pack(&frame);
        assert_eq!(packed.row(&geometry, 1), &[0, 0, 0, 0]);
        assert_eq!(packed.row(&geometry, 2), &[0, 0xFF, 0, 0]);
        assert_eq!(packed.row(&geometry, 3), &[0, 0xFF, 0, 0]);
        assert_eq!(packed.lit_count(), 16);
    }

    #[test]
    fn test_draw_target_clips_offscreen() {
        let mut frame = Frame::new(geometry());
        Line::new(Point::new(-5, 0), Point::new(40, 0))
            .into_styled(PrimitiveStyle::with_stroke(Gray8::new(200), 1))
            .draw(&mut frame)
            .unwrap();
        assert_eq!(pack(&frame).lit_count(), 32);
    }

    #[test]
    fn test_clear_fills() {
        let mut frame = Frame::new(geometry());
        frame.clear(Gray8::new(128)).unwrap();
        assert!(pack(&frame).as_bytes().iter().all(|&b| b == 0xFF));
        frame.clear(Gray8::new(127)).unwrap();
        assert!(pack(&frame).as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blank_is_dark() {
        let packed = PackedFrame::blank(geometry());
        assert_eq!(packed.as_bytes().len(), 64);
        assert_eq!(packed.lit_count(), 0);
    }

    /// A geometry of up to 2 x 2 modules with a pixel grid to match.
    fn geometry_and_pixels() -> impl Strategy<Value = (PanelGeometry, Vec<u8>)> {
        (1u32..3, 1u32..3).prop_flat_map(|(tiles_x, tiles_y)| {
            let geometry = PanelGeometry::resolve(tiles_x, tiles_y).unwrap();
            (
                Just(geometry),
                prop::collection::vec(any::<u8>(), geometry.pixel_count()),
            )
        })
    }

    proptest! {
        #[test]
        fn test_unpack_reproduces_thresholded_image(
            (geometry, pixels) in geometry_and_pixels(),
        ) {
            let frame = Frame::from_pixels(geometry, pixels.clone()).unwrap();

            let round_trip = unpack(&pack(&frame), geometry);

            prop_assert_eq!(round_trip.pixels().len(), pixels.len());
            for (restored, original) in round_trip.pixels().iter().zip(&pixels) {
                let expected = if *original >= THRESHOLD { 255 } else { 0 };
                prop_assert_eq!(*restored, expected);
            }
        }
    }
}
