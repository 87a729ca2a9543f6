//! Geometry of a rectangle of tiled panel modules.
//!
//! Modules are placed side by side in a `tiles_x` × `tiles_y` grid and the
//! resulting surface is scanned as one large panel. The geometry is resolved
//! once at startup and never changes afterwards; every other component
//! (codec, transport, renderer) derives its sizes from it.

use thiserror::Error;

use crate::{MODULE_HEIGHT, MODULE_WIDTH};

/// Largest tile count accepted along either side.
pub const MAX_TILES: u32 = 255;

/// Errors returned by [`PanelGeometry::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// A tile count was zero.
    #[error("tile counts must be at least 1 (got {tiles_x} x {tiles_y})")]
    ZeroTiles {
        /// Requested horizontal tile count
        tiles_x: u32,
        /// Requested vertical tile count
        tiles_y: u32,
    },
    /// A tile count is above [`MAX_TILES`].
    #[error("a {tiles_x} x {tiles_y} tiling is too large, at most 255 modules fit per side")]
    TooLarge {
        /// Requested horizontal tile count
        tiles_x: u32,
        /// Requested vertical tile count
        tiles_y: u32,
    },
    /// The pixel count cannot be split into whole bytes.
    #[error("{width} x {height} pixels is not a whole number of bytes")]
    NotByteAligned {
        /// Width in pixels
        width: usize,
        /// Height in pixels
        height: usize,
    },
}

/// Computes the width in pixels of `tiles_x` modules placed side by side.
#[must_use]
pub const fn compute_width(tiles_x: usize) -> usize {
    tiles_x * MODULE_WIDTH
}

/// Computes the height in pixels of `tiles_y` modules stacked vertically.
#[must_use]
pub const fn compute_height(tiles_y: usize) -> usize {
    tiles_y * MODULE_HEIGHT
}

/// Computes the number of bytes a packed frame of the given size occupies.
///
/// Partial bytes are rounded up, although a resolved geometry always has a
/// pixel count that is a multiple of 8.
#[must_use]
pub const fn compute_packed_size(width: usize, height: usize) -> usize {
    (width * height).div_ceil(8)
}

/// Resolved panel geometry.
///
/// Construct it with [`PanelGeometry::resolve`]; the fields are private so a
/// geometry that exists is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PanelGeometry {
    tiles_x: u32,
    tiles_y: u32,
    width: usize,
    height: usize,
}

impl PanelGeometry {
    /// Resolve a tiling factor into a concrete geometry.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ZeroTiles`] when either count is zero,
    /// [`GeometryError::TooLarge`] when either count is above [`MAX_TILES`]
    /// or the pixel count overflows, and
    /// [`GeometryError::NotByteAligned`] when the pixel count is not a
    /// multiple of 8.
    ///
    /// # Example
    /// ```rust
    /// use led_panel_sink::geometry::PanelGeometry;
    ///
    /// let geometry = PanelGeometry::resolve(2, 1).unwrap();
    /// assert_eq!(geometry.width(), 64);
    /// assert_eq!(geometry.height(), 16);
    /// assert_eq!(geometry.packed_size(), 128);
    /// ```
    pub fn resolve(tiles_x: u32, tiles_y: u32) -> Result<Self, GeometryError> {
        if tiles_x == 0 || tiles_y == 0 {
            return Err(GeometryError::ZeroTiles { tiles_x, tiles_y });
        }
        let too_large = GeometryError::TooLarge { tiles_x, tiles_y };
        if tiles_x > MAX_TILES || tiles_y > MAX_TILES {
            return Err(too_large);
        }
        let width = usize::try_from(tiles_x)
            .ok()
            .and_then(|tiles| tiles.checked_mul(MODULE_WIDTH))
            .ok_or(too_large)?;
        let height = usize::try_from(tiles_y)
            .ok()
            .and_then(|tiles| tiles.checked_mul(MODULE_HEIGHT))
            .ok_or(too_large)?;
        let pixels = width.checked_mul(height).ok_or(too_large)?;
        // the record size must fit too, it carries the brightness byte
        if (pixels / 8).checked_add(1).is_none() {
            return Err(too_large);
        }
        if pixels % 8 != 0 || width % 8 != 0 {
            return Err(GeometryError::NotByteAligned { width, height });
        }
        Ok(Self {
            tiles_x,
            tiles_y,
            width,
            height,
        })
    }

    /// Number of modules placed horizontally
    #[must_use]
    pub const fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    /// Number of modules stacked vertically
    #[must_use]
    pub const fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    /// Width of the whole surface in pixels
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height of the whole surface in pixels, which is also the number of
    /// scanned rows
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Total number of pixels
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Number of packed bytes that make up one row
    #[must_use]
    pub const fn row_bytes(&self) -> usize {
        self.width / 8
    }

    /// Number of bytes in a packed frame
    #[must_use]
    pub const fn packed_size(&self) -> usize {
        compute_packed_size(self.width, self.height)
    }

    /// Number of bytes in one wire record: the brightness byte followed by a
    /// packed frame
    #[must_use]
    pub const fn record_size(&self) -> usize {
        1 + self.packed_size()
    }

    /// Byte range of `row` inside a packed frame.
    #[must_use]
    pub const fn row_range(&self, row: usize) -> core::ops::Range<usize> {
        let start = row * self.row_bytes();
        start..start + self.row_bytes()
    }
}

impl core::fmt::Display for PanelGeometry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}x{} pixels ({}x{} modules)",
            self.width, self.height, self.tiles_x, self.tiles_y
        )
    }
}
