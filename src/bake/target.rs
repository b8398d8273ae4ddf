//! The off-screen image a bake accumulates into.

use image::{Rgba, RgbaImage};

use crate::error::{BakeError, Result};

/// An RGBA8 render target.
///
/// Texel row 0 corresponds to clip `y = -1`, which for a bake is atlas
/// `v = 0`. Writes replace texels outright; there is no blending.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeTarget {
    image: RgbaImage,
}

impl BakeTarget {
    /// Create a target filled with transparent black.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BakeError::invalid_param(
                "texture_size",
                format!("{}x{}", width, height),
                "dimensions must be non-zero",
            ));
        }
        Ok(Self {
            image: RgbaImage::new(width, height),
        })
    }

    /// Wrap an existing image, for example to keep accumulating into it.
    pub fn from_image(image: RgbaImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BakeError::invalid_param(
                "image",
                "0 pixels",
                "dimensions must be non-zero",
            ));
        }
        Ok(Self { image })
    }

    /// Width in texels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in texels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Fill every texel with one color.
    pub fn clear(&mut self, color: [u8; 4]) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba(color);
        }
    }

    /// One texel.
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    /// The image, read-only.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Mutable access for raster backends.
    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    /// Give up the target and keep the image.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}
