//! The rasterization backend boundary.
//!
//! One draw call rasterizes an indexed triangle list into a [`BakeTarget`].
//! Where a triangle lands is chosen by its [`PositionSource`] and what color
//! it writes by its [`ColorSource`], independently. The same code path thus
//! serves atlas baking (land at the UV, sample a capture through the world
//! position) and ordinary 3D rendering (land at the projected position,
//! sample the baked atlas at the UV).
//!
//! # Conventions
//!
//! - Clip space is `x, y, z ∈ [-w, w]`. Target row 0 is clip `y = -1`.
//! - Pixel centers sit at `(x + 0.5, y + 0.5)`; coverage follows the
//!   top-left rule, so shared edges are written once.
//! - Both windings are rasterized. Triangles are written in index order and
//!   the last one to cover a texel wins.
//! - Colors are linear and straight alpha; nothing is blended.

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use nalgebra::{Matrix4, Vector4};

use super::BakeTarget;
use crate::error::Result;

/// One vertex of a draw call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RasterVertex {
    /// World-space position.
    pub position: [f32; 3],
    /// Atlas UV.
    pub uv: [f32; 2],
    /// Linear straight-alpha RGBA color.
    pub color: [f32; 4],
}

impl RasterVertex {
    /// Clip position of the vertex for a position source.
    pub fn clip(&self, source: &PositionSource) -> Vector4<f32> {
        match source {
            PositionSource::AtlasUv => atlas_clip(self.uv),
            PositionSource::Projected(m) => project(m, self.position),
        }
    }
}

/// Map an atlas UV to clip space: `clip = (uv - 0.5) * 2`.
#[inline]
pub fn atlas_clip(uv: [f32; 2]) -> Vector4<f32> {
    Vector4::new((uv[0] - 0.5) * 2.0, (uv[1] - 0.5) * 2.0, 0.0, 1.0)
}

/// Homogeneous transform of a point (`w = 1`).
#[inline]
pub fn project(m: &Matrix4<f32>, p: [f32; 3]) -> Vector4<f32> {
    m * Vector4::new(p[0], p[1], p[2], 1.0)
}

/// Where a triangle is rasterized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionSource {
    /// At its atlas UV. Used for baking.
    AtlasUv,
    /// At its world position through a view-projection, with a depth test.
    Projected(Matrix4<f32>),
}

/// Texture filter for sampled color sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleFilter {
    /// Nearest texel.
    Nearest,
    /// Bilinear between the four nearest texel centers.
    #[default]
    Bilinear,
}

/// What color a fragment gets.
#[derive(Debug, Clone, Copy)]
pub enum ColorSource<'a> {
    /// Interpolated vertex color.
    VertexColor,
    /// A camera capture, sampled where the interpolated world position
    /// projects through `view_projection`. Fragments that project outside
    /// the image or behind the camera are discarded.
    Projection {
        /// The capture image, row 0 at the top of the camera frame.
        image: &'a RgbaImage,
        /// World to clip transform of the capture camera.
        view_projection: Matrix4<f32>,
        /// Filter.
        filter: SampleFilter,
    },
    /// An atlas texture sampled at the interpolated UV.
    AtlasTexture {
        /// The atlas image, row 0 at `v = 0`.
        image: &'a RgbaImage,
        /// Filter.
        filter: SampleFilter,
    },
}

/// What happens to the target before the draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    /// Fill the target with a color first.
    Clear([u8; 4]),
    /// Keep the existing contents.
    Load,
}

/// One rasterization pass. The result is always stored into the target.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    /// Vertex buffer.
    pub vertices: &'a [RasterVertex],
    /// Index buffer.
    pub triangles: &'a [[u32; 3]],
    /// Position source.
    pub position: PositionSource,
    /// Color source.
    pub color: ColorSource<'a>,
    /// Load action.
    pub load: LoadOp,
}

/// Counters returned by a draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// Triangles handed to the rasterizer.
    pub triangles: usize,
    /// Fragments written, if the backend counts them.
    pub fragments: Option<usize>,
}

/// A synchronous rasterization backend.
///
/// `draw` returns only once the target holds the result, so consecutive
/// passes over one target are serialized by construction.
pub trait RasterBackend {
    /// Human-readable backend name, used in logs.
    fn name(&self) -> &str;

    /// Rasterize one draw call into the target.
    fn draw(&mut self, target: &mut BakeTarget, call: &DrawCall<'_>) -> Result<DrawStats>;
}

impl<B: RasterBackend + ?Sized> RasterBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn draw(&mut self, target: &mut BakeTarget, call: &DrawCall<'_>) -> Result<DrawStats> {
        (**self).draw(target, call)
    }
}

/// Sample an image at normalized coordinates with clamp-to-edge addressing.
///
/// `(0, 0)` is the top-left corner of texel `(0, 0)` and `(1, 1)` the
/// bottom-right corner of the last texel. Channels are returned in `[0, 255]`.
pub fn sample(image: &RgbaImage, u: f32, v: f32, filter: SampleFilter) -> [f32; 4] {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return [0.0; 4];
    }
    let texel = |x: i64, y: i64| -> [f32; 4] {
        let x = x.clamp(0, w as i64 - 1) as u32;
        let y = y.clamp(0, h as i64 - 1) as u32;
        image.get_pixel(x, y).0.map(f32::from)
    };

    let x = u * w as f32;
    let y = v * h as f32;

    match filter {
        SampleFilter::Nearest => texel(x.floor() as i64, y.floor() as i64),
        SampleFilter::Bilinear => {
            let x = x - 0.5;
            let y = y - 0.5;
            let x0 = x.floor();
            let y0 = y.floor();
            let fx = x - x0;
            let fy = y - y0;
            let (x0, y0) = (x0 as i64, y0 as i64);

            let c00 = texel(x0, y0);
            let c10 = texel(x0 + 1, y0);
            let c01 = texel(x0, y0 + 1);
            let c11 = texel(x0 + 1, y0 + 1);

            let mut out = [0.0; 4];
            for k in 0..4 {
                let top = c00[k] + (c10[k] - c00[k]) * fx;
                let bottom = c01[k] + (c11[k] - c01[k]) * fx;
                out[k] = top + (bottom - top) * fy;
            }
            out
        }
    }
}

/// Quantize a `[0, 1]` color to 8 bits.
#[inline]
pub fn quantize(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Quantize a `[0, 255]` sampled color to 8 bits.
#[inline]
pub(crate) fn quantize_texel(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| c.round().clamp(0.0, 255.0) as u8)
}
