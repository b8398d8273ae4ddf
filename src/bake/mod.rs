//! Texture-space baking.
//!
//! A bake rasterizes the [`AtlasMesh`] at its atlas UVs, so every triangle
//! lands in its own footprint of the atlas texture, while the color written
//! there comes from somewhere else:
//!
//! - [`TextureBaker::bake_vertex_colors`] interpolates a per-vertex payload.
//!   One pass, cleared first.
//! - [`TextureBaker::bake_projections`] projects each capture onto the mesh
//!   through the world-space position. Passes run oldest capture first and
//!   never clear in between, so a later capture overwrites an earlier one
//!   wherever both reach. There is no blending.
//!
//! Triangles facing away from a capture or hidden behind other geometry are
//! **not** filtered out. A capture therefore also paints the back side of an
//! object and surfaces occluded from the camera.
//!
//! # Example
//!
//! ```
//! use atlasbake::atlas::{remap, unwrap, GridChartEngine};
//! use atlasbake::bake::{BakeOptions, SoftwareRasterizer, TextureBaker, VertexPayload};
//! use atlasbake::mesh::MergedMesh;
//! use nalgebra::{Point3, Vector3};
//!
//! let merged = MergedMesh {
//!     positions: vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
//!     normals: vec![Vector3::z(); 3],
//!     triangles: vec![[0, 1, 2]],
//!     colors: None,
//! };
//! let atlas = unwrap(&mut GridChartEngine::default(), &merged).unwrap();
//! let mesh = remap(&merged, &atlas).unwrap();
//!
//! let mut baker = TextureBaker::new(
//!     SoftwareRasterizer::new(),
//!     BakeOptions::default().with_texture_size(64),
//! );
//! let texture = baker.bake_vertex_colors(&mesh, &VertexPayload::Normal).unwrap();
//! assert_eq!(texture.width(), 64);
//! ```

mod camera;
#[cfg(feature = "gpu")]
mod gpu;
mod progress;
mod raster;
mod software;
mod target;

pub use camera::OrbitCamera;
#[cfg(feature = "gpu")]
pub use gpu::WgpuRasterizer;
pub use progress::Progress;
pub use raster::{
    atlas_clip, project, quantize, sample, ColorSource, DrawCall, DrawStats, LoadOp,
    PositionSource, RasterBackend, RasterVertex, SampleFilter,
};
pub use software::SoftwareRasterizer;
pub use target::BakeTarget;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use nalgebra::{Matrix4, Vector4};

use crate::atlas::AtlasMesh;
use crate::error::{BakeError, IntegrityError, Result};
use crate::mesh::{check_triangles, Rgba};
use crate::scan::Capture;

/// Default atlas texture edge length.
pub const DEFAULT_TEXTURE_SIZE: u32 = 4096;

/// Clip w at or below which a vertex counts as behind a capture camera.
const W_EPSILON: f32 = 1e-6;

/// Options for [`TextureBaker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakeOptions {
    /// Width and height of the atlas texture.
    pub texture_size: u32,
    /// Color the target is cleared to before the first pass.
    pub clear_color: [u8; 4],
    /// Filter used when sampling captures.
    pub filter: SampleFilter,
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            texture_size: DEFAULT_TEXTURE_SIZE,
            clear_color: [0, 0, 0, 255],
            filter: SampleFilter::Bilinear,
        }
    }
}

impl BakeOptions {
    /// Set the texture edge length.
    pub fn with_texture_size(mut self, size: u32) -> Self {
        self.texture_size = size;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, color: [u8; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the capture sampling filter.
    pub fn with_filter(mut self, filter: SampleFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// What a vertex-color bake writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VertexPayload {
    /// The mesh's own vertex colors.
    Colors,
    /// The homogeneous position `(x, y, z, 1)`, normalized, used as RGBA.
    NormalizedPosition,
    /// The normal mapped from `[-1, 1]` to `[0, 1]`, opaque.
    Normal,
    /// One color everywhere.
    Solid(Rgba),
}

impl VertexPayload {
    /// Per-atlas-vertex colors for a mesh.
    ///
    /// # Errors
    ///
    /// [`IntegrityError::MissingAttribute`] for `Colors` on a mesh without colors.
    pub fn colors(&self, mesh: &AtlasMesh) -> std::result::Result<Vec<Rgba>, IntegrityError> {
        Ok(match self {
            VertexPayload::Colors => mesh
                .colors
                .clone()
                .ok_or(IntegrityError::MissingAttribute("vertex colors"))?,
            VertexPayload::NormalizedPosition => mesh
                .positions
                .iter()
                .map(|p| {
                    let v = Vector4::new(p.x, p.y, p.z, 1.0).normalize();
                    [v.x, v.y, v.z, v.w]
                })
                .collect(),
            VertexPayload::Normal => mesh
                .normals
                .iter()
                .map(|n| {
                    let c = n * 0.5 + nalgebra::Vector3::repeat(0.5);
                    [c.x, c.y, c.z, 1.0]
                })
                .collect(),
            VertexPayload::Solid(color) => vec![*color; mesh.num_vertices()],
        })
    }
}

/// Shared cancellation flag, checked between bake passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Passes already running finish.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of one capture pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassReport {
    /// Capture timestamp.
    pub timestamp: f64,
    /// Triangles drawn for this capture.
    pub triangles_drawn: usize,
    /// Triangles with no valid sample in this capture.
    pub triangles_skipped: usize,
    /// Texels written, if the backend counts them.
    pub texels_written: Option<usize>,
}

/// Summary of a projective bake.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BakeReport {
    /// One entry per capture that was processed, in bake order.
    pub passes: Vec<PassReport>,
    /// Captures left out because the bake was cancelled.
    pub passes_cancelled: usize,
}

impl BakeReport {
    /// Number of capture passes that ran.
    pub fn passes_run(&self) -> usize {
        self.passes.len()
    }

    /// Total texels written over all passes, if the backend counts them.
    pub fn texels_written(&self) -> Option<usize> {
        self.passes.iter().map(|p| p.texels_written).sum()
    }

    /// Whether cancellation cut the bake short.
    pub fn was_cancelled(&self) -> bool {
        self.passes_cancelled > 0
    }
}

/// Build the raster vertex buffer for an atlas mesh.
pub fn raster_vertices(mesh: &AtlasMesh, colors: Option<&[Rgba]>) -> Vec<RasterVertex> {
    mesh.positions
        .iter()
        .zip(&mesh.uvs)
        .enumerate()
        .map(|(i, (p, uv))| RasterVertex {
            position: [p.x, p.y, p.z],
            uv: [uv.x, uv.y],
            color: colors.and_then(|c| c.get(i).copied()).unwrap_or([1.0; 4]),
        })
        .collect()
}

/// Whether a triangle can be sampled from a capture.
///
/// False when a corner is behind the camera or when the projected footprint
/// misses the view square entirely.
pub fn triangle_visible(corners: [Vector4<f32>; 3]) -> bool {
    if corners.iter().any(|c| c.w <= W_EPSILON) {
        return false;
    }
    let ndc = corners.map(|c| (c.x / c.w, c.y / c.w));
    let min_x = ndc.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let max_x = ndc.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let min_y = ndc.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_y = ndc.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
    max_x >= -1.0 && min_x <= 1.0 && max_y >= -1.0 && min_y <= 1.0
}

/// Split triangles into those with valid samples in a capture and a skip count.
fn visible_triangles(
    vertices: &[RasterVertex],
    triangles: &[[u32; 3]],
    view_projection: &Matrix4<f32>,
) -> (Vec<[u32; 3]>, usize) {
    let clip: Vec<Vector4<f32>> = vertices
        .iter()
        .map(|v| project(view_projection, v.position))
        .collect();
    let visible: Vec<[u32; 3]> = triangles
        .iter()
        .filter(|tri| triangle_visible(tri.map(|i| clip[i as usize])))
        .copied()
        .collect();
    let skipped = triangles.len() - visible.len();
    (visible, skipped)
}

/// Rasterizes atlas meshes into atlas textures through a [`RasterBackend`].
#[derive(Debug)]
pub struct TextureBaker<B> {
    backend: B,
    options: BakeOptions,
    progress: Progress,
}

impl<B: RasterBackend> TextureBaker<B> {
    /// Create a baker.
    pub fn new(backend: B, options: BakeOptions) -> Self {
        Self {
            backend,
            options,
            progress: Progress::none(),
        }
    }

    /// Report one step per capture pass.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the progress reporter.
    pub fn set_progress(&mut self, progress: Progress) {
        self.progress = progress;
    }

    /// The bake options.
    pub fn options(&self) -> &BakeOptions {
        &self.options
    }

    /// The raster backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The raster backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Give the backend back.
    pub fn into_backend(self) -> B {
        self.backend
    }

    fn new_target(&self) -> Result<BakeTarget> {
        BakeTarget::new(self.options.texture_size, self.options.texture_size)
    }

    fn check_mesh(mesh: &AtlasMesh) -> Result<()> {
        if mesh.triangles.is_empty() {
            return Err(BakeError::EmptyInput("atlas mesh has no triangles"));
        }
        if mesh.uvs.len() != mesh.num_vertices() {
            return Err(IntegrityError::AttributeLengthMismatch {
                attribute: "uvs",
                expected: mesh.num_vertices(),
                actual: mesh.uvs.len(),
            }
            .into());
        }
        check_triangles(&mesh.triangles, mesh.num_vertices())?;
        Ok(())
    }

    /// Bake a per-vertex payload into a freshly cleared texture.
    pub fn bake_vertex_colors(
        &mut self,
        mesh: &AtlasMesh,
        payload: &VertexPayload,
    ) -> Result<RgbaImage> {
        Self::check_mesh(mesh)?;
        let colors = payload.colors(mesh)?;
        let vertices = raster_vertices(mesh, Some(&colors));

        let mut target = self.new_target()?;
        let stats = self.backend.draw(
            &mut target,
            &DrawCall {
                vertices: &vertices,
                triangles: &mesh.triangles,
                position: PositionSource::AtlasUv,
                color: ColorSource::VertexColor,
                load: LoadOp::Clear(self.options.clear_color),
            },
        )?;

        log::info!(
            "Baked {:?} into {}x{} with {}: {} triangles",
            payload,
            target.width(),
            target.height(),
            self.backend.name(),
            stats.triangles
        );

        Ok(target.into_image())
    }

    /// Project captures onto the mesh, oldest first, into one texture.
    ///
    /// The texture is cleared once, then every capture pass loads and stores.
    /// Cancellation is checked before each pass; remaining captures are
    /// skipped and counted in [`BakeReport::passes_cancelled`].
    ///
    /// # Errors
    ///
    /// - `EmptyInput` if the mesh has no triangles.
    /// - `ResourceUnavailable` if a capture image is empty; no pass after it runs.
    pub fn bake_projections(
        &mut self,
        mesh: &AtlasMesh,
        captures: &[Arc<Capture>],
        cancel: &CancelToken,
    ) -> Result<(RgbaImage, BakeReport)> {
        let mut target = self.new_target()?;
        target.clear(self.options.clear_color);
        let report = self.bake_projections_into(&mut target, mesh, captures, cancel)?;
        Ok((target.into_image(), report))
    }

    /// Like [`bake_projections`](Self::bake_projections), accumulating into an existing target.
    pub fn bake_projections_into(
        &mut self,
        target: &mut BakeTarget,
        mesh: &AtlasMesh,
        captures: &[Arc<Capture>],
        cancel: &CancelToken,
    ) -> Result<BakeReport> {
        Self::check_mesh(mesh)?;

        let mut ordered: Vec<&Capture> = captures.iter().map(|c| c.as_ref()).collect();
        ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let vertices = raster_vertices(mesh, None);
        let mut report = BakeReport::default();
        let total = ordered.len();

        for (i, capture) in ordered.iter().enumerate() {
            if cancel.is_cancelled() {
                report.passes_cancelled = total - i;
                log::warn!("Bake cancelled, skipping {} remaining captures", total - i);
                break;
            }
            if capture.is_empty() {
                return Err(BakeError::unavailable(
                    "capture image",
                    format!("capture at t={:.3}s has no pixels", capture.timestamp),
                ));
            }

            self.progress.report(i, total, "Projecting capture");

            let (visible, skipped) =
                visible_triangles(&vertices, &mesh.triangles, &capture.view_projection);

            let mut pass = PassReport {
                timestamp: capture.timestamp,
                triangles_drawn: visible.len(),
                triangles_skipped: skipped,
                texels_written: Some(0),
            };

            if !visible.is_empty() {
                let stats = self.backend.draw(
                    target,
                    &DrawCall {
                        vertices: &vertices,
                        triangles: &visible,
                        position: PositionSource::AtlasUv,
                        color: ColorSource::Projection {
                            image: &capture.image,
                            view_projection: capture.view_projection,
                            filter: self.options.filter,
                        },
                        load: LoadOp::Load,
                    },
                )?;
                pass.texels_written = stats.fragments;
            }

            log::debug!(
                "Capture t={:.3}s: {} triangles drawn, {} skipped, {:?} texels",
                pass.timestamp,
                pass.triangles_drawn,
                pass.triangles_skipped,
                pass.texels_written
            );
            report.passes.push(pass);
        }

        self.progress.report(report.passes_run(), total, "Projection bake finished");
        log::info!(
            "Projected {} of {} captures with {}",
            report.passes_run(),
            total,
            self.backend.name()
        );

        Ok(report)
    }
}

/// Render the textured mesh from a camera, for previews and thumbnails.
///
/// The mesh is drawn at its projected position with a depth test and
/// textured by sampling `texture` at the atlas UV. Output row 0 is the top
/// of the view.
pub fn render_preview<B: RasterBackend + ?Sized>(
    backend: &mut B,
    mesh: &AtlasMesh,
    texture: &RgbaImage,
    camera: &OrbitCamera,
    width: u32,
    height: u32,
    background: [u8; 4],
) -> Result<RgbaImage> {
    if mesh.triangles.is_empty() {
        return Err(BakeError::EmptyInput("atlas mesh has no triangles"));
    }
    let mut target = BakeTarget::new(width, height)?;

    // Target rows grow with clip y; flip so the camera's up is the image top
    let flip = Matrix4::from_diagonal(&Vector4::new(1.0, -1.0, 1.0, 1.0));
    let view_projection = flip * camera.view_projection_matrix(width as f32 / height as f32);

    let vertices = raster_vertices(mesh, None);
    backend.draw(
        &mut target,
        &DrawCall {
            vertices: &vertices,
            triangles: &mesh.triangles,
            position: PositionSource::Projected(view_projection),
            color: ColorSource::AtlasTexture {
                image: texture,
                filter: SampleFilter::Bilinear,
            },
            load: LoadOp::Clear(background),
        },
    )?;
    Ok(target.into_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{remap, unwrap, AtlasResult, GridChartEngine};
    use crate::error::ErrorKind;
    use crate::mesh::{MergedMesh, SourceVertexId};
    use image::Rgba as Pixel;
    use nalgebra::{Point2, Point3, Vector3};

    const RED: Rgba = [1.0, 0.0, 0.0, 1.0];
    const GREEN: Rgba = [0.0, 1.0, 0.0, 1.0];
    const BLUE: Rgba = [0.0, 0.0, 1.0, 1.0];

    /// One triangle whose atlas UVs equal its world xy.
    fn rgb_triangle_mesh() -> AtlasMesh {
        let merged = MergedMesh {
            positions: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            normals: vec![Vector3::z(); 3],
            triangles: vec![[0, 1, 2]],
            colors: Some(vec![RED, GREEN, BLUE]),
        };
        let atlas = AtlasResult {
            mapping: (0..3u32).map(SourceVertexId::from).collect(),
            uvs: vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(0.0, 1.0),
            ],
            triangles: vec![[0, 1, 2]],
        };
        remap(&merged, &atlas).unwrap()
    }

    /// A unit quad in the z = 0 plane with atlas UV equal to world xy.
    fn unit_quad_mesh() -> AtlasMesh {
        let merged = MergedMesh {
            positions: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            normals: vec![Vector3::z(); 4],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
            colors: None,
        };
        let atlas = AtlasResult {
            mapping: (0..4u32).map(SourceVertexId::from).collect(),
            uvs: merged.positions.iter().map(|p| Point2::new(p.x, p.y)).collect(),
            triangles: merged.triangles.clone(),
        };
        remap(&merged, &atlas).unwrap()
    }

    /// Orthographic camera seeing world xy in [0, 1]² from +z.
    fn top_down() -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(-1.0, 1.0, 0.0))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, -2.0, 1.0))
    }

    fn solid_capture(t: f64, color: [u8; 4], view_projection: Matrix4<f32>) -> Arc<Capture> {
        Arc::new(Capture::new(
            t,
            RgbaImage::from_pixel(8, 8, Pixel(color)),
            view_projection,
        ))
    }

    fn baker(size: u32) -> TextureBaker<SoftwareRasterizer> {
        TextureBaker::new(
            SoftwareRasterizer::new(),
            BakeOptions::default().with_texture_size(size),
        )
    }

    #[test]
    fn test_rgb_triangle_bake() {
        let texture = baker(64)
            .bake_vertex_colors(&rgb_triangle_mesh(), &VertexPayload::Colors)
            .unwrap();

        let corner = texture.get_pixel(0, 0).0;
        assert!(corner[0] > 240, "top-left biases red: {:?}", corner);

        let centroid = texture.get_pixel(21, 21).0;
        for c in &centroid[..3] {
            assert!((*c as i32 - 85).abs() <= 3, "centroid {:?}", centroid);
        }
        assert_eq!(texture.get_pixel(63, 63).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_vertex_bake_is_deterministic() {
        let mesh = rgb_triangle_mesh();
        let a = baker(48).bake_vertex_colors(&mesh, &VertexPayload::Colors).unwrap();
        let b = baker(48).bake_vertex_colors(&mesh, &VertexPayload::Colors).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_colors_payload_requires_colors() {
        let err = baker(16)
            .bake_vertex_colors(&unit_quad_mesh(), &VertexPayload::Colors)
            .unwrap_err();
        assert!(matches!(
            err,
            BakeError::Integrity(IntegrityError::MissingAttribute(_))
        ));
    }

    #[test]
    fn test_payloads() {
        let mesh = unit_quad_mesh();
        let normals = VertexPayload::Normal.colors(&mesh).unwrap();
        assert_eq!(normals[0], [0.5, 0.5, 1.0, 1.0]);

        let positions = VertexPayload::NormalizedPosition.colors(&mesh).unwrap();
        // (1, 1, 0, 1) normalized
        let k = 1.0 / 3.0f32.sqrt();
        for (a, b) in positions[2].iter().zip([k, k, 0.0, k]) {
            assert!((a - b).abs() < 1e-6);
        }

        let solid = VertexPayload::Solid(GREEN).colors(&mesh).unwrap();
        assert!(solid.iter().all(|c| *c == GREEN));
    }

    #[test]
    fn test_projection_covers_quad() {
        let mesh = unit_quad_mesh();
        let captures = vec![solid_capture(0.0, [10, 200, 30, 255], top_down())];
        let (texture, report) = baker(16)
            .bake_projections(&mesh, &captures, &CancelToken::new())
            .unwrap();

        assert_eq!(report.passes_run(), 1);
        assert_eq!(report.passes[0].triangles_drawn, 2);
        assert_eq!(report.texels_written(), Some(256));
        assert!(texture.pixels().all(|p| p.0 == [10, 200, 30, 255]));
    }

    #[test]
    fn test_later_capture_dominates() {
        let mesh = unit_quad_mesh();
        let c1 = solid_capture(0.0, [255, 0, 0, 255], top_down());
        let c2 = solid_capture(1.0, [0, 0, 255, 255], top_down());

        // Given out of order; the bake sorts chronologically
        let (both, _) = baker(16)
            .bake_projections(&mesh, &[c2.clone(), c1], &CancelToken::new())
            .unwrap();
        let (only_c2, _) = baker(16)
            .bake_projections(&mesh, &[c2], &CancelToken::new())
            .unwrap();
        assert_eq!(both, only_c2);
    }

    #[test]
    fn test_out_of_range_index_is_integrity_error() {
        let mut mesh = unit_quad_mesh();
        mesh.triangles[0][2] = 7;
        let capture = solid_capture(0.0, [255, 0, 0, 255], top_down());

        let err = baker(8)
            .bake_projections(&mesh, &[capture], &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            BakeError::Integrity(IntegrityError::TriangleIndexOutOfRange { triangle: 0, vertex: 7, .. })
        ));

        let err = baker(8)
            .bake_vertex_colors(&mesh, &VertexPayload::Normal)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_partial_overlap_keeps_earlier_outside() {
        let mesh = unit_quad_mesh();
        // The second camera only sees world x in [0, 0.5]
        let narrow = Matrix4::new_translation(&Vector3::new(-1.0, 1.0, 0.0))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(4.0, -2.0, 1.0));
        let c1 = solid_capture(0.0, [255, 0, 0, 255], top_down());
        let c2 = solid_capture(1.0, [0, 0, 255, 255], narrow);

        let (texture, _) = baker(16)
            .bake_projections(&mesh, &[c1, c2], &CancelToken::new())
            .unwrap();
        assert_eq!(texture.get_pixel(2, 8).0, [0, 0, 255, 255]);
        assert_eq!(texture.get_pixel(13, 8).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_triangle_behind_camera_skipped() {
        let mesh = unit_quad_mesh();
        let behind = Matrix4::from_diagonal(&Vector4::new(1.0, 1.0, 1.0, -1.0));
        let captures = vec![solid_capture(0.0, [255; 4], behind)];
        let (texture, report) = baker(8)
            .bake_projections(&mesh, &captures, &CancelToken::new())
            .unwrap();

        assert_eq!(report.passes[0].triangles_drawn, 0);
        assert_eq!(report.passes[0].triangles_skipped, 2);
        assert!(texture.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn test_triangle_outside_view_skipped() {
        let mesh = unit_quad_mesh();
        let away = Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)) * top_down();
        let captures = vec![solid_capture(0.0, [255; 4], away)];
        let (_, report) = baker(8)
            .bake_projections(&mesh, &captures, &CancelToken::new())
            .unwrap();
        assert_eq!(report.passes[0].triangles_skipped, 2);
    }

    #[test]
    fn test_cancel_skips_remaining_captures() {
        let mesh = unit_quad_mesh();
        let captures = vec![
            solid_capture(0.0, [255, 0, 0, 255], top_down()),
            solid_capture(1.0, [0, 255, 0, 255], top_down()),
            solid_capture(2.0, [0, 0, 255, 255], top_down()),
        ];
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let progress = Progress::new(move |done, _, _| {
            if done == 1 {
                trigger.cancel();
            }
        });

        let mut baker = baker(8).with_progress(progress);
        let (texture, report) = baker.bake_projections(&mesh, &captures, &cancel).unwrap();

        // Pass 1 started before the flag was set, pass 2 onwards is skipped
        assert_eq!(report.passes_run(), 2);
        assert_eq!(report.passes_cancelled, 1);
        assert!(report.was_cancelled());
        assert_eq!(texture.get_pixel(3, 3).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_empty_capture_is_unavailable() {
        let mesh = unit_quad_mesh();
        let empty = Arc::new(Capture::new(0.0, RgbaImage::new(0, 0), top_down()));
        let err = baker(8)
            .bake_projections(&mesh, &[empty], &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mut mesh = unit_quad_mesh();
        mesh.triangles.clear();
        let err = baker(8)
            .bake_vertex_colors(&mesh, &VertexPayload::Normal)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_grid_atlas_bake_stays_in_charts() {
        let merged = MergedMesh {
            positions: unit_quad_mesh().positions,
            normals: vec![Vector3::z(); 4],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
            colors: None,
        };
        let atlas = unwrap(&mut GridChartEngine::default(), &merged).unwrap();
        let mesh = remap(&merged, &atlas).unwrap();
        let texture = baker(32)
            .bake_vertex_colors(&mesh, &VertexPayload::Solid([1.0, 1.0, 1.0, 1.0]))
            .unwrap();

        // Two charts on a 2x2 grid leave the bottom half of the atlas empty
        assert!((0..32).all(|x| texture.get_pixel(x, 28).0 == [0, 0, 0, 255]));
        assert!(texture.pixels().any(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn test_render_preview() {
        let mesh = unit_quad_mesh();
        let texture = RgbaImage::from_pixel(4, 4, Pixel([200, 100, 50, 255]));
        let camera = OrbitCamera::framing(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0))
            .with_angles(0.0, 0.0);

        let image = render_preview(
            &mut SoftwareRasterizer::new(),
            &mesh,
            &texture,
            &camera,
            32,
            32,
            [0, 0, 0, 0],
        )
        .unwrap();

        assert_eq!(image.get_pixel(16, 16).0, [200, 100, 50, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }
}
