//! CPU rasterizer.
//!
//! Triangles are set up once, then the target is split into horizontal bands
//! that rayon rasterizes in parallel. Every band walks the full triangle list
//! in index order, so per texel the write order is the same as a serial
//! rasterizer and the result is deterministic.

use nalgebra::{Vector2, Vector4};
use rayon::prelude::*;

use super::raster::{
    quantize, quantize_texel, sample, ColorSource, DrawCall, DrawStats, LoadOp, PositionSource,
    RasterBackend, RasterVertex,
};
use super::BakeTarget;
use crate::error::{BakeError, Result};

/// Clip w at or below which a vertex counts as behind the camera.
const W_EPSILON: f32 = 1e-6;

/// A rasterizer that runs on the CPU.
#[derive(Debug, Clone)]
pub struct SoftwareRasterizer {
    rows_per_band: Option<usize>,
}

impl Default for SoftwareRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareRasterizer {
    /// Create a rasterizer that sizes its bands from the rayon thread count.
    pub fn new() -> Self {
        Self {
            rows_per_band: None,
        }
    }

    /// Use a fixed band height.
    pub fn with_rows_per_band(mut self, rows: usize) -> Self {
        self.rows_per_band = Some(rows.max(1));
        self
    }

    fn band_height(&self, height: usize) -> usize {
        self.rows_per_band.unwrap_or_else(|| {
            let bands = rayon::current_num_threads() * 4;
            height.div_ceil(bands).max(1)
        })
    }
}

/// A triangle ready for scan conversion.
struct Setup {
    /// Screen positions, y growing with the row index.
    screen: [Vector2<f32>; 3],
    /// Vertex indices, reordered so the signed area is positive.
    vertices: [usize; 3],
    /// Reciprocal clip w per corner.
    inv_w: [f32; 3],
    /// NDC depth per corner.
    depth: [f32; 3],
    area: f32,
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
    top_left: [bool; 3],
}

#[inline]
fn edge(a: &Vector2<f32>, b: &Vector2<f32>, p: &Vector2<f32>) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top-left rule for an edge of a positively oriented triangle, rows growing downwards.
#[inline]
fn is_top_left(a: &Vector2<f32>, b: &Vector2<f32>) -> bool {
    let d = b - a;
    (d.y == 0.0 && d.x > 0.0) || d.y < 0.0
}

fn setup_triangle(
    tri: &[u32; 3],
    clip: &[Vector4<f32>],
    width: usize,
    height: usize,
) -> Option<Setup> {
    let mut vertices = tri.map(|i| i as usize);
    let corners = vertices.map(|i| clip[i]);

    if corners.iter().any(|c| c.w <= W_EPSILON) {
        return None;
    }

    let to_screen = |c: &Vector4<f32>| {
        Vector2::new(
            (c.x / c.w * 0.5 + 0.5) * width as f32,
            (c.y / c.w * 0.5 + 0.5) * height as f32,
        )
    };
    let mut screen = corners.map(|c| to_screen(&c));
    let mut inv_w = corners.map(|c| 1.0 / c.w);
    let mut depth = corners.map(|c| c.z / c.w);

    let mut area = edge(&screen[0], &screen[1], &screen[2]);
    if !area.is_finite() || area == 0.0 {
        return None;
    }
    if area < 0.0 {
        screen.swap(1, 2);
        vertices.swap(1, 2);
        inv_w.swap(1, 2);
        depth.swap(1, 2);
        area = -area;
    }

    let min = screen[0].inf(&screen[1]).inf(&screen[2]);
    let max = screen[0].sup(&screen[1]).sup(&screen[2]);
    if max.x < 0.0 || max.y < 0.0 || min.x > width as f32 || min.y > height as f32 {
        return None;
    }

    Some(Setup {
        min_x: min.x.floor().max(0.0) as usize,
        max_x: (max.x.ceil().max(0.0) as usize).min(width),
        min_y: min.y.floor().max(0.0) as usize,
        max_y: (max.y.ceil().max(0.0) as usize).min(height),
        top_left: [
            is_top_left(&screen[1], &screen[2]),
            is_top_left(&screen[2], &screen[0]),
            is_top_left(&screen[0], &screen[1]),
        ],
        screen,
        vertices,
        inv_w,
        depth,
        area,
    })
}

/// Per-corner data the color source needs.
enum Shading<'a> {
    Vertex,
    Projection {
        clip: Vec<Vector4<f32>>,
        image: &'a image::RgbaImage,
        filter: super::SampleFilter,
    },
    Atlas {
        image: &'a image::RgbaImage,
        filter: super::SampleFilter,
    },
}

impl Shading<'_> {
    /// Fragment color from perspective-correct weights, or `None` to discard.
    fn shade(&self, vertices: &[RasterVertex], tri: &[usize; 3], weights: [f32; 3]) -> Option<[u8; 4]> {
        match self {
            Shading::Vertex => {
                let mut color = [0.0f32; 4];
                for (k, &vi) in tri.iter().enumerate() {
                    for (c, v) in color.iter_mut().zip(vertices[vi].color) {
                        *c += v * weights[k];
                    }
                }
                Some(quantize(color))
            }
            Shading::Projection {
                clip,
                image,
                filter,
            } => {
                let c = clip[tri[0]] * weights[0] + clip[tri[1]] * weights[1] + clip[tri[2]] * weights[2];
                if c.w <= W_EPSILON {
                    return None;
                }
                let u = c.x / c.w * 0.5 + 0.5;
                let v = 0.5 - c.y / c.w * 0.5;
                if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
                    return None;
                }
                Some(quantize_texel(sample(image, u, v, *filter)))
            }
            Shading::Atlas { image, filter } => {
                let mut uv = [0.0f32; 2];
                for (k, &vi) in tri.iter().enumerate() {
                    uv[0] += vertices[vi].uv[0] * weights[k];
                    uv[1] += vertices[vi].uv[1] * weights[k];
                }
                Some(quantize_texel(sample(image, uv[0], uv[1], *filter)))
            }
        }
    }
}

impl RasterBackend for SoftwareRasterizer {
    fn name(&self) -> &str {
        "software"
    }

    fn draw(&mut self, target: &mut BakeTarget, call: &DrawCall<'_>) -> Result<DrawStats> {
        crate::mesh::check_triangles(call.triangles, call.vertices.len())?;
        if let ColorSource::Projection { image, .. } | ColorSource::AtlasTexture { image, .. } =
            call.color
        {
            if image.width() == 0 || image.height() == 0 {
                return Err(BakeError::unavailable("sampled image", "image is empty"));
            }
        }

        if let LoadOp::Clear(color) = call.load {
            target.clear(color);
        }

        let width = target.width() as usize;
        let height = target.height() as usize;

        let clip: Vec<Vector4<f32>> = call
            .vertices
            .iter()
            .map(|v| v.clip(&call.position))
            .collect();

        let setups: Vec<Setup> = call
            .triangles
            .iter()
            .filter_map(|tri| setup_triangle(tri, &clip, width, height))
            .collect();

        let shading = match call.color {
            ColorSource::VertexColor => Shading::Vertex,
            ColorSource::Projection {
                image,
                view_projection,
                filter,
            } => Shading::Projection {
                clip: call
                    .vertices
                    .iter()
                    .map(|v| super::raster::project(&view_projection, v.position))
                    .collect(),
                image,
                filter,
            },
            ColorSource::AtlasTexture { image, filter } => Shading::Atlas { image, filter },
        };

        let depth_test = matches!(call.position, PositionSource::Projected(_));
        let band_rows = self.band_height(height);
        let row_bytes = width * 4;

        let written: usize = target
            .image_mut()
            .par_chunks_mut(band_rows * row_bytes)
            .enumerate()
            .map(|(band, pixels)| {
                let y_start = band * band_rows;
                let rows = pixels.len() / row_bytes;
                let mut depth = if depth_test {
                    vec![f32::INFINITY; rows * width]
                } else {
                    Vec::new()
                };
                let mut count = 0usize;

                for setup in &setups {
                    let y0 = setup.min_y.max(y_start);
                    let y1 = setup.max_y.min(y_start + rows);
                    for y in y0..y1 {
                        for x in setup.min_x..setup.max_x {
                            let p = Vector2::new(x as f32 + 0.5, y as f32 + 0.5);
                            let s = &setup.screen;
                            let e = [edge(&s[1], &s[2], &p), edge(&s[2], &s[0], &p), edge(&s[0], &s[1], &p)];
                            let inside = e
                                .iter()
                                .zip(setup.top_left)
                                .all(|(&ei, tl)| ei > 0.0 || (ei == 0.0 && tl));
                            if !inside {
                                continue;
                            }

                            let b = e.map(|ei| ei / setup.area);
                            let local = (y - y_start) * width + x;

                            if depth_test {
                                let z = b[0] * setup.depth[0] + b[1] * setup.depth[1] + b[2] * setup.depth[2];
                                if !(-1.0..=1.0).contains(&z) || z >= depth[local] {
                                    continue;
                                }
                                depth[local] = z;
                            }

                            // Perspective-correct weights; identical to b when every w is 1
                            let pw = [b[0] * setup.inv_w[0], b[1] * setup.inv_w[1], b[2] * setup.inv_w[2]];
                            let sum = pw[0] + pw[1] + pw[2];
                            let weights = pw.map(|w| w / sum);

                            if let Some(color) = shading.shade(call.vertices, &setup.vertices, weights) {
                                pixels[local * 4..local * 4 + 4].copy_from_slice(&color);
                                count += 1;
                            }
                        }
                    }
                }
                count
            })
            .sum();

        log::debug!(
            "software draw: {} of {} triangles set up, {} fragments",
            setups.len(),
            call.triangles.len(),
            written
        );

        Ok(DrawStats {
            triangles: setups.len(),
            fragments: Some(written),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::{SampleFilter, BakeTarget};
    use image::{Rgba, RgbaImage};
    use nalgebra::Matrix4;

    fn vertex(uv: [f32; 2], color: [f32; 4]) -> RasterVertex {
        RasterVertex {
            position: [uv[0], uv[1], 0.0],
            uv,
            color,
        }
    }

    const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
    const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
    const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

    fn rgb_triangle() -> Vec<RasterVertex> {
        vec![
            vertex([0.0, 0.0], RED),
            vertex([1.0, 0.0], GREEN),
            vertex([0.0, 1.0], BLUE),
        ]
    }

    fn bake(vertices: &[RasterVertex], triangles: &[[u32; 3]], size: u32) -> BakeTarget {
        let mut target = BakeTarget::new(size, size).unwrap();
        SoftwareRasterizer::new()
            .draw(
                &mut target,
                &DrawCall {
                    vertices,
                    triangles,
                    position: PositionSource::AtlasUv,
                    color: ColorSource::VertexColor,
                    load: LoadOp::Clear([0, 0, 0, 255]),
                },
            )
            .unwrap();
        target
    }

    #[test]
    fn test_rgb_triangle_interpolation() {
        let target = bake(&rgb_triangle(), &[[0, 1, 2]], 64);

        // Top-left texel is almost pure red
        let corner = target.texel(0, 0);
        assert!(corner[0] >= 245 && corner[1] <= 5 && corner[2] <= 5);

        // Centroid is the average of the three colors
        let centroid = target.texel(21, 21);
        for c in &centroid[..3] {
            assert!((*c as i32 - 85).abs() <= 3, "centroid {:?}", centroid);
        }

        // Linear along the u axis: green grows with x
        let a = target.texel(8, 2)[1];
        let b = target.texel(40, 2)[1];
        assert!(b > a);

        // Outside the triangle stays cleared
        assert_eq!(target.texel(63, 63), [0, 0, 0, 255]);
    }

    #[test]
    fn test_both_windings() {
        let vertices = rgb_triangle();
        let ccw = bake(&vertices, &[[0, 1, 2]], 32);
        let cw = bake(&vertices, &[[0, 2, 1]], 32);
        assert_eq!(ccw, cw);
    }

    #[test]
    fn test_zero_area_writes_nothing() {
        let vertices = vec![
            vertex([0.1, 0.1], RED),
            vertex([0.5, 0.5], RED),
            vertex([0.9, 0.9], RED),
        ];
        let mut target = BakeTarget::new(32, 32).unwrap();
        let stats = SoftwareRasterizer::new()
            .draw(
                &mut target,
                &DrawCall {
                    vertices: &vertices,
                    triangles: &[[0, 1, 2]],
                    position: PositionSource::AtlasUv,
                    color: ColorSource::VertexColor,
                    load: LoadOp::Clear([0, 0, 0, 0]),
                },
            )
            .unwrap();
        assert_eq!(stats.fragments, Some(0));
        assert!(target.image().pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_shared_edge_written_once() {
        // Full-screen quad as two triangles: every texel is covered exactly once
        let vertices = vec![
            vertex([0.0, 0.0], RED),
            vertex([1.0, 0.0], RED),
            vertex([1.0, 1.0], RED),
            vertex([0.0, 1.0], RED),
        ];
        let mut target = BakeTarget::new(16, 16).unwrap();
        let stats = SoftwareRasterizer::new()
            .draw(
                &mut target,
                &DrawCall {
                    vertices: &vertices,
                    triangles: &[[0, 1, 2], [0, 2, 3]],
                    position: PositionSource::AtlasUv,
                    color: ColorSource::VertexColor,
                    load: LoadOp::Clear([0, 0, 0, 0]),
                },
            )
            .unwrap();
        assert_eq!(stats.fragments, Some(16 * 16));
    }

    #[test]
    fn test_later_triangle_wins() {
        let vertices = vec![
            vertex([0.0, 0.0], RED),
            vertex([1.0, 0.0], RED),
            vertex([0.0, 1.0], RED),
            vertex([0.0, 0.0], BLUE),
            vertex([1.0, 0.0], BLUE),
            vertex([0.0, 1.0], BLUE),
        ];
        let target = bake(&vertices, &[[0, 1, 2], [3, 4, 5]], 16);
        assert_eq!(target.texel(2, 2), [0, 0, 255, 255]);
    }

    #[test]
    fn test_band_size_does_not_change_result() {
        let vertices = rgb_triangle();
        let call = DrawCall {
            vertices: &vertices,
            triangles: &[[0, 1, 2]],
            position: PositionSource::AtlasUv,
            color: ColorSource::VertexColor,
            load: LoadOp::Clear([0, 0, 0, 255]),
        };
        let mut a = BakeTarget::new(40, 40).unwrap();
        let mut b = BakeTarget::new(40, 40).unwrap();
        SoftwareRasterizer::new().with_rows_per_band(1).draw(&mut a, &call).unwrap();
        SoftwareRasterizer::new().with_rows_per_band(17).draw(&mut b, &call).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_keeps_contents() {
        let vertices = vec![
            vertex([0.0, 0.0], RED),
            vertex([0.5, 0.0], RED),
            vertex([0.0, 0.5], RED),
        ];
        let mut target = BakeTarget::new(16, 16).unwrap();
        target.clear([9, 9, 9, 255]);
        SoftwareRasterizer::new()
            .draw(
                &mut target,
                &DrawCall {
                    vertices: &vertices,
                    triangles: &[[0, 1, 2]],
                    position: PositionSource::AtlasUv,
                    color: ColorSource::VertexColor,
                    load: LoadOp::Load,
                },
            )
            .unwrap();
        assert_eq!(target.texel(1, 1), [255, 0, 0, 255]);
        assert_eq!(target.texel(15, 15), [9, 9, 9, 255]);
    }

    #[test]
    fn test_projection_samples_world_position() {
        // Left half of the capture is red, right half green. The camera maps
        // world x in [0, 1] straight onto ndc x in [-1, 1].
        let mut capture = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
        for y in 0..8 {
            for x in 4..8 {
                capture.put_pixel(x, y, Rgba([0, 255, 0, 255]));
            }
        }
        let world_to_ndc = Matrix4::new_translation(&nalgebra::Vector3::new(-1.0, -1.0, 0.0))
            * Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(2.0, 2.0, 1.0));

        // Atlas footprint is the full target, but world x is flipped relative to u
        let vertices = vec![
            RasterVertex { position: [1.0, 0.0, 0.0], uv: [0.0, 0.0], color: [0.0; 4] },
            RasterVertex { position: [0.0, 0.0, 0.0], uv: [1.0, 0.0], color: [0.0; 4] },
            RasterVertex { position: [0.0, 1.0, 0.0], uv: [1.0, 1.0], color: [0.0; 4] },
            RasterVertex { position: [1.0, 1.0, 0.0], uv: [0.0, 1.0], color: [0.0; 4] },
        ];
        let mut target = BakeTarget::new(16, 16).unwrap();
        SoftwareRasterizer::new()
            .draw(
                &mut target,
                &DrawCall {
                    vertices: &vertices,
                    triangles: &[[0, 1, 2], [0, 2, 3]],
                    position: PositionSource::AtlasUv,
                    color: ColorSource::Projection {
                        image: &capture,
                        view_projection: world_to_ndc,
                        filter: SampleFilter::Nearest,
                    },
                    load: LoadOp::Clear([0, 0, 0, 0]),
                },
            )
            .unwrap();

        // Low u means high world x, which is the green right half of the capture
        assert_eq!(target.texel(2, 8), [0, 255, 0, 255]);
        assert_eq!(target.texel(13, 8), [255, 0, 0, 255]);
    }

    #[test]
    fn test_projection_discards_outside_image() {
        let capture = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        // Camera sees world x in [0, 0.5] only
        let world_to_ndc = Matrix4::new_translation(&nalgebra::Vector3::new(-1.0, -1.0, 0.0))
            * Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(4.0, 2.0, 1.0));
        let vertices: Vec<RasterVertex> = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
            .iter()
            .map(|&uv: &[f32; 2]| RasterVertex {
                position: [uv[0], uv[1], 0.0],
                uv,
                color: [0.0; 4],
            })
            .collect();
        let mut target = BakeTarget::new(16, 16).unwrap();
        SoftwareRasterizer::new()
            .draw(
                &mut target,
                &DrawCall {
                    vertices: &vertices,
                    triangles: &[[0, 1, 2], [0, 2, 3]],
                    position: PositionSource::AtlasUv,
                    color: ColorSource::Projection {
                        image: &capture,
                        view_projection: world_to_ndc,
                        filter: SampleFilter::Bilinear,
                    },
                    load: LoadOp::Clear([0, 0, 0, 0]),
                },
            )
            .unwrap();
        assert_eq!(target.texel(3, 8), [255, 255, 255, 255]);
        assert_eq!(target.texel(12, 8), [0, 0, 0, 0]);
    }

    #[test]
    fn test_projected_depth_test() {
        // Two overlapping full-screen triangles at different depths, far one drawn last
        let quad = |z: f32, color: [f32; 4]| {
            [[-1.0, -1.0], [3.0, -1.0], [-1.0, 3.0]].map(|[x, y]| RasterVertex {
                position: [x, y, z],
                uv: [0.0, 0.0],
                color,
            })
        };
        let mut vertices = quad(0.2, RED).to_vec();
        vertices.extend(quad(0.8, BLUE));

        let mut target = BakeTarget::new(8, 8).unwrap();
        SoftwareRasterizer::new()
            .draw(
                &mut target,
                &DrawCall {
                    vertices: &vertices,
                    triangles: &[[0, 1, 2], [3, 4, 5]],
                    position: PositionSource::Projected(Matrix4::identity()),
                    color: ColorSource::VertexColor,
                    load: LoadOp::Clear([0, 0, 0, 255]),
                },
            )
            .unwrap();
        assert_eq!(target.texel(4, 4), [255, 0, 0, 255]);
    }

    #[test]
    fn test_projected_behind_camera_skipped() {
        let behind = Matrix4::from_diagonal(&nalgebra::Vector4::new(1.0, 1.0, 1.0, -1.0));
        let vertices = rgb_triangle();
        let mut target = BakeTarget::new(8, 8).unwrap();
        let stats = SoftwareRasterizer::new()
            .draw(
                &mut target,
                &DrawCall {
                    vertices: &vertices,
                    triangles: &[[0, 1, 2]],
                    position: PositionSource::Projected(behind),
                    color: ColorSource::VertexColor,
                    load: LoadOp::Clear([0, 0, 0, 0]),
                },
            )
            .unwrap();
        assert_eq!(stats.triangles, 0);
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let vertices = rgb_triangle();
        let mut target = BakeTarget::new(8, 8).unwrap();
        let result = SoftwareRasterizer::new().draw(
            &mut target,
            &DrawCall {
                vertices: &vertices,
                triangles: &[[0, 1, 3]],
                position: PositionSource::AtlasUv,
                color: ColorSource::VertexColor,
                load: LoadOp::Load,
            },
        );
        assert!(result.is_err());
    }
}
