//! A deterministic reference unwrap engine.
//!
//! Every triangle becomes its own chart. Charts keep their true in-plane
//! shape, are scaled uniformly to fit a square grid cell and placed in
//! row-major order. Each triangle gets three fresh atlas vertices, so every
//! shared source vertex is split; this is the worst case for seam splitting
//! and exercises the mapping the same way a production unwrapper does.

use nalgebra::{Point2, Vector3};

use super::engine::{EngineOutput, UnwrapEngine, UnwrapInput};
use crate::error::{BakeError, Result};

/// Options for [`GridChartEngine`].
#[derive(Debug, Clone, Copy)]
pub struct GridChartOptions {
    /// Empty margin on each side of a chart, as a fraction of the cell size.
    pub padding: f32,
}

impl Default for GridChartOptions {
    fn default() -> Self {
        Self { padding: 0.05 }
    }
}

impl GridChartOptions {
    /// Set the chart padding, clamped to `[0, 0.45]` so charts keep some area.
    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding.clamp(0.0, 0.45);
        self
    }
}

/// One chart per triangle, packed on a square grid.
#[derive(Debug, Default)]
pub struct GridChartEngine {
    options: GridChartOptions,
    mapping: Vec<u32>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
}

impl GridChartEngine {
    /// Create an engine with the given options.
    pub fn new(options: GridChartOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// The engine options.
    pub fn options(&self) -> &GridChartOptions {
        &self.options
    }

    /// Whether the engine currently holds output storage.
    pub fn has_cache(&self) -> bool {
        self.mapping.capacity() > 0 || self.uvs.capacity() > 0 || self.indices.capacity() > 0
    }
}

impl UnwrapEngine for GridChartEngine {
    fn name(&self) -> &str {
        "grid-chart"
    }

    fn generate(&mut self, input: &UnwrapInput<'_>) -> Result<EngineOutput<'_>> {
        if input.indices.len() % 3 != 0 {
            return Err(BakeError::invalid_param(
                "indices",
                input.indices.len(),
                "not a whole number of triangles",
            ));
        }

        let positions: Vec<Vector3<f32>> = input.positions.iter().map(Vector3::from).collect();
        let vertex_count = positions.len();
        let triangle_count = input.indices.len() / 3;

        let grid = (triangle_count as f64).sqrt().ceil().max(1.0) as usize;
        let cell = 1.0 / grid as f32;
        let margin = cell * self.options.padding;
        let inner = cell - 2.0 * margin;

        self.mapping.clear();
        self.uvs.clear();
        self.indices.clear();
        self.mapping.reserve(triangle_count * 3);
        self.uvs.reserve(triangle_count * 3);
        self.indices.reserve(triangle_count * 3);

        let mut referenced = vec![false; vertex_count];

        for (t, tri) in input.indices.chunks_exact(3).enumerate() {
            let mut corners = [Vector3::zeros(); 3];
            for (k, &vi) in tri.iter().enumerate() {
                let Some(p) = positions.get(vi as usize) else {
                    return Err(BakeError::invalid_param(
                        "indices",
                        vi,
                        "index exceeds vertex count",
                    ));
                };
                corners[k] = *p;
                referenced[vi as usize] = true;
            }

            let local = chart_shape(&corners);
            let (min, extent) = extent_of(&local);
            let scale = if extent > 1e-12 { inner / extent } else { 0.0 };

            let row = t / grid;
            let col = t % grid;
            let origin = Point2::new(col as f32 * cell + margin, row as f32 * cell + margin);

            for (k, &vi) in tri.iter().enumerate() {
                let q = origin + (local[k] - min) * scale;
                self.indices.push(self.mapping.len() as u32);
                self.mapping.push(vi);
                self.uvs.push([q.x.clamp(0.0, 1.0), q.y.clamp(0.0, 1.0)]);
            }
        }

        // Vertices no triangle uses still need an atlas vertex of their own
        for (vi, used) in referenced.iter().enumerate() {
            if !used {
                self.mapping.push(vi as u32);
                self.uvs.push([0.0, 0.0]);
            }
        }

        Ok(EngineOutput {
            atlas_vertex_count: self.mapping.len(),
            mapping: &self.mapping,
            uvs: &self.uvs,
            indices: &self.indices,
        })
    }

    fn clear_cache(&mut self) {
        self.mapping = Vec::new();
        self.uvs = Vec::new();
        self.indices = Vec::new();
    }
}

/// Lay a 3D triangle flat in its own plane.
///
/// The first corner maps to the origin and the first edge to the x axis.
/// Degenerate triangles collapse to a segment or a point.
fn chart_shape(corners: &[Vector3<f32>; 3]) -> [Point2<f32>; 3] {
    let e1 = corners[1] - corners[0];
    let e2 = corners[2] - corners[0];

    let Some(x_axis) = e1.try_normalize(1e-12).or_else(|| e2.try_normalize(1e-12)) else {
        return [Point2::origin(); 3];
    };
    let normal = e1.cross(&e2);
    let y_axis = normal
        .cross(&x_axis)
        .try_normalize(1e-12)
        .unwrap_or_else(Vector3::zeros);

    [
        Point2::origin(),
        Point2::new(e1.dot(&x_axis), e1.dot(&y_axis)),
        Point2::new(e2.dot(&x_axis), e2.dot(&y_axis)),
    ]
}

/// Minimum corner and the larger side of the 2D bounding box.
fn extent_of(points: &[Point2<f32>; 3]) -> (Point2<f32>, f32) {
    let mut min = points[0];
    let mut max = points[0];
    for p in &points[1..] {
        min = min.inf(p);
        max = max.sup(p);
    }
    let size = max - min;
    (min, size.x.max(size.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::engine::{PackedVertex, VertexBufferView};

    fn run(
        engine: &mut GridChartEngine,
        positions: &[[f32; 3]],
        indices: &[u32],
    ) -> (usize, Vec<u32>, Vec<[f32; 2]>, Vec<u32>) {
        let packed: Vec<PackedVertex> = positions
            .iter()
            .map(|&position| PackedVertex {
                position,
                normal: [0.0, 0.0, 1.0],
            })
            .collect();
        let input = UnwrapInput {
            positions: VertexBufferView::of_packed(&packed, PackedVertex::POSITION_OFFSET),
            normals: None,
            indices,
        };
        let out = engine.generate(&input).unwrap();
        (
            out.atlas_vertex_count,
            out.mapping.to_vec(),
            out.uvs.to_vec(),
            out.indices.to_vec(),
        )
    }

    fn quad() -> (Vec<[f32; 3]>, Vec<u32>) {
        (
            vec![
                [0.0, 0.0, 0.0],
                [2.0, 0.0, 0.0],
                [2.0, 2.0, 0.0],
                [0.0, 2.0, 0.0],
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_splits_shared_vertices() {
        let (positions, indices) = quad();
        let mut engine = GridChartEngine::default();
        let (count, mapping, uvs, atlas_indices) = run(&mut engine, &positions, &indices);

        assert_eq!(count, 6);
        assert_eq!(mapping, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(atlas_indices, vec![0, 1, 2, 3, 4, 5]);
        assert!(uvs
            .iter()
            .all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1])));
    }

    #[test]
    fn test_charts_do_not_overlap() {
        let (positions, indices) = quad();
        let mut engine = GridChartEngine::default();
        let (_, _, uvs, _) = run(&mut engine, &positions, &indices);

        // Two triangles on a 2x2 grid: the first chart is in cell (0, 0), the second in (1, 0)
        assert!(uvs[..3].iter().all(|uv| uv[0] <= 0.5 && uv[1] <= 0.5));
        assert!(uvs[3..].iter().all(|uv| uv[0] >= 0.5 && uv[1] <= 0.5));
    }

    #[test]
    fn test_preserves_shape() {
        // Right isosceles triangle keeps equal legs
        let positions = [[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [0.0, 0.0, 3.0]];
        let mut engine = GridChartEngine::new(GridChartOptions::default().with_padding(0.0));
        let (_, _, uvs, _) = run(&mut engine, &positions, &[0, 1, 2]);

        let leg = |a: [f32; 2], b: [f32; 2]| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
        assert!((leg(uvs[0], uvs[1]) - 1.0).abs() < 1e-5);
        assert!((leg(uvs[0], uvs[2]) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_unreferenced_vertices_get_atlas_vertex() {
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [5.0, 5.0, 5.0],
        ];
        let mut engine = GridChartEngine::default();
        let (count, mapping, uvs, _) = run(&mut engine, &positions, &[0, 1, 2]);
        assert_eq!(count, 4);
        assert_eq!(mapping[3], 3);
        assert_eq!(uvs[3], [0.0, 0.0]);
    }

    #[test]
    fn test_degenerate_triangle_collapses() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let mut engine = GridChartEngine::default();
        let (_, _, uvs, _) = run(&mut engine, &positions, &[0, 1, 2]);
        // Collinear corners stay collinear
        let area = (uvs[1][0] - uvs[0][0]) * (uvs[2][1] - uvs[0][1])
            - (uvs[2][0] - uvs[0][0]) * (uvs[1][1] - uvs[0][1]);
        assert!(area.abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_index() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let packed: Vec<PackedVertex> = positions
            .iter()
            .map(|&position| PackedVertex {
                position,
                normal: [0.0; 3],
            })
            .collect();
        let input = UnwrapInput {
            positions: VertexBufferView::of_packed(&packed, 0),
            normals: None,
            indices: &[0, 1, 7],
        };
        let mut engine = GridChartEngine::default();
        assert!(engine.generate(&input).is_err());
    }

    #[test]
    fn test_clear_cache() {
        let (positions, indices) = quad();
        let mut engine = GridChartEngine::default();
        run(&mut engine, &positions, &indices);
        assert!(engine.has_cache());
        engine.clear_cache();
        assert!(!engine.has_cache());
    }
}
