//! Scanned mesh fragments.

use nalgebra::{Matrix4, Point3, Vector3};
use uuid::Uuid;

use crate::error::IntegrityError;

/// Opaque identity of the spatial anchor a fragment belongs to.
pub type AnchorId = Uuid;

/// A straight-alpha RGBA color with channels in `[0, 1]`.
pub type Rgba = [f32; 4];

/// A locally-scanned piece of mesh anchored in world space.
///
/// Fragments are immutable once built. Re-observing an anchor produces a new
/// fragment that replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshFragment {
    /// Anchor this fragment belongs to.
    pub id: AnchorId,
    /// Fragment-local to world transform.
    pub world_transform: Matrix4<f32>,
    /// Fragment-local vertex positions.
    pub positions: Vec<Point3<f32>>,
    /// Fragment-local vertex normals, one per position.
    pub normals: Vec<Vector3<f32>>,
    /// Triangles indexing into `positions`.
    pub triangles: Vec<[u32; 3]>,
    /// Optional per-vertex colors, one per position.
    pub colors: Option<Vec<Rgba>>,
    /// Session time of the observation that produced this fragment, in seconds.
    pub last_update_time: f64,
}

impl MeshFragment {
    /// Create a fragment without colors, observed at time zero.
    pub fn new(
        id: AnchorId,
        world_transform: Matrix4<f32>,
        positions: Vec<Point3<f32>>,
        normals: Vec<Vector3<f32>>,
        triangles: Vec<[u32; 3]>,
    ) -> Self {
        Self {
            id,
            world_transform,
            positions,
            normals,
            triangles,
            colors: None,
            last_update_time: 0.0,
        }
    }

    /// Attach per-vertex colors.
    pub fn with_colors(mut self, colors: Vec<Rgba>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Set the observation time.
    pub fn with_update_time(mut self, time: f64) -> Self {
        self.last_update_time = time;
        self
    }

    /// Set the world transform.
    pub fn with_transform(mut self, world_transform: Matrix4<f32>) -> Self {
        self.world_transform = world_transform;
        self
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Check that every triangle index and per-vertex attribute fits the position array.
    pub fn validate(&self) -> Result<(), IntegrityError> {
        let vertex_count = self.positions.len();

        if self.normals.len() != vertex_count {
            return Err(IntegrityError::FragmentAttributeMismatch {
                anchor: self.id,
                attribute: "normals",
                expected: vertex_count,
                actual: self.normals.len(),
            });
        }
        if let Some(colors) = &self.colors {
            if colors.len() != vertex_count {
                return Err(IntegrityError::FragmentAttributeMismatch {
                    anchor: self.id,
                    attribute: "colors",
                    expected: vertex_count,
                    actual: colors.len(),
                });
            }
        }

        for (ti, tri) in self.triangles.iter().enumerate() {
            for &vi in tri {
                if vi as usize >= vertex_count {
                    return Err(IntegrityError::FragmentIndexOutOfRange {
                        anchor: self.id,
                        triangle: ti,
                        vertex: vi,
                        vertex_count,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Compute area-weighted vertex normals.
///
/// Triangles referencing out-of-range vertices are ignored; vertices that no
/// triangle touches get a zero normal.
pub fn compute_vertex_normals(
    positions: &[Point3<f32>],
    triangles: &[[u32; 3]],
) -> Vec<Vector3<f32>> {
    let mut normals = vec![Vector3::zeros(); positions.len()];

    for tri in triangles {
        let [a, b, c] = tri.map(|i| i as usize);
        let (Some(p0), Some(p1), Some(p2)) = (positions.get(a), positions.get(b), positions.get(c))
        else {
            continue;
        };
        // Unnormalized cross product is twice the area, which gives the weighting
        let face_normal = (p1 - p0).cross(&(p2 - p0));
        normals[a] += face_normal;
        normals[b] += face_normal;
        normals[c] += face_normal;
    }

    for n in &mut normals {
        *n = n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros);
    }

    normals
}

/// Axis-aligned bounding box of a point set, `None` when empty.
pub fn bounding_box(positions: &[Point3<f32>]) -> Option<(Point3<f32>, Point3<f32>)> {
    let first = positions.first()?;
    let mut min = *first;
    let mut max = *first;

    for p in positions {
        min = min.inf(p);
        max = max.sup(p);
    }

    Some((min, max))
}
