//! Flattening fragments into one world-space mesh.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use super::fragment::{bounding_box, MeshFragment, Rgba};
use crate::error::IntegrityError;

/// One globally indexed, world-space triangle mesh.
///
/// Built fresh for each bake request. Every triangle index is smaller than
/// `positions.len()`, and `normals` (and `colors`, when present) are aligned
/// with `positions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedMesh {
    /// World-space vertex positions.
    pub positions: Vec<Point3<f32>>,
    /// World-space unit normals.
    pub normals: Vec<Vector3<f32>>,
    /// Triangles indexing into `positions`.
    pub triangles: Vec<[u32; 3]>,
    /// Per-vertex colors, present only when every merged fragment had them.
    pub colors: Option<Vec<Rgba>>,
}

impl MergedMesh {
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

    /// Whether the mesh has no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Axis-aligned bounding box of the positions.
    pub fn bounding_box(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        bounding_box(&self.positions)
    }

    /// Check the merged-mesh invariants.
    pub fn validate(&self) -> Result<(), IntegrityError> {
        let vertex_count = self.positions.len();
        if self.normals.len() != vertex_count {
            return Err(IntegrityError::AttributeLengthMismatch {
                attribute: "normals",
                expected: vertex_count,
                actual: self.normals.len(),
            });
        }
        if let Some(colors) = &self.colors {
            if colors.len() != vertex_count {
                return Err(IntegrityError::AttributeLengthMismatch {
                    attribute: "colors",
                    expected: vertex_count,
                    actual: colors.len(),
                });
            }
        }
        check_triangles(&self.triangles, vertex_count)
    }
}

/// Check that every index of a triangle list is below `vertex_count`.
pub(crate) fn check_triangles(
    triangles: &[[u32; 3]],
    vertex_count: usize,
) -> Result<(), IntegrityError> {
    for (ti, tri) in triangles.iter().enumerate() {
        for &vi in tri {
            if vi as usize >= vertex_count {
                return Err(IntegrityError::TriangleIndexOutOfRange {
                    triangle: ti,
                    vertex: vi,
                    vertex_count,
                });
            }
        }
    }
    Ok(())
}

/// Append a fragment's triangles shifted by `offset`, the vertices merged before it.
fn append_offset_triangles(
    out: &mut Vec<[u32; 3]>,
    fragment: &MeshFragment,
    offset: usize,
) -> Result<(), IntegrityError> {
    let overflow = || IntegrityError::FragmentIndexOverflow {
        anchor: fragment.id,
        offset,
    };
    let base = u32::try_from(offset).map_err(|_| overflow())?;
    let start = out.len();
    for tri in &fragment.triangles {
        let mut shifted = [0u32; 3];
        for (k, &vi) in tri.iter().enumerate() {
            match base.checked_add(vi) {
                Some(v) => shifted[k] = v,
                None => {
                    out.truncate(start);
                    return Err(overflow());
                }
            }
        }
        out.push(shifted);
    }
    Ok(())
}

/// Merge fragments into one world-space mesh.
///
/// Positions are transformed by each fragment's world transform and normals by
/// the transpose-inverse of its upper 3×3, then re-normalized, which keeps
/// normals perpendicular under non-uniform scale. Fragment `k`'s indices are
/// offset by the number of vertices appended before it.
///
/// # Errors
///
/// Returns [`IntegrityError::FragmentIndexOutOfRange`] or
/// [`IntegrityError::FragmentAttributeMismatch`] naming the offending
/// fragment, or [`IntegrityError::FragmentIndexOverflow`] once the merged
/// mesh no longer fits 32-bit indices. Indices are never clamped; the caller
/// should drop that fragment and merge again.
///
/// # Example
///
/// ```
/// use atlasbake::mesh::{merge, MeshFragment};
/// use nalgebra::{Matrix4, Point3, Vector3};
/// use uuid::Uuid;
///
/// let fragment = MeshFragment::new(
///     Uuid::from_u128(1),
///     Matrix4::new_translation(&Vector3::new(0.0, 0.0, 2.0)),
///     vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
///     vec![Vector3::z(); 3],
///     vec![[0, 1, 2]],
/// );
///
/// let merged = merge([&fragment]).unwrap();
/// assert_eq!(merged.positions[0], Point3::new(0.0, 0.0, 2.0));
/// ```
pub fn merge<'a, I>(fragments: I) -> Result<MergedMesh, IntegrityError>
where
    I: IntoIterator<Item = &'a MeshFragment>,
{
    let fragments: Vec<&MeshFragment> = fragments.into_iter().collect();

    for fragment in &fragments {
        fragment.validate()?;
    }

    let total_vertices: usize = fragments.iter().map(|f| f.num_vertices()).sum();
    let total_triangles: usize = fragments.iter().map(|f| f.num_triangles()).sum();

    let mut merged = MergedMesh {
        positions: Vec::with_capacity(total_vertices),
        normals: Vec::with_capacity(total_vertices),
        triangles: Vec::with_capacity(total_triangles),
        colors: None,
    };

    let all_colored = !fragments.is_empty() && fragments.iter().all(|f| f.colors.is_some());
    let mut colors: Vec<Rgba> = if all_colored {
        Vec::with_capacity(total_vertices)
    } else {
        Vec::new()
    };

    for fragment in &fragments {
        append_offset_triangles(
            &mut merged.triangles,
            fragment,
            merged.positions.len(),
        )?;
        let transform = &fragment.world_transform;
        let normal_matrix = normal_matrix(transform);

        merged
            .positions
            .extend(fragment.positions.iter().map(|p| transform.transform_point(p)));
        merged.normals.extend(
            fragment
                .normals
                .iter()
                .map(|n| (normal_matrix * n).try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros)),
        );

        if all_colored {
            if let Some(fragment_colors) = &fragment.colors {
                colors.extend_from_slice(fragment_colors);
            }
        }
    }

    if all_colored {
        merged.colors = Some(colors);
    } else if fragments.iter().any(|f| f.colors.is_some()) {
        log::debug!("some fragments carry no vertex colors, dropping colors from merged mesh");
    }

    log::info!(
        "Merged {} fragments: {} vertices, {} triangles",
        fragments.len(),
        merged.num_vertices(),
        merged.num_triangles()
    );

    Ok(merged)
}

/// Transpose-inverse of the upper 3×3, or the upper 3×3 itself when singular.
fn normal_matrix(transform: &Matrix4<f32>) -> Matrix3<f32> {
    let linear: Matrix3<f32> = transform.fixed_view::<3, 3>(0, 0).into_owned();
    match linear.try_inverse() {
        Some(inverse) => inverse.transpose(),
        None => linear,
    }
}
