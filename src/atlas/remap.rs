//! Re-expanding source attributes into the atlas vertex arena.

use nalgebra::{Point2, Point3, Vector3};

use super::adapter::AtlasResult;
use crate::error::IntegrityError;
use crate::mesh::{bounding_box, AtlasVertexId, MergedMesh, Rgba, SourceVertexId, TriangleId};

/// The merged mesh re-indexed over atlas vertices.
///
/// Every per-vertex array has one entry per atlas vertex and is aligned with
/// `uvs` and `triangles`. This is the mesh that is baked and exported.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasMesh {
    /// World-space positions.
    pub positions: Vec<Point3<f32>>,
    /// World-space unit normals.
    pub normals: Vec<Vector3<f32>>,
    /// Per-vertex colors, if the merged mesh had them.
    pub colors: Option<Vec<Rgba>>,
    /// Atlas UVs.
    pub uvs: Vec<Point2<f32>>,
    /// Triangles over atlas vertices.
    pub triangles: Vec<[u32; 3]>,
    /// Source vertex of each atlas vertex.
    pub mapping: Vec<SourceVertexId>,
    source_count: usize,
}

/// Gather the merged mesh's attributes through the atlas mapping.
///
/// `position[i] = merged.positions[mapping[i]]`, likewise for normals and
/// colors, and `uv[i] = atlas.uvs[i]`. The gather is pure: the same inputs
/// always produce identical arrays.
///
/// # Errors
///
/// Returns an [`IntegrityError`] if the atlas does not fit the merged mesh.
pub fn remap(merged: &MergedMesh, atlas: &AtlasResult) -> Result<AtlasMesh, IntegrityError> {
    merged.validate()?;
    atlas.validate(merged.num_vertices(), merged.num_triangles())?;

    let positions = gather_by(&atlas.mapping, &merged.positions);
    let normals = gather_by(&atlas.mapping, &merged.normals);
    let colors = merged
        .colors
        .as_ref()
        .map(|colors| gather_by(&atlas.mapping, colors));

    Ok(AtlasMesh {
        positions,
        normals,
        colors,
        uvs: atlas.uvs.clone(),
        triangles: atlas.triangles.clone(),
        mapping: atlas.mapping.clone(),
        source_count: merged.num_vertices(),
    })
}

fn gather_by<T: Clone>(mapping: &[SourceVertexId], source: &[T]) -> Vec<T> {
    mapping.iter().map(|s| source[s.index()].clone()).collect()
}

impl AtlasMesh {
    /// Number of atlas vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Number of vertices in the source mesh this was remapped from.
    #[inline]
    pub fn num_source_vertices(&self) -> usize {
        self.source_count
    }

    /// Source vertex an atlas vertex was split from.
    #[inline]
    pub fn source_of(&self, v: AtlasVertexId) -> SourceVertexId {
        self.mapping[v.index()]
    }

    /// Atlas vertices of a triangle.
    pub fn triangle(&self, t: TriangleId) -> [AtlasVertexId; 3] {
        self.triangles[t.index()].map(AtlasVertexId::from)
    }

    /// Axis-aligned bounding box of the positions.
    pub fn bounding_box(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        bounding_box(&self.positions)
    }

    /// Re-expand any per-source-vertex attribute into the atlas arena.
    pub fn gather<T: Clone>(&self, source: &[T]) -> Result<Vec<T>, IntegrityError> {
        if source.len() != self.source_count {
            return Err(IntegrityError::AttributeLengthMismatch {
                attribute: "source attribute",
                expected: self.source_count,
                actual: source.len(),
            });
        }
        Ok(gather_by(&self.mapping, source))
    }

    /// Assign atlas UVs back onto the source vertices.
    ///
    /// Atlas vertices are visited in ascending order and each one writes its
    /// UV to its source vertex, so where a seam split a source vertex the
    /// **last** atlas vertex wins. Source vertices with no atlas vertex keep
    /// `(0, 0)`. This view is lossy by nature; it exists for rendering the
    /// original mesh with a texture, and the baker never uses it.
    pub fn source_uvs(&self) -> Vec<Point2<f32>> {
        let mut uvs = vec![Point2::origin(); self.source_count];
        for (source, uv) in self.mapping.iter().zip(&self.uvs) {
            uvs[source.index()] = *uv;
        }
        uvs
    }

    /// Source vertices referenced by more than one atlas vertex.
    pub fn split_vertices(&self) -> Vec<SourceVertexId> {
        let mut counts = vec![0u32; self.source_count];
        for s in &self.mapping {
            counts[s.index()] += 1;
        }
        counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 1)
            .map(|(i, _)| SourceVertexId::new(i))
            .collect()
    }
}
