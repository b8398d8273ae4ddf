//! Running an unwrap engine on a merged mesh and validating its result.

use nalgebra::Point2;

use super::engine::{EngineOutput, PackedVertex, UnwrapEngine, UnwrapInput, VertexBufferView};
use crate::error::{BakeError, IntegrityError, Result};
use crate::mesh::{AtlasVertexId, MergedMesh, SourceVertexId};

/// An owned copy of an unwrap engine's output.
///
/// Atlas vertex `i` has UV `uvs[i]` and originates from source vertex
/// `mapping[i]`. Several atlas vertices may share a source vertex where the
/// engine split a seam; the relation is never assumed to be a bijection.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasResult {
    /// Source vertex of each atlas vertex.
    pub mapping: Vec<SourceVertexId>,
    /// UV of each atlas vertex, in `[0, 1]²`.
    pub uvs: Vec<Point2<f32>>,
    /// Triangles over atlas vertices.
    pub triangles: Vec<[u32; 3]>,
}

impl AtlasResult {
    /// Number of atlas vertices.
    #[inline]
    pub fn atlas_vertex_count(&self) -> usize {
        self.mapping.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Source vertex an atlas vertex was split from.
    #[inline]
    pub fn source_of(&self, v: AtlasVertexId) -> SourceVertexId {
        self.mapping[v.index()]
    }

    /// Check the atlas invariants against the mesh it was computed from.
    ///
    /// - at least as many atlas vertices as source vertices
    /// - every mapping entry addresses a source vertex
    /// - UVs are finite and inside the unit square
    /// - every triangle index addresses an atlas vertex
    /// - the triangle count is unchanged
    pub fn validate(
        &self,
        source_vertices: usize,
        source_triangles: usize,
    ) -> std::result::Result<(), IntegrityError> {
        let count = self.atlas_vertex_count();

        if self.uvs.len() != count {
            return Err(IntegrityError::AttributeLengthMismatch {
                attribute: "uvs",
                expected: count,
                actual: self.uvs.len(),
            });
        }
        if count < source_vertices {
            return Err(IntegrityError::AtlasVertexCountTooSmall {
                atlas: count,
                source_count: source_vertices,
            });
        }
        if self.triangles.len() != source_triangles {
            return Err(IntegrityError::TriangleCountMismatch {
                expected: source_triangles,
                actual: self.triangles.len(),
            });
        }

        for (i, source) in self.mapping.iter().enumerate() {
            if source.index() >= source_vertices {
                return Err(IntegrityError::MappingOutOfRange {
                    atlas_vertex: i,
                    source_vertex: source.raw(),
                    source_count: source_vertices,
                });
            }
        }

        for (i, uv) in self.uvs.iter().enumerate() {
            let inside = |c: f32| (0.0..=1.0).contains(&c);
            if !inside(uv.x) || !inside(uv.y) {
                return Err(IntegrityError::UvOutOfRange {
                    atlas_vertex: i,
                    u: uv.x,
                    v: uv.y,
                });
            }
        }

        crate::mesh::check_triangles(&self.triangles, count)
    }
}

/// Pack a mesh's positions and normals into the interleaved engine layout.
pub fn pack_vertices(mesh: &MergedMesh) -> Vec<PackedVertex> {
    mesh.positions
        .iter()
        .zip(&mesh.normals)
        .map(|(p, n)| PackedVertex {
            position: [p.x, p.y, p.z],
            normal: [n.x, n.y, n.z],
        })
        .collect()
}

/// Unwrap a merged mesh with the given engine.
///
/// The engine's borrowed output is copied, the engine's cache is released,
/// and only then is the copy validated. The engine cache is released even if
/// the engine fails.
///
/// # Errors
///
/// - `EmptyInput` if the mesh has no triangles; the engine is not invoked.
/// - `Integrity` if the mesh or the engine output violates an invariant.
/// - Whatever the engine itself reports, typically `ResourceUnavailable`.
///
/// # Example
///
/// ```
/// use atlasbake::atlas::{unwrap, GridChartEngine};
/// use atlasbake::mesh::MergedMesh;
/// use nalgebra::{Point3, Vector3};
///
/// let mesh = MergedMesh {
///     positions: vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
///     normals: vec![Vector3::z(); 3],
///     triangles: vec![[0, 1, 2]],
///     colors: None,
/// };
///
/// let atlas = unwrap(&mut GridChartEngine::default(), &mesh).unwrap();
/// assert!(atlas.atlas_vertex_count() >= mesh.num_vertices());
/// assert_eq!(atlas.num_triangles(), 1);
/// ```
pub fn unwrap<E>(engine: &mut E, mesh: &MergedMesh) -> Result<AtlasResult>
where
    E: UnwrapEngine + ?Sized,
{
    if mesh.triangles.is_empty() {
        return Err(BakeError::EmptyInput("merged mesh has no triangles"));
    }
    mesh.validate()?;

    let packed = pack_vertices(mesh);
    let input = UnwrapInput {
        positions: VertexBufferView::of_packed(&packed, PackedVertex::POSITION_OFFSET),
        normals: Some(VertexBufferView::of_packed(&packed, PackedVertex::NORMAL_OFFSET)),
        indices: bytemuck::cast_slice(&mesh.triangles),
    };

    log::debug!(
        "Unwrapping {} vertices, {} triangles with {}",
        mesh.num_vertices(),
        mesh.num_triangles(),
        engine.name()
    );

    let copied = match engine.generate(&input) {
        Ok(output) => copy_output(&output),
        Err(e) => Err(e),
    };
    engine.clear_cache();

    let atlas = copied?;
    atlas.validate(mesh.num_vertices(), mesh.num_triangles())?;

    log::info!(
        "Atlas: {} vertices ({} source), {} triangles",
        atlas.atlas_vertex_count(),
        mesh.num_vertices(),
        atlas.num_triangles()
    );

    Ok(atlas)
}

fn copy_output(output: &EngineOutput<'_>) -> Result<AtlasResult> {
    let count = output.atlas_vertex_count;

    if output.mapping.len() != count {
        return Err(IntegrityError::AttributeLengthMismatch {
            attribute: "mapping",
            expected: count,
            actual: output.mapping.len(),
        }
        .into());
    }
    if output.uvs.len() != count {
        return Err(IntegrityError::AttributeLengthMismatch {
            attribute: "uvs",
            expected: count,
            actual: output.uvs.len(),
        }
        .into());
    }
    if output.indices.len() % 3 != 0 {
        return Err(IntegrityError::IncompleteTriangleList {
            len: output.indices.len(),
        }
        .into());
    }

    Ok(AtlasResult {
        mapping: output.mapping.iter().copied().map(SourceVertexId::from).collect(),
        uvs: output.uvs.iter().map(|&[u, v]| Point2::new(u, v)).collect(),
        triangles: output
            .indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use nalgebra::{Point3, Vector3};

    fn triangle_mesh() -> MergedMesh {
        MergedMesh {
            positions: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            normals: vec![Vector3::z(); 3],
            triangles: vec![[0, 1, 2]],
            colors: None,
        }
    }

    /// Engine that returns fixed arrays and records cache releases.
    #[derive(Default)]
    struct FixedEngine {
        mapping: Vec<u32>,
        uvs: Vec<[f32; 2]>,
        indices: Vec<u32>,
        calls: usize,
        clears: usize,
        fail: bool,
    }

    impl UnwrapEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate(&mut self, _input: &UnwrapInput<'_>) -> Result<EngineOutput<'_>> {
            self.calls += 1;
            if self.fail {
                return Err(BakeError::unavailable("unwrap engine", "not initialized"));
            }
            Ok(EngineOutput {
                atlas_vertex_count: self.mapping.len(),
                mapping: &self.mapping,
                uvs: &self.uvs,
                indices: &self.indices,
            })
        }

        fn clear_cache(&mut self) {
            self.clears += 1;
        }
    }

    fn identity_engine() -> FixedEngine {
        FixedEngine {
            mapping: vec![0, 1, 2],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            indices: vec![0, 1, 2],
            ..Default::default()
        }
    }

    #[test]
    fn test_unwrap_copies_and_clears() {
        let mut engine = identity_engine();
        let atlas = unwrap(&mut engine, &triangle_mesh()).unwrap();
        assert_eq!(atlas.atlas_vertex_count(), 3);
        assert_eq!(atlas.triangles, vec![[0, 1, 2]]);
        assert_eq!(atlas.uvs[1], Point2::new(1.0, 0.0));
        assert_eq!(engine.clears, 1);
    }

    #[test]
    fn test_boxed_engine_selected_at_runtime() {
        let engines: Vec<Box<dyn UnwrapEngine + Send>> = vec![
            Box::new(identity_engine()),
            Box::new(crate::atlas::GridChartEngine::default()),
        ];
        for mut engine in engines {
            let atlas = unwrap(&mut engine, &triangle_mesh()).unwrap();
            assert_eq!(atlas.triangles.len(), 1);
            assert!(atlas.atlas_vertex_count() >= 3);
        }

        let boxed: Box<dyn UnwrapEngine> = Box::new(identity_engine());
        assert_eq!(boxed.name(), "fixed");
    }

    #[test]
    fn test_empty_mesh_skips_engine() {
        let mut engine = identity_engine();
        let err = unwrap(&mut engine, &MergedMesh::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        assert_eq!(engine.calls, 0);
    }

    #[test]
    fn test_engine_failure_still_clears() {
        let mut engine = FixedEngine {
            fail: true,
            ..Default::default()
        };
        let err = unwrap(&mut engine, &triangle_mesh()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
        assert_eq!(engine.clears, 1);
    }

    #[test]
    fn test_triangle_count_mismatch() {
        let mut engine = identity_engine();
        engine.indices = vec![0, 1, 2, 2, 1, 0];
        let err = unwrap(&mut engine, &triangle_mesh()).unwrap_err();
        assert!(matches!(
            err,
            BakeError::Integrity(IntegrityError::TriangleCountMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_too_few_atlas_vertices() {
        let mut engine = FixedEngine {
            mapping: vec![0, 1],
            uvs: vec![[0.0, 0.0], [1.0, 0.0]],
            indices: vec![0, 1, 1],
            ..Default::default()
        };
        let err = unwrap(&mut engine, &triangle_mesh()).unwrap_err();
        assert!(matches!(
            err,
            BakeError::Integrity(IntegrityError::AtlasVertexCountTooSmall { atlas: 2, .. })
        ));
    }

    #[test]
    fn test_mapping_out_of_range() {
        let mut engine = identity_engine();
        engine.mapping = vec![0, 1, 3];
        let err = unwrap(&mut engine, &triangle_mesh()).unwrap_err();
        assert!(matches!(
            err,
            BakeError::Integrity(IntegrityError::MappingOutOfRange { atlas_vertex: 2, .. })
        ));
    }

    #[test]
    fn test_atlas_index_out_of_range() {
        let mut engine = identity_engine();
        engine.indices = vec![0, 1, 3];
        let err = unwrap(&mut engine, &triangle_mesh()).unwrap_err();
        assert!(matches!(
            err,
            BakeError::Integrity(IntegrityError::TriangleIndexOutOfRange { vertex: 3, .. })
        ));
    }

    #[test]
    fn test_incomplete_index_buffer() {
        let mut engine = identity_engine();
        engine.indices = vec![0, 1];
        let err = unwrap(&mut engine, &triangle_mesh()).unwrap_err();
        assert!(matches!(
            err,
            BakeError::Integrity(IntegrityError::IncompleteTriangleList { len: 2 })
        ));
    }

    #[test]
    fn test_uv_out_of_range() {
        let mut engine = identity_engine();
        engine.uvs[2] = [0.0, 1.5];
        let err = unwrap(&mut engine, &triangle_mesh()).unwrap_err();
        assert!(matches!(
            err,
            BakeError::Integrity(IntegrityError::UvOutOfRange { atlas_vertex: 2, .. })
        ));
    }

    #[test]
    fn test_pack_vertices() {
        let packed = pack_vertices(&triangle_mesh());
        assert_eq!(packed.len(), 3);
        assert_eq!(packed[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(packed[1].normal, [0.0, 0.0, 1.0]);
    }
}
