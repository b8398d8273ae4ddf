//! glTF format support.
//!
//! All triangle primitives of all meshes are concatenated into one mesh in
//! the file's mesh space; node transforms are not applied. Normals and
//! `COLOR_0` are kept only when every primitive provides them.

use std::path::Path;

use nalgebra::{Point3, Vector3};

use super::{fan_triangulate, SourceMesh};
use crate::error::{BakeError, Result};
use crate::mesh::Rgba;

/// Load a mesh from a glTF or GLB file.
///
/// # Example
///
/// ```no_run
/// use atlasbake::io::gltf;
///
/// let mesh = gltf::load("model.glb").unwrap();
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<SourceMesh> {
    let path = path.as_ref();

    let (document, buffers, _images) = ::gltf::import(path).map_err(|e| BakeError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut positions: Vec<Point3<f32>> = Vec::new();
    let mut normals: Vec<Vector3<f32>> = Vec::new();
    let mut colors: Vec<Rgba> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::new();
    let mut has_normals = true;
    let mut has_colors = true;

    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let Some(read_positions) = reader.read_positions() else {
                continue;
            };
            let offset = positions.len() as u32;
            positions.extend(read_positions.map(Point3::from));
            let count = positions.len() - offset as usize;

            match reader.read_normals() {
                Some(n) if has_normals => normals.extend(n.map(Vector3::from)),
                _ => has_normals = false,
            }
            match reader.read_colors(0) {
                Some(c) if has_colors => colors.extend(c.into_rgba_f32()),
                _ => has_colors = false,
            }

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().map(|i| i + offset).collect(),
                None => (offset..offset + count as u32).collect(),
            };

            match primitive.mode() {
                ::gltf::mesh::Mode::Triangles => {
                    triangles.extend(
                        indices
                            .chunks_exact(3)
                            .map(|c| [c[0], c[1], c[2]]),
                    );
                }
                ::gltf::mesh::Mode::TriangleStrip => {
                    for i in 0..indices.len().saturating_sub(2) {
                        if i % 2 == 0 {
                            triangles.push([indices[i], indices[i + 1], indices[i + 2]]);
                        } else {
                            // Reverse winding for odd triangles
                            triangles.push([indices[i], indices[i + 2], indices[i + 1]]);
                        }
                    }
                }
                ::gltf::mesh::Mode::TriangleFan => fan_triangulate(&indices, &mut triangles),
                _ => {
                    // Skip non-triangle primitives (points, lines)
                }
            }
        }
    }

    if triangles.is_empty() {
        return Err(BakeError::LoadError {
            path: path.to_path_buf(),
            message: "glTF file contains no triangle meshes".to_string(),
        });
    }

    let complete = |len: usize| len == positions.len();
    Ok(SourceMesh {
        normals: (has_normals && complete(normals.len())).then_some(normals),
        colors: (has_colors && complete(colors.len())).then_some(colors),
        positions,
        triangles,
    })
}
