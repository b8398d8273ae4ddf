//! Mesh file I/O.
//!
//! Source meshes are loaded into a [`SourceMesh`], which becomes a
//! [`MeshFragment`] once it is given an anchor and a world transform.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Notes |
//! |--------|-----------|------|-------|
//! | Wavefront OBJ | `.obj` | ✓ | `v x y z r g b` vertex colors |
//! | STL | `.stl` | ✓ | Binary and ASCII |
//! | PLY | `.ply` | ✓ | Vertex colors and normals |
//! | glTF | `.gltf`, `.glb` | ✓ | `COLOR_0` and normals |
//!
//! Baked output is written by [`crate::export`] as OBJ + MTL + PNG; the
//! [`obj`] and [`mtl`] modules also parse that text back.
//!
//! # Usage
//!
//! ```no_run
//! use atlasbake::io;
//! use nalgebra::Matrix4;
//! use uuid::Uuid;
//!
//! let mesh = io::load("scan.ply").unwrap();
//! let fragment = mesh.into_fragment(Uuid::new_v4(), Matrix4::identity());
//! ```

pub mod gltf;
pub mod mtl;
pub mod obj;
pub mod ply;
pub mod stl;

use std::path::Path;

use nalgebra::{Matrix4, Point3, Vector3};

use crate::error::{BakeError, Result};
use crate::mesh::{compute_vertex_normals, AnchorId, MeshFragment, Rgba};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Wavefront OBJ format.
    Obj,
    /// STL (stereolithography) format.
    Stl,
    /// PLY (Stanford polygon) format.
    Ply,
    /// glTF format.
    Gltf,
    /// glTF binary format.
    Glb,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "obj" => Some(Format::Obj),
            "stl" => Some(Format::Stl),
            "ply" => Some(Format::Ply),
            "gltf" => Some(Format::Gltf),
            "glb" => Some(Format::Glb),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }
}

/// A triangle mesh as read from a file, in its own local frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMesh {
    /// Vertex positions.
    pub positions: Vec<Point3<f32>>,
    /// Vertex normals, if the file carries one per position.
    pub normals: Option<Vec<Vector3<f32>>>,
    /// Triangles.
    pub triangles: Vec<[u32; 3]>,
    /// Vertex colors, if the file carries one per position.
    pub colors: Option<Vec<Rgba>>,
}

impl SourceMesh {
    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Turn the mesh into a fragment of the given anchor.
    ///
    /// Missing normals are computed from the triangles.
    pub fn into_fragment(self, id: AnchorId, world_transform: Matrix4<f32>) -> MeshFragment {
        let normals = match self.normals {
            Some(normals) if normals.len() == self.positions.len() => normals,
            _ => compute_vertex_normals(&self.positions, &self.triangles),
        };
        let fragment = MeshFragment::new(id, world_transform, self.positions, normals, self.triangles);
        match self.colors {
            Some(colors) => fragment.with_colors(colors),
            None => fragment,
        }
    }
}

/// Fan-triangulate a polygon, dropping faces with fewer than three corners.
pub(crate) fn fan_triangulate(polygon: &[u32], out: &mut Vec<[u32; 3]>) {
    for i in 1..polygon.len().saturating_sub(1) {
        out.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

/// Load a mesh from a file with automatic format detection.
///
/// The format is determined by the file extension.
pub fn load<P: AsRef<Path>>(path: P) -> Result<SourceMesh> {
    let path = path.as_ref();
    let format = Format::from_path(path).ok_or_else(|| BakeError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })?;

    let mesh = match format {
        Format::Obj => obj::load(path),
        Format::Stl => stl::load(path),
        Format::Ply => ply::load(path),
        Format::Gltf | Format::Glb => gltf::load(path),
    }?;

    log::info!(
        "Loaded {:?}: {} vertices, {} triangles{}",
        path,
        mesh.num_vertices(),
        mesh.num_triangles(),
        if mesh.colors.is_some() { ", colored" } else { "" }
    );
    Ok(mesh)
}
