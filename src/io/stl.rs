//! STL (stereolithography) format support.
//!
//! Binary and ASCII files are both accepted. STL carries no normals worth
//! keeping per vertex and no colors, so the loaded mesh has neither.

use std::fs::File;
use std::path::Path;

use nalgebra::Point3;

use super::SourceMesh;
use crate::error::{BakeError, Result};

/// Load a mesh from an STL file.
///
/// Vertices shared between facets are welded by `stl_io`; facets that
/// collapse onto fewer than three distinct vertices are dropped.
///
/// # Example
///
/// ```no_run
/// use atlasbake::io::stl;
///
/// let mesh = stl::load("model.stl").unwrap();
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<SourceMesh> {
    let path = path.as_ref();
    let mut file = File::open(path)?;

    let stl = stl_io::read_stl(&mut file).map_err(|e| BakeError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let positions: Vec<Point3<f32>> = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0], v[1], v[2]))
        .collect();

    let triangles: Vec<[u32; 3]> = stl
        .faces
        .iter()
        .map(|f| f.vertices.map(|i| i as u32))
        .filter(|[a, b, c]| a != b && b != c && a != c)
        .collect();

    if triangles.is_empty() {
        return Err(BakeError::LoadError {
            path: path.to_path_buf(),
            message: "STL file contains no valid triangles".to_string(),
        });
    }

    Ok(SourceMesh {
        positions,
        normals: None,
        triangles,
        colors: None,
    })
}
