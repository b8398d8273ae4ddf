//! PLY (Stanford polygon) format support.
//!
//! Reads positions, faces and, when present, per-vertex normals
//! (`nx ny nz`) and colors (`red green blue [alpha]`). Integer color
//! channels are scaled from `[0, 255]`; float channels are taken as is.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use nalgebra::{Point3, Vector3};
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use super::{fan_triangulate, SourceMesh};
use crate::error::{BakeError, Result};
use crate::mesh::Rgba;

/// Load a mesh from a PLY file.
///
/// # Example
///
/// ```no_run
/// use atlasbake::io::ply;
///
/// let mesh = ply::load("scan.ply").unwrap();
/// println!("colored: {}", mesh.colors.is_some());
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<SourceMesh> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let load_error = |message: &str| BakeError::LoadError {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| load_error(&e.to_string()))?;

    let vertex_element = ply
        .payload
        .get("vertex")
        .ok_or_else(|| load_error("PLY file has no vertex element"))?;

    let mut positions = Vec::with_capacity(vertex_element.len());
    let mut normals = Vec::with_capacity(vertex_element.len());
    let mut colors = Vec::with_capacity(vertex_element.len());
    let mut has_normals = true;
    let mut has_colors = true;

    for vertex in vertex_element {
        let coord = |name: &str| {
            get_float_property(vertex, name)
                .ok_or_else(|| load_error(&format!("vertex missing {} coordinate", name)))
        };
        positions.push(Point3::new(coord("x")?, coord("y")?, coord("z")?));

        match (
            get_float_property(vertex, "nx"),
            get_float_property(vertex, "ny"),
            get_float_property(vertex, "nz"),
        ) {
            (Some(x), Some(y), Some(z)) if has_normals => normals.push(Vector3::new(x, y, z)),
            _ => has_normals = false,
        }

        match get_color(vertex) {
            Some(color) if has_colors => colors.push(color),
            _ => has_colors = false,
        }
    }

    let face_element = ply
        .payload
        .get("face")
        .ok_or_else(|| load_error("PLY file has no face element"))?;

    let mut triangles = Vec::with_capacity(face_element.len());
    for face in face_element {
        let indices = get_list_property(face, "vertex_indices")
            .or_else(|| get_list_property(face, "vertex_index"))
            .ok_or_else(|| load_error("face missing vertex_indices property"))?;
        fan_triangulate(&indices, &mut triangles);
    }

    if triangles.is_empty() {
        return Err(load_error("PLY file contains no faces"));
    }

    Ok(SourceMesh {
        positions,
        normals: has_normals.then_some(normals),
        triangles,
        colors: has_colors.then_some(colors),
    })
}

fn get_float_property(element: &DefaultElement, name: &str) -> Option<f32> {
    match element.get(name)? {
        Property::Float(v) => Some(*v),
        Property::Double(v) => Some(*v as f32),
        Property::Int(v) => Some(*v as f32),
        Property::UInt(v) => Some(*v as f32),
        Property::Short(v) => Some(*v as f32),
        Property::UShort(v) => Some(*v as f32),
        Property::Char(v) => Some(*v as f32),
        Property::UChar(v) => Some(*v as f32),
        _ => None,
    }
}

/// A color channel in `[0, 1]`.
fn get_channel(element: &DefaultElement, names: &[&str]) -> Option<f32> {
    names.iter().find_map(|name| match element.get(*name)? {
        Property::UChar(v) => Some(*v as f32 / 255.0),
        Property::UShort(v) => Some(*v as f32 / 65535.0),
        Property::Float(v) => Some(*v),
        Property::Double(v) => Some(*v as f32),
        _ => None,
    })
}

fn get_color(vertex: &DefaultElement) -> Option<Rgba> {
    Some([
        get_channel(vertex, &["red", "r"])?,
        get_channel(vertex, &["green", "g"])?,
        get_channel(vertex, &["blue", "b"])?,
        get_channel(vertex, &["alpha", "a"]).unwrap_or(1.0),
    ])
}

fn get_list_property(element: &DefaultElement, name: &str) -> Option<Vec<u32>> {
    match element.get(name)? {
        Property::ListInt(v) => Some(v.iter().map(|&x| x as u32).collect()),
        Property::ListUInt(v) => Some(v.clone()),
        Property::ListShort(v) => Some(v.iter().map(|&x| x as u32).collect()),
        Property::ListUShort(v) => Some(v.iter().map(|&x| x as u32).collect()),
        Property::ListChar(v) => Some(v.iter().map(|&x| x as u32).collect()),
        Property::ListUChar(v) => Some(v.iter().map(|&x| x as u32).collect()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("atlasbake-{}-{}", std::process::id(), name));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_colored_quad() {
        let path = write_temp(
            "quad.ply",
            "ply\nformat ascii 1.0\n\
             element vertex 4\n\
             property float x\nproperty float y\nproperty float z\n\
             property uchar red\nproperty uchar green\nproperty uchar blue\n\
             element face 1\nproperty list uchar int vertex_indices\nend_header\n\
             0 0 0 255 0 0\n1 0 0 0 255 0\n1 1 0 0 0 255\n0 1 0 255 255 255\n\
             4 0 1 2 3\n",
        );
        let mesh = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        assert!(mesh.normals.is_none());
        let colors = mesh.colors.unwrap();
        assert_eq!(colors[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(colors[3], [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_load_with_normals() {
        let path = write_temp(
            "tri.ply",
            "ply\nformat ascii 1.0\n\
             element vertex 3\n\
             property float x\nproperty float y\nproperty float z\n\
             property float nx\nproperty float ny\nproperty float nz\n\
             element face 1\nproperty list uchar int vertex_indices\nend_header\n\
             0 0 0 0 0 1\n1 0 0 0 0 1\n0 1 0 0 0 1\n\
             3 0 1 2\n",
        );
        let mesh = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(mesh.colors.is_none());
        assert_eq!(mesh.normals.unwrap(), vec![Vector3::z(); 3]);
    }

    #[test]
    fn test_load_without_faces_fails() {
        let path = write_temp(
            "points.ply",
            "ply\nformat ascii 1.0\nelement vertex 1\n\
             property float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n",
        );
        let result = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(BakeError::LoadError { .. })));
    }
}
