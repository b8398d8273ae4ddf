//! Wavefront OBJ text.
//!
//! [`write`] produces the textured mesh of a bake; [`parse`] reads OBJ text
//! back into an [`ObjDocument`] and [`load`] turns an OBJ file into a
//! [`SourceMesh`].
//!
//! Texture coordinates follow the OBJ convention of `v = 0` at the bottom of
//! the image. Atlas UVs put `v = 0` at texel row 0, so `write` stores
//! `(u, 1 - v)`. [`ObjDocument::atlas_uvs`] undoes that.

use std::fmt::Write as _;
use std::path::Path;

use nalgebra::{Point2, Point3, Vector3};

use super::{fan_triangulate, SourceMesh};
use crate::atlas::AtlasMesh;
use crate::error::{BakeError, Result};
use crate::mesh::Rgba;

/// One corner of a face, with 0-based indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjVertex {
    /// Position index.
    pub position: u32,
    /// Texture coordinate index.
    pub uv: Option<u32>,
    /// Normal index.
    pub normal: Option<u32>,
}

/// Parsed OBJ content. Polygons are fan-triangulated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjDocument {
    /// `mtllib` names.
    pub material_libraries: Vec<String>,
    /// `o` names.
    pub objects: Vec<String>,
    /// `usemtl` names.
    pub materials: Vec<String>,
    /// `v` entries.
    pub positions: Vec<Point3<f32>>,
    /// Colors from `v x y z r g b`, present only if every `v` has one.
    pub colors: Option<Vec<Rgba>>,
    /// `vt` entries as written in the file.
    pub uvs: Vec<Point2<f32>>,
    /// `vn` entries.
    pub normals: Vec<Vector3<f32>>,
    /// Triangles.
    pub faces: Vec<[ObjVertex; 3]>,
}

impl ObjDocument {
    /// Texture coordinates in atlas convention, `(u, 1 - v)`.
    pub fn atlas_uvs(&self) -> Vec<Point2<f32>> {
        self.uvs.iter().map(|uv| Point2::new(uv.x, 1.0 - uv.y)).collect()
    }

    /// Position triangles.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        self.faces.iter().map(|f| f.map(|c| c.position)).collect()
    }

    /// Keep positions, triangles and colors. Normals are kept only when
    /// every corner's normal index equals its position index.
    pub fn into_source_mesh(self) -> SourceMesh {
        let triangles = self.triangles();
        let per_vertex_normals = self.normals.len() == self.positions.len()
            && self
                .faces
                .iter()
                .flatten()
                .all(|c| c.normal == Some(c.position));

        SourceMesh {
            normals: per_vertex_normals.then_some(self.normals),
            positions: self.positions,
            triangles,
            colors: self.colors,
        }
    }
}

/// Write a textured atlas mesh as OBJ text.
///
/// Vertex `i` of the atlas mesh is both `v` and `vt` number `i + 1`, so faces
/// are written as `f a/a b/b c/c` with the winding unchanged.
pub fn write(mesh: &AtlasMesh, material_library: &str, object: &str, material: &str) -> String {
    let mut out = String::with_capacity(mesh.num_vertices() * 48 + mesh.num_triangles() * 24);

    let _ = writeln!(out, "mtllib {}", material_library);
    let _ = writeln!(out, "o {}", object);
    let _ = writeln!(out, "usemtl {}", material);

    for p in &mesh.positions {
        let _ = writeln!(out, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z);
    }
    for uv in &mesh.uvs {
        let _ = writeln!(out, "vt {:.6} {:.6}", uv.x, 1.0 - uv.y);
    }
    for [a, b, c] in mesh.triangles.iter().map(|t| t.map(|i| i + 1)) {
        let _ = writeln!(out, "f {a}/{a} {b}/{b} {c}/{c}");
    }

    out
}

fn parse_error(line: usize, message: impl Into<String>) -> BakeError {
    BakeError::Parse {
        format: "OBJ",
        line,
        message: message.into(),
    }
}

fn parse_floats<'a>(
    fields: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<Vec<f32>> {
    fields
        .map(|f| {
            f.parse::<f32>()
                .map_err(|_| parse_error(line, format!("invalid number '{}'", f)))
        })
        .collect()
}

/// Resolve a 1-based (or negative, relative) OBJ index against `count` entries.
fn resolve_index(field: &str, count: usize, line: usize) -> Result<u32> {
    let raw: i64 = field
        .parse()
        .map_err(|_| parse_error(line, format!("invalid index '{}'", field)))?;
    let index = match raw {
        0 => return Err(parse_error(line, "index 0 is not valid in OBJ")),
        i if i > 0 => i - 1,
        i => count as i64 + i,
    };
    if index < 0 || index as usize >= count {
        return Err(parse_error(
            line,
            format!("index {} out of range for {} entries", raw, count),
        ));
    }
    Ok(index as u32)
}

/// Parse OBJ text.
///
/// Supports `v` (with optional `r g b`), `vt`, `vn`, `f` in all four corner
/// forms, `o`, `mtllib` and `usemtl`. Other statements are ignored.
///
/// # Errors
///
/// [`BakeError::Parse`] with the 1-based line number.
pub fn parse(text: &str) -> Result<ObjDocument> {
    let mut doc = ObjDocument::default();
    let mut colors: Vec<Rgba> = Vec::new();
    let mut all_colored = true;

    for (n, raw_line) in text.lines().enumerate() {
        let line = n + 1;
        let content = raw_line.split('#').next().unwrap_or("").trim();
        let mut fields = content.split_whitespace();
        let Some(keyword) = fields.next() else {
            continue;
        };

        match keyword {
            "v" => {
                let values = parse_floats(fields, line)?;
                match values.len() {
                    3 | 4 => all_colored = false,
                    6 | 7 if all_colored => colors.push([values[3], values[4], values[5], 1.0]),
                    6 | 7 => {}
                    _ => return Err(parse_error(line, "vertex needs 3 coordinates")),
                }
                doc.positions.push(Point3::new(values[0], values[1], values[2]));
            }
            "vt" => {
                let values = parse_floats(fields, line)?;
                if values.is_empty() {
                    return Err(parse_error(line, "texture coordinate needs a value"));
                }
                doc.uvs.push(Point2::new(values[0], values.get(1).copied().unwrap_or(0.0)));
            }
            "vn" => {
                let values = parse_floats(fields, line)?;
                if values.len() < 3 {
                    return Err(parse_error(line, "normal needs 3 components"));
                }
                doc.normals.push(Vector3::new(values[0], values[1], values[2]));
            }
            "f" => {
                let mut corners = Vec::new();
                for field in fields {
                    let mut parts = field.split('/');
                    let position = match parts.next() {
                        Some(p) if !p.is_empty() => resolve_index(p, doc.positions.len(), line)?,
                        _ => return Err(parse_error(line, "face corner has no position")),
                    };
                    let uv = match parts.next() {
                        Some(t) if !t.is_empty() => Some(resolve_index(t, doc.uvs.len(), line)?),
                        _ => None,
                    };
                    let normal = match parts.next() {
                        Some(nm) if !nm.is_empty() => {
                            Some(resolve_index(nm, doc.normals.len(), line)?)
                        }
                        _ => None,
                    };
                    corners.push(ObjVertex {
                        position,
                        uv,
                        normal,
                    });
                }
                if corners.len() < 3 {
                    return Err(parse_error(line, "face needs at least 3 corners"));
                }
                let order: Vec<u32> = (0..corners.len() as u32).collect();
                let mut fan = Vec::new();
                fan_triangulate(&order, &mut fan);
                doc.faces
                    .extend(fan.iter().map(|t| t.map(|i| corners[i as usize])));
            }
            "o" => doc.objects.push(fields.collect::<Vec<_>>().join(" ")),
            "mtllib" => doc.material_libraries.extend(fields.map(str::to_string)),
            "usemtl" => doc.materials.push(fields.collect::<Vec<_>>().join(" ")),
            _ => {}
        }
    }

    if all_colored && !doc.positions.is_empty() {
        doc.colors = Some(colors);
    }
    Ok(doc)
}

/// Load an OBJ file as a source mesh.
pub fn load<P: AsRef<Path>>(path: P) -> Result<SourceMesh> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let doc = parse(&text).map_err(|e| BakeError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if doc.faces.is_empty() {
        return Err(BakeError::LoadError {
            path: path.to_path_buf(),
            message: "OBJ file contains no faces".to_string(),
        });
    }
    Ok(doc.into_source_mesh())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_corner_forms() {
        let doc = parse(
            "# comment\n\
             v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             vt 0 0\nvt 1 0\nvt 1 1\n\
             vn 0 0 1\n\
             f 1 2 3\n\
             f 1/1 2/2 3/3\n\
             f 1//1 2//1 3//1\n\
             f -4/1/1 -3/2/1 -2/3/1 -1/3/1\n",
        )
        .unwrap();

        assert_eq!(doc.positions.len(), 4);
        assert_eq!(doc.faces.len(), 5);
        assert_eq!(doc.faces[0][2].uv, None);
        assert_eq!(doc.faces[1][1].uv, Some(1));
        assert_eq!(doc.faces[2][0].normal, Some(0));
        // Quad fan-triangulated with negative indices
        assert_eq!(doc.triangles()[3..], [[0, 1, 2], [0, 2, 3]]);
        assert!(doc.colors.is_none());
    }

    #[test]
    fn test_parse_vertex_colors() {
        let doc = parse("v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf 1 2 3\n").unwrap();
        let colors = doc.colors.unwrap();
        assert_eq!(colors[1], [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = parse("v 0 0 0\nv 1 0 0\nf 1 2 5\n").unwrap_err();
        assert!(matches!(err, BakeError::Parse { line: 3, .. }), "{}", err);

        let err = parse("v 0 zero 0\n").unwrap_err();
        assert!(matches!(err, BakeError::Parse { line: 1, .. }));

        assert!(parse("v 0 0 0\nf 1 1\n").is_err());
        assert!(parse("v 0 0 0\nf 0 1 1\n").is_err());
    }

    #[test]
    fn test_source_mesh_keeps_matching_normals() {
        let doc = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nvn 0 0 1\nvn 0 0 1\nf 1//1 2//2 3//3\n")
            .unwrap();
        let mesh = doc.clone().into_source_mesh();
        assert_eq!(mesh.normals.map(|n| n.len()), Some(3));

        let shared = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n").unwrap();
        assert!(shared.into_source_mesh().normals.is_none());
    }
}
