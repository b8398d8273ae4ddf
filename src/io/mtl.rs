//! Wavefront MTL text.

use std::fmt::Write as _;

use crate::error::{BakeError, Result};

/// One `newmtl` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Material name.
    pub name: String,
    /// `Ka`.
    pub ambient: [f32; 3],
    /// `Kd`.
    pub diffuse: [f32; 3],
    /// `Ks`.
    pub specular: [f32; 3],
    /// `map_Kd` image file.
    pub diffuse_map: Option<String>,
}

impl Material {
    /// A white, non-specular material textured with `diffuse_map`.
    pub fn textured(name: &str, diffuse_map: &str) -> Self {
        Self {
            name: name.to_string(),
            ambient: [1.0; 3],
            diffuse: [1.0; 3],
            specular: [0.0; 3],
            diffuse_map: Some(diffuse_map.to_string()),
        }
    }
}

/// Write materials as MTL text.
pub fn write(materials: &[Material]) -> String {
    let mut out = String::new();
    let rgb = |c: [f32; 3]| format!("{:.3} {:.3} {:.3}", c[0], c[1], c[2]);
    for (i, m) in materials.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "newmtl {}", m.name);
        let _ = writeln!(out, "Ka {}", rgb(m.ambient));
        let _ = writeln!(out, "Kd {}", rgb(m.diffuse));
        let _ = writeln!(out, "Ks {}", rgb(m.specular));
        if let Some(map) = &m.diffuse_map {
            let _ = writeln!(out, "map_Kd {}", map);
        }
    }
    out
}

/// Parse MTL text. Statements other than `newmtl`, `Ka`, `Kd`, `Ks` and
/// `map_Kd` are ignored.
pub fn parse(text: &str) -> Result<Vec<Material>> {
    let mut materials: Vec<Material> = Vec::new();

    for (n, raw_line) in text.lines().enumerate() {
        let line = n + 1;
        let content = raw_line.split('#').next().unwrap_or("").trim();
        let Some((keyword, rest)) = content
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .or_else(|| (!content.is_empty()).then_some((content, "")))
        else {
            continue;
        };

        let error = |message: &str| BakeError::Parse {
            format: "MTL",
            line,
            message: message.to_string(),
        };

        if keyword == "newmtl" {
            if rest.is_empty() {
                return Err(error("newmtl needs a name"));
            }
            materials.push(Material {
                name: rest.to_string(),
                ambient: [1.0; 3],
                diffuse: [1.0; 3],
                specular: [0.0; 3],
                diffuse_map: None,
            });
            continue;
        }

        let field = match keyword {
            "Ka" | "Kd" | "Ks" | "map_Kd" => keyword,
            _ => continue,
        };
        let current = materials
            .last_mut()
            .ok_or_else(|| error("statement before newmtl"))?;

        if field == "map_Kd" {
            if rest.is_empty() {
                return Err(error("map_Kd needs a file name"));
            }
            current.diffuse_map = Some(rest.to_string());
            continue;
        }

        let values: Vec<f32> = rest
            .split_whitespace()
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| error("invalid color"))?;
        let color = match values.as_slice() {
            [r, g, b] => [*r, *g, *b],
            [v] => [*v; 3],
            _ => return Err(error("color needs 1 or 3 components")),
        };
        match field {
            "Ka" => current.ambient = color,
            "Kd" => current.diffuse = color,
            _ => current.specular = color,
        }
    }

    Ok(materials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_textured_material() {
        let text = write(&[Material::textured("material0", "texture.png")]);
        assert_eq!(
            text,
            "newmtl material0\nKa 1.000 1.000 1.000\nKd 1.000 1.000 1.000\nKs 0.000 0.000 0.000\nmap_Kd texture.png\n"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let materials = vec![
            Material::textured("material0", "texture.png"),
            Material {
                name: "plain".to_string(),
                ambient: [0.1, 0.2, 0.3],
                diffuse: [0.5; 3],
                specular: [0.0; 3],
                diffuse_map: None,
            },
        ];
        assert_eq!(parse(&write(&materials)).unwrap(), materials);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse("Kd 1 1 1\n").unwrap_err(),
            BakeError::Parse { line: 1, .. }
        ));
        assert!(parse("newmtl a\nKd 1 x 1\n").is_err());
        assert!(parse("newmtl a\nKs 1 1\n").is_err());
        // Unknown statements are fine
        assert_eq!(parse("newmtl a\nNs 10\nillum 2\n").unwrap().len(), 1);
    }
}
