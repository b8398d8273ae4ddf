//! Textured asset export.
//!
//! An atlas mesh and its baked texture become three files: an OBJ mesh that
//! names an MTL material library, whose single material names a PNG image.
//!
//! ```
//! use atlasbake::atlas::{remap, unwrap, GridChartEngine};
//! use atlasbake::export::{export, AssetNames};
//! use atlasbake::mesh::MergedMesh;
//! use image::RgbaImage;
//! use nalgebra::{Point3, Vector3};
//!
//! let merged = MergedMesh {
//!     positions: vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
//!     normals: vec![Vector3::z(); 3],
//!     triangles: vec![[0, 1, 2]],
//!     colors: None,
//! };
//! let atlas = unwrap(&mut GridChartEngine::default(), &merged).unwrap();
//! let mesh = remap(&merged, &atlas).unwrap();
//!
//! let asset = export(&mesh, &RgbaImage::new(8, 8), &AssetNames::default()).unwrap();
//! assert!(asset.mesh_text.starts_with("mtllib model.mtl\n"));
//! assert!(asset.material_text.contains("map_Kd texture.png"));
//! ```

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};

use crate::atlas::AtlasMesh;
use crate::error::{BakeError, Result};
use crate::io::{mtl, obj};

/// Name of the single material written.
pub const MATERIAL_NAME: &str = "material0";

/// Name of the object written.
pub const OBJECT_NAME: &str = "Model";

/// File names of an exported asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetNames {
    /// Mesh file.
    pub mesh: String,
    /// Material library file, referenced by the mesh.
    pub material: String,
    /// Texture file, referenced by the material.
    pub texture: String,
}

impl Default for AssetNames {
    fn default() -> Self {
        Self {
            mesh: "model.obj".to_string(),
            material: "model.mtl".to_string(),
            texture: "texture.png".to_string(),
        }
    }
}

impl AssetNames {
    /// Names derived from a mesh file name: `scan.obj` gives `scan.mtl`
    /// and `scan.png`.
    pub fn from_mesh_name(mesh: &str) -> Self {
        let stem = Path::new(mesh)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        Self {
            mesh: format!("{}.obj", stem),
            material: format!("{}.mtl", stem),
            texture: format!("{}.png", stem),
        }
    }
}

/// The three parts of an exported asset, in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedAsset {
    /// File names.
    pub names: AssetNames,
    /// OBJ text.
    pub mesh_text: String,
    /// MTL text.
    pub material_text: String,
    /// PNG bytes.
    pub image_bytes: Vec<u8>,
}

impl ExportedAsset {
    /// Write the three files into `dir`, creating it if needed.
    ///
    /// Returns the paths written, mesh first.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<[PathBuf; 3]> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let paths = [
            dir.join(&self.names.mesh),
            dir.join(&self.names.material),
            dir.join(&self.names.texture),
        ];
        let contents: [&[u8]; 3] = [
            self.mesh_text.as_bytes(),
            self.material_text.as_bytes(),
            &self.image_bytes,
        ];
        for (path, bytes) in paths.iter().zip(contents) {
            std::fs::write(path, bytes).map_err(|e| BakeError::SaveError {
                path: path.clone(),
                message: e.to_string(),
            })?;
        }

        log::info!("Wrote {:?}, {:?}, {:?}", paths[0], paths[1], paths[2]);
        Ok(paths)
    }
}

/// Serialize an atlas mesh and its baked texture.
///
/// # Errors
///
/// `EmptyInput` for a mesh without triangles or an image without pixels.
pub fn export(mesh: &AtlasMesh, texture: &RgbaImage, names: &AssetNames) -> Result<ExportedAsset> {
    if mesh.triangles.is_empty() {
        return Err(BakeError::EmptyInput("atlas mesh has no triangles"));
    }
    if texture.width() == 0 || texture.height() == 0 {
        return Err(BakeError::EmptyInput("baked texture has no pixels"));
    }

    let mesh_text = obj::write(mesh, &names.material, OBJECT_NAME, MATERIAL_NAME);
    let material_text = mtl::write(&[mtl::Material::textured(MATERIAL_NAME, &names.texture)]);

    let mut image_bytes = Vec::new();
    texture
        .write_to(&mut Cursor::new(&mut image_bytes), ImageFormat::Png)
        .map_err(|e| BakeError::SaveError {
            path: PathBuf::from(&names.texture),
            message: e.to_string(),
        })?;

    log::debug!(
        "Exported {} vertices, {} triangles, {} PNG bytes",
        mesh.num_vertices(),
        mesh.num_triangles(),
        image_bytes.len()
    );

    Ok(ExportedAsset {
        names: names.clone(),
        mesh_text,
        material_text,
        image_bytes,
    })
}
