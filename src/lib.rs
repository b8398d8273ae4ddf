//! # atlasbake
//!
//! UV atlas integration and texture-space baking for scanned meshes.
//!
//! A scan delivers mesh fragments, one per spatial anchor, and camera
//! captures. atlasbake turns them into a single textured asset:
//!
//! 1. [`mesh::merge`] flattens the fragments into one world-space mesh.
//! 2. [`atlas::unwrap`] runs an [`atlas::UnwrapEngine`] on it and validates
//!    the atlas, including its vertex-splitting correspondence.
//! 3. [`atlas::remap`] re-expands positions, normals and colors onto the
//!    atlas vertices.
//! 4. [`bake::TextureBaker`] rasterizes the mesh at its UVs, writing either
//!    interpolated vertex data or colors projected from each capture.
//! 5. [`export::export`] writes OBJ + MTL + PNG.
//!
//! [`pipeline::Pipeline`] runs all five on a [`scan::ScanSnapshot`], inline or
//! on a [`pipeline::BakeWorker`] thread.
//!
//! ## Quick Start
//!
//! ```no_run
//! use atlasbake::prelude::*;
//! use nalgebra::Matrix4;
//! use uuid::Uuid;
//!
//! let session = ScanSession::new();
//! let mesh = atlasbake::io::load("scan.ply").unwrap();
//! session.upsert_fragment(mesh.into_fragment(Uuid::new_v4(), Matrix4::identity()));
//!
//! let options = PipelineOptions::default()
//!     .with_mode(BakeMode::VertexColors(VertexPayload::Colors));
//! let mut pipeline = Pipeline::new(GridChartEngine::default(), SoftwareRasterizer::new(), options);
//!
//! let output = pipeline.run_session(&session, &CancelToken::new()).unwrap();
//! output.asset.write_to_dir("out").unwrap();
//! ```
//!
//! ## Coordinate conventions
//!
//! - Atlas UVs lie in `[0, 1]²`; atlas `v = 0` is texel row 0.
//! - Clip space is `[-w, w]` on every axis; atlas UVs map to clip as
//!   `(uv - 0.5) * 2`.
//! - Capture images have row 0 at the top of the camera frame; a capture's
//!   view-projection takes world positions straight to clip space.
//! - Colors are linear, straight alpha, 8 bits per channel on output.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atlas;
pub mod bake;
pub mod error;
pub mod export;
pub mod io;
pub mod mesh;
pub mod pipeline;
pub mod scan;

/// Prelude module for convenient imports.
///
/// ```
/// use atlasbake::prelude::*;
/// ```
pub mod prelude {
    pub use crate::atlas::{remap, unwrap, AtlasMesh, AtlasResult, GridChartEngine, UnwrapEngine};
    pub use crate::bake::{
        BakeOptions, BakeReport, CancelToken, Progress, RasterBackend, SampleFilter,
        SoftwareRasterizer, TextureBaker, VertexPayload,
    };
    pub use crate::error::{BakeError, IntegrityError, Result};
    pub use crate::export::{export, AssetNames, ExportedAsset};
    pub use crate::mesh::{merge, AnchorId, AtlasVertexId, MergedMesh, MeshFragment, SourceVertexId};
    pub use crate::pipeline::{BakeMode, BakeWorker, Pipeline, PipelineOptions, PipelineOutput};
    pub use crate::scan::{Capture, ScanEvent, ScanSession, ScanSnapshot};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::{Matrix4, Point3, Vector3};
    use uuid::Uuid;

    fn fragment(colors: Vec<[f32; 4]>, offset: f32) -> MeshFragment {
        MeshFragment::new(
            Uuid::new_v4(),
            Matrix4::new_translation(&Vector3::new(offset, 0.0, 0.0)),
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![Vector3::z(); 3],
            vec![[0, 1, 2]],
        )
        .with_colors(colors)
    }

    #[test]
    fn test_two_fragment_color_bake() {
        let red = [1.0, 0.0, 0.0, 1.0];
        let blue = [0.0, 0.0, 1.0, 1.0];

        let merged = merge([&fragment(vec![red; 3], 0.0), &fragment(vec![blue; 3], 5.0)]).unwrap();
        assert_eq!(merged.triangles[1], [3, 4, 5]);

        let atlas = unwrap(&mut GridChartEngine::default(), &merged).unwrap();
        let mesh = remap(&merged, &atlas).unwrap();
        let mut baker = TextureBaker::new(
            SoftwareRasterizer::new(),
            BakeOptions::default().with_texture_size(32),
        );
        let texture = baker.bake_vertex_colors(&mesh, &VertexPayload::Colors).unwrap();

        // Each fragment's chart keeps its own color
        assert!(texture.pixels().any(|p| p.0 == [255, 0, 0, 255]));
        assert!(texture.pixels().any(|p| p.0 == [0, 0, 255, 255]));
    }
}
