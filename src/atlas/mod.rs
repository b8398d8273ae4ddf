//! UV atlas integration.
//!
//! This module sits between the merged mesh and the baker:
//!
//! - [`UnwrapEngine`] is the boundary to an external unwrapping library.
//! - [`unwrap`] packs a [`MergedMesh`](crate::mesh::MergedMesh), calls the
//!   engine, copies its output into an [`AtlasResult`] and validates it.
//! - [`remap`] gathers the merged mesh's attributes through the atlas mapping
//!   into an [`AtlasMesh`].
//! - [`GridChartEngine`] is a simple deterministic engine, one chart per
//!   triangle.
//! - `XatlasEngine` (feature `xatlas`) segments, parameterizes and packs
//!   charts with xatlas.
//!
//! # Example
//!
//! ```
//! use atlasbake::atlas::{remap, unwrap, GridChartEngine};
//! use atlasbake::mesh::MergedMesh;
//! use nalgebra::{Point3, Vector3};
//!
//! let merged = MergedMesh {
//!     positions: vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     normals: vec![Vector3::z(); 4],
//!     triangles: vec![[0, 1, 2], [0, 2, 3]],
//!     colors: None,
//! };
//!
//! let atlas = unwrap(&mut GridChartEngine::default(), &merged).unwrap();
//! let mesh = remap(&merged, &atlas).unwrap();
//! assert_eq!(mesh.num_vertices(), 6);
//! assert_eq!(mesh.source_uvs().len(), 4);
//! ```

mod adapter;
mod engine;
mod grid;
mod remap;
#[cfg(feature = "xatlas")]
mod xatlas;

pub use adapter::{pack_vertices, unwrap, AtlasResult};
pub use engine::{EngineOutput, PackedVertex, UnwrapEngine, UnwrapInput, VertexBufferView};
pub use grid::{GridChartEngine, GridChartOptions};
pub use remap::{remap, AtlasMesh};
#[cfg(feature = "xatlas")]
pub use xatlas::{XatlasEngine, XatlasOptions};
