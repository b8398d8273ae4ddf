//! Core mesh data structures.
//!
//! This module provides the scanned fragment type, the merged world-space
//! mesh and the typed indices shared by the atlas and bake stages.
//!
//! # Overview
//!
//! A scan produces one [`MeshFragment`] per spatial anchor. Before a bake the
//! fragments are flattened by [`merge`] into a single [`MergedMesh`] whose
//! vertex arena is the *source* arena. The unwrap engine then produces a
//! second, larger *atlas* arena (see [`crate::atlas`]).
//!
//! # Index Types
//!
//! - [`SourceVertexId`] - a vertex of the merged mesh
//! - [`AtlasVertexId`] - a vertex of the atlas arena
//! - [`TriangleId`] - a triangle, valid in both index buffers
//!
//! ```
//! use atlasbake::mesh::{merge, MeshFragment};
//! use nalgebra::{Matrix4, Point3, Vector3};
//! use uuid::Uuid;
//!
//! let quad = MeshFragment::new(
//!     Uuid::new_v4(),
//!     Matrix4::identity(),
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     vec![Vector3::z(); 4],
//!     vec![[0, 1, 2], [0, 2, 3]],
//! );
//!
//! let merged = merge([&quad, &quad]).unwrap();
//! assert_eq!(merged.num_vertices(), 8);
//! assert_eq!(merged.triangles[3], [4, 6, 7]);
//! ```

mod fragment;
mod index;
mod merge;

pub use fragment::{bounding_box, compute_vertex_normals, AnchorId, MeshFragment, Rgba};
pub use index::{AtlasVertexId, SourceVertexId, TriangleId};
pub use merge::{merge, MergedMesh};

pub(crate) use merge::check_triangles;
