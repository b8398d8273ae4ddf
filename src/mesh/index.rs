//! Index types for mesh elements.
//!
//! Merged meshes and atlas meshes are two separate vertex arenas. An atlas
//! vertex is never interchangeable with a source vertex (seam splitting makes
//! the relation one-to-many), so each arena gets its own index type.

use std::fmt::{self, Debug};

/// A vertex of the merged (source) mesh.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct SourceVertexId(u32);

/// A vertex of the unwrap engine's output (atlas) arena.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct AtlasVertexId(u32);

/// A triangle, shared by the merged and atlas index buffers.
///
/// The unwrap engine re-indexes triangles but never adds or drops one, so the
/// same id addresses triangle `t` in both buffers.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TriangleId(u32);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl $name {
            /// Create a new index from a raw value.
            ///
            /// # Panics
            /// Panics in debug builds if the value does not fit in 32 bits.
            #[inline]
            pub fn new(index: usize) -> Self {
                debug_assert!(index <= u32::MAX as usize, "index {} too large for u32", index);
                Self(index as u32)
            }

            /// Get the raw index value.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Get the raw value as stored in index buffers.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $display, self.0)
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                Self(v)
            }
        }

        impl From<$name> for u32 {
            fn from(v: $name) -> u32 {
                v.0
            }
        }
    };
}

impl_index_type!(SourceVertexId, "S");
impl_index_type!(AtlasVertexId, "A");
impl_index_type!(TriangleId, "T");
