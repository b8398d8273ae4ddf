//! Error types for atlasbake.
//!
//! Every stage of the pipeline validates its own postconditions and reports
//! violations through [`BakeError`]. Nothing is clamped or coerced: an index
//! that is out of range aborts the bake instead of silently corrupting the
//! array alignment that later stages rely on.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using [`BakeError`].
pub type Result<T> = std::result::Result<T, BakeError>;

/// Errors that can occur while merging, unwrapping, baking or exporting.
#[derive(Error, Debug)]
pub enum BakeError {
    /// Merged or atlas data violates an invariant.
    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityError),

    /// An external collaborator (unwrap engine, raster backend, image decoder)
    /// could not provide what was asked of it.
    #[error("{resource} unavailable: {message}")]
    ResourceUnavailable {
        /// The resource that failed.
        resource: &'static str,
        /// Error message.
        message: String,
    },

    /// There is nothing to bake.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading a mesh or manifest from file.
    #[error("failed to load {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving to file.
    #[error("failed to save {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Malformed text in a mesh or material file.
    #[error("{format} parse error on line {line}: {message}")]
    Parse {
        /// The format being parsed.
        format: &'static str,
        /// 1-based line number.
        line: usize,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

/// Invariant violations in merged, atlas or remapped mesh data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrityError {
    /// A fragment's triangle references a vertex outside its own position array.
    #[error("fragment {anchor}: triangle {triangle} references vertex {vertex} but the fragment has {vertex_count} vertices")]
    FragmentIndexOutOfRange {
        /// The offending fragment.
        anchor: Uuid,
        /// Triangle index within the fragment.
        triangle: usize,
        /// The out-of-range vertex index.
        vertex: u32,
        /// Number of vertices in the fragment.
        vertex_count: usize,
    },

    /// A fragment's per-vertex attribute is not aligned with its positions.
    #[error("fragment {anchor}: {attribute} has {actual} entries, expected {expected}")]
    FragmentAttributeMismatch {
        /// The offending fragment.
        anchor: Uuid,
        /// Name of the attribute array.
        attribute: &'static str,
        /// Number of positions.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Offsetting a fragment's indices would not fit the `u32` index range.
    #[error("fragment {anchor}: vertex offset {offset} overflows 32-bit indices")]
    FragmentIndexOverflow {
        /// The fragment whose triangles no longer fit.
        anchor: Uuid,
        /// Vertices merged before this fragment.
        offset: usize,
    },

    /// A triangle references a vertex outside the mesh it belongs to.
    #[error("triangle {triangle} references vertex {vertex} but the mesh has {vertex_count} vertices")]
    TriangleIndexOutOfRange {
        /// Triangle index.
        triangle: usize,
        /// The out-of-range vertex index.
        vertex: u32,
        /// Number of vertices.
        vertex_count: usize,
    },

    /// Two arrays that must be index-aligned have different lengths.
    #[error("{attribute} has {actual} entries, expected {expected}")]
    AttributeLengthMismatch {
        /// Name of the attribute array.
        attribute: &'static str,
        /// Required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A flat index buffer does not describe whole triangles.
    #[error("index buffer length {len} is not a multiple of 3")]
    IncompleteTriangleList {
        /// Length of the index buffer.
        len: usize,
    },

    /// The atlas has fewer vertices than the mesh it was computed from.
    #[error("atlas has {atlas} vertices, fewer than the {source_count} source vertices")]
    AtlasVertexCountTooSmall {
        /// Atlas vertex count.
        atlas: usize,
        /// Source vertex count.
        source_count: usize,
    },

    /// An atlas vertex maps to a source vertex that does not exist.
    #[error("atlas vertex {atlas_vertex} maps to source vertex {source_vertex} but the mesh has {source_count} vertices")]
    MappingOutOfRange {
        /// The atlas vertex.
        atlas_vertex: usize,
        /// The out-of-range source vertex.
        source_vertex: u32,
        /// Number of source vertices.
        source_count: usize,
    },

    /// An atlas UV is not finite or lies outside the unit square.
    #[error("atlas vertex {atlas_vertex} has uv ({u}, {v}) outside [0, 1]²")]
    UvOutOfRange {
        /// The atlas vertex.
        atlas_vertex: usize,
        /// U coordinate.
        u: f32,
        /// V coordinate.
        v: f32,
    },

    /// The engine changed the number of primitives.
    #[error("atlas has {actual} triangles, the source mesh has {expected}")]
    TriangleCountMismatch {
        /// Source triangle count.
        expected: usize,
        /// Atlas triangle count.
        actual: usize,
    },

    /// A bake asked for an attribute the mesh does not carry.
    #[error("mesh has no {0}")]
    MissingAttribute(&'static str),
}

impl IntegrityError {
    /// The fragment to drop before retrying, if the violation is attributable to one.
    pub fn offending_fragment(&self) -> Option<Uuid> {
        match self {
            IntegrityError::FragmentIndexOutOfRange { anchor, .. }
            | IntegrityError::FragmentAttributeMismatch { anchor, .. }
            | IntegrityError::FragmentIndexOverflow { anchor, .. } => Some(*anchor),
            _ => None,
        }
    }
}

/// Coarse classification of a [`BakeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invariant violation; not retried.
    Integrity,
    /// A collaborator could not be initialized or an input could not be decoded.
    ResourceUnavailable,
    /// Nothing to bake.
    EmptyInput,
    /// File system failure.
    Io,
    /// Malformed files, formats or parameters supplied by the caller.
    Input,
}

impl BakeError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        BakeError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a resource-unavailable error.
    pub fn unavailable<M: std::fmt::Display>(resource: &'static str, message: M) -> Self {
        BakeError::ResourceUnavailable {
            resource,
            message: message.to_string(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BakeError::Integrity(_) => ErrorKind::Integrity,
            BakeError::ResourceUnavailable { .. } => ErrorKind::ResourceUnavailable,
            BakeError::EmptyInput(_) => ErrorKind::EmptyInput,
            BakeError::Io(_) => ErrorKind::Io,
            BakeError::LoadError { .. }
            | BakeError::SaveError { .. }
            | BakeError::Parse { .. }
            | BakeError::UnsupportedFormat { .. }
            | BakeError::InvalidParameter { .. } => ErrorKind::Input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err: BakeError = IntegrityError::TriangleCountMismatch {
            expected: 2,
            actual: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert_eq!(BakeError::EmptyInput("no fragments").kind(), ErrorKind::EmptyInput);
        assert_eq!(
            BakeError::unavailable("unwrap engine", "no device").kind(),
            ErrorKind::ResourceUnavailable
        );
    }

    #[test]
    fn test_offending_fragment() {
        let anchor = Uuid::from_u128(7);
        let err = IntegrityError::FragmentIndexOutOfRange {
            anchor,
            triangle: 0,
            vertex: 9,
            vertex_count: 3,
        };
        assert_eq!(err.offending_fragment(), Some(anchor));
        assert_eq!(IntegrityError::MissingAttribute("colors").offending_fragment(), None);
    }

    #[test]
    fn test_display() {
        let err = BakeError::from(IntegrityError::AtlasVertexCountTooSmall {
            atlas: 2,
            source_count: 3,
        });
        assert_eq!(
            err.to_string(),
            "integrity violation: atlas has 2 vertices, fewer than the 3 source vertices"
        );
    }
}
