//! The unwrap engine boundary.
//!
//! An unwrap engine is an opaque, synchronous function from packed vertex
//! buffers to a UV atlas. Engines own their output storage and hand it out
//! only as a borrow ([`EngineOutput`]); the caller must copy what it needs
//! before calling [`UnwrapEngine::clear_cache`], which the borrow checker
//! enforces because both take `&mut self`.

use bytemuck::{Pod, Zeroable};

use crate::error::{BakeError, Result};

/// Interleaved position and normal, the layout the adapter packs for engines.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PackedVertex {
    /// Position.
    pub position: [f32; 3],
    /// Unit normal.
    pub normal: [f32; 3],
}

impl PackedVertex {
    /// Byte distance between consecutive vertices.
    pub const STRIDE: usize = std::mem::size_of::<PackedVertex>();
    /// Byte offset of the position within a vertex.
    pub const POSITION_OFFSET: usize = 0;
    /// Byte offset of the normal within a vertex.
    pub const NORMAL_OFFSET: usize = 12;
}

/// A strided view over packed `[f32; 3]` vertex attributes.
///
/// Element `i` occupies bytes `i * stride .. i * stride + 12` of `data`.
#[derive(Debug, Clone, Copy)]
pub struct VertexBufferView<'a> {
    /// Raw bytes, starting at element 0.
    pub data: &'a [u8],
    /// Byte distance between consecutive elements.
    pub stride: usize,
    /// Number of elements.
    pub count: usize,
}

const VEC3_SIZE: usize = 12;

impl<'a> VertexBufferView<'a> {
    /// Create a view, checking that `data` holds `count` elements.
    pub fn new(data: &'a [u8], stride: usize, count: usize) -> Result<Self> {
        if stride < VEC3_SIZE {
            return Err(BakeError::invalid_param(
                "stride",
                stride,
                "must be at least 12 bytes",
            ));
        }
        let view = Self {
            data,
            stride,
            count,
        };
        if data.len() < view.required_len() {
            return Err(BakeError::invalid_param(
                "data",
                data.len(),
                "buffer too short for stride and count",
            ));
        }
        Ok(view)
    }

    /// View one attribute of a packed vertex slice.
    pub fn of_packed(vertices: &'a [PackedVertex], offset: usize) -> Self {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        Self {
            data: bytes.get(offset..).unwrap_or(&[]),
            stride: PackedVertex::STRIDE,
            count: vertices.len(),
        }
    }

    /// Bytes needed to hold `count` elements.
    pub fn required_len(&self) -> usize {
        match self.count {
            0 => 0,
            n => (n - 1) * self.stride + VEC3_SIZE,
        }
    }

    /// Read element `index`, or `None` if it is out of range.
    pub fn get(&self, index: usize) -> Option<[f32; 3]> {
        if index >= self.count {
            return None;
        }
        let start = index * self.stride;
        let bytes = self.data.get(start..start + VEC3_SIZE)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    /// Iterate over all elements.
    pub fn iter(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }
}

/// Input handed to an unwrap engine.
#[derive(Debug, Clone, Copy)]
pub struct UnwrapInput<'a> {
    /// Vertex positions.
    pub positions: VertexBufferView<'a>,
    /// Optional vertex normals, one per position.
    pub normals: Option<VertexBufferView<'a>>,
    /// Triangle list, three indices per triangle.
    pub indices: &'a [u32],
}

/// Atlas arrays borrowed from the engine that produced them.
#[derive(Debug, Clone, Copy)]
pub struct EngineOutput<'a> {
    /// Number of atlas vertices.
    pub atlas_vertex_count: usize,
    /// Source vertex of each atlas vertex.
    pub mapping: &'a [u32],
    /// UV of each atlas vertex.
    pub uvs: &'a [[f32; 2]],
    /// Triangle list over atlas vertices, three indices per triangle.
    pub indices: &'a [u32],
}

/// An external UV-unwrapping engine.
pub trait UnwrapEngine {
    /// Human-readable engine name, used in logs.
    fn name(&self) -> &str;

    /// Compute an atlas for one mesh.
    ///
    /// Called once per mesh. The returned arrays stay valid until the next
    /// call on the engine.
    fn generate(&mut self, input: &UnwrapInput<'_>) -> Result<EngineOutput<'_>>;

    /// Release intermediate storage held since the last [`generate`](Self::generate).
    fn clear_cache(&mut self);
}

impl<E: UnwrapEngine + ?Sized> UnwrapEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(&mut self, input: &UnwrapInput<'_>) -> Result<EngineOutput<'_>> {
        (**self).generate(input)
    }

    fn clear_cache(&mut self) {
        (**self).clear_cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_layout() {
        assert_eq!(PackedVertex::STRIDE, 24);
        let vertices = [
            PackedVertex {
                position: [1.0, 2.0, 3.0],
                normal: [0.0, 0.0, 1.0],
            },
            PackedVertex {
                position: [4.0, 5.0, 6.0],
                normal: [0.0, 1.0, 0.0],
            },
        ];

        let positions = VertexBufferView::of_packed(&vertices, PackedVertex::POSITION_OFFSET);
        let normals = VertexBufferView::of_packed(&vertices, PackedVertex::NORMAL_OFFSET);

        assert_eq!(positions.get(1), Some([4.0, 5.0, 6.0]));
        assert_eq!(normals.get(1), Some([0.0, 1.0, 0.0]));
        assert_eq!(normals.get(2), None);
        assert_eq!(normals.iter().count(), 2);
        assert!(normals.data.len() >= normals.required_len());
    }

    #[test]
    fn test_view_rejects_short_buffer() {
        let data = [0u8; 20];
        assert!(VertexBufferView::new(&data, 12, 2).is_err());
        assert!(VertexBufferView::new(&data, 8, 1).is_err());
        assert!(VertexBufferView::new(&data, 16, 1).is_ok());
        assert!(VertexBufferView::new(&[], 12, 0).is_ok());
    }

    #[test]
    fn test_view_custom_stride() {
        // Three floats of payload followed by one float of padding
        let floats: [f32; 8] = [1.0, 2.0, 3.0, 9.0, 4.0, 5.0, 6.0, 9.0];
        let view = VertexBufferView::new(bytemuck::cast_slice(&floats), 16, 2).unwrap();
        assert_eq!(view.get(0), Some([1.0, 2.0, 3.0]));
        assert_eq!(view.get(1), Some([4.0, 5.0, 6.0]));
    }
}
