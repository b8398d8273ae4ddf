//! Production unwrap engine backed by xatlas.
//!
//! Requires the `xatlas` cargo feature. The engine segments the mesh into
//! charts, parameterizes and packs them, then copies xatlas's per-vertex
//! cross-references, texel-space UVs and indices into its own storage
//! before the xatlas atlas is dropped. UVs are normalized by the atlas size,
//! so they land in `[0, 1]²`.

use xatlas_rs::{ChartOptions, IndexData, MeshData, MeshDecl, PackOptions, Xatlas};

use super::engine::{EngineOutput, UnwrapEngine, UnwrapInput};
use crate::error::{BakeError, Result};

/// Chart and pack options for [`XatlasEngine`].
///
/// Zero means "let xatlas choose" for every size-like option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XatlasOptions {
    /// Upper bound on chart area, in mesh units². Zero for unbounded.
    pub max_chart_area: f32,
    /// Upper bound on chart boundary length. Zero for unbounded.
    pub max_boundary_length: f32,
    /// Chart growing iterations.
    pub max_iterations: u32,
    /// Texels of padding around each chart.
    pub padding: u32,
    /// Texels per mesh unit. Zero derives it from `resolution`.
    pub texels_per_unit: f32,
    /// Target atlas edge length in texels. Zero sizes the atlas to fit.
    pub resolution: u32,
    /// Leave room for bilinear filtering between charts.
    pub bilinear: bool,
    /// Rotate charts to improve packing.
    pub rotate_charts: bool,
}

impl Default for XatlasOptions {
    fn default() -> Self {
        Self {
            max_chart_area: 0.0,
            max_boundary_length: 0.0,
            max_iterations: 1,
            padding: 2,
            texels_per_unit: 0.0,
            resolution: 1024,
            bilinear: true,
            rotate_charts: true,
        }
    }
}

impl XatlasOptions {
    /// Set the maximum chart area.
    pub fn with_max_chart_area(mut self, area: f32) -> Self {
        self.max_chart_area = area.max(0.0);
        self
    }

    /// Set the maximum chart boundary length.
    pub fn with_max_boundary_length(mut self, length: f32) -> Self {
        self.max_boundary_length = length.max(0.0);
        self
    }

    /// Set the number of chart growing iterations (at least 1).
    pub fn with_max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = iterations.max(1);
        self
    }

    /// Set the chart padding in texels.
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Set the texel density.
    pub fn with_texels_per_unit(mut self, texels: f32) -> Self {
        self.texels_per_unit = texels.max(0.0);
        self
    }

    /// Set the target atlas resolution, normally the bake texture size.
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    /// Enable or disable bilinear padding.
    pub fn with_bilinear(mut self, bilinear: bool) -> Self {
        self.bilinear = bilinear;
        self
    }

    /// Enable or disable chart rotation.
    pub fn with_rotate_charts(mut self, rotate: bool) -> Self {
        self.rotate_charts = rotate;
        self
    }

    fn chart_options(&self) -> ChartOptions {
        ChartOptions {
            max_chart_area: self.max_chart_area,
            max_boundary_length: self.max_boundary_length,
            max_iterations: self.max_iterations,
            ..Default::default()
        }
    }

    fn pack_options(&self) -> PackOptions {
        PackOptions {
            padding: self.padding,
            texels_per_unit: self.texels_per_unit,
            resolution: self.resolution,
            bilinear: self.bilinear,
            rotate_charts: self.rotate_charts,
            ..Default::default()
        }
    }
}

/// Unwraps through xatlas.
///
/// The xatlas handle lives only inside [`UnwrapEngine::generate`]; the copied
/// arrays are held until [`UnwrapEngine::clear_cache`].
#[derive(Debug, Default)]
pub struct XatlasEngine {
    options: XatlasOptions,
    mapping: Vec<u32>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
}

impl XatlasEngine {
    /// Create an engine with the given options.
    pub fn new(options: XatlasOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// The engine options.
    pub fn options(&self) -> &XatlasOptions {
        &self.options
    }

    /// Whether the engine currently holds output storage.
    pub fn has_cache(&self) -> bool {
        self.mapping.capacity() > 0 || self.uvs.capacity() > 0 || self.indices.capacity() > 0
    }
}

impl UnwrapEngine for XatlasEngine {
    fn name(&self) -> &str {
        "xatlas"
    }

    fn generate(&mut self, input: &UnwrapInput<'_>) -> Result<EngineOutput<'_>> {
        if input.indices.len() % 3 != 0 {
            return Err(BakeError::invalid_param(
                "indices",
                input.indices.len(),
                "not a whole number of triangles",
            ));
        }
        let vertex_count = input.positions.count;
        if let Some(&bad) = input.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(BakeError::invalid_param("indices", bad, "index exceeds vertex count"));
        }

        // xatlas reads tightly packed floats; the view resolves the input stride
        let positions: Vec<f32> = input.positions.iter().flatten().collect();
        let decl = MeshDecl {
            vertex_position_data: MeshData::Contiguous(&positions),
            index_data: Some(IndexData::U32(input.indices)),
            ..MeshDecl::default()
        };

        let mut atlas = Xatlas::new();
        atlas
            .add_mesh(&decl)
            .map_err(|e| BakeError::unavailable("xatlas", format!("add_mesh failed: {:?}", e)))?;
        atlas.generate(&self.options.chart_options(), &self.options.pack_options());

        let (width, height) = (atlas.width().max(1) as f32, atlas.height().max(1) as f32);
        let meshes = atlas.meshes();
        let Some(mesh) = meshes.first() else {
            return Err(BakeError::unavailable("xatlas", "no output mesh"));
        };

        self.mapping.clear();
        self.uvs.clear();
        self.indices.clear();
        self.mapping.reserve(mesh.vertex_array.len());
        self.uvs.reserve(mesh.vertex_array.len());

        let mut referenced = vec![false; vertex_count];
        for vertex in &mesh.vertex_array {
            let source = vertex.xref;
            if let Some(seen) = referenced.get_mut(source as usize) {
                *seen = true;
            }
            self.mapping.push(source);
            self.uvs.push([
                (vertex.uv[0] / width).clamp(0.0, 1.0),
                (vertex.uv[1] / height).clamp(0.0, 1.0),
            ]);
        }
        self.indices.extend_from_slice(&mesh.index_array);

        // xatlas drops vertices no face uses; the inverse map still needs them
        for (vi, used) in referenced.iter().enumerate() {
            if !used {
                self.mapping.push(vi as u32);
                self.uvs.push([0.0, 0.0]);
            }
        }

        log::debug!(
            "xatlas: {}x{} texels, {} atlas vertices for {} source vertices",
            width,
            height,
            self.mapping.len(),
            vertex_count
        );

        Ok(EngineOutput {
            atlas_vertex_count: self.mapping.len(),
            mapping: &self.mapping,
            uvs: &self.uvs,
            indices: &self.indices,
        })
    }

    fn clear_cache(&mut self) {
        self.mapping = Vec::new();
        self.uvs = Vec::new();
        self.indices = Vec::new();
    }
}
