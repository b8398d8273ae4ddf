//! wgpu rasterization backend.
//!
//! Draws into an offscreen `Rgba8Unorm` texture and reads it back into the
//! [`BakeTarget`] once the draw has finished. wgpu puts NDC `y = +1` at row 0
//! and clips depth to `[0, w]`, so the vertex shader flips y and remaps z to
//! keep the conventions of [`super::raster`].

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::raster::{ColorSource, DrawCall, DrawStats, LoadOp, PositionSource, RasterBackend};
use super::{BakeTarget, RasterVertex, SampleFilter};
use crate::error::{BakeError, Result};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Uniforms passed to shaders.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Uniforms {
    /// World to clip transform for `PositionSource::Projected`.
    raster: [[f32; 4]; 4],
    /// World to clip transform of the sampled capture.
    capture: [[f32; 4]; 4],
    /// x: position source, y: color source.
    modes: [u32; 4],
}

const POSITION_ATLAS: u32 = 0;
const POSITION_PROJECTED: u32 = 1;
const COLOR_VERTEX: u32 = 0;
const COLOR_PROJECTION: u32 = 1;
const COLOR_ATLAS: u32 = 2;

impl RasterVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2, 2 => Float32x4];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<RasterVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// A rasterizer that runs on the GPU through wgpu.
pub struct WgpuRasterizer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,

    pipeline: wgpu::RenderPipeline,
    depth_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,

    nearest_sampler: wgpu::Sampler,
    linear_sampler: wgpu::Sampler,
    /// Bound when the color source samples nothing.
    dummy_texture: wgpu::TextureView,
}

impl std::fmt::Debug for WgpuRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuRasterizer")
            .field("adapter", &self.adapter_name)
            .finish_non_exhaustive()
    }
}

impl WgpuRasterizer {
    /// Create a rasterizer on the default adapter.
    ///
    /// # Errors
    ///
    /// `ResourceUnavailable` if no adapter or device can be obtained.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BakeError::unavailable("gpu adapter", "no compatible adapter found"))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("atlasbake"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| BakeError::unavailable("gpu device", e))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bake Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Buffer"),
            size: std::mem::size_of::<Uniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bake Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bake Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, depth: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[RasterVertex::desc()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None, // Both windings
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: depth.then(|| wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            })
        };
        let pipeline = make_pipeline("Bake Pipeline", false);
        let depth_pipeline = make_pipeline("Projected Pipeline", true);

        let make_sampler = |filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let nearest_sampler = make_sampler(wgpu::FilterMode::Nearest);
        let linear_sampler = make_sampler(wgpu::FilterMode::Linear);

        let dummy = RgbaImage::from_pixel(1, 1, image::Rgba([255; 4]));
        let dummy_texture = upload_image(&device, &queue, &dummy, "Dummy Texture")
            .create_view(&wgpu::TextureViewDescriptor::default());

        log::info!("GPU rasterizer on {}", adapter_name);

        Ok(Self {
            device,
            queue,
            adapter_name,
            pipeline,
            depth_pipeline,
            bind_group_layout,
            uniform_buffer,
            nearest_sampler,
            linear_sampler,
            dummy_texture,
        })
    }

    /// Name of the adapter in use.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn sampler(&self, filter: SampleFilter) -> &wgpu::Sampler {
        match filter {
            SampleFilter::Nearest => &self.nearest_sampler,
            SampleFilter::Bilinear => &self.linear_sampler,
        }
    }

    /// Copy the render target back into the CPU image.
    fn read_back(&self, texture: &wgpu::Texture, target: &mut BakeTarget) -> Result<()> {
        let width = target.width();
        let height = target.height();
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            extent(width, height),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BakeError::unavailable("gpu readback", e))?
            .map_err(|e| BakeError::unavailable("gpu readback", e))?;

        {
            let data = slice.get_mapped_range();
            let pixels = target.image_mut();
            for (row, chunk) in data.chunks_exact(padded as usize).enumerate() {
                let start = row * unpadded as usize;
                pixels[start..start + unpadded as usize].copy_from_slice(&chunk[..unpadded as usize]);
            }
        }
        buffer.unmap();
        Ok(())
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn upload_image(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &RgbaImage,
    label: &str,
) -> wgpu::Texture {
    let (width, height) = image.dimensions();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_image(queue, &texture, image);
    texture
}

fn write_image(queue: &wgpu::Queue, texture: &wgpu::Texture, image: &RgbaImage) {
    let (width, height) = image.dimensions();
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        extent(width, height),
    );
}

impl RasterBackend for WgpuRasterizer {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn draw(&mut self, target: &mut BakeTarget, call: &DrawCall<'_>) -> Result<DrawStats> {
        crate::mesh::check_triangles(call.triangles, call.vertices.len())?;

        let (color_mode, sampled, filter, capture) = match call.color {
            ColorSource::VertexColor => (COLOR_VERTEX, None, SampleFilter::Nearest, nalgebra::Matrix4::identity()),
            ColorSource::Projection {
                image,
                view_projection,
                filter,
            } => (COLOR_PROJECTION, Some(image), filter, view_projection),
            ColorSource::AtlasTexture { image, filter } => {
                (COLOR_ATLAS, Some(image), filter, nalgebra::Matrix4::identity())
            }
        };
        if let Some(image) = sampled {
            if image.width() == 0 || image.height() == 0 {
                return Err(BakeError::unavailable("sampled image", "image is empty"));
            }
        }

        if let LoadOp::Clear(color) = call.load {
            target.clear(color);
        }
        if call.triangles.is_empty() {
            return Ok(DrawStats::default());
        }

        let (position_mode, raster) = match call.position {
            PositionSource::AtlasUv => (POSITION_ATLAS, nalgebra::Matrix4::identity()),
            PositionSource::Projected(m) => (POSITION_PROJECTED, m),
        };
        let depth_test = position_mode == POSITION_PROJECTED;

        let uniforms = Uniforms {
            raster: raster.into(),
            capture: capture.into(),
            modes: [position_mode, color_mode, 0, 0],
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let (width, height) = (target.width(), target.height());
        let color_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Bake Target"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        // The pass always loads; a clear has already been applied on the CPU side
        write_image(&self.queue, &color_texture, target.image());
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_view = depth_test.then(|| {
            self.device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("Depth Texture"),
                    size: extent(width, height),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        let sampled_view = sampled.map(|image| {
            upload_image(&self.device, &self.queue, image, "Sampled Texture")
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bake Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        sampled_view.as_ref().unwrap_or(&self.dummy_texture),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(self.sampler(filter)),
                },
            ],
        });

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(call.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Index Buffer"),
                contents: bytemuck::cast_slice(call.triangles),
                usage: wgpu::BufferUsages::INDEX,
            });
        let num_indices = (call.triangles.len() * 3) as u32;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Bake Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Bake Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_view.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(if depth_test {
                &self.depth_pipeline
            } else {
                &self.pipeline
            });
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..num_indices, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.read_back(&color_texture, target)?;

        log::debug!(
            "wgpu draw: {} triangles into {}x{}",
            call.triangles.len(),
            width,
            height
        );

        Ok(DrawStats {
            triangles: call.triangles.len(),
            fragments: None,
        })
    }
}

/// WGSL shader source code.
const SHADER_SOURCE: &str = r#"
struct Uniforms {
    raster: mat4x4<f32>,
    capture: mat4x4<f32>,
    modes: vec4<u32>,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;
@group(0) @binding(1)
var sampled_texture: texture_2d<f32>;
@group(0) @binding(2)
var sampled_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) capture_clip: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var clip: vec4<f32>;
    if uniforms.modes.x == 0u {
        clip = vec4<f32>((in.uv - vec2<f32>(0.5)) * 2.0, 0.0, 1.0);
    } else {
        clip = uniforms.raster * vec4<f32>(in.position, 1.0);
    }

    var out: VertexOutput;
    // Row 0 is clip y = -1; depth from [-w, w] to [0, w]
    out.clip_position = vec4<f32>(clip.x, -clip.y, (clip.z + clip.w) * 0.5, clip.w);
    out.color = in.color;
    out.uv = in.uv;
    out.capture_clip = uniforms.capture * vec4<f32>(in.position, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    if uniforms.modes.y == 0u {
        return in.color;
    }
    if uniforms.modes.y == 1u {
        let c = in.capture_clip;
        if c.w <= 1e-6 {
            discard;
        }
        let ndc = c.xy / c.w;
        let st = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
        if any(st < vec2<f32>(0.0)) || any(st > vec2<f32>(1.0)) {
            discard;
        }
        return textureSampleLevel(sampled_texture, sampled_sampler, st, 0.0);
    }
    return textureSampleLevel(sampled_texture, sampled_sampler, in.uv, 0.0);
}
"#;
