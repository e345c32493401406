//! wgpu backend. Each fractal's fragment shader is compiled once against a
//! shared prelude that declares the quad vertex stage, the uniform slot
//! buffer and one `U_<NAME>` index constant per uniform.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::mpsc;

use image::RgbaImage;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use super::{
    RenderBackend, RenderError, Renderer, ShaderCompileError, ShaderSource, QUAD_INDICES,
    QUAD_VERTICES,
};
use crate::fractal::{FractalInstance, FractalKind};
use crate::uniforms::UniformSet;

const PRELUDE: &str = r#"
struct VertexOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> VertexOut {
    var output: VertexOut;
    output.pos = vec4<f32>(position, 0.0, 1.0);
    output.uv = position * 0.5 + vec2<f32>(0.5, 0.5);
    return output;
}

@group(0) @binding(0) var<storage, read> slots: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read> orbit: array<vec2<f32>>;

fn u_float(i: u32) -> f32 { return slots[i].x; }
fn u_int(i: u32) -> i32 { return i32(slots[i].x); }
fn u_flag(i: u32) -> bool { return slots[i].x > 0.5; }
fn u_double(i: u32) -> f32 { return slots[i].x + slots[i].y; }
fn u_vec2(i: u32) -> vec2<f32> { return slots[i].xy; }
fn u_dvec2(i: u32) -> vec2<f32> { return slots[i].xy + slots[i].zw; }
fn u_vec3(i: u32) -> vec3<f32> { return slots[i].xyz; }
fn u_vec4(i: u32) -> vec4<f32> { return slots[i]; }
"#;

/// Prelude plus the slot index constants for `layout`, then the user shader.
pub fn assemble(layout: &[&str], code: &str) -> String {
    let mut out = String::from(PRELUDE);
    for (index, name) in layout.iter().enumerate() {
        let _ = writeln!(out, "const U_{name}: u32 = {index}u;");
    }
    out.push('\n');
    out.push_str(code);
    out
}

pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    pipelines: HashMap<FractalKind, wgpu::RenderPipeline>,
}

impl GpuRenderer {
    pub fn new() -> Result<Self, ShaderCompileError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )
        .ok_or_else(|| ShaderCompileError::Device("no GPU adapter available".into()))?;
        let (device, queue) = pollster::block_on(
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None),
        )
        .map_err(|e| ShaderCompileError::Device(format!("failed to create device: {e}")))?;
        info!(adapter = %adapter.get_info().name, "GPU device ready");

        let storage_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fractal_bind"),
            entries: &[storage_entry(0), storage_entry(1)],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fractal_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            device,
            queue,
            bind_group_layout,
            pipeline_layout,
            vertex_buffer,
            index_buffer,
            pipelines: HashMap::new(),
        })
    }

    fn create_pipeline(
        &self,
        source: &ShaderSource,
        code: &str,
    ) -> Result<wgpu::RenderPipeline, ShaderCompileError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("fractal_shader"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(code)),
            });
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("fractal_pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(ShaderCompileError::Compile {
                path: source.path.clone(),
                message: err.to_string(),
            }),
            None => Ok(pipeline),
        }
    }
}

impl Renderer for GpuRenderer {
    fn backend(&self) -> RenderBackend {
        RenderBackend::Gpu
    }

    fn prepare(&mut self, fractal: &FractalInstance) -> Result<(), ShaderCompileError> {
        let source = ShaderSource::load(fractal.shader_path())?;
        let layout = fractal.uniform_layout()?;
        let code = assemble(&layout, &source.code);
        let pipeline = self.create_pipeline(&source, &code)?;
        debug!(fractal = fractal.name(), uniforms = layout.len(), "pipeline compiled");
        self.pipelines.insert(fractal.kind(), pipeline);
        Ok(())
    }

    fn draw(
        &mut self,
        kind: FractalKind,
        uniforms: &UniformSet,
        size: (u32, u32),
    ) -> Result<RgbaImage, RenderError> {
        let (width, height) = size;
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget);
        }
        let pipeline = self
            .pipelines
            .get(&kind)
            .ok_or(RenderError::NotPrepared(kind))?;

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("fractal_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let slots = uniforms.slots();
        let slot_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fractal_slots"),
                contents: bytemuck::cast_slice(&slots),
                usage: wgpu::BufferUsages::STORAGE,
            });
        // Storage bindings may not be empty.
        let mut orbit: Vec<[f32; 2]> = uniforms
            .reference_orbit()
            .unwrap_or_default()
            .iter()
            .map(|&[x, y]| [x as f32, y as f32])
            .collect();
        if orbit.is_empty() {
            orbit.push([0.0, 0.0]);
        }
        let orbit_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fractal_orbit"),
                contents: bytemuck::cast_slice(&orbit),
                usage: wgpu::BufferUsages::STORAGE,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractal_bind"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: slot_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: orbit_buffer.as_entire_binding(),
                },
            ],
        });

        let bytes_per_row = align_to(width * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractal_readback"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fractal_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("fractal_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = output_buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::Gpu(format!("readback dropped: {e}")))?
            .map_err(|e| RenderError::Gpu(format!("map error: {e}")))?;

        let data = slice.get_mapped_range();
        let row_bytes = (width * 4) as usize;
        let padded = bytes_per_row as usize;
        let mut pixels = vec![0u8; row_bytes * height as usize];
        for (row_idx, chunk) in pixels.chunks_mut(row_bytes).enumerate() {
            let start = row_idx * padded;
            chunk.copy_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        output_buffer.unmap();
        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Gpu("readback size mismatch".into()))
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    ((value + alignment - 1) / alignment) * alignment
}
