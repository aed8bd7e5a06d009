//! wgpu device bring-up and frame execution.
//!
//! [`GpuContext`] owns the instance/device/queue; [`FrameExecutor`] owns
//! every GPU-side texture keyed by [`TextureHandle`] and replays a
//! [`FrameOutput`]: one vertex upload, the batched atlas upload pass, then
//! one draw call per run in each recorded render pass.

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use wgpu::{Device, Extent3d, Instance, Queue, TextureDimension, TextureFormat, TextureUsages};

use crate::texture::{TextureHandle, ATLAS_TEXTURE, WHITE_TEXTURE};

use super::batch::{pack_uv, QuadVertex, MAX_QUADS};
use super::pipeline::PipelineRegistry;
use super::{FrameOutput, PassTarget, ShaderKind, ATLAS_SIZE};

pub struct GpuContext {
    pub instance: Instance,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
}

impl Default for GpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuContext {
    pub fn new() -> Self {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .expect("Failed to find GPU adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Limelight Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .expect("Failed to create device");

        Self {
            instance,
            device: Arc::new(device),
            queue: Arc::new(queue),
        }
    }
}

/// Per-pass uniform block; must match the WGSL `PassUniforms` layout.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct PassUniforms {
    target_size: [f32; 2],
    _pad: [f32; 2],
    params: [f32; 4],
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct UniformSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Replays frame outputs against real GPU resources.
pub struct FrameExecutor {
    device: Arc<Device>,
    queue: Arc<Queue>,
    format: TextureFormat,
    pipelines: PipelineRegistry,
    sampler: wgpu::Sampler,
    textures: HashMap<TextureHandle, GpuTexture>,
    vertex_buffer: wgpu::Buffer,
    vertex_capacity: usize,
    index_buffer: wgpu::Buffer,
    uniform_slots: Vec<UniformSlot>,
}

impl FrameExecutor {
    pub fn new(ctx: &GpuContext, format: TextureFormat) -> Self {
        let device = ctx.device.clone();
        let pipelines = PipelineRegistry::new(&device, format);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Quad Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        // Shared index pattern: two triangles per quad, reused by every
        // draw.
        let mut indices = Vec::with_capacity(MAX_QUADS * 6);
        for quad in 0..MAX_QUADS as u32 {
            let base = quad * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let vertex_capacity = 1024;
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Quad Vertex Buffer"),
            size: (vertex_capacity * std::mem::size_of::<QuadVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut executor = Self {
            device,
            queue: ctx.queue.clone(),
            format,
            pipelines,
            sampler,
            textures: HashMap::new(),
            vertex_buffer,
            vertex_capacity,
            index_buffer,
            uniform_slots: Vec::new(),
        };
        executor.create_target(ATLAS_TEXTURE, ATLAS_SIZE, ATLAS_SIZE);
        executor
    }

    fn register_texture(&mut self, handle: TextureHandle, texture: wgpu::Texture, width: u32, height: u32) {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Quad Texture Bind Group"),
            layout: &self.pipelines.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                bind_group,
                width,
                height,
            },
        );
    }

    fn create_target(&mut self, handle: TextureHandle, width: u32, height: u32) {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: self.format,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        self.register_texture(handle, texture, width, height);
    }

    /// Upload a decoded RGBA source texture under its handle; called by
    /// the loading collaborator before it reports the source as loaded.
    pub fn upload_texture(&mut self, handle: TextureHandle, width: u32, height: u32, rgba: &[u8]) {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Source Texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: self.format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.register_texture(handle, texture, width, height);
    }

    /// Drop the GPU texture behind a retired handle.
    pub fn destroy_texture(&mut self, handle: TextureHandle) {
        self.textures.remove(&handle);
    }

    /// Replay one frame against the given screen view.
    pub fn execute(
        &mut self,
        output: &FrameOutput,
        screen: &wgpu::TextureView,
        screen_width: u32,
        screen_height: u32,
    ) {
        for &handle in &output.retired {
            self.destroy_texture(handle);
        }
        for target in &output.targets {
            let stale = self
                .textures
                .get(&target.handle)
                .map(|t| t.width != target.width || t.height != target.height)
                .unwrap_or(true);
            if stale {
                self.create_target(target.handle, target.width, target.height);
            }
        }

        self.upload_vertices(&output.vertices);
        self.ensure_uniform_slots(output.passes.len() + 1);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.encode_atlas_uploads(&mut encoder, output);

        for (i, pass) in output.passes.iter().enumerate() {
            let (view, width, height) = match pass.target {
                PassTarget::Screen => (screen, screen_width, screen_height),
                PassTarget::Texture(handle) => match self.textures.get(&handle) {
                    Some(t) => (&t.view, t.width, t.height),
                    None => {
                        log::error!("render pass targets unknown texture {:?}", handle);
                        continue;
                    }
                },
            };

            // Filter passes carry their parameters on their single run;
            // scene passes only use the target size.
            let params = output.runs[pass.runs.clone()]
                .first()
                .map(|run| run.params)
                .unwrap_or_default();
            let uniforms = PassUniforms {
                target_size: [width as f32, height as f32],
                _pad: [0.0; 2],
                params,
            };
            self.queue.write_buffer(
                &self.uniform_slots[i].buffer,
                0,
                bytemuck::bytes_of(&uniforms),
            );

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: if pass.clear {
                            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_bind_group(0, &self.uniform_slots[i].bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

            let mut current_shader = None;
            for run in &output.runs[pass.runs.clone()] {
                let Some(texture) = self.textures.get(&run.texture) else {
                    log::error!("draw run references unknown texture {:?}", run.texture);
                    continue;
                };
                if current_shader != Some(run.shader) {
                    render_pass.set_pipeline(self.pipelines.get(run.shader));
                    current_shader = Some(run.shader);
                }
                render_pass.set_bind_group(1, &texture.bind_group, &[]);

                if let Some(scissor) = run.scissor {
                    let x = scissor.x.max(0.0) as u32;
                    let y = scissor.y.max(0.0) as u32;
                    let w = (scissor.right().min(width as f32) as u32).saturating_sub(x);
                    let h = (scissor.bottom().min(height as f32) as u32).saturating_sub(y);
                    if w == 0 || h == 0 {
                        continue;
                    }
                    render_pass.set_scissor_rect(x.min(width), y.min(height), w, h);
                } else {
                    render_pass.set_scissor_rect(0, 0, width, height);
                }

                let first = run.first_quad * 6;
                let last = (run.first_quad + run.quad_count) * 6;
                render_pass.draw_indexed(first..last, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn upload_vertices(&mut self, vertices: &[QuadVertex]) {
        if vertices.is_empty() {
            return;
        }
        if vertices.len() > self.vertex_capacity {
            self.vertex_capacity = vertices.len().next_power_of_two();
            self.vertex_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Quad Vertex Buffer"),
                size: (self.vertex_capacity * std::mem::size_of::<QuadVertex>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        self.queue
            .write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(vertices));
    }

    fn ensure_uniform_slots(&mut self, count: usize) {
        while self.uniform_slots.len() < count {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Pass Uniform Buffer"),
                size: std::mem::size_of::<PassUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Pass Uniform Bind Group"),
                layout: &self.pipelines.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            self.uniform_slots.push(UniformSlot { buffer, bind_group });
        }
    }

    /// Batched atlas maintenance: optional clear, the white pixel written
    /// directly, and one draw per new entry copying its source (body plus
    /// the eight border patches) into the shared surface.
    fn encode_atlas_uploads(&mut self, encoder: &mut wgpu::CommandEncoder, output: &FrameOutput) {
        if !output.atlas_clear && output.atlas_uploads.is_empty() {
            return;
        }

        // The white pixel has no backing source; write its 3x3 bordered
        // block straight into the surface.
        for upload in &output.atlas_uploads {
            if upload.source == WHITE_TEXTURE {
                let atlas = &self.textures[&ATLAS_TEXTURE];
                self.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &atlas.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d {
                            x: upload.region.x - 1,
                            y: upload.region.y - 1,
                            z: 0,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    &[0xFF; 4 * 9],
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * 3),
                        rows_per_image: Some(3),
                    },
                    Extent3d {
                        width: 3,
                        height: 3,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }

        // Build the upload geometry: 9 sub-quads per entry.
        let mut vertices = Vec::new();
        let mut draws = Vec::new();
        for upload in &output.atlas_uploads {
            if upload.source == WHITE_TEXTURE {
                continue;
            }
            if !self.textures.contains_key(&upload.source) {
                log::error!("atlas upload for unknown source {:?}", upload.source);
                continue;
            }
            let first_quad = (vertices.len() / 4) as u32;
            for (dst, uv) in upload.sub_quads() {
                let corners = [
                    (dst[0], dst[1], uv[0], uv[1]),
                    (dst[0] + dst[2], dst[1], uv[2], uv[1]),
                    (dst[0] + dst[2], dst[1] + dst[3], uv[2], uv[3]),
                    (dst[0], dst[1] + dst[3], uv[0], uv[3]),
                ];
                for (x, y, u, v) in corners {
                    vertices.push(QuadVertex {
                        position: [x, y],
                        uv: pack_uv(u, v),
                        color: 0xFFFF_FFFF,
                    });
                }
            }
            draws.push((upload.source, first_quad, 9u32));
        }

        if vertices.is_empty() && !output.atlas_clear {
            return;
        }

        let upload_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Atlas Upload Vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let slot = self.uniform_slots.len() - 1;
        let uniforms = PassUniforms {
            target_size: [ATLAS_SIZE as f32, ATLAS_SIZE as f32],
            _pad: [0.0; 2],
            params: [0.0; 4],
        };
        self.queue.write_buffer(
            &self.uniform_slots[slot].buffer,
            0,
            bytemuck::bytes_of(&uniforms),
        );

        let atlas = &self.textures[&ATLAS_TEXTURE];
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Atlas Upload Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &atlas.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: if output.atlas_clear {
                        wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        render_pass.set_pipeline(self.pipelines.get(ShaderKind::Default));
        render_pass.set_bind_group(0, &self.uniform_slots[slot].bind_group, &[]);
        render_pass.set_vertex_buffer(0, upload_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        for (source, first_quad, quads) in draws {
            let bind_group = &self.textures[&source].bind_group;
            render_pass.set_bind_group(1, bind_group, &[]);
            render_pass.draw_indexed(first_quad * 6..(first_quad + quads) * 6, 0, 0..1);
        }
    }
}
