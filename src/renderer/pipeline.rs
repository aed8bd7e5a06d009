//! Draw programs and the shader-kind registry.
//!
//! One WGSL module carries the shared vertex stage and one fragment entry
//! point per [`ShaderKind`]; the registry compiles all pipelines up front
//! so draw-time lookup is a plain map access.

use std::collections::HashMap;

use wgpu::{BindGroupLayout, Device, RenderPipeline, TextureFormat};

use super::batch::QuadVertex;
use super::ShaderKind;

const SHADER_SOURCE: &str = r#"
struct PassUniforms {
    target_size: vec2<f32>,
    _pad: vec2<f32>,
    params: vec4<f32>,
}

@group(0) @binding(0) var<uniform> pass_data: PassUniforms;
@group(1) @binding(0) var quad_texture: texture_2d<f32>;
@group(1) @binding(1) var quad_sampler: sampler;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    // Pixel coordinates to NDC; framebuffer row 0 is the content top.
    let ndc = vec2<f32>(
        in.position.x / pass_data.target_size.x * 2.0 - 1.0,
        1.0 - in.position.y / pass_data.target_size.y * 2.0,
    );
    out.clip_position = vec4<f32>(ndc, 0.0, 1.0);
    out.uv = in.uv;
    out.color = in.color;
    return out;
}

// Textured quad modulated by the premultiplied per-corner color. Solid
// rects sample the atlas white pixel, so this one program covers both.
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(quad_texture, quad_sampler, in.uv) * in.color;
}

// Separable-ish box blur, radius in params.x (pixels).
@fragment
fn fs_blur(in: VertexOutput) -> @location(0) vec4<f32> {
    let radius = pass_data.params.x;
    if (radius <= 0.0) {
        return textureSample(quad_texture, quad_sampler, in.uv) * in.color;
    }
    let step = radius / pass_data.target_size;
    var sum = vec4<f32>(0.0);
    for (var dy = -1; dy <= 1; dy++) {
        for (var dx = -1; dx <= 1; dx++) {
            let offset = vec2<f32>(f32(dx), f32(dy)) * step;
            sum += textureSample(quad_texture, quad_sampler, in.uv + offset);
        }
    }
    return (sum / 9.0) * in.color;
}

// Desaturation, amount 0..1 in params.x. Input is premultiplied, so the
// luma mix stays premultiplied too.
@fragment
fn fs_grayscale(in: VertexOutput) -> @location(0) vec4<f32> {
    let sample = textureSample(quad_texture, quad_sampler, in.uv);
    let luma = dot(sample.rgb, vec3<f32>(0.2126, 0.7152, 0.0722));
    let mixed = mix(sample.rgb, vec3<f32>(luma), pass_data.params.x);
    return vec4<f32>(mixed, sample.a) * in.color;
}
"#;

/// Compiled pipelines keyed by shader kind, plus the bind group layouts
/// every pass shares.
pub struct PipelineRegistry {
    pipelines: HashMap<ShaderKind, RenderPipeline>,
    pub uniform_layout: BindGroupLayout,
    pub texture_layout: BindGroupLayout,
}

impl PipelineRegistry {
    pub fn new(device: &Device, format: TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Texture Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            immediate_size: 0,
        });

        let mut pipelines = HashMap::new();
        for (kind, entry_point) in [
            (ShaderKind::Default, "fs_main"),
            (ShaderKind::Blur, "fs_blur"),
            (ShaderKind::Grayscale, "fs_grayscale"),
        ] {
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Quad Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[QuadVertex::desc()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        // Premultiplied alpha compositing.
                        blend: Some(wgpu::BlendState {
                            color: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                                operation: wgpu::BlendOperation::Add,
                            },
                            alpha: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                                operation: wgpu::BlendOperation::Add,
                            },
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });
            pipelines.insert(kind, pipeline);
        }

        Self {
            pipelines,
            uniform_layout,
            texture_layout,
        }
    }

    pub fn get(&self, kind: ShaderKind) -> &RenderPipeline {
        // Every kind is compiled in `new`.
        &self.pipelines[&kind]
    }
}
