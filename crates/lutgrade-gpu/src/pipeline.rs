//! Render pipeline for the LUT pass, one shader pair per capability tier.

use std::num::NonZeroU64;

use crate::buffers::{IMAGE_FORMAT, LUT_FORMAT, LutUniforms, QuadVertex};

/// GPU capability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Native 3D texture sampling.
    Modern,
    /// 3D LUT emulated with a tiled 2D texture.
    Legacy,
}

impl Tier {
    /// Smallest 3D texture edge the modern tier accepts.
    const MIN_3D_DIMENSION: u32 = 64;

    /// Pick the tier an adapter supports.
    pub fn probe(adapter: &wgpu::Adapter) -> Self {
        let filterable = adapter
            .get_texture_format_features(LUT_FORMAT)
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE);
        let limits = adapter.limits();
        if filterable && limits.max_texture_dimension_3d >= Self::MIN_3D_DIMENSION {
            Tier::Modern
        } else {
            Tier::Legacy
        }
    }

    /// Largest LUT size a device with `limits` can hold on this tier.
    pub fn max_lut_size(self, limits: &wgpu::Limits) -> u32 {
        match self {
            Tier::Modern => limits.max_texture_dimension_3d,
            // The tiled texture is N² wide.
            Tier::Legacy => (limits.max_texture_dimension_2d as f64).sqrt().floor() as u32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Modern => "modern",
            Tier::Legacy => "legacy",
        }
    }

    fn shader_source(self) -> &'static str {
        match self {
            Tier::Modern => include_str!("../shaders/lut_3d.wgsl"),
            Tier::Legacy => include_str!("../shaders/lut_tiled.wgsl"),
        }
    }

    fn lut_view_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            Tier::Modern => wgpu::TextureViewDimension::D3,
            Tier::Legacy => wgpu::TextureViewDimension::D2,
        }
    }
}

/// Compiled shader pair, bind group layout, and render pipeline for one tier.
pub struct LutPipeline {
    pub tier: Tier,
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LutPipeline {
    /// Compile the tier's shaders and build the pipeline.
    ///
    /// Run inside an error scope: shader and layout problems surface as
    /// validation errors, not return values.
    pub fn new(device: &wgpu::Device, tier: Tier) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lutgrade_lut_shader"),
            source: wgpu::ShaderSource::Wgsl(tier.shader_source().into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lutgrade_lut_layout"),
            entries: &[
                // binding 0: source image
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // binding 1: LUT texture
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: tier.lut_view_dimension(),
                        multisampled: false,
                    },
                    count: None,
                },
                // binding 2: LUT sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // binding 3: uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<LutUniforms>() as u64
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lutgrade_lut_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lutgrade_lut_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: IMAGE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        Self {
            tier,
            pipeline,
            bind_group_layout,
        }
    }

    /// Bind group for one draw.
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        source_view: &wgpu::TextureView,
        lut_view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        uniforms: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lutgrade_lut_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(lut_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        })
    }
}
