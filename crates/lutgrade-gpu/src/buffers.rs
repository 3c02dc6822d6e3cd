//! GPU texture and buffer management for the LUT render pass.

use half::f16;
use lutgrade_core::{LutTable, PixelBuffer};
use wgpu::util::DeviceExt;

use crate::pipeline::Tier;
use crate::tiling;

/// Format of the output render target and of the uploaded source image.
pub const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Format of LUT textures. Filterable on every backend without extra features.
pub const LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// One vertex of the full-surface quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Triangle-strip quad covering clip space; uv (0, 0) is the top-left pixel.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

/// Create the static vertex buffer for the full-surface draw.
pub fn create_quad_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("lutgrade_quad_vertices"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

/// Fragment-stage uniforms, laid out to match `LutUniforms` in both shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LutUniforms {
    pub domain_min: [f32; 4],
    pub domain_max: [f32; 4],
    pub strength: f32,
    pub lut_size: f32,
    pub _pad: [f32; 2],
}

impl LutUniforms {
    pub fn new(lut: &GpuLutHandle, strength: f32) -> Self {
        let [r0, g0, b0] = lut.domain_min;
        let [r1, g1, b1] = lut.domain_max;
        Self {
            domain_min: [r0, g0, b0, 0.0],
            domain_max: [r1, g1, b1, 1.0],
            strength,
            lut_size: lut.size as f32,
            _pad: [0.0; 2],
        }
    }
}

/// Source image texture plus the render target it is drawn into.
///
/// Both share the image's dimensions and are recreated only when those change.
pub struct GpuImageTargets {
    pub source: wgpu::Texture,
    pub source_view: wgpu::TextureView,
    pub output: wgpu::Texture,
    pub output_view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuImageTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let source = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lutgrade_source_image"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let output = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lutgrade_output_image"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            source,
            source_view,
            output,
            output_view,
            width,
            height,
        }
    }

    /// Whether these targets can be reused for an image of the given size.
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Write the image's RGBA8 pixels into the source texture.
    pub fn upload(&self, queue: &wgpu::Queue, image: &PixelBuffer) {
        queue.write_texture(
            self.source.as_image_copy(),
            image.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            self.source.size(),
        );
    }

    pub fn destroy(&self) {
        self.source.destroy();
        self.output.destroy();
    }
}

/// Handle to an uploaded LUT.
///
/// Modern tier: a native N×N×N 3D texture. Legacy tier: the same texels
/// tiled into an N²×N 2D texture (see [`crate::tiling`]).
pub struct GpuLutHandle {
    pub texture: wgpu::Texture,
    pub texture_view: wgpu::TextureView,
    pub size: u32,
    pub domain_min: [f32; 3],
    pub domain_max: [f32; 3],
}

impl GpuLutHandle {
    /// Create the texture for `lut` and upload its samples.
    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, lut: &LutTable, tier: Tier) -> Self {
        let size = lut.size();
        let texels = lut_texels(lut);
        let (extent, dimension, texels) = match tier {
            Tier::Modern => (
                wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: size,
                },
                wgpu::TextureDimension::D3,
                texels,
            ),
            Tier::Legacy => {
                let (width, height) = tiling::tiled_extent(size);
                (
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    wgpu::TextureDimension::D2,
                    tiling::tile_texels(&texels, size),
                )
            }
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(match tier {
                Tier::Modern => "lutgrade_lut_texture_3d",
                Tier::Legacy => "lutgrade_lut_texture_tiled",
            }),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: LUT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let texel_bytes = std::mem::size_of::<[f16; 4]>() as u32;
        queue.write_texture(
            texture.as_image_copy(),
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(extent.width * texel_bytes),
                rows_per_image: Some(extent.height),
            },
            extent,
        );

        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            texture_view,
            size,
            domain_min: lut.domain_min(),
            domain_max: lut.domain_max(),
        }
    }
}

/// Convert LUT samples to RGBA half-float texels, alpha 1.
fn lut_texels(lut: &LutTable) -> Vec<[f16; 4]> {
    lut.data()
        .iter()
        .map(|&[r, g, b]| {
            [
                f16::from_f32(r),
                f16::from_f32(g),
                f16::from_f32(b),
                f16::ONE,
            ]
        })
        .collect()
}

/// Linear, edge-clamped sampler used for LUT lookups on both tiers.
pub fn create_lut_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("lutgrade_lut_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}
