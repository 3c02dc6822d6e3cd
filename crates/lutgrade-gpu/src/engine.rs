//! The GPU LUT engine: owns one device context and every resource on it.

use std::collections::HashMap;
use std::sync::Arc;

use lutgrade_core::{ApplyError, LutApplier, LutHandle, LutTable, PixelBuffer, sanitize_strength};

use crate::buffers::{
    GpuImageTargets, GpuLutHandle, LutUniforms, create_lut_sampler, create_quad_buffer,
};
use crate::error::GpuError;
use crate::pipeline::{LutPipeline, Tier};
use crate::readback;

/// How to pick and configure the GPU context.
#[derive(Debug, Clone)]
pub struct GpuEngineOptions {
    pub power_preference: wgpu::PowerPreference,
    /// Override the probed tier. Forcing `Modern` on a device without 3D
    /// sampling fails at pipeline build.
    pub force_tier: Option<Tier>,
    /// Device label.
    pub label: String,
}

impl Default for GpuEngineOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_tier: None,
            label: "lutgrade_device".to_string(),
        }
    }
}

/// Upload state of a LUT id on one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutState {
    Unloaded,
    Uploading,
    Cached,
}

enum CacheEntry {
    Uploading,
    Cached(GpuLutHandle),
}

struct EngineResources {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: LutPipeline,
    quad: wgpu::Buffer,
    uniforms: wgpu::Buffer,
    sampler: wgpu::Sampler,
    /// Keyed by caller-supplied id, never evicted.
    luts: HashMap<String, CacheEntry>,
    current_lut: Option<String>,
    targets: Option<GpuImageTargets>,
    staging: Option<wgpu::Buffer>,
}

/// Applies 3D LUTs to images with a single full-surface draw.
///
/// After [`dispose`](Self::dispose) every operation returns
/// [`GpuError::Disposed`].
pub struct GpuLutEngine {
    resources: Option<EngineResources>,
    tier: Tier,
    adapter_info: Option<wgpu::AdapterInfo>,
    max_lut_size: u32,
    max_image_dimension: u32,
}

impl GpuLutEngine {
    /// Create an engine on a fresh device, blocking on adapter and device
    /// requests.
    pub fn create_blocking(options: &GpuEngineOptions) -> Result<Self, GpuError> {
        pollster::block_on(Self::create(options))
    }

    /// Create an engine on a fresh device.
    pub async fn create(options: &GpuEngineOptions) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                ..Default::default()
            })
            .await?;
        let tier = options.force_tier.unwrap_or_else(|| Tier::probe(&adapter));

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(options.label.as_str()),
                required_features: crate::required_features(),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await?;

        let mut engine = Self::with_device(Arc::new(device), Arc::new(queue), tier)?;
        let info = adapter.get_info();
        tracing::info!(
            "GPU LUT engine on {} ({:?}), {} tier",
            info.name,
            info.backend,
            tier.as_str()
        );
        engine.adapter_info = Some(info);
        Ok(engine)
    }

    /// Create an engine on a device the host already owns.
    pub fn with_device(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        tier: Tier,
    ) -> Result<Self, GpuError> {
        push_scopes(&device);
        let pipeline = LutPipeline::new(&device, tier);
        let quad = create_quad_buffer(&device);
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lutgrade_lut_uniforms"),
            size: std::mem::size_of::<LutUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sampler = create_lut_sampler(&device);
        pop_scopes(&device, "pipeline build").map_err(|e| match e {
            GpuError::Validation { message, .. } => GpuError::ShaderBuild(message),
            other => other,
        })?;

        let limits = device.limits();
        Ok(Self {
            max_lut_size: tier.max_lut_size(&limits),
            max_image_dimension: limits.max_texture_dimension_2d,
            resources: Some(EngineResources {
                device,
                queue,
                pipeline,
                quad,
                uniforms,
                sampler,
                luts: HashMap::new(),
                current_lut: None,
                targets: None,
                staging: None,
            }),
            tier,
            adapter_info: None,
        })
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Adapter details, when the engine created its own device.
    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.adapter_info.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.resources.is_none()
    }

    pub fn lut_state(&self, id: &str) -> LutState {
        match self.resources.as_ref().and_then(|r| r.luts.get(id)) {
            None => LutState::Unloaded,
            Some(CacheEntry::Uploading) => LutState::Uploading,
            Some(CacheEntry::Cached(_)) => LutState::Cached,
        }
    }

    pub fn cached_lut_count(&self) -> usize {
        self.resources.as_ref().map_or(0, |r| {
            r.luts
                .values()
                .filter(|e| matches!(e, CacheEntry::Cached(_)))
                .count()
        })
    }

    /// Id of the LUT the next draw will use.
    pub fn current_lut(&self) -> Option<&str> {
        self.resources.as_ref()?.current_lut.as_deref()
    }

    /// Upload `lut` under `id` and make it current.
    ///
    /// An id that is already cached is reused without re-upload, whatever
    /// table is passed.
    pub fn load_lut(&mut self, lut: &LutTable, id: &str) -> Result<(), GpuError> {
        let tier = self.tier;
        let max_lut_size = self.max_lut_size;
        let res = self.resources.as_mut().ok_or(GpuError::Disposed)?;

        if let Some(CacheEntry::Cached(_)) = res.luts.get(id) {
            tracing::debug!("LUT {id:?} already cached, skipping upload");
            res.current_lut = Some(id.to_string());
            return Ok(());
        }
        if lut.size() > max_lut_size {
            return Err(GpuError::LutTooLarge {
                size: lut.size(),
                limit: max_lut_size,
            });
        }

        res.luts.insert(id.to_string(), CacheEntry::Uploading);
        push_scopes(&res.device);
        let handle = GpuLutHandle::upload(&res.device, &res.queue, lut, tier);
        if let Err(e) = pop_scopes(&res.device, "LUT upload") {
            handle.texture.destroy();
            res.luts.remove(id);
            return Err(e);
        }

        tracing::info!(
            "uploaded LUT {id:?} ({}³, {} tier)",
            lut.size(),
            tier.as_str()
        );
        res.luts.insert(id.to_string(), CacheEntry::Cached(handle));
        res.current_lut = Some(id.to_string());
        Ok(())
    }

    /// Make an already-cached LUT current.
    pub fn use_lut(&mut self, id: &str) -> Result<(), GpuError> {
        let res = self.resources.as_mut().ok_or(GpuError::Disposed)?;
        match res.luts.get(id) {
            Some(CacheEntry::Cached(_)) => {
                res.current_lut = Some(id.to_string());
                Ok(())
            }
            _ => Err(GpuError::UnknownLut(id.to_string())),
        }
    }

    /// Render `image` through the current LUT and read the result back.
    pub fn apply(&mut self, image: &PixelBuffer, strength: f32) -> Result<PixelBuffer, GpuError> {
        if image.is_empty() {
            self.current_handle()?;
            return Ok(image.clone());
        }
        self.render(image, strength)?;
        let res = self.resources.as_mut().ok_or(GpuError::Disposed)?;
        let Some(targets) = res.targets.as_ref() else {
            return Err(GpuError::Readback("no render target".into()));
        };
        push_scopes(&res.device);
        let result = readback::download_texture(
            &res.device,
            &res.queue,
            &targets.output,
            &mut res.staging,
        );
        pop_scopes(&res.device, "readback")?;
        result
    }

    /// Draw `image` through the current LUT into the engine's output target
    /// without reading it back.
    pub fn render(&mut self, image: &PixelBuffer, strength: f32) -> Result<(), GpuError> {
        self.current_handle()?;
        if image.is_empty() {
            tracing::debug!("skipping render of empty image");
            return Ok(());
        }
        let limit = self.max_image_dimension;
        if image.width > limit || image.height > limit {
            return Err(GpuError::ImageTooLarge {
                width: image.width,
                height: image.height,
                limit,
            });
        }
        let res = self.resources.as_mut().ok_or(GpuError::Disposed)?;
        let Some(CacheEntry::Cached(lut)) = res.current_lut.as_ref().and_then(|id| res.luts.get(id))
        else {
            return Err(GpuError::NoLutLoaded);
        };

        push_scopes(&res.device);

        let reuse = res
            .targets
            .as_ref()
            .is_some_and(|t| t.matches(image.width, image.height));
        if !reuse {
            if let Some(old) = res.targets.take() {
                old.destroy();
            }
            tracing::debug!(
                "allocating {}x{} image targets",
                image.width,
                image.height
            );
        }
        let device = &res.device;
        let targets = res
            .targets
            .get_or_insert_with(|| GpuImageTargets::new(device, image.width, image.height));
        targets.upload(&res.queue, image);

        let uniforms = LutUniforms::new(lut, sanitize_strength(strength));
        res.queue
            .write_buffer(&res.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = res.pipeline.bind_group(
            &res.device,
            &targets.source_view,
            &lut.texture_view,
            &res.sampler,
            &res.uniforms,
        );

        let mut encoder = res
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lutgrade_lut_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lutgrade_lut_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.output_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&res.pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, res.quad.slice(..));
            pass.draw(0..4, 0..1);
        }
        res.queue.submit(std::iter::once(encoder.finish()));

        pop_scopes(&res.device, "render")
    }

    /// Release every GPU resource. Later calls fail with
    /// [`GpuError::Disposed`]; disposing twice is a no-op.
    pub fn dispose(&mut self) {
        let Some(res) = self.resources.take() else {
            return;
        };
        let lut_count = res.luts.len();
        for entry in res.luts.into_values() {
            if let CacheEntry::Cached(handle) = entry {
                handle.texture.destroy();
            }
        }
        if let Some(targets) = res.targets {
            targets.destroy();
        }
        if let Some(staging) = res.staging {
            staging.destroy();
        }
        res.quad.destroy();
        res.uniforms.destroy();
        tracing::info!("disposed GPU LUT engine ({lut_count} cached LUTs released)");
    }

    fn current_handle(&self) -> Result<&GpuLutHandle, GpuError> {
        let res = self.resources.as_ref().ok_or(GpuError::Disposed)?;
        match res.current_lut.as_ref().and_then(|id| res.luts.get(id)) {
            Some(CacheEntry::Cached(handle)) => Ok(handle),
            _ => Err(GpuError::NoLutLoaded),
        }
    }
}

impl LutApplier for GpuLutEngine {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn apply_lut(
        &mut self,
        image: &PixelBuffer,
        lut: &LutHandle,
        strength: f32,
    ) -> Result<PixelBuffer, ApplyError> {
        match self.lut_state(lut.id()) {
            LutState::Cached => self.use_lut(lut.id())?,
            _ => self.load_lut(lut.table(), lut.id())?,
        }
        Ok(self.apply(image, strength)?)
    }

    fn dispose(&mut self) {
        GpuLutEngine::dispose(self);
    }
}

fn push_scopes(device: &wgpu::Device) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
}

/// Pop the scopes pushed by [`push_scopes`], validation first.
fn pop_scopes(device: &wgpu::Device, operation: &'static str) -> Result<(), GpuError> {
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    match oom.or(validation) {
        Some(error) => {
            tracing::error!("GPU error during {operation}: {error}");
            Err(GpuError::from_scope(operation, error))
        }
        None => Ok(()),
    }
}
