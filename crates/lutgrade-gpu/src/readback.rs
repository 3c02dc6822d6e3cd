//! GPU-to-CPU readback of rendered images.

use std::sync::mpsc;

use lutgrade_core::PixelBuffer;

use crate::error::GpuError;

/// Row pitch for a texture copy: `width * 4` rounded up to the copy alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Download an RGBA8 texture into a [`PixelBuffer`]. Blocks until complete.
///
/// `staging_cache` is reused across calls and grown when too small.
pub fn download_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    staging_cache: &mut Option<wgpu::Buffer>,
) -> Result<PixelBuffer, GpuError> {
    let extent = texture.size();
    let (width, height) = (extent.width, extent.height);
    let padded = padded_bytes_per_row(width);
    let size = padded as u64 * height as u64;

    let needs_new_staging = match staging_cache.as_ref() {
        Some(buf) => buf.size() < size,
        None => true,
    };
    if needs_new_staging {
        if let Some(old) = staging_cache.take() {
            old.destroy();
        }
        tracing::debug!("allocating {size} byte readback staging buffer");
        *staging_cache = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lutgrade_image_staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        }));
    }
    let Some(staging) = staging_cache.as_ref() else {
        return Err(GpuError::Readback("staging buffer unavailable".into()));
    };

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("lutgrade_image_download_encoder"),
    });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        extent,
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..size);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| GpuError::Readback(e.to_string()))?;
    rx.recv()
        .map_err(|e| GpuError::Readback(e.to_string()))?
        .map_err(|e| GpuError::Readback(e.to_string()))?;

    let data = slice.get_mapped_range();
    let row_bytes = width as usize * 4;
    let mut bytes = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks_exact(padded as usize) {
        bytes.extend_from_slice(&row[..row_bytes]);
    }
    drop(data);
    staging.unmap();

    PixelBuffer::from_rgba_bytes(width, height, &bytes)
        .map_err(|e| GpuError::Readback(e.to_string()))
}
