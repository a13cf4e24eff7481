//! Shared helpers for GPU integration tests.

use kyanite_core::{ElementKind, OperatorDescriptor, OperatorKind, TensorLayout};
use kyanite_runtime::{BufferKind, BufferRegion, DeviceContext};
use std::sync::Arc;

/// Dense f32 layout over the given extents.
pub fn f32_layout(sizes: &[u32]) -> TensorLayout {
    TensorLayout::new(ElementKind::F32, sizes).expect("valid layout")
}

/// Two-input elementwise descriptor over equally-shaped f32 tensors.
pub fn binary_descriptor(kind: OperatorKind, sizes: &[u32]) -> OperatorDescriptor {
    let layout = f32_layout(sizes);
    OperatorDescriptor::new(kind, vec![layout.clone(), layout.clone()], vec![layout])
        .expect("valid descriptor")
}

/// Identity descriptor over an f32 tensor.
pub fn identity_descriptor(sizes: &[u32]) -> OperatorDescriptor {
    let layout = f32_layout(sizes);
    OperatorDescriptor::new(OperatorKind::Identity, vec![layout.clone()], vec![layout])
        .expect("valid descriptor")
}

/// Storage buffer pre-filled with the given f32 values.
pub fn storage_with(ctx: &DeviceContext, label: &str, values: &[f32]) -> Arc<wgpu::Buffer> {
    let buffer = ctx
        .create_buffer(
            BufferKind::Storage,
            (values.len() * 4) as u64,
            label,
        )
        .expect("buffer creation");
    ctx.write_buffer(&buffer, 0, bytemuck::cast_slice(values));
    Arc::new(buffer)
}

/// Empty storage buffer for `count` f32 elements.
pub fn storage_empty(ctx: &DeviceContext, label: &str, count: usize) -> Arc<wgpu::Buffer> {
    Arc::new(
        ctx.create_buffer(BufferKind::Storage, (count * 4) as u64, label)
            .expect("buffer creation"),
    )
}

/// Binding region covering a whole buffer.
pub fn region(buffer: &Arc<wgpu::Buffer>) -> BufferRegion {
    BufferRegion::whole(Arc::clone(buffer))
}

/// Read a buffer back as f32 values.
pub fn read_f32(ctx: &mut DeviceContext, buffer: &wgpu::Buffer, count: usize) -> Vec<f32> {
    let raw = ctx
        .read_back(buffer, (count * 4) as u64)
        .expect("readback");
    bytemuck::pod_collect_to_vec(&raw)
}
