//! GPU device, queue, and command-list lifecycle.

use crate::binding::BufferRegion;
use kyanite_core::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;

const COMMAND_LIST_LABEL: &str = "kyanite command list";

/// Heap class for buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Device-local storage, bindable to kernels and usable as a copy
    /// source/target.
    Storage,
    /// Host-mappable buffer for reading results back from the GPU.
    Readback,
}

/// Owns the compute device, one queue, and one command encoder kept open
/// for recording.
///
/// `submit_and_wait` is the sole synchronization primitive: it fully drains
/// the queue before returning, so no in-flight resource tracking is needed.
/// The open encoder must not be recorded into from more than one place at a
/// time; every recording path goes through this context.
pub struct DeviceContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    encoder: Option<wgpu::CommandEncoder>,
    pending_writes: HashSet<usize>,
}

impl DeviceContext {
    /// Select the first adapter that yields a device, skipping adapters
    /// that fail, and open the command list.
    ///
    /// # Errors
    /// Returns `AdapterUnsupported` when every candidate is exhausted.
    pub async fn create() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(wgpu::Backends::all()).await;
        if adapters.is_empty() {
            return Err(Error::AdapterUnsupported(
                "no adapters reported by any backend".to_string(),
            ));
        }

        let mut rejections = Vec::new();
        for adapter in adapters {
            let info = adapter.get_info();
            match adapter.request_device(&wgpu::DeviceDescriptor::default()).await {
                Ok((device, queue)) => {
                    tracing::info!(name = %info.name, backend = ?info.backend, "selected adapter");
                    let device = Arc::new(device);
                    let encoder =
                        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some(COMMAND_LIST_LABEL),
                        });
                    return Ok(Self {
                        device,
                        queue: Arc::new(queue),
                        adapter_info: info,
                        encoder: Some(encoder),
                        pending_writes: HashSet::new(),
                    });
                }
                Err(e) => {
                    tracing::debug!(name = %info.name, error = %e, "adapter rejected, trying next");
                    rejections.push(format!("{}: {e}", info.name));
                }
            }
        }

        Err(Error::AdapterUnsupported(format!(
            "all adapters rejected ({})",
            rejections.join("; ")
        )))
    }

    /// Allocate a committed GPU buffer.
    ///
    /// Zero-initialization is never part of the contract.
    pub fn create_buffer(
        &self,
        kind: BufferKind,
        byte_width: u64,
        label: &str,
    ) -> Result<wgpu::Buffer> {
        if byte_width == 0 {
            return Err(Error::ResourceCreation(format!(
                "buffer '{label}' must be at least one byte"
            )));
        }
        let usage = match kind {
            BufferKind::Storage => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST
            }
            BufferKind::Readback => wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        };
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: byte_width,
            usage,
            mapped_at_creation: false,
        }))
    }

    /// Upload data into a buffer at the given byte offset.
    pub fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    /// Close the command list, submit it, block until the submitted work
    /// completes, then reopen the list.
    ///
    /// The wait has no timeout: a hung device blocks the caller
    /// indefinitely.
    ///
    /// # Errors
    /// Returns `DeviceLost` when the wait fails.
    pub fn submit_and_wait(&mut self) -> Result<()> {
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(COMMAND_LIST_LABEL),
                }),
        };
        let index = self.queue.submit(Some(encoder.finish()));
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| Error::DeviceLost(format!("wait for submitted work failed: {e:?}")))?;
        self.pending_writes.clear();
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(COMMAND_LIST_LABEL),
                }),
        );
        Ok(())
    }

    /// Record a read/write barrier on the given buffer.
    ///
    /// List order alone provides ordering but not completion: when a
    /// dispatch consumes output produced earlier in the same unsubmitted
    /// list, a barrier on the shared buffer must be recorded between the
    /// two. Dispatches are recorded as separate compute passes, so the
    /// barrier also marks the buffer as safe for the hazard-validating
    /// recorder.
    pub fn resource_barrier(&mut self, region: &BufferRegion) {
        self.pending_writes.remove(&region.key());
    }

    /// Copy a buffer's contents back to the host.
    ///
    /// Records the copy into the open list, drains the queue, then maps a
    /// staging buffer.
    pub fn read_back(&mut self, source: &wgpu::Buffer, byte_width: u64) -> Result<Vec<u8>> {
        let staging = self.create_buffer(BufferKind::Readback, byte_width, "readback staging")?;
        self.open_encoder()
            .copy_buffer_to_buffer(source, 0, &staging, 0, byte_width);
        self.submit_and_wait()?;

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| Error::DeviceLost(format!("wait for buffer map failed: {e:?}")))?;
        receiver
            .recv()
            .map_err(|e| Error::DeviceLost(format!("map callback dropped: {e}")))?
            .map_err(|e| Error::DeviceLost(format!("buffer map failed: {e}")))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    /// Information about the selected adapter.
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// The compute device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// The command queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// The open command list.
    pub(crate) fn open_encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(COMMAND_LIST_LABEL),
            })
        })
    }

    pub(crate) fn mark_written(&mut self, key: usize) {
        self.pending_writes.insert(key);
    }

    pub(crate) fn has_pending_write(&self, key: usize) -> bool {
        self.pending_writes.contains(&key)
    }
}
