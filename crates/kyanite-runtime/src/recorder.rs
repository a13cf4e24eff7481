//! Dispatch recording into the open command list.

use crate::binding::BindingTable;
use crate::context::DeviceContext;
use crate::heap::DescriptorHeap;
use kyanite_core::{Error, Result};

/// Stateless recorder: appends one dispatch instruction per call, never
/// submits, never synchronizes.
///
/// In hazard-validating mode (the default) a dispatch that reads a buffer
/// written by an earlier dispatch in the same unsubmitted batch is rejected
/// unless a barrier was recorded in between; see
/// [`DeviceContext::resource_barrier`].
pub struct CommandRecorder {
    validate_hazards: bool,
}

impl Default for CommandRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self {
            validate_hazards: true,
        }
    }

    pub fn with_hazard_validation(validate_hazards: bool) -> Self {
        Self { validate_hazards }
    }

    /// Record one dispatch of the table's target into the open command
    /// list.
    ///
    /// Flushes the table's descriptors into its heap range, builds the bind
    /// group, and records one compute pass. Each dispatch is its own pass:
    /// list order gives execute-before, and the pass boundary carries the
    /// write-visibility a recorded barrier promises.
    ///
    /// # Errors
    /// Returns `Precondition` when a required slot is unbound or, in
    /// validating mode, when an input carries an unresolved data hazard.
    pub fn record_dispatch(
        &self,
        table: &BindingTable,
        heap: &mut DescriptorHeap,
        ctx: &mut DeviceContext,
    ) -> Result<()> {
        let target = table.target();
        let regions = table.bound_regions()?;

        if self.validate_hazards {
            for region in table.input_regions() {
                if ctx.has_pending_write(region.key()) {
                    return Err(Error::Precondition(format!(
                        "data hazard: '{}' reads a buffer written earlier in this batch \
                         without an intervening barrier",
                        target.label()
                    )));
                }
            }
        }

        let base = table.range().offset;
        for (slot, region) in regions.iter().enumerate() {
            heap.write(base + slot as u32, (*region).clone())?;
        }

        let entries: Vec<wgpu::BindGroupEntry> = regions
            .iter()
            .enumerate()
            .map(|(slot, region)| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: region.as_binding(),
            })
            .collect();

        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(target.label()),
            layout: target.bind_group_layout(),
            entries: &entries,
        });

        {
            let mut pass = ctx
                .open_encoder()
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(target.label()),
                    timestamp_writes: None,
                });
            pass.set_pipeline(target.pipeline());
            pass.set_bind_group(0, &bind_group, &[]);
            if !target.immediates().is_empty() {
                pass.set_immediates(0, target.immediates());
            }
            let [x, y, z] = target.workgroups();
            pass.dispatch_workgroups(x, y, z);
        }
        tracing::trace!(dispatchable = target.label(), "recorded dispatch");

        // Scratch contents carry no cross-dispatch meaning, so only tensor
        // outputs participate in hazard tracking.
        let written: Vec<usize> = table.output_regions().map(|region| region.key()).collect();
        for key in written {
            ctx.mark_written(key);
        }

        Ok(())
    }
}
