//! Buffer-range binding descriptors and the rebindable binding table.

use crate::compiler::Dispatchable;
use crate::heap::DescriptorHeap;
use kyanite_core::{DescriptorRange, Error, Result};
use std::sync::Arc;

/// A buffer-range binding descriptor: one GPU buffer plus a byte range.
///
/// Validated against the underlying buffer at construction, so a region can
/// always be bound.
#[derive(Debug, Clone)]
pub struct BufferRegion {
    buffer: Arc<wgpu::Buffer>,
    offset: u64,
    byte_width: u64,
}

impl BufferRegion {
    /// Create a binding descriptor over `[offset, offset + byte_width)`.
    pub fn new(buffer: Arc<wgpu::Buffer>, offset: u64, byte_width: u64) -> Result<Self> {
        if byte_width == 0 {
            return Err(Error::Precondition(
                "binding region must cover at least one byte".to_string(),
            ));
        }
        if offset + byte_width > buffer.size() {
            return Err(Error::Precondition(format!(
                "binding region {}..{} exceeds buffer size {}",
                offset,
                offset + byte_width,
                buffer.size()
            )));
        }
        Ok(Self {
            buffer,
            offset,
            byte_width,
        })
    }

    /// Create a binding descriptor covering a whole buffer.
    pub fn whole(buffer: Arc<wgpu::Buffer>) -> Self {
        let byte_width = buffer.size();
        Self {
            buffer,
            offset: 0,
            byte_width,
        }
    }

    pub fn buffer(&self) -> &Arc<wgpu::Buffer> {
        &self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn byte_width(&self) -> u64 {
        self.byte_width
    }

    /// Identity of the underlying buffer, used for hazard tracking.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.buffer) as usize
    }

    pub(crate) fn as_binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: self.offset,
            size: wgpu::BufferSize::new(self.byte_width),
        })
    }
}

/// The mutable association between one dispatchable and one descriptor
/// range.
///
/// The targeted dispatchable is non-nullable by construction. `reset`
/// retargets without reallocating the heap and discards every prior
/// binding; a dispatch can only be recorded once the table reports
/// [`is_fully_bound`](Self::is_fully_bound) again.
pub struct BindingTable {
    target: Dispatchable,
    range: DescriptorRange,
    heap_capacity: u32,
    slots: Vec<Option<BufferRegion>>,
}

impl BindingTable {
    /// Target `dispatchable` over `[offset, offset + count)` of `heap`.
    ///
    /// The heap's capacity is captured once; `reset` revalidates against it
    /// without touching the heap again.
    pub fn new(
        dispatchable: Dispatchable,
        heap: &DescriptorHeap,
        offset: u32,
        count: u32,
    ) -> Result<Self> {
        let range = DescriptorRange::new(offset, count);
        Self::validate(&dispatchable, range, heap.capacity())?;
        let slots = vec![None; dispatchable.slot_layout().descriptor_count() as usize];
        Ok(Self {
            target: dispatchable,
            range,
            heap_capacity: heap.capacity(),
            slots,
        })
    }

    /// Retarget to a new dispatchable and/or range, discarding all prior
    /// bindings. Every required bind must be reissued before the next
    /// dispatch.
    pub fn reset(&mut self, dispatchable: Dispatchable, offset: u32, count: u32) -> Result<()> {
        let range = DescriptorRange::new(offset, count);
        Self::validate(&dispatchable, range, self.heap_capacity)?;
        self.slots = vec![None; dispatchable.slot_layout().descriptor_count() as usize];
        self.target = dispatchable;
        self.range = range;
        Ok(())
    }

    fn validate(dispatchable: &Dispatchable, range: DescriptorRange, capacity: u32) -> Result<()> {
        if range.end() > capacity {
            return Err(Error::Precondition(format!(
                "descriptor range {}..{} exceeds heap capacity {}",
                range.offset,
                range.end(),
                capacity
            )));
        }
        let needed = dispatchable.slot_layout().descriptor_count();
        if range.count < needed {
            return Err(Error::Precondition(format!(
                "descriptor range holds {} slot(s) but '{}' needs {}",
                range.count,
                dispatchable.label(),
                needed
            )));
        }
        Ok(())
    }

    /// Bind one input tensor region.
    pub fn bind_input(&mut self, index: usize, region: BufferRegion) -> Result<()> {
        let slot = self.target.slot_layout().input_slot(index)?;
        self.slots[slot] = Some(region);
        Ok(())
    }

    /// Bind all input tensor regions in order.
    pub fn bind_inputs(&mut self, regions: &[BufferRegion]) -> Result<()> {
        let expected = self.target.slot_layout().inputs as usize;
        if regions.len() != expected {
            return Err(Error::Precondition(format!(
                "'{}' takes {} input(s), got {}",
                self.target.label(),
                expected,
                regions.len()
            )));
        }
        for (index, region) in regions.iter().enumerate() {
            self.bind_input(index, region.clone())?;
        }
        Ok(())
    }

    /// Bind one output tensor region.
    pub fn bind_output(&mut self, index: usize, region: BufferRegion) -> Result<()> {
        let slot = self.target.slot_layout().output_slot(index)?;
        self.slots[slot] = Some(region);
        Ok(())
    }

    /// Bind all output tensor regions in order.
    pub fn bind_outputs(&mut self, regions: &[BufferRegion]) -> Result<()> {
        let expected = self.target.slot_layout().outputs as usize;
        if regions.len() != expected {
            return Err(Error::Precondition(format!(
                "'{}' produces {} output(s), got {}",
                self.target.label(),
                expected,
                regions.len()
            )));
        }
        for (index, region) in regions.iter().enumerate() {
            self.bind_output(index, region.clone())?;
        }
        Ok(())
    }

    /// Bind the scratch region. Only valid when the target requires one.
    pub fn bind_scratch(&mut self, region: BufferRegion) -> Result<()> {
        let slot = self.target.slot_layout().scratch_slot()?;
        self.slots[slot] = Some(region);
        Ok(())
    }

    /// Bind the persistent region. Only valid when the target requires one.
    pub fn bind_persistent(&mut self, region: BufferRegion) -> Result<()> {
        let slot = self.target.slot_layout().persistent_slot()?;
        self.slots[slot] = Some(region);
        Ok(())
    }

    /// Whether every slot the target requires has been bound since the last
    /// construction or reset.
    pub fn is_fully_bound(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// The currently targeted dispatchable.
    pub fn target(&self) -> &Dispatchable {
        &self.target
    }

    /// The targeted descriptor range.
    pub fn range(&self) -> DescriptorRange {
        self.range
    }

    /// All bound regions in slot order.
    ///
    /// # Errors
    /// Returns `Precondition` when any required slot is unbound.
    pub(crate) fn bound_regions(&self) -> Result<Vec<&BufferRegion>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(slot, region)| {
                region.as_ref().ok_or_else(|| {
                    Error::Precondition(format!(
                        "'{}' recorded with descriptor slot {slot} unbound",
                        self.target.label()
                    ))
                })
            })
            .collect()
    }

    pub(crate) fn input_regions(&self) -> impl Iterator<Item = &BufferRegion> {
        let inputs = self.target.slot_layout().inputs as usize;
        self.slots[..inputs].iter().filter_map(Option::as_ref)
    }

    pub(crate) fn output_regions(&self) -> impl Iterator<Item = &BufferRegion> {
        let layout = self.target.slot_layout();
        let start = layout.inputs as usize;
        let end = start + layout.outputs as usize;
        self.slots[start..end].iter().filter_map(Option::as_ref)
    }
}
