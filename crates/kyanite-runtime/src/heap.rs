//! The shared descriptor heap.
//!
//! One heap serves the initializer and every operator of a compiled set.
//! Each dispatchable owns a disjoint contiguous slot range (see
//! `kyanite_core::descriptor`); a range is targeted by at most one binding
//! table at a time, by caller convention.

use crate::binding::BufferRegion;
use kyanite_core::{DescriptorSpace, Error, Result};

/// A heap of descriptor slots, each referencing a buffer range once a
/// binding table flushes into it.
pub struct DescriptorHeap {
    slots: Vec<Option<BufferRegion>>,
}

impl DescriptorHeap {
    /// Create a heap with the given slot capacity.
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: vec![None; capacity as usize],
        }
    }

    /// Create a heap sized exactly to a packed descriptor space.
    pub fn for_space(space: &DescriptorSpace) -> Self {
        Self::new(space.total)
    }

    /// Slot capacity.
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of slots currently holding a descriptor.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// The descriptor at a slot, if one has been written.
    pub fn region_at(&self, slot: u32) -> Option<&BufferRegion> {
        self.slots.get(slot as usize).and_then(|s| s.as_ref())
    }

    pub(crate) fn write(&mut self, slot: u32, region: BufferRegion) -> Result<()> {
        let capacity = self.capacity();
        match self.slots.get_mut(slot as usize) {
            Some(entry) => {
                *entry = Some(region);
                Ok(())
            }
            None => Err(Error::Precondition(format!(
                "descriptor slot {slot} out of range (heap capacity {capacity})"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyanite_core::pack_ranges;

    #[test]
    fn test_heap_sized_to_space() {
        let space = pack_ranges(2, &[3, 3]);
        let heap = DescriptorHeap::for_space(&space);
        assert_eq!(heap.capacity(), 8);
        assert_eq!(heap.occupied(), 0);
        assert!(heap.region_at(0).is_none());
        assert!(heap.region_at(8).is_none());
    }
}
