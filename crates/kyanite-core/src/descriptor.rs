//! Descriptor-range packing across an operator set.
//!
//! One descriptor heap serves the initializer and every compiled operator.
//! Ranges are packed additively rather than max-sized: operators dispatched
//! before a synchronization point need simultaneously valid, non-colliding
//! slots, so each gets its own disjoint slice.

/// A contiguous half-open slot range `[offset, offset + count)` inside a
/// single descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    pub offset: u32,
    pub count: u32,
}

impl DescriptorRange {
    pub fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    /// One past the last slot in the range.
    pub fn end(&self) -> u32 {
        self.offset + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether two ranges share any slot. Empty ranges overlap nothing.
    pub fn overlaps(&self, other: &DescriptorRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

/// The full slot assignment for one compiled operator set.
#[derive(Debug, Clone)]
pub struct DescriptorSpace {
    /// The initializer's range, always at offset 0.
    pub initializer: DescriptorRange,
    /// One range per operator, in declaration order.
    pub operators: Vec<DescriptorRange>,
    /// Heap capacity: the sum of every range's count.
    pub total: u32,
}

impl DescriptorSpace {
    /// Range assigned to operator `index`.
    pub fn operator_range(&self, index: usize) -> Option<DescriptorRange> {
        self.operators.get(index).copied()
    }
}

/// Assign disjoint contiguous ranges: the initializer at offset zero, then
/// each operator's range starting where the previous one ends.
pub fn pack_ranges(initializer_count: u32, operator_counts: &[u32]) -> DescriptorSpace {
    let initializer = DescriptorRange::new(0, initializer_count);
    let mut cursor = initializer_count;
    let operators = operator_counts
        .iter()
        .map(|&count| {
            let range = DescriptorRange::new(cursor, count);
            cursor += count;
            range
        })
        .collect();
    DescriptorSpace {
        initializer,
        operators,
        total: cursor,
    }
}
