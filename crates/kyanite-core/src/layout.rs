//! Tensor layout descriptions and byte sizing.

use crate::{Error, Result};

/// Round a byte count up to the next multiple of 4.
///
/// GPU buffer sizes and tensor allocations are kept word-aligned throughout.
pub fn word_aligned(bytes: u64) -> u64 {
    (bytes + 3) & !3
}

/// Element type of a tensor buffer.
///
/// A closed set: kernels and sizing only ever see these eight kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    F16,
    I32,
    I16,
    I8,
    U32,
    U16,
    U8,
}

impl ElementKind {
    /// Size of one element in bytes.
    pub fn byte_size(self) -> u64 {
        match self {
            ElementKind::F32 | ElementKind::I32 | ElementKind::U32 => 4,
            ElementKind::F16 | ElementKind::I16 | ElementKind::U16 => 2,
            ElementKind::I8 | ElementKind::U8 => 1,
        }
    }
}

/// A typed, multi-dimensional buffer description with explicit per-dimension
/// extents and optional per-dimension byte-element strides.
///
/// Layouts are validated at construction: at least one dimension, no zero
/// sizes, and (when present) one stride per dimension. A valid layout can
/// always be sized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLayout {
    kind: ElementKind,
    sizes: Vec<u32>,
    strides: Option<Vec<u32>>,
}

impl TensorLayout {
    /// Create a densely packed layout.
    pub fn new(kind: ElementKind, sizes: &[u32]) -> Result<Self> {
        Self::build(kind, sizes, None)
    }

    /// Create a layout with explicit per-dimension strides, in elements.
    pub fn with_strides(kind: ElementKind, sizes: &[u32], strides: &[u32]) -> Result<Self> {
        Self::build(kind, sizes, Some(strides))
    }

    fn build(kind: ElementKind, sizes: &[u32], strides: Option<&[u32]>) -> Result<Self> {
        if sizes.is_empty() {
            return Err(Error::Compile(
                "tensor layout requires at least one dimension".to_string(),
            ));
        }
        if sizes.iter().any(|&s| s == 0) {
            return Err(Error::Compile(format!(
                "tensor layout has a zero-sized dimension: {sizes:?}"
            )));
        }
        if let Some(strides) = strides {
            if strides.len() != sizes.len() {
                return Err(Error::Compile(format!(
                    "stride count {} does not match dimension count {}",
                    strides.len(),
                    sizes.len()
                )));
            }
        }
        Ok(Self {
            kind,
            sizes: sizes.to_vec(),
            strides: strides.map(|s| s.to_vec()),
        })
    }

    /// Element type of this layout.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Per-dimension extents.
    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    /// Per-dimension strides, if the layout is strided.
    pub fn strides(&self) -> Option<&[u32]> {
        self.strides.as_deref()
    }

    /// Number of dimensions.
    pub fn dimension_count(&self) -> usize {
        self.sizes.len()
    }

    /// Number of addressable elements (product of extents).
    pub fn element_count(&self) -> u64 {
        self.sizes.iter().map(|&s| s as u64).product()
    }

    /// Total buffer footprint in bytes, rounded up to a multiple of 4.
    ///
    /// Unstrided layouts are densely packed: product of extents times the
    /// element size. Strided layouts are sized to the furthest-reaching
    /// dimension: `(max_d (size_d - 1) * stride_d + 1)` elements.
    pub fn total_byte_size(&self) -> u64 {
        let element = self.kind.byte_size();
        let bytes = match &self.strides {
            None => self.element_count() * element,
            Some(strides) => {
                let last_index = self
                    .sizes
                    .iter()
                    .zip(strides)
                    .map(|(&size, &stride)| (size as u64 - 1) * stride as u64)
                    .max()
                    .unwrap_or(0);
                (last_index + 1) * element
            }
        };
        word_aligned(bytes)
    }
}
