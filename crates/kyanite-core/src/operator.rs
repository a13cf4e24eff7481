//! Operator descriptors and per-phase binding requirements.

use crate::layout::{ElementKind, TensorLayout};
use crate::{Error, Result};

/// The computation an operator performs.
///
/// Opaque to everything but the compiler: the rest of the runtime only sees
/// compiled dispatchables and their requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    /// `out[i] = lhs[i] + rhs[i]`
    ElementwiseAdd,
    /// `out[i] = lhs[i] * rhs[i]`
    ElementwiseMultiply,
    /// `out[i] = in[i]`, bit-preserving
    Identity,
}

impl OperatorKind {
    /// Number of input tensors the operator consumes.
    pub fn input_arity(self) -> usize {
        match self {
            OperatorKind::ElementwiseAdd | OperatorKind::ElementwiseMultiply => 2,
            OperatorKind::Identity => 1,
        }
    }

    /// Stable name, also used to look up the kernel source.
    pub fn name(self) -> &'static str {
        match self {
            OperatorKind::ElementwiseAdd => "elementwise_add",
            OperatorKind::ElementwiseMultiply => "elementwise_multiply",
            OperatorKind::Identity => "identity",
        }
    }
}

/// An abstract computation over input/output tensors, consumed once by the
/// compiler.
///
/// Validated at construction: input count matches the kind's arity, exactly
/// one output, and every layout agrees on element kind and element count
/// (the built-in kernels are elementwise, with no broadcasting).
#[derive(Debug, Clone)]
pub struct OperatorDescriptor {
    kind: OperatorKind,
    inputs: Vec<TensorLayout>,
    outputs: Vec<TensorLayout>,
}

impl OperatorDescriptor {
    /// Create a validated operator descriptor.
    pub fn new(
        kind: OperatorKind,
        inputs: Vec<TensorLayout>,
        outputs: Vec<TensorLayout>,
    ) -> Result<Self> {
        if inputs.len() != kind.input_arity() {
            return Err(Error::Compile(format!(
                "{} takes {} input(s), got {}",
                kind.name(),
                kind.input_arity(),
                inputs.len()
            )));
        }
        if outputs.len() != 1 {
            return Err(Error::Compile(format!(
                "{} produces exactly one output, got {}",
                kind.name(),
                outputs.len()
            )));
        }
        let reference = &outputs[0];
        for layout in inputs.iter().chain(outputs.iter()) {
            if layout.kind() != reference.kind() {
                return Err(Error::Compile(format!(
                    "{} requires one element kind across all tensors, got {:?} and {:?}",
                    kind.name(),
                    layout.kind(),
                    reference.kind()
                )));
            }
            if layout.element_count() != reference.element_count() {
                return Err(Error::Compile(format!(
                    "{} requires equal element counts across all tensors, got {} and {}",
                    kind.name(),
                    layout.element_count(),
                    reference.element_count()
                )));
            }
        }
        Ok(Self {
            kind,
            inputs,
            outputs,
        })
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn inputs(&self) -> &[TensorLayout] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorLayout] {
        &self.outputs
    }

    /// Element kind shared by every tensor of this operator.
    pub fn element_kind(&self) -> ElementKind {
        self.outputs[0].kind()
    }

    /// Element count shared by every tensor of this operator.
    pub fn element_count(&self) -> u64 {
        self.outputs[0].element_count()
    }
}

/// What one phase of one dispatchable needs from its surroundings.
///
/// Queried once at compile time; the descriptor space allocator and the
/// resource sizing policy consume these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingRequirements {
    /// Scratch bytes, with no content guarantee across dispatches.
    pub scratch_bytes: u64,
    /// Persistent bytes that must survive from initialize to every execute.
    pub persistent_bytes: u64,
    /// Descriptor slots the phase binds.
    pub descriptor_count: u32,
}
