//! Device-free core types for the Kyanite dispatch runtime.
//!
//! This crate provides everything the runtime needs that does not touch a
//! GPU:
//! - Tensor layout descriptions and byte sizing (`TensorLayout`)
//! - Operator descriptors and per-phase binding requirements
//! - Descriptor-range packing across an operator set (`pack_ranges`)
//! - The shared scratch/persistent buffer sizing policy (`ResourcePolicy`)
//!
//! All of it is pure and testable without a device.

pub mod descriptor;
pub mod layout;
pub mod operator;
pub mod policy;

// Re-export commonly used types
pub use descriptor::{DescriptorRange, DescriptorSpace, pack_ranges};
pub use layout::{ElementKind, TensorLayout, word_aligned};
pub use operator::{BindingRequirements, OperatorDescriptor, OperatorKind};
pub use policy::ResourcePolicy;

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every Kyanite crate.
///
/// Nothing is retried automatically: `AdapterUnsupported` is recoverable
/// only inside device selection (skip the adapter, try the next); every
/// other variant terminates the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No adapter offered the required capability.
    #[error("no suitable adapter: {0}")]
    AdapterUnsupported(String),

    /// Buffer, heap, or other GPU resource creation failed.
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    /// An operator descriptor or tensor layout was rejected.
    #[error("operator compilation failed: {0}")]
    Compile(String),

    /// A wait on submitted work failed or the device was lost.
    #[error("device wait failed: {0}")]
    DeviceLost(String),

    /// Programmer error: an operation was issued against the protocol.
    #[error("precondition violated: {0}")]
    Precondition(String),
}
