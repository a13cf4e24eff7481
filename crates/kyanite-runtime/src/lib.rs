//! GPU execution core for Kyanite.
//!
//! This crate compiles abstract tensor operators into GPU-resident
//! dispatchables and drives a two-phase (initialize-once, execute-many)
//! dispatch sequence over `wgpu`:
//!
//! 1. **Device context** — adapter selection with fallback, one queue, one
//!    command list kept open for recording, and a single submit-and-wait
//!    barrier ([`DeviceContext`]).
//! 2. **Compilation** — operator descriptors become compute pipelines with
//!    queried binding requirements; one initializer covers the whole set
//!    ([`compile`]).
//! 3. **Descriptor space** — one heap sized to the sum of every phase's
//!    requirement, with disjoint per-dispatchable ranges
//!    ([`DescriptorHeap`]).
//! 4. **Binding and dispatch** — a rebindable [`BindingTable`] plus a
//!    stateless [`CommandRecorder`], orchestrated by [`ExecutionDriver`].
//!
//! # Example
//!
//! ```no_run
//! use kyanite_core::{ElementKind, OperatorDescriptor, OperatorKind, TensorLayout};
//! use kyanite_runtime::{
//!     BufferKind, BufferRegion, CompileOptions, DeviceContext, ExecutionDriver,
//!     OperatorBindings,
//! };
//! use std::sync::Arc;
//!
//! #[pollster::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = DeviceContext::create().await?;
//!
//!     let layout = TensorLayout::new(ElementKind::F32, &[1, 2, 3, 4])?;
//!     let add = OperatorDescriptor::new(
//!         OperatorKind::ElementwiseAdd,
//!         vec![layout.clone(), layout.clone()],
//!         vec![layout.clone()],
//!     )?;
//!
//!     let mut driver = ExecutionDriver::compile(ctx, &[add], &CompileOptions::default())?;
//!     driver.create_buffers()?;
//!     driver.initialize()?;
//!
//!     let byte_width = layout.total_byte_size();
//!     let input = Arc::new(driver.context().create_buffer(
//!         BufferKind::Storage,
//!         byte_width,
//!         "input",
//!     )?);
//!     let output = Arc::new(driver.context().create_buffer(
//!         BufferKind::Storage,
//!         byte_width,
//!         "output",
//!     )?);
//!
//!     driver.execute(&[OperatorBindings {
//!         inputs: vec![
//!             BufferRegion::whole(Arc::clone(&input)),
//!             BufferRegion::whole(Arc::clone(&input)),
//!         ],
//!         outputs: vec![BufferRegion::whole(Arc::clone(&output))],
//!     }])?;
//!
//!     let result = driver.context_mut().read_back(&output, byte_width)?;
//!     println!("{} bytes read back", result.len());
//!     Ok(())
//! }
//! ```

mod binding;
mod buffers;
mod compiler;
mod context;
mod driver;
mod heap;
mod recorder;
pub mod shaders;

// Public exports
pub use binding::{BindingTable, BufferRegion};
pub use buffers::OperatorBuffers;
pub use compiler::{
    CompileOptions, CompiledOperator, CompiledSet, Dispatchable, Initializer, SlotLayout, compile,
    execute_requirements, initialize_requirements,
};
pub use context::{BufferKind, DeviceContext};
pub use driver::{ExecutionDriver, OperatorBindings};
pub use heap::DescriptorHeap;
pub use recorder::CommandRecorder;
