//! Two-phase execution orchestration.
//!
//! The driver owns the whole protocol: compile the operator set, size the
//! descriptor space and shared buffers, run the one-time initialize
//! dispatch, then execute the operator chain as many times as the caller
//! needs, upholding the hazard rule between chained dispatches.

use crate::binding::{BindingTable, BufferRegion};
use crate::buffers::OperatorBuffers;
use crate::compiler::{self, CompileOptions, CompiledOperator, Initializer};
use crate::context::DeviceContext;
use crate::heap::DescriptorHeap;
use crate::recorder::CommandRecorder;
use kyanite_core::{
    DescriptorRange, DescriptorSpace, Error, OperatorDescriptor, ResourcePolicy, Result,
    pack_ranges,
};

/// Caller-supplied tensor bindings for one operator's execute dispatch.
pub struct OperatorBindings {
    pub inputs: Vec<BufferRegion>,
    pub outputs: Vec<BufferRegion>,
}

/// Protocol phase. Construction implies a compiled set, so there is no
/// uncompiled value to misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Compiled,
    BuffersAllocated,
    Ready,
}

/// One operator of the compiled set with its descriptor range.
struct OperatorEntry {
    compiled: CompiledOperator,
    range: DescriptorRange,
}

/// Orchestrates compile → allocate → initialize → execute over one device
/// context.
pub struct ExecutionDriver {
    ctx: DeviceContext,
    recorder: CommandRecorder,
    operators: Vec<OperatorEntry>,
    initializer: Initializer,
    space: DescriptorSpace,
    heap: DescriptorHeap,
    table: BindingTable,
    buffers: Option<OperatorBuffers>,
    phase: Phase,
    executions: u64,
}

impl ExecutionDriver {
    /// Compile the operator set and size the shared descriptor space.
    ///
    /// # Errors
    /// Returns `Precondition` for an empty set and `Compile` when any
    /// descriptor is rejected.
    pub fn compile(
        ctx: DeviceContext,
        descriptors: &[OperatorDescriptor],
        options: &CompileOptions,
    ) -> Result<Self> {
        let set = compiler::compile(&ctx, descriptors, options)?;

        let counts: Vec<u32> = set
            .operators
            .iter()
            .map(|op| op.requirements().descriptor_count)
            .collect();
        let space = pack_ranges(set.initializer.requirements().descriptor_count, &counts);
        let heap = DescriptorHeap::for_space(&space);

        let table = BindingTable::new(
            set.initializer.dispatchable(),
            &heap,
            space.initializer.offset,
            space.initializer.count,
        )?;

        let operators = set
            .operators
            .into_iter()
            .zip(space.operators.iter().copied())
            .map(|(compiled, range)| OperatorEntry { compiled, range })
            .collect();

        tracing::info!(
            operators = counts.len(),
            descriptor_slots = space.total,
            "operator set compiled"
        );

        Ok(Self {
            ctx,
            recorder: CommandRecorder::new(),
            operators,
            initializer: set.initializer,
            space,
            heap,
            table,
            buffers: None,
            phase: Phase::Compiled,
            executions: 0,
        })
    }

    /// Allocate the shared scratch/persistent buffers per the sizing
    /// policy.
    pub fn create_buffers(&mut self) -> Result<()> {
        if self.phase != Phase::Compiled {
            return Err(Error::Precondition(
                "buffers are created once, directly after compilation".to_string(),
            ));
        }
        let policy = ResourcePolicy::from_requirements(
            self.initializer.requirements(),
            self.operators.iter().map(|entry| entry.compiled.requirements()),
        );
        self.buffers = Some(OperatorBuffers::create(&self.ctx, policy)?);
        self.phase = Phase::BuffersAllocated;
        Ok(())
    }

    /// Run the one-time initialize dispatch and drain the queue.
    ///
    /// Afterwards the persistent buffer is owned-initialized and must not
    /// be written again.
    pub fn initialize(&mut self) -> Result<()> {
        if self.phase != Phase::BuffersAllocated {
            return Err(Error::Precondition(
                "initialize runs exactly once, after buffer creation".to_string(),
            ));
        }
        self.table.reset(
            self.initializer.dispatchable(),
            self.space.initializer.offset,
            self.space.initializer.count,
        )?;
        self.buffers
            .as_ref()
            .ok_or_else(|| {
                Error::Precondition("shared buffers have not been created".to_string())
            })?
            .bind_for_initialize(&mut self.table)?;
        self.recorder
            .record_dispatch(&self.table, &mut self.heap, &mut self.ctx)?;
        self.ctx.submit_and_wait()?;
        self.phase = Phase::Ready;
        tracing::debug!(covered = self.initializer.covered(), "operator set initialized");
        Ok(())
    }

    /// Record every operator's dispatch in sequence, then submit and drain.
    ///
    /// When an operator consumes a buffer written earlier in the batch, the
    /// required barrier is recorded before its dispatch. The driver loops
    /// back here with fresh input data without recompiling or
    /// reinitializing.
    pub fn execute(&mut self, bindings: &[OperatorBindings]) -> Result<()> {
        if self.phase != Phase::Ready {
            return Err(Error::Precondition(
                "execute requires a completed initialize".to_string(),
            ));
        }
        if bindings.len() != self.operators.len() {
            return Err(Error::Precondition(format!(
                "execute takes bindings for {} operator(s), got {}",
                self.operators.len(),
                bindings.len()
            )));
        }

        for (entry, binds) in self.operators.iter().zip(bindings) {
            self.table.reset(
                entry.compiled.dispatchable(),
                entry.range.offset,
                entry.range.count,
            )?;
            for region in &binds.inputs {
                if self.ctx.has_pending_write(region.key()) {
                    self.ctx.resource_barrier(region);
                }
            }
            self.table.bind_inputs(&binds.inputs)?;
            self.table.bind_outputs(&binds.outputs)?;
            self.buffers
                .as_ref()
                .ok_or_else(|| {
                    Error::Precondition("execute requires allocated buffers".to_string())
                })?
                .bind_for_execute(&mut self.table)?;
            self.recorder
                .record_dispatch(&self.table, &mut self.heap, &mut self.ctx)?;
        }

        self.ctx.submit_and_wait()?;
        self.executions += 1;
        Ok(())
    }

    /// The device context, for buffer creation and uploads.
    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    /// The device context, for readback.
    pub fn context_mut(&mut self) -> &mut DeviceContext {
        &mut self.ctx
    }

    /// The packed descriptor space of the compiled set.
    pub fn descriptor_space(&self) -> &DescriptorSpace {
        &self.space
    }

    /// Number of operators in the compiled set.
    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    /// Completed execute passes since initialize.
    pub fn executions(&self) -> u64 {
        self.executions
    }

    /// The sizing policy, once buffers exist.
    pub fn resource_policy(&self) -> Option<&ResourcePolicy> {
        self.buffers.as_ref().map(OperatorBuffers::policy)
    }
}
