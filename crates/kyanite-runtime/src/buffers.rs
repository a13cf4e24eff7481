//! Shared scratch and persistent buffer allocation.

use crate::binding::{BindingTable, BufferRegion};
use crate::context::{BufferKind, DeviceContext};
use kyanite_core::{Error, ResourcePolicy, Result, word_aligned};
use std::sync::Arc;

/// The two buffers shared by a compiled operator set, sized by the
/// [`ResourcePolicy`].
///
/// Scratch contents are undefined across dispatches. Persistent contents
/// are written once by the initializer and must stay untouched for every
/// subsequent execute.
pub struct OperatorBuffers {
    scratch: Option<BufferRegion>,
    persistent: Option<BufferRegion>,
    policy: ResourcePolicy,
}

impl OperatorBuffers {
    /// Allocate the shared buffers. Zero-sized requirements allocate
    /// nothing.
    pub fn create(ctx: &DeviceContext, policy: ResourcePolicy) -> Result<Self> {
        let scratch = if policy.scratch_bytes > 0 {
            let buffer = ctx.create_buffer(
                BufferKind::Storage,
                word_aligned(policy.scratch_bytes),
                "operator scratch",
            )?;
            Some(BufferRegion::whole(Arc::new(buffer)))
        } else {
            None
        };
        let persistent = if policy.persistent_bytes > 0 {
            let buffer = ctx.create_buffer(
                BufferKind::Storage,
                word_aligned(policy.persistent_bytes),
                "operator persistent",
            )?;
            Some(BufferRegion::whole(Arc::new(buffer)))
        } else {
            None
        };
        Ok(Self {
            scratch,
            persistent,
            policy,
        })
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    pub fn scratch(&self) -> Option<&BufferRegion> {
        self.scratch.as_ref()
    }

    pub fn persistent(&self) -> Option<&BufferRegion> {
        self.persistent.as_ref()
    }

    /// Issue the shared-buffer binds for the initializer.
    ///
    /// Persistent state is the initializer's output; scratch is bound when
    /// the initialize phase requires it.
    pub fn bind_for_initialize(&self, table: &mut BindingTable) -> Result<()> {
        let layout = table.target().slot_layout();
        if layout.has_scratch {
            table.bind_scratch(self.scratch_region()?)?;
        }
        if layout.outputs > 0 {
            table.bind_output(0, self.persistent_region()?)?;
        }
        Ok(())
    }

    /// Issue the shared-buffer binds for an operator's execute dispatch.
    pub fn bind_for_execute(&self, table: &mut BindingTable) -> Result<()> {
        let layout = table.target().slot_layout();
        if layout.has_scratch {
            table.bind_scratch(self.scratch_region()?)?;
        }
        if layout.has_persistent {
            table.bind_persistent(self.persistent_region()?)?;
        }
        Ok(())
    }

    fn scratch_region(&self) -> Result<BufferRegion> {
        self.scratch.clone().ok_or_else(|| {
            Error::Precondition("dispatchable requires scratch but none was allocated".to_string())
        })
    }

    fn persistent_region(&self) -> Result<BufferRegion> {
        self.persistent.clone().ok_or_else(|| {
            Error::Precondition(
                "dispatchable requires persistent state but none was allocated".to_string(),
            )
        })
    }
}
