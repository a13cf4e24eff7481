//! Shared scratch and persistent buffer sizing.

use crate::operator::BindingRequirements;

/// Sizing of the two buffers shared by a compiled operator set.
///
/// Scratch carries no content across dispatches, so one allocation sized to
/// the largest single requirement (initialize included) serves every phase.
/// Persistent is sized to the largest execute requirement; sharing one
/// allocation is only sound while at most one operator's persistent state
/// is live at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourcePolicy {
    pub scratch_bytes: u64,
    pub persistent_bytes: u64,
}

impl ResourcePolicy {
    /// Derive the policy from the initializer's and every operator's
    /// execute requirements.
    pub fn from_requirements<'a>(
        initializer: &BindingRequirements,
        operators: impl IntoIterator<Item = &'a BindingRequirements>,
    ) -> Self {
        let mut scratch_bytes = initializer.scratch_bytes;
        let mut persistent_bytes = 0;
        for requirement in operators {
            scratch_bytes = scratch_bytes.max(requirement.scratch_bytes);
            persistent_bytes = persistent_bytes.max(requirement.persistent_bytes);
        }
        Self {
            scratch_bytes,
            persistent_bytes,
        }
    }
}
