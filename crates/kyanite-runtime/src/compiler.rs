//! Operator compilation into GPU-dispatchable pipelines.
//!
//! Turns validated operator descriptors into compiled dispatchables, builds
//! one initializer over the whole set, and reports each phase's binding
//! requirements. Kernels are WGSL sources composed with `naga_oil`,
//! validated, and baked into compute pipelines; the per-dispatch element
//! count travels as immediate data.

use crate::context::DeviceContext;
use crate::shaders::shader_source;
use kyanite_core::{
    BindingRequirements, ElementKind, Error, OperatorDescriptor, OperatorKind, Result,
    word_aligned,
};
use naga_oil::compose::{Composer, NagaModuleDescriptor, ShaderDefValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Compilation flags for an operator set.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Threads per workgroup for every kernel.
    pub workgroup_size: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            workgroup_size: 256,
        }
    }
}

/// Descriptor-slot roles of one dispatchable, in binding order: inputs,
/// outputs, then scratch and persistent when required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub inputs: u32,
    pub outputs: u32,
    pub has_scratch: bool,
    pub has_persistent: bool,
}

impl SlotLayout {
    /// Total descriptor slots this layout binds.
    pub fn descriptor_count(&self) -> u32 {
        self.inputs + self.outputs + u32::from(self.has_scratch) + u32::from(self.has_persistent)
    }

    pub(crate) fn input_slot(&self, index: usize) -> Result<usize> {
        if (index as u32) < self.inputs {
            Ok(index)
        } else {
            Err(Error::Precondition(format!(
                "input slot {index} out of range (layout has {})",
                self.inputs
            )))
        }
    }

    pub(crate) fn output_slot(&self, index: usize) -> Result<usize> {
        if (index as u32) < self.outputs {
            Ok(self.inputs as usize + index)
        } else {
            Err(Error::Precondition(format!(
                "output slot {index} out of range (layout has {})",
                self.outputs
            )))
        }
    }

    pub(crate) fn scratch_slot(&self) -> Result<usize> {
        if self.has_scratch {
            Ok((self.inputs + self.outputs) as usize)
        } else {
            Err(Error::Precondition(
                "dispatchable has no scratch slot".to_string(),
            ))
        }
    }

    pub(crate) fn persistent_slot(&self) -> Result<usize> {
        if self.has_persistent {
            Ok((self.inputs + self.outputs + u32::from(self.has_scratch)) as usize)
        } else {
            Err(Error::Precondition(
                "dispatchable has no persistent slot".to_string(),
            ))
        }
    }
}

/// A device-resident object targetable by one dispatch instruction: a
/// compiled operator or the initializer.
///
/// Cheap to clone; the pipeline and layout are shared.
#[derive(Clone)]
pub struct Dispatchable {
    pipeline: Arc<wgpu::ComputePipeline>,
    layout: Arc<wgpu::BindGroupLayout>,
    slots: SlotLayout,
    workgroups: [u32; 3],
    immediates: Vec<u8>,
    label: String,
}

impl Dispatchable {
    pub fn slot_layout(&self) -> SlotLayout {
        self.slots
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub(crate) fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub(crate) fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    pub(crate) fn immediates(&self) -> &[u8] {
        &self.immediates
    }
}

/// A compiled operator: created once, executable arbitrarily many times.
pub struct CompiledOperator {
    dispatchable: Dispatchable,
    requirements: BindingRequirements,
    kind: OperatorKind,
}

impl CompiledOperator {
    /// Handle for targeting this operator with a binding table.
    pub fn dispatchable(&self) -> Dispatchable {
        self.dispatchable.clone()
    }

    /// Execute-phase requirement.
    pub fn requirements(&self) -> &BindingRequirements {
        &self.requirements
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }
}

/// One compiled aggregate covering a whole operator set.
///
/// Must execute exactly once before any covered operator's first execute.
/// When some operator carries persistent state the initializer zero-fills
/// the shared persistent buffer (bound as its output); otherwise it is a
/// trivial kernel with no descriptors.
pub struct Initializer {
    dispatchable: Dispatchable,
    requirements: BindingRequirements,
    covered: usize,
}

impl Initializer {
    pub fn dispatchable(&self) -> Dispatchable {
        self.dispatchable.clone()
    }

    /// One-time initialize requirement.
    pub fn requirements(&self) -> &BindingRequirements {
        &self.requirements
    }

    /// Number of operators this initializer covers.
    pub fn covered(&self) -> usize {
        self.covered
    }
}

/// Output of [`compile`]: operators in declaration order plus their shared
/// initializer.
pub struct CompiledSet {
    pub operators: Vec<CompiledOperator>,
    pub initializer: Initializer,
}

/// Execute-phase requirement of a descriptor, derived without a device.
///
/// The built-in elementwise kernels work entirely in their bound tensors:
/// no scratch, no persistent state, one descriptor per tensor.
pub fn execute_requirements(descriptor: &OperatorDescriptor) -> BindingRequirements {
    BindingRequirements {
        scratch_bytes: 0,
        persistent_bytes: 0,
        descriptor_count: descriptor.kind().input_arity() as u32 + 1,
    }
}

/// Initialize-phase requirement over a set of execute requirements.
///
/// The initializer binds the shared persistent buffer as its single output
/// when any operator needs persistent state.
pub fn initialize_requirements(operators: &[BindingRequirements]) -> BindingRequirements {
    let persistent = operators
        .iter()
        .map(|r| r.persistent_bytes)
        .max()
        .unwrap_or(0);
    BindingRequirements {
        scratch_bytes: 0,
        persistent_bytes: 0,
        descriptor_count: u32::from(persistent > 0),
    }
}

/// Compile an operator set: one dispatchable per descriptor, in declaration
/// order, then one initializer over the full set.
///
/// # Errors
/// Returns `Precondition` for an empty set and `Compile` when a descriptor
/// or kernel is rejected.
pub fn compile(
    ctx: &DeviceContext,
    descriptors: &[OperatorDescriptor],
    options: &CompileOptions,
) -> Result<CompiledSet> {
    if descriptors.is_empty() {
        return Err(Error::Precondition(
            "compile requires at least one operator descriptor".to_string(),
        ));
    }

    let mut operators = Vec::with_capacity(descriptors.len());
    for (index, descriptor) in descriptors.iter().enumerate() {
        let compiled = compile_operator(ctx, index, descriptor, options)?;
        tracing::debug!(
            index,
            kind = compiled.kind().name(),
            descriptors = compiled.requirements().descriptor_count,
            "compiled operator"
        );
        operators.push(compiled);
    }
    let initializer = build_initializer(ctx, &operators, options)?;
    Ok(CompiledSet {
        operators,
        initializer,
    })
}

fn compile_operator(
    ctx: &DeviceContext,
    index: usize,
    descriptor: &OperatorDescriptor,
    options: &CompileOptions,
) -> Result<CompiledOperator> {
    let kind = descriptor.kind();
    if descriptor.element_kind() != ElementKind::F32 {
        return Err(Error::Compile(format!(
            "{} kernel only supports 32-bit float tensors, got {:?}",
            kind.name(),
            descriptor.element_kind()
        )));
    }

    let requirements = execute_requirements(descriptor);
    let slots = SlotLayout {
        inputs: kind.input_arity() as u32,
        outputs: 1,
        has_scratch: requirements.scratch_bytes > 0,
        has_persistent: requirements.persistent_bytes > 0,
    };

    let element_count = u32::try_from(descriptor.element_count()).map_err(|_| {
        Error::Compile(format!(
            "{} tensor exceeds the addressable element range",
            kind.name()
        ))
    })?;

    let source = shader_source(kind.name())
        .ok_or_else(|| Error::Compile(format!("no kernel source for {}", kind.name())))?;
    let label = format!("{}[{index}]", kind.name());
    let module = compose_kernel(&label, source, options.workgroup_size)?;

    let dispatchable = build_dispatchable(
        ctx,
        label,
        &module,
        slots,
        dispatch_extent(element_count, options.workgroup_size),
        element_count.to_le_bytes().to_vec(),
    )?;

    Ok(CompiledOperator {
        dispatchable,
        requirements,
        kind,
    })
}

fn build_initializer(
    ctx: &DeviceContext,
    operators: &[CompiledOperator],
    options: &CompileOptions,
) -> Result<Initializer> {
    let execute: Vec<BindingRequirements> =
        operators.iter().map(|op| *op.requirements()).collect();
    let requirements = initialize_requirements(&execute);

    let persistent_bytes = execute
        .iter()
        .map(|r| r.persistent_bytes)
        .max()
        .unwrap_or(0);

    let dispatchable = if persistent_bytes > 0 {
        let words = u32::try_from(word_aligned(persistent_bytes) / 4).map_err(|_| {
            Error::Compile("persistent state exceeds the addressable range".to_string())
        })?;
        let label = "initializer(fill_zero)".to_string();
        let source = shader_source("fill_zero")
            .ok_or_else(|| Error::Compile("no kernel source for fill_zero".to_string()))?;
        let module = compose_kernel(&label, source, options.workgroup_size)?;
        build_dispatchable(
            ctx,
            label,
            &module,
            SlotLayout {
                inputs: 0,
                outputs: 1,
                has_scratch: false,
                has_persistent: false,
            },
            dispatch_extent(words, options.workgroup_size),
            words.to_le_bytes().to_vec(),
        )?
    } else {
        let label = "initializer(noop)".to_string();
        let source = shader_source("noop")
            .ok_or_else(|| Error::Compile("no kernel source for noop".to_string()))?;
        let module = compose_kernel(&label, source, options.workgroup_size)?;
        build_dispatchable(
            ctx,
            label,
            &module,
            SlotLayout {
                inputs: 0,
                outputs: 0,
                has_scratch: false,
                has_persistent: false,
            },
            [1, 1, 1],
            Vec::new(),
        )?
    };

    Ok(Initializer {
        dispatchable,
        requirements,
        covered: operators.len(),
    })
}

/// Workgroup grid covering `element_count` threads.
fn dispatch_extent(element_count: u32, workgroup_size: u32) -> [u32; 3] {
    [element_count.div_ceil(workgroup_size), 1, 1]
}

/// Compose a WGSL kernel with `naga_oil`, resolving shader defs.
fn compose_kernel(label: &str, source: &str, workgroup_size: u32) -> Result<naga::Module> {
    let mut shader_defs = HashMap::new();
    shader_defs.insert(
        "WORKGROUP_SIZE".to_string(),
        ShaderDefValue::UInt(workgroup_size),
    );

    let mut composer = Composer::default().with_capabilities(naga::valid::Capabilities::all());
    composer
        .make_naga_module(NagaModuleDescriptor {
            source,
            file_path: &format!("{label}.wgsl"),
            shader_defs,
            ..Default::default()
        })
        .map_err(|e| Error::Compile(format!("kernel '{label}' failed to compose: {e}")))
}

/// Bake a composed module into a pipeline plus its bind-group layout.
fn build_dispatchable(
    ctx: &DeviceContext,
    label: String,
    module: &naga::Module,
    slots: SlotLayout,
    workgroups: [u32; 3],
    immediates: Vec<u8>,
) -> Result<Dispatchable> {
    let device = ctx.device();

    // wgpu accepts WGSL or SPIR-V, so the composed module is validated and
    // written back to WGSL.
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(module)
    .map_err(|e| Error::Compile(format!("kernel '{label}' failed validation: {e}")))?;

    let wgsl =
        naga::back::wgsl::write_string(module, &info, naga::back::wgsl::WriterFlags::empty())
            .map_err(|e| Error::Compile(format!("kernel '{label}' WGSL generation failed: {e}")))?;

    let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    });

    let mut entries = Vec::new();
    for slot in 0..slots.descriptor_count() {
        let read_only = slot < slots.inputs;
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{label} layout")),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} pipeline layout")),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: immediates.len() as u32,
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&label),
        layout: Some(&pipeline_layout),
        module: &shader_module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    Ok(Dispatchable {
        pipeline: Arc::new(pipeline),
        layout: Arc::new(bind_group_layout),
        slots,
        workgroups,
        immediates,
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyanite_core::TensorLayout;

    fn add_descriptor(sizes: &[u32]) -> OperatorDescriptor {
        let layout = TensorLayout::new(ElementKind::F32, sizes).unwrap();
        OperatorDescriptor::new(
            OperatorKind::ElementwiseAdd,
            vec![layout.clone(), layout.clone()],
            vec![layout],
        )
        .unwrap()
    }

    #[test]
    fn test_execute_requirements() {
        let requirements = execute_requirements(&add_descriptor(&[1, 2, 3, 4]));
        assert_eq!(requirements.descriptor_count, 3);
        assert_eq!(requirements.scratch_bytes, 0);
        assert_eq!(requirements.persistent_bytes, 0);

        let layout = TensorLayout::new(ElementKind::F32, &[8]).unwrap();
        let identity =
            OperatorDescriptor::new(OperatorKind::Identity, vec![layout.clone()], vec![layout])
                .unwrap();
        assert_eq!(execute_requirements(&identity).descriptor_count, 2);
    }

    #[test]
    fn test_initialize_requirements() {
        let no_persistent = [
            execute_requirements(&add_descriptor(&[4])),
            execute_requirements(&add_descriptor(&[8])),
        ];
        assert_eq!(initialize_requirements(&no_persistent).descriptor_count, 0);

        let with_persistent = [BindingRequirements {
            scratch_bytes: 0,
            persistent_bytes: 128,
            descriptor_count: 3,
        }];
        let requirements = initialize_requirements(&with_persistent);
        assert_eq!(requirements.descriptor_count, 1);
        assert_eq!(requirements.persistent_bytes, 0);
    }

    #[test]
    fn test_slot_layout_ordering() {
        let slots = SlotLayout {
            inputs: 2,
            outputs: 1,
            has_scratch: true,
            has_persistent: true,
        };
        assert_eq!(slots.descriptor_count(), 5);
        assert_eq!(slots.input_slot(1).unwrap(), 1);
        assert_eq!(slots.output_slot(0).unwrap(), 2);
        assert_eq!(slots.scratch_slot().unwrap(), 3);
        assert_eq!(slots.persistent_slot().unwrap(), 4);

        let lean = SlotLayout {
            inputs: 1,
            outputs: 1,
            has_scratch: false,
            has_persistent: false,
        };
        assert_eq!(lean.descriptor_count(), 2);
        assert!(lean.scratch_slot().is_err());
        assert!(lean.input_slot(1).is_err());
    }

    #[test]
    fn test_dispatch_extent() {
        assert_eq!(dispatch_extent(24, 256), [1, 1, 1]);
        assert_eq!(dispatch_extent(256, 256), [1, 1, 1]);
        assert_eq!(dispatch_extent(257, 256), [2, 1, 1]);
        assert_eq!(dispatch_extent(1024, 256), [4, 1, 1]);
    }

    #[test]
    fn test_kernels_compose_and_validate() {
        for name in [
            OperatorKind::ElementwiseAdd.name(),
            OperatorKind::ElementwiseMultiply.name(),
            OperatorKind::Identity.name(),
            "fill_zero",
            "noop",
        ] {
            let source = shader_source(name).unwrap();
            let module = compose_kernel(name, source, 256).expect("kernel composes");
            naga::valid::Validator::new(
                naga::valid::ValidationFlags::all(),
                naga::valid::Capabilities::all(),
            )
            .validate(&module)
            .expect("kernel validates");
        }
    }
}
