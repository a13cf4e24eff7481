//! Hazard-rule tests against the standalone recorder, without the driver's
//! automatic barriers.

mod common;

use common::{binary_descriptor, region, storage_empty, storage_with};
use kyanite_core::{Error, OperatorKind, pack_ranges};
use kyanite_runtime::{
    BindingTable, CommandRecorder, CompileOptions, DescriptorHeap, DeviceContext, compile,
};

const ELEMENTS: usize = 24;
const SIZES: [u32; 4] = [1, 2, 3, 4];

/// Chained dispatches without a barrier on the shared buffer are a
/// detectable data race under the validating recorder; recording the
/// barrier resolves it.
#[pollster::test]
#[ignore] // Requires GPU
async fn test_missing_barrier_detected() {
    let mut ctx = DeviceContext::create().await.expect("device");
    let descriptors = [
        binary_descriptor(OperatorKind::ElementwiseAdd, &SIZES),
        binary_descriptor(OperatorKind::ElementwiseMultiply, &SIZES),
    ];
    let set = compile(&ctx, &descriptors, &CompileOptions::default()).expect("compile");

    let counts: Vec<u32> = set
        .operators
        .iter()
        .map(|op| op.requirements().descriptor_count)
        .collect();
    let space = pack_ranges(set.initializer.requirements().descriptor_count, &counts);
    let mut heap = DescriptorHeap::for_space(&space);

    let input = storage_with(&ctx, "input", &[1.5f32; ELEMENTS]);
    let shared = storage_empty(&ctx, "shared", ELEMENTS);
    let output = storage_empty(&ctx, "output", ELEMENTS);

    let recorder = CommandRecorder::new();

    // Add writes the shared buffer.
    let add_range = space.operators[0];
    let mut table = BindingTable::new(
        set.operators[0].dispatchable(),
        &heap,
        add_range.offset,
        add_range.count,
    )
    .expect("table");
    table
        .bind_inputs(&[region(&input), region(&input)])
        .expect("bind inputs");
    table.bind_outputs(&[region(&shared)]).expect("bind outputs");
    recorder
        .record_dispatch(&table, &mut heap, &mut ctx)
        .expect("record add");

    // Multiply reads it back without a barrier: rejected.
    let mul_range = space.operators[1];
    table
        .reset(
            set.operators[1].dispatchable(),
            mul_range.offset,
            mul_range.count,
        )
        .expect("reset");
    table
        .bind_inputs(&[region(&shared), region(&shared)])
        .expect("bind inputs");
    table.bind_outputs(&[region(&output)]).expect("bind outputs");
    let result = recorder.record_dispatch(&table, &mut heap, &mut ctx);
    assert!(matches!(result, Err(Error::Precondition(_))));

    // With the barrier recorded, the same dispatch is accepted and the
    // chain produces the expected values.
    ctx.resource_barrier(&region(&shared));
    recorder
        .record_dispatch(&table, &mut heap, &mut ctx)
        .expect("record multiply");
    ctx.submit_and_wait().expect("submit");

    let raw = ctx.read_back(&output, (ELEMENTS * 4) as u64).expect("readback");
    let values: Vec<f32> = bytemuck::pod_collect_to_vec(&raw);
    for value in values {
        assert!((value - 9.0).abs() < 1e-6, "expected 9.0, got {value}");
    }
}

/// The non-validating recorder accepts the same ordering unchecked.
#[pollster::test]
#[ignore] // Requires GPU
async fn test_unvalidated_recorder_accepts_hazard() {
    let mut ctx = DeviceContext::create().await.expect("device");
    let descriptors = [
        binary_descriptor(OperatorKind::ElementwiseAdd, &SIZES),
        binary_descriptor(OperatorKind::ElementwiseMultiply, &SIZES),
    ];
    let set = compile(&ctx, &descriptors, &CompileOptions::default()).expect("compile");

    let counts: Vec<u32> = set
        .operators
        .iter()
        .map(|op| op.requirements().descriptor_count)
        .collect();
    let space = pack_ranges(set.initializer.requirements().descriptor_count, &counts);
    let mut heap = DescriptorHeap::for_space(&space);

    let input = storage_with(&ctx, "input", &[1.5f32; ELEMENTS]);
    let shared = storage_empty(&ctx, "shared", ELEMENTS);
    let output = storage_empty(&ctx, "output", ELEMENTS);

    let recorder = CommandRecorder::with_hazard_validation(false);

    let add_range = space.operators[0];
    let mut table = BindingTable::new(
        set.operators[0].dispatchable(),
        &heap,
        add_range.offset,
        add_range.count,
    )
    .expect("table");
    table
        .bind_inputs(&[region(&input), region(&input)])
        .expect("bind inputs");
    table.bind_outputs(&[region(&shared)]).expect("bind outputs");
    recorder
        .record_dispatch(&table, &mut heap, &mut ctx)
        .expect("record add");

    let mul_range = space.operators[1];
    table
        .reset(
            set.operators[1].dispatchable(),
            mul_range.offset,
            mul_range.count,
        )
        .expect("reset");
    table
        .bind_inputs(&[region(&shared), region(&shared)])
        .expect("bind inputs");
    table.bind_outputs(&[region(&output)]).expect("bind outputs");
    recorder
        .record_dispatch(&table, &mut heap, &mut ctx)
        .expect("record multiply without barrier");
    ctx.submit_and_wait().expect("submit");
}

/// Submit-and-wait drains the batch, clearing every pending hazard.
#[pollster::test]
#[ignore] // Requires GPU
async fn test_submit_clears_hazards() {
    let mut ctx = DeviceContext::create().await.expect("device");
    let descriptors = [
        binary_descriptor(OperatorKind::ElementwiseAdd, &SIZES),
        binary_descriptor(OperatorKind::ElementwiseMultiply, &SIZES),
    ];
    let set = compile(&ctx, &descriptors, &CompileOptions::default()).expect("compile");

    let counts: Vec<u32> = set
        .operators
        .iter()
        .map(|op| op.requirements().descriptor_count)
        .collect();
    let space = pack_ranges(set.initializer.requirements().descriptor_count, &counts);
    let mut heap = DescriptorHeap::for_space(&space);

    let input = storage_with(&ctx, "input", &[1.5f32; ELEMENTS]);
    let shared = storage_empty(&ctx, "shared", ELEMENTS);
    let output = storage_empty(&ctx, "output", ELEMENTS);

    let recorder = CommandRecorder::new();

    let add_range = space.operators[0];
    let mut table = BindingTable::new(
        set.operators[0].dispatchable(),
        &heap,
        add_range.offset,
        add_range.count,
    )
    .expect("table");
    table
        .bind_inputs(&[region(&input), region(&input)])
        .expect("bind inputs");
    table.bind_outputs(&[region(&shared)]).expect("bind outputs");
    recorder
        .record_dispatch(&table, &mut heap, &mut ctx)
        .expect("record add");

    // Draining the queue ends the batch; the next read needs no barrier.
    ctx.submit_and_wait().expect("submit");

    let mul_range = space.operators[1];
    table
        .reset(
            set.operators[1].dispatchable(),
            mul_range.offset,
            mul_range.count,
        )
        .expect("reset");
    table
        .bind_inputs(&[region(&shared), region(&shared)])
        .expect("bind inputs");
    table.bind_outputs(&[region(&output)]).expect("bind outputs");
    recorder
        .record_dispatch(&table, &mut heap, &mut ctx)
        .expect("record multiply after drain");
    ctx.submit_and_wait().expect("submit");
}
