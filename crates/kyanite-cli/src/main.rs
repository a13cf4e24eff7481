//! Kyanite CLI - run built-in operator scenarios and inspect the GPU.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kyanite_core::{ElementKind, OperatorDescriptor, OperatorKind, TensorLayout};
use kyanite_runtime::{
    BufferKind, BufferRegion, CompileOptions, DeviceContext, ExecutionDriver, OperatorBindings,
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kyanite")]
#[command(about = "GPU tensor-operator dispatch runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a built-in operator scenario end to end
    Demo {
        /// Operator chain to run
        #[arg(value_enum, default_value_t = Scenario::Add)]
        scenario: Scenario,

        /// Value every input element is filled with
        #[arg(short, long)]
        fill: Option<f32>,

        /// Execute passes over the same compiled set, with fresh input each
        /// pass
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,
    },
    /// Print the selected adapter
    Info,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// One elementwise add of the input with itself
    Add,
    /// Add feeding multiply through an intermediate buffer
    Chain,
    /// Bit-preserving copy
    Identity,
}

#[pollster::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo {
            scenario,
            fill,
            repeat,
        } => cmd_demo(scenario, fill, repeat).await,
        Commands::Info => cmd_info().await,
    }
}

/// Print the adapter the runtime would select.
async fn cmd_info() -> Result<()> {
    let ctx = DeviceContext::create()
        .await
        .context("GPU initialization failed")?;
    let info = ctx.adapter_info();
    println!("{} ({:?}, {:?})", info.name, info.backend, info.device_type);
    Ok(())
}

/// Compile the scenario's operator chain, initialize once, then execute
/// `repeat` times with fresh input data, printing input and output tensors.
async fn cmd_demo(scenario: Scenario, fill: Option<f32>, repeat: u32) -> Result<()> {
    let ctx = DeviceContext::create()
        .await
        .context("GPU initialization failed")?;

    let layout = TensorLayout::new(ElementKind::F32, &[1, 2, 3, 4])?;
    let element_count = layout.element_count() as usize;
    let byte_width = layout.total_byte_size();

    let fill = fill.unwrap_or(match scenario {
        Scenario::Identity => 1.618,
        _ => 1.5,
    });

    let binary = |kind| {
        OperatorDescriptor::new(
            kind,
            vec![layout.clone(), layout.clone()],
            vec![layout.clone()],
        )
    };
    let descriptors = match scenario {
        Scenario::Add => vec![binary(OperatorKind::ElementwiseAdd)?],
        Scenario::Chain => vec![
            binary(OperatorKind::ElementwiseAdd)?,
            binary(OperatorKind::ElementwiseMultiply)?,
        ],
        Scenario::Identity => vec![OperatorDescriptor::new(
            OperatorKind::Identity,
            vec![layout.clone()],
            vec![layout.clone()],
        )?],
    };

    let mut driver = ExecutionDriver::compile(ctx, &descriptors, &CompileOptions::default())
        .context("operator compilation failed")?;
    driver.create_buffers().context("buffer creation failed")?;
    driver.initialize().context("initialization failed")?;

    let input = Arc::new(
        driver
            .context()
            .create_buffer(BufferKind::Storage, byte_width, "demo input")?,
    );
    let output = Arc::new(
        driver
            .context()
            .create_buffer(BufferKind::Storage, byte_width, "demo output")?,
    );
    let intermediate = match scenario {
        Scenario::Chain => Some(Arc::new(driver.context().create_buffer(
            BufferKind::Storage,
            byte_width,
            "demo intermediate",
        )?)),
        _ => None,
    };

    for pass in 0..repeat {
        let values = vec![fill + pass as f32; element_count];
        driver
            .context()
            .write_buffer(&input, 0, bytemuck::cast_slice(&values));
        print_tensor("input tensor", &values);

        let bindings = match (&scenario, &intermediate) {
            (Scenario::Chain, Some(mid)) => vec![
                OperatorBindings {
                    inputs: vec![region(&input), region(&input)],
                    outputs: vec![region(mid)],
                },
                OperatorBindings {
                    inputs: vec![region(mid), region(mid)],
                    outputs: vec![region(&output)],
                },
            ],
            (Scenario::Add, _) => vec![OperatorBindings {
                inputs: vec![region(&input), region(&input)],
                outputs: vec![region(&output)],
            }],
            _ => vec![OperatorBindings {
                inputs: vec![region(&input)],
                outputs: vec![region(&output)],
            }],
        };

        driver.execute(&bindings).context("execution failed")?;

        let raw = driver
            .context_mut()
            .read_back(&output, byte_width)
            .context("readback failed")?;
        let result: Vec<f32> = bytemuck::pod_collect_to_vec(&raw);
        print_tensor("output tensor", &result);
    }

    Ok(())
}

fn region(buffer: &Arc<wgpu::Buffer>) -> BufferRegion {
    BufferRegion::whole(Arc::clone(buffer))
}

fn print_tensor(label: &str, values: &[f32]) {
    print!("{label}: ");
    for value in values {
        print!("{value:.3} ");
    }
    println!();
}
