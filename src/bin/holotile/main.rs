//! Holotile - host-side harness for the tile pipeline
//!
//! Opens a device, fills a source tensor with random values, streams it
//! through the pipeline and checks every element of the result.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use hologram_tile_pipeline::config::Config;
use hologram_tile_pipeline::verify::{generate_source, source_rng, verify_round_trip, verify_scalar_add};
use hologram_tile_pipeline::{Device, RunParameters, RunState, TensorBufferConfig, TilePipeline, VerificationReport};
use std::process;

use cli::Cli;

enum Outcome {
    Passed,
    Failed,
    ConfigDumped,
}

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging
    cli.init_logging();

    match run(&cli) {
        Ok(Outcome::Passed) => println!("Test Passed"),
        Ok(Outcome::ConfigDumped) => {}
        Ok(Outcome::Failed) => {
            eprintln!("Test Failed");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Example failed with exception!");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(Outcome::ConfigDumped);
    }

    let workload = &config.run;
    let device = Device::open(&config.device).context("Failed to open device")?;
    let pipeline = TilePipeline::new(config.pipeline.clone())?;

    let buffer = TensorBufferConfig::for_tiles(workload.tile_count, config.pipeline.tile.size_bytes());
    let src = device.create_buffer(buffer).context("Failed to allocate source buffer")?;
    let dst = device
        .create_buffer(buffer)
        .context("Failed to allocate destination buffer")?;

    let source = generate_source(&mut source_rng(workload.seed), src.element_count());
    src.write_from_host(&source)?;

    let params = RunParameters::new(workload.tile_count, src.address(), dst.address(), workload.scalar);
    let mut summary = pipeline.run(&device, params).context("Pipeline run failed")?;

    let report = verify_scalar_add(&source, &dst.read_to_host(), workload.scalar, workload.tolerance)?;
    print_mismatches(&report);
    let mut passed = summary.conclude(&report) == RunState::Passed;
    if cli.verbose > 0 && !cli.quiet {
        println!("{}", summary);
        println!("{}", report);
    }

    if cli.round_trip {
        let restored = device
            .create_buffer(buffer)
            .context("Failed to allocate round-trip buffer")?;
        let inverse = RunParameters::new(workload.tile_count, dst.address(), restored.address(), -workload.scalar);
        pipeline
            .run(&device, inverse)
            .context("Inverse pipeline run failed")?;

        let report = verify_round_trip(
            &source,
            &restored.read_to_host(),
            workload.scalar,
            workload.tolerance.scaled(2.0),
        )?;
        print_mismatches(&report);
        if cli.verbose > 0 && !cli.quiet {
            println!("round trip: {}", report);
        }
        passed &= report.passed();
    }

    let live = device.close();
    tracing::debug!(live_buffers = live, "device closed");

    Ok(if passed { Outcome::Passed } else { Outcome::Failed })
}

fn print_mismatches(report: &VerificationReport) {
    for mismatch in &report.mismatches {
        eprintln!("{}", mismatch);
    }
}
