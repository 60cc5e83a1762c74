// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Command-line front-end of the pipeline generator.
//!
//! For example, generate the default two-kernel design using:
//!   cargo run --bin tilegen -- generate --kernel-object kernels.a
//! --out aie.mlir --stdout --stdout-level debug

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use tilegen::config::GeneratorConfig;
use tilegen::design::Design;
use tilegen::emit::{Emitter, OutputFormat};
use tilegen::fabric::Direction;
use tilegen::sim::host::{num_chunks, prepare_buffers};
use tilegen::sim::{Simulator, reference_pass};
use tilegen_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use tilegen_track::entity::{Entity, toplevel};
use tilegen_track::{Tracker, info};

/// Command-line arguments.
#[derive(Parser)]
#[command(about = "Generate a static streaming pipeline for a tiled NPU array")]
struct Cli {
    /// Enable logging to the console.
    #[arg(long, global = true, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, global = true, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entities should have logging level
    /// set to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long, global = true, default_value = "")]
    stdout_filter_regex: String,

    /// Also write log messages to this file, at `--stdout-level`.
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every command that builds a design.
#[derive(Args)]
struct DesignArgs {
    /// Configuration file (TOML). Defaults to `tilegen.toml` if it exists.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    generator: GeneratorConfig,
}

#[derive(Subcommand)]
enum Command {
    /// Build, verify and write the structural description.
    Generate {
        #[command(flatten)]
        design: DesignArgs,

        /// File the description is written to.
        #[arg(long)]
        out: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Mlir)]
        format: OutputFormat,
    },

    /// Print the partition plan.
    Plan {
        #[command(flatten)]
        design: DesignArgs,
    },

    /// Run the design on a document and check it against a single-tile pass.
    Simulate {
        #[command(flatten)]
        design: DesignArgs,

        /// Document streamed through the design, one chunk at a time.
        #[arg(long)]
        input: PathBuf,

        /// Show a progress bar of the chunks simulated.
        #[arg(long)]
        progress: bool,
    },
}

fn setup_all_trackers(args: &Cli) -> Result<Tracker> {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: args.stdout,
            level: args.stdout_level,
            filter_regex: &args.stdout_filter_regex,
            file: None,
        },
        log_file: TrackerConfig {
            enable: args.log_file.is_some(),
            level: args.stdout_level,
            filter_regex: &args.stdout_filter_regex,
            file: args.log_file.as_deref(),
        },
    };
    Ok(setup_trackers(&config)?)
}

fn build_design(top: &Rc<Entity>, args: &DesignArgs) -> Result<Design> {
    let config = GeneratorConfig::load(args.config.as_deref(), args.generator.clone())?;
    let params = config.design_params()?;
    Ok(Design::build(top, &params, &config.catalog())?)
}

fn generate(top: &Rc<Entity>, args: &DesignArgs, out: &Path, format: OutputFormat) -> Result<()> {
    let design = build_design(top, args)?;
    if design.kernel_object.is_none() {
        bail!("No kernel object given (use --kernel-object or set kernel_object in the configuration)");
    }
    Emitter::new(top).write(&design, format, out)?;
    println!("Wrote {format} description to {}", out.display());
    Ok(())
}

fn print_plan(top: &Rc<Entity>, args: &DesignArgs) -> Result<()> {
    let design = build_design(top, args)?;
    let plan = &design.plan;

    println!(
        "Chunk of {} bytes in {} blocks of {} bytes over a {} grid ({} per tile)",
        plan.total_size, plan.num_blocks, plan.block_size, plan.grid, plan.blocks_per_tile
    );
    for kind in &plan.kinds {
        println!(
            "  {:<8} {:<4} chunk {:>10} bytes, block {:>6} bytes",
            kind.kind, kind.element, kind.chunk_size, kind.block_size
        );
    }
    for region in design.topology.regions() {
        let kernel = design
            .kernel(region.index)
            .with_context(|| format!("Region {} has no kernel", region.index))?;
        println!(
            "Region {} '{}' runs {} on {} tiles, {} iterations per chunk",
            region.index,
            region.label,
            kernel.name,
            region.num_tiles(),
            plan.num_blocks / region.num_tiles() as u64
        );
    }
    let offsets = plan
        .tile_offsets()
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    println!("Tile offsets: [{offsets}]");
    Ok(())
}

fn simulate(top: &Rc<Entity>, args: &DesignArgs, input: &Path, progress: bool) -> Result<()> {
    let design = build_design(top, args)?;
    let document = fs::read(input)?;
    let chunk_size = design.plan.total_size as usize;
    let num_chunks = num_chunks(&document, chunk_size);
    let simulator = Simulator::new(top, &design);

    let progress_bar = progress.then(|| ProgressBar::new(num_chunks as u64));
    for chunk in 0..num_chunks {
        let mut buffers = prepare_buffers(&design, &document, chunk)?;
        let mut expected = buffers.clone();

        simulator.run_chunk(&mut buffers)?;
        reference_pass(&design, &mut expected)?;

        for (index, buffer) in design.schedule.buffers.iter().enumerate() {
            if buffer.direction == Direction::Egress && buffers[index] != expected[index] {
                bail!(
                    "Chunk {chunk}: {} differs from the single-tile reference",
                    buffer.name
                );
            }
        }
        if let Some(progress_bar) = &progress_bar {
            progress_bar.inc(1);
        }
    }
    if let Some(progress_bar) = progress_bar {
        progress_bar.finish();
    }

    info!(top ; "simulated {num_chunks} chunks of {chunk_size} bytes");
    println!(
        "Simulated {num_chunks} chunks of {} ({} bytes): all outputs match",
        input.display(),
        document.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let tracker = setup_all_trackers(&args)?;
    let top = toplevel(&tracker, "tilegen");

    let result = match &args.command {
        Command::Generate {
            design,
            out,
            format,
        } => generate(&top, design, out, *format),
        Command::Plan { design } => print_plan(&top, design),
        Command::Simulate {
            design,
            input,
            progress,
        } => simulate(&top, design, input, *progress),
    };

    tracker.shutdown();
    result
}
