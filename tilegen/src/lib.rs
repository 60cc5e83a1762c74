// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Generator for static streaming dataflow pipelines on tiled NPU arrays.
//!
//! A pipeline splits a fixed-size chunk of input into equal blocks, spreads
//! the blocks over a grid of compute tiles and runs an externally compiled
//! kernel on each tile. The generator plans the partitioning, lays out the
//! tiles, wires the channels, binds the kernels, schedules the host
//! transfers and finally writes a verified structural description:
//!
//! ```rust
//! use tilegen::binder::KernelCatalog;
//! use tilegen::design::{Design, DesignParams};
//! use tilegen::emit::{Emitter, OutputFormat};
//! use tilegen_track::dev_null_tracker;
//! use tilegen_track::entity::toplevel;
//!
//! let tracker = dev_null_tracker();
//! let top = toplevel(&tracker, "tilegen");
//!
//! let params = DesignParams::default();
//! let design = Design::build(&top, &params, &KernelCatalog::builtin()).unwrap();
//! let mlir = Emitter::new(&top).render(&design, OutputFormat::Mlir).unwrap();
//! assert!(mlir.contains("aie.device(npu1_4col)"));
//! ```
//!
//! The [`sim`] module executes a generated design in-process with reference
//! kernels.

pub mod binder;
pub mod config;
pub mod design;
pub mod device;
pub mod emit;
pub mod fabric;
pub mod plan;
pub mod schedule;
pub mod sim;
pub mod topology;
pub mod types;
pub mod verify;
