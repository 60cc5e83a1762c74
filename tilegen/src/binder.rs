// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Binding kernels to compute tiles.
//!
//! Every compute tile runs one persistent [`TileTask`]: forever, process one
//! chunk's worth of blocks, each by acquiring an input block per ingress
//! channel and an output slot, invoking the kernel and releasing them all.

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tilegen_track::entity::Entity;
use tilegen_track::{debug, trace};

use crate::fabric::{ChannelFabric, ChannelId, Direction};
use crate::gen_error;
use crate::plan::PartitionPlan;
use crate::topology::{RegionAssignmentPolicy, TileId, Topology};
use crate::types::GenResult;

/// What the generator needs to know about an external kernel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSignature {
    /// Symbol name in the kernel object.
    pub name: String,

    /// Short label used to name channels.
    pub label: String,

    /// Kinds consumed, one block of each per invocation.
    pub inputs: Vec<String>,

    /// Kind produced, one block per invocation.
    pub output: String,

    /// Whether the base block size is passed as a trailing `i32`.
    #[serde(default)]
    pub block_size_arg: bool,
}

impl KernelSignature {
    #[must_use]
    pub fn new(name: &str, label: &str, inputs: &[&str], output: &str, block_size_arg: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            inputs: inputs.iter().map(ToString::to_string).collect(),
            output: output.to_string(),
            block_size_arg,
        }
    }
}

/// The kernels that can be bound.
#[derive(Clone, Debug)]
pub struct KernelCatalog {
    kernels: Vec<KernelSignature>,
}

impl Default for KernelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KernelCatalog {
    /// The kernels shipped in the indexing kernel object.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            kernels: vec![
                KernelSignature::new(
                    "structural_character_index",
                    "structural",
                    &["data"],
                    "index",
                    true,
                ),
                KernelSignature::new("string_index", "string", &["string"], "index", true),
                KernelSignature::new("vector_scalar_add", "add", &["words"], "words", false),
                KernelSignature::new("vector_scalar_mul", "mul", &["words"], "words", false),
            ],
        }
    }

    /// Add (or replace) kernel declarations.
    #[must_use]
    pub fn with_kernels(mut self, kernels: &[KernelSignature]) -> Self {
        for kernel in kernels {
            self.kernels.retain(|k| k.name != kernel.name);
            self.kernels.push(kernel.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> GenResult<&KernelSignature> {
        match self.kernels.iter().find(|k| k.name == name) {
            Some(kernel) => Ok(kernel),
            None => gen_error!(
                UnsupportedKernel,
                "'{name}' (known kernels: {})",
                self.names().join(", ")
            ),
        }
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.kernels.iter().map(|k| k.name.as_str()).collect()
    }

    /// Look up the kernel of every region of `policy`.
    pub fn resolve(
        &self,
        names: &[String],
        policy: RegionAssignmentPolicy,
    ) -> GenResult<Vec<KernelSignature>> {
        if names.len() != policy.num_regions() {
            return gen_error!(
                UnsupportedKernel,
                "Policy {policy} requires {} kernels, {} given",
                policy.num_regions(),
                names.len()
            );
        }
        names
            .iter()
            .map(|name| {
                let kernel = self.get(name)?;
                if kernel.inputs.is_empty() {
                    return gen_error!(UnsupportedKernel, "'{name}' declares no inputs");
                }
                let unique: HashSet<&String> = kernel.inputs.iter().collect();
                if unique.len() != kernel.inputs.len() {
                    return gen_error!(UnsupportedKernel, "'{name}' consumes the same kind twice");
                }
                Ok(kernel.clone())
            })
            .collect()
    }
}

/// The persistent task of a compute tile.
///
/// There is a single state with one self-transition: each step processes one
/// block. The iteration counter wraps at the end of every chunk and the task
/// never finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileTask {
    Processing { iteration: u64, iterations: u64 },
}

impl TileTask {
    #[must_use]
    pub fn new(iterations: u64) -> Self {
        TileTask::Processing {
            iteration: 0,
            iterations,
        }
    }

    /// Take the transition for one processed block.
    ///
    /// Returns `true` when that block completed a chunk.
    pub fn step(&mut self) -> bool {
        let TileTask::Processing {
            iteration,
            iterations,
        } = self;
        *iteration += 1;
        if *iteration == *iterations {
            *iteration = 0;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn iterations(&self) -> u64 {
        let TileTask::Processing { iterations, .. } = self;
        *iterations
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelBinding {
    pub tile: TileId,
    pub region: usize,
    pub kernel: String,

    /// One channel per kernel input, in signature order.
    pub ingress: Vec<ChannelId>,
    pub egress: ChannelId,

    /// Blocks processed per chunk.
    pub iterations: u64,

    /// Value of the trailing block-size argument, if the kernel takes one.
    pub block_size_arg: Option<u64>,
}

impl KernelBinding {
    #[must_use]
    pub fn task(&self) -> TileTask {
        TileTask::new(self.iterations)
    }
}

/// Binds each compute tile to the kernel of its region.
pub struct KernelBinder {
    entity: Rc<Entity>,
}

impl KernelBinder {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "binder")),
        }
    }

    pub fn bind(
        &self,
        topology: &Topology,
        fabric: &ChannelFabric,
        plan: &PartitionPlan,
        kernels: &[KernelSignature],
    ) -> GenResult<Vec<KernelBinding>> {
        let mut bindings = Vec::new();
        for (region, kernel) in topology.regions().iter().zip(kernels) {
            let iterations = plan.num_blocks / region.num_tiles() as u64;
            debug!(self.entity ; "region {}: {} x {} iterations on {} tiles", region.index, kernel.name, iterations, region.num_tiles());

            for tile in region.compute_tiles() {
                let ingress = kernel
                    .inputs
                    .iter()
                    .map(|kind| lookup(fabric, tile, kind, Direction::Ingress))
                    .collect::<GenResult<Vec<_>>>()?;
                let egress = lookup(fabric, tile, &kernel.output, Direction::Egress)?;

                trace!(self.entity ; "{tile} <- {}", kernel.name);
                bindings.push(KernelBinding {
                    tile,
                    region: region.index,
                    kernel: kernel.name.clone(),
                    ingress,
                    egress,
                    iterations,
                    block_size_arg: kernel.block_size_arg.then_some(plan.block_size),
                });
            }
        }
        Ok(bindings)
    }
}

fn lookup(fabric: &ChannelFabric, tile: TileId, kind: &str, direction: Direction) -> GenResult<ChannelId> {
    match fabric.compute_channel(tile, kind, direction) {
        Some(id) => Ok(id),
        None => gen_error!(
            StructuralVerification,
            "No {direction} channel of kind '{kind}' for {tile}"
        ),
    }
}
