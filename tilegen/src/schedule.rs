// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The host side of a design: which host buffers feed which staging
//! channels, and what the host waits on before a chunk is complete.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tilegen_track::entity::Entity;
use tilegen_track::{debug, trace};

use crate::binder::KernelSignature;
use crate::fabric::{ChannelFabric, ChannelId, Direction};
use crate::gen_error;
use crate::plan::{ElementType, PartitionPlan};
use crate::topology::Topology;
use crate::types::GenResult;

/// Which transfers the host waits on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AwaitPolicy {
    /// Every transfer signals completion and is awaited.
    #[default]
    All,

    /// Only transfers back to the host are awaited.
    EgressOnly,
}

impl AwaitPolicy {
    #[must_use]
    pub fn awaits(&self, direction: Direction) -> bool {
        match self {
            AwaitPolicy::All => true,
            AwaitPolicy::EgressOnly => direction == Direction::Egress,
        }
    }
}

impl fmt::Display for AwaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AwaitPolicy::All => write!(f, "all"),
            AwaitPolicy::EgressOnly => write!(f, "egress-only"),
        }
    }
}

/// A buffer supplied by the host for one (region, kind, direction).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostBuffer {
    pub name: String,
    pub region: usize,
    pub kind: String,
    pub direction: Direction,
    pub element: ElementType,
    pub size: u64,
}

/// One host transfer into or out of a staging channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub channel: ChannelId,

    /// Index into [`TransferSchedule::buffers`].
    pub buffer: usize,

    /// Staging column issuing the transfer.
    pub col: usize,

    /// Buffer descriptor id, unique within the staging column.
    pub bd_id: u32,
    pub size: u64,
    pub offset: u64,

    /// The transfer signals completion and the barrier waits on it.
    pub await_completion: bool,
}

/// The set of descriptors the host waits on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Barrier {
    /// Indices into [`TransferSchedule::descriptors`].
    pub descriptors: Vec<usize>,
}

impl Barrier {
    /// Whether a chunk is complete given the descriptors that have signalled.
    ///
    /// Descriptors not in the barrier never hold it up.
    #[must_use]
    pub fn is_satisfied_by(&self, completed: &HashSet<usize>) -> bool {
        self.descriptors.iter().all(|d| completed.contains(d))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransferSchedule {
    pub buffers: Vec<HostBuffer>,
    pub descriptors: Vec<TransferDescriptor>,
    pub barrier: Barrier,
}

impl TransferSchedule {
    /// Descriptors transferring to or from `buffer`.
    pub fn descriptors_of(&self, buffer: usize) -> impl Iterator<Item = (usize, &TransferDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .filter(move |(_, d)| d.buffer == buffer)
    }
}

pub struct TransferScheduler {
    entity: Rc<Entity>,
}

impl TransferScheduler {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "schedule")),
        }
    }

    pub fn schedule(
        &self,
        topology: &Topology,
        fabric: &ChannelFabric,
        plan: &PartitionPlan,
        kernels: &[KernelSignature],
        await_policy: AwaitPolicy,
    ) -> GenResult<TransferSchedule> {
        let mut buffers = Vec::new();
        for direction in [Direction::Ingress, Direction::Egress] {
            for (region, kernel) in topology.regions().iter().zip(kernels) {
                let kinds = match direction {
                    Direction::Ingress => kernel.inputs.clone(),
                    Direction::Egress => vec![kernel.output.clone()],
                };
                for kind in kinds {
                    let kind_plan = plan.kind(&kind)?;
                    buffers.push(HostBuffer {
                        name: format!("{}_{}_{}", region.label, kind, direction),
                        region: region.index,
                        kind,
                        direction,
                        element: kind_plan.element,
                        size: kind_plan.chunk_size,
                    });
                }
            }
        }

        let mut next_bd: BTreeMap<usize, u32> = BTreeMap::new();
        let mut descriptors = Vec::new();
        for region in topology.regions() {
            for col in region.cols.clone() {
                for direction in [Direction::Ingress, Direction::Egress] {
                    for (buffer_index, buffer) in buffers.iter().enumerate() {
                        if buffer.region != region.index || buffer.direction != direction {
                            continue;
                        }
                        let Some(link) = fabric
                            .links_for(region.index, &buffer.kind, direction)
                            .find(|l| l.col == col)
                        else {
                            return gen_error!(
                                StructuralVerification,
                                "No staging channel for {} in column {col}",
                                buffer.name
                            );
                        };

                        let size = buffer.size / region.num_cols() as u64;
                        let bd_id = next_bd.entry(col).or_insert(0);
                        let descriptor = TransferDescriptor {
                            channel: link.staging,
                            buffer: buffer_index,
                            col,
                            bd_id: *bd_id,
                            size,
                            offset: size * region.col_in_region(col) as u64,
                            await_completion: await_policy.awaits(direction),
                        };
                        *bd_id += 1;

                        trace!(self.entity ; "{} -> {}: bd {} [{}, +{})", buffer.name, fabric.channel(link.staging).name, descriptor.bd_id, descriptor.offset, descriptor.size);
                        descriptors.push(descriptor);
                    }
                }
            }
        }

        let barrier = Barrier {
            descriptors: descriptors
                .iter()
                .enumerate()
                .filter(|(_, d)| d.await_completion)
                .map(|(i, _)| i)
                .collect(),
        };
        debug!(self.entity ; "{} host buffers, {} transfers, awaiting {}", buffers.len(), descriptors.len(), barrier.descriptors.len());

        Ok(TransferSchedule {
            buffers,
            descriptors,
            barrier,
        })
    }
}
