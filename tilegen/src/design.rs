// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A complete generated design and the flow that builds it.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tilegen_track::entity::Entity;
use tilegen_track::info;

use crate::binder::{KernelBinder, KernelBinding, KernelCatalog, KernelSignature};
use crate::device::DeviceVariant;
use crate::fabric::ChannelFabric;
use crate::gen_error;
use crate::plan::{GridShape, KindRule, PartitionPlan, PartitionPlanner, builtin_kinds};
use crate::schedule::{AwaitPolicy, TransferSchedule, TransferScheduler};
use crate::topology::{RegionAssignmentPolicy, Topology, TopologyBuilder};
use crate::types::GenResult;

/// Fully resolved build-time parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DesignParams {
    pub kernel_object: Option<String>,
    pub device: DeviceVariant,
    pub grid: GridShape,
    pub block_size: u64,
    pub chunk_size: u64,

    /// Kernel of each region, in region order.
    pub kernels: Vec<String>,
    pub policy: RegionAssignmentPolicy,
    pub await_policy: AwaitPolicy,

    /// Every declared data kind. Only those used by the kernels are planned.
    pub kinds: Vec<KindRule>,
}

impl Default for DesignParams {
    fn default() -> Self {
        Self {
            kernel_object: None,
            device: DeviceVariant::Npu1Col4,
            grid: GridShape::new(4, 4),
            block_size: 1024,
            chunk_size: 4000 * 1024,
            kernels: vec![
                "string_index".to_string(),
                "structural_character_index".to_string(),
            ],
            policy: RegionAssignmentPolicy::ColumnHalves,
            await_policy: AwaitPolicy::All,
            kinds: builtin_kinds(),
        }
    }
}

/// The structural description of one pipeline.
///
/// Built once and never modified.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Design {
    pub kernel_object: Option<String>,
    pub plan: PartitionPlan,
    pub topology: Topology,
    pub kernels: Vec<KernelSignature>,
    pub fabric: ChannelFabric,
    pub bindings: Vec<KernelBinding>,
    pub schedule: TransferSchedule,
}

impl Design {
    /// Run every stage in turn.
    pub fn build(parent: &Rc<Entity>, params: &DesignParams, catalog: &KernelCatalog) -> GenResult<Self> {
        let kernels = catalog.resolve(&params.kernels, params.policy)?;
        let rules = used_kinds(&kernels, &params.kinds)?;

        let plan = PartitionPlanner::new(parent).plan(
            params.chunk_size,
            params.block_size,
            params.grid,
            &rules,
        )?;

        let labels: Vec<&str> = kernels.iter().map(|k| k.label.as_str()).collect();
        let topology =
            TopologyBuilder::new(parent).build(params.device, params.grid, params.policy, &labels)?;

        let fabric = ChannelFabric::build(parent, &topology, &plan, &kernels)?;
        let bindings = KernelBinder::new(parent).bind(&topology, &fabric, &plan, &kernels)?;
        let schedule = TransferScheduler::new(parent).schedule(
            &topology,
            &fabric,
            &plan,
            &kernels,
            params.await_policy,
        )?;

        info!(parent ; "built {} design: {} regions, {} compute tiles, {} channels",
            topology.device, topology.regions().len(), bindings.len(), fabric.channels().len());

        Ok(Self {
            kernel_object: params.kernel_object.clone(),
            plan,
            topology,
            kernels,
            fabric,
            bindings,
            schedule,
        })
    }

    /// The kernel bound to `region`, if there is such a region.
    #[must_use]
    pub fn kernel(&self, region: usize) -> Option<&KernelSignature> {
        self.kernels.get(region)
    }
}

/// The rules of the kinds referenced by `kernels`, in order of first use.
fn used_kinds(kernels: &[KernelSignature], declared: &[KindRule]) -> GenResult<Vec<KindRule>> {
    let mut rules: Vec<KindRule> = Vec::new();
    for kernel in kernels {
        for kind in kernel.inputs.iter().chain(std::iter::once(&kernel.output)) {
            if rules.iter().any(|r| &r.name == kind) {
                continue;
            }
            match declared.iter().find(|r| &r.name == kind) {
                Some(rule) => rules.push(rule.clone()),
                None => {
                    return gen_error!(
                        UnsupportedKernel,
                        "'{}' uses undeclared data kind '{kind}'",
                        kernel.name
                    );
                }
            }
        }
    }
    Ok(rules)
}
