// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use itertools::Itertools;
use tilegen::binder::KernelCatalog;
use tilegen::design::{Design, DesignParams};
use tilegen::emit::{Emitter, OutputFormat};
use tilegen::fabric::{ChannelFabric, ChannelId, Direction, MIN_DEPTH};
use tilegen::plan::GridShape;
use tilegen::schedule::AwaitPolicy;
use tilegen::topology::{RegionAssignmentPolicy, TileRole};
use tilegen::types::GenResult;
use tilegen::verify::verify;
use tilegen_track::dev_null_tracker;
use tilegen_track::entity::toplevel;

fn build(params: &DesignParams) -> GenResult<Design> {
    let top = toplevel(&dev_null_tracker(), "test");
    Design::build(&top, params, &KernelCatalog::builtin())
}

fn default_design() -> Design {
    let params = DesignParams {
        kernel_object: Some("kernels.a".to_string()),
        ..Default::default()
    };
    build(&params).unwrap()
}

fn render(design: &Design, format: OutputFormat) -> GenResult<String> {
    let top = toplevel(&dev_null_tracker(), "test");
    Emitter::new(&top).render(design, format)
}

#[test]
fn default_design_verifies() {
    let design = default_design();
    verify(&design).unwrap();

    assert_eq!(design.topology.regions().len(), 2);
    assert_eq!(design.bindings.len(), 16);
    assert_eq!(design.fabric.channels().len(), 40);
    assert_eq!(design.fabric.links().len(), 8);

    for binding in &design.bindings {
        assert_eq!(binding.iterations, 500);
        assert_eq!(binding.block_size_arg, Some(1024));
    }
}

#[test]
fn lookups_by_index() {
    let design = default_design();
    assert_eq!(design.kernel(0).unwrap().name, "string_index");
    assert_eq!(design.kernel(1).unwrap().name, "structural_character_index");
    assert!(design.kernel(2).is_none());

    let last = ChannelId(design.fabric.channels().len() - 1);
    assert_eq!(design.fabric.get(last), Some(design.fabric.channel(last)));
    assert!(design.fabric.get(ChannelId(40)).is_none());
}

#[test]
#[should_panic(expected = "index out of bounds")]
fn unknown_channel_panics() {
    let design = default_design();
    let _ = design.fabric.channel(ChannelId(40));
}

#[test]
fn compute_channels_are_double_buffered() {
    let design = default_design();
    for channel in design.fabric.channels() {
        assert!(channel.depth >= MIN_DEPTH, "{} has depth {}", channel.name, channel.depth);
    }
}

#[test]
fn links_follow_enumeration_order() {
    let design = default_design();
    let fabric = &design.fabric;
    for link in fabric.links() {
        let staging = fabric.channel(link.staging);
        assert_eq!(staging.producer.col, link.col);
        assert!(link.offsets.iter().tuple_windows().all(|(a, b)| a < b));

        let rows: Vec<usize> = link
            .compute
            .iter()
            .map(|id| {
                let channel = fabric.channel(*id);
                match link.direction {
                    Direction::Ingress => channel.consumer.row,
                    Direction::Egress => channel.producer.row,
                }
            })
            .collect();
        assert_eq!(rows, vec![2, 3, 4, 5]);
    }

    let string_in = fabric
        .links_for(0, "string", Direction::Ingress)
        .find(|l| l.col == 1)
        .unwrap();
    assert_eq!(string_in.offsets, vec![0, 260, 520, 780]);
}

#[test]
fn host_buffers_and_descriptors() {
    let design = default_design();
    let schedule = &design.schedule;

    let names: Vec<&str> = schedule.buffers.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "string_string_in",
            "structural_data_in",
            "string_index_out",
            "structural_index_out"
        ]
    );
    assert_eq!(schedule.buffers[0].size, 1_040_000);
    assert_eq!(schedule.buffers[1].size, 4_096_000);
    assert_eq!(schedule.buffers[3].size, 512_000);

    assert_eq!(schedule.descriptors.len(), 8);
    let string_in: Vec<(usize, u64, u64)> = schedule
        .descriptors_of(0)
        .map(|(_, d)| (d.col, d.offset, d.size))
        .collect();
    assert_eq!(string_in, vec![(0, 0, 520_000), (1, 520_000, 520_000)]);

    for col in 0..4 {
        let bd_ids: Vec<u32> = schedule
            .descriptors
            .iter()
            .filter(|d| d.col == col)
            .map(|d| d.bd_id)
            .collect();
        assert_eq!(bd_ids, vec![0, 1]);
    }
    assert_eq!(schedule.barrier.descriptors.len(), 8);
}

#[test]
fn egress_only_barrier() {
    let params = DesignParams {
        await_policy: AwaitPolicy::EgressOnly,
        ..Default::default()
    };
    let design = build(&params).unwrap();
    verify(&design).unwrap();

    let schedule = &design.schedule;
    assert_eq!(schedule.barrier.descriptors.len(), 4);
    for (index, descriptor) in schedule.descriptors.iter().enumerate() {
        let direction = schedule.buffers[descriptor.buffer].direction;
        assert_eq!(descriptor.await_completion, direction == Direction::Egress);
        assert_eq!(
            schedule.barrier.descriptors.contains(&index),
            direction == Direction::Egress
        );
    }
}

#[test]
#[should_panic(expected = "Policy column-halves requires 2 kernels, 1 given")]
fn kernel_count_mismatch() {
    let params = DesignParams {
        kernels: vec!["string_index".to_string()],
        ..Default::default()
    };
    build(&params).unwrap();
}

#[test]
#[should_panic(expected = "Unsupported kernel: 'json_parse'")]
fn unknown_kernel() {
    let params = DesignParams {
        kernels: vec!["json_parse".to_string()],
        policy: RegionAssignmentPolicy::Single,
        ..Default::default()
    };
    build(&params).unwrap();
}

#[test]
#[should_panic(expected = "Invalid grid: Grid 5x4 does not fit npu1_4col")]
fn grid_too_wide() {
    let params = DesignParams {
        grid: GridShape::new(5, 4),
        chunk_size: 1024 * 20,
        kernels: vec!["structural_character_index".to_string()],
        policy: RegionAssignmentPolicy::Single,
        ..Default::default()
    };
    build(&params).unwrap();
}

fn with_compute_depth(design: &Design, depth: usize) -> Design {
    let mut channels = design.fabric.channels().to_vec();
    let links = design.fabric.links().to_vec();
    let target = channels
        .iter()
        .position(|c| design.topology.tile(c.consumer).unwrap().role == TileRole::Compute)
        .unwrap();
    channels[target].depth = depth;

    let mut broken = design.clone();
    broken.fabric = ChannelFabric::from_parts(channels, links);
    broken
}

#[test]
#[should_panic(expected = "depth 1 feeding a compute tile must be at least 2")]
fn shallow_channel_is_rejected() {
    let design = with_compute_depth(&default_design(), 1);
    verify(&design).unwrap();
}

#[test]
fn every_problem_is_reported() {
    let design = default_design();
    let mut broken = with_compute_depth(&design, 1);
    let mut links = broken.fabric.links().to_vec();
    links[0].offsets.reverse();
    broken.fabric = ChannelFabric::from_parts(broken.fabric.channels().to_vec(), links);
    broken.schedule.barrier.descriptors.clear();

    let message = verify(&broken).unwrap_err().to_string();
    assert!(message.starts_with("Structural verification failed:"));
    assert!(message.contains("feeding a compute tile"));
    assert!(message.contains("are not strictly increasing"));
    assert!(message.contains("The host never waits for completion"));
}

#[test]
fn compute_memory_is_bounded() {
    let params = DesignParams {
        grid: GridShape::new(1, 1),
        block_size: 64 * 1024,
        chunk_size: 64 * 1024,
        kernels: vec!["structural_character_index".to_string()],
        policy: RegionAssignmentPolicy::Single,
        ..Default::default()
    };
    let design = build(&params).unwrap();
    let message = render(&design, OutputFormat::Mlir).unwrap_err().to_string();
    assert!(message.contains("tile(0, 2) needs 147456 bytes of channel buffers, only 65536 available"));
}

#[test]
fn failed_verification_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aie.mlir");
    let design = with_compute_depth(&default_design(), 1);

    let top = toplevel(&dev_null_tracker(), "test");
    assert!(Emitter::new(&top).write(&design, OutputFormat::Mlir, &path).is_err());
    assert!(!path.exists());
}

#[test]
fn mlir_description() {
    let mlir = render(&default_design(), OutputFormat::Mlir).unwrap();

    assert!(mlir.starts_with("module {\n  aie.device(npu1_4col) {\n"));
    assert!(mlir.contains("%tile_0_0 = aie.tile(0, 0)"));
    assert!(mlir.contains("%tile_3_5 = aie.tile(3, 5)"));
    assert!(mlir.contains(
        "aie.objectfifo @string_string_in_c0_mem(%tile_0_0, {%tile_0_1}, 2 : i32) : !aie.objectfifo<memref<1040xui8>>"
    ));
    assert!(mlir.contains(
        "aie.objectfifo.link [@string_string_in_c0_mem] -> [@string_string_in_c0_r0, @string_string_in_c0_r1, @string_string_in_c0_r2, @string_string_in_c0_r3]([] [0, 260, 520, 780])"
    ));
    assert!(mlir.contains(
        "aie.objectfifo.link [@structural_index_out_c2_r0, @structural_index_out_c2_r1, @structural_index_out_c2_r2, @structural_index_out_c2_r3] -> [@structural_index_out_c2_mem]([0, 128, 256, 384] [])"
    ));
    assert!(mlir.contains("func.func private @string_index(memref<260xui8>, memref<128xui8>, i32)"));
    assert!(mlir.contains("func.func private @structural_character_index(memref<1024xui8>, memref<128xui8>, i32)"));
    assert_eq!(mlir.matches("aie.core(").count(), 16);
    assert_eq!(mlir.matches("{link_with = \"kernels.a\"}").count(), 16);
    assert!(mlir.contains("%iterations = arith.constant 500 : index"));
    assert!(mlir.contains("{id = 0 : i64, issue_token = true, metadata = @string_string_in_c0_mem}"));
    assert!(mlir.contains("aiex.npu.dma_wait {symbol = @structural_index_out_c3_mem}"));
    assert_eq!(mlir.matches("aiex.npu.dma_wait").count(), 8);
}

#[test]
fn vector_kernel_description() {
    let params = DesignParams {
        grid: GridShape::new(1, 4),
        block_size: 64,
        chunk_size: 64 * 8,
        kernels: vec!["vector_scalar_add".to_string()],
        policy: RegionAssignmentPolicy::Single,
        ..Default::default()
    };
    let mlir = render(&build(&params).unwrap(), OutputFormat::Mlir).unwrap();

    assert!(mlir.contains("func.func private @vector_scalar_add(memref<16xi32>, memref<16xi32>)"));
    assert!(!mlir.contains("%block_size"));
    assert!(mlir.contains("aiex.runtime_sequence(%arg0: memref<128xi32>, %arg1: memref<128xi32>)"));
    assert!(!mlir.contains("link_with"));
}

#[test]
fn yaml_description() {
    let design = default_design();
    let yaml = render(&design, OutputFormat::Yaml).unwrap();
    let loaded: Design = serde_yaml::from_str(&yaml).unwrap();

    assert_eq!(loaded.fabric.channels(), design.fabric.channels());
    assert_eq!(loaded.schedule.descriptors, design.schedule.descriptors);
    verify(&loaded).unwrap();
}
