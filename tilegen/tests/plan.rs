// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::ops::Range;

use proptest::prelude::*;
use tilegen::plan::{GridShape, KindRule, PartitionPlan, PartitionPlanner, builtin_kinds};
use tilegen::types::{GenError, GenResult};
use tilegen_track::dev_null_tracker;
use tilegen_track::entity::toplevel;

fn plan(total_size: u64, block_size: u64, cols: usize, rows: usize, rules: &[KindRule]) -> GenResult<PartitionPlan> {
    let top = toplevel(&dev_null_tracker(), "test");
    PartitionPlanner::new(&top).plan(total_size, block_size, GridShape::new(cols, rows), rules)
}

#[test]
fn two_column_grid() {
    let plan = plan(4_096_000, 1024, 2, 4, &[KindRule::data()]).unwrap();
    assert_eq!(plan.blocks_per_tile, 500);
    assert_eq!(plan.tile_offset(plan.tile_index(0, 0)), 0);
    assert_eq!(plan.tile_offset(plan.tile_index(0, 1)), 1024);
    assert_eq!(plan.tile_offset(plan.tile_index(1, 0)), 4096);
    assert_eq!(*plan.tile_offsets().last().unwrap(), 7 * 1024);
}

#[test]
#[should_panic(expected = "Size divisibility error for kind 'data'")]
fn chunk_smaller_than_block() {
    plan(1000, 1024, 2, 4, &builtin_kinds()).unwrap();
}

#[test]
#[should_panic(expected = "does not divide across block size 1024 x 8 tiles")]
fn blocks_do_not_divide_over_tiles() {
    plan(1024 * 12, 1024, 2, 4, &[KindRule::data()]).unwrap();
}

#[test]
#[should_panic(expected = "Invalid grid")]
fn empty_grid() {
    plan(1024, 1024, 0, 4, &[KindRule::data()]).unwrap();
}

#[test]
fn custom_kind_is_named() {
    let rule: KindRule = serde_yaml::from_str(
        "
name: thirds
terms:
  - scaled: { num: 1, den: 3 }
",
    )
    .unwrap();
    match plan(1024, 64, 1, 1, &[rule]).unwrap_err() {
        GenError::SizeDivisibility { kind, ratio, .. } => {
            assert_eq!(kind, "thirds");
            assert_eq!(ratio, "1/3");
        }
        e => panic!("unexpected error {e}"),
    }
}

fn sorted_ranges(plan: &PartitionPlan) -> Vec<Range<u64>> {
    let mut ranges = Vec::new();
    for col in 0..plan.grid.cols {
        for row in 0..plan.grid.rows {
            let tile_ranges = plan.tile_block_ranges(col, row);
            assert_eq!(tile_ranges.len() as u64, plan.blocks_per_tile);
            ranges.extend(tile_ranges);
        }
    }
    ranges.sort_by_key(|r| r.start);
    ranges
}

proptest! {
    #[test]
    fn tiles_partition_the_chunk(
        cols in 1usize..=4,
        rows in 1usize..=4,
        block_words in 1u64..=128,
        blocks_per_tile in 1u64..=32,
    ) {
        let block_size = block_words * 8;
        let total_size = block_size * (cols * rows) as u64 * blocks_per_tile;
        let plan = plan(total_size, block_size, cols, rows, &builtin_kinds()).unwrap();
        prop_assert_eq!(plan.blocks_per_tile, blocks_per_tile);

        let mut next = 0;
        for range in sorted_ranges(&plan) {
            prop_assert_eq!(range.start, next);
            prop_assert_eq!(range.end - range.start, block_size);
            next = range.end;
        }
        prop_assert_eq!(next, total_size);

        let offsets = plan.tile_offsets();
        prop_assert_eq!(offsets.len(), cols * rows);
        for (i, offset) in offsets.iter().enumerate() {
            prop_assert_eq!(*offset, i as u64 * block_size);
        }
    }

    #[test]
    fn index_kind_validates_iff_divisible(
        total_size in 1u64..20_000,
        block_size in 1u64..512,
        cols in 1usize..=4,
        rows in 1usize..=4,
    ) {
        let num_tiles = (cols * rows) as u64;
        let base_ok = total_size % block_size == 0 && (total_size / block_size) % num_tiles == 0;
        let index_ok = block_size % 8 == 0;

        match plan(total_size, block_size, cols, rows, &[KindRule::index()]) {
            Ok(plan) => {
                prop_assert!(base_ok && index_ok);
                let index = plan.kind("index").unwrap();
                prop_assert_eq!(index.chunk_size * 8, total_size);
                prop_assert_eq!(index.block_size * 8, block_size);
            }
            Err(GenError::SizeDivisibility { kind, .. }) => {
                prop_assert!(!(base_ok && index_ok));
                let expected = if base_ok { "index" } else { "data" };
                prop_assert_eq!(kind, expected);
            }
            Err(e) => prop_assert!(false, "unexpected error {}", e),
        }
    }
}
