// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Structural verification of a [`Design`].
//!
//! All checks are run and every problem is reported together. Nothing may be
//! emitted for a design that fails.

use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;

use crate::design::Design;
use crate::fabric::{Direction, MIN_DEPTH};
use crate::gen_error;
use crate::topology::{BUFFERING_ROW, FIRST_COMPUTE_ROW, STAGING_ROW, TileId, TileRole};
use crate::types::GenResult;

pub fn verify(design: &Design) -> GenResult<()> {
    let mut errors = Vec::new();

    check_device(design, &mut errors);
    check_tiles(design, &mut errors);
    check_channels(design, &mut errors);
    check_links(design, &mut errors);
    check_bindings(design, &mut errors);
    check_memory(design, &mut errors);
    check_descriptors(design, &mut errors);
    check_barrier(design, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        gen_error!(StructuralVerification, "{}", errors.join("\n"))
    }
}

fn check_device(design: &Design, errors: &mut Vec<String>) {
    let device = design.topology.device;
    let grid = design.topology.grid;
    if grid.cols > device.num_cols() {
        errors.push(format!("{grid} grid has more columns than {device}"));
    }
    if grid.rows > device.num_compute_rows() {
        errors.push(format!("{grid} grid has more compute rows than {device}"));
    }
}

fn check_tiles(design: &Design, errors: &mut Vec<String>) {
    for tile in design.topology.tiles() {
        let expected = match tile.id.row {
            STAGING_ROW => TileRole::Staging,
            BUFFERING_ROW => TileRole::Buffering,
            _ => TileRole::Compute,
        };
        if tile.role != expected {
            errors.push(format!("{} is {} but should be {expected}", tile.id, tile.role));
        }
        match (tile.role, tile.region) {
            (TileRole::Compute, None) => {
                errors.push(format!("{} is not in any region", tile.id));
            }
            (TileRole::Compute, Some(region)) => {
                if region >= design.topology.regions().len() {
                    errors.push(format!("{} is in unknown region {region}", tile.id));
                }
            }
            (_, Some(_)) => {
                errors.push(format!("{} {} tile is in a region", tile.id, tile.role));
            }
            (_, None) => {}
        }
    }
}

fn role_of(design: &Design, id: TileId) -> Option<TileRole> {
    design.topology.tile(id).map(|t| t.role)
}

fn check_channels(design: &Design, errors: &mut Vec<String>) {
    let channels = design.fabric.channels();
    for name in channels.iter().map(|c| &c.name).duplicates() {
        errors.push(format!("Channel name {name} is used more than once"));
    }

    for channel in channels {
        let (Some(producer), Some(consumer)) = (
            role_of(design, channel.producer),
            role_of(design, channel.consumer),
        ) else {
            errors.push(format!(
                "{}: endpoint {} -> {} is not in the topology",
                channel.name, channel.producer, channel.consumer
            ));
            continue;
        };

        let valid = match channel.direction {
            Direction::Ingress => matches!(
                (producer, consumer),
                (TileRole::Staging, TileRole::Buffering) | (TileRole::Buffering, TileRole::Compute)
            ),
            Direction::Egress => matches!(
                (producer, consumer),
                (TileRole::Buffering, TileRole::Staging) | (TileRole::Compute, TileRole::Buffering)
            ),
        };
        if !valid || channel.producer.col != channel.consumer.col {
            errors.push(format!(
                "{}: {} channel cannot connect {producer} {} to {consumer} {}",
                channel.name, channel.direction, channel.producer, channel.consumer
            ));
        }

        if channel.element_bytes == 0 || channel.element_bytes % channel.element.num_bytes() != 0 {
            errors.push(format!(
                "{}: element of {} bytes is not a whole number of {}",
                channel.name, channel.element_bytes, channel.element
            ));
        }

        let touches_compute = producer == TileRole::Compute || consumer == TileRole::Compute;
        if touches_compute && channel.depth < MIN_DEPTH {
            errors.push(format!(
                "{}: depth {} feeding a compute tile must be at least {MIN_DEPTH}",
                channel.name, channel.depth
            ));
        } else if channel.depth == 0 {
            errors.push(format!("{}: depth must be non-zero", channel.name));
        }
    }
}

fn check_links(design: &Design, errors: &mut Vec<String>) {
    let fabric = &design.fabric;
    let mut linked = HashSet::new();

    for link in fabric.links() {
        let Some(region) = design.topology.regions().get(link.region) else {
            errors.push(format!("Link in column {} has unknown region {}", link.col, link.region));
            continue;
        };
        let Some(staging) = fabric.get(link.staging) else {
            errors.push(format!("Link in column {} has unknown staging channel", link.col));
            continue;
        };
        if !linked.insert(link.staging) {
            errors.push(format!("{} is linked more than once", staging.name));
        }

        if link.compute.len() != region.num_rows() || link.offsets.len() != link.compute.len() {
            errors.push(format!(
                "{}: link has {} channels and {} offsets for {} rows",
                staging.name,
                link.compute.len(),
                link.offsets.len(),
                region.num_rows()
            ));
            continue;
        }

        for (first, second) in link.offsets.iter().tuple_windows() {
            if second <= first {
                errors.push(format!(
                    "{}: link offsets {:?} are not strictly increasing",
                    staging.name, link.offsets
                ));
                break;
            }
        }

        let mut covered = 0;
        let expected_tiles = region.column_tiles(link.col);
        for (index, (id, offset)) in link.compute.iter().zip(&link.offsets).enumerate() {
            let Some(channel) = fabric.get(*id) else {
                errors.push(format!("{}: link refers to unknown channel {id}", staging.name));
                continue;
            };
            if *offset != covered {
                errors.push(format!(
                    "{}: {} at offset {offset} leaves a gap or overlap at {covered}",
                    staging.name, channel.name
                ));
            }
            covered = offset + channel.element_bytes;

            if channel.direction != link.direction || channel.kind != link.kind {
                errors.push(format!(
                    "{}: linked channel {} carries {} {}",
                    staging.name, channel.name, channel.direction, channel.kind
                ));
            }
            if !channel.touches(expected_tiles[index]) {
                errors.push(format!(
                    "{}: position {index} should reach {} but {} does not",
                    staging.name, expected_tiles[index], channel.name
                ));
            }
        }
        if covered != staging.element_bytes {
            errors.push(format!(
                "{}: links cover {covered} of {} bytes",
                staging.name, staging.element_bytes
            ));
        }
    }
}

fn check_bindings(design: &Design, errors: &mut Vec<String>) {
    let fabric = &design.fabric;
    let mut bound: BTreeMap<TileId, usize> = BTreeMap::new();

    for binding in &design.bindings {
        *bound.entry(binding.tile).or_default() += 1;

        for id in &binding.ingress {
            match fabric.get(*id) {
                Some(channel) if channel.consumer == binding.tile && channel.direction == Direction::Ingress => {}
                _ => errors.push(format!(
                    "{}: ingress channel {id} does not feed the tile",
                    binding.tile
                )),
            }
        }
        match fabric.get(binding.egress) {
            Some(channel) if channel.producer == binding.tile && channel.direction == Direction::Egress => {}
            _ => errors.push(format!(
                "{}: egress channel {} is not drained from the tile",
                binding.tile, binding.egress
            )),
        }
        if binding.iterations == 0 {
            errors.push(format!("{}: kernel never iterates", binding.tile));
        }
    }

    for tile in design.topology.compute_tiles() {
        match bound.get(&tile.id).copied().unwrap_or(0) {
            1 => {}
            n => errors.push(format!("{} has {n} kernel bindings", tile.id)),
        }
    }
    for tile in bound.keys() {
        if tile.row < FIRST_COMPUTE_ROW {
            errors.push(format!("{tile} is not a compute tile but has a kernel"));
        }
    }
}

fn check_memory(design: &Design, errors: &mut Vec<String>) {
    let device = design.topology.device;
    for tile in design.topology.tiles() {
        let budget = match tile.role {
            TileRole::Compute => device.compute_tile_memory(),
            TileRole::Buffering => device.buffering_tile_memory(),
            TileRole::Staging => continue,
        };
        let used: u64 = design
            .fabric
            .channels()
            .iter()
            .filter(|c| c.touches(tile.id))
            .map(|c| c.buffer_bytes())
            .sum();
        if used > budget {
            errors.push(format!(
                "{} needs {used} bytes of channel buffers, only {budget} available",
                tile.id
            ));
        }
    }
}

fn check_descriptors(design: &Design, errors: &mut Vec<String>) {
    let schedule = &design.schedule;
    let device = design.topology.device;

    for (index, buffer) in schedule.buffers.iter().enumerate() {
        let mut covered = 0;
        for (_, descriptor) in schedule
            .descriptors_of(index)
            .sorted_by_key(|(_, d)| d.offset)
        {
            if descriptor.offset != covered {
                errors.push(format!(
                    "Host buffer {}: transfer at {} leaves a gap or overlap at {covered}",
                    buffer.name, descriptor.offset
                ));
            }
            covered = descriptor.offset + descriptor.size;
        }
        if covered != buffer.size {
            errors.push(format!(
                "Host buffer {}: transfers cover {covered} of {} bytes",
                buffer.name, buffer.size
            ));
        }
    }

    for descriptor in &schedule.descriptors {
        let Some(buffer) = schedule.buffers.get(descriptor.buffer) else {
            errors.push(format!("Transfer bd {} has no host buffer", descriptor.bd_id));
            continue;
        };
        let Some(channel) = design.fabric.get(descriptor.channel) else {
            errors.push(format!("{}: transfer to unknown channel", buffer.name));
            continue;
        };
        let staging = TileId::staging(descriptor.col);
        if !channel.touches(staging) || channel.direction != buffer.direction || channel.kind != buffer.kind {
            errors.push(format!(
                "{}: transfer in column {} cannot use {}",
                buffer.name, descriptor.col, channel.name
            ));
        }
        if descriptor.size % channel.element_bytes != 0 {
            errors.push(format!(
                "{}: transfer of {} bytes is not a whole number of {} byte elements",
                channel.name, descriptor.size, channel.element_bytes
            ));
        }
        if descriptor.bd_id >= device.staging_buffer_descriptors() {
            errors.push(format!(
                "{}: buffer descriptor id {} exceeds the {} available",
                channel.name,
                descriptor.bd_id,
                device.staging_buffer_descriptors()
            ));
        }
    }

    for (col, bd_id) in schedule
        .descriptors
        .iter()
        .map(|d| (d.col, d.bd_id))
        .duplicates()
    {
        errors.push(format!("Buffer descriptor id {bd_id} is used twice in column {col}"));
    }
}

fn check_barrier(design: &Design, errors: &mut Vec<String>) {
    let schedule = &design.schedule;
    if schedule.barrier.descriptors.is_empty() {
        errors.push("The host never waits for completion".to_string());
    }

    let in_barrier: HashSet<usize> = schedule.barrier.descriptors.iter().copied().collect();
    for index in &schedule.barrier.descriptors {
        match schedule.descriptors.get(*index) {
            Some(descriptor) if descriptor.await_completion => {}
            Some(_) => errors.push(format!(
                "Barrier waits on transfer {index} which signals no completion"
            )),
            None => errors.push(format!("Barrier waits on unknown transfer {index}")),
        }
    }
    for (index, descriptor) in schedule.descriptors.iter().enumerate() {
        if descriptor.await_completion && !in_barrier.contains(&index) {
            errors.push(format!("Awaited transfer {index} is missing from the barrier"));
        }
    }
}
