// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Rendering to the textual `aie`/`aiex` MLIR dialects.
//!
//! Sizes in the rendered text are element counts of the channel element type
//! rather than bytes.

use std::fmt::{self, Write};

use crate::binder::KernelBinding;
use crate::design::Design;
use crate::fabric::{Channel, Direction};
use crate::plan::ElementType;
use crate::topology::TileId;
use crate::types::{GenError, GenResult};

const INDENT: &str = "  ";

pub fn render(design: &Design) -> GenResult<String> {
    let mut out = String::new();
    write_module(&mut out, design)
        .map_err(|e| GenError::Io(std::io::Error::other(e.to_string())))?;
    Ok(out)
}

fn memref(len: u64, element: ElementType) -> String {
    format!("memref<{len}x{element}>")
}

fn channel_memref(channel: &Channel) -> String {
    memref(channel.element_len(), channel.element)
}

fn tile_ssa(tile: TileId) -> String {
    format!("%tile_{}_{}", tile.col, tile.row)
}

fn indent(level: usize) -> String {
    INDENT.repeat(level)
}

fn write_module(out: &mut String, design: &Design) -> fmt::Result {
    writeln!(out, "module {{")?;
    writeln!(out, "{}aie.device({}) {{", indent(1), design.topology.device)?;

    for tile in design.topology.tiles() {
        writeln!(
            out,
            "{}{} = aie.tile({}, {})",
            indent(2),
            tile_ssa(tile.id),
            tile.id.col,
            tile.id.row
        )?;
    }

    write_fifos(out, design)?;
    write_links(out, design)?;
    write_kernel_declarations(out, design)?;
    for binding in &design.bindings {
        write_core(out, design, binding)?;
    }
    write_runtime_sequence(out, design)?;

    writeln!(out, "{}}}", indent(1))?;
    writeln!(out, "}}")
}

fn write_fifos(out: &mut String, design: &Design) -> fmt::Result {
    for channel in design.fabric.channels() {
        writeln!(
            out,
            "{}aie.objectfifo @{}({}, {{{}}}, {} : i32) : !aie.objectfifo<{}>",
            indent(2),
            channel.name,
            tile_ssa(channel.producer),
            tile_ssa(channel.consumer),
            channel.depth,
            channel_memref(channel)
        )?;
    }
    Ok(())
}

fn write_links(out: &mut String, design: &Design) -> fmt::Result {
    let fabric = &design.fabric;
    for link in fabric.links() {
        let staging = fabric.channel(link.staging);
        let compute = link
            .compute
            .iter()
            .map(|id| format!("@{}", fabric.channel(*id).name))
            .collect::<Vec<_>>()
            .join(", ");
        let offsets = link
            .offsets
            .iter()
            .map(|o| (o / staging.element.num_bytes()).to_string())
            .collect::<Vec<_>>()
            .join(", ");

        match link.direction {
            Direction::Ingress => writeln!(
                out,
                "{}aie.objectfifo.link [@{}] -> [{compute}]([] [{offsets}])",
                indent(2),
                staging.name
            )?,
            Direction::Egress => writeln!(
                out,
                "{}aie.objectfifo.link [{compute}] -> [@{}]([{offsets}] [])",
                indent(2),
                staging.name
            )?,
        }
    }
    Ok(())
}

fn kernel_arg_types(design: &Design, binding: &KernelBinding) -> Vec<String> {
    let mut types: Vec<String> = binding
        .ingress
        .iter()
        .chain(std::iter::once(&binding.egress))
        .map(|id| channel_memref(design.fabric.channel(*id)))
        .collect();
    if binding.block_size_arg.is_some() {
        types.push("i32".to_string());
    }
    types
}

fn write_kernel_declarations(out: &mut String, design: &Design) -> fmt::Result {
    let mut declared: Vec<&str> = Vec::new();
    for binding in &design.bindings {
        if declared.contains(&binding.kernel.as_str()) {
            continue;
        }
        declared.push(&binding.kernel);
        writeln!(
            out,
            "{}func.func private @{}({})",
            indent(2),
            binding.kernel,
            kernel_arg_types(design, binding).join(", ")
        )?;
    }
    Ok(())
}

fn write_core(out: &mut String, design: &Design, binding: &KernelBinding) -> fmt::Result {
    let tile = binding.tile;
    writeln!(
        out,
        "{}%core_{}_{} = aie.core({}) {{",
        indent(2),
        tile.col,
        tile.row,
        tile_ssa(tile)
    )?;
    writeln!(out, "{}%c0 = arith.constant 0 : index", indent(3))?;
    writeln!(out, "{}%c1 = arith.constant 1 : index", indent(3))?;
    writeln!(
        out,
        "{}%c_max = arith.constant {} : index",
        indent(3),
        i64::MAX
    )?;
    writeln!(
        out,
        "{}%iterations = arith.constant {} : index",
        indent(3),
        binding.iterations
    )?;
    if let Some(block_size) = binding.block_size_arg {
        writeln!(
            out,
            "{}%block_size = arith.constant {block_size} : i32",
            indent(3)
        )?;
    }
    writeln!(
        out,
        "{}scf.for %arg0 = %c0 to %c_max step %c1 {{",
        indent(3)
    )?;
    writeln!(
        out,
        "{}scf.for %arg1 = %c0 to %iterations step %c1 {{",
        indent(4)
    )?;

    let mut ssa = 0;
    let mut args = Vec::new();
    let ports = binding
        .ingress
        .iter()
        .map(|id| (id, "Consume"))
        .chain(std::iter::once((&binding.egress, "Produce")));
    for (id, port) in ports.clone() {
        let channel = design.fabric.channel(*id);
        let ty = channel_memref(channel);
        writeln!(
            out,
            "{}%{ssa} = aie.objectfifo.acquire @{}({port}, 1) : !aie.objectfifosubview<{ty}>",
            indent(5),
            channel.name
        )?;
        writeln!(
            out,
            "{}%{} = aie.objectfifo.subview.access %{ssa}[0] : !aie.objectfifosubview<{ty}> -> {ty}",
            indent(5),
            ssa + 1
        )?;
        args.push(format!("%{}", ssa + 1));
        ssa += 2;
    }
    if binding.block_size_arg.is_some() {
        args.push("%block_size".to_string());
    }

    writeln!(
        out,
        "{}func.call @{}({}) : ({}) -> ()",
        indent(5),
        binding.kernel,
        args.join(", "),
        kernel_arg_types(design, binding).join(", ")
    )?;
    for (id, port) in ports {
        writeln!(
            out,
            "{}aie.objectfifo.release @{}({port}, 1)",
            indent(5),
            design.fabric.channel(*id).name
        )?;
    }

    writeln!(out, "{}}}", indent(4))?;
    writeln!(out, "{}}}", indent(3))?;
    writeln!(out, "{}aie.end", indent(3))?;
    match &design.kernel_object {
        Some(object) => writeln!(out, "{}}} {{link_with = \"{object}\"}}", indent(2)),
        None => writeln!(out, "{}}}", indent(2)),
    }
}

fn write_runtime_sequence(out: &mut String, design: &Design) -> fmt::Result {
    let schedule = &design.schedule;
    let params = schedule
        .buffers
        .iter()
        .enumerate()
        .map(|(i, b)| {
            format!(
                "%arg{i}: {}",
                memref(b.size / b.element.num_bytes(), b.element)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "{}aiex.runtime_sequence({params}) {{", indent(2))?;

    for descriptor in &schedule.descriptors {
        let buffer = &schedule.buffers[descriptor.buffer];
        let channel = design.fabric.channel(descriptor.channel);
        let unit = buffer.element.num_bytes();
        writeln!(
            out,
            "{}aiex.npu.dma_memcpy_nd(0, 0, %arg{}[0, 0, 0, {}][1, 1, 1, {}][0, 0, 0, 1]) {{id = {} : i64, issue_token = {}, metadata = @{}}} : {}",
            indent(3),
            descriptor.buffer,
            descriptor.offset / unit,
            descriptor.size / unit,
            descriptor.bd_id,
            descriptor.await_completion,
            channel.name,
            memref(buffer.size / unit, buffer.element)
        )?;
    }

    for index in &schedule.barrier.descriptors {
        let descriptor = &schedule.descriptors[*index];
        writeln!(
            out,
            "{}aiex.npu.dma_wait {{symbol = @{}}}",
            indent(3),
            design.fabric.channel(descriptor.channel).name
        )?;
    }

    writeln!(out, "{}}}", indent(2))
}
