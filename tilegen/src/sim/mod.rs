// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Functional simulation of a [`Design`].
//!
//! Every compute tile and every buffering-tile link runs on its own thread
//! and the channels of the design become `crossbeam` bounded channels of the
//! same depth. The host issues each transfer descriptor on a thread of its
//! own and then waits on the design's barrier.
//!
//! Tile tasks never finish by themselves. Once the host has its results it
//! resets the device by dropping its channel ends, which disconnects every
//! tile in turn.

use std::collections::HashSet;
use std::rc::Rc;
use std::thread;

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use tilegen_track::entity::Entity;
use tilegen_track::{debug, trace};

use crate::binder::KernelBinding;
use crate::design::Design;
use crate::fabric::{ChannelId, Direction, Link};
use crate::gen_error;
use crate::schedule::TransferDescriptor;
use crate::types::{GenError, GenResult};
use crate::verify::verify;

pub mod host;
pub mod kernels;

type Block = Vec<u8>;

/// The two ends of every channel of a design, taken as threads claim them.
struct Ends {
    senders: Vec<Option<Sender<Block>>>,
    receivers: Vec<Option<Receiver<Block>>>,
}

impl Ends {
    fn new(design: &Design) -> Self {
        let (senders, receivers) = design
            .fabric
            .channels()
            .iter()
            .map(|c| {
                let (tx, rx) = bounded(c.depth);
                (Some(tx), Some(rx))
            })
            .unzip();
        Self { senders, receivers }
    }

    fn sender(&mut self, design: &Design, id: ChannelId) -> GenResult<Sender<Block>> {
        match self.senders.get_mut(id.0).and_then(Option::take) {
            Some(tx) => Ok(tx),
            None => gen_error!(
                Simulation,
                "Channel {} has no free producer end",
                design.fabric.channel(id).name
            ),
        }
    }

    fn receiver(&mut self, design: &Design, id: ChannelId) -> GenResult<Receiver<Block>> {
        match self.receivers.get_mut(id.0).and_then(Option::take) {
            Some(rx) => Ok(rx),
            None => gen_error!(
                Simulation,
                "Channel {} has no free consumer end",
                design.fabric.channel(id).name
            ),
        }
    }
}

/// Runs chunks through a design.
pub struct Simulator<'a> {
    entity: Rc<Entity>,
    design: &'a Design,
}

impl<'a> Simulator<'a> {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, design: &'a Design) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "sim")),
            design,
        }
    }

    /// Run one chunk.
    ///
    /// `buffers` holds one entry per host buffer of the schedule. Egress
    /// buffers are overwritten with the results.
    pub fn run_chunk(&self, buffers: &mut [Vec<u8>]) -> GenResult<()> {
        let design = self.design;
        let schedule = &design.schedule;
        verify(design)?;
        if buffers.len() != schedule.buffers.len() {
            return gen_error!(
                Simulation,
                "{} host buffers supplied, design declares {}",
                buffers.len(),
                schedule.buffers.len()
            );
        }
        for (buffer, declared) in buffers.iter().zip(&schedule.buffers) {
            if buffer.len() as u64 != declared.size {
                return gen_error!(
                    Simulation,
                    "Host buffer {} is {} bytes, expected {}",
                    declared.name,
                    buffer.len(),
                    declared.size
                );
            }
        }

        let host: &[Vec<u8>] = buffers;
        let (done_tx, done_rx) = unbounded::<usize>();

        let results = thread::scope(|s| -> GenResult<Vec<(usize, Vec<u8>)>> {
            // Dropped on every exit from the scope so no thread can be left
            // waiting on an unclaimed end.
            let mut ends = Ends::new(design);
            let mut tiles = Vec::new();
            for binding in &design.bindings {
                let ingress = binding
                    .ingress
                    .iter()
                    .map(|id| ends.receiver(design, *id))
                    .collect::<GenResult<Vec<_>>>()?;
                let egress = ends.sender(design, binding.egress)?;
                let out_bytes = design.fabric.channel(binding.egress).element_bytes as usize;
                tiles.push(s.spawn(move || run_tile(binding, &ingress, &egress, out_bytes)));
            }

            for link in design.fabric.links() {
                let handle = match link.direction {
                    Direction::Ingress => {
                        let rx = ends.receiver(design, link.staging)?;
                        let txs = link
                            .compute
                            .iter()
                            .map(|id| ends.sender(design, *id))
                            .collect::<GenResult<Vec<_>>>()?;
                        s.spawn(move || split(design, link, &rx, &txs))
                    }
                    Direction::Egress => {
                        let rxs = link
                            .compute
                            .iter()
                            .map(|id| ends.receiver(design, *id))
                            .collect::<GenResult<Vec<_>>>()?;
                        let tx = ends.sender(design, link.staging)?;
                        s.spawn(move || join(design, link, &rxs, &tx))
                    }
                };
                tiles.push(handle);
            }

            let mut ingress = Vec::new();
            let mut egress = Vec::new();
            for (index, descriptor) in schedule.descriptors.iter().enumerate() {
                let done = descriptor.await_completion.then(|| done_tx.clone());
                match schedule.buffers[descriptor.buffer].direction {
                    Direction::Ingress => {
                        let tx = ends.sender(design, descriptor.channel)?;
                        let start = descriptor.offset as usize;
                        let data = &host[descriptor.buffer][start..start + descriptor.size as usize];
                        ingress.push(s.spawn(move || send_transfer(design, index, descriptor, data, &tx, done)));
                    }
                    Direction::Egress => {
                        let rx = ends.receiver(design, descriptor.channel)?;
                        egress.push(s.spawn(move || receive_transfer(design, index, descriptor, &rx, done)));
                    }
                }
            }
            trace!(self.entity ; "started {} tile threads, {} transfers", tiles.len(), ingress.len() + egress.len());
            drop(ends);
            drop(done_tx);

            let barrier_result = self.wait_on_barrier(&done_rx);

            // Every end has been claimed by a thread. Once the ingress
            // transfers finish the device drains and shuts down.
            let mut first_error = barrier_result.err();
            let mut received = Vec::new();
            for handle in egress {
                match joined(handle.join()) {
                    Ok(result) => received.push(result),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            for handle in ingress.into_iter().chain(tiles) {
                if let Err(e) = joined(handle.join()) {
                    first_error.get_or_insert(e);
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(received),
            }
        })?;

        for (index, data) in results {
            let descriptor = &schedule.descriptors[index];
            let start = descriptor.offset as usize;
            buffers[descriptor.buffer][start..start + data.len()].copy_from_slice(&data);
        }
        debug!(self.entity ; "chunk complete");
        Ok(())
    }

    fn wait_on_barrier(&self, done_rx: &Receiver<usize>) -> GenResult<()> {
        let barrier = &self.design.schedule.barrier;
        let mut completed = HashSet::new();
        while !barrier.is_satisfied_by(&completed) {
            match done_rx.recv() {
                Ok(index) => {
                    trace!(self.entity ; "transfer {index} complete");
                    completed.insert(index);
                }
                Err(_) => {
                    return gen_error!(
                        Simulation,
                        "Completion tokens stopped after {} of {} awaited transfers",
                        completed.len(),
                        barrier.descriptors.len()
                    );
                }
            }
        }
        Ok(())
    }
}

fn joined<T>(result: thread::Result<GenResult<T>>) -> GenResult<T> {
    match result {
        Ok(r) => r,
        Err(_) => gen_error!(Simulation, "A simulation thread panicked"),
    }
}

/// The persistent task of one compute tile.
fn run_tile(
    binding: &KernelBinding,
    ingress: &[Receiver<Block>],
    egress: &Sender<Block>,
    out_bytes: usize,
) -> GenResult<()> {
    let mut task = binding.task();
    loop {
        let mut blocks = Vec::with_capacity(ingress.len());
        for rx in ingress {
            match rx.recv() {
                Ok(block) => blocks.push(block),
                // Reset
                Err(_) => return Ok(()),
            }
        }
        let inputs: Vec<&[u8]> = blocks.iter().map(Vec::as_slice).collect();
        let mut output = vec![0u8; out_bytes];
        kernels::invoke(&binding.kernel, &inputs, &mut output, binding.block_size_arg)?;
        if egress.send(output).is_err() {
            return Ok(());
        }
        task.step();
    }
}

/// Distribute each staging element over the compute channels of a column.
fn split(design: &Design, link: &Link, rx: &Receiver<Block>, txs: &[Sender<Block>]) -> GenResult<()> {
    while let Ok(element) = rx.recv() {
        for (tx, (id, offset)) in txs.iter().zip(link.compute.iter().zip(&link.offsets)) {
            let start = *offset as usize;
            let len = design.fabric.channel(*id).element_bytes as usize;
            if tx.send(element[start..start + len].to_vec()).is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Gather one block from every compute channel of a column into a staging
/// element.
fn join(design: &Design, link: &Link, rxs: &[Receiver<Block>], tx: &Sender<Block>) -> GenResult<()> {
    let staging_bytes = design.fabric.channel(link.staging).element_bytes as usize;
    loop {
        let mut element = vec![0u8; staging_bytes];
        for (rx, offset) in rxs.iter().zip(&link.offsets) {
            let Ok(block) = rx.recv() else {
                return Ok(());
            };
            let start = *offset as usize;
            element[start..start + block.len()].copy_from_slice(&block);
        }
        if tx.send(element).is_err() {
            return Ok(());
        }
    }
}

fn send_transfer(
    design: &Design,
    index: usize,
    descriptor: &TransferDescriptor,
    data: &[u8],
    tx: &Sender<Block>,
    done: Option<Sender<usize>>,
) -> GenResult<()> {
    let channel = design.fabric.channel(descriptor.channel);
    for element in data.chunks(channel.element_bytes as usize) {
        if tx.send(element.to_vec()).is_err() {
            return gen_error!(Simulation, "{} disconnected during transfer", channel.name);
        }
    }
    signal(done, index)
}

fn receive_transfer(
    design: &Design,
    index: usize,
    descriptor: &TransferDescriptor,
    rx: &Receiver<Block>,
    done: Option<Sender<usize>>,
) -> GenResult<(usize, Vec<u8>)> {
    let channel = design.fabric.channel(descriptor.channel);
    let mut data = Vec::with_capacity(descriptor.size as usize);
    while (data.len() as u64) < descriptor.size {
        match rx.recv() {
            Ok(element) => data.extend_from_slice(&element),
            Err(_) => {
                return gen_error!(
                    Simulation,
                    "{} disconnected after {} of {} bytes",
                    channel.name,
                    data.len(),
                    descriptor.size
                );
            }
        }
    }
    signal(done, index)?;
    Ok((index, data))
}

fn signal(done: Option<Sender<usize>>, index: usize) -> GenResult<()> {
    if let Some(done) = done {
        done.send(index)
            .map_err(|_| GenError::Simulation(format!("Host stopped waiting before transfer {index}")))?;
    }
    Ok(())
}

/// Process the region shares of a chunk on a single tile, block by block.
///
/// Fills the egress buffers in the same layout as [`Simulator::run_chunk`].
pub fn reference_pass(design: &Design, buffers: &mut [Vec<u8>]) -> GenResult<()> {
    let schedule = &design.schedule;
    for (region, kernel) in design.topology.regions().iter().zip(&design.kernels) {
        let find = |kind: &str, direction: Direction| {
            schedule
                .buffers
                .iter()
                .position(|b| b.region == region.index && b.kind == kind && b.direction == direction)
                .ok_or_else(|| {
                    GenError::Simulation(format!("No {direction} host buffer for {kind} in region {}", region.index))
                })
        };
        let inputs = kernel
            .inputs
            .iter()
            .map(|kind| -> GenResult<(usize, usize)> {
                Ok((find(kind, Direction::Ingress)?, design.plan.kind(kind)?.block_size as usize))
            })
            .collect::<GenResult<Vec<_>>>()?;
        let output = find(&kernel.output, Direction::Egress)?;
        let out_block = design.plan.kind(&kernel.output)?.block_size as usize;
        let block_size_arg = kernel.block_size_arg.then_some(design.plan.block_size);

        for block in 0..design.plan.num_blocks as usize {
            let slices: Vec<&[u8]> = inputs
                .iter()
                .map(|(buffer, size)| &buffers[*buffer][block * size..(block + 1) * size])
                .collect();
            let mut out = vec![0u8; out_block];
            kernels::invoke(&kernel.name, &slices, &mut out, block_size_arg)?;
            buffers[output][block * out_block..(block + 1) * out_block].copy_from_slice(&out);
        }
    }
    Ok(())
}
