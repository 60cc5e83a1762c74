// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Host-side preparation of the ingress buffers of a chunk.

use crate::design::Design;
use crate::fabric::Direction;
use crate::gen_error;
use crate::types::GenResult;

/// The bytes of chunk `index` of `document`, zero padded to `chunk_size`.
#[must_use]
pub fn chunk_of(document: &[u8], index: usize, chunk_size: usize) -> Vec<u8> {
    let start = (index * chunk_size).min(document.len());
    let end = (start + chunk_size).min(document.len());
    let mut chunk = document[start..end].to_vec();
    chunk.resize(chunk_size, 0);
    chunk
}

/// Number of chunks needed to cover `document`, at least one.
#[must_use]
pub fn num_chunks(document: &[u8], chunk_size: usize) -> usize {
    document.len().div_ceil(chunk_size).max(1)
}

/// Whether the byte at `position` is escaped, i.e. it follows an odd-length
/// run of backslashes.
#[must_use]
pub fn escape_carry(document: &[u8], position: usize) -> bool {
    let end = position.min(document.len());
    let run = document[..end]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count();
    position <= document.len() && run % 2 == 1
}

fn set_bit(bitmap: &mut [u8], bit: usize) {
    bitmap[bit / 8] |= 1 << (bit % 8);
}

/// The `string` layout of one block: quote bitmap, backslash bitmap and the
/// escape carry from the previous block.
#[must_use]
pub fn string_block(block: &[u8], escaped: bool) -> Vec<u8> {
    let bitmap_size = block.len().div_ceil(8);
    let mut out = vec![0u8; 2 * bitmap_size + 4];
    for (i, byte) in block.iter().enumerate() {
        match byte {
            b'"' => set_bit(&mut out[..bitmap_size], i),
            b'\\' => set_bit(&mut out[bitmap_size..2 * bitmap_size], i),
            _ => {}
        }
    }
    out[2 * bitmap_size..].copy_from_slice(&u32::from(escaped).to_le_bytes());
    out
}

/// Build every host buffer of `design` for chunk `chunk_index` of
/// `document`.
///
/// Ingress buffers are filled from the document, egress buffers are zeroed.
pub fn prepare_buffers(design: &Design, document: &[u8], chunk_index: usize) -> GenResult<Vec<Vec<u8>>> {
    let chunk_size = design.plan.total_size as usize;
    let block_size = design.plan.block_size as usize;
    let chunk = chunk_of(document, chunk_index, chunk_size);
    let chunk_start = chunk_index * chunk_size;

    design
        .schedule
        .buffers
        .iter()
        .map(|buffer| {
            if buffer.direction == Direction::Egress {
                return Ok(vec![0u8; buffer.size as usize]);
            }
            let prepared = match buffer.kind.as_str() {
                "data" | "words" => chunk.clone(),
                "string" => chunk
                    .chunks_exact(block_size)
                    .enumerate()
                    .flat_map(|(b, block)| {
                        string_block(block, escape_carry(document, chunk_start + b * block_size))
                    })
                    .collect(),
                kind => {
                    return gen_error!(Simulation, "No host preparation for data kind '{kind}'");
                }
            };
            if prepared.len() as u64 != buffer.size {
                return gen_error!(
                    Simulation,
                    "Host buffer {} prepared with {} bytes, expected {}",
                    buffer.name,
                    prepared.len(),
                    buffer.size
                );
            }
            Ok(prepared)
        })
        .collect()
}
