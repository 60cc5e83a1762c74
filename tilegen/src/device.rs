// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Target device variants and their per-tile resources.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const COMPUTE_ROWS: usize = 4;
const COMPUTE_TILE_MEMORY: u64 = 64 * 1024;
const BUFFERING_TILE_MEMORY: u64 = 512 * 1024;
const STAGING_BUFFER_DESCRIPTORS: u32 = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum DeviceVariant {
    #[value(name = "npu1_1col")]
    #[serde(rename = "npu1_1col")]
    Npu1Col1,

    #[value(name = "npu1_2col")]
    #[serde(rename = "npu1_2col")]
    Npu1Col2,

    #[value(name = "npu1_3col")]
    #[serde(rename = "npu1_3col")]
    Npu1Col3,

    #[default]
    #[value(name = "npu1_4col")]
    #[serde(rename = "npu1_4col")]
    Npu1Col4,

    #[value(name = "npu2")]
    #[serde(rename = "npu2")]
    Npu2,
}

impl DeviceVariant {
    #[must_use]
    pub fn num_cols(&self) -> usize {
        match self {
            DeviceVariant::Npu1Col1 => 1,
            DeviceVariant::Npu1Col2 => 2,
            DeviceVariant::Npu1Col3 => 3,
            DeviceVariant::Npu1Col4 => 4,
            DeviceVariant::Npu2 => 8,
        }
    }

    #[must_use]
    pub fn num_compute_rows(&self) -> usize {
        COMPUTE_ROWS
    }

    /// Bytes of local memory in each compute tile.
    #[must_use]
    pub fn compute_tile_memory(&self) -> u64 {
        COMPUTE_TILE_MEMORY
    }

    /// Bytes of memory in each buffering tile.
    #[must_use]
    pub fn buffering_tile_memory(&self) -> u64 {
        BUFFERING_TILE_MEMORY
    }

    #[must_use]
    pub fn staging_buffer_descriptors(&self) -> u32 {
        STAGING_BUFFER_DESCRIPTORS
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DeviceVariant::Npu1Col1 => "npu1_1col",
            DeviceVariant::Npu1Col2 => "npu1_2col",
            DeviceVariant::Npu1Col3 => "npu1_3col",
            DeviceVariant::Npu1Col4 => "npu1_4col",
            DeviceVariant::Npu2 => "npu2",
        }
    }
}

impl fmt::Display for DeviceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
