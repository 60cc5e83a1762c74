// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Bounded channels and the links that split and join them.
//!
//! For every (region, kind, direction) and every column of the region the
//! fabric holds:
//!  - a staging channel between the staging and buffering tile of the column
//!    whose element is one block per row of the region;
//!  - one block-sized channel per compute tile of the column;
//!  - a [`Link`] giving the offset of each compute tile's block within the
//!    staging element.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tilegen_track::entity::Entity;
use tilegen_track::{debug, trace};

use crate::binder::KernelSignature;
use crate::plan::{ElementType, KindPlan, PartitionPlan};
use crate::topology::{FIRST_COMPUTE_ROW, Region, TileId, Topology};
use crate::types::GenResult;

/// Smallest depth of any channel.
pub const MIN_DEPTH: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Host to compute.
    Ingress,

    /// Compute to host.
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ingress => write!(f, "in"),
            Direction::Egress => write!(f, "out"),
        }
    }
}

/// Index of a channel within its [`ChannelFabric`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub usize);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub region: usize,
    pub kind: String,
    pub direction: Direction,
    pub producer: TileId,
    pub consumer: TileId,
    pub element: ElementType,

    /// Size of one element in bytes.
    pub element_bytes: u64,
    pub depth: usize,
}

impl Channel {
    /// Number of `element`-typed values in one channel element.
    #[must_use]
    pub fn element_len(&self) -> u64 {
        self.element_bytes / self.element.num_bytes()
    }

    /// Memory a tile reserves for this channel.
    #[must_use]
    pub fn buffer_bytes(&self) -> u64 {
        self.element_bytes * self.depth as u64
    }

    #[must_use]
    pub fn touches(&self, tile: TileId) -> bool {
        self.producer == tile || self.consumer == tile
    }
}

/// Splits a staging channel over the compute channels of a column (ingress)
/// or joins them back together (egress).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub region: usize,
    pub kind: String,
    pub direction: Direction,
    pub col: usize,
    pub staging: ChannelId,

    /// Compute channels in the region's enumeration order.
    pub compute: Vec<ChannelId>,

    /// Byte offset of each compute channel's block in the staging element.
    pub offsets: Vec<u64>,
}

/// Depth for a channel carrying `element_bytes` sized elements.
///
/// Small elements are produced at a high rate and get deeper buffering.
#[must_use]
pub fn depth_for(element_bytes: u64) -> usize {
    match element_bytes {
        0..=4 => 16,
        5..=64 => 4,
        _ => MIN_DEPTH,
    }
}

/// All the channels and links of a design.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelFabric {
    channels: Vec<Channel>,
    links: Vec<Link>,
}

impl ChannelFabric {
    /// Build the channels of every region of `topology`.
    ///
    /// `kernels` holds the signature of the kernel of each region, which
    /// decides the kinds flowing in each direction.
    pub fn build(
        parent: &Rc<Entity>,
        topology: &Topology,
        plan: &PartitionPlan,
        kernels: &[KernelSignature],
    ) -> GenResult<Self> {
        let entity = Entity::new(parent, "fabric");
        let mut fabric = ChannelFabric::default();

        for (region, kernel) in topology.regions().iter().zip(kernels) {
            for kind in &kernel.inputs {
                let kind_plan = plan.kind(kind)?;
                fabric.add_region_kind(region, kind_plan, Direction::Ingress);
            }
            let kind_plan = plan.kind(&kernel.output)?;
            fabric.add_region_kind(region, kind_plan, Direction::Egress);
        }

        for channel in &fabric.channels {
            trace!(entity ; "{}: {} -> {}, {} x {}B", channel.name, channel.producer, channel.consumer, channel.depth, channel.element_bytes);
        }
        debug!(entity ; "built {} channels, {} links", fabric.channels.len(), fabric.links.len());
        Ok(fabric)
    }

    fn add_region_kind(&mut self, region: &Region, kind: &KindPlan, direction: Direction) {
        for col in region.cols.clone() {
            let staging_bytes = kind.block_size * region.num_rows() as u64;
            let staging_name = format!("{}_{}_{}_c{}_mem", region.label, kind.kind, direction, col);
            let (producer, consumer) = match direction {
                Direction::Ingress => (TileId::staging(col), TileId::buffering(col)),
                Direction::Egress => (TileId::buffering(col), TileId::staging(col)),
            };
            let staging = self.add_channel(Channel {
                name: staging_name,
                region: region.index,
                kind: kind.kind.clone(),
                direction,
                producer,
                consumer,
                element: kind.element,
                element_bytes: staging_bytes,
                depth: depth_for(staging_bytes),
            });

            let mut compute = Vec::with_capacity(region.num_rows());
            let mut offsets = Vec::with_capacity(region.num_rows());
            for (index_in_column, tile) in region.column_tiles(col).into_iter().enumerate() {
                let row_in_region = tile.row - FIRST_COMPUTE_ROW - region.rows.start;
                let (producer, consumer) = match direction {
                    Direction::Ingress => (TileId::buffering(col), tile),
                    Direction::Egress => (tile, TileId::buffering(col)),
                };
                compute.push(self.add_channel(Channel {
                    name: format!(
                        "{}_{}_{}_c{}_r{}",
                        region.label, kind.kind, direction, col, row_in_region
                    ),
                    region: region.index,
                    kind: kind.kind.clone(),
                    direction,
                    producer,
                    consumer,
                    element: kind.element,
                    element_bytes: kind.block_size,
                    depth: depth_for(kind.block_size),
                }));
                offsets.push(index_in_column as u64 * kind.block_size);
            }

            self.links.push(Link {
                region: region.index,
                kind: kind.kind.clone(),
                direction,
                col,
                staging,
                compute,
                offsets,
            });
        }
    }

    fn add_channel(&mut self, channel: Channel) -> ChannelId {
        self.channels.push(channel);
        ChannelId(self.channels.len() - 1)
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Look up a channel created by this fabric.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this fabric. Use [`Self::get`] for
    /// ids from elsewhere (verification does).
    #[must_use]
    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.0]
    }

    #[must_use]
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id.0)
    }

    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// The links of one (region, kind, direction), one per column.
    pub fn links_for<'a>(
        &'a self,
        region: usize,
        kind: &'a str,
        direction: Direction,
    ) -> impl Iterator<Item = &'a Link> {
        self.links
            .iter()
            .filter(move |l| l.region == region && l.kind == kind && l.direction == direction)
    }

    /// The compute channel of `tile` carrying `kind` in `direction`.
    #[must_use]
    pub fn compute_channel(&self, tile: TileId, kind: &str, direction: Direction) -> Option<ChannelId> {
        self.links
            .iter()
            .filter(|l| l.kind == kind && l.direction == direction && l.col == tile.col)
            .flat_map(|l| l.compute.iter())
            .find(|id| self.channel(**id).touches(tile))
            .copied()
    }

    /// Build a fabric directly from its parts.
    ///
    /// Used to check that verification rejects malformed fabrics.
    #[must_use]
    pub fn from_parts(channels: Vec<Channel>, links: Vec<Link>) -> Self {
        Self { channels, links }
    }
}
