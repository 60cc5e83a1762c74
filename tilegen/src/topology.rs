// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The immutable 2D array of tiles.
//!
//! Two synthetic rows sit below the compute grid: row 0 holds one staging
//! tile per column (the host interface) and row 1 one buffering tile per
//! column. Compute tiles occupy rows `2..R+2`.
//!
//! Compute tiles are grouped into kernel regions according to a
//! [`RegionAssignmentPolicy`]. Each region runs a single kernel and owns its
//! own channels.

use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tilegen_track::entity::Entity;
use tilegen_track::{debug, trace};

use crate::device::DeviceVariant;
use crate::gen_error;
use crate::plan::GridShape;
use crate::types::GenResult;

/// Row of the staging tiles.
pub const STAGING_ROW: usize = 0;

/// Row of the buffering tiles.
pub const BUFFERING_ROW: usize = 1;

/// First row of compute tiles.
pub const FIRST_COMPUTE_ROW: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub col: usize,
    pub row: usize,
}

impl TileId {
    #[must_use]
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    /// The compute tile at `compute_row` of the compute grid.
    #[must_use]
    pub fn compute(col: usize, compute_row: usize) -> Self {
        Self::new(col, compute_row + FIRST_COMPUTE_ROW)
    }

    #[must_use]
    pub fn staging(col: usize) -> Self {
        Self::new(col, STAGING_ROW)
    }

    #[must_use]
    pub fn buffering(col: usize) -> Self {
        Self::new(col, BUFFERING_ROW)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile({}, {})", self.col, self.row)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileRole {
    Staging,
    Buffering,
    Compute,
}

impl fmt::Display for TileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileRole::Staging => write!(f, "staging"),
            TileRole::Buffering => write!(f, "buffering"),
            TileRole::Compute => write!(f, "compute"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub role: TileRole,

    /// Index of the kernel region, compute tiles only.
    pub region: Option<usize>,
}

/// How compute tiles are divided between kernels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RegionAssignmentPolicy {
    /// One kernel over the whole grid.
    Single,

    /// Two kernels, the columns split into two contiguous halves.
    #[default]
    ColumnHalves,

    /// Two kernels, the rows split into two contiguous halves.
    RowHalves,
}

impl RegionAssignmentPolicy {
    #[must_use]
    pub fn num_regions(&self) -> usize {
        match self {
            RegionAssignmentPolicy::Single => 1,
            RegionAssignmentPolicy::ColumnHalves | RegionAssignmentPolicy::RowHalves => 2,
        }
    }
}

impl fmt::Display for RegionAssignmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionAssignmentPolicy::Single => write!(f, "single"),
            RegionAssignmentPolicy::ColumnHalves => write!(f, "column-halves"),
            RegionAssignmentPolicy::RowHalves => write!(f, "row-halves"),
        }
    }
}

/// A rectangle of compute tiles running one kernel.
///
/// `rows` are compute-grid rows, so row 0 is the first compute row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub index: usize,
    pub label: String,
    pub cols: Range<usize>,
    pub rows: Range<usize>,
}

impl Region {
    #[must_use]
    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn num_tiles(&self) -> usize {
        self.num_cols() * self.num_rows()
    }

    /// Column index relative to the first column of the region.
    #[must_use]
    pub fn col_in_region(&self, col: usize) -> usize {
        col - self.cols.start
    }

    /// Compute tiles of the region in enumeration order: every row of the
    /// first column, then every row of the next.
    #[must_use]
    pub fn compute_tiles(&self) -> Vec<TileId> {
        self.cols
            .clone()
            .flat_map(|col| self.rows.clone().map(move |row| TileId::compute(col, row)))
            .collect()
    }

    /// Compute tiles of one column of the region, in link order.
    #[must_use]
    pub fn column_tiles(&self, col: usize) -> Vec<TileId> {
        self.rows
            .clone()
            .map(|row| TileId::compute(col, row))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, tile: TileId) -> bool {
        tile.row >= FIRST_COMPUTE_ROW
            && self.cols.contains(&tile.col)
            && self.rows.contains(&(tile.row - FIRST_COMPUTE_ROW))
    }
}

/// The immutable tile array.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topology {
    pub device: DeviceVariant,
    pub grid: GridShape,
    pub policy: RegionAssignmentPolicy,
    tiles: Vec<Tile>,
    regions: Vec<Region>,
}

impl Topology {
    /// Number of tile rows including the staging and buffering rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.grid.rows + FIRST_COMPUTE_ROW
    }

    #[must_use]
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        if id.col >= self.grid.cols || id.row >= self.num_rows() {
            return None;
        }
        self.tiles.get(id.col * self.num_rows() + id.row)
    }

    /// All tiles, column by column with rows ascending.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn region_of(&self, id: TileId) -> Option<&Region> {
        self.tile(id)
            .and_then(|t| t.region)
            .and_then(|r| self.regions.get(r))
    }

    pub fn compute_tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter().filter(|t| t.role == TileRole::Compute)
    }
}

/// Builds a [`Topology`] for a grid, device and policy.
pub struct TopologyBuilder {
    entity: Rc<Entity>,
}

impl TopologyBuilder {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "topology")),
        }
    }

    /// Build the tile array.
    ///
    /// `labels` gives the short label of the kernel running in each region
    /// and must have one entry per region of the policy.
    pub fn build(
        &self,
        device: DeviceVariant,
        grid: GridShape,
        policy: RegionAssignmentPolicy,
        labels: &[&str],
    ) -> GenResult<Topology> {
        if grid.cols == 0 || grid.rows == 0 {
            return gen_error!(InvalidGrid, "Grid {grid} has no compute tiles");
        }
        if grid.cols > device.num_cols() || grid.rows > device.num_compute_rows() {
            return gen_error!(
                InvalidGrid,
                "Grid {grid} does not fit {device} ({} columns, {} compute rows)",
                device.num_cols(),
                device.num_compute_rows()
            );
        }
        if labels.len() != policy.num_regions() {
            return gen_error!(
                UnsupportedKernel,
                "Policy {policy} requires {} kernels, {} given",
                policy.num_regions(),
                labels.len()
            );
        }

        let spans = split_regions(grid, policy)?;
        let regions: Vec<Region> = spans
            .into_iter()
            .enumerate()
            .map(|(index, (cols, rows))| Region {
                index,
                label: region_label(labels, index),
                cols,
                rows,
            })
            .collect();

        let num_rows = grid.rows + FIRST_COMPUTE_ROW;
        let mut tiles = Vec::with_capacity(grid.cols * num_rows);
        for col in 0..grid.cols {
            for row in 0..num_rows {
                let id = TileId::new(col, row);
                let tile = match row {
                    STAGING_ROW => Tile {
                        id,
                        role: TileRole::Staging,
                        region: None,
                    },
                    BUFFERING_ROW => Tile {
                        id,
                        role: TileRole::Buffering,
                        region: None,
                    },
                    _ => Tile {
                        id,
                        role: TileRole::Compute,
                        region: regions.iter().position(|r| r.contains(id)),
                    },
                };
                trace!(self.entity ; "{} {} region {:?}", tile.role, id, tile.region);
                tiles.push(tile);
            }
        }

        for region in &regions {
            debug!(self.entity ; "region {} '{}': cols {:?} rows {:?}", region.index, region.label, region.cols, region.rows);
        }

        Ok(Topology {
            device,
            grid,
            policy,
            tiles,
            regions,
        })
    }
}

type Span = (Range<usize>, Range<usize>);

fn split_regions(grid: GridShape, policy: RegionAssignmentPolicy) -> GenResult<Vec<Span>> {
    match policy {
        RegionAssignmentPolicy::Single => Ok(vec![(0..grid.cols, 0..grid.rows)]),
        RegionAssignmentPolicy::ColumnHalves => {
            if grid.cols % 2 != 0 {
                return gen_error!(
                    InvalidGrid,
                    "Policy {policy} needs an even number of columns, grid is {grid}"
                );
            }
            let half = grid.cols / 2;
            Ok(vec![
                (0..half, 0..grid.rows),
                (half..grid.cols, 0..grid.rows),
            ])
        }
        RegionAssignmentPolicy::RowHalves => {
            if grid.rows % 2 != 0 {
                return gen_error!(
                    InvalidGrid,
                    "Policy {policy} needs an even number of rows, grid is {grid}"
                );
            }
            let half = grid.rows / 2;
            Ok(vec![
                (0..grid.cols, 0..half),
                (0..grid.cols, half..grid.rows),
            ])
        }
    }
}

fn region_label(labels: &[&str], index: usize) -> String {
    let label = labels[index];
    if labels.iter().filter(|l| **l == label).count() > 1 {
        format!("{label}{index}")
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use tilegen_track::dev_null_tracker;
    use tilegen_track::entity::toplevel;

    use super::*;

    fn build(grid: GridShape, policy: RegionAssignmentPolicy, labels: &[&str]) -> GenResult<Topology> {
        let top = toplevel(&dev_null_tracker(), "test");
        TopologyBuilder::new(&top).build(DeviceVariant::Npu1Col4, grid, policy, labels)
    }

    #[test]
    fn roles_by_row() {
        let topology = build(
            GridShape::new(4, 4),
            RegionAssignmentPolicy::Single,
            &["add"],
        )
        .unwrap();
        assert_eq!(topology.tiles().len(), 24);
        assert_eq!(topology.tile(TileId::new(3, 0)).unwrap().role, TileRole::Staging);
        assert_eq!(topology.tile(TileId::new(3, 1)).unwrap().role, TileRole::Buffering);
        assert_eq!(topology.tile(TileId::new(3, 5)).unwrap().role, TileRole::Compute);
        assert!(topology.tile(TileId::new(3, 6)).is_none());
        assert!(topology.tile(TileId::new(4, 0)).is_none());
    }

    #[test]
    fn column_halves() {
        let topology = build(
            GridShape::new(4, 4),
            RegionAssignmentPolicy::ColumnHalves,
            &["string", "structural"],
        )
        .unwrap();
        let regions = topology.regions();
        assert_eq!(regions[0].cols, 0..2);
        assert_eq!(regions[1].cols, 2..4);
        assert_eq!(regions[1].num_tiles(), 8);
        assert_eq!(topology.tile(TileId::compute(1, 3)).unwrap().region, Some(0));
        assert_eq!(topology.tile(TileId::compute(2, 0)).unwrap().region, Some(1));
        assert_eq!(topology.region_of(TileId::compute(3, 2)).unwrap().label, "structural");
    }

    #[test]
    fn row_halves_share_columns() {
        let topology = build(
            GridShape::new(2, 4),
            RegionAssignmentPolicy::RowHalves,
            &["add", "add"],
        )
        .unwrap();
        let regions = topology.regions();
        assert_eq!(regions[0].label, "add0");
        assert_eq!(regions[1].label, "add1");
        assert_eq!(
            regions[1].compute_tiles(),
            vec![
                TileId::compute(0, 2),
                TileId::compute(0, 3),
                TileId::compute(1, 2),
                TileId::compute(1, 3)
            ]
        );
    }

    #[test]
    fn every_compute_tile_in_one_region() {
        for policy in [
            RegionAssignmentPolicy::Single,
            RegionAssignmentPolicy::ColumnHalves,
            RegionAssignmentPolicy::RowHalves,
        ] {
            let labels = vec!["k"; policy.num_regions()];
            let topology = build(GridShape::new(4, 2), policy, &labels).unwrap();
            for tile in topology.compute_tiles() {
                let containing = topology
                    .regions()
                    .iter()
                    .filter(|r| r.contains(tile.id))
                    .count();
                assert_eq!(containing, 1, "{} under {policy}", tile.id);
            }
        }
    }

    #[test]
    #[should_panic(expected = "needs an even number of columns")]
    fn odd_column_split() {
        build(
            GridShape::new(3, 4),
            RegionAssignmentPolicy::ColumnHalves,
            &["a", "b"],
        )
        .unwrap();
    }

    #[test]
    #[should_panic(expected = "does not fit npu1_4col")]
    fn too_many_rows() {
        build(GridShape::new(4, 5), RegionAssignmentPolicy::Single, &["a"]).unwrap();
    }

    #[test]
    #[should_panic(expected = "requires 2 kernels, 1 given")]
    fn kernel_count_mismatch() {
        build(
            GridShape::new(4, 4),
            RegionAssignmentPolicy::RowHalves,
            &["a"],
        )
        .unwrap();
    }
}
