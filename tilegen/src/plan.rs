// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Partition planning.
//!
//! Pure arithmetic that decides how a chunk of `S` bytes is cut into blocks
//! of `B` bytes and spread over a grid of `C x R` compute tiles, and how big
//! every derived stream (index bitmaps, carry words, ...) is.
//!
//! No topology is built until a [`PartitionPlan`] has been produced: a size
//! that does not divide evenly is a hard error, it is never rounded.

use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tilegen_track::entity::Entity;
use tilegen_track::{debug, trace};

use crate::types::{GenError, GenResult};

/// A fixed rational scale factor applied to the base sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub num: u64,
    pub den: u64,
}

impl Ratio {
    #[must_use]
    pub const fn new(num: u64, den: u64) -> Self {
        Self { num, den }
    }

    /// Scale `value`, returning `None` if the result is not an integer.
    #[must_use]
    pub fn apply(&self, value: u64) -> Option<u64> {
        if self.den == 0 {
            return None;
        }
        let scaled = u128::from(value) * u128::from(self.num);
        if scaled % u128::from(self.den) != 0 {
            return None;
        }
        u64::try_from(scaled / u128::from(self.den)).ok()
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// One contribution to the size of a derived stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeTerm {
    /// `S * ratio` bytes per chunk, `B * ratio` bytes per block.
    Scaled(Ratio),

    /// A fixed number of bytes for every block of the chunk.
    PerBlock(u64),
}

impl fmt::Display for SizeTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeTerm::Scaled(ratio) => write!(f, "{ratio}"),
            SizeTerm::PerBlock(bytes) => write!(f, "{bytes}B/block"),
        }
    }
}

/// Element type used when a stream is rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    #[default]
    U8,
    I32,
}

impl ElementType {
    #[must_use]
    pub fn num_bytes(&self) -> u64 {
        match self {
            ElementType::U8 => 1,
            ElementType::I32 => 4,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::U8 => write!(f, "ui8"),
            ElementType::I32 => write!(f, "i32"),
        }
    }
}

/// The rule deriving the size of one kind of stream from the base sizes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KindRule {
    pub name: String,
    #[serde(default)]
    pub element: ElementType,
    pub terms: Vec<SizeTerm>,
}

impl KindRule {
    #[must_use]
    pub fn new(name: &str, element: ElementType, terms: &[SizeTerm]) -> Self {
        Self {
            name: name.to_string(),
            element,
            terms: terms.to_vec(),
        }
    }

    /// Raw document bytes.
    #[must_use]
    pub fn data() -> Self {
        Self::new("data", ElementType::U8, &[SizeTerm::Scaled(Ratio::new(1, 1))])
    }

    /// One bit per document byte.
    #[must_use]
    pub fn index() -> Self {
        Self::new("index", ElementType::U8, &[SizeTerm::Scaled(Ratio::new(1, 8))])
    }

    /// One 32-bit escape carry per block.
    #[must_use]
    pub fn carry() -> Self {
        Self::new("carry", ElementType::U8, &[SizeTerm::PerBlock(4)])
    }

    /// Quote bitmap, backslash bitmap and escape carry of every block.
    #[must_use]
    pub fn string() -> Self {
        Self::new(
            "string",
            ElementType::U8,
            &[
                SizeTerm::Scaled(Ratio::new(1, 8)),
                SizeTerm::Scaled(Ratio::new(1, 8)),
                SizeTerm::PerBlock(4),
            ],
        )
    }

    /// Document viewed as 32-bit integers.
    #[must_use]
    pub fn words() -> Self {
        Self::new("words", ElementType::I32, &[SizeTerm::Scaled(Ratio::new(1, 1))])
    }

    fn describe(&self) -> String {
        self.terms
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

/// The kinds every generator knows about without configuration.
#[must_use]
pub fn builtin_kinds() -> Vec<KindRule> {
    vec![
        KindRule::data(),
        KindRule::index(),
        KindRule::carry(),
        KindRule::string(),
        KindRule::words(),
    ]
}

/// Shape of the compute grid (staging/buffering rows excluded).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub cols: usize,
    pub rows: usize,
}

impl GridShape {
    #[must_use]
    pub fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    #[must_use]
    pub fn num_tiles(&self) -> usize {
        self.cols * self.rows
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// The sizes derived for one kind of stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KindPlan {
    pub kind: String,
    pub element: ElementType,
    pub chunk_size: u64,
    pub block_size: u64,
    pub num_blocks: u64,
}

/// The validated partitioning of one chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub total_size: u64,
    pub block_size: u64,
    pub grid: GridShape,
    pub num_blocks: u64,
    pub blocks_per_tile: u64,
    pub kinds: Vec<KindPlan>,
}

impl PartitionPlan {
    pub fn kind(&self, name: &str) -> GenResult<&KindPlan> {
        self.kinds.iter().find(|k| k.kind == name).ok_or_else(|| {
            GenError::UnsupportedKernel(format!("No data kind '{name}' has been declared"))
        })
    }

    /// Enumeration index of a compute tile: rows within a column, then
    /// columns.
    #[must_use]
    pub fn tile_index(&self, col: usize, row: usize) -> usize {
        col * self.grid.rows + row
    }

    /// Offset of tile `i` within one round of the enumeration, where a round
    /// is every tile taking exactly one block.
    #[must_use]
    pub fn tile_offset(&self, tile_index: usize) -> u64 {
        tile_index as u64 * self.block_size
    }

    #[must_use]
    pub fn tile_offsets(&self) -> Vec<u64> {
        (0..self.grid.num_tiles())
            .map(|i| self.tile_offset(i))
            .collect()
    }

    /// Byte ranges of the chunk processed by a compute tile when the host
    /// hands each column a contiguous share.
    #[must_use]
    pub fn tile_block_ranges(&self, col: usize, row: usize) -> Vec<Range<u64>> {
        tile_slices(
            self.total_size,
            self.block_size,
            self.grid.cols,
            self.grid.rows,
            col,
            row,
        )
    }
}

/// Byte ranges of a `chunk_size` buffer processed by the tile at (`col`,
/// `row`) of a `cols x rows` group.
///
/// Each column receives a contiguous `chunk_size / cols` share which is then
/// dealt out one block per row in turn.
#[must_use]
pub fn tile_slices(
    chunk_size: u64,
    block_size: u64,
    cols: usize,
    rows: usize,
    col: usize,
    row: usize,
) -> Vec<Range<u64>> {
    let column_share = chunk_size / cols as u64;
    let blocks_per_tile = column_share / block_size / rows as u64;
    let column_base = column_share * col as u64;
    (0..blocks_per_tile)
        .map(|round| {
            let start = column_base + (round * rows as u64 + row as u64) * block_size;
            start..start + block_size
        })
        .collect()
}

fn divisibility_error(rule: &KindRule, ratio: &str, reason: String) -> GenError {
    GenError::SizeDivisibility {
        kind: rule.name.clone(),
        ratio: ratio.to_string(),
        reason,
    }
}

/// Computes and validates [`PartitionPlan`]s.
pub struct PartitionPlanner {
    entity: Rc<Entity>,
}

impl PartitionPlanner {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "planner")),
        }
    }

    /// Partition `total_size` bytes into `block_size` blocks over `grid`
    /// and derive the size of every kind in `rules`.
    pub fn plan(
        &self,
        total_size: u64,
        block_size: u64,
        grid: GridShape,
        rules: &[KindRule],
    ) -> GenResult<PartitionPlan> {
        if grid.cols == 0 || grid.rows == 0 {
            return Err(GenError::InvalidGrid(format!(
                "Grid {grid} must have at least one column and one row"
            )));
        }

        let base = KindRule::data();
        if block_size == 0 {
            return Err(divisibility_error(
                &base,
                "1/1",
                "block size must be non-zero".to_string(),
            ));
        }
        if total_size % block_size != 0 {
            return Err(divisibility_error(
                &base,
                "1/1",
                format!("total size {total_size} is not a multiple of block size {block_size}"),
            ));
        }

        let num_blocks = total_size / block_size;
        let num_tiles = grid.num_tiles() as u64;
        if num_blocks == 0 || num_blocks % num_tiles != 0 {
            return Err(divisibility_error(
                &base,
                "1/1",
                format!(
                    "total size {total_size} does not divide across block size {block_size} x {num_tiles} tiles"
                ),
            ));
        }

        debug!(self.entity ; "{total_size} bytes = {num_blocks} blocks of {block_size} over {grid} tiles");

        let mut kinds = Vec::with_capacity(rules.len());
        for rule in rules {
            let kind = self.plan_kind(rule, total_size, block_size, num_blocks, num_tiles)?;
            trace!(self.entity ; "kind {}: chunk {} block {}", kind.kind, kind.chunk_size, kind.block_size);
            kinds.push(kind);
        }

        Ok(PartitionPlan {
            total_size,
            block_size,
            grid,
            num_blocks,
            blocks_per_tile: num_blocks / num_tiles,
            kinds,
        })
    }

    fn plan_kind(
        &self,
        rule: &KindRule,
        total_size: u64,
        block_size: u64,
        num_blocks: u64,
        num_tiles: u64,
    ) -> GenResult<KindPlan> {
        if rule.terms.is_empty() {
            return Err(divisibility_error(
                rule,
                "",
                "no size terms declared".to_string(),
            ));
        }

        let ratio = rule.describe();
        let overflow = |what: String| {
            divisibility_error(rule, &ratio, format!("{what} does not fit in 64 bits"))
        };

        let mut chunk_size = 0u64;
        let mut kind_block_size = 0u64;
        for term in &rule.terms {
            let (chunk_part, block_part) = match term {
                SizeTerm::Scaled(ratio) => {
                    let chunk_part = ratio.apply(total_size).ok_or_else(|| {
                        divisibility_error(
                            rule,
                            &ratio.to_string(),
                            format!("{total_size} * {ratio} is not an integer"),
                        )
                    })?;
                    let block_part = ratio.apply(block_size).ok_or_else(|| {
                        divisibility_error(
                            rule,
                            &ratio.to_string(),
                            format!("{block_size} * {ratio} is not an integer"),
                        )
                    })?;
                    (chunk_part, block_part)
                }
                SizeTerm::PerBlock(bytes) => {
                    let chunk_part = num_blocks
                        .checked_mul(*bytes)
                        .ok_or_else(|| overflow(format!("{num_blocks} blocks * {bytes} bytes")))?;
                    (chunk_part, *bytes)
                }
            };
            chunk_size = chunk_size
                .checked_add(chunk_part)
                .ok_or_else(|| overflow("chunk size".to_string()))?;
            kind_block_size = kind_block_size
                .checked_add(block_part)
                .ok_or_else(|| overflow("block size".to_string()))?;
        }

        if kind_block_size == 0 {
            return Err(divisibility_error(
                rule,
                &ratio,
                "derived block size is zero".to_string(),
            ));
        }
        if kind_block_size % rule.element.num_bytes() != 0 {
            return Err(divisibility_error(
                rule,
                &ratio,
                format!(
                    "derived block size {kind_block_size} is not a whole number of {} elements",
                    rule.element
                ),
            ));
        }
        if chunk_size % kind_block_size != 0 || (chunk_size / kind_block_size) % num_tiles != 0 {
            return Err(divisibility_error(
                rule,
                &ratio,
                format!(
                    "derived size {chunk_size} does not divide across block size {kind_block_size} x {num_tiles} tiles"
                ),
            ));
        }

        Ok(KindPlan {
            kind: rule.name.clone(),
            element: rule.element,
            chunk_size,
            block_size: kind_block_size,
            num_blocks: chunk_size / kind_block_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use tilegen_track::dev_null_tracker;
    use tilegen_track::entity::toplevel;

    use super::*;

    fn planner() -> PartitionPlanner {
        let top = toplevel(&dev_null_tracker(), "test");
        PartitionPlanner::new(&top)
    }

    #[test]
    fn ratio_apply() {
        assert_eq!(Ratio::new(1, 8).apply(1024), Some(128));
        assert_eq!(Ratio::new(1, 8).apply(1023), None);
        assert_eq!(Ratio::new(3, 2).apply(4), Some(6));
        assert_eq!(Ratio::new(1, 0).apply(4), None);
    }

    #[test]
    fn indexing_kinds() {
        let plan = planner()
            .plan(4_096_000, 1024, GridShape::new(4, 4), &builtin_kinds())
            .unwrap();
        assert_eq!(plan.num_blocks, 4000);
        assert_eq!(plan.blocks_per_tile, 250);

        let index = plan.kind("index").unwrap();
        assert_eq!(index.chunk_size, 512_000);
        assert_eq!(index.block_size, 128);

        let carry = plan.kind("carry").unwrap();
        assert_eq!(carry.chunk_size, 16_000);
        assert_eq!(carry.block_size, 4);

        let string = plan.kind("string").unwrap();
        assert_eq!(string.block_size, 260);
        assert_eq!(string.chunk_size, 1_040_000);
        assert_eq!(string.num_blocks, 4000);
    }

    #[test]
    fn fractional_block_is_rejected() {
        let err = planner()
            .plan(8 * 12, 12, GridShape::new(1, 1), &[KindRule::index()])
            .unwrap_err();
        match err {
            GenError::SizeDivisibility { kind, ratio, .. } => {
                assert_eq!(kind, "index");
                assert_eq!(ratio, "1/8");
            }
            e => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn i32_kind_needs_whole_words() {
        let rule = KindRule::new("odd", ElementType::I32, &[SizeTerm::PerBlock(6)]);
        let err = planner()
            .plan(64, 8, GridShape::new(1, 1), &[rule])
            .unwrap_err();
        assert!(format!("{err}").contains("whole number of i32 elements"));
    }

    #[test]
    fn oversized_kind_is_rejected() {
        let rule = KindRule::new("huge", ElementType::U8, &[SizeTerm::PerBlock(u64::MAX / 2)]);
        let err = planner()
            .plan(4096, 1024, GridShape::new(1, 1), &[rule])
            .unwrap_err();
        match err {
            GenError::SizeDivisibility { kind, reason, .. } => {
                assert_eq!(kind, "huge");
                assert!(reason.contains("does not fit in 64 bits"), "{reason}");
            }
            e => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn summed_terms_overflow() {
        let rule = KindRule::new(
            "wide",
            ElementType::U8,
            &[SizeTerm::PerBlock(u64::MAX / 4), SizeTerm::PerBlock(u64::MAX / 4)],
        );
        let err = planner()
            .plan(4, 1, GridShape::new(1, 1), &[rule])
            .unwrap_err();
        assert!(format!("{err}").contains("kind 'wide'"));
    }

    #[test]
    fn empty_grid() {
        let err = planner()
            .plan(1024, 1024, GridShape::new(0, 4), &[])
            .unwrap_err();
        assert!(matches!(err, GenError::InvalidGrid(_)));
    }
}
