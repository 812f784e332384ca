//! Halo partitions.
//!
//! Partitions on the border of the partition grid are missing some of their
//! eight neighbors. Instead of special-casing them in every algorithm, each
//! missing neighbor is replaced by a small synthetic tile whose flow
//! directions all point away from the array. Such a tile never contributes
//! inflow, so every real partition can be processed as if it had eight real
//! neighbors.
//!
//! Synthetic tiles come in two kinds:
//!
//! - **Corner** halos are 1×1 tiles placed diagonally outside the four corners
//!   of the array.
//! - **Side** halos border one row or column band of partitions. North and
//!   south side halos have the column extent of their band, west and east
//!   side halos the row extent of theirs.
//!
//! Which of these a partition sees in each of its eight neighbor positions is
//! resolved once per partition, by [`neighbor_slots`].

use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::array::PartitionedArray;
use crate::error::{PartflowError, Result};
use crate::flow_direction::FlowDirection;
use crate::types::{FlowDirectionElement, NeighborOffset, PartitionIndex, Shape};

/// Relative offsets of the eight neighbors, clockwise starting north.
pub const NEIGHBOR_OFFSETS: [NeighborOffset; 8] = [
    [-1, 0],
    [-1, 1],
    [0, 1],
    [1, 1],
    [1, 0],
    [1, -1],
    [0, -1],
    [-1, -1],
];

/// Position of `offset` in [`NEIGHBOR_OFFSETS`].
pub fn neighbor_position(offset: NeighborOffset) -> Option<usize> {
    NEIGHBOR_OFFSETS.iter().position(|o| *o == offset)
}

/// One of the four sides of the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Above the first partition row.
    North,
    /// Right of the last partition column.
    East,
    /// Below the last partition row.
    South,
    /// Left of the first partition column.
    West,
}

impl Side {
    /// All four sides.
    pub const ALL: [Side; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// Direction pointing away from the array across this side.
    pub fn outward(self) -> FlowDirection {
        match self {
            Self::North => FlowDirection::North,
            Self::East => FlowDirection::East,
            Self::South => FlowDirection::South,
            Self::West => FlowDirection::West,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::North => 0,
            Self::East => 1,
            Self::South => 2,
            Self::West => 3,
        }
    }
}

/// One of the four corners of the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    /// Top-left.
    NorthWest,
    /// Top-right.
    NorthEast,
    /// Bottom-right.
    SouthEast,
    /// Bottom-left.
    SouthWest,
}

impl Corner {
    /// All four corners.
    pub const ALL: [Corner; 4] = [
        Self::NorthWest,
        Self::NorthEast,
        Self::SouthEast,
        Self::SouthWest,
    ];

    /// Direction pointing away from the array at this corner.
    pub fn outward(self) -> FlowDirection {
        match self {
            Self::NorthWest => FlowDirection::NorthWest,
            Self::NorthEast => FlowDirection::NorthEast,
            Self::SouthEast => FlowDirection::SouthEast,
            Self::SouthWest => FlowDirection::SouthWest,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::NorthWest => 0,
            Self::NorthEast => 1,
            Self::SouthEast => 2,
            Self::SouthWest => 3,
        }
    }
}

/// What fills one of the eight neighbor positions of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeighborSlot {
    /// A real partition of the array.
    Real(PartitionIndex),
    /// A side halo, bordering row band (west, east) or column band (north,
    /// south) `along`.
    SyntheticEdge {
        /// Side of the array the halo lies on.
        side: Side,
        /// Index of the partition row or column band it borders.
        along: usize,
    },
    /// A corner halo.
    SyntheticCorner(Corner),
}

/// Resolves the neighbor at `offset` of partition `idx`.
pub fn neighbor_slot(grid_shape: Shape, idx: PartitionIndex, offset: NeighborOffset) -> NeighborSlot {
    let row = idx[0].checked_add_signed(isize::from(offset[0])).filter(|r| *r < grid_shape[0]);
    let col = idx[1].checked_add_signed(isize::from(offset[1])).filter(|c| *c < grid_shape[1]);

    match (row, col) {
        (Some(r), Some(c)) => NeighborSlot::Real([r, c]),
        (None, Some(c)) => NeighborSlot::SyntheticEdge {
            side: if offset[0] < 0 { Side::North } else { Side::South },
            along: c,
        },
        (Some(r), None) => NeighborSlot::SyntheticEdge {
            side: if offset[1] < 0 { Side::West } else { Side::East },
            along: r,
        },
        (None, None) => NeighborSlot::SyntheticCorner(match (offset[0] < 0, offset[1] < 0) {
            (true, true) => Corner::NorthWest,
            (true, false) => Corner::NorthEast,
            (false, false) => Corner::SouthEast,
            (false, true) => Corner::SouthWest,
        }),
    }
}

/// Resolves all eight neighbors of partition `idx`, in [`NEIGHBOR_OFFSETS`]
/// order.
pub fn neighbor_slots(grid_shape: Shape, idx: PartitionIndex) -> [NeighborSlot; 8] {
    NEIGHBOR_OFFSETS.map(|offset| neighbor_slot(grid_shape, idx, offset))
}

/// Builds the 1×1 halo tile outside `corner`.
pub fn corner_halo(corner: Corner) -> Array2<FlowDirectionElement> {
    Array2::from_elem((1, 1), corner.outward().code())
}

/// Builds a side halo tile of `extent` cells along `side`.
pub fn side_halo(side: Side, extent: usize) -> Array2<FlowDirectionElement> {
    let shape = match side {
        Side::North | Side::South => (1, extent),
        Side::West | Side::East => (extent, 1),
    };
    Array2::from_elem(shape, side.outward().code())
}

/// Extent of the side halo bordering band `along`, taken from the partition
/// it borders.
pub fn side_halo_extent(side: Side, partition_shape: Shape) -> usize {
    match side {
        Side::North | Side::South => partition_shape[1],
        Side::West | Side::East => partition_shape[0],
    }
}

/// The real partition a side halo borders. Its shape determines the halo's
/// extent.
pub fn bordered_partition(grid_shape: Shape, side: Side, along: usize) -> PartitionIndex {
    match side {
        Side::North => [0, along],
        Side::South => [grid_shape[0].saturating_sub(1), along],
        Side::West => [along, 0],
        Side::East => [along, grid_shape[1].saturating_sub(1)],
    }
}

/// All halo tiles of one partitioned array.
///
/// Built once per run. Every synthetic neighbor a partition task receives is
/// served from here.
#[derive(Debug, Clone)]
pub struct HaloBuilder {
    grid_shape: Shape,
    corners: [Arc<Array2<FlowDirectionElement>>; 4],
    sides: [Vec<Arc<Array2<FlowDirectionElement>>>; 4],
}

impl HaloBuilder {
    /// Builds the corner halos and one side halo per border band of `array`.
    pub fn new(array: &PartitionedArray<FlowDirectionElement>) -> Result<Self> {
        let grid_shape = array.partition_grid_shape();
        let corners = Corner::ALL.map(|corner| Arc::new(corner_halo(corner)));

        let mut sides: [Vec<Arc<Array2<FlowDirectionElement>>>; 4] = Default::default();
        for side in Side::ALL {
            let nr_bands = match side {
                Side::North | Side::South => grid_shape[1],
                Side::West | Side::East => grid_shape[0],
            };
            for along in 0..nr_bands {
                let idx = bordered_partition(grid_shape, side, along);
                let partition = array.partition(idx).ok_or_else(|| {
                    PartflowError::Internal(format!("bordered partition {idx:?} missing"))
                })?;
                let extent = side_halo_extent(side, partition.shape());
                sides[side.index()].push(Arc::new(side_halo(side, extent)));
            }
        }

        Ok(Self {
            grid_shape,
            corners,
            sides,
        })
    }

    /// Shape of the partition grid the halos were built for.
    pub fn grid_shape(&self) -> Shape {
        self.grid_shape
    }

    /// The halo tile for a synthetic slot. `None` for real partitions.
    pub fn halo(&self, slot: NeighborSlot) -> Option<Arc<Array2<FlowDirectionElement>>> {
        match slot {
            NeighborSlot::Real(_) => None,
            NeighborSlot::SyntheticCorner(corner) => Some(Arc::clone(&self.corners[corner.index()])),
            NeighborSlot::SyntheticEdge { side, along } => {
                self.sides[side.index()].get(along).map(Arc::clone)
            }
        }
    }

    /// Collects the eight neighbor tiles of partition `idx`, in
    /// [`NEIGHBOR_OFFSETS`] order.
    pub fn neighbors(
        &self,
        array: &PartitionedArray<FlowDirectionElement>,
        idx: PartitionIndex,
    ) -> Result<[Arc<Array2<FlowDirectionElement>>; 8]> {
        let slots = neighbor_slots(self.grid_shape, idx);
        let mut tiles = Vec::with_capacity(8);
        for slot in slots {
            let tile = match slot {
                NeighborSlot::Real(nb) => array.partition(nb).map(|p| p.data_arc()),
                synthetic => self.halo(synthetic),
            };
            tiles.push(tile.ok_or_else(|| {
                PartflowError::Internal(format!("no tile for neighbor {slot:?} of {idx:?}"))
            })?);
        }
        tiles
            .try_into()
            .map_err(|_| PartflowError::Internal("expected eight neighbor tiles".into()))
    }
}
