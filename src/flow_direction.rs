//! Flow direction codes and neighbor geometry.
//!
//! Codes follow the numeric keypad layout used by local drain direction
//! rasters:
//!
//! ```text
//! 7 8 9
//! 4 5 6
//! 1 2 3
//! ```
//!
//! Code 5 is a sink. Every other code points at one of the eight neighbors.

use serde::{Deserialize, Serialize};

use crate::error::{PartflowError, Result};
use crate::types::{CellIndex, FlowDirectionElement, NeighborOffset, Shape};

/// One of the eight flow directions, or a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowDirection {
    /// North.
    North,
    /// North-east.
    NorthEast,
    /// East.
    East,
    /// South-east.
    SouthEast,
    /// South.
    South,
    /// South-west.
    SouthWest,
    /// West.
    West,
    /// North-west.
    NorthWest,
    /// No downstream cell.
    Sink,
}

impl FlowDirection {
    /// All nine directions, in clockwise order starting north, followed by sink.
    pub const ALL: [FlowDirection; 9] = [
        Self::North,
        Self::NorthEast,
        Self::East,
        Self::SouthEast,
        Self::South,
        Self::SouthWest,
        Self::West,
        Self::NorthWest,
        Self::Sink,
    ];

    /// The eight directions that point at a neighbor.
    pub const NEIGHBORS: [FlowDirection; 8] = [
        Self::North,
        Self::NorthEast,
        Self::East,
        Self::SouthEast,
        Self::South,
        Self::SouthWest,
        Self::West,
        Self::NorthWest,
    ];

    /// Decodes a raster value. Returns `None` for values outside `1..=9`.
    pub fn from_code(code: FlowDirectionElement) -> Option<Self> {
        match code {
            1 => Some(Self::SouthWest),
            2 => Some(Self::South),
            3 => Some(Self::SouthEast),
            4 => Some(Self::West),
            5 => Some(Self::Sink),
            6 => Some(Self::East),
            7 => Some(Self::NorthWest),
            8 => Some(Self::North),
            9 => Some(Self::NorthEast),
            _ => None,
        }
    }

    /// Raster value of this direction.
    pub fn code(self) -> FlowDirectionElement {
        match self {
            Self::SouthWest => 1,
            Self::South => 2,
            Self::SouthEast => 3,
            Self::West => 4,
            Self::Sink => 5,
            Self::East => 6,
            Self::NorthWest => 7,
            Self::North => 8,
            Self::NorthEast => 9,
        }
    }

    /// `[drow, dcol]` step to the downstream cell. `[0, 0]` for a sink.
    pub fn offset(self) -> NeighborOffset {
        match self {
            Self::North => [-1, 0],
            Self::NorthEast => [-1, 1],
            Self::East => [0, 1],
            Self::SouthEast => [1, 1],
            Self::South => [1, 0],
            Self::SouthWest => [1, -1],
            Self::West => [0, -1],
            Self::NorthWest => [-1, -1],
            Self::Sink => [0, 0],
        }
    }

    /// Inverse of [`FlowDirection::offset`].
    pub fn from_offset(offset: NeighborOffset) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.offset() == offset)
    }
}

/// Shorthand raster codes, handy when writing fixtures.
pub mod codes {
    use super::FlowDirectionElement;

    /// South-west.
    pub const SW: FlowDirectionElement = 1;
    /// South.
    pub const S: FlowDirectionElement = 2;
    /// South-east.
    pub const SE: FlowDirectionElement = 3;
    /// West.
    pub const W: FlowDirectionElement = 4;
    /// Sink.
    pub const SINK: FlowDirectionElement = 5;
    /// East.
    pub const E: FlowDirectionElement = 6;
    /// North-west.
    pub const NW: FlowDirectionElement = 7;
    /// North.
    pub const N: FlowDirectionElement = 8;
    /// North-east.
    pub const NE: FlowDirectionElement = 9;
}

/// Where a cell's flow goes, relative to the partition holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downstream {
    /// Sink cell.
    Sink,
    /// Downstream cell within the same partition.
    Within(CellIndex),
    /// Downstream cell lies in a neighboring partition. Carries the step.
    Outside(NeighborOffset),
}

/// Adds a signed step to an index, returning `None` when the result leaves
/// `0..extent`.
pub(crate) fn step_index(idx: usize, step: i8, extent: usize) -> Option<usize> {
    let next = idx.checked_add_signed(isize::from(step))?;
    (next < extent).then_some(next)
}

/// Resolves the downstream cell of `cell` for a decoded direction.
pub fn downstream_cell(direction: FlowDirection, cell: CellIndex, shape: Shape) -> Downstream {
    if direction == FlowDirection::Sink {
        return Downstream::Sink;
    }
    let step = direction.offset();
    match (
        step_index(cell[0], step[0], shape[0]),
        step_index(cell[1], step[1], shape[1]),
    ) {
        (Some(r), Some(c)) => Downstream::Within([r, c]),
        _ => Downstream::Outside(step),
    }
}

/// Decodes the value at `cell`, reporting codes outside `1..=9` as
/// [`PartflowError::InvalidFlowDirection`].
pub fn decode(code: FlowDirectionElement, cell: CellIndex) -> Result<FlowDirection> {
    FlowDirection::from_code(code).ok_or(PartflowError::InvalidFlowDirection { code, cell })
}
