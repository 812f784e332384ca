//! Per-partition inflow counting.
//!
//! The inflow count of a cell is the number of its eight neighbors whose flow
//! direction points at it. Neighbors in adjacent partitions are included, so a
//! partition task needs its own tile plus the eight neighbor tiles (real or
//! halo). Only the strip of each neighbor that touches the partition is read.
//!
//! Cells receiving inflow from a neighbor partition are *partition input
//! cells*. They are reported sorted row-major, one entry per feeding neighbor
//! cell, so a cell fed by two cells across the border is listed twice.

use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::array::PartitionedArray;
use crate::error::{PartflowError, Result};
use crate::flow_direction::{FlowDirection, decode};
use crate::halo::{NEIGHBOR_OFFSETS, neighbor_position};
use crate::policy::{NoDataPolicy, Policies};
use crate::spawn::spawn_neighborhood_tasks;
use crate::types::{CellIndex, FlowDirectionElement, InflowCountElement, PartitionIndex, Shape};

/// A partition tile together with its eight neighbor tiles.
///
/// Neighbor tiles are given in [`NEIGHBOR_OFFSETS`] order. Coordinates used by
/// [`Neighborhood::get`] are in the frame of the center tile: row `-1` is the
/// last row of the northern neighbors, column `ncols` is the first column of
/// the eastern ones.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    center: Arc<Array2<FlowDirectionElement>>,
    neighbors: [Arc<Array2<FlowDirectionElement>>; 8],
}

impl Neighborhood {
    /// Validates and wraps a center tile and its neighbors.
    ///
    /// # Errors
    /// [`PartflowError::MalformedPartitionGeometry`] if a neighbor does not
    /// line up with the center: northern and southern neighbors must match its
    /// column extent, western and eastern ones its row extent, and every
    /// neighbor must hold at least one cell.
    pub fn new(
        center: Arc<Array2<FlowDirectionElement>>,
        neighbors: [Arc<Array2<FlowDirectionElement>>; 8],
    ) -> Result<Self> {
        let (nr, nc) = center.dim();
        for (offset, tile) in NEIGHBOR_OFFSETS.iter().zip(neighbors.iter()) {
            let (tr, tc) = tile.dim();
            let fits = match offset {
                [-1 | 1, 0] => tc == nc && tr > 0,
                [0, -1 | 1] => tr == nr && tc > 0,
                _ => tr > 0 && tc > 0,
            };
            if !fits {
                return Err(PartflowError::MalformedPartitionGeometry(format!(
                    "neighbor at offset {offset:?} has shape [{tr}, {tc}], center has shape [{nr}, {nc}]"
                )));
            }
        }
        Ok(Self { center, neighbors })
    }

    /// Center tile.
    pub fn center(&self) -> &Array2<FlowDirectionElement> {
        &self.center
    }

    /// Neighbor tiles, in [`NEIGHBOR_OFFSETS`] order.
    pub fn neighbors(&self) -> &[Arc<Array2<FlowDirectionElement>>; 8] {
        &self.neighbors
    }

    /// Extent of the center tile.
    pub fn shape(&self) -> Shape {
        let (nr, nc) = self.center.dim();
        [nr, nc]
    }

    /// Value at `[row, col]` in the center frame. `None` beyond the
    /// one-cell ring around the center.
    pub fn get(&self, row: isize, col: isize) -> Option<FlowDirectionElement> {
        let [nr, nc] = self.shape();
        let (nr, nc) = (nr as isize, nc as isize);
        if row < -1 || row > nr || col < -1 || col > nc {
            return None;
        }

        let vertical = if row < 0 { -1 } else if row >= nr { 1 } else { 0 };
        let horizontal = if col < 0 { -1 } else if col >= nc { 1 } else { 0 };

        if vertical == 0 && horizontal == 0 {
            return self.center.get((row as usize, col as usize)).copied();
        }

        let position = neighbor_position([vertical, horizontal])?;
        let tile = &self.neighbors[position];
        let (tr, tc) = tile.dim();
        let r = match vertical {
            -1 => tr - 1,
            1 => 0,
            _ => row as usize,
        };
        let c = match horizontal {
            -1 => tc - 1,
            1 => 0,
            _ => col as usize,
        };
        tile.get((r, c)).copied()
    }
}

/// Inflow counts of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflowCount {
    /// Number of neighbors draining into each cell. No-data cells hold 0, or
    /// the marking value of the inflow count policy.
    pub counts: Array2<InflowCountElement>,
    /// Cells receiving inflow across the partition border, sorted, with one
    /// entry per feeding neighbor cell.
    pub input_cells: Vec<CellIndex>,
}

/// Counts inflow for every cell of the center tile.
///
/// No-data cells get a count of 0 here, regardless of the output policy.
pub(crate) fn count_inflow(
    neighborhood: &Neighborhood,
    flow_direction_policy: &NoDataPolicy<FlowDirectionElement>,
) -> Result<InflowCount> {
    let [nr, nc] = neighborhood.shape();
    let mut counts = Array2::<InflowCountElement>::zeros((nr, nc));
    let mut input_cells = Vec::new();

    for r in 0..nr {
        for c in 0..nc {
            let (ri, ci) = (r as isize, c as isize);
            let Some(code) = neighborhood.get(ri, ci) else {
                continue;
            };
            if flow_direction_policy.is_no_data(code) {
                continue;
            }

            // A valid cell may not drain into no-data.
            let direction = decode(code, [r, c])?;
            if direction != FlowDirection::Sink {
                let [dr, dc] = direction.offset();
                let to = [ri + isize::from(dr), ci + isize::from(dc)];
                if let Some(target) = neighborhood.get(to[0], to[1])
                    && flow_direction_policy.is_no_data(target)
                {
                    return Err(PartflowError::FlowIntoNoData { from: [r, c], to });
                }
            }

            let mut count: InflowCountElement = 0;
            for [dr, dc] in NEIGHBOR_OFFSETS {
                let (nbr, nbc) = (ri + isize::from(dr), ci + isize::from(dc));
                let Some(nb_code) = neighborhood.get(nbr, nbc) else {
                    continue;
                };
                if flow_direction_policy.is_no_data(nb_code) {
                    continue;
                }
                // Invalid codes in neighbor tiles are reported by the task
                // owning that tile.
                let Some(nb_direction) = FlowDirection::from_code(nb_code) else {
                    continue;
                };
                if nb_direction.offset() == [-dr, -dc] {
                    count += 1;
                    let outside = nbr < 0 || nbc < 0 || nbr >= nr as isize || nbc >= nc as isize;
                    if outside {
                        input_cells.push([r, c]);
                    }
                }
            }
            counts[[r, c]] = count;
        }
    }

    // Row-major traversal already yields sorted input cells.
    debug_assert!(input_cells.windows(2).all(|w| w[0] <= w[1]));

    Ok(InflowCount {
        counts,
        input_cells,
    })
}

/// Computes the inflow count of one partition.
///
/// No-data cells in the flow-direction tile are marked according to the
/// inflow count policy.
pub fn inflow_count_partition(neighborhood: &Neighborhood, policies: &Policies) -> Result<InflowCount> {
    let mut result = count_inflow(neighborhood, &policies.flow_direction)?;
    for (count, code) in result.counts.iter_mut().zip(neighborhood.center().iter()) {
        if policies.flow_direction.is_no_data(*code) {
            policies.inflow_count.mark_no_data(count);
        }
    }
    Ok(result)
}

/// Computes the inflow count of every partition of `flow_direction`.
///
/// The result has the same partition layout as the input.
pub fn inflow_count(
    flow_direction: &PartitionedArray<FlowDirectionElement>,
    policies: &Policies,
) -> Result<PartitionedArray<InflowCountElement>> {
    let results = spawn_neighborhood_tasks(flow_direction, &|_: PartitionIndex, neighborhood: &Neighborhood| {
        inflow_count_partition(neighborhood, policies)
    })?;
    let tiles = results.into_inner().into_iter().map(|result| result.counts);
    PartitionedArray::with_layout_of(flow_direction, tiles)
}
