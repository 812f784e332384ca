//! The downstream accumulation walk.
//!
//! Starting from a cell whose inflow count is zero, the walk follows flow
//! directions downstream through one partition. Each step decrements the
//! inflow count of the cell entered, and the walk stops at the first cell that
//! still waits for other tributaries. The walk that completes a cell's last
//! tributary is the one that continues through it, so every cell is passed
//! exactly once.
//!
//! What happens along the way is decided by an [`Accumulator`].

use ndarray::Array2;

use crate::error::{PartflowError, Result};
use crate::flow_direction::{Downstream, decode, downstream_cell};
use crate::policy::NoDataPolicy;
use crate::types::{CellIndex, FlowDirectionElement, InflowCountElement, NeighborOffset};

/// Per-cell behavior plugged into [`accumulate`].
pub trait Accumulator {
    /// Material moves from `from` into its downstream cell `to`.
    fn accumulate(&mut self, from: CellIndex, to: CellIndex);

    /// The walk reached `cell`, whose downstream cell lies `step` away in a
    /// neighboring partition.
    fn at_partition_output_cell(&mut self, cell: CellIndex, step: NeighborOffset) -> Result<()>;
}

/// Walks downstream from `start`.
///
/// `inflow_count` is the working copy of the partition's inflow counts and is
/// decremented in place.
///
/// # Errors
/// [`PartflowError::Internal`] if `start` still has pending inflow, or if the
/// walk enters a cell that was already completed. Decoding errors of the flow
/// directions are propagated.
pub fn accumulate<A: Accumulator>(
    accumulator: &mut A,
    start: CellIndex,
    flow_direction: &Array2<FlowDirectionElement>,
    flow_direction_policy: &NoDataPolicy<FlowDirectionElement>,
    inflow_count: &mut Array2<InflowCountElement>,
) -> Result<()> {
    if inflow_count.get(start).copied() != Some(0) {
        return Err(PartflowError::Internal(format!(
            "walk started at {start:?}, which has pending inflow"
        )));
    }

    let (nr, nc) = flow_direction.dim();
    let shape = [nr, nc];
    let mut cell = start;

    loop {
        let code = flow_direction[cell];
        if flow_direction_policy.is_no_data(code) {
            return Err(PartflowError::Internal(format!("walk entered no-data cell {cell:?}")));
        }

        match downstream_cell(decode(code, cell)?, cell, shape) {
            Downstream::Sink => return Ok(()),
            Downstream::Outside(step) => return accumulator.at_partition_output_cell(cell, step),
            Downstream::Within(next) => {
                let count = &mut inflow_count[next];
                if *count == 0 {
                    return Err(PartflowError::Internal(format!(
                        "walk from {cell:?} entered completed cell {next:?}"
                    )));
                }
                *count -= 1;
                accumulator.accumulate(cell, next);

                if *count > 0 {
                    return Ok(());
                }
                cell = next;
            }
        }
    }
}
