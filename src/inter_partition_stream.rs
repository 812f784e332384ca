//! Inter-partition stream classification.
//!
//! For every partition, this operation determines which cells carry material
//! that entered the partition across its border (*inter-partition stream
//! cells*) and which only carry material originating inside the partition
//! (*intra-partition stream cells*). Along the way it records, for each
//! border cell whose flow leaves the partition, what leaves: the global
//! indices of the input cells upstream of it, its stream class, and the number
//! of cells of this partition draining through it.
//!
//! Each partition is processed by an independent task in two phases:
//!
//! 1. **Phase A** walks downstream from every cell without upstream
//!    neighbors, in row-major order, tagging cells as intra-partition.
//! 2. **Phase B** seeds every partition input cell, in ascending order, with
//!    one copy of its global index per neighbor cell feeding it, tags it as
//!    inter-partition, and continues walking once all of its upstream
//!    contributions are in.
//!
//! Because phase A runs first, material reaching a confluence from both an
//! intra-partition tributary and an input cell is always completed by the
//! phase B walk, so such cells end up inter-partition.
//!
//! The results are the stream class of every cell and an
//! [`ArrayPartitionIO`] per partition. Merging the IO records across
//! partitions is left to the caller.

use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::accumulate::{Accumulator, accumulate};
use crate::array::{ComponentArray, PartitionedArray};
use crate::error::{PartflowError, Result};
use crate::inflow_count::{Neighborhood, count_inflow};
use crate::partition_io::ArrayPartitionIO;
use crate::policy::{NoDataPolicy, Policies};
use crate::spawn::spawn_neighborhood_tasks;
use crate::types::{
    CellIndex, Count, FlowDirectionElement, INTER_PARTITION_STREAM_CELL,
    INTRA_PARTITION_STREAM_CELL, InflowCountElement, NeighborOffset, Offset, PartitionIndex,
    StreamClass,
};

/// What an output cell passes on to the partition downstream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterPartitionStreamMaterial {
    /// Global indices of the input cells upstream of the output cell, sorted,
    /// one entry per neighbor cell feeding each input cell.
    pub input_cells: Vec<CellIndex>,
    /// Stream class of the output cell.
    pub stream_class: StreamClass,
    /// Number of cells of the partition draining through the output cell,
    /// the output cell included.
    pub count: Count,
}

/// IO record of one partition.
pub type PartitionIO = ArrayPartitionIO<InterPartitionStreamMaterial>;

/// Result of one partition task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStreamResult {
    /// Position of the partition in the global array.
    pub offset: Offset,
    /// Stream class per cell.
    pub stream_class: Array2<StreamClass>,
    /// Input and output cells.
    pub partition_io: PartitionIO,
}

/// [`Accumulator`] classifying cells and filling a [`PartitionIO`].
#[derive(Debug)]
pub struct StreamAccumulator {
    partition_offset: Offset,
    pending: Array2<Vec<CellIndex>>,
    stream_class: Array2<StreamClass>,
    count: Array2<Count>,
    active: StreamClass,
    partition_io: PartitionIO,
}

impl StreamAccumulator {
    /// Creates the accumulator for a partition at `partition_offset`.
    ///
    /// Every valid cell starts with a count of one. No-data cells get a count
    /// of zero and are marked through `stream_class_policy`.
    pub fn new(
        partition_offset: Offset,
        flow_direction: &Array2<FlowDirectionElement>,
        flow_direction_policy: &NoDataPolicy<FlowDirectionElement>,
        stream_class_policy: &NoDataPolicy<StreamClass>,
        input_cells: Vec<CellIndex>,
    ) -> Self {
        let (nr, nc) = flow_direction.dim();
        let mut stream_class = Array2::from_elem((nr, nc), INTRA_PARTITION_STREAM_CELL);
        let mut count = Array2::from_elem((nr, nc), 1);

        for ((r, c), code) in flow_direction.indexed_iter() {
            if flow_direction_policy.is_no_data(*code) {
                stream_class_policy.mark_no_data(&mut stream_class[[r, c]]);
                count[[r, c]] = 0;
            }
        }

        Self {
            partition_offset,
            pending: Array2::from_elem((nr, nc), Vec::new()),
            stream_class,
            count,
            active: INTRA_PARTITION_STREAM_CELL,
            partition_io: ArrayPartitionIO::new([nr, nc], input_cells),
        }
    }

    /// Starts a walk at `cell` with the given class.
    fn enter(&mut self, cell: CellIndex, stream_class: StreamClass) {
        self.active = stream_class;
        self.stream_class[cell] = stream_class;
    }

    /// Adds `nr_feeders` copies of the global index of input cell `cell` to
    /// its pending material.
    fn seed(&mut self, cell: CellIndex, nr_feeders: usize) {
        let global = [
            self.partition_offset[0] + cell[0],
            self.partition_offset[1] + cell[1],
        ];
        self.pending[cell].extend(std::iter::repeat_n(global, nr_feeders));
    }

    /// The IO record filled so far.
    pub fn partition_io(&self) -> &PartitionIO {
        &self.partition_io
    }

    /// Stream classes assigned so far.
    pub fn stream_class(&self) -> &Array2<StreamClass> {
        &self.stream_class
    }

    fn into_parts(self) -> (Array2<StreamClass>, PartitionIO) {
        (self.stream_class, self.partition_io)
    }
}

impl Accumulator for StreamAccumulator {
    fn accumulate(&mut self, from: CellIndex, to: CellIndex) {
        let material = std::mem::take(&mut self.pending[from]);
        let pending = &mut self.pending[to];
        if pending.is_empty() {
            *pending = material;
        } else {
            pending.extend(material);
        }
        self.stream_class[to] = self.active;
        self.count[to] += self.count[from];
    }

    fn at_partition_output_cell(&mut self, cell: CellIndex, step: NeighborOffset) -> Result<()> {
        let mut input_cells = std::mem::take(&mut self.pending[cell]);
        input_cells.sort_unstable();
        self.partition_io.add_output_cell(
            cell,
            step,
            InterPartitionStreamMaterial {
                input_cells,
                stream_class: self.stream_class[cell],
                count: self.count[cell],
            },
        )
    }
}

/// Processes one partition, given its neighborhood.
///
/// Runs inflow counting, then phase A, then phase B, and checks that every
/// cell was reached.
///
/// # Errors
/// - [`PartflowError::UnresolvedInputCells`] if input cells still wait for
///   upstream material after phase B.
/// - [`PartflowError::CyclicFlowDirection`] if other cells were never
///   reached.
/// - Errors of inflow counting and of the walk are propagated.
pub fn inter_partition_stream_partition(
    idx: PartitionIndex,
    partition_offset: Offset,
    neighborhood: &Neighborhood,
    policies: &Policies,
) -> Result<PartitionStreamResult> {
    let flow_direction = neighborhood.center();
    let fd_policy = &policies.flow_direction;

    let inflow = count_inflow(neighborhood, fd_policy)?;
    let mut remaining: Array2<InflowCountElement> = inflow.counts.clone();

    let mut accumulator = StreamAccumulator::new(
        partition_offset,
        flow_direction,
        fd_policy,
        &policies.stream_class,
        inflow.input_cells,
    );

    // Phase A. Ridge cells are selected on the counts as they were before
    // any walk started.
    for ((r, c), code) in flow_direction.indexed_iter() {
        if fd_policy.is_no_data(*code) || inflow.counts[[r, c]] != 0 {
            continue;
        }
        accumulator.enter([r, c], INTRA_PARTITION_STREAM_CELL);
        accumulate(&mut accumulator, [r, c], flow_direction, fd_policy, &mut remaining)?;
    }

    // Phase B.
    let input_cells = accumulator.partition_io().input_cells().to_vec();
    for run in input_cells.chunk_by(|a, b| a == b) {
        let cell = run[0];
        let nr_feeders = run.len();

        let left = usize::from(remaining[cell]).checked_sub(nr_feeders).ok_or_else(|| {
            PartflowError::Internal(format!(
                "input cell {cell:?} of partition {idx:?} is fed by more cells than its inflow count"
            ))
        })?;
        remaining[cell] = InflowCountElement::try_from(left)
            .map_err(|e| PartflowError::Internal(e.to_string()))?;

        accumulator.enter(cell, INTER_PARTITION_STREAM_CELL);
        accumulator.seed(cell, nr_feeders);

        if left == 0 {
            accumulate(&mut accumulator, cell, flow_direction, fd_policy, &mut remaining)?;
        }
    }

    let (stream_class, mut partition_io) = accumulator.into_parts();

    // An input cell is resolved once all material upstream of it arrived.
    let resolved: Vec<CellIndex> = partition_io
        .unresolved_input_cells()
        .copied()
        .filter(|cell| remaining[*cell] == 0)
        .collect();
    for cell in resolved {
        partition_io.resolve_input_cell(cell);
    }

    if !partition_io.is_solved() {
        return Err(PartflowError::UnresolvedInputCells {
            partition: idx,
            cells: partition_io.unresolved_input_cells().copied().collect(),
        });
    }

    let unreached: Vec<CellIndex> = remaining
        .indexed_iter()
        .filter(|(_, count)| **count != 0)
        .map(|((r, c), _)| [r, c])
        .collect();
    if !unreached.is_empty() {
        return Err(PartflowError::CyclicFlowDirection {
            partition: idx,
            cells: unreached,
        });
    }

    Ok(PartitionStreamResult {
        offset: partition_offset,
        stream_class,
        partition_io,
    })
}

/// Classifies the stream cells of every partition of `flow_direction`.
///
/// Returns the stream class array, with the same partition layout as the
/// input, and the IO record of every partition.
pub fn inter_partition_stream(
    flow_direction: &PartitionedArray<FlowDirectionElement>,
    policies: &Policies,
) -> Result<(PartitionedArray<StreamClass>, ComponentArray<PartitionIO>)> {
    debug!(
        "inter-partition stream: array {:?}, {} partition(s)",
        flow_direction.shape(),
        flow_direction.nr_partitions()
    );

    let results = spawn_neighborhood_tasks(
        flow_direction,
        &|idx: PartitionIndex, neighborhood: &Neighborhood| {
            let offset = flow_direction
                .partition(idx)
                .map(|p| p.offset())
                .ok_or_else(|| PartflowError::Internal(format!("no partition {idx:?}")))?;
            inter_partition_stream_partition(idx, offset, neighborhood, policies)
        },
    )?;

    let [nr, nc] = results.grid_shape();
    let mut stream_classes = Vec::with_capacity(nr * nc);
    let mut ios = Vec::with_capacity(nr * nc);
    for result in results.into_inner() {
        stream_classes.push(result.stream_class);
        ios.push(result.partition_io);
    }

    let stream_class = PartitionedArray::with_layout_of(flow_direction, stream_classes)?;
    let ios = Array2::from_shape_vec((nr, nc), ios)
        .map_err(|e| PartflowError::Internal(format!("partition IO grid: {e}")))?;

    let nr_output_cells: usize = ios.iter().map(PartitionIO::nr_output_cells).sum();
    debug!("inter-partition stream done, {nr_output_cells} output cell(s)");

    Ok((stream_class, ComponentArray::new(ios)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::flow_direction::codes::*;
    use crate::halo::{Corner, Side, corner_halo, side_halo};
    use ndarray::array;

    /// Surrounds `center` with halo tiles, except for a real western neighbor.
    fn with_west(center: Array2<u8>, west: Array2<u8>) -> Result<Neighborhood> {
        let (nr, nc) = center.dim();
        Neighborhood::new(
            Arc::new(center),
            [
                Arc::new(side_halo(Side::North, nc)),
                Arc::new(corner_halo(Corner::NorthEast)),
                Arc::new(side_halo(Side::East, nr)),
                Arc::new(corner_halo(Corner::SouthEast)),
                Arc::new(side_halo(Side::South, nc)),
                Arc::new(corner_halo(Corner::SouthWest)),
                Arc::new(west),
                Arc::new(corner_halo(Corner::NorthWest)),
            ],
        )
    }

    #[test]
    fn test_accumulator_carries_input_material() -> Result<()> {
        let fd = array![[E, E, E]];
        let mut acc = StreamAccumulator::new(
            [10, 20],
            &fd,
            &NoDataPolicy::AllValuesValid,
            &NoDataPolicy::AllValuesValid,
            vec![[0, 0], [0, 0]],
        );

        acc.enter([0, 0], INTER_PARTITION_STREAM_CELL);
        acc.seed([0, 0], 2);
        acc.accumulate([0, 0], [0, 1]);
        acc.accumulate([0, 1], [0, 2]);
        acc.at_partition_output_cell([0, 2], [0, 1])?;

        assert_eq!(acc.stream_class(), &array![[1, 1, 1]]);
        let output = acc
            .partition_io()
            .output_cell([0, 2])
            .ok_or_else(|| PartflowError::Internal("missing output".into()))?;
        assert_eq!(
            output.value,
            InterPartitionStreamMaterial {
                input_cells: vec![[10, 20], [10, 20]],
                stream_class: INTER_PARTITION_STREAM_CELL,
                count: 3,
            }
        );
        Ok(())
    }

    #[test]
    fn test_no_data_cells_start_empty() {
        let fd = array![[E, 255]];
        let acc = StreamAccumulator::new(
            [0, 0],
            &fd,
            &NoDataPolicy::DetectBySentinel(255),
            &NoDataPolicy::MarkBySentinel(7),
            Vec::new(),
        );
        assert_eq!(acc.stream_class(), &array![[INTRA_PARTITION_STREAM_CELL, 7]]);
        assert_eq!(acc.count, array![[1, 0]]);
    }

    #[test]
    fn test_partition_fed_from_the_west() -> Result<()> {
        let hood = with_west(Array2::from_elem((3, 3), E), array![[E], [E], [E]])?;
        let result = inter_partition_stream_partition([0, 1], [0, 3], &hood, &Policies::default())?;

        assert_eq!(result.offset, [0, 3]);
        assert_eq!(result.stream_class, Array2::from_elem((3, 3), INTER_PARTITION_STREAM_CELL));

        let io = &result.partition_io;
        assert!(io.is_solved());
        assert_eq!(io.input_cells(), &[[0, 0], [1, 0], [2, 0]]);
        for (r, (cell, output)) in io.output_cells().enumerate() {
            assert_eq!(*cell, [r, 2]);
            assert_eq!(output.step, [0, 1]);
            assert_eq!(output.value.input_cells, vec![[r, 3]]);
            assert_eq!(output.value.count, 3);
        }
        Ok(())
    }

    #[test]
    fn test_west_inflow_into_sink_stays_inside() -> Result<()> {
        let hood = with_west(array![[E, SINK]], array![[E]])?;
        let result = inter_partition_stream_partition([0, 1], [0, 1], &hood, &Policies::default())?;

        assert!(result.partition_io.is_drained());
        assert!(result.partition_io.is_solved());
        assert_eq!(
            result.stream_class,
            array![[INTER_PARTITION_STREAM_CELL, INTER_PARTITION_STREAM_CELL]]
        );
        Ok(())
    }

    #[test]
    fn test_cycle_reported_with_cells() {
        let hood = with_west(array![[S, SINK], [N, SINK]], array![[N], [N]]);
        let result = hood.and_then(|hood| {
            inter_partition_stream_partition([0, 0], [0, 0], &hood, &Policies::default())
        });
        assert!(matches!(
            result,
            Err(PartflowError::CyclicFlowDirection { ref cells, .. }) if *cells == vec![[0, 0], [1, 0]]
        ));
    }
}
