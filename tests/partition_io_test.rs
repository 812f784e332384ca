#![allow(missing_docs)]

use std::collections::BTreeMap;

use ndarray::Array2;
use partflow::flow_direction::FlowDirection;
use partflow::partition_io::{solved_partitions, upstream_partition_offsets};
use partflow::types::{CellIndex, PartitionIndex};
use partflow::{Partflow, PartflowError, PartitionedArray, Policies};

fn neighbor(grid_shape: [usize; 2], idx: PartitionIndex, offset: [i8; 2]) -> Option<PartitionIndex> {
    let r = idx[0].checked_add_signed(isize::from(offset[0]))?;
    let c = idx[1].checked_add_signed(isize::from(offset[1]))?;
    (r < grid_shape[0] && c < grid_shape[1]).then_some([r, c])
}

/// Recovers the partition offset of one axis from an output cell, its step and
/// the index it drained to, checking the drained index on the way.
fn recover_axis_offset(cell: usize, step: i8, extent: usize, neighbor_extent: usize, drained: usize) -> i8 {
    let target = cell as isize + isize::from(step);
    if target < 0 {
        assert_eq!(drained, neighbor_extent - 1);
        -1
    } else if target as usize >= extent {
        assert_eq!(drained, 0);
        1
    } else {
        assert_eq!(drained, target as usize);
        0
    }
}

/// Runs a uniform flow and checks, per partition, that every cell is counted
/// at exactly one output, and that draining all outputs reproduces the input
/// cells of every downstream partition.
fn check_uniform_flow(
    direction: FlowDirection,
    shape: [usize; 2],
    partition_shape: [usize; 2],
) -> partflow::Result<()> {
    let array = Array2::from_elem((shape[0], shape[1]), direction.code());
    let partitioned = PartitionedArray::from_array(&array, partition_shape)?;
    let grid_shape = partitioned.partition_grid_shape();
    let (_, ios) = Partflow::inter_partition_stream(&partitioned, Policies::default())?;

    let mut drained: BTreeMap<PartitionIndex, Vec<CellIndex>> = BTreeMap::new();

    for (idx, io) in ios.iter() {
        assert!(io.is_solved(), "{direction:?}: partition {idx:?} unsolved");

        let total: u64 = io.values().map(|(_, value)| value.count).sum();
        let [nr, nc] = io.partition_shape();
        assert_eq!(total, (nr * nc) as u64, "{direction:?}: partition {idx:?}");

        for offset in io.partition_offsets() {
            let Some(target) = neighbor(grid_shape, idx, offset) else {
                continue;
            };
            let target_shape = partitioned
                .partition(target)
                .map(|p| p.shape())
                .ok_or_else(|| PartflowError::Internal(format!("no partition {target:?}")))?;
            let cells = io.drain(offset, target_shape)?;
            drained
                .entry(target)
                .or_default()
                .extend(cells.into_iter().map(|(cell, _)| cell));
        }
    }

    for (idx, io) in ios.iter() {
        let mut cells = drained.remove(&idx).unwrap_or_default();
        cells.sort_unstable();
        assert_eq!(cells, io.input_cells(), "{direction:?}: partition {idx:?}");
    }

    assert!(solved_partitions(&ios).as_array().iter().all(|solved| *solved));
    Ok(())
}

// --- TESTS ---

#[test]
fn test_uniform_flow_in_every_direction() -> partflow::Result<()> {
    for direction in FlowDirection::NEIGHBORS {
        check_uniform_flow(direction, [9, 9], [3, 3])?;
    }
    Ok(())
}

/// Uneven last tiles, including one-cell-wide ones.
#[test]
fn test_uniform_flow_with_ragged_partitions() -> partflow::Result<()> {
    for direction in FlowDirection::NEIGHBORS {
        check_uniform_flow(direction, [7, 8], [3, 3])?;
        check_uniform_flow(direction, [10, 5], [3, 2])?;
    }
    Ok(())
}

#[test]
fn test_upstream_offsets_follow_the_flow() -> partflow::Result<()> {
    let array = Array2::from_elem((6, 6), FlowDirection::SouthEast.code());
    let partitioned = PartitionedArray::from_array(&array, [3, 3])?;
    let (_, ios) = Partflow::inter_partition_stream(&partitioned, Policies::default())?;

    let upstream = upstream_partition_offsets(&ios);
    let at = |idx| upstream.get(idx).map(|offsets| offsets.iter().copied().collect::<Vec<_>>());

    assert_eq!(at([0, 0]), Some(vec![]));
    assert_eq!(at([0, 1]), Some(vec![[0, -1]]));
    assert_eq!(at([1, 0]), Some(vec![[-1, 0]]));
    assert_eq!(at([1, 1]), Some(vec![[-1, -1], [-1, 0], [0, -1]]));
    Ok(())
}

#[test]
fn test_drained_cells_give_back_their_partition_offset() -> partflow::Result<()> {
    let mut shared_axes = 0;

    for direction in FlowDirection::NEIGHBORS {
        let array = Array2::from_elem((7, 8), direction.code());
        let partitioned = PartitionedArray::from_array(&array, [3, 3])?;
        let grid_shape = partitioned.partition_grid_shape();
        let (_, ios) = Partflow::inter_partition_stream(&partitioned, Policies::default())?;

        for (idx, io) in ios.iter() {
            let shape = io.partition_shape();
            for offset in io.partition_offsets() {
                let Some(target) = neighbor(grid_shape, idx, offset) else {
                    continue;
                };
                let target_shape = partitioned
                    .partition(target)
                    .map(|p| p.shape())
                    .ok_or_else(|| PartflowError::Internal(format!("no partition {target:?}")))?;

                let outputs = io.offsets().filter(|(_, o)| *o == offset).map(|(cell, _)| cell);
                let drained = io.drain(offset, target_shape)?;
                for (cell, (input_cell, _)) in outputs.zip(&drained) {
                    let step = io
                        .output_cell(cell)
                        .map(|out| out.step)
                        .ok_or_else(|| PartflowError::Internal(format!("no output at {cell:?}")))?;
                    let recovered = [0, 1].map(|axis| {
                        recover_axis_offset(cell[axis], step[axis], shape[axis], target_shape[axis], input_cell[axis])
                    });
                    assert_eq!(recovered, offset, "{direction:?}: output {cell:?} of {idx:?}");
                    shared_axes += recovered.iter().filter(|o| **o == 0).count();
                }
                assert_eq!(drained.len(), io.partition_offset_counts()[&offset]);
            }
        }
    }

    // Side neighbors always share an axis, diagonal flow along a border included.
    assert!(shared_axes > 0);
    Ok(())
}
