//! Boundary exchange state of one partition.
//!
//! An [`ArrayPartitionIO`] records two things about a partition after it has
//! been processed:
//!
//! - **Input cells**: cells receiving flow from a neighbor partition. They are
//!   unresolved until the partition task has routed everything that crosses
//!   them.
//! - **Output cells**: cells on the border whose flow leaves the partition,
//!   each with the step towards its downstream cell and an aggregated value.
//!
//! [`ArrayPartitionIO::drain`] translates output cells into the local input
//! cell coordinates of the neighbor they drain into. It is a pure query.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::array::ComponentArray;
use crate::error::{PartflowError, Result};
use crate::flow_direction::step_index;
use crate::types::{CellIndex, NeighborOffset, Shape};

/// An output cell's downstream step and aggregated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCell<V> {
    /// Step from the output cell to its downstream cell.
    pub step: NeighborOffset,
    /// Aggregated value carried across the border.
    pub value: V,
}

/// Offset of the partition containing the downstream cell of `cell`, relative
/// to the partition containing `cell`.
///
/// Per axis: a step of `-1` from the first cell or `+1` from the last cell
/// leaves the partition, anything else stays in it.
pub fn partition_offset(cell: CellIndex, step: NeighborOffset, shape: Shape) -> NeighborOffset {
    let axis = |idx: usize, step: i8, extent: usize| -> i8 {
        match step {
            -1 if idx == 0 => -1,
            1 if idx + 1 == extent => 1,
            _ => 0,
        }
    };
    [
        axis(cell[0], step[0], shape[0]),
        axis(cell[1], step[1], shape[1]),
    ]
}

fn is_unit_offset(offset: NeighborOffset) -> bool {
    offset.iter().all(|o| (-1..=1).contains(o)) && offset != [0, 0]
}

/// Input and output cells of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayPartitionIO<V> {
    partition_shape: Shape,
    input_cells: Vec<CellIndex>,
    unresolved_input_cells: BTreeSet<CellIndex>,
    output_cells: BTreeMap<CellIndex, OutputCell<V>>,
}

impl<V> ArrayPartitionIO<V> {
    /// Creates the IO state of a partition of `partition_shape`, with the given
    /// input cells all unresolved.
    ///
    /// `input_cells` may contain duplicates, one per feeding neighbor cell. It
    /// is stored sorted.
    pub fn new(partition_shape: Shape, mut input_cells: Vec<CellIndex>) -> Self {
        input_cells.sort_unstable();
        let unresolved_input_cells = input_cells.iter().copied().collect();
        Self {
            partition_shape,
            input_cells,
            unresolved_input_cells,
            output_cells: BTreeMap::new(),
        }
    }

    /// Shape of the partition.
    pub fn partition_shape(&self) -> Shape {
        self.partition_shape
    }

    /// All input cells, sorted, with one entry per feeding neighbor cell.
    pub fn input_cells(&self) -> &[CellIndex] {
        &self.input_cells
    }

    /// Input cells not resolved yet.
    pub fn unresolved_input_cells(&self) -> impl Iterator<Item = &CellIndex> {
        self.unresolved_input_cells.iter()
    }

    /// Number of distinct unresolved input cells.
    ///
    /// A cell fed by several neighbor cells counts once. See
    /// [`nr_input_cell_entries`](Self::nr_input_cell_entries) for the full
    /// record.
    pub fn nr_input_cells(&self) -> usize {
        self.unresolved_input_cells.len()
    }

    /// Number of input cell entries, one per feeding neighbor cell, resolved
    /// or not.
    pub fn nr_input_cell_entries(&self) -> usize {
        self.input_cells.len()
    }

    /// Whether `cell` is an unresolved input cell.
    pub fn contains_input_cell(&self, cell: CellIndex) -> bool {
        self.unresolved_input_cells.contains(&cell)
    }

    /// Marks `cell` as resolved. Returns false if it was not an unresolved
    /// input cell.
    pub fn resolve_input_cell(&mut self, cell: CellIndex) -> bool {
        self.unresolved_input_cells.remove(&cell)
    }

    /// True once no unresolved input cells remain.
    pub fn is_solved(&self) -> bool {
        self.unresolved_input_cells.is_empty()
    }

    /// Records an output cell.
    ///
    /// # Errors
    /// [`PartflowError::MalformedPartitionGeometry`] if `cell` lies outside the
    /// partition or `step` does not lead out of it, and
    /// [`PartflowError::Internal`] if the cell was recorded before.
    pub fn add_output_cell(&mut self, cell: CellIndex, step: NeighborOffset, value: V) -> Result<()> {
        let [nr, nc] = self.partition_shape;
        if cell[0] >= nr || cell[1] >= nc {
            return Err(PartflowError::MalformedPartitionGeometry(format!(
                "output cell {cell:?} lies outside partition of shape {:?}",
                self.partition_shape
            )));
        }
        if !is_unit_offset(step) || partition_offset(cell, step, self.partition_shape) == [0, 0] {
            return Err(PartflowError::MalformedPartitionGeometry(format!(
                "step {step:?} from output cell {cell:?} does not leave the partition"
            )));
        }
        if self.output_cells.contains_key(&cell) {
            return Err(PartflowError::Internal(format!(
                "output cell {cell:?} recorded twice"
            )));
        }
        self.output_cells.insert(cell, OutputCell { step, value });
        Ok(())
    }

    /// Output cells, ordered by cell index.
    pub fn output_cells(&self) -> impl Iterator<Item = (&CellIndex, &OutputCell<V>)> {
        self.output_cells.iter()
    }

    /// The recorded output at `cell`.
    pub fn output_cell(&self, cell: CellIndex) -> Option<&OutputCell<V>> {
        self.output_cells.get(&cell)
    }

    /// Number of output cells.
    pub fn nr_output_cells(&self) -> usize {
        self.output_cells.len()
    }

    /// True if no output cells are recorded.
    pub fn is_drained(&self) -> bool {
        self.output_cells.is_empty()
    }

    /// Output cells with the offset of the partition they drain into.
    pub fn offsets(&self) -> impl Iterator<Item = (CellIndex, NeighborOffset)> + '_ {
        self.output_cells
            .iter()
            .map(|(cell, out)| (*cell, partition_offset(*cell, out.step, self.partition_shape)))
    }

    /// Output cells with their values.
    pub fn values(&self) -> impl Iterator<Item = (CellIndex, &V)> {
        self.output_cells.iter().map(|(cell, out)| (*cell, &out.value))
    }

    /// Distinct offsets of the partitions drained into.
    pub fn partition_offsets(&self) -> BTreeSet<NeighborOffset> {
        self.offsets().map(|(_, offset)| offset).collect()
    }

    /// Number of output cells per drained-into partition offset.
    pub fn partition_offset_counts(&self) -> BTreeMap<NeighborOffset, usize> {
        let mut counts = BTreeMap::new();
        for (_, offset) in self.offsets() {
            *counts.entry(offset).or_insert(0) += 1;
        }
        counts
    }

    /// Translates the output cells draining into the neighbor at `offset` into
    /// that neighbor's local input cell coordinates.
    ///
    /// Per axis, a partition offset of `-1` maps to the neighbor's last index
    /// and `+1` to its first. On an axis where the offset is `0` the two
    /// partitions share that axis, and the input cell index is the output cell
    /// index plus its step, not the output cell index itself: an output at
    /// `[1, 2]` stepping `[1, 1]` into the eastern neighbor drains to `[2, 0]`.
    /// Results are ordered by output cell.
    ///
    /// # Errors
    /// [`PartflowError::MalformedPartitionGeometry`] if `offset` is not one of
    /// the eight neighbor offsets, or if a translated cell falls outside
    /// `neighbor_shape`.
    pub fn drain(&self, offset: NeighborOffset, neighbor_shape: Shape) -> Result<Vec<(CellIndex, V)>>
    where
        V: Clone,
    {
        if !is_unit_offset(offset) {
            return Err(PartflowError::MalformedPartitionGeometry(format!(
                "cannot drain towards offset {offset:?}"
            )));
        }

        let mut drained = Vec::new();
        for (cell, out) in &self.output_cells {
            if partition_offset(*cell, out.step, self.partition_shape) != offset {
                continue;
            }

            let mut input_cell = [0; 2];
            for axis in 0..2 {
                let extent = neighbor_shape[axis];
                let idx = match offset[axis] {
                    -1 => extent.checked_sub(1),
                    1 => (extent > 0).then_some(0),
                    _ => step_index(cell[axis], out.step[axis], extent),
                };
                input_cell[axis] = idx.ok_or_else(|| {
                    PartflowError::MalformedPartitionGeometry(format!(
                        "output cell {cell:?} drains outside neighbor of shape {neighbor_shape:?}"
                    ))
                })?;
            }
            drained.push((input_cell, out.value.clone()));
        }
        Ok(drained)
    }
}

/// For every partition, the offsets of the partitions draining into it.
///
/// Outputs leaving the array are ignored.
pub fn upstream_partition_offsets<V>(
    ios: &ComponentArray<ArrayPartitionIO<V>>,
) -> ComponentArray<BTreeSet<NeighborOffset>> {
    let [nr, nc] = ios.grid_shape();
    let mut upstream = ndarray::Array2::from_elem((nr, nc), BTreeSet::new());

    for (idx, io) in ios.iter() {
        for offset in io.partition_offsets() {
            let target = (
                step_index(idx[0], offset[0], nr),
                step_index(idx[1], offset[1], nc),
            );
            if let (Some(r), Some(c)) = target {
                upstream[[r, c]].insert([-offset[0], -offset[1]]);
            }
        }
    }

    ComponentArray::new(upstream)
}

/// Whether each partition's IO state is solved.
pub fn solved_partitions<V>(ios: &ComponentArray<ArrayPartitionIO<V>>) -> ComponentArray<bool> {
    ComponentArray::new(ios.as_array().map(ArrayPartitionIO::is_solved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_direction::FlowDirection;

    #[test]
    fn test_input_cells_resolve() {
        let mut io = ArrayPartitionIO::<u64>::new([3, 3], vec![[1, 0], [0, 0], [0, 0]]);
        assert_eq!(io.input_cells(), &[[0, 0], [0, 0], [1, 0]]);
        assert_eq!(io.nr_input_cells(), 2);
        assert_eq!(io.nr_input_cell_entries(), 3);
        assert!(io.contains_input_cell([0, 0]));
        assert!(!io.is_solved());

        assert!(io.resolve_input_cell([0, 0]));
        assert!(!io.resolve_input_cell([0, 0]));
        assert!(io.resolve_input_cell([1, 0]));
        assert!(io.is_solved());
        // The full record survives resolution.
        assert_eq!(io.nr_input_cells(), 0);
        assert_eq!(io.nr_input_cell_entries(), 3);
    }

    #[test]
    fn test_add_output_cell_validates() {
        let mut io = ArrayPartitionIO::<u64>::new([3, 3], Vec::new());
        assert!(io.add_output_cell([1, 2], [0, 1], 3).is_ok());
        assert!(matches!(
            io.add_output_cell([1, 1], [0, 1], 3),
            Err(PartflowError::MalformedPartitionGeometry(_))
        ));
        assert!(matches!(
            io.add_output_cell([3, 0], [1, 0], 3),
            Err(PartflowError::MalformedPartitionGeometry(_))
        ));
        assert!(matches!(
            io.add_output_cell([1, 2], [0, 1], 3),
            Err(PartflowError::Internal(_))
        ));
        assert!(!io.is_drained());
    }

    #[test]
    fn test_offsets_of_corner_cell() -> Result<()> {
        let mut io = ArrayPartitionIO::<u64>::new([3, 3], Vec::new());
        // Diagonal step along the east border stays in the eastern neighbor.
        io.add_output_cell([1, 2], [1, 1], 1)?;
        // Diagonal step from the corner goes to the south-eastern neighbor.
        io.add_output_cell([2, 2], [1, 1], 2)?;
        io.add_output_cell([2, 1], [1, 0], 3)?;

        assert_eq!(
            io.partition_offsets(),
            BTreeSet::from([[0, 1], [1, 0], [1, 1]])
        );
        assert_eq!(io.partition_offset_counts().get(&[1, 1]), Some(&1));

        assert_eq!(io.drain([0, 1], [3, 4])?, vec![([2, 0], 1)]);
        assert_eq!(io.drain([1, 1], [2, 4])?, vec![([0, 0], 2)]);
        assert_eq!(io.drain([1, 0], [2, 3])?, vec![([0, 1], 3)]);
        assert!(io.drain([-1, 0], [2, 3])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_drain_advances_along_shared_axis() -> Result<()> {
        let mut io = ArrayPartitionIO::<u64>::new([4, 3], Vec::new());
        io.add_output_cell([1, 2], [1, 1], 1)?;
        io.add_output_cell([2, 2], [-1, 1], 2)?;
        io.add_output_cell([3, 1], [1, -1], 3)?;

        // Rows are shared with the eastern neighbor: the row advances by the step.
        assert_eq!(io.drain([0, 1], [4, 5])?, vec![([2, 0], 1), ([1, 0], 2)]);
        // Columns are shared with the southern neighbor.
        assert_eq!(io.drain([1, 0], [2, 3])?, vec![([0, 0], 3)]);
        // A neighbor too short to hold the advanced index is malformed.
        assert!(matches!(
            io.drain([0, 1], [2, 5]),
            Err(PartflowError::MalformedPartitionGeometry(_))
        ));
        Ok(())
    }

    #[test]
    fn test_drain_is_pure() -> Result<()> {
        let mut io = ArrayPartitionIO::<u64>::new([2, 2], Vec::new());
        io.add_output_cell([0, 0], [-1, 0], 7)?;
        let first = io.drain([-1, 0], [5, 2])?;
        let second = io.drain([-1, 0], [5, 2])?;
        assert_eq!(first, second);
        assert_eq!(first, vec![([4, 0], 7)]);
        assert_eq!(io.nr_output_cells(), 1);
        Ok(())
    }

    #[test]
    fn test_drain_rejects_bad_geometry() -> Result<()> {
        let mut io = ArrayPartitionIO::<u64>::new([2, 2], Vec::new());
        io.add_output_cell([1, 1], [1, 1], 1)?;
        assert!(io.drain([0, 0], [2, 2]).is_err());
        assert!(io.drain([2, 0], [2, 2]).is_err());

        io.add_output_cell([0, 1], [1, 1], 1)?;
        // Neighbor to the east is too short to hold row 1.
        assert!(matches!(
            io.drain([0, 1], [1, 2]),
            Err(PartflowError::MalformedPartitionGeometry(_))
        ));
        Ok(())
    }

    #[test]
    fn test_drain_every_direction_lands_on_facing_border() -> Result<()> {
        // Every border cell of a 4x3 partition, every outward step.
        let shape = [4, 3];
        let neighbor_shape = [4, 3];
        for direction in FlowDirection::NEIGHBORS {
            let step = direction.offset();
            let mut io = ArrayPartitionIO::<CellIndex>::new(shape, Vec::new());
            for r in 0..shape[0] {
                for c in 0..shape[1] {
                    if partition_offset([r, c], step, shape) != [0, 0] {
                        io.add_output_cell([r, c], step, [r, c])?;
                    }
                }
            }

            let mut total = 0;
            for offset in io.partition_offsets() {
                for (input, source) in io.drain(offset, neighbor_shape)? {
                    total += 1;
                    // The input cell lies on the neighbor border facing us.
                    for axis in 0..2 {
                        match offset[axis] {
                            -1 => assert_eq!(input[axis], neighbor_shape[axis] - 1),
                            1 => assert_eq!(input[axis], 0),
                            _ => assert_eq!(
                                input[axis] as isize,
                                source[axis] as isize + isize::from(step[axis])
                            ),
                        }
                    }
                }
            }
            assert_eq!(total, io.nr_output_cells());
        }
        Ok(())
    }

    #[test]
    fn test_upstream_offsets_skip_array_border() -> Result<()> {
        let mut west = ArrayPartitionIO::<u64>::new([2, 2], Vec::new());
        west.add_output_cell([0, 1], [0, 1], 1)?;
        west.add_output_cell([1, 0], [0, -1], 1)?;
        let east = ArrayPartitionIO::<u64>::new([2, 2], vec![[0, 0]]);

        let ios = ComponentArray::new(
            ndarray::Array2::from_shape_vec((1, 2), vec![west, east])
                .map_err(|e| PartflowError::Internal(e.to_string()))?,
        );

        let upstream = upstream_partition_offsets(&ios);
        assert_eq!(upstream.get([0, 0]), Some(&BTreeSet::new()));
        assert_eq!(upstream.get([0, 1]), Some(&BTreeSet::from([[0, -1]])));

        let solved = solved_partitions(&ios);
        assert_eq!(solved.get([0, 0]), Some(&true));
        assert_eq!(solved.get([0, 1]), Some(&false));
        Ok(())
    }
}
