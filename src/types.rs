//! Scalar and index types shared by all modules.
//!
//! Two-dimensional quantities are stored as `[row, col]` pairs. Rows grow
//! southwards and columns grow eastwards.

/// Element type of flow-direction rasters.
pub type FlowDirectionElement = u8;

/// Element type of stream-class rasters.
pub type StreamClass = u8;

/// Element type of inflow-count rasters.
pub type InflowCountElement = u8;

/// Aggregated number of contributing cells.
pub type Count = u64;

/// Extent of an array or partition, in elements.
pub type Shape = [usize; 2];

/// Position of a partition within the global array, in elements.
pub type Offset = [usize; 2];

/// Cell position, local to a partition unless documented otherwise.
pub type CellIndex = [usize; 2];

/// Position of a partition within the partition grid.
pub type PartitionIndex = [usize; 2];

/// Relative offset with components in `{-1, 0, 1}`.
///
/// Used both for the step from a cell to its downstream neighbor and for the
/// offset from a partition to one of its eight neighbor partitions.
pub type NeighborOffset = [i8; 2];

/// Cell draining towards an outlet located in the same partition.
pub const INTRA_PARTITION_STREAM_CELL: StreamClass = 0;

/// Cell draining material that entered the partition across its border.
pub const INTER_PARTITION_STREAM_CELL: StreamClass = 1;
