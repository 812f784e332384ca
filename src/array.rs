//! Partitioned arrays.
//!
//! A [`PartitionedArray`] splits a global 2-D array into a grid of rectangular
//! tiles. Tiles in one partition row share their row extent, and tiles in one
//! partition column share their column extent. The last row and column of
//! tiles may be smaller than the others.
//!
//! Tile data is held behind `Arc`, so handing a tile to a neighbor's task is a
//! reference count increment, never a copy.
//!
//! A [`ComponentArray`] holds one arbitrary value per partition, laid out like
//! the partition grid of the array it was computed from.

use std::sync::Arc;

use ndarray::{Array2, s};
use serde::{Deserialize, Serialize};

use crate::error::{PartflowError, Result};
use crate::types::{Offset, PartitionIndex, Shape};

/// One tile of a [`PartitionedArray`].
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T> {
    offset: Offset,
    data: Arc<Array2<T>>,
}

impl<T> Partition<T> {
    /// Wraps tile data positioned at `offset` in the global array.
    pub fn new(offset: Offset, data: Array2<T>) -> Self {
        Self {
            offset,
            data: Arc::new(data),
        }
    }

    /// Position of the tile's first cell in the global array.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Extent of the tile.
    pub fn shape(&self) -> Shape {
        let (nr, nc) = self.data.dim();
        [nr, nc]
    }

    /// Tile data.
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Shared handle to the tile data.
    pub fn data_arc(&self) -> Arc<Array2<T>> {
        Arc::clone(&self.data)
    }
}

/// A global array split into a grid of tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedArray<T> {
    shape: Shape,
    partitions: Array2<Partition<T>>,
}

fn band_extents(extent: usize, partition_extent: usize) -> Vec<usize> {
    let mut bands = Vec::new();
    let mut start = 0;
    while start < extent {
        let len = partition_extent.min(extent - start);
        bands.push(len);
        start += len;
    }
    bands
}

impl<T> PartitionedArray<T> {
    /// Splits `array` into tiles of at most `partition_shape` elements.
    ///
    /// # Errors
    /// Returns [`PartflowError::MalformedPartitionGeometry`] if the partition
    /// shape has a zero extent.
    pub fn from_array(array: &Array2<T>, partition_shape: Shape) -> Result<Self>
    where
        T: Clone,
    {
        if partition_shape[0] == 0 || partition_shape[1] == 0 {
            return Err(PartflowError::MalformedPartitionGeometry(format!(
                "partition shape {partition_shape:?} has a zero extent"
            )));
        }

        let (nr, nc) = array.dim();
        let row_bands = band_extents(nr, partition_shape[0]);
        let col_bands = band_extents(nc, partition_shape[1]);

        let mut tiles = Vec::with_capacity(row_bands.len() * col_bands.len());
        let mut r0 = 0;
        for &rows in &row_bands {
            let mut c0 = 0;
            for &cols in &col_bands {
                let data = array.slice(s![r0..r0 + rows, c0..c0 + cols]).to_owned();
                tiles.push(Partition::new([r0, c0], data));
                c0 += cols;
            }
            r0 += rows;
        }

        let partitions = Array2::from_shape_vec((row_bands.len(), col_bands.len()), tiles)
            .map_err(|e| PartflowError::Internal(format!("partition grid: {e}")))?;

        Ok(Self {
            shape: [nr, nc],
            partitions,
        })
    }

    /// Assembles a partitioned array from tiles given in row-major partition
    /// order. Offsets are derived from the tile extents.
    ///
    /// # Errors
    /// Returns [`PartflowError::MalformedPartitionGeometry`] if the number of
    /// tiles does not match the grid shape, or if tiles in one partition row
    /// (column) disagree on their row (column) extent.
    pub fn from_tiles(grid_shape: Shape, tiles: Vec<Array2<T>>) -> Result<Self> {
        let [nr_grid_rows, nr_grid_cols] = grid_shape;
        if tiles.len() != nr_grid_rows * nr_grid_cols {
            return Err(PartflowError::MalformedPartitionGeometry(format!(
                "{} tiles cannot fill a {grid_shape:?} partition grid",
                tiles.len()
            )));
        }

        let mut row_extents = vec![None; nr_grid_rows];
        let mut col_extents = vec![None; nr_grid_cols];
        for (i, tile) in tiles.iter().enumerate() {
            let (r, c) = (i / nr_grid_cols, i % nr_grid_cols);
            let (rows, cols) = tile.dim();
            for (slot, extent, axis) in [
                (&mut row_extents[r], rows, "row"),
                (&mut col_extents[c], cols, "column"),
            ] {
                match *slot {
                    None => *slot = Some(extent),
                    Some(expected) if expected != extent => {
                        return Err(PartflowError::MalformedPartitionGeometry(format!(
                            "tile [{r}, {c}] has {axis} extent {extent}, expected {expected}"
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        let row_extents: Vec<usize> = row_extents.into_iter().map(|e| e.unwrap_or(0)).collect();
        let col_extents: Vec<usize> = col_extents.into_iter().map(|e| e.unwrap_or(0)).collect();

        let mut partitions = Vec::with_capacity(tiles.len());
        for (i, tile) in tiles.into_iter().enumerate() {
            let (r, c) = (i / nr_grid_cols, i % nr_grid_cols);
            let offset = [
                row_extents[..r].iter().sum(),
                col_extents[..c].iter().sum(),
            ];
            partitions.push(Partition::new(offset, tile));
        }

        let partitions = Array2::from_shape_vec((nr_grid_rows, nr_grid_cols), partitions)
            .map_err(|e| PartflowError::Internal(format!("partition grid: {e}")))?;

        Ok(Self {
            shape: [row_extents.iter().sum(), col_extents.iter().sum()],
            partitions,
        })
    }

    /// Builds an array with the same layout as `template` from tiles given in
    /// row-major partition order.
    ///
    /// # Errors
    /// [`PartflowError::MalformedPartitionGeometry`] if the tile count or a
    /// tile's shape differs from the template.
    pub fn with_layout_of<U>(
        template: &PartitionedArray<U>,
        tiles: impl IntoIterator<Item = Array2<T>>,
    ) -> Result<Self> {
        let mut partitions = Vec::with_capacity(template.nr_partitions());
        let mut tiles = tiles.into_iter();
        for (idx, original) in template.iter() {
            let tile = tiles.next().ok_or_else(|| {
                PartflowError::MalformedPartitionGeometry(format!("no tile for partition {idx:?}"))
            })?;
            let (nr, nc) = tile.dim();
            if [nr, nc] != original.shape() {
                return Err(PartflowError::MalformedPartitionGeometry(format!(
                    "tile for partition {idx:?} has shape [{nr}, {nc}], expected {:?}",
                    original.shape()
                )));
            }
            partitions.push(Partition::new(original.offset(), tile));
        }
        if tiles.next().is_some() {
            return Err(PartflowError::MalformedPartitionGeometry(
                "more tiles than partitions".into(),
            ));
        }

        let [nr, nc] = template.partition_grid_shape();
        let partitions = Array2::from_shape_vec((nr, nc), partitions)
            .map_err(|e| PartflowError::Internal(format!("partition grid: {e}")))?;
        Ok(Self {
            shape: template.shape(),
            partitions,
        })
    }

    /// Extent of the global array.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Extent of the partition grid.
    pub fn partition_grid_shape(&self) -> Shape {
        let (nr, nc) = self.partitions.dim();
        [nr, nc]
    }

    /// Number of partitions.
    pub fn nr_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// The partition at `idx` in the partition grid.
    pub fn partition(&self, idx: PartitionIndex) -> Option<&Partition<T>> {
        self.partitions.get((idx[0], idx[1]))
    }

    /// Partition grid.
    pub fn partitions(&self) -> &Array2<Partition<T>> {
        &self.partitions
    }

    /// Iterates partitions with their grid index, in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (PartitionIndex, &Partition<T>)> {
        self.partitions
            .indexed_iter()
            .map(|((r, c), p)| ([r, c], p))
    }

    /// Stitches the tiles back into one global array.
    pub fn to_array(&self) -> Array2<T>
    where
        T: Clone + Default,
    {
        let mut out = Array2::default((self.shape[0], self.shape[1]));
        for partition in &self.partitions {
            let [r0, c0] = partition.offset();
            let [nr, nc] = partition.shape();
            out.slice_mut(s![r0..r0 + nr, c0..c0 + nc])
                .assign(partition.data());
        }
        out
    }
}

/// One value per partition, laid out like a partition grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentArray<C> {
    components: Array2<C>,
}

impl<C> ComponentArray<C> {
    /// Wraps a grid of components.
    pub fn new(components: Array2<C>) -> Self {
        Self { components }
    }

    /// Extent of the partition grid.
    pub fn grid_shape(&self) -> Shape {
        let (nr, nc) = self.components.dim();
        [nr, nc]
    }

    /// The component of partition `idx`.
    pub fn get(&self, idx: PartitionIndex) -> Option<&C> {
        self.components.get((idx[0], idx[1]))
    }

    /// Iterates components with their grid index, in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (PartitionIndex, &C)> {
        self.components
            .indexed_iter()
            .map(|((r, c), v)| ([r, c], v))
    }

    /// Underlying grid.
    pub fn as_array(&self) -> &Array2<C> {
        &self.components
    }

    /// Unwraps the underlying grid.
    pub fn into_inner(self) -> Array2<C> {
        self.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_array_uneven_tiles() -> Result<()> {
        let array = Array2::from_shape_fn((5, 7), |(r, c)| r * 10 + c);
        let partitioned = PartitionedArray::from_array(&array, [2, 3])?;

        assert_eq!(partitioned.partition_grid_shape(), [3, 3]);
        let last = partitioned.partition([2, 2]).ok_or_else(|| {
            PartflowError::Internal("missing partition".into())
        })?;
        assert_eq!(last.offset(), [4, 6]);
        assert_eq!(last.shape(), [1, 1]);
        assert_eq!(last.data()[[0, 0]], 46);

        assert_eq!(partitioned.to_array(), array);
        Ok(())
    }

    #[test]
    fn test_from_tiles_offsets() -> Result<()> {
        let tiles = vec![
            array![[1u8, 1], [1, 1]],
            array![[2u8], [2]],
            array![[3u8, 3]],
            array![[4u8]],
        ];
        let partitioned = PartitionedArray::from_tiles([2, 2], tiles)?;
        assert_eq!(partitioned.shape(), [3, 3]);
        let offsets: Vec<_> = partitioned.iter().map(|(_, p)| p.offset()).collect();
        assert_eq!(offsets, vec![[0, 0], [0, 2], [2, 0], [2, 2]]);
        assert_eq!(
            partitioned.to_array(),
            array![[1u8, 1, 2], [1, 1, 2], [3, 3, 4]]
        );
        Ok(())
    }

    #[test]
    fn test_from_tiles_rejects_ragged_rows() {
        let tiles = vec![array![[1u8, 1], [1, 1]], array![[2u8]]];
        let result = PartitionedArray::from_tiles([1, 2], tiles);
        assert!(matches!(
            result,
            Err(PartflowError::MalformedPartitionGeometry(_))
        ));
    }

    #[test]
    fn test_zero_partition_shape() {
        let array = Array2::<u8>::zeros((2, 2));
        assert!(PartitionedArray::from_array(&array, [0, 1]).is_err());
    }
}
