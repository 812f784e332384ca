//! # partflow
//!
//! Partition-boundary flow routing over partitioned flow-direction rasters.
//!
//! ## Overview
//!
//! A flow-direction raster tells, for every cell, which of its eight
//! neighbors receives its water (or that it is a sink). When the raster is
//! too large to process as a whole, it is split into rectangular partitions
//! that are processed independently and in parallel. A partition task only
//! ever sees its own tile and the eight tiles around it.
//!
//! partflow computes what crosses partition borders:
//!
//! *   **Inflow counts:** the number of upstream neighbors of every cell,
//!     including neighbors across partition borders.
//! *   **Stream classes:** whether a cell carries material that entered its
//!     partition from a neighbor (inter-partition) or only local material
//!     (intra-partition).
//! *   **Partition IO:** per partition, the input cells fed from neighbors and
//!     the output cells draining into neighbors, with what each output
//!     carries. [`partition_io::ArrayPartitionIO::drain`] translates outputs
//!     into the input cell coordinates of the neighbor.
//!
//! Combining partition IO records into global results is up to the caller.
//!
//! ## Architecture
//!
//! ### Halos
//!
//! Partitions on the border of the array get synthetic *halo* tiles in place
//! of missing neighbors. Halo cells always drain away from the array, so they
//! never contribute inflow. See [`halo`].
//!
//! ### Task graph
//!
//! Every operation is expressed as a dependency graph: tile tasks, halo tasks,
//! and one partition task per partition waiting on nine tiles. The
//! [`executor`] runs it on a rayon pool. Completed tasks hand their output to
//! their dependents and spawn those whose inputs are all in, using atomic
//! counters instead of locks or barriers.
//!
//! ### Per-partition processing
//!
//! A partition task counts inflow, then walks downstream from every cell
//! without upstream neighbors (phase A), then from every input cell once its
//! upstream material has arrived (phase B). See [`inter_partition_stream`].
//!
//! ## Usage
//!
//! ```rust
//! use ndarray::Array2;
//! use partflow::{Partflow, PartitionedArray, Policies};
//! use partflow::flow_direction::codes::E;
//!
//! let flow_direction = Array2::from_elem((9, 9), E);
//! let partitioned = PartitionedArray::from_array(&flow_direction, [3, 3])?;
//!
//! let (stream_class, partition_io) = Partflow::builder()
//!     .policies(Policies::default())
//!     .num_threads(2)
//!     .inter_partition_stream(&partitioned)?;
//!
//! assert_eq!(stream_class.partition_grid_shape(), [3, 3]);
//! let io = partition_io.get([0, 1]).ok_or(partflow::PartflowError::Internal("missing".into()))?;
//! assert!(io.is_solved());
//! assert_eq!(io.nr_output_cells(), 3);
//! # Ok::<(), partflow::PartflowError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **No Unsafe:** the crate forbids `unsafe` code.
//! * **No Panics:** no `unwrap()` or `panic!()` calls in the library (enforced
//!   by clippy lints).
//! * **Comprehensive Errors:** all failures correspond to a [`PartflowError`].
//! * **Fail Fast:** the first failing partition task fails the run.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod accumulate;
pub mod api;
pub mod array;
pub mod codec;
pub mod compression;
pub mod error;
pub mod flow_direction;
pub mod halo;
pub mod inflow_count;
pub mod inter_partition_stream;
pub mod partition_io;
pub mod policy;
pub mod types;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod executor;
#[doc(hidden)]
pub mod graph;

mod spawn;

// --- RE-EXPORTS ---

#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Compressor;
pub use compression::{Compressor, NoCompression};

pub use api::{Partflow, PartflowConfig, PartflowOptions};
pub use array::{ComponentArray, Partition, PartitionedArray};
pub use error::{PartflowError, Result};
pub use inter_partition_stream::{InterPartitionStreamMaterial, PartitionIO};
pub use partition_io::ArrayPartitionIO;
pub use policy::{NoDataPolicy, Policies};
