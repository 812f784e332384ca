//! Centralized error handling for partflow.
//!
//! Every failure condition is reported through [`PartflowError`] and the crate
//! [`Result`] alias. The library never panics on malformed input; this is
//! enforced through `#![deny(clippy::panic)]` and `#![deny(clippy::unwrap_used)]`.
//!
//! ## Error Categories
//!
//! - **Hand-off errors** ([`PartflowError::Io`], [`PartflowError::Serialization`],
//!   [`PartflowError::Compression`], [`PartflowError::Format`]): encoding or
//!   decoding partition IO frames.
//! - **Geometry errors** ([`PartflowError::MalformedPartitionGeometry`]): neighbor
//!   tiles or drain requests whose shapes do not line up with a partition.
//! - **Flow errors** ([`PartflowError::InvalidFlowDirection`],
//!   [`PartflowError::FlowIntoNoData`], [`PartflowError::CyclicFlowDirection`]):
//!   the flow-direction raster itself is not a valid drainage network.
//! - **Resolution errors** ([`PartflowError::UnresolvedInputCells`]): a
//!   partition finished processing with input cells it could not account for.
//! - **Internal errors** ([`PartflowError::Internal`]): logic errors in the
//!   scheduler or walkers. These indicate a bug.
//!
//! A failing partition task fails the whole run. The executor keeps the first
//! error it observes and returns it once all in-flight tasks have stopped.
//!
//! ```rust
//! use partflow::{PartflowError, Result};
//!
//! fn describe(result: Result<()>) -> String {
//!     match result {
//!         Ok(()) => "ok".into(),
//!         Err(PartflowError::UnresolvedInputCells { partition, .. }) => {
//!             format!("partition {partition:?} is not solved")
//!         }
//!         Err(e) => e.to_string(),
//!     }
//! }
//! # assert_eq!(describe(Ok(())), "ok");
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::types::{CellIndex, FlowDirectionElement, PartitionIndex};

/// A specialized `Result` type for partflow operations.
pub type Result<T> = std::result::Result<T, PartflowError>;

/// The master error enum covering all failure domains in partflow.
///
/// This type is `Clone` so the executor can hand the first captured failure
/// back to the caller while worker threads still hold a reference to it. I/O
/// errors are wrapped in `Arc` for that reason.
#[derive(Debug, Clone)]
pub enum PartflowError {
    /// Low-level I/O failure while reading or writing hand-off frames.
    Io(Arc<io::Error>),

    /// Bincode encoding or decoding failure.
    Serialization(String),

    /// Compression or decompression failure, or an unknown algorithm ID.
    Compression(String),

    /// A hand-off frame is truncated, corrupted, or fails its checksum.
    Format(String),

    /// Neighbor tile, halo, or drain shape does not match the partition
    /// geometry it is combined with.
    MalformedPartitionGeometry(String),

    /// A cell holds a value that is neither a flow direction code nor the
    /// configured no-data value.
    InvalidFlowDirection {
        /// The offending value.
        code: FlowDirectionElement,
        /// Local cell index within its partition.
        cell: CellIndex,
    },

    /// A valid cell drains into a cell marked as no-data.
    FlowIntoNoData {
        /// Upstream cell, local to the partition being processed.
        from: CellIndex,
        /// Downstream cell, in the coordinate frame of the partition being
        /// processed (neighbor cells are offset by one partition extent).
        to: [isize; 2],
    },

    /// Input cells remained unresolved after all accumulation phases ran.
    UnresolvedInputCells {
        /// Index of the partition in the partition grid.
        partition: PartitionIndex,
        /// Local indices of the input cells that are still unresolved.
        cells: Vec<CellIndex>,
    },

    /// Cells still have pending upstream contributions after all accumulation
    /// phases ran. The flow-direction network contains a cycle.
    CyclicFlowDirection {
        /// Index of the partition in the partition grid.
        partition: PartitionIndex,
        /// Local indices of the cells that were never reached.
        cells: Vec<CellIndex>,
    },

    /// Logic error in the scheduler or other internal components.
    ///
    /// This should not occur in production and indicates a bug.
    Internal(String),
}

impl fmt::Display for PartflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Serialization(s) => write!(f, "Serialization Error: {s}"),
            Self::Compression(s) => write!(f, "Compression Error: {s}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::MalformedPartitionGeometry(s) => write!(f, "Malformed Partition Geometry: {s}"),
            Self::InvalidFlowDirection { code, cell } => {
                write!(f, "Invalid Flow Direction: code {code} at cell {cell:?}")
            }
            Self::FlowIntoNoData { from, to } => {
                write!(f, "Flow Into No-Data: cell {from:?} drains into {to:?}")
            }
            Self::UnresolvedInputCells { partition, cells } => write!(
                f,
                "Unresolved Input Cells: partition {partition:?} has {} unresolved input cell(s), first {:?}",
                cells.len(),
                cells.first()
            ),
            Self::CyclicFlowDirection { partition, cells } => write!(
                f,
                "Cyclic Flow Direction: partition {partition:?} has {} unreachable cell(s), first {:?}",
                cells.len(),
                cells.first()
            ),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for PartflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PartflowError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_io_error_keeps_source() {
        let err = PartflowError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("I/O Error"));

        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
    }

    #[test]
    fn test_unresolved_display_mentions_partition() {
        let err = PartflowError::UnresolvedInputCells {
            partition: [1, 2],
            cells: vec![[0, 0], [0, 1]],
        };
        let msg = err.to_string();
        assert!(msg.contains("[1, 2]"));
        assert!(msg.contains("2 unresolved"));
        assert!(err.source().is_none());
    }
}
