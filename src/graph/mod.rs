//! Core graph definitions for the partflow task runtime.
//!
//! A run is expressed as a `TaskGraph` of `Job`s. Each node waits for the
//! outputs of its dependencies, which arrive in numbered input slots.

/// Defines the `TaskGraph` and `Node` structures.
pub mod core;
/// Defines the `TaskId` type.
pub mod id;
/// Defines the `Job` trait.
pub mod job;

pub use core::{Node, TaskGraph, TaskState};
pub use id::TaskId;
pub use job::Job;
