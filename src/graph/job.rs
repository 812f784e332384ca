use crate::error::Result;

/// A unit of work in the task graph.
///
/// `inputs` holds the outputs of the job's dependencies, in the order the
/// dependencies were linked.
///
/// # Lifetimes
/// * `'a`: The lifetime of data borrowed by the job, typically the partitioned
///   array a run was started on.
pub trait Job<'a, T>: Send + Sync {
    /// Runs the job.
    fn execute(&self, inputs: Vec<T>) -> Result<T>;

    /// Short description, used in log messages.
    fn label(&self) -> String;
}

impl<'a, T> std::fmt::Debug for Box<dyn Job<'a, T> + 'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Job({})", self.label())
    }
}
