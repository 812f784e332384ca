//! The parallel task executor.
//!
//! Execution is purely reactive: a completed node delivers its output into
//! the input slots of its dependents, and whichever node brings a dependent's
//! counter of outstanding inputs to zero spawns it. There is no central
//! polling loop and no barrier between tasks.
//!
//! The first failing task stops the run. Tasks already in flight finish, no
//! new tasks are spawned, and the first captured error is returned.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace, warn};

use crate::error::{PartflowError, Result};
use crate::graph::{Node, TaskGraph, TaskId, TaskState};

/// Context shared among all worker threads.
struct ExecutionContext<'a, 'graph, T> {
    graph: &'graph TaskGraph<'a, T>,
    abort_flag: AtomicBool,
    error_capture: Mutex<Option<PartflowError>>,
    outputs: Mutex<BTreeMap<TaskId, T>>,
}

impl<'a, 'graph, T> ExecutionContext<'a, 'graph, T> {
    fn signal_error(&self, node: &Node<'a, T>, err: PartflowError) {
        node.set_state(TaskState::Failed);
        let mut guard = self.error_capture.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            warn!("task {} ({}) failed, aborting run: {err}", node.id, node.job.label());
            *guard = Some(err);
            self.abort_flag.store(true, Ordering::SeqCst);
        }
    }

    fn should_abort(&self) -> bool {
        self.abort_flag.load(Ordering::Relaxed)
    }

    fn capture_output(&self, id: TaskId, value: T) {
        let mut guard = self.outputs.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(id, value);
    }
}

/// Runs every node of `graph` on the current rayon pool.
///
/// Returns the outputs of the nodes nobody depends on, keyed by node.
///
/// # Errors
/// The first error returned by any job, or [`PartflowError::Internal`] if the
/// graph contains a cycle.
pub fn execute_graph<'a, T>(graph: &TaskGraph<'a, T>) -> Result<BTreeMap<TaskId, T>>
where
    T: Clone + Send + Sync,
{
    let ctx = ExecutionContext {
        graph,
        abort_flag: AtomicBool::new(false),
        error_capture: Mutex::new(None),
        outputs: Mutex::new(BTreeMap::new()),
    };

    // Nodes without dependencies start the run; all others wait.
    let mut leaves = Vec::new();
    for node in graph.nodes() {
        if node.atomic_deps.load(Ordering::SeqCst) == 0 {
            leaves.push(node);
        } else {
            node.set_state(TaskState::AwaitingInputs);
        }
    }

    if leaves.is_empty() && !graph.is_empty() {
        return Err(PartflowError::Internal(
            "Graph has nodes but no leaves. Cyclic dependency detected.".into(),
        ));
    }

    debug!(
        "executing task graph: {} node(s), {} leaf node(s), {} worker thread(s)",
        graph.len(),
        leaves.len(),
        rayon::current_num_threads()
    );

    rayon::scope(|s| {
        let ctx_ref = &ctx;
        for leaf in leaves {
            s.spawn(move |s| process_node(s, ctx_ref, leaf));
        }
    });

    if ctx.should_abort() {
        let guard = ctx.error_capture.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(err) = guard.as_ref() {
            return Err(err.clone());
        }
        return Err(PartflowError::Internal("Unknown execution error".into()));
    }

    if let Some(stuck) = graph.nodes().iter().find(|n| n.state() != TaskState::Done) {
        return Err(PartflowError::Internal(format!(
            "Graph execution incomplete: node {} is {:?}. Cyclic dependency detected.",
            stuck.id,
            stuck.state()
        )));
    }

    let outputs = ctx
        .outputs
        .into_inner()
        .map_err(|_| PartflowError::Internal("Output mutex poisoned".into()))?;
    debug!("task graph finished, {} output(s)", outputs.len());
    Ok(outputs)
}

/// The worker function executed by rayon threads.
fn process_node<'scope, 'a, T>(
    scope: &rayon::Scope<'scope>,
    ctx: &'scope ExecutionContext<'a, 'scope, T>,
    node: &'scope Node<'a, T>,
) where
    T: Clone + Send + Sync,
{
    if ctx.should_abort() {
        return;
    }

    node.set_state(TaskState::Computing);
    trace!("task {} ({}) computing", node.id, node.job.label());

    let inputs = match node.take_inputs() {
        Ok(inputs) => inputs,
        Err(e) => {
            ctx.signal_error(node, e);
            return;
        }
    };

    let output = match node.job.execute(inputs) {
        Ok(output) => output,
        Err(e) => {
            ctx.signal_error(node, e);
            return;
        }
    };

    if node.dependents.is_empty() {
        ctx.capture_output(node.id, output);
        node.set_state(TaskState::Done);
        trace!("task {} done", node.id);
        return;
    }

    let mut ready = Vec::new();
    let mut output = Some(output);
    let last = node.dependents.len() - 1;
    for (i, &(dependent_id, slot)) in node.dependents.iter().enumerate() {
        let value = if i == last {
            output.take()
        } else {
            output.clone()
        };
        let Some(value) = value else {
            ctx.signal_error(node, PartflowError::Internal("Output consumed twice".into()));
            return;
        };

        let dependent = match ctx.graph.get_node(dependent_id) {
            Ok(dependent) => dependent,
            Err(e) => {
                ctx.signal_error(node, e);
                return;
            }
        };

        if let Err(e) = dependent.register_input(slot, value) {
            ctx.signal_error(node, e);
            return;
        }

        // `fetch_sub` returns the previous value: 1 means we delivered the
        // last missing input.
        if dependent.atomic_deps.fetch_sub(1, Ordering::SeqCst) == 1 {
            ready.push(dependent);
        }
    }

    node.set_state(TaskState::Done);
    trace!("task {} done, {} dependent(s) ready", node.id, ready.len());

    for dependent in ready {
        scope.spawn(move |s| process_node(s, ctx, dependent));
    }
}
