use super::id::TaskId;
use super::job::Job;
use crate::{PartflowError, Result};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Lifecycle of a node.
///
/// `Idle -> AwaitingInputs -> Computing -> Done`, or `Failed` from
/// `Computing`. Nodes without dependencies skip `AwaitingInputs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not scheduled yet.
    Idle,
    /// Suspended until all dependencies delivered their output.
    AwaitingInputs,
    /// Running its job.
    Computing,
    /// Job finished and its output was delivered.
    Done,
    /// Job or output delivery failed.
    Failed,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::AwaitingInputs,
            2 => Self::Computing,
            3 => Self::Done,
            4 => Self::Failed,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::AwaitingInputs => 1,
            Self::Computing => 2,
            Self::Done => 3,
            Self::Failed => 4,
        }
    }
}

/// A single node in the dependency graph.
#[derive(Debug)]
pub struct Node<'a, T> {
    /// The unique identifier for this node.
    pub id: TaskId,
    /// Nodes consuming this node's output, with the input slot to fill.
    pub dependents: Vec<(TaskId, usize)>,
    /// The number of dependencies that must complete before this node can run.
    pub atomic_deps: AtomicUsize,

    /// The job to execute.
    pub job: Box<dyn Job<'a, T> + 'a>,

    /// Outputs of the dependencies, one slot per dependency.
    pub inputs: Mutex<Vec<Option<T>>>,

    state: AtomicU8,
}

impl<'a, T> Node<'a, T> {
    /// Creates a new Node.
    pub fn new(id: TaskId, job: Box<dyn Job<'a, T> + 'a>) -> Self {
        Self {
            id,
            dependents: Vec::new(),
            atomic_deps: AtomicUsize::new(0),
            job,
            inputs: Mutex::new(Vec::new()),
            state: AtomicU8::new(TaskState::Idle.as_u8()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Stores a dependency's output in `slot`.
    ///
    /// This is called by the executor when a dependency finishes.
    pub fn register_input(&self, slot: usize, value: T) -> Result<()> {
        let mut lock = self
            .inputs
            .lock()
            .map_err(|_| PartflowError::Internal(format!("Mutex poisoned on node {:?}", self.id)))?;

        let entry = lock.get_mut(slot).ok_or_else(|| {
            PartflowError::Internal(format!(
                "Slot {} out of bounds for node {:?}",
                slot, self.id
            ))
        })?;
        *entry = Some(value);
        Ok(())
    }

    /// Takes all inputs out of the node.
    ///
    /// # Errors
    /// [`PartflowError::Internal`] if a slot was never filled.
    pub fn take_inputs(&self) -> Result<Vec<T>> {
        let raw = {
            let mut guard = self
                .inputs
                .lock()
                .map_err(|_| PartflowError::Internal(format!("Mutex poisoned on node {:?}", self.id)))?;
            std::mem::take(&mut *guard)
        };
        raw.into_iter()
            .enumerate()
            .map(|(slot, value)| {
                value.ok_or_else(|| {
                    PartflowError::Internal(format!("Input slot {slot} of node {:?} is empty", self.id))
                })
            })
            .collect()
    }
}

/// The container for the entire dependency graph.
///
/// Acts as an arena for nodes. The graph lifetime `'a` is tied to the data
/// borrowed by its jobs.
#[derive(Debug)]
pub struct TaskGraph<'a, T> {
    nodes: Vec<Node<'a, T>>,
}

impl<'a, T> TaskGraph<'a, T> {
    /// Creates a new, empty `TaskGraph`.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Adds a new node to the graph.
    pub fn add_node(&mut self, job: Box<dyn Job<'a, T> + 'a>) -> TaskId {
        let id = TaskId::new(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Node::new(id, job));
        id
    }

    /// Makes `dependent` wait for the output of `dependency`.
    ///
    /// The output lands in the next free input slot of `dependent`, so the
    /// order of `link` calls fixes the order of the job's inputs.
    pub fn link(&mut self, dependency: TaskId, dependent: TaskId) -> Result<()> {
        if dependency == dependent {
            return Err(PartflowError::Internal(format!(
                "Node {dependency:?} cannot depend on itself"
            )));
        }

        let slot = {
            let node = self.get_node(dependent)?;
            node.atomic_deps.fetch_add(1, Ordering::SeqCst);
            let mut guard = node
                .inputs
                .lock()
                .map_err(|_| PartflowError::Internal(format!("Mutex poisoned on node {dependent:?}")))?;
            guard.push(None);
            guard.len() - 1
        };

        let node = self
            .nodes
            .get_mut(dependency.index())
            .ok_or_else(|| PartflowError::Internal(format!("Node {dependency:?} not found")))?;
        node.dependents.push((dependent, slot));
        Ok(())
    }

    /// Retrieves a reference to a node by its ID.
    pub fn get_node(&self, id: TaskId) -> Result<&Node<'a, T>> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| PartflowError::Internal(format!("Node {id:?} not found")))
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a slice containing all nodes in the graph.
    pub fn nodes(&self) -> &[Node<'a, T>] {
        &self.nodes
    }
}

// Manual Default impl to avoid restrictive bounds on 'a
impl<'a, T> Default for TaskGraph<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}
