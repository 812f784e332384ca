//! Builds and runs the task graph of a neighborhood operation.
//!
//! A neighborhood operation runs one task per partition. Each task needs the
//! partition's own tile and the eight tiles around it. The graph built here
//! contains:
//!
//! - one *tile* task per partition, standing for the arrival of its data,
//! - one *halo* task per synthetic neighbor slot in use, serving the tiles of
//!   a [`HaloBuilder`] built once per run; side halos depend on the tile of
//!   the partition they border,
//! - one *partition* task per partition, depending on nine tiles.
//!
//! Partition tasks are independent of each other. Their results are collected
//! into a [`ComponentArray`] laid out like the input partition grid.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::debug;
use ndarray::Array2;

use crate::array::{ComponentArray, PartitionedArray};
use crate::error::{PartflowError, Result};
use crate::executor::execute_graph;
use crate::graph::{Job, TaskGraph, TaskId};
use crate::halo::{HaloBuilder, NeighborSlot, bordered_partition, neighbor_slots, side_halo_extent};
use crate::inflow_count::Neighborhood;
use crate::types::{FlowDirectionElement, PartitionIndex};

type Tile = Arc<Array2<FlowDirectionElement>>;

/// Values flowing along the edges of the graph.
#[derive(Debug)]
pub(crate) enum Value<R> {
    /// A real or halo tile.
    Tile(Tile),
    /// Result of a partition task.
    Output(Arc<R>),
}

impl<R> Clone for Value<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Tile(tile) => Self::Tile(Arc::clone(tile)),
            Self::Output(result) => Self::Output(Arc::clone(result)),
        }
    }
}

impl<R> Value<R> {
    fn into_tile(self) -> Result<Tile> {
        match self {
            Self::Tile(tile) => Ok(tile),
            Self::Output(_) => Err(PartflowError::Internal("expected a tile input".into())),
        }
    }
}

struct TileJob {
    idx: PartitionIndex,
    tile: Tile,
}

impl<'a, R> Job<'a, Value<R>> for TileJob {
    fn execute(&self, _: Vec<Value<R>>) -> Result<Value<R>> {
        Ok(Value::Tile(Arc::clone(&self.tile)))
    }

    fn label(&self) -> String {
        format!("tile {:?}", self.idx)
    }
}

/// Serves one synthetic neighbor tile from the [`HaloBuilder`].
///
/// Side halos depend on the tile they border and check that its extent still
/// matches the halo.
struct HaloJob<'a> {
    slot: NeighborSlot,
    halos: &'a HaloBuilder,
}

impl<'a, R> Job<'a, Value<R>> for HaloJob<'a> {
    fn execute(&self, inputs: Vec<Value<R>>) -> Result<Value<R>> {
        let halo = self.halos.halo(self.slot).ok_or_else(|| {
            PartflowError::Internal(format!("no halo tile for {:?}", self.slot))
        })?;

        if let NeighborSlot::SyntheticEdge { side, .. } = self.slot {
            let bordered = inputs
                .into_iter()
                .next()
                .ok_or_else(|| PartflowError::Internal("side halo without bordered tile".into()))?
                .into_tile()?;
            let (nr, nc) = bordered.dim();
            let (hr, hc) = halo.dim();
            if side_halo_extent(side, [nr, nc]) != hr.max(hc) {
                return Err(PartflowError::MalformedPartitionGeometry(format!(
                    "{side:?} halo of shape [{hr}, {hc}] does not fit a tile of shape [{nr}, {nc}]"
                )));
            }
        }
        Ok(Value::Tile(halo))
    }

    fn label(&self) -> String {
        format!("halo {:?}", self.slot)
    }
}

struct PartitionJob<'a, F> {
    idx: PartitionIndex,
    op: &'a F,
}

impl<'a, R, F> Job<'a, Value<R>> for PartitionJob<'a, F>
where
    F: Fn(PartitionIndex, &Neighborhood) -> Result<R> + Sync,
{
    fn execute(&self, inputs: Vec<Value<R>>) -> Result<Value<R>> {
        let mut tiles = inputs.into_iter().map(Value::into_tile);
        let center = tiles
            .next()
            .ok_or_else(|| PartflowError::Internal("partition task without its tile".into()))??;
        let neighbors: Vec<Tile> = tiles.collect::<Result<_>>()?;
        let neighbors: [Tile; 8] = neighbors.try_into().map_err(|v: Vec<Tile>| {
            PartflowError::Internal(format!("partition task received {} neighbors", v.len()))
        })?;

        let neighborhood = Neighborhood::new(center, neighbors)?;
        (self.op)(self.idx, &neighborhood).map(|result| Value::Output(Arc::new(result)))
    }

    fn label(&self) -> String {
        format!("partition {:?}", self.idx)
    }
}

/// Runs `op` once per partition of `array`, each time on the partition and its
/// eight neighbors.
pub(crate) fn spawn_neighborhood_tasks<R, F>(
    array: &PartitionedArray<FlowDirectionElement>,
    op: &F,
) -> Result<ComponentArray<R>>
where
    R: Send + Sync,
    F: Fn(PartitionIndex, &Neighborhood) -> Result<R> + Sync,
{
    let grid_shape = array.partition_grid_shape();
    let halos = HaloBuilder::new(array)?;
    let mut graph: TaskGraph<'_, Value<R>> = TaskGraph::new();

    let mut tiles = BTreeMap::new();
    for (idx, partition) in array.iter() {
        let id = graph.add_node(Box::new(TileJob {
            idx,
            tile: partition.data_arc(),
        }));
        tiles.insert(idx, id);
    }

    let mut halo_tasks: HashMap<NeighborSlot, TaskId> = HashMap::new();
    let mut partitions = Vec::with_capacity(array.nr_partitions());

    for (idx, _) in array.iter() {
        let task = graph.add_node(Box::new(PartitionJob { idx, op }));
        let center = *tiles
            .get(&idx)
            .ok_or_else(|| PartflowError::Internal(format!("no tile task for {idx:?}")))?;
        graph.link(center, task)?;

        for slot in neighbor_slots(grid_shape, idx) {
            let source = match slot {
                NeighborSlot::Real(nb) => *tiles
                    .get(&nb)
                    .ok_or_else(|| PartflowError::Internal(format!("no tile task for {nb:?}")))?,
                synthetic => match halo_tasks.get(&synthetic) {
                    Some(id) => *id,
                    None => {
                        let id = graph.add_node(Box::new(HaloJob {
                            slot: synthetic,
                            halos: &halos,
                        }));
                        if let NeighborSlot::SyntheticEdge { side, along } = synthetic {
                            let bordered = bordered_partition(grid_shape, side, along);
                            let bordered = *tiles.get(&bordered).ok_or_else(|| {
                                PartflowError::Internal(format!("no tile task for {bordered:?}"))
                            })?;
                            graph.link(bordered, id)?;
                        }
                        halo_tasks.insert(synthetic, id);
                        id
                    }
                },
            };
            graph.link(source, task)?;
        }
        partitions.push(task);
    }

    debug!(
        "spawning neighborhood tasks: {} partition(s), {} halo task(s)",
        partitions.len(),
        halo_tasks.len()
    );

    let mut outputs = execute_graph(&graph)?;
    let mut results = Vec::with_capacity(partitions.len());
    for task in partitions {
        match outputs.remove(&task) {
            // Partition tasks have no dependents, so their output is never shared.
            Some(Value::Output(result)) => results.push(Arc::try_unwrap(result).map_err(|_| {
                PartflowError::Internal(format!("result of partition task {task} is shared"))
            })?),
            _ => {
                return Err(PartflowError::Internal(format!(
                    "partition task {task} produced no result"
                )));
            }
        }
    }

    let grid = Array2::from_shape_vec((grid_shape[0], grid_shape[1]), results)
        .map_err(|e| PartflowError::Internal(format!("result grid: {e}")))?;
    Ok(ComponentArray::new(grid))
}
