//! High-level entry points.
//!
//! [`Partflow`] runs the flow-routing operations with default settings on the
//! global rayon pool. [`Partflow::builder`] returns [`PartflowOptions`] for
//! choosing no-data policies, a dedicated worker pool, and frame compression.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::array::{ComponentArray, PartitionedArray};
use crate::codec;
use crate::compression::CompressorRegistry;
use crate::error::{PartflowError, Result};
use crate::inflow_count::inflow_count;
use crate::inter_partition_stream::{PartitionIO, inter_partition_stream};
use crate::policy::Policies;
use crate::types::{FlowDirectionElement, InflowCountElement, StreamClass};

/// Serializable configuration of a [`PartflowOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartflowConfig {
    /// No-data policies of inputs and outputs.
    pub policies: Policies,
    /// Size of a dedicated worker pool. `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
    /// Compress hand-off frames, if a compressor is compiled in.
    pub compression: bool,
}

/// The main entry point.
#[derive(Debug)]
pub struct Partflow;

impl Partflow {
    /// Starts configuring a run.
    pub fn builder() -> PartflowOptions {
        PartflowOptions::default()
    }

    /// Classifies inter-partition stream cells using `policies` on the global
    /// pool. See [`PartflowOptions::inter_partition_stream`].
    pub fn inter_partition_stream(
        flow_direction: &PartitionedArray<FlowDirectionElement>,
        policies: Policies,
    ) -> Result<(PartitionedArray<StreamClass>, ComponentArray<PartitionIO>)> {
        Self::builder().policies(policies).inter_partition_stream(flow_direction)
    }

    /// Computes inflow counts using `policies` on the global pool.
    pub fn inflow_count(
        flow_direction: &PartitionedArray<FlowDirectionElement>,
        policies: Policies,
    ) -> Result<PartitionedArray<InflowCountElement>> {
        Self::builder().policies(policies).inflow_count(flow_direction)
    }
}

/// Configured runner.
#[derive(Debug, Default)]
pub struct PartflowOptions {
    config: PartflowConfig,
    registry: CompressorRegistry,
}

impl PartflowOptions {
    /// Builds options from a loaded configuration.
    pub fn from_config(config: PartflowConfig) -> Self {
        Self {
            config,
            registry: CompressorRegistry::new(),
        }
    }

    /// Sets the no-data policies.
    pub fn policies(mut self, policies: Policies) -> Self {
        self.config.policies = policies;
        self
    }

    /// Runs on a dedicated pool of `num_threads` workers.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.config.num_threads = Some(num_threads);
        self
    }

    /// Enables or disables frame compression.
    pub fn compression(mut self, enable: bool) -> Self {
        self.config.compression = enable;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &PartflowConfig {
        &self.config
    }

    fn run<R, F>(&self, op: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> Result<R> + Send,
    {
        match self.config.num_threads {
            Some(num_threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("partflow-{i}"))
                .build()
                .map_err(|e| PartflowError::Internal(format!("worker pool: {e}")))?
                .install(op),
            None => op(),
        }
    }

    /// Classifies every cell as intra- or inter-partition stream cell and
    /// records the boundary IO of every partition.
    ///
    /// # Errors
    /// The first error of any partition task. See
    /// [`crate::inter_partition_stream::inter_partition_stream_partition`].
    pub fn inter_partition_stream(
        &self,
        flow_direction: &PartitionedArray<FlowDirectionElement>,
    ) -> Result<(PartitionedArray<StreamClass>, ComponentArray<PartitionIO>)> {
        let policies = self.config.policies;
        self.run(|| inter_partition_stream(flow_direction, &policies))
    }

    /// Computes inflow counts with the same partition layout as the input.
    pub fn inflow_count(
        &self,
        flow_direction: &PartitionedArray<FlowDirectionElement>,
    ) -> Result<PartitionedArray<InflowCountElement>> {
        let policies = self.config.policies;
        self.run(|| inflow_count(flow_direction, &policies))
    }

    /// Encodes a value, typically a [`PartitionIO`], into a hand-off frame.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        codec::encode_frame(value, self.registry.preferred(self.config.compression))
    }

    /// Decodes a hand-off frame.
    pub fn decode<T: DeserializeOwned>(&self, frame: &[u8]) -> Result<T> {
        codec::decode_frame(frame, &self.registry)
    }

    /// Writes a value as a hand-off frame to `path`.
    pub fn save<T, P>(&self, path: P, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
        P: AsRef<Path>,
    {
        codec::save(path, value, self.registry.preferred(self.config.compression))
    }

    /// Reads a hand-off frame from `path`.
    pub fn load<T, P>(&self, path: P) -> Result<T>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        codec::load(path, &self.registry)
    }
}
