//! No-data policies.
//!
//! Every operation receives its no-data configuration as an explicit value
//! instead of reading it from ambient state. A [`Policies`] bundle carries one
//! [`NoDataPolicy`] per element type involved in a flow-routing run.

use serde::{Deserialize, Serialize};

use crate::types::{FlowDirectionElement, InflowCountElement, StreamClass};

/// How no-data is detected in inputs and marked in outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoDataPolicy<T> {
    /// Every value is valid. Nothing is detected, nothing is marked.
    #[default]
    AllValuesValid,
    /// Values equal to the sentinel are no-data on input. Outputs are never
    /// marked.
    DetectBySentinel(T),
    /// Values equal to the sentinel are no-data on input, and no-data outputs
    /// are written as the sentinel.
    MarkBySentinel(T),
}

impl<T: Copy + PartialEq> NoDataPolicy<T> {
    /// Returns true if `value` is no-data under this policy.
    pub fn is_no_data(&self, value: T) -> bool {
        match self {
            Self::AllValuesValid => false,
            Self::DetectBySentinel(v) | Self::MarkBySentinel(v) => *v == value,
        }
    }

    /// Writes the no-data sentinel into `slot`, if this policy marks outputs.
    pub fn mark_no_data(&self, slot: &mut T) {
        if let Self::MarkBySentinel(v) = self {
            *slot = *v;
        }
    }

    /// The sentinel, if any.
    pub fn value(&self) -> Option<T> {
        match self {
            Self::AllValuesValid => None,
            Self::DetectBySentinel(v) | Self::MarkBySentinel(v) => Some(*v),
        }
    }
}

/// No-data configuration for one flow-routing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policies {
    /// Input flow directions.
    pub flow_direction: NoDataPolicy<FlowDirectionElement>,
    /// Output stream classes.
    pub stream_class: NoDataPolicy<StreamClass>,
    /// Output inflow counts.
    pub inflow_count: NoDataPolicy<InflowCountElement>,
}

impl Policies {
    /// Policies detecting and marking no-data with the given sentinels.
    pub fn with_no_data(
        flow_direction: FlowDirectionElement,
        stream_class: StreamClass,
        inflow_count: InflowCountElement,
    ) -> Self {
        Self {
            flow_direction: NoDataPolicy::MarkBySentinel(flow_direction),
            stream_class: NoDataPolicy::MarkBySentinel(stream_class),
            inflow_count: NoDataPolicy::MarkBySentinel(inflow_count),
        }
    }

    /// Default sentinel for every element type: `u8::MAX`.
    pub fn default_no_data() -> Self {
        Self::with_no_data(u8::MAX, u8::MAX, u8::MAX)
    }
}
