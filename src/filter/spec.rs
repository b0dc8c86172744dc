//! Filter definitions as resolved for a single request.
//!
//! A [`FilterSet`] is keyed by [`OrderingKey`]. Because it is a `BTreeMap`,
//! keys are unique and iteration is always ascending, whatever order the
//! entries were inserted or decoded in.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a filter within one lifecycle point. Lower keys run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderingKey(pub u32);

impl From<u32> for OrderingKey {
    fn from(key: u32) -> Self {
        Self(key)
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server tier of the two-tier storage topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Front-end tier facing clients.
    Proxy,
    /// Back-end tier holding object data.
    Object,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Proxy => "proxy",
            Tier::Object => "object",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution engine responsible for a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Runs out of process through a [`ComputedFunctionEngine`](crate::engine::ComputedFunctionEngine).
    ComputedFunction,
    /// Runs in process through the [`NativeFilterRegistry`](crate::engine::NativeFilterRegistry).
    Native,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::ComputedFunction => "computed_function",
            FilterKind::Native => "native",
        }
    }
}

/// Moment in the request lifecycle at which a filter fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePoint {
    /// Before a GET is issued to storage.
    PreGet,
    /// On the GET response, before it reaches the client.
    PostGet,
    /// Before a PUT body is written to storage.
    PrePut,
}

impl LifecyclePoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePoint::PreGet => "pre_get",
            LifecyclePoint::PostGet => "post_get",
            LifecyclePoint::PrePut => "pre_put",
        }
    }
}

impl fmt::Display for LifecyclePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured filter instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Tier that must execute this filter.
    pub tier: Tier,

    /// Engine that handles it.
    pub kind: FilterKind,

    /// Lifecycle point it is registered for.
    pub when: LifecyclePoint,

    /// Registry key (native) or executable (computed function).
    pub entry_point: String,

    /// Opaque parameters handed to the engine unmodified.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Filters resolved for one request, in execution order.
pub type FilterSet = BTreeMap<OrderingKey, FilterSpec>;

/// Narrow a filter set down to the filters registered for `point`.
pub fn select(filters: &FilterSet, point: LifecyclePoint) -> FilterSet {
    filters
        .iter()
        .filter(|(_, spec)| spec.when == point)
        .map(|(key, spec)| (*key, spec.clone()))
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn filter(entry_point: &str, tier: Tier, kind: FilterKind, when: LifecyclePoint) -> FilterSpec {
        FilterSpec {
            tier,
            kind,
            when,
            entry_point: entry_point.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn native(entry_point: &str, tier: Tier, when: LifecyclePoint) -> FilterSpec {
        filter(entry_point, tier, FilterKind::Native, when)
    }
}
