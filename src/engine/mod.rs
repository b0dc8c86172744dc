//! Filter execution engines.
//!
//! # Data Flow
//! ```text
//! FilterController
//!     → kind = computed_function → ComputedFunctionEngine::run (process.rs)
//!     → kind = native            → NativeFilterRegistry lookup (native.rs)
//!                                 → factory builds NativeFilter
//!                                 → NativeFilter::execute
//!     ← output Body, fed to the next filter
//! ```
//!
//! # Design Decisions
//! - Engines see the message, the filter spec and an owned input body
//! - Native filters are found by registry key, never loaded by name at runtime
//! - Engine errors are boxed; the controller attaches the failing entry point

pub mod builtin;
pub mod native;
pub mod process;

use async_trait::async_trait;
use axum::body::Body;

use crate::filter::error::BoxError;
use crate::filter::spec::FilterSpec;
use crate::filter::target::FilterTarget;

pub use native::{NativeFilter, NativeFilterFactory, NativeFilterRegistry};
pub use process::ProcessEngine;

/// Runs computed-function filters outside the gateway process.
#[async_trait]
pub trait ComputedFunctionEngine: Send + Sync {
    /// Run `spec` over `input` and return the transformed stream.
    async fn run(
        &self,
        target: &mut FilterTarget<'_>,
        spec: &FilterSpec,
        input: Body,
    ) -> Result<Body, BoxError>;
}
