//! Filter execution subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → context.rs (parse path, classify eligibility)
//!     → handler.rs (per-request hooks: pre-get, post-get, pre-put)
//!     → spec.rs (narrow the filter set to the lifecycle point)
//!     → controller.rs (run local filters in order, compose body streams)
//!     → delegation.rs (remaining filters → x-filter-delegation header)
//!     → body and headers flow on to storage or client
//! ```
//!
//! # Design Decisions
//! - The controller is built once and shared; handlers are built per request
//! - Filter order is the order of ordering keys, never the order of arrival
//! - Cross-tier communication is limited to the delegation header and the body

pub mod context;
pub mod controller;
pub mod delegation;
pub mod error;
pub mod handler;
pub mod spec;
pub mod target;

pub use context::{eligibility, Eligibility, Ineligible, RequestContext};
pub use controller::{ExecutionReport, FilterController};
pub use error::{BoxError, FilterError, MetadataLookupError, ParseError};
pub use handler::FilterHandler;
pub use spec::{FilterKind, FilterSet, FilterSpec, LifecyclePoint, OrderingKey, Tier};
pub use target::{AppHandle, FilterTarget, RequestMetadata};
