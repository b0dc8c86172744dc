//! Storage filter gateway.
//!
//! Runs user-defined filters over object data as it moves between clients and
//! an object store. The same binary runs on either tier of the store:
//!
//! ```text
//!   client ──▶ proxy tier ──▶ object tier ──▶ disk
//!              (gateway)      (gateway)
//!                  │   x-filter-delegation   │
//!                  └─────────────────────────┘
//! ```
//!
//! Each tier runs the filters it owns at the current lifecycle point and
//! delegates the rest to its peer through a request or response header.
//!
//! # Modules
//! - `filter`: context extraction, the execution controller, lifecycle hooks
//! - `engine`: computed-function and native filter engines
//! - `metadata`: where filter sets and account settings come from
//! - `http`: the axum server wrapping the pipeline around a storage backend
//! - `config`, `observability`, `lifecycle`: ambient plumbing

pub mod config;
pub mod engine;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod metadata;
pub mod observability;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
