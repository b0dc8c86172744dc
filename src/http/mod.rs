//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request ID assigned and echoed)
//!     → server.rs (eligibility, lifecycle hooks, forwarding)
//!     → storage backend
//!     → server.rs (response hooks)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{load_metadata_store, HttpServer, ServerError, StorageBackend};
