//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl+C / SIGTERM → broadcast → server stops accepting → drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - Signal handling lives here, not in the server, so tests can trigger shutdown directly

pub mod shutdown;

pub use shutdown::Shutdown;
