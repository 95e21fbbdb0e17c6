//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Compile expressions → Build client → Bind listener
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Stop accepting → Drain in-flight requests → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then shared state, then listener
//! - The outbound client lives exactly as long as the server

pub mod signals;
pub mod startup;

pub use signals::shutdown_signal;
pub use startup::{build_state, compile_transform, StartupError};
