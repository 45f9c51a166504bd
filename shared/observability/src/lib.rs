//! Observability for the helpdesk RAG services.
//!
//! Provides tracing subscriber setup with console output plus a daily-rotating
//! log file per service under the configured log directory.

pub mod init;

pub use init::*;

// Re-export tracing for convenience
pub use tracing::{debug, error, info, trace, warn};
