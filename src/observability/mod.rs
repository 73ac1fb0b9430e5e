// Observability: metrics and logging

pub mod logging;
pub mod metrics;

// Re-export main functions for ease of use
pub use logging::init_logging;
