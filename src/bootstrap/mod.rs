pub mod config;
pub mod paths;
pub mod tracing;
pub mod wiring;
