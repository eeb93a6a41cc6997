//! CLI command implementations.

pub mod config;
pub mod gateway;
pub mod shield;

pub use config::run_config;
pub use gateway::run_gateway;
pub use shield::run_shield;
