pub mod commands;
pub mod config;
pub mod registry;
pub mod supplier;
pub mod telemetry;
