//! Core system components for robot operation
pub mod command;
pub mod resources;
pub mod telemetry;
