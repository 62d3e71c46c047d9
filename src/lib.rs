pub mod app;
pub mod checks;
mod fixtures;
pub mod logging;
pub mod simulation;
pub mod telemetry;
