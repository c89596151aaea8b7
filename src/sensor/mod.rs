pub mod constants;
pub mod telemetry;
pub mod types;
