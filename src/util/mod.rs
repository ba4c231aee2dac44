pub mod errors;
pub mod metrics;
pub mod secrets;
pub mod telemetry;
