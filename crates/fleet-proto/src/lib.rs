pub mod event;
pub mod telemetry;
pub mod topic;
