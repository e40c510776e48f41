pub mod attachments;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod generate;
pub mod jobs;
pub mod liveness;
pub mod notify;
pub mod publish;
pub mod telemetry;
pub mod util;
