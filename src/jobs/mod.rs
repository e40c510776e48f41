//! Job model, dedup registry, workspaces and the orchestrating pipeline.

pub mod models;
pub mod pipeline;
pub mod registry;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;

pub use models::{
    Acknowledgment, AttachmentPayload, DedupKey, JobRequest, NotificationPayload, SubmitPayload,
};
pub use pipeline::{JobOutcome, JobPipeline, JobRunner};
pub use registry::{Admission, JobRegistry};
pub use workspace::Workspace;
