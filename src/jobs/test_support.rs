//! In-process collaborators for generator, pipeline and gateway tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::errors::{GenerationError, PublishError};
use crate::generate::{FileGenerator, TextGenerator};
use crate::liveness::LivenessPoller;
use crate::notify::{Notifier, RetryPolicy};
use crate::publish::{PublishOutcome, Publisher};

use super::pipeline::JobPipeline;

pub const FILES_REPLY: &str = r#"[{"path": "index.html", "content": "<h1>hello</h1>"}, {"path": "js/app.js", "content": "1"}]"#;

pub struct CannedGenerator {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Records every call; optionally waits on `gate` or panics.
#[derive(Default)]
pub struct FakePublisher {
    pub pages_url: String,
    pub calls: Mutex<Vec<(String, PathBuf, u32)>>,
    pub gate: Option<Arc<Semaphore>>,
    pub panic: bool,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        repo_name: &str,
        workspace: &Path,
        round: u32,
    ) -> Result<PublishOutcome, PublishError> {
        self.calls
            .lock()
            .unwrap()
            .push((repo_name.to_string(), workspace.to_path_buf(), round));
        if let Some(ref gate) = self.gate {
            let _permit = gate.acquire().await;
        }
        if self.panic {
            panic!("publisher exploded");
        }
        Ok(PublishOutcome {
            repo_name: repo_name.to_string(),
            repo_url: format!("https://github.com/octocat/{}", repo_name),
            commit_sha: "abc123".into(),
            pages_url: self.pages_url.clone(),
        })
    }
}

/// Pipeline with millisecond-scale liveness and retry timings.
pub fn fast_pipeline(
    root: &Path,
    generator: Arc<CannedGenerator>,
    publisher: Arc<FakePublisher>,
) -> JobPipeline {
    JobPipeline::new(
        root.to_path_buf(),
        "octocat".into(),
        FileGenerator::new(generator),
        publisher,
        LivenessPoller::new(
            reqwest::Client::new(),
            Duration::from_millis(10),
            Duration::from_millis(100),
        ),
        Notifier::new(
            reqwest::Client::new(),
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(10),
            },
        ),
    )
}
