//! Generation adapter.
//!
//! Turns a brief, its attachments and (for revisions) the current workspace
//! into a prompt, sends it to a [`TextGenerator`], and parses the reply into
//! an ordered list of files. A reply that cannot be parsed is an error; the
//! adapter never returns a partial result.

pub mod client;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attachments::AttachmentDescriptor;
use crate::errors::GenerationError;
use crate::jobs::workspace::{WorkspaceFile, safe_relative_path};
use crate::util::{json_array_candidates, strip_code_fence};

pub use client::{ChatCompletionsClient, TextGenerator};

/// The system prompt sent with every generation request.
pub const GENERATION_SYSTEM_PROMPT: &str = r#"You are an expert web developer who builds small, self-contained static web apps.

Return ONLY a JSON array (no prose, no Markdown fences) in exactly this format:
[
  {"path": "index.html", "content": "<!DOCTYPE html>..."},
  {"path": "script.js", "content": "..."}
]

Rules:
- Paths are relative to the repository root; never absolute, never containing "..".
- The app must run as a static site with no build step; index.html is the entry point.
- Load third-party libraries from a CDN only when needed.
- Attachments live under attachments/ and may be referenced by relative path.
- When existing files are provided, return the complete new content of every file you change or add."#;

/// Total characters of prior workspace content included in a revision prompt.
const MAX_EXISTING_CHARS: usize = 60_000;

/// One file proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    /// Workspace-relative path, already validated by the parser.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

#[derive(Deserialize)]
struct FilesEnvelope {
    files: Vec<GeneratedFile>,
}

/// Everything the adapter needs to ask for one round of files.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub task: String,
    pub brief: String,
    pub round: u32,
    pub checks: Vec<String>,
    pub attachments: Vec<AttachmentDescriptor>,
    /// Prior workspace contents; only used when `round > 1`
    pub existing: Vec<WorkspaceFile>,
}

/// Build the user prompt for `request`.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "## Task\n{}\n\n## Round\n{}\n\n## Brief\n{}\n",
        request.task,
        request.round,
        request.brief.trim()
    );

    if !request.checks.is_empty() {
        prompt.push_str("\n## Checks the result must pass\n");
        for check in &request.checks {
            prompt.push_str(&format!("- {}\n", check));
        }
    }

    if !request.attachments.is_empty() {
        prompt.push_str("\n## Attachments\n");
        for attachment in &request.attachments {
            prompt.push_str(&format!(
                "- {} ({}, {} bytes, sha256 {})\n",
                attachment.path, attachment.mime, attachment.size, attachment.sha256
            ));
            if let Some(ref preview) = attachment.preview {
                prompt.push_str(&format!("  Preview:\n```\n{}\n```\n", preview));
            }
        }
    }

    if request.round > 1 && !request.existing.is_empty() {
        prompt.push_str("\n## Existing files\nRevise the app below to satisfy the brief.\n");
        let mut budget = MAX_EXISTING_CHARS;
        for file in &request.existing {
            if budget == 0 {
                prompt.push_str(&format!("\n### {}\n(omitted)\n", file.path));
                continue;
            }
            let shown: String = file.content.chars().take(budget).collect();
            budget = budget.saturating_sub(shown.chars().count());
            prompt.push_str(&format!("\n### {}\n```\n{}\n```\n", file.path, shown));
        }
    }

    prompt
}

fn parse_file_list(candidate: &str) -> Option<Vec<GeneratedFile>> {
    if let Ok(files) = serde_json::from_str::<Vec<GeneratedFile>>(candidate) {
        return Some(files);
    }
    serde_json::from_str::<FilesEnvelope>(candidate)
        .ok()
        .map(|envelope| envelope.files)
}

/// Parse a model reply into a validated file list.
///
/// Tries the whole reply, then the reply without a Markdown fence, then every
/// balanced `[...]` region in it. The first non-empty list wins.
pub fn parse_generated_files(output: &str) -> Result<Vec<GeneratedFile>, GenerationError> {
    let unfenced = strip_code_fence(output);
    let files = [output.trim(), unfenced]
        .into_iter()
        .chain(json_array_candidates(unfenced))
        .filter_map(parse_file_list)
        .find(|files| !files.is_empty())
        .ok_or_else(|| GenerationError::MalformedModelOutput {
            reason: "no JSON array of {path, content} objects found".to_string(),
            raw: output.to_string(),
        })?;

    files
        .into_iter()
        .map(|file| {
            let clean = safe_relative_path(&file.path).ok_or_else(|| GenerationError::UnsafePath {
                path: file.path.clone(),
            })?;
            Ok(GeneratedFile {
                path: clean.to_string_lossy().replace('\\', "/"),
                content: file.content,
            })
        })
        .collect()
}

/// Generation adapter over any [`TextGenerator`].
#[derive(Clone)]
pub struct FileGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl FileGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<GeneratedFile>, GenerationError> {
        let prompt = build_prompt(request);
        let reply = self
            .generator
            .complete(GENERATION_SYSTEM_PROMPT, &prompt)
            .await?;

        match parse_generated_files(&reply) {
            Ok(files) => {
                tracing::info!(files = files.len(), "Model returned files");
                Ok(files)
            }
            Err(e) => {
                tracing::error!(error = %e, reply_chars = reply.len(), "Unusable model reply");
                Err(e)
            }
        }
    }
}
