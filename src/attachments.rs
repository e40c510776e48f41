//! Attachment materializer: decodes inline `data:` URIs into the workspace.
//!
//! Only `data:` URLs are decoded. Entries without a name or URL, with a
//! remote URL, an unsafe name or an undecodable payload are skipped and
//! logged; none of these abort the job.

use std::path::Path;

use base64::{Engine, engine::general_purpose};
use serde::Serialize;

use crate::errors::JobError;
use crate::jobs::models::AttachmentPayload;
use crate::jobs::workspace::{ATTACHMENTS_DIR, Workspace, safe_relative_path};
use crate::util::sha256_hex;

const PREVIEW_CHARS: usize = 600;

/// What the generator is told about one saved attachment.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttachmentDescriptor {
    /// Workspace-relative path, e.g. `attachments/data.csv`
    pub path: String,
    pub name: String,
    pub mime: String,
    pub size: usize,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedData {
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Decode a `data:[<mime>][;base64],<payload>` URI.
///
/// Returns `Ok(None)` for anything that is not a data URI.
pub fn decode_data_uri(name: &str, url: &str) -> Result<Option<DecodedData>, JobError> {
    let Some(rest) = url.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(JobError::Attachment {
            name: name.to_string(),
            reason: "data URI has no ',' separator".to_string(),
        });
    };

    let mut params = header.split(';');
    let mime = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| JobError::Attachment {
                name: name.to_string(),
                reason: format!("invalid base64 payload: {}", e),
            })?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok(Some(DecodedData { mime, bytes }))
}

fn is_textual(mime: &str, bytes: &[u8]) -> bool {
    let textual_mime = mime.starts_with("text/")
        || matches!(
            mime,
            "application/json" | "application/xml" | "application/javascript" | "image/svg+xml"
        );
    textual_mime && !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}

fn preview(mime: &str, bytes: &[u8]) -> Option<String> {
    if !is_textual(mime, bytes) {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    Some(text.chars().take(PREVIEW_CHARS).collect())
}

/// Save every decodable attachment under `<workspace>/attachments`.
pub async fn materialize(
    workspace: &Workspace,
    attachments: &[AttachmentPayload],
) -> Result<Vec<AttachmentDescriptor>, JobError> {
    let mut saved = Vec::new();

    for attachment in attachments {
        let (Some(name), Some(url)) = (attachment.name.as_deref(), attachment.url.as_deref()) else {
            tracing::warn!("Skipping attachment without a name or url");
            continue;
        };
        let Some(relative) = safe_relative_path(name) else {
            tracing::warn!(name, "Skipping attachment with an unsafe name");
            continue;
        };
        let decoded = match decode_data_uri(name, url) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                tracing::info!(name, "Skipping non-data attachment url");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable attachment");
                continue;
            }
        };

        let mime = decoded.mime.clone().unwrap_or_else(|| {
            mime_guess::from_path(&relative)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

        let target = Path::new(ATTACHMENTS_DIR).join(&relative);
        workspace.write_file(&target, &decoded.bytes).await?;

        let descriptor = AttachmentDescriptor {
            path: target.to_string_lossy().replace('\\', "/"),
            name: name.to_string(),
            size: decoded.bytes.len(),
            sha256: sha256_hex(&decoded.bytes),
            preview: preview(&mime, &decoded.bytes),
            mime,
        };
        tracing::debug!(path = %descriptor.path, size = descriptor.size, "Saved attachment");
        saved.push(descriptor);
    }

    tracing::info!(
        saved = saved.len(),
        skipped = attachments.len() - saved.len(),
        "Materialized attachments"
    );
    Ok(saved)
}
