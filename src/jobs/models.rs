use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::GatewayError;

/// One inline file attached to a job request: `{name, url}` where `url` is a data URI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AttachmentPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of `POST /api-endpoint` as received, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitPayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default, deserialize_with = "deserialize_round")]
    pub round: Option<u32>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub brief: Option<String>,
    #[serde(default)]
    pub evaluation_url: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<AttachmentPayload>>,
    #[serde(default)]
    pub checks: Option<Vec<serde_json::Value>>,
}

/// Accept `2` as well as `"2"`; anything else is a validation error.
fn deserialize_round<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid round: {}", n))),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid round: {:?}", s))),
        Some(other) => Err(D::Error::custom(format!("invalid round: {}", other))),
    }
}

/// A validated, immutable job request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobRequest {
    pub email: String,
    pub task: String,
    /// 1 = initial build, 2+ = revision
    pub round: u32,
    pub nonce: String,
    pub brief: String,
    pub evaluation_url: String,
    pub attachments: Vec<AttachmentPayload>,
    pub checks: Vec<String>,
}

impl JobRequest {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            email: self.email.clone(),
            task: self.task.clone(),
            round: self.round,
        }
    }

    pub fn is_revision(&self) -> bool {
        self.round > 1
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, GatewayError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::Validation(format!("missing required field `{}`", field)))
}

impl TryFrom<SubmitPayload> for JobRequest {
    type Error = GatewayError;

    fn try_from(payload: SubmitPayload) -> Result<Self, Self::Error> {
        let email = required(payload.email, "email")?;
        let task = required(payload.task, "task")?;
        let evaluation_url = required(payload.evaluation_url, "evaluation_url")?;

        let parsed = reqwest::Url::parse(&evaluation_url).map_err(|e| {
            GatewayError::Validation(format!("invalid evaluation_url '{}': {}", evaluation_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayError::Validation(format!(
                "evaluation_url must be http(s), got '{}'",
                parsed.scheme()
            )));
        }

        let round = payload.round.unwrap_or(1);
        if round == 0 {
            return Err(GatewayError::Validation("round must be 1 or greater".into()));
        }

        let nonce = payload
            .nonce
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let checks = payload
            .checks
            .unwrap_or_default()
            .into_iter()
            .map(|check| match check {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();

        Ok(JobRequest {
            email,
            task,
            round,
            nonce,
            brief: payload.brief.unwrap_or_default(),
            evaluation_url,
            attachments: payload.attachments.unwrap_or_default(),
            checks,
        })
    }
}

/// At most one in-flight job exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub email: String,
    pub task: String,
    pub round: u32,
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/round-{}", self.email, self.task, self.round)
    }
}

/// Immediate acknowledgment returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Acknowledgment {
    pub status: String,
    pub message: String,
    pub task: String,
    pub round: u32,
}

/// Body POSTed to the caller's evaluation URL once a job finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPayload {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}
