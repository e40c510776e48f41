//! Callback delivery with bounded exponential backoff.

use std::time::Duration;

use crate::config::NotifySection;
use crate::errors::NotifyError;
use crate::jobs::models::NotificationPayload;

/// Attempt budget and deterministic delay sequence for callback delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(section: &NotifySection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            initial_delay: Duration::from_secs(section.initial_delay_secs),
        }
    }

    /// Wait after the failed `attempt` (1-based): `initial * 2^(attempt-1)`.
    /// `None` once the budget is spent, so the last attempt is never followed by a wait.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.initial_delay.saturating_mul(factor))
    }

    /// Every wait the policy would perform if all attempts fail.
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts).filter_map(|a| self.delay_after(a)).collect()
    }
}

/// Successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub attempts: u32,
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn from_config(section: &NotifySection) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.request_timeout_secs))
            .build()?;
        Ok(Self::new(client, RetryPolicy::from_config(section)))
    }

    /// POST `payload` to `url` until it answers HTTP 200 or the attempt budget runs out.
    pub async fn deliver(
        &self,
        url: &str,
        payload: &NotificationPayload,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.policy.max_attempts {
            match self.client.post(url).json(payload).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                    tracing::info!(attempt, url, "Callback delivered");
                    return Ok(DeliveryReceipt { attempts: attempt });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(attempt, %status, body = %body, "Callback rejected");
                    last_error = format!("HTTP {}", status);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Callback request failed");
                    last_error = e.to_string();
                }
            }

            if let Some(delay) = self.policy.delay_after(attempt) {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            attempts = self.policy.max_attempts,
            last_error = %last_error,
            "Giving up on callback delivery"
        );
        Err(NotifyError::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}
