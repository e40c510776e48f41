use std::time::Duration;

use tokio::time::Instant;

/// Polls a URL until it answers with a 2xx status or the timeout elapses.
#[derive(Clone)]
pub struct LivenessPoller {
    client: reqwest::Client,
    interval: Duration,
    timeout: Duration,
}

impl LivenessPoller {
    pub fn new(client: reqwest::Client, interval: Duration, timeout: Duration) -> Self {
        Self {
            client,
            interval,
            timeout,
        }
    }

    /// Probe `url` every interval. Network errors count as "not yet live";
    /// no probe runs past the deadline.
    pub async fn wait_until_live(&self, url: &str) -> bool {
        let deadline = Instant::now() + self.timeout;
        let mut probes = 0u32;

        loop {
            probes += 1;
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .max(Duration::from_millis(1));
            match self.client.get(url).timeout(remaining).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(url, probes, "Site is live");
                    return true;
                }
                Ok(resp) => {
                    tracing::debug!(url, probes, status = %resp.status(), "Site not live yet");
                }
                Err(e) => {
                    tracing::debug!(url, probes, error = %e, "Site probe failed");
                }
            }

            let now = Instant::now();
            if now + self.interval > deadline {
                tracing::warn!(url, probes, timeout_secs = self.timeout.as_secs(), "Site did not become live before timeout");
                return false;
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
