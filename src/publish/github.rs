use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::errors::PublishError;

const USER_AGENT: &str = "pagesmith";
const API_VERSION: &str = "2022-11-28";

/// Result of asking the hosting API for a new repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoCreation {
    Created,
    AlreadyExists,
}

/// Result of asking the hosting API to serve a branch as a static site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagesActivation {
    Enabled,
    AlreadyEnabled,
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Serialize)]
struct PagesSource<'a> {
    branch: &'a str,
    path: &'a str,
}

#[derive(Serialize)]
struct EnablePagesRequest<'a> {
    source: PagesSource<'a>,
}

/// Minimal REST client for repository creation and Pages activation.
#[derive(Clone)]
pub struct GitHubApi {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubApi {
    pub fn new(api_url: &str, token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build hosting API client")?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Create a public repository for the authenticated user.
    /// A 422 "already exists" reply is reported as [`RepoCreation::AlreadyExists`].
    pub async fn create_repo(&self, name: &str, description: &str) -> Result<RepoCreation, PublishError> {
        let resp = self
            .post("/user/repos")
            .json(&CreateRepoRequest {
                name,
                description,
                private: false,
                auto_init: false,
            })
            .send()
            .await
            .context("Failed to send create-repository request")
            .map_err(PublishError::HostingApi)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(RepoCreation::Created);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY && body.contains("already exists") {
            return Ok(RepoCreation::AlreadyExists);
        }
        Err(PublishError::RepoCreation {
            repo: name.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// Serve `branch` at the repository root as a static site.
    pub async fn enable_pages(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<PagesActivation, PublishError> {
        let resp = self
            .post(&format!("/repos/{}/{}/pages", owner, repo))
            .json(&EnablePagesRequest {
                source: PagesSource { branch, path: "/" },
            })
            .send()
            .await
            .context("Failed to send pages activation request")
            .map_err(PublishError::HostingApi)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(PagesActivation::Enabled);
        }
        if status == reqwest::StatusCode::CONFLICT {
            return Ok(PagesActivation::AlreadyEnabled);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(PublishError::HostingApi(anyhow::anyhow!(
            "pages activation for {}/{} returned {}: {}",
            owner,
            repo,
            status,
            body
        )))
    }
}
