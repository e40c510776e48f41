//! Publisher: pushes a workspace to a hosting repository and serves it as a static site.
//!
//! Round 1 creates the repository and pushes the workspace as-is. Later
//! rounds clone the repository, overlay the workspace onto the clone, and
//! push only if something changed. Network failures after repository
//! creation are logged, never fatal: the caller always gets a
//! `(repo, commit, url)` triple.

pub mod git;
pub mod github;
pub mod overlay;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::GitHubSection;
use crate::errors::PublishError;

use self::git::{CommitIdentity, GitCli};
use self::github::{GitHubApi, PagesActivation, RepoCreation};

/// Where the published result lives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishOutcome {
    pub repo_name: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `workspace` as repository `repo_name` for `round`.
    async fn publish(
        &self,
        repo_name: &str,
        workspace: &Path,
        round: u32,
    ) -> Result<PublishOutcome, PublishError>;
}

/// Static-site address for `repo` under `owner`.
pub fn pages_url(owner: &str, repo: &str) -> String {
    format!("https://{}.github.io/{}/", owner.to_lowercase(), repo)
}

async fn blocking<T, F>(f: F) -> Result<T, PublishError>
where
    F: FnOnce() -> Result<T, PublishError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PublishError::Other(anyhow::anyhow!("blocking git task failed: {}", e)))?
}

/// GitHub-backed publisher.
pub struct GitHubPublisher {
    api: GitHubApi,
    git: GitCli,
    owner: String,
    remote_base: String,
    branch: String,
    identity: CommitIdentity,
}

impl GitHubPublisher {
    pub fn from_config(github: &GitHubSection) -> anyhow::Result<Self> {
        Ok(Self {
            api: GitHubApi::new(&github.api_url, github.token.expose())?,
            git: GitCli::new(&github.username, github.token.expose()),
            owner: github.username.clone(),
            remote_base: github.remote_base.trim_end_matches('/').to_string(),
            branch: github.branch.clone(),
            identity: CommitIdentity {
                name: github.username.clone(),
                email: github.commit_email(),
            },
        })
    }

    pub fn repo_url(&self, repo: &str) -> String {
        format!("{}/{}/{}", self.remote_base, self.owner, repo)
    }

    pub fn remote_url(&self, repo: &str) -> String {
        format!("{}.git", self.repo_url(repo))
    }

    fn outcome(&self, repo: &str, commit_sha: String) -> PublishOutcome {
        PublishOutcome {
            repo_name: repo.to_string(),
            repo_url: self.repo_url(repo),
            commit_sha,
            pages_url: pages_url(&self.owner, repo),
        }
    }

    async fn head_sha(dir: &Path) -> String {
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || git::head_sha(&dir))
            .await
            .unwrap_or_else(|_| git::UNKNOWN_COMMIT.to_string())
    }

    async fn initial_publish(&self, repo: &str, workspace: &Path) -> Result<PublishOutcome, PublishError> {
        match self
            .api
            .create_repo(repo, &format!("Static app for task {}", repo))
            .await?
        {
            RepoCreation::Created => tracing::info!(repo, "Created repository"),
            RepoCreation::AlreadyExists => {
                tracing::warn!(repo, "Repository already exists; publishing into it")
            }
        }

        let dir = workspace.to_path_buf();
        let branch = self.branch.clone();
        let remote = self.remote_url(repo);
        let identity = self.identity.clone();
        let committed = blocking(move || {
            git::init_repository(&dir, &branch, &remote, &identity)?;
            git::commit_all(&dir, "Initial commit", &identity)
        })
        .await?;
        if let Some(ref sha) = committed {
            tracing::info!(sha = %sha, "Committed workspace");
        }

        if let Err(e) = self.git.push(workspace, &self.branch, true).await {
            tracing::error!(repo, error = %e, "Push failed; continuing");
        }

        match self.api.enable_pages(&self.owner, repo, &self.branch).await {
            Ok(PagesActivation::Enabled) => tracing::info!(repo, "Pages enabled"),
            Ok(PagesActivation::AlreadyEnabled) => tracing::info!(repo, "Pages already enabled"),
            Err(e) => tracing::warn!(repo, error = %e, "Pages activation failed"),
        }

        Ok(self.outcome(repo, Self::head_sha(workspace).await))
    }

    async fn incremental_update(
        &self,
        repo: &str,
        workspace: &Path,
        round: u32,
    ) -> Result<PublishOutcome, PublishError> {
        let scratch = scratch_dir(workspace);
        remove_dir_if_exists(&scratch).await?;
        let cwd = workspace.parent().unwrap_or_else(|| Path::new("."));

        if let Err(e) = self
            .git
            .clone_into(&self.remote_url(repo), &scratch, cwd)
            .await
        {
            tracing::warn!(repo, error = %e, "Clone failed; falling back to initial publish");
            return self.initial_publish(repo, workspace).await;
        }

        let src = workspace.to_path_buf();
        let dst = scratch.clone();
        let identity = self.identity.clone();
        let message = format!("Round {} update", round);
        let committed = blocking(move || {
            let stats = overlay::overlay_tree(&src, &dst).map_err(|source| PublishError::Io {
                path: dst.clone(),
                source,
            })?;
            tracing::debug!(
                files = stats.files_copied,
                dirs_replaced = stats.dirs_replaced,
                "Overlaid workspace onto clone"
            );

            let clone = git2::Repository::open(&dst)?;
            git::configure_identity(&clone, &identity)?;
            if !git::has_changes(&dst)? {
                return Ok(None);
            }
            git::commit_all(&dst, &message, &identity)
        })
        .await;

        match committed {
            Ok(Some(ref sha)) => tracing::info!(sha = %sha, "Committed revision"),
            Ok(None) => tracing::info!(repo, "No changes to commit"),
            Err(e) => tracing::error!(repo, error = %e, "Could not apply revision to clone; continuing"),
        }

        if let Err(e) = self.git.pull_rebase(&scratch, &self.branch).await {
            tracing::warn!(repo, error = %e, "Pull --rebase failed; continuing");
        }
        if let Err(e) = self.git.push(&scratch, &self.branch, false).await {
            tracing::error!(repo, error = %e, "Push failed; continuing");
        }

        let sha = Self::head_sha(&scratch).await;
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            tracing::debug!(path = %scratch.display(), error = %e, "Could not remove clone");
        }
        Ok(self.outcome(repo, sha))
    }
}

fn scratch_dir(workspace: &Path) -> PathBuf {
    let name = workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    workspace.with_file_name(format!("{}_clone", name))
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), PublishError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PublishError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[async_trait]
impl Publisher for GitHubPublisher {
    async fn publish(
        &self,
        repo_name: &str,
        workspace: &Path,
        round: u32,
    ) -> Result<PublishOutcome, PublishError> {
        if round <= 1 {
            self.initial_publish(repo_name, workspace).await
        } else {
            self.incremental_update(repo_name, workspace, round).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Redacted;
    use git2::{Repository, RepositoryInitOptions};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        server: MockServer,
        remotes: TempDir,
        root: TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            Self {
                server: MockServer::start().await,
                remotes: TempDir::new().unwrap(),
                root: TempDir::new().unwrap(),
            }
        }

        fn publisher(&self) -> GitHubPublisher {
            GitHubPublisher::from_config(&GitHubSection {
                username: "octocat".into(),
                token: Redacted::new("ghp_test"),
                api_url: self.server.uri(),
                remote_base: self.remotes.path().to_string_lossy().into_owned(),
                ..GitHubSection::default()
            })
            .unwrap()
        }

        fn bare_remote(&self, repo: &str) -> PathBuf {
            let path = self.remotes.path().join("octocat").join(format!("{}.git", repo));
            let mut opts = RepositoryInitOptions::new();
            opts.bare(true).initial_head("main");
            Repository::init_opts(&path, &opts).unwrap();
            path
        }

        fn workspace(&self) -> PathBuf {
            let ws = self.root.path().join("t1_n1_app");
            std::fs::create_dir_all(&ws).unwrap();
            ws
        }

        async fn mock_api(&self, create_status: u16, create_body: &str, create_calls: u64) {
            Mock::given(method("POST"))
                .and(path("/user/repos"))
                .respond_with(ResponseTemplate::new(create_status).set_body_string(create_body))
                .expect(create_calls)
                .mount(&self.server)
                .await;
            Mock::given(method("POST"))
                .and(path("/repos/octocat/t1/pages"))
                .respond_with(ResponseTemplate::new(201))
                .mount(&self.server)
                .await;
        }
    }

    fn remote_head(remote: &Path) -> String {
        let repo = Repository::open_bare(remote).unwrap();
        repo.find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .id()
            .to_string()
    }

    fn remote_file(remote: &Path, name: &str) -> Option<String> {
        let repo = Repository::open_bare(remote).unwrap();
        let tree = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_tree()
            .unwrap();
        let entry = tree.get_name(name)?;
        let blob = repo.find_blob(entry.id()).unwrap();
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }

    #[test]
    fn test_urls_are_derived_from_account_and_repo() {
        assert_eq!(pages_url("OctoCat", "t1"), "https://octocat.github.io/t1/");
        let publisher = GitHubPublisher::from_config(&GitHubSection {
            username: "octocat".into(),
            ..GitHubSection::default()
        })
        .unwrap();
        assert_eq!(publisher.repo_url("t1"), "https://github.com/octocat/t1");
        assert_eq!(publisher.remote_url("t1"), "https://github.com/octocat/t1.git");
    }

    #[test]
    fn test_scratch_dir_is_a_sibling() {
        assert_eq!(
            scratch_dir(Path::new("/repos/t1_n1_app")),
            PathBuf::from("/repos/t1_n1_app_clone")
        );
    }

    #[tokio::test]
    async fn test_round_one_tolerates_existing_repo() {
        let fx = Fixture::new().await;
        fx.mock_api(422, r#"{"errors":[{"message":"name already exists on this account"}]}"#, 1)
            .await;
        let remote = fx.bare_remote("t1");
        let ws = fx.workspace();
        std::fs::write(ws.join("index.html"), "<h1>hello</h1>").unwrap();

        let outcome = fx.publisher().publish("t1", &ws, 1).await.unwrap();

        assert_eq!(outcome.repo_name, "t1");
        assert_eq!(outcome.pages_url, "https://octocat.github.io/t1/");
        assert_eq!(outcome.commit_sha, remote_head(&remote));
        assert_eq!(remote_file(&remote, "index.html").as_deref(), Some("<h1>hello</h1>"));

        let requests = fx.server.received_requests().await.unwrap();
        assert!(
            requests.iter().any(|r| r.url.path() == "/repos/octocat/t1/pages"),
            "pages activation still requested"
        );
    }

    #[tokio::test]
    async fn test_round_one_fails_on_creation_error() {
        let fx = Fixture::new().await;
        fx.mock_api(401, "Bad credentials", 1).await;
        let ws = fx.workspace();

        let err = fx.publisher().publish("t1", &ws, 1).await.unwrap_err();
        assert!(matches!(err, PublishError::RepoCreation { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_round_two_commits_and_pushes_changes() {
        let fx = Fixture::new().await;
        fx.mock_api(201, "", 1).await;
        let remote = fx.bare_remote("t1");
        let ws = fx.workspace();
        std::fs::write(ws.join("index.html"), "v1").unwrap();
        let publisher = fx.publisher();
        let first = publisher.publish("t1", &ws, 1).await.unwrap();

        std::fs::write(ws.join("index.html"), "v2").unwrap();
        let second = publisher.publish("t1", &ws, 2).await.unwrap();

        assert_ne!(second.commit_sha, first.commit_sha);
        assert_eq!(second.commit_sha, remote_head(&remote));
        assert_eq!(remote_file(&remote, "index.html").as_deref(), Some("v2"));
        assert!(!scratch_dir(&ws).exists(), "clone is cleaned up");
    }

    #[tokio::test]
    async fn test_round_two_without_changes_does_not_commit() {
        let fx = Fixture::new().await;
        fx.mock_api(201, "", 1).await;
        let remote = fx.bare_remote("t1");
        let ws = fx.workspace();
        std::fs::write(ws.join("index.html"), "same").unwrap();
        let publisher = fx.publisher();
        let first = publisher.publish("t1", &ws, 1).await.unwrap();

        let second = publisher.publish("t1", &ws, 2).await.unwrap();

        assert_eq!(second.commit_sha, first.commit_sha);
        assert_eq!(remote_head(&remote), first.commit_sha);
    }

    #[tokio::test]
    async fn test_round_two_falls_back_when_clone_fails() {
        let fx = Fixture::new().await;
        // No bare remote: clone and push both fail, creation is retried.
        fx.mock_api(201, "", 1).await;
        let ws = fx.workspace();
        std::fs::write(ws.join("index.html"), "v1").unwrap();

        let outcome = fx.publisher().publish("t1", &ws, 2).await.unwrap();

        assert_eq!(outcome.repo_name, "t1");
        assert_eq!(outcome.commit_sha.len(), 40, "local commit still reported");
    }

    #[cfg(unix)]
    fn reject_pushes(remote: &Path) {
        use std::os::unix::fs::PermissionsExt;

        let hook = remote.join("hooks").join("pre-receive");
        std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
        std::fs::write(&hook, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_round_two_tolerates_rejected_push() {
        let fx = Fixture::new().await;
        fx.mock_api(201, "", 1).await;
        let remote = fx.bare_remote("t1");
        let ws = fx.workspace();
        std::fs::write(ws.join("index.html"), "v1").unwrap();
        let publisher = fx.publisher();
        let first = publisher.publish("t1", &ws, 1).await.unwrap();
        reject_pushes(&remote);

        std::fs::write(ws.join("index.html"), "v2").unwrap();
        let changed = publisher.publish("t1", &ws, 2).await.unwrap();

        assert_eq!(changed.repo_url, publisher.repo_url("t1"));
        assert_eq!(changed.pages_url, "https://octocat.github.io/t1/");
        assert_ne!(changed.commit_sha, first.commit_sha, "local revision commit reported");
        assert_eq!(changed.commit_sha.len(), 40);
        assert_eq!(remote_head(&remote), first.commit_sha, "push was rejected");
        assert!(!scratch_dir(&ws).exists());

        std::fs::write(ws.join("index.html"), "v1").unwrap();
        let unchanged = publisher.publish("t1", &ws, 2).await.unwrap();

        assert_eq!(unchanged.commit_sha, first.commit_sha);
        assert_eq!(unchanged.repo_name, "t1");
        assert!(!scratch_dir(&ws).exists());
    }

    #[tokio::test]
    async fn test_round_two_overlay_failure_still_returns_triple() {
        let fx = Fixture::new().await;
        fx.mock_api(201, "", 1).await;
        let remote = fx.bare_remote("t1");
        let ws = fx.workspace();
        std::fs::write(ws.join("index.html"), "v1").unwrap();
        let publisher = fx.publisher();
        let first = publisher.publish("t1", &ws, 1).await.unwrap();

        // The clone succeeds but there is nothing to overlay from.
        let missing = fx.root.path().join("gone_app");
        let outcome = publisher.publish("t1", &missing, 2).await.unwrap();

        assert_eq!(outcome.commit_sha, first.commit_sha);
        assert_eq!(remote_head(&remote), first.commit_sha);
        assert!(!scratch_dir(&missing).exists(), "clone is cleaned up");
    }
}
