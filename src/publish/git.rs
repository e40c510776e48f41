//! Local version control for published workspaces.
//!
//! Repository state (init, staging, commits, status, HEAD) goes through
//! `git2` and must be called from a blocking context. Network operations
//! (clone, pull, push) shell out to the `git` CLI so they honor the user's
//! transport configuration.

use std::path::Path;
use std::process::Stdio;

use base64::{Engine, engine::general_purpose};
use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature, StatusOptions};

use crate::errors::PublishError;

/// Commit identifier reported when HEAD cannot be resolved.
pub const UNKNOWN_COMMIT: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// Open `dir` as a repository, initializing it on `branch` if needed, and
/// point `origin` at `remote_url`.
pub fn init_repository(
    dir: &Path,
    branch: &str,
    remote_url: &str,
    identity: &CommitIdentity,
) -> Result<(), PublishError> {
    let repo = match Repository::open(dir) {
        Ok(repo) => repo,
        Err(_) => {
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head(branch);
            Repository::init_opts(dir, &opts)?
        }
    };

    if repo.find_remote("origin").is_ok() {
        repo.remote_set_url("origin", remote_url)?;
    } else {
        repo.remote("origin", remote_url)?;
    }
    configure_identity(&repo, identity)
}

/// Write the commit identity into the repository's local config so CLI
/// operations that create commits (rebase) use it too.
pub fn configure_identity(repo: &Repository, identity: &CommitIdentity) -> Result<(), PublishError> {
    let mut config = repo.config()?;
    config.set_str("user.name", &identity.name)?;
    config.set_str("user.email", &identity.email)?;
    Ok(())
}

/// Whether the working tree differs from HEAD (untracked files included).
pub fn has_changes(dir: &Path) -> Result<bool, PublishError> {
    let repo = Repository::open(dir)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(!statuses.is_empty())
}

/// Stage everything (additions, modifications, deletions) and commit.
///
/// Returns `None` without committing when the staged tree equals HEAD's.
pub fn commit_all(
    dir: &Path,
    message: &str,
    identity: &CommitIdentity,
) -> Result<Option<String>, PublishError> {
    let repo = Repository::open(dir)?;
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"].iter(), None)?;
    index.write()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let sig = Signature::now(&identity.name, &identity.email)?;

    // Unborn branch: first commit has no parent.
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    if let Some(ref parent) = parent
        && parent.tree_id() == tree_id
    {
        return Ok(None);
    }
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
    Ok(Some(oid.to_string()))
}

/// SHA of HEAD, or [`UNKNOWN_COMMIT`].
pub fn head_sha(dir: &Path) -> String {
    Repository::open(dir)
        .ok()
        .and_then(|repo| {
            repo.head()
                .ok()
                .and_then(|head| head.peel_to_commit().ok())
                .map(|commit| commit.id().to_string())
        })
        .unwrap_or_else(|| UNKNOWN_COMMIT.to_string())
}

/// `Authorization` header value for HTTPS basic auth against the hosting remote.
pub fn basic_auth_header(username: &str, token: &str) -> String {
    let encoded = general_purpose::STANDARD.encode(format!("{}:{}", username, token));
    format!("Authorization: Basic {}", encoded)
}

/// Runs `git` subcommands that talk to the remote.
///
/// Credentials travel as an `http.extraHeader` supplied through
/// `GIT_CONFIG_*` environment variables, so they appear neither in argv nor
/// in any repository config.
#[derive(Clone, Default)]
pub struct GitCli {
    auth_header: Option<String>,
}

impl std::fmt::Debug for GitCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCli")
            .field("authenticated", &self.auth_header.is_some())
            .finish()
    }
}

impl GitCli {
    pub fn new(username: &str, token: &str) -> Self {
        let auth_header = (!token.is_empty()).then(|| basic_auth_header(username, token));
        Self { auth_header }
    }

    /// Run `git <args>` in `dir`; a non-zero exit becomes [`PublishError::Git`].
    pub async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, PublishError> {
        let command = args.first().copied().unwrap_or("git").to_string();
        let mut cmd = tokio::process::Command::new("git");
        cmd.args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref header) = self.auth_header {
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", header);
        }

        let output = cmd.output().await.map_err(|e| PublishError::Git {
            command: command.clone(),
            message: format!("failed to spawn git: {}", e),
        })?;

        if !output.status.success() {
            return Err(PublishError::Git {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn clone_into(&self, url: &str, target: &Path, cwd: &Path) -> Result<(), PublishError> {
        let target = target.to_string_lossy();
        self.run(cwd, &["clone", url, target.as_ref()]).await.map(|_| ())
    }

    pub async fn pull_rebase(&self, dir: &Path, branch: &str) -> Result<(), PublishError> {
        self.run(dir, &["pull", "--rebase", "origin", branch])
            .await
            .map(|_| ())
    }

    pub async fn push(&self, dir: &Path, branch: &str, force: bool) -> Result<(), PublishError> {
        let mut args = vec!["push", "-u", "origin", branch];
        if force {
            args.push("--force");
        }
        self.run(dir, &args).await.map(|_| ())
    }
}
