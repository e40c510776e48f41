//! Layered configuration for the pagesmith service.
//!
//! Values are resolved in this order, later layers winning:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config <path>` or `PAGESMITH_CONFIG`)
//! 3. Environment variables (a `.env` file is loaded into the environment first)
//! 4. CLI flags
//!
//! # Configuration File Format
//!
//! ```toml
//! secret = "shared-secret"
//! workspace_root = "./repos"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [github]
//! username = "octocat"
//! token = "ghp_..."
//! branch = "main"
//!
//! [llm]
//! model = "gpt-4o-mini"
//! max_tokens = 4096
//!
//! [liveness]
//! interval_secs = 5
//! timeout_secs = 180
//!
//! [notify]
//! max_attempts = 5
//! initial_delay_secs = 1
//!
//! [logging]
//! format = "json"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AIPIPE_BASE_URL: &str = "https://aipipe.org/openai/v1";

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Redacted(String);

impl Redacted {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Redacted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "<unset>")
        } else {
            write!(f, "<redacted>")
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Hosting account used to create repositories and publish pages.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubSection {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: Redacted,
    /// REST API root
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Prefix used to build clone/push URLs (`<remote_base>/<user>/<repo>.git`)
    #[serde(default = "default_github_remote_base")]
    pub remote_base: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Commit author email; derived from the username when unset
    #[serde(default)]
    pub commit_email: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_remote_base() -> String {
    "https://github.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            username: String::new(),
            token: Redacted::default(),
            api_url: default_github_api_url(),
            remote_base: default_github_remote_base(),
            branch: default_branch(),
            commit_email: None,
        }
    }
}

impl GitHubSection {
    pub fn commit_email(&self) -> String {
        self.commit_email
            .clone()
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", self.username))
    }
}

/// Text-generation service settings (any OpenAI-compatible chat endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub api_key: Redacted,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout_secs() -> u64 {
    300
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            api_key: Redacted::default(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmSection {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL)
    }
}

/// Static-site liveness polling.
#[derive(Debug, Clone, Deserialize)]
pub struct LivenessSection {
    #[serde(default = "default_liveness_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_liveness_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_liveness_interval_secs() -> u64 {
    5
}

fn default_liveness_timeout_secs() -> u64 {
    180
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            interval_secs: default_liveness_interval_secs(),
            timeout_secs: default_liveness_timeout_secs(),
        }
    }
}

/// Callback delivery retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_notify_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_secs() -> u64 {
    1
}

fn default_notify_timeout_secs() -> u64 {
    15
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            request_timeout_secs: default_notify_timeout_secs(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    /// Raise the default filter to `debug`
    #[serde(default)]
    pub debug: bool,
}

/// Fully resolved service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Shared secret every job request must carry
    #[serde(default)]
    pub secret: Redacted,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub liveness: LivenessSection,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./repos")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            secret: Redacted::default(),
            workspace_root: default_workspace_root(),
            server: ServerSection::default(),
            github: GitHubSection::default(),
            llm: LlmSection::default(),
            liveness: LivenessSection::default(),
            notify: NotifySection::default(),
            logging: LoggingSection::default(),
        }
    }
}

/// CLI-provided overrides; `None` leaves the lower layers untouched.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workspace_root: Option<PathBuf>,
    pub verbose: bool,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse pagesmith config")
    }

    /// Resolve all layers: file (if any) → process environment → CLI.
    pub fn resolve(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        // A missing .env is not an error.
        let _ = dotenvy::dotenv();

        let env_path = std::env::var("PAGESMITH_CONFIG").ok().map(PathBuf::from);
        let mut config = match config_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = get("STUDENT_SECRET") {
            self.secret = Redacted::new(secret);
        }
        if let Some(root) = get("BASE_REPO_DIR") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", port))?;
        }

        if let Some(username) = get("GITHUB_USERNAME") {
            self.github.username = username;
        }
        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = Redacted::new(token);
        }
        if let Some(url) = get("GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(base) = get("GITHUB_REMOTE_BASE") {
            self.github.remote_base = base;
        }
        if let Some(email) = get("GIT_COMMIT_EMAIL") {
            self.github.commit_email = Some(email);
        }

        // LLM_API_KEY wins; an AI Pipe token implies the AI Pipe proxy.
        if let Some(key) = get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.llm.api_key = Redacted::new(key);
        } else if let Some(token) = get("AIPIPE_TOKEN") {
            self.llm.api_key = Redacted::new(token);
            if self.llm.base_url.is_none() {
                self.llm.base_url = Some(DEFAULT_AIPIPE_BASE_URL.to_string());
            }
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(max_tokens) = get("LLM_MAX_TOKENS") {
            self.llm.max_tokens = max_tokens
                .parse()
                .with_context(|| format!("Invalid LLM_MAX_TOKENS value '{}'", max_tokens))?;
        }

        if let Some(format) = get("LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(debug) = get("DEBUG_MODE") {
            self.logging.debug = debug.eq_ignore_ascii_case("true");
        }

        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(ref host) = cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(ref root) = cli.workspace_root {
            self.workspace_root = root.clone();
        }
        if cli.verbose {
            self.logging.debug = true;
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness.interval_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness.timeout_secs)
    }

    /// Problems that make the service unusable. `serve` refuses to start on any of these.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.secret.is_empty() {
            errors.push("STUDENT_SECRET is not set; every job request would be rejected".to_string());
        }
        if self.notify.max_attempts == 0 {
            errors.push("notify.max_attempts must be at least 1".to_string());
        }
        if self.liveness.interval_secs == 0 {
            errors.push("liveness.interval_secs must be at least 1".to_string());
        }
        errors
    }

    /// Problems that let the service start but will make jobs fail.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.github.username.is_empty() {
            warnings.push("GITHUB_USERNAME is not set; publishing will fail".to_string());
        }
        if self.github.token.is_empty() {
            warnings.push("GITHUB_TOKEN is not set; publishing will fail".to_string());
        }
        if self.llm.api_key.is_empty() {
            warnings.push(
                "No LLM key (LLM_API_KEY, OPENAI_API_KEY or AIPIPE_TOKEN); generation will fail"
                    .to_string(),
            );
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.workspace_root, PathBuf::from("./repos"));
        assert_eq!(config.github.branch, "main");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.base_url(), DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.notify.max_attempts, 5);
        assert_eq!(config.notify.initial_delay_secs, 1);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_empty_toml_uses_defaults() {
        let config = ServiceConfig::parse("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert!(config.secret.is_empty());
    }

    #[test]
    fn test_parse_sections() {
        let content = r#"
secret = "s3cret"
workspace_root = "/var/lib/pagesmith"

[server]
port = 9001

[github]
username = "octocat"
branch = "gh-pages"

[notify]
max_attempts = 3

[logging]
format = "json"
"#;
        let config = ServiceConfig::parse(content).unwrap();
        assert_eq!(config.secret.expose(), "s3cret");
        assert_eq!(config.workspace_root, PathBuf::from("/var/lib/pagesmith"));
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.github.username, "octocat");
        assert_eq!(config.github.branch, "gh-pages");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.notify.max_attempts, 3);
        assert_eq!(config.notify.initial_delay_secs, 1);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        assert!(ServiceConfig::parse("server = [").is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = ServiceConfig::parse("secret = \"from-file\"\n[server]\nport = 1\n").unwrap();
        config
            .apply_env(env(&[
                ("STUDENT_SECRET", "from-env"),
                ("PORT", "8080"),
                ("GITHUB_USERNAME", "alice"),
                ("GITHUB_TOKEN", "ghp_x"),
                ("BASE_REPO_DIR", "/tmp/repos"),
            ]))
            .unwrap();
        assert_eq!(config.secret.expose(), "from-env");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.github.username, "alice");
        assert_eq!(config.github.token.expose(), "ghp_x");
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/repos"));
    }

    #[test]
    fn test_env_blank_values_are_ignored() {
        let mut config = ServiceConfig::default();
        config.apply_env(env(&[("STUDENT_SECRET", "  ")])).unwrap();
        assert!(config.secret.is_empty());
    }

    #[test]
    fn test_env_invalid_port_fails() {
        let mut config = ServiceConfig::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_aipipe_token_selects_proxy() {
        let mut config = ServiceConfig::default();
        config.apply_env(env(&[("AIPIPE_TOKEN", "ap-1")])).unwrap();
        assert_eq!(config.llm.api_key.expose(), "ap-1");
        assert_eq!(config.llm.base_url(), DEFAULT_AIPIPE_BASE_URL);
    }

    #[test]
    fn test_openai_key_preferred_over_aipipe() {
        let mut config = ServiceConfig::default();
        config
            .apply_env(env(&[("OPENAI_API_KEY", "sk-1"), ("AIPIPE_TOKEN", "ap-1")]))
            .unwrap();
        assert_eq!(config.llm.api_key.expose(), "sk-1");
        assert_eq!(config.llm.base_url(), DEFAULT_OPENAI_BASE_URL);
    }

    #[test]
    fn test_debug_mode_env() {
        let mut config = ServiceConfig::default();
        config.apply_env(env(&[("DEBUG_MODE", "TRUE")])).unwrap();
        assert!(config.logging.debug);
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = ServiceConfig::default();
        config.apply_env(env(&[("PORT", "8080")])).unwrap();
        config.apply_cli(&CliOverrides {
            port: Some(3000),
            host: Some("127.0.0.1".to_string()),
            workspace_root: None,
            verbose: true,
        });
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert!(config.logging.debug);
    }

    #[test]
    fn test_commit_email_defaults_to_noreply() {
        let mut github = GitHubSection::default();
        github.username = "octocat".to_string();
        assert_eq!(github.commit_email(), "octocat@users.noreply.github.com");
        github.commit_email = Some("me@example.com".to_string());
        assert_eq!(github.commit_email(), "me@example.com");
    }

    #[test]
    fn test_redacted_debug_hides_value() {
        let secret = Redacted::new("hunter2");
        let shown = format!("{:?}", secret);
        assert!(!shown.contains("hunter2"));
        assert_eq!(format!("{:?}", Redacted::default()), "<unset>");

        let mut config = ServiceConfig::default();
        config.github.token = Redacted::new("ghp_supersecret");
        assert!(!format!("{:?}", config).contains("ghp_supersecret"));
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let config = ServiceConfig::default();
        assert!(config.errors().iter().any(|e| e.contains("STUDENT_SECRET")));

        let mut config = ServiceConfig::default();
        config.secret = Redacted::new("s");
        assert!(config.errors().is_empty());
    }

    #[test]
    fn test_missing_credentials_are_warnings() {
        let warnings = ServiceConfig::default().warnings();
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
