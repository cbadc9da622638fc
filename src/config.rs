use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_JENKINS_URL: &str = "https://usw1-jenkins-002.blab.im/job/bebo-capture/";
pub const DEFAULT_JENKINS_TOKEN: &str = "uBC3kFJF";
pub const DEFAULT_ENVIRONMENT: &str = "dev";

const URL_ENV: &str = "TAGDEPLOY_JENKINS_URL";
const TOKEN_ENV: &str = "TAGDEPLOY_JENKINS_TOKEN";

/// Everything a single deploy run was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub verbose: bool,
    pub allow_dirty: bool,
    pub dry_run: bool,
    pub environment: String,
    pub tag: Option<String>,
    pub upload: bool,
    pub live: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            allow_dirty: false,
            dry_run: false,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            tag: None,
            upload: true,
            live: false,
        }
    }
}

impl DeployConfig {
    /// Live production builds need a manually signed certificate.
    pub fn is_live_production(&self) -> bool {
        self.live && self.environment == "prod"
    }
}

/// Where the Jenkins job lives and how to authenticate the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub jenkins_url: String,
    pub token: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jenkins_url: DEFAULT_JENKINS_URL.to_string(),
            token: DEFAULT_JENKINS_TOKEN.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    jenkins_url: Option<String>,
    token: Option<String>,
}

impl Settings {
    /// Defaults, then `.tagdeploy.toml` in the repo root, then the environment.
    pub async fn load(repo_root: &Path) -> Result<Self> {
        let mut settings = Self::default();
        let file = load_file_settings(repo_root).await?;
        if let Some(url) = file.jenkins_url {
            settings.jenkins_url = url;
        }
        if let Some(token) = file.token {
            settings.token = token;
        }
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings.normalized())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(URL_ENV).filter(|v| !v.is_empty()) {
            self.jenkins_url = url;
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.token = token;
        }
    }

    fn normalized(mut self) -> Self {
        if !self.jenkins_url.ends_with('/') {
            self.jenkins_url.push('/');
        }
        self
    }
}

async fn load_file_settings(repo_root: &Path) -> Result<FileSettings> {
    let path = repo_root.join(".tagdeploy.toml");
    if !path.exists() {
        return Ok(FileSettings::default());
    }
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: FileSettings =
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed)
}
