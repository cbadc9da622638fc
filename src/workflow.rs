use crate::config::{DeployConfig, Settings};
use crate::error::DeployError;
use crate::git::Vcs;
use crate::jenkins::CiServer;
use crate::tag::{Clock, derive_tag};
use crate::trigger::BuildRequest;

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub tag: String,
    pub build_url: String,
    /// False for dry runs.
    pub triggered: bool,
}

/// Refuse live production releases before anything else happens.
pub fn safety_gate(config: &DeployConfig) -> Result<(), DeployError> {
    if config.is_live_production() {
        return Err(DeployError::LiveProduction);
    }
    Ok(())
}

/// One deploy run: gates, tag, push, trigger.
pub struct Workflow<'a, V, C, K> {
    config: &'a DeployConfig,
    settings: &'a Settings,
    vcs: &'a V,
    ci: &'a C,
    clock: &'a K,
}

impl<'a, V: Vcs, C: CiServer, K: Clock> Workflow<'a, V, C, K> {
    pub fn new(
        config: &'a DeployConfig,
        settings: &'a Settings,
        vcs: &'a V,
        ci: &'a C,
        clock: &'a K,
    ) -> Self {
        Self {
            config,
            settings,
            vcs,
            ci,
            clock,
        }
    }

    pub async fn run(&self) -> Result<Outcome, DeployError> {
        safety_gate(self.config)?;

        if self.config.allow_dirty {
            tracing::debug!("workflow: allow-dirty, skipping clean-tree check");
        } else {
            self.require_clean_tree().await?;
        }

        self.require_reachable().await?;

        let tag = self.resolve_tag().await?;

        if self.config.dry_run {
            tracing::debug!("workflow: dry-run, not creating tag {}", tag);
        } else {
            self.publish_tag(&tag).await?;
        }

        let build_url = BuildRequest {
            token: &self.settings.token,
            environment: &self.config.environment,
            tag: &tag,
            upload: self.config.upload,
            live: self.config.live,
        }
        .url(&self.settings.jenkins_url);
        println!("{}", build_url);
        tracing::debug!("jenkins url: {}", build_url);

        if self.config.dry_run {
            println!("dry-run: not triggering build for {}", tag);
            return Ok(Outcome {
                tag,
                build_url,
                triggered: false,
            });
        }

        let status = self.ci.trigger(&build_url).await;
        if status != "200" && status != "201" {
            return Err(DeployError::BuildRejected { status });
        }
        println!("building {}", tag);
        tracing::info!(tag = %tag, status = %status, "workflow: build triggered");

        Ok(Outcome {
            tag,
            build_url,
            triggered: true,
        })
    }

    async fn require_clean_tree(&self) -> Result<(), DeployError> {
        tracing::debug!("workflow: syncing with remote");
        self.vcs.sync().await.map_err(DeployError::command("git pull"))?;
        self.vcs
            .refresh_index()
            .await
            .map_err(DeployError::command("git update-index"))?;
        let changes = self
            .vcs
            .status()
            .await
            .map_err(DeployError::StatusUnavailable)?;
        if !changes.is_empty() {
            return Err(DeployError::DirtyTree {
                changes: changes.trim_end().to_string(),
            });
        }
        Ok(())
    }

    async fn require_reachable(&self) -> Result<(), DeployError> {
        let url = &self.settings.jenkins_url;
        tracing::info!("workflow: checking jenkins at {}", url);
        let status = self.ci.probe(url).await;
        if status != "200" {
            return Err(DeployError::CiUnreachable { status });
        }
        Ok(())
    }

    async fn resolve_tag(&self) -> Result<String, DeployError> {
        // Looked up even for explicit tags so verbose output always has it.
        let branch = self
            .vcs
            .current_branch()
            .await
            .map_err(DeployError::command("git current branch"))?;
        let tag = derive_tag(self.config.tag.as_deref(), &branch, self.clock.now());
        tracing::debug!("current branch: {}", branch);
        tracing::debug!("new tag: {}", tag);
        Ok(tag)
    }

    async fn publish_tag(&self, tag: &str) -> Result<(), DeployError> {
        let exists = self
            .vcs
            .tag_exists(tag)
            .await
            .map_err(DeployError::command("git tag"))?;
        if exists {
            return Err(DeployError::TagExists {
                tag: tag.to_string(),
            });
        }
        self.vcs
            .create_tag(tag)
            .await
            .map_err(DeployError::command("git tag"))?;
        self.vcs
            .push_tags()
            .await
            .map_err(DeployError::command("git push --tags"))?;
        tracing::info!("workflow: pushed tag {}", tag);
        Ok(())
    }
}
