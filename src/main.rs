mod config;
mod error;
mod git;
mod jenkins;
mod tag;
mod trigger;
mod workflow;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_ENVIRONMENT, DeployConfig, Settings};
use crate::error::DeployError;
use crate::git::GitRepo;
use crate::jenkins::JenkinsClient;
use crate::tag::LocalClock;
use crate::workflow::{Outcome, Workflow, safety_gate};

#[derive(Parser, Debug)]
#[command(
    name = "tagdeploy",
    version,
    about = "Tag the current commit and trigger the Jenkins build for it",
    long_about = None
)]
struct Cli {
    /// Run verbosely
    #[arg(short, long, overrides_with = "no_verbose")]
    verbose: bool,
    #[arg(long, hide = true, overrides_with = "verbose")]
    no_verbose: bool,

    /// Allow a dirty git repo
    #[arg(short, long)]
    allow_dirty: bool,

    /// Check everything but don't tag, push or trigger a build
    #[arg(short = 'n', long, overrides_with = "no_dry_run")]
    dry_run: bool,
    #[arg(long, hide = true, overrides_with = "dry_run")]
    no_dry_run: bool,

    /// Environment to deploy to: dev, prod, local
    #[arg(short, long = "env", value_name = "ENV", default_value = DEFAULT_ENVIRONMENT)]
    environment: String,

    /// Tag to deploy (default: <branch>-<timestamp>)
    #[arg(short, long, value_name = "TAG")]
    tag: Option<String>,

    /// Upload build artifacts (on by default, disable with --no-upload)
    #[arg(short, long, overrides_with = "no_upload")]
    upload: bool,
    /// Don't upload build artifacts
    #[arg(long, overrides_with = "upload")]
    no_upload: bool,

    /// Make the build live as latest and for auto-update
    #[arg(short, long, overrides_with = "no_live")]
    live: bool,
    #[arg(long, hide = true, overrides_with = "live")]
    no_live: bool,
}

impl Cli {
    fn into_config(self) -> DeployConfig {
        DeployConfig {
            verbose: self.verbose,
            allow_dirty: self.allow_dirty,
            dry_run: self.dry_run,
            environment: self.environment,
            tag: self.tag,
            upload: self.upload || !self.no_upload,
            live: self.live,
        }
    }
}

/// Dependencies stay at `warn`; only this crate gets chattier with `--verbose`.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,tagdeploy=debug"
    } else {
        "warn,tagdeploy=info"
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn deploy(config: &DeployConfig) -> Result<Outcome, DeployError> {
    // Checked before touching the repository or the network.
    safety_gate(config)?;

    let repo = GitRepo::discover(".")
        .await
        .map_err(DeployError::command("git repository discovery"))?;
    let settings = Settings::load(repo.root())
        .await
        .map_err(DeployError::Settings)?;
    let jenkins = JenkinsClient::new().map_err(DeployError::Settings)?;

    Workflow::new(config, &settings, &repo, &jenkins, &LocalClock)
        .run()
        .await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = Cli::parse().into_config();
    init_tracing(config.verbose);
    tracing::debug!(?config, "tagdeploy: starting");

    match deploy(&config).await {
        Ok(outcome) => {
            tracing::debug!(
                tag = %outcome.tag,
                url = %outcome.build_url,
                triggered = outcome.triggered,
                "tagdeploy: done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::debug!(kind = ?err.kind(), "tagdeploy: aborted");
            eprintln!("{}", err);
            ExitCode::from(1)
        }
    }
}
