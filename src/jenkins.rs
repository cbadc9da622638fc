use anyhow::{Context, Result};
use reqwest::{Client, redirect};

/// Status code reported when no HTTP response was received at all.
pub const NO_RESPONSE: &str = "000";

/// The CI server as seen by a deploy run: every call yields only a status code.
pub trait CiServer {
    /// Lightweight reachability check of the job URL.
    async fn probe(&self, url: &str) -> String;
    /// Fire the build; redirects are followed and the final status returned.
    async fn trigger(&self, url: &str) -> String;
}

pub struct JenkinsClient {
    probe: Client,
    trigger: Client,
}

impl JenkinsClient {
    pub fn new() -> Result<Self> {
        let probe = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .context("failed to build HTTP client")?;
        let trigger = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { probe, trigger })
    }
}

impl CiServer for JenkinsClient {
    async fn probe(&self, url: &str) -> String {
        tracing::debug!("jenkins: probing {}", url);
        status_of(&self.probe, url).await
    }

    async fn trigger(&self, url: &str) -> String {
        tracing::debug!("jenkins: triggering {}", url);
        status_of(&self.trigger, url).await
    }
}

async fn status_of(client: &Client, url: &str) -> String {
    match client.get(url).send().await {
        Ok(resp) => resp.status().as_u16().to_string(),
        Err(err) => {
            tracing::debug!("jenkins: request to {} failed: {}", url, err);
            NO_RESPONSE.to_string()
        }
    }
}
