//! Device-shadow data sink: each reading becomes one reported-state update
//! on the node's thing.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use meshhub_core::config::SinkConfig;
use meshhub_services::DataSink;

pub struct ShadowClient {
    client: reqwest::Client,
    endpoint: String,
}

/// The endpoint signals rejection with a `message` field.
#[derive(Deserialize)]
struct ShadowReply {
    message: Option<String>,
}

impl ShadowClient {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint_url.trim_end_matches('/').to_string(),
        })
    }

    fn shadow_url(&self, thing: &str) -> String {
        format!("{}/api/things/{}/shadow", self.endpoint, thing)
    }
}

fn shadow_body(metric: &str, value: i32) -> serde_json::Value {
    json!({ "state": { "reported": { metric: value } } })
}

#[async_trait]
impl DataSink for ShadowClient {
    async fn report(&self, thing: &str, metric: &str, value: i32) -> Result<()> {
        let url = self.shadow_url(thing);
        let resp = self
            .client
            .post(&url)
            .json(&shadow_body(metric, value))
            .send()
            .await
            .with_context(|| format!("failed to reach shadow endpoint {url}"))?;

        let status = resp.status();
        let text = resp.text().await.context("failed to read shadow response")?;
        if let Ok(ShadowReply {
            message: Some(message),
        }) = serde_json::from_str::<ShadowReply>(&text)
        {
            anyhow::bail!("shadow update for {thing} rejected: {message}");
        }
        if !status.is_success() {
            anyhow::bail!("shadow update for {thing} failed with {status}");
        }
        Ok(())
    }
}
