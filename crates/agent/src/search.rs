use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::tools::{Capability, Tool, ToolError};

const MAX_RESULTS: usize = 5;

/// Web search over a Serper-compatible JSON API.
pub struct WebSearchTool {
    http: Client,
    endpoint: String,
    api_key: SecretString,
}

impl WebSearchTool {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ToolError::Transport(error.to_string()))?;
        Ok(Self { http, endpoint: endpoint.into(), api_key })
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn capability(&self) -> Capability {
        Capability::WebSearch
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        let query = input.trim();
        if query.is_empty() {
            return Err(ToolError::EmptyInput);
        }

        let response = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", self.api_key.expose_secret())
            .json(&json!({ "q": query }))
            .send()
            .await
            .map_err(|error| ToolError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ToolError::Api { status: status.as_u16(), message });
        }

        let body: SearchResponse =
            response.json().await.map_err(|error| ToolError::Decode(error.to_string()))?;

        debug!(
            event_name = "agent.tool.web_search.completed",
            result_count = body.organic.len(),
            "web search returned"
        );

        Ok(format_results(query, &body.organic))
    }
}

fn format_results(query: &str, results: &[OrganicResult]) -> String {
    if results.is_empty() {
        return format!("No web results found for `{query}`.");
    }

    results
        .iter()
        .take(MAX_RESULTS)
        .map(|result| format!("{} - {}: {}", result.title, result.link, result.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}
