use std::sync::Arc;
use std::time::Duration;

use briefly_agent::retrieval::{DocsQueryTool, DocumentIndex};
use briefly_agent::search::WebSearchTool;
use briefly_agent::tech_stack::TechStackTool;
use briefly_agent::tools::{ToolError, ToolRegistry};
use briefly_agent::{ChatCompletionClient, ToolAgent};
use briefly_core::config::{AgentConfig, AppConfig};
use briefly_core::gateway::{CompletionError, CompletionGateway};
use briefly_core::reading::PromptError;
use briefly_slack::api::{SlackApiError, SlackWebClient};
use briefly_slack::events::{default_dispatcher, EventDispatcher};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub gateway: Arc<dyn CompletionGateway>,
    pub slack_api: SlackWebClient,
    pub dispatcher: Arc<EventDispatcher>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("completion gateway setup failed: {0}")]
    Gateway(#[source] CompletionError),
    #[error("slack client setup failed: {0}")]
    Slack(#[source] SlackApiError),
    #[error("agent tool setup failed: {0}")]
    Tools(#[source] ToolError),
    #[error("prompt templates failed to load: {0}")]
    Prompts(#[source] PromptError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        transport_mode = config.server.transport.as_str(),
        "starting application bootstrap"
    );
    let client = ChatCompletionClient::from_config(&config.llm).map_err(BootstrapError::Gateway)?;
    info!(
        event_name = "system.bootstrap.gateway_ready",
        correlation_id = "bootstrap",
        model = client.model(),
        "completion client configured"
    );

    let gateway: Arc<dyn CompletionGateway> = if config.agent.enabled {
        let tools = build_tools(&config.agent, Duration::from_secs(config.llm.timeout_secs)).await?;
        info!(
            event_name = "system.bootstrap.agent_enabled",
            correlation_id = "bootstrap",
            tools = ?tools.capabilities().map(|capability| capability.as_str()).collect::<Vec<_>>(),
            max_steps = config.agent.max_steps,
            "tool agent enabled"
        );
        Arc::new(ToolAgent::new(client, tools, config.agent.max_steps))
    } else {
        Arc::new(client)
    };

    let slack_api = SlackWebClient::from_config(&config.slack).map_err(BootstrapError::Slack)?;
    let dispatcher = default_dispatcher(Arc::new(slack_api.clone()), gateway.clone())
        .map_err(BootstrapError::Prompts)?;
    info!(
        event_name = "system.bootstrap.dispatcher_ready",
        correlation_id = "bootstrap",
        handlers = dispatcher.handler_count(),
        gateway = gateway.describe(),
        "slack event handlers registered"
    );

    Ok(Application { config, gateway, slack_api, dispatcher: Arc::new(dispatcher) })
}

/// Tech stack is always available; search needs an API key and docs need a
/// non-empty directory.
async fn build_tools(agent: &AgentConfig, timeout: Duration) -> Result<ToolRegistry, BootstrapError> {
    let mut tools = ToolRegistry::default();
    tools.register(TechStackTool::new(&agent.tech_stack));

    if let Some(api_key) = &agent.search_api_key {
        let search = WebSearchTool::new(agent.search_base_url.clone(), api_key.clone(), timeout)
            .map_err(BootstrapError::Tools)?;
        tools.register(search);
    }

    if let Some(docs_dir) = &agent.docs_dir {
        let index = DocumentIndex::load_dir(docs_dir).await.map_err(BootstrapError::Tools)?;
        if index.is_empty() {
            warn!(
                event_name = "system.bootstrap.docs_empty",
                correlation_id = "bootstrap",
                docs_dir = %docs_dir.display(),
                "docs directory has no indexable files; docs_query disabled"
            );
        } else {
            tools.register(DocsQueryTool::new(Arc::new(index), agent.top_k));
        }
    }

    Ok(tools)
}
