//! Outbound Slack Web API calls used by handlers and the modal workflow.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use briefly_core::config::SlackConfig;
use briefly_core::reading::ReaderProfile;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::blocks::{MessageTemplate, ModalView};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack transport failed: {0}")]
    Transport(String),
    #[error("slack `{method}` returned http {status}")]
    Http { method: &'static str, status: u16 },
    #[error("slack `{method}` failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack `{method}` response could not be decoded: {message}")]
    Decode { method: &'static str, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub String);

impl ViewId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<ViewId, SlackApiError>;
    async fn update_view(&self, view_id: &ViewId, view: &ModalView)
        -> Result<ViewId, SlackApiError>;
    /// Returns the posted message's `ts`.
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<String, SlackApiError>;
    /// Opens (or reuses) the direct-message channel with `user_id`.
    async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError>;
    async fn user_profile(&self, user_id: &str) -> Result<ReaderProfile, SlackApiError>;
}

#[derive(Clone)]
pub struct SlackWebClient {
    http: Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Result<Self, SlackApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_owned(), bot_token })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, SlackApiError> {
        Self::new(config.api_base_url.clone(), config.bot_token.clone())
    }

    /// `apps.connections.open`: exchanges the app-level token for a Socket Mode URL.
    pub async fn open_socket_url(&self, app_token: &SecretString) -> Result<String, SlackApiError> {
        const METHOD: &str = "apps.connections.open";
        let response = self
            .http
            .post(self.url(METHOD))
            .bearer_auth(app_token.expose_secret())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;

        let body: ConnectionsOpen = decode(METHOD, response).await?;
        Ok(body.url)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn post_json<T>(&self, method: &'static str, body: Value) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        decode(method, response).await
    }
}

async fn decode<T>(method: &'static str, response: reqwest::Response) -> Result<T, SlackApiError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        return Err(SlackApiError::Http { method, status: status.as_u16() });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|error| SlackApiError::Decode { method, message: error.to_string() })?;

    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
        return Err(SlackApiError::Api { method, error: error.to_owned() });
    }

    debug!(event_name = "slack.api.call.completed", method, "slack api call succeeded");
    serde_json::from_value(body)
        .map_err(|error| SlackApiError::Decode { method, message: error.to_string() })
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<ViewId, SlackApiError> {
        let body: ViewResponse =
            self.post_json("views.open", json!({ "trigger_id": trigger_id, "view": view })).await?;
        Ok(body.view.id)
    }

    async fn update_view(
        &self,
        view_id: &ViewId,
        view: &ModalView,
    ) -> Result<ViewId, SlackApiError> {
        let body: ViewResponse =
            self.post_json("views.update", json!({ "view_id": view_id, "view": view })).await?;
        Ok(body.view.id)
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<String, SlackApiError> {
        let mut body = json!({ "channel": channel_id, "text": message.fallback_text });
        if !message.blocks.is_empty() {
            body["blocks"] = json!(message.blocks);
        }
        if let Some(thread_ts) = &message.thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let body: PostMessageResponse = self.post_json("chat.postMessage", body).await?;
        Ok(body.ts)
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError> {
        let body: ConversationsOpen =
            self.post_json("conversations.open", json!({ "users": user_id })).await?;
        Ok(body.channel.id)
    }

    async fn user_profile(&self, user_id: &str) -> Result<ReaderProfile, SlackApiError> {
        const METHOD: &str = "users.info";
        let response = self
            .http
            .get(self.url(METHOD))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("user", user_id)])
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;

        let body: UsersInfo = decode(METHOD, response).await?;
        Ok(body.user.into_reader_profile())
    }
}

#[derive(Deserialize)]
struct ConnectionsOpen {
    url: String,
}

#[derive(Deserialize)]
struct ViewResponse {
    view: ViewBody,
}

#[derive(Deserialize)]
struct ViewBody {
    id: ViewId,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ts: String,
}

#[derive(Deserialize)]
struct ConversationsOpen {
    channel: ChannelBody,
}

#[derive(Deserialize)]
struct ChannelBody {
    id: String,
}

#[derive(Deserialize)]
struct UsersInfo {
    user: UserBody,
}

#[derive(Deserialize)]
struct UserBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: UserProfileBody,
}

#[derive(Default, Deserialize)]
struct UserProfileBody {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl UserBody {
    fn into_reader_profile(self) -> ReaderProfile {
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        let display_name = non_empty(self.profile.display_name)
            .or_else(|| non_empty(self.profile.real_name))
            .or_else(|| non_empty(self.real_name))
            .or_else(|| non_empty(Some(self.name)));

        match display_name {
            Some(display_name) => {
                ReaderProfile { display_name, title: non_empty(self.profile.title) }
            }
            None => ReaderProfile::anonymous(),
        }
    }
}
