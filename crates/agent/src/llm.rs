use std::time::{Duration, Instant};

use async_trait::async_trait;
use briefly_core::config::{LlmConfig, LlmProvider};
use briefly_core::gateway::{ensure_prompt, CompletionError, CompletionGateway};
use reqwest::header::HeaderValue;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Direct chat-completions gateway: one system message, one user message, one reply.
#[derive(Clone)]
pub struct ChatCompletionClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    provider: LlmProvider,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl ChatCompletionClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| CompletionError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.endpoint_base()),
            api_key: config.api_key.clone(),
            provider: config.provider,
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage { role: "system", content: &self.system_prompt },
                ChatMessage { role: "user", content: prompt },
            ],
        }
    }
}

#[async_trait]
impl CompletionGateway for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let prompt = ensure_prompt(prompt)?;
        let started = Instant::now();

        let mut request = self.http.post(&self.endpoint).json(&self.request_body(prompt));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| CompletionError::Transport(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = parse_retry_after(response.headers().get("retry-after"));
            return Err(CompletionError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| CompletionError::MalformedResponse(error.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                CompletionError::MalformedResponse("response contained no message content".into())
            })?;

        debug!(
            event_name = "llm.completion.completed",
            provider = self.describe(),
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            response_chars = text.len(),
            "completion received"
        );

        Ok(text)
    }

    fn describe(&self) -> &'static str {
        match self.provider {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Ollama => "ollama",
        }
    }
}

fn parse_retry_after(value: Option<&HeaderValue>) -> Option<u64> {
    value.and_then(|value| value.to_str().ok()).and_then(|value| value.trim().parse().ok())
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use briefly_core::config::{LlmConfig, LlmProvider, DEFAULT_SYSTEM_PROMPT};
    use briefly_core::gateway::{CompletionError, CompletionGateway};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::ChatCompletionClient;

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: Some("sk-test".to_string().into()),
            base_url: Some(base_url),
            model: "gpt-3.5-turbo".to_owned(),
            temperature: 0.1,
            timeout_secs: 5,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
        }
    }

    #[tokio::test]
    async fn sends_system_and_user_messages_and_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": DEFAULT_SYSTEM_PROMPT},
                    {"role": "user", "content": "what is tokio?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "An async runtime."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatCompletionClient::from_config(&config(server.uri())).expect("client");
        let reply = client.complete("what is tokio?").await.expect("completion");

        assert_eq!(reply, "An async runtime.");
        assert_eq!(client.describe(), "openai");
    }

    #[tokio::test]
    async fn blank_prompt_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = ChatCompletionClient::from_config(&config(server.uri())).expect("client");
        assert_eq!(client.complete("  ").await, Err(CompletionError::EmptyPrompt));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "20"))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::from_config(&config(server.uri())).expect("client");
        assert_eq!(
            client.complete("hello").await,
            Err(CompletionError::RateLimited { retry_after_secs: Some(20) })
        );
    }

    #[tokio::test]
    async fn api_error_message_is_extracted_from_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::from_config(&config(server.uri())).expect("client");
        assert_eq!(
            client.complete("hello").await,
            Err(CompletionError::Api {
                status: 401,
                message: "Incorrect API key provided".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn empty_choices_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::from_config(&config(server.uri())).expect("client");
        let error = client.complete("hello").await.expect_err("should fail");
        assert_eq!(error.kind(), "malformed_response");
    }

    #[tokio::test]
    async fn ollama_requests_carry_no_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "local answer"}}]
            })))
            .mount(&server)
            .await;

        let mut ollama = config(format!("{}/v1/", server.uri()));
        ollama.provider = LlmProvider::Ollama;
        ollama.api_key = None;

        let client = ChatCompletionClient::from_config(&ollama).expect("client");
        assert_eq!(client.complete("hi").await.expect("completion"), "local answer");
        assert_eq!(client.describe(), "ollama");

        let requests = server.received_requests().await.unwrap_or_default();
        assert!(requests.iter().all(|request| !request.headers.contains_key("authorization")));
    }
}
