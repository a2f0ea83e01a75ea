//! In-memory fakes shared by this crate's tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use briefly_core::gateway::{CompletionError, CompletionGateway};
use briefly_core::reading::ReaderProfile;

use crate::api::{SlackApi, SlackApiError, ViewId};
use crate::blocks::{MessageTemplate, ModalView};

pub const DEFAULT_REPLY: &str = "Rust, Tokio, Serde, Axum, Tracing";

/// Ordered log shared between fakes so tests can assert cross-component ordering.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackCall {
    OpenView { trigger_id: String, view_id: ViewId, view: ModalView },
    UpdateView { view_id: ViewId, view: ModalView },
    PostMessage { channel_id: String, text: String, thread_ts: Option<String> },
    OpenDm { user_id: String, channel_id: String },
    UserProfile { user_id: String },
}

#[derive(Default)]
pub struct RecordingSlackApi {
    calls: Mutex<Vec<SlackCall>>,
    next_id: AtomicUsize,
    failing: Mutex<HashSet<&'static str>>,
    latency: Option<Duration>,
    journal: Option<Journal>,
}

impl RecordingSlackApi {
    pub fn with_journal(journal: Journal) -> Self {
        Self { journal: Some(journal), ..Self::default() }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    pub fn fail_on(self, method: &'static str) -> Self {
        self.failing.lock().expect("failing lock").insert(method);
        self
    }

    pub fn calls(&self) -> Vec<SlackCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    async fn record(&self, method: &'static str, call: SlackCall) -> Result<(), SlackApiError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.lock().expect("failing lock").contains(method) {
            return Err(SlackApiError::Api { method, error: "fatal_error".to_owned() });
        }
        if let Some(journal) = &self.journal {
            journal.lock().expect("journal lock").push(method.to_owned());
        }
        self.calls.lock().expect("calls lock").push(call);
        Ok(())
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl SlackApi for RecordingSlackApi {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<ViewId, SlackApiError> {
        let view_id = ViewId(self.next("V"));
        self.record(
            "views.open",
            SlackCall::OpenView {
                trigger_id: trigger_id.to_owned(),
                view_id: view_id.clone(),
                view: view.clone(),
            },
        )
        .await?;
        Ok(view_id)
    }

    async fn update_view(
        &self,
        view_id: &ViewId,
        view: &ModalView,
    ) -> Result<ViewId, SlackApiError> {
        self.record(
            "views.update",
            SlackCall::UpdateView { view_id: view_id.clone(), view: view.clone() },
        )
        .await?;
        Ok(view_id.clone())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<String, SlackApiError> {
        self.record(
            "chat.postMessage",
            SlackCall::PostMessage {
                channel_id: channel_id.to_owned(),
                text: message.fallback_text.clone(),
                thread_ts: message.thread_ts.clone(),
            },
        )
        .await?;
        Ok(self.next("171000000."))
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError> {
        let channel_id = format!("D-{user_id}");
        self.record(
            "conversations.open",
            SlackCall::OpenDm { user_id: user_id.to_owned(), channel_id: channel_id.clone() },
        )
        .await?;
        Ok(channel_id)
    }

    async fn user_profile(&self, user_id: &str) -> Result<ReaderProfile, SlackApiError> {
        self.record("users.info", SlackCall::UserProfile { user_id: user_id.to_owned() }).await?;
        Ok(ReaderProfile {
            display_name: format!("User {user_id}"),
            title: Some("Engineer".to_owned()),
        })
    }
}

/// Replies from a queue, then [`DEFAULT_REPLY`] once the queue is empty.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn with_replies<const N: usize>(replies: [&str; N]) -> Self {
        Self::with_results(replies.map(|reply| Ok(reply.to_owned())))
    }

    pub fn with_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<String, CompletionError>>,
    {
        Self { replies: Mutex::new(results.into_iter().collect()), prompts: Mutex::default() }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().expect("prompts lock").push(prompt.to_owned());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_REPLY.to_owned()))
    }
}
