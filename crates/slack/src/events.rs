use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use briefly_core::gateway::{CompletionError, CompletionGateway};
use briefly_core::reading::PromptError;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{SlackApi, SlackApiError};
use crate::blocks::{
    button_clicked_message, mention_usage_message, MessageTemplate, BUTTON_CLICK_ACTION_ID,
};
use crate::workflow::{
    ReadingWorkflow, ShortcutHandler, SubmissionHandler, WorkflowError, WorkflowReport,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    BlockAction(BlockActionEvent),
    AppMention(AppMentionEvent),
    MessageShortcut(MessageShortcutEvent),
    ViewSubmission(ViewSubmissionEvent),
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::MessageShortcut(_) => SlackEventType::MessageShortcut,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn route_key(&self) -> RouteKey {
        let identifier = match self {
            Self::BlockAction(event) => Some(event.action_id.clone()),
            Self::MessageShortcut(event) => Some(event.callback_id.clone()),
            Self::ViewSubmission(event) => Some(event.callback_id.clone()),
            Self::AppMention(_) | Self::Message(_) | Self::Unsupported { .. } => None,
        };
        RouteKey { event_type: self.event_type(), identifier }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::BlockAction(event) => Some(&event.user_id),
            Self::AppMention(event) => Some(&event.user_id),
            Self::MessageShortcut(event) => Some(&event.user_id),
            Self::ViewSubmission(event) => Some(&event.user_id),
            Self::Message(event) => event.user_id.as_deref(),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    BlockAction,
    AppMention,
    MessageShortcut,
    ViewSubmission,
    Message,
    Unsupported,
}

/// Handler address: the event kind plus `action_id` / `callback_id` when the
/// kind has one. A key without identifier matches any identifier of that kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub event_type: SlackEventType,
    pub identifier: Option<String>,
}

impl RouteKey {
    pub fn any(event_type: SlackEventType) -> Self {
        Self { event_type, identifier: None }
    }

    pub fn exact(event_type: SlackEventType, identifier: impl Into<String>) -> Self {
        Self { event_type, identifier: Some(identifier.into()) }
    }

    fn fallback(&self) -> Option<Self> {
        self.identifier.as_ref().map(|_| Self::any(self.event_type))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub user_id: String,
    pub channel_id: Option<String>,
    pub trigger_id: Option<String>,
    pub action_id: String,
    pub value: Option<String>,
    pub message_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppMentionEvent {
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageShortcutEvent {
    pub callback_id: String,
    pub trigger_id: String,
    pub user_id: String,
    pub channel_id: Option<String>,
    pub message_text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSubmissionEvent {
    pub callback_id: String,
    pub trigger_id: Option<String>,
    pub user_id: String,
    pub view_id: String,
    pub private_metadata: String,
    pub selected_values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub text: String,
    pub subtype: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Posted { channel_id: String, ts: String },
    Workflow(WorkflowReport),
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("{event} payload is missing `{field}`")]
    MissingField { event: &'static str, field: &'static str },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn route(&self) -> RouteKey;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<RouteKey, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.route(), Arc::new(handler));
    }

    /// Runs the single handler registered for the event: exact `(type, id)`
    /// first, then the type-wide handler.
    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let key = envelope.event.route_key();
        let handler = self
            .handlers
            .get(&key)
            .or_else(|| key.fallback().and_then(|fallback| self.handlers.get(&fallback)));

        let Some(handler) = handler else {
            debug!(
                event_name = "ingress.slack.event_unrouted",
                correlation_id = %ctx.correlation_id,
                event_type = ?key.event_type,
                identifier = key.identifier.as_deref().unwrap_or("none"),
                "no handler registered; dropping event"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Wires every handler the bot answers to.
pub fn default_dispatcher(
    api: Arc<dyn SlackApi>,
    gateway: Arc<dyn CompletionGateway>,
) -> Result<EventDispatcher, PromptError> {
    let workflow = Arc::new(ReadingWorkflow::new(api.clone(), gateway.clone())?);

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ButtonClickHandler::new(api.clone()));
    dispatcher.register(MentionHandler::new(api, gateway));
    dispatcher.register(MessageLogHandler);
    dispatcher.register(ShortcutHandler::new(workflow.clone()));
    dispatcher.register(SubmissionHandler::new(workflow));
    Ok(dispatcher)
}

pub struct ButtonClickHandler {
    api: Arc<dyn SlackApi>,
}

impl ButtonClickHandler {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventHandler for ButtonClickHandler {
    fn route(&self) -> RouteKey {
        RouteKey::exact(SlackEventType::BlockAction, BUTTON_CLICK_ACTION_ID)
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let channel_id = event.channel_id.clone().ok_or(EventHandlerError::MissingField {
            event: "block_actions",
            field: "channel.id",
        })?;

        let ts = self.api.post_message(&channel_id, &button_clicked_message(&event.user_id)).await?;
        Ok(HandlerResult::Posted { channel_id, ts })
    }
}

pub struct MentionHandler {
    api: Arc<dyn SlackApi>,
    gateway: Arc<dyn CompletionGateway>,
}

impl MentionHandler {
    pub fn new(api: Arc<dyn SlackApi>, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self { api, gateway }
    }
}

#[async_trait]
impl EventHandler for MentionHandler {
    fn route(&self) -> RouteKey {
        RouteKey::any(SlackEventType::AppMention)
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppMention(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let question = strip_mentions(&event.text);
        let reply = if question.is_empty() {
            mention_usage_message()
        } else {
            let answer = self.gateway.complete(&question).await?;
            info!(
                event_name = "slack.mention.answered",
                correlation_id = %ctx.correlation_id,
                user_id = %event.user_id,
                gateway = self.gateway.describe(),
                "answering mention"
            );
            MessageTemplate::text(answer)
        };

        let reply = match &event.thread_ts {
            Some(thread_ts) => reply.in_thread(thread_ts.clone()),
            None => reply,
        };

        let ts = self.api.post_message(&event.channel_id, &reply).await?;
        Ok(HandlerResult::Posted { channel_id: event.channel_id.clone(), ts })
    }
}

/// Drops every leading `<@U...>` token and trims the rest.
pub fn strip_mentions(text: &str) -> String {
    let mut rest = text.trim_start();
    while let Some(after) = rest.strip_prefix("<@") {
        match after.find('>') {
            Some(end) => rest = after[end + 1..].trim_start(),
            None => break,
        }
    }
    rest.trim().to_owned()
}

pub struct MessageLogHandler;

#[async_trait]
impl EventHandler for MessageLogHandler {
    fn route(&self) -> RouteKey {
        RouteKey::any(SlackEventType::Message)
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "slack.message.received",
            correlation_id = %ctx.correlation_id,
            channel_id = event.channel_id.as_deref().unwrap_or("unknown"),
            user_id = event.user_id.as_deref().unwrap_or("unknown"),
            subtype = event.subtype.as_deref().unwrap_or("none"),
            "message was sent"
        );
        Ok(HandlerResult::Processed)
    }
}
