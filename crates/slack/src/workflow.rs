//! Reading-recommendation modal workflow.
//!
//! A message shortcut opens a placeholder modal, enriches it with a summary and
//! a topic checklist, and DMs the summary to the user. Submitting the checklist
//! opens a processing modal that ends as either "Completed" or "Error".

use std::sync::Arc;

use async_trait::async_trait;
use briefly_core::errors::ApplicationError;
use briefly_core::flows::{FlowEngine, FlowEvent, FlowState, FlowTransitionError, WorkflowId};
use briefly_core::gateway::{CompletionError, CompletionGateway};
use briefly_core::reading::{join_topics, parse_topics, PromptError, PromptTemplates};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::api::{SlackApi, SlackApiError, ViewId};
use crate::blocks::{
    completed_modal, error_modal, loading_modal, original_message_dm, processing_modal,
    recommendations_dm, summary_dm, topic_selection_modal,
};
use crate::events::{
    EventContext, EventHandler, EventHandlerError, HandlerResult, MessageShortcutEvent, RouteKey,
    SlackEnvelope, SlackEvent, SlackEventType, ViewSubmissionEvent,
};

pub const SHORTCUT_CALLBACK_ID: &str = "reading_recommendations";
pub const SUBMISSION_CALLBACK_ID: &str = "topic_selection";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowReport {
    pub workflow_id: WorkflowId,
    pub view_id: ViewId,
    pub state: FlowState,
    pub dm_channel_id: Option<String>,
    pub failure: Option<String>,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error("view submission carried no trigger_id")]
    MissingTrigger,
}

/// Failures inside the submission path that end in the error modal instead of
/// propagating.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("recommendation request failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("delivering recommendations failed: {0}")]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

impl From<SubmissionError> for ApplicationError {
    fn from(value: SubmissionError) -> Self {
        match value {
            SubmissionError::Completion(error) => Self::Completion(error),
            SubmissionError::Slack(error) => Self::Platform(error.to_string()),
            SubmissionError::Prompt(error) => Self::Prompt(error),
        }
    }
}

pub struct ReadingWorkflow {
    api: Arc<dyn SlackApi>,
    gateway: Arc<dyn CompletionGateway>,
    prompts: PromptTemplates,
    engine: FlowEngine,
}

impl ReadingWorkflow {
    pub fn new(
        api: Arc<dyn SlackApi>,
        gateway: Arc<dyn CompletionGateway>,
    ) -> Result<Self, PromptError> {
        Ok(Self { api, gateway, prompts: PromptTemplates::new()?, engine: FlowEngine::new() })
    }

    pub async fn start(
        &self,
        event: &MessageShortcutEvent,
        ctx: &EventContext,
    ) -> Result<WorkflowReport, WorkflowError> {
        let workflow_id = WorkflowId::generate();
        let state = self.engine.initial_state();

        let view_id = self.api.open_view(&event.trigger_id, &loading_modal()).await?;
        info!(
            event_name = "workflow.reading.started",
            correlation_id = %ctx.correlation_id,
            workflow_id = %workflow_id,
            user_id = %event.user_id,
            view_id = %view_id,
            "placeholder modal opened"
        );

        let reader = self.api.user_profile(&event.user_id).await?;
        let summary = self
            .gateway
            .complete(&self.prompts.summary(&event.message_text, &reader)?)
            .await?;
        let topics =
            parse_topics(&self.gateway.complete(&self.prompts.topics(&event.message_text)?).await?);

        let state = self.advance(state, FlowEvent::EnrichmentCompleted, &workflow_id)?;
        let dm_channel_id = self.api.open_dm(&event.user_id).await?;
        self.api.post_message(&dm_channel_id, &original_message_dm(&event.message_text)).await?;
        self.api.post_message(&dm_channel_id, &summary_dm(&summary)).await?;

        let state = self.advance(state, FlowEvent::CheckboxesPresented, &workflow_id)?;
        let view = topic_selection_modal(
            SUBMISSION_CALLBACK_ID,
            workflow_id.as_str(),
            &summary,
            &topics,
        );
        let view_id = self.api.update_view(&view_id, &view).await?;

        info!(
            event_name = "workflow.reading.topics_presented",
            correlation_id = %ctx.correlation_id,
            workflow_id = %workflow_id,
            view_id = %view_id,
            topic_count = topics.len(),
            "topic checklist presented"
        );

        Ok(WorkflowReport {
            workflow_id,
            view_id,
            state,
            dm_channel_id: Some(dm_channel_id),
            failure: None,
        })
    }

    pub async fn submit(
        &self,
        event: &ViewSubmissionEvent,
        ctx: &EventContext,
    ) -> Result<WorkflowReport, WorkflowError> {
        let workflow_id = WorkflowId::from_metadata(&event.private_metadata)
            .unwrap_or_else(WorkflowId::generate);
        let trigger_id = event.trigger_id.as_deref().ok_or(WorkflowError::MissingTrigger)?;

        let state =
            self.advance(FlowState::AwaitingSubmission, FlowEvent::SelectionSubmitted, &workflow_id)?;
        let view_id = self.api.open_view(trigger_id, &processing_modal()).await?;

        info!(
            event_name = "workflow.reading.submitted",
            correlation_id = %ctx.correlation_id,
            workflow_id = %workflow_id,
            user_id = %event.user_id,
            view_id = %view_id,
            selected_count = event.selected_values.len(),
            "topic selection submitted"
        );

        match self.deliver_recommendations(event, &view_id).await {
            Ok(dm_channel_id) => {
                let state =
                    self.advance(state, FlowEvent::RecommendationsDelivered, &workflow_id)?;
                info!(
                    event_name = "workflow.reading.completed",
                    correlation_id = %ctx.correlation_id,
                    workflow_id = %workflow_id,
                    view_id = %view_id,
                    "reading recommendations delivered"
                );
                Ok(WorkflowReport {
                    workflow_id,
                    view_id,
                    state,
                    dm_channel_id: Some(dm_channel_id),
                    failure: None,
                })
            }
            Err(failure) => {
                let failure_message = failure.to_string();
                error!(
                    event_name = "workflow.reading.failed",
                    correlation_id = %ctx.correlation_id,
                    workflow_id = %workflow_id,
                    view_id = %view_id,
                    error = %failure_message,
                    "reading recommendations failed"
                );

                let state = self.advance(state, FlowEvent::ProcessingFailed, &workflow_id)?;
                let interface = ApplicationError::from(failure).into_interface(workflow_id.as_str());
                let view_id = self
                    .api
                    .update_view(
                        &view_id,
                        &error_modal(interface.user_message(), interface.correlation_id()),
                    )
                    .await?;

                Ok(WorkflowReport {
                    workflow_id,
                    view_id,
                    state,
                    dm_channel_id: None,
                    failure: Some(failure_message),
                })
            }
        }
    }

    async fn deliver_recommendations(
        &self,
        event: &ViewSubmissionEvent,
        view_id: &ViewId,
    ) -> Result<String, SubmissionError> {
        let prompt = self.prompts.recommendations(&event.selected_values)?;
        let recommendations = self.gateway.complete(&prompt).await?;

        let dm_channel_id = self.api.open_dm(&event.user_id).await?;
        self.api
            .post_message(
                &dm_channel_id,
                &recommendations_dm(&join_topics(&event.selected_values), &recommendations),
            )
            .await?;
        self.api.update_view(view_id, &completed_modal()).await?;
        Ok(dm_channel_id)
    }

    fn advance(
        &self,
        state: FlowState,
        event: FlowEvent,
        workflow_id: &WorkflowId,
    ) -> Result<FlowState, FlowTransitionError> {
        let outcome = self.engine.apply(state, event)?;
        debug!(
            event_name = "workflow.reading.transition",
            workflow_id = %workflow_id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            actions = ?outcome.actions,
            "workflow state advanced"
        );
        Ok(outcome.to)
    }
}

pub struct ShortcutHandler {
    workflow: Arc<ReadingWorkflow>,
}

impl ShortcutHandler {
    pub fn new(workflow: Arc<ReadingWorkflow>) -> Self {
        Self { workflow }
    }
}

#[async_trait]
impl EventHandler for ShortcutHandler {
    fn route(&self) -> RouteKey {
        RouteKey::exact(SlackEventType::MessageShortcut, SHORTCUT_CALLBACK_ID)
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::MessageShortcut(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        Ok(HandlerResult::Workflow(self.workflow.start(event, ctx).await?))
    }
}

pub struct SubmissionHandler {
    workflow: Arc<ReadingWorkflow>,
}

impl SubmissionHandler {
    pub fn new(workflow: Arc<ReadingWorkflow>) -> Self {
        Self { workflow }
    }
}

#[async_trait]
impl EventHandler for SubmissionHandler {
    fn route(&self) -> RouteKey {
        RouteKey::exact(SlackEventType::ViewSubmission, SUBMISSION_CALLBACK_ID)
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        Ok(HandlerResult::Workflow(self.workflow.submit(event, ctx).await?))
    }
}
