use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of one reading-recommendation workflow instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    OpenedPlaceholder,
    Populated,
    AwaitingSubmission,
    ProcessingSubmission,
    Completed,
    Errored,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenedPlaceholder => "opened_placeholder",
            Self::Populated => "populated",
            Self::AwaitingSubmission => "awaiting_submission",
            Self::ProcessingSubmission => "processing_submission",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    EnrichmentCompleted,
    CheckboxesPresented,
    SelectionSubmitted,
    RecommendationsDelivered,
    ProcessingFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    SendDirectMessages,
    UpdateModalInPlace,
    OpenProcessingModal,
    RequestRecommendations,
    ShowCompletedModal,
    ShowErrorModal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

/// Correlates a shortcut invocation with its later submission through the
/// modal's `private_metadata`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_metadata(metadata: &str) -> Option<Self> {
        let trimmed = metadata.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
