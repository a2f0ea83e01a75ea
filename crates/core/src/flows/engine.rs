use thiserror::Error;

use crate::flows::states::{FlowAction, FlowEvent, FlowState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

#[derive(Clone, Debug, Default)]
pub struct FlowEngine;

impl FlowEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_state(&self) -> FlowState {
        FlowState::OpenedPlaceholder
    }

    pub fn apply(
        &self,
        current: FlowState,
        event: FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use FlowAction::{
            OpenProcessingModal, RequestRecommendations, SendDirectMessages, ShowCompletedModal,
            ShowErrorModal, UpdateModalInPlace,
        };
        use FlowEvent::{
            CheckboxesPresented, EnrichmentCompleted, ProcessingFailed, RecommendationsDelivered,
            SelectionSubmitted,
        };
        use FlowState::{
            AwaitingSubmission, Completed, Errored, OpenedPlaceholder, Populated,
            ProcessingSubmission,
        };

        let (to, actions) = match (current, event) {
            (OpenedPlaceholder, EnrichmentCompleted) => (Populated, vec![SendDirectMessages]),
            (Populated, CheckboxesPresented) => (AwaitingSubmission, vec![UpdateModalInPlace]),
            (AwaitingSubmission, SelectionSubmitted) => {
                (ProcessingSubmission, vec![OpenProcessingModal, RequestRecommendations])
            }
            (ProcessingSubmission, RecommendationsDelivered) => {
                (Completed, vec![SendDirectMessages, ShowCompletedModal])
            }
            (ProcessingSubmission, ProcessingFailed) => (Errored, vec![ShowErrorModal]),
            _ => return Err(FlowTransitionError::InvalidTransition { state: current, event }),
        };

        Ok(TransitionOutcome { from: current, to, event, actions })
    }
}
