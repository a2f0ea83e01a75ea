pub mod config;
pub mod errors;
pub mod flows;
pub mod gateway;
pub mod reading;

pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, FlowEvent, FlowState, WorkflowId};
pub use gateway::{CompletionError, CompletionGateway};
pub use reading::{parse_topics, PromptTemplates, ReaderProfile};
