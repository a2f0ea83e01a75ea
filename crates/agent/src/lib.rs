//! Completion Gateway implementations.
//!
//! - [`llm::ChatCompletionClient`] talks to an OpenAI-compatible
//!   `/chat/completions` endpoint (OpenAI or a local Ollama).
//! - [`runtime::ToolAgent`] wraps any gateway in a bounded decide/act loop over a
//!   closed set of [`tools::Capability`] values: web search, a static tech-stack
//!   lookup, and retrieval over local documentation files.
//!
//! The model only picks which capability to run and phrases the answer. Tool
//! outputs are plain text observations fed back into the next prompt.

pub mod llm;
pub mod retrieval;
pub mod runtime;
pub mod search;
pub mod tech_stack;
pub mod tools;

pub use llm::ChatCompletionClient;
pub use retrieval::{DocsQueryTool, DocumentIndex};
pub use runtime::ToolAgent;
pub use search::WebSearchTool;
pub use tech_stack::TechStackTool;
pub use tools::{Capability, Tool, ToolError, ToolRegistry};
