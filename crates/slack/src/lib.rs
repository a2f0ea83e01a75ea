//! Slack interface for briefly.
//!
//! - **Socket Mode** (`socket`) - WebSocket connection to Slack (no public URL needed)
//! - **Payloads** (`payload`) - Socket Mode frames and HTTP Events API bodies into typed events
//! - **Signatures** (`signature`) - `v0` request signing for the HTTP ingress
//! - **Events** (`events`) - routing of button clicks, mentions, messages, shortcuts and submissions
//! - **Workflow** (`workflow`) - the reading-recommendation modal flow
//! - **Web API** (`api`) - `views.*`, `chat.postMessage`, `conversations.open`, `users.info`
//! - **Block Kit** (`blocks`) - message and modal builders
//!
//! # Architecture
//!
//! ```text
//! Slack → SocketModeRunner / HTTP ingress → EventDispatcher → Handlers → CompletionGateway
//!                                                         ↓
//!                                             SlackApi (Block Kit views/messages)
//! ```

pub mod api;
pub mod blocks;
pub mod events;
pub mod payload;
pub mod signature;
pub mod socket;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{SlackApi, SlackApiError, SlackWebClient, ViewId};
pub use events::{default_dispatcher, EventDispatcher, SlackEnvelope, SlackEvent};
pub use socket::{ReconnectPolicy, SocketModeRunner, WebSocketTransport};
