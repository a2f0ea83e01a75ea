use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::api::SlackWebClient;
use crate::events::{DispatchError, EventContext, EventDispatcher, HandlerResult, SlackEnvelope};
use crate::payload::{parse_socket_frame, SocketFrame};

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// An envelope-bearing frame read off the socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    Envelope(SlackEnvelope),
    Undecodable { envelope_id: String, reason: String },
}

/// A Socket Mode connection. `next_frame` yields `Ok(None)` once the
/// server closes the stream cleanly.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_frame(&self) -> Result<Option<InboundFrame>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Socket Mode over a WebSocket opened through `apps.connections.open`.
pub struct WebSocketTransport {
    client: SlackWebClient,
    app_token: SecretString,
    sink: Mutex<Option<SplitSink<WsConnection, WsMessage>>>,
    stream: Mutex<Option<SplitStream<WsConnection>>>,
}

impl WebSocketTransport {
    pub fn new(client: SlackWebClient, app_token: SecretString) -> Self {
        Self { client, app_token, sink: Mutex::new(None), stream: Mutex::new(None) }
    }

    async fn send(&self, message: WsMessage) -> Result<(), String> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or_else(|| "socket is not connected".to_owned())?;
        sink.send(message).await.map_err(|error| error.to_string())
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .client
            .open_socket_url(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (connection, _) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        let (sink, stream) = connection.split();

        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_frame(&self) -> Result<Option<InboundFrame>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Receive("socket is not connected".to_owned()))?;

        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => match parse_socket_frame(&text) {
                    Ok(SocketFrame::Envelope(envelope)) => {
                        return Ok(Some(InboundFrame::Envelope(envelope)))
                    }
                    Ok(SocketFrame::Undecodable { envelope_id, reason }) => {
                        return Ok(Some(InboundFrame::Undecodable { envelope_id, reason }))
                    }
                    Ok(SocketFrame::Hello) => {
                        debug!(event_name = "ingress.slack.hello", "socket mode hello received");
                    }
                    Ok(SocketFrame::Disconnect { reason }) => {
                        return Err(TransportError::Receive(format!(
                            "server requested disconnect: {reason}"
                        )));
                    }
                    Err(error) => {
                        warn!(
                            event_name = "ingress.slack.frame_rejected",
                            error = %error,
                            "dropping undecodable socket mode frame"
                        );
                    }
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    self.send(WsMessage::Pong(data)).await.map_err(TransportError::Receive)?;
                }
                Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        self.send(WsMessage::Text(ack)).await.map_err(TransportError::Acknowledge)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let sink = self.sink.lock().await.take();
        self.stream.lock().await.take();
        match sink {
            Some(mut sink) => {
                sink.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
            }
            None => Ok(()),
        }
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: Arc<EventDispatcher>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Runs sessions until `max_retries + 1` consecutive connects fail. A
    /// session that ends, cleanly or not, is followed by a fresh connect.
    pub async fn start(&self) -> Result<()> {
        let mut failed_connects = 0_u32;
        let mut session = 0_u64;

        loop {
            if let Err(error) = self.transport.connect().await {
                failed_connects += 1;
                warn!(
                    event_name = "ingress.slack.connect_failed",
                    failed_connects,
                    max_retries = self.reconnect_policy.max_retries,
                    error = %error,
                    "socket mode transport failed to connect"
                );

                if failed_connects > self.reconnect_policy.max_retries {
                    return Err(anyhow!(
                        "socket mode gave up after {failed_connects} consecutive connect failures: {error}"
                    ));
                }

                let delay = self.reconnect_policy.backoff(failed_connects - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            failed_connects = 0;
            session += 1;
            info!(event_name = "ingress.slack.connected", session, "socket mode transport connected");

            match self.pump(session).await {
                Ok(()) => info!(
                    event_name = "ingress.slack.session_closed",
                    session,
                    "socket mode stream closed; reconnecting"
                ),
                Err(error) => warn!(
                    event_name = "ingress.slack.session_failed",
                    session,
                    error = %error,
                    "socket mode session ended; reconnecting"
                ),
            }
        }
    }

    async fn pump(&self, session: u64) -> Result<(), TransportError> {
        let mut in_flight = JoinSet::new();
        loop {
            while in_flight.try_join_next().is_some() {}

            let envelope = match self.transport.next_frame().await {
                Ok(Some(InboundFrame::Envelope(envelope))) => envelope,
                Ok(Some(InboundFrame::Undecodable { envelope_id, reason })) => {
                    self.acknowledge(&envelope_id, "unknown").await;
                    warn!(
                        event_name = "ingress.slack.frame_rejected",
                        envelope_id = %envelope_id,
                        correlation_id = %envelope_id,
                        reason = %reason,
                        "dropping undecodable slack envelope after ack"
                    );
                    continue;
                }
                Ok(None) => {
                    info!(session, in_flight = in_flight.len(), "socket mode transport stream closed");
                    while in_flight.join_next().await.is_some() {}
                    self.transport.disconnect().await?;
                    return Ok(());
                }
                Err(error) => {
                    // Handlers already running keep going across the reconnect.
                    in_flight.detach_all();
                    return Err(error);
                }
            };
            let user_id = envelope.event.user_id().unwrap_or("unknown").to_owned();

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                user_id = %user_id,
                "received slack envelope"
            );
            self.acknowledge(&envelope.envelope_id, &user_id).await;

            let dispatcher = self.dispatcher.clone();
            in_flight.spawn(async move { dispatch_envelope(&dispatcher, envelope).await });
        }
    }

    async fn acknowledge(&self, envelope_id: &str, user_id: &str) {
        match self.transport.acknowledge(envelope_id).await {
            Ok(()) => debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope_id,
                correlation_id = %envelope_id,
                user_id = %user_id,
                "acknowledged slack envelope"
            ),
            Err(error) => warn!(
                event_name = "ingress.slack.ack_failed",
                envelope_id = %envelope_id,
                correlation_id = %envelope_id,
                user_id = %user_id,
                error = %error,
                "failed to acknowledge slack envelope"
            ),
        }
    }
}

/// Runs the handler for one envelope and logs the outcome. Handler failures
/// never escape into the receive loop.
pub async fn dispatch_envelope(dispatcher: &EventDispatcher, envelope: SlackEnvelope) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    match dispatcher.dispatch(&envelope, &context).await {
        Ok(result) => debug!(
            event_name = "ingress.slack.event_handled",
            correlation_id = %context.correlation_id,
            outcome = outcome_label(&result),
            "slack event handled"
        ),
        Err(error) => warn!(
            event_name = "ingress.slack.event_failed",
            correlation_id = %context.correlation_id,
            event_type = ?envelope.event.event_type(),
            user_id = envelope.event.user_id().unwrap_or("unknown"),
            error = %error,
            "event dispatch failed; continuing socket loop"
        ),
    }
}

fn outcome_label(result: &HandlerResult) -> &'static str {
    match result {
        HandlerResult::Posted { .. } => "posted",
        HandlerResult::Workflow(report) => report.state.as_str(),
        HandlerResult::Processed => "processed",
        HandlerResult::Ignored => "ignored",
    }
}
