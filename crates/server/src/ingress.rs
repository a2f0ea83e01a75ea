//! HTTP Events API ingress: `POST /slack/events`.
//!
//! Requests are signature-checked, answered with 200 right away, and the
//! decoded event is dispatched on its own task.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use briefly_slack::events::EventDispatcher;
use briefly_slack::payload::{parse_http_body, HttpPayload};
use briefly_slack::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use briefly_slack::socket::dispatch_envelope;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct IngressState {
    dispatcher: Arc<EventDispatcher>,
    signing_secret: SecretString,
}

impl IngressState {
    pub fn new(dispatcher: Arc<EventDispatcher>, signing_secret: SecretString) -> Self {
        Self { dispatcher, signing_secret }
    }
}

pub fn router(state: IngressState) -> Router {
    Router::new().route("/slack/events", post(slack_events)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: IngressState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.ingress.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "slack events endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.ingress.error",
                correlation_id = "bootstrap",
                error = %error,
                "slack events endpoint terminated unexpectedly"
            );
        }
    });

    Ok(())
}

async fn slack_events(
    State(state): State<IngressState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    if let Err(error) = signature::verify(
        &state.signing_secret,
        header(TIMESTAMP_HEADER),
        header(SIGNATURE_HEADER),
        &body,
        Utc::now().timestamp(),
    ) {
        warn!(
            event_name = "ingress.slack.signature_rejected",
            error = %error,
            "rejecting unsigned slack request"
        );
        return (StatusCode::UNAUTHORIZED, error.to_string()).into_response();
    }

    match parse_http_body(header(CONTENT_TYPE.as_str()), &body) {
        Ok(HttpPayload::UrlVerification { challenge }) => {
            info!(event_name = "ingress.slack.url_verified", "answering url verification");
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(HttpPayload::Envelope(envelope)) => {
            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                user_id = envelope.event.user_id().unwrap_or("unknown"),
                "received slack request"
            );
            let dispatcher = state.dispatcher.clone();
            tokio::spawn(async move { dispatch_envelope(&dispatcher, envelope).await });
            StatusCode::OK.into_response()
        }
        Err(error) => {
            warn!(
                event_name = "ingress.slack.payload_rejected",
                error = %error,
                "could not decode slack request"
            );
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
    }
}
