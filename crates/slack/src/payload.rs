//! Decoding of Slack's wire payloads into [`SlackEvent`]s.
//!
//! Socket Mode frames and HTTP Events API bodies share the same inner shapes:
//! an `event_callback` wrapping an Events API event, or an interactive payload
//! (`block_actions`, `message_action`, `view_submission`).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::events::{
    AppMentionEvent, BlockActionEvent, MessageEvent, MessageShortcutEvent, SlackEnvelope,
    SlackEvent, ViewSubmissionEvent,
};

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("slack payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("slack payload is not valid utf-8")]
    Encoding,
    #[error("form body has no `payload` field")]
    MissingFormPayload,
    #[error("{kind} payload is missing `{field}`")]
    MissingField { kind: &'static str, field: &'static str },
}

/// One Socket Mode frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
    /// The frame carried an `envelope_id` but its payload did not decode.
    /// It still has to be acknowledged.
    Undecodable { envelope_id: String, reason: String },
}

/// One HTTP Events API request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpPayload {
    UrlVerification { challenge: String },
    Envelope(SlackEnvelope),
}

#[derive(Deserialize)]
struct RawSocketFrame {
    #[serde(rename = "type")]
    frame_type: String,
    envelope_id: Option<String>,
    reason: Option<String>,
    #[serde(default)]
    payload: Value,
}

pub fn parse_socket_frame(text: &str) -> Result<SocketFrame, PayloadError> {
    let frame: RawSocketFrame = serde_json::from_str(text)?;

    let decoded = match frame.frame_type.as_str() {
        "hello" => return Ok(SocketFrame::Hello),
        "disconnect" => {
            return Ok(SocketFrame::Disconnect {
                reason: frame.reason.unwrap_or_else(|| "unspecified".to_owned()),
            })
        }
        "events_api" => callback_event(frame.payload),
        "interactive" => interactive_event(frame.payload),
        other => Ok(SlackEvent::Unsupported { event_type: other.to_owned() }),
    };

    match (decoded, frame.envelope_id) {
        (Ok(event), envelope_id) => Ok(SocketFrame::Envelope(SlackEnvelope {
            envelope_id: envelope_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            event,
        })),
        (Err(error), Some(envelope_id)) => {
            Ok(SocketFrame::Undecodable { envelope_id, reason: error.to_string() })
        }
        (Err(error), None) => Err(error),
    }
}

/// Decodes a `POST /slack/events` body. Interactive payloads arrive
/// form-encoded as `payload=<json>`; everything else is raw JSON.
pub fn parse_http_body(content_type: Option<&str>, body: &[u8]) -> Result<HttpPayload, PayloadError> {
    let body = std::str::from_utf8(body).map_err(|_| PayloadError::Encoding)?;
    let is_form =
        content_type.is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let payload: Value = serde_json::from_str(&form_payload(body)?)?;
        let envelope_id = string_at(&payload, &["trigger_id"])
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let event = interactive_event(payload)?;
        return Ok(HttpPayload::Envelope(SlackEnvelope { envelope_id, event }));
    }

    let payload: Value = serde_json::from_str(body)?;
    match string_at(&payload, &["type"]) {
        Some("url_verification") => {
            let challenge = string_at(&payload, &["challenge"])
                .ok_or(PayloadError::MissingField { kind: "url_verification", field: "challenge" })?;
            Ok(HttpPayload::UrlVerification { challenge: challenge.to_owned() })
        }
        _ => {
            let envelope_id = string_at(&payload, &["event_id"])
                .map(str::to_owned)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let event = callback_event(payload)?;
            Ok(HttpPayload::Envelope(SlackEnvelope { envelope_id, event }))
        }
    }
}

fn form_payload(body: &str) -> Result<String, PayloadError> {
    let encoded = body
        .split('&')
        .find_map(|pair| pair.strip_prefix("payload="))
        .ok_or(PayloadError::MissingFormPayload)?;
    urlencoding::decode(&encoded.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|_| PayloadError::Encoding)
}

#[derive(Deserialize)]
struct RawCallbackEvent {
    #[serde(rename = "type")]
    event_type: String,
    user: Option<String>,
    channel: Option<String>,
    #[serde(default)]
    text: String,
    ts: Option<String>,
    thread_ts: Option<String>,
    subtype: Option<String>,
}

fn callback_event(payload: Value) -> Result<SlackEvent, PayloadError> {
    let outer_type = string_at(&payload, &["type"]).unwrap_or("unknown").to_owned();
    if outer_type != "event_callback" {
        return Ok(SlackEvent::Unsupported { event_type: outer_type });
    }
    let Some(inner) = payload.get("event").cloned() else {
        return Err(PayloadError::MissingField { kind: "event_callback", field: "event" });
    };
    let event: RawCallbackEvent = serde_json::from_value(inner)?;

    match event.event_type.as_str() {
        "app_mention" => {
            const KIND: &str = "app_mention";
            Ok(SlackEvent::AppMention(AppMentionEvent {
                user_id: event.user.ok_or(PayloadError::MissingField { kind: KIND, field: "user" })?,
                channel_id: event
                    .channel
                    .ok_or(PayloadError::MissingField { kind: KIND, field: "channel" })?,
                text: event.text,
                ts: event.ts.ok_or(PayloadError::MissingField { kind: KIND, field: "ts" })?,
                thread_ts: event.thread_ts,
            }))
        }
        "message" => Ok(SlackEvent::Message(MessageEvent {
            channel_id: event.channel,
            user_id: event.user,
            text: event.text,
            subtype: event.subtype,
        })),
        other => Ok(SlackEvent::Unsupported { event_type: other.to_owned() }),
    }
}

#[derive(Deserialize)]
struct RawSelectedOption {
    value: String,
}

#[derive(Deserialize)]
struct RawActionState {
    #[serde(default)]
    selected_options: Vec<RawSelectedOption>,
}

fn interactive_event(payload: Value) -> Result<SlackEvent, PayloadError> {
    let payload_type = string_at(&payload, &["type"]).unwrap_or("unknown");
    let user_id = string_at(&payload, &["user", "id"]).map(str::to_owned);
    let trigger_id = string_at(&payload, &["trigger_id"]).map(str::to_owned);
    let channel_id = string_at(&payload, &["channel", "id"]).map(str::to_owned);

    match payload_type {
        "block_actions" => {
            const KIND: &str = "block_actions";
            let action = payload
                .get("actions")
                .and_then(|actions| actions.get(0))
                .ok_or(PayloadError::MissingField { kind: KIND, field: "actions" })?;
            Ok(SlackEvent::BlockAction(BlockActionEvent {
                user_id: user_id.ok_or(PayloadError::MissingField { kind: KIND, field: "user.id" })?,
                channel_id,
                trigger_id,
                action_id: string_at(action, &["action_id"])
                    .ok_or(PayloadError::MissingField { kind: KIND, field: "action_id" })?
                    .to_owned(),
                value: string_at(action, &["value"]).map(str::to_owned),
                message_ts: string_at(&payload, &["message", "ts"]).map(str::to_owned),
            }))
        }
        "message_action" => {
            const KIND: &str = "message_action";
            Ok(SlackEvent::MessageShortcut(MessageShortcutEvent {
                callback_id: string_at(&payload, &["callback_id"])
                    .ok_or(PayloadError::MissingField { kind: KIND, field: "callback_id" })?
                    .to_owned(),
                trigger_id: trigger_id
                    .ok_or(PayloadError::MissingField { kind: KIND, field: "trigger_id" })?,
                user_id: user_id.ok_or(PayloadError::MissingField { kind: KIND, field: "user.id" })?,
                channel_id,
                message_text: string_at(&payload, &["message", "text"]).unwrap_or_default().to_owned(),
            }))
        }
        "view_submission" => {
            const KIND: &str = "view_submission";
            let view = payload
                .get("view")
                .ok_or(PayloadError::MissingField { kind: KIND, field: "view" })?;
            Ok(SlackEvent::ViewSubmission(ViewSubmissionEvent {
                callback_id: string_at(view, &["callback_id"]).unwrap_or_default().to_owned(),
                trigger_id,
                user_id: user_id.ok_or(PayloadError::MissingField { kind: KIND, field: "user.id" })?,
                view_id: string_at(view, &["id"])
                    .ok_or(PayloadError::MissingField { kind: KIND, field: "view.id" })?
                    .to_owned(),
                private_metadata: string_at(view, &["private_metadata"])
                    .unwrap_or_default()
                    .to_owned(),
                selected_values: selected_values(view)?,
            }))
        }
        other => Ok(SlackEvent::Unsupported { event_type: other.to_owned() }),
    }
}

/// Flattens `view.state.values` (block id -> action id -> selected options)
/// into the selected option values, ordered by block id then action id.
fn selected_values(view: &Value) -> Result<Vec<String>, PayloadError> {
    let Some(values) = view.get("state").and_then(|state| state.get("values")) else {
        return Ok(Vec::new());
    };
    let blocks: BTreeMap<String, BTreeMap<String, RawActionState>> =
        serde_json::from_value(values.clone())?;

    Ok(blocks
        .into_values()
        .flat_map(BTreeMap::into_values)
        .flat_map(|action| action.selected_options)
        .map(|option| option.value)
        .collect())
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter().try_fold(value, |current, key| current.get(key))?.as_str()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_http_body, parse_socket_frame, HttpPayload, PayloadError, SocketFrame};
    use crate::events::{SlackEvent, SlackEventType};

    fn envelope(frame: SocketFrame) -> crate::events::SlackEnvelope {
        match frame {
            SocketFrame::Envelope(envelope) => envelope,
            other => panic!("expected envelope frame, got {other:?}"),
        }
    }

    #[test]
    fn hello_and_disconnect_frames_are_control_frames() {
        assert_eq!(
            parse_socket_frame(r#"{"type":"hello","num_connections":1}"#).expect("hello"),
            SocketFrame::Hello
        );
        assert_eq!(
            parse_socket_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#)
                .expect("disconnect"),
            SocketFrame::Disconnect { reason: "refresh_requested".to_owned() }
        );
    }

    #[test]
    fn events_api_app_mention_keeps_thread_ts() {
        let frame = json!({
            "envelope_id": "env-1",
            "type": "events_api",
            "payload": {
                "type": "event_callback",
                "event_id": "Ev1",
                "event": {
                    "type": "app_mention",
                    "user": "U1",
                    "text": "<@B1> what is a pod?",
                    "channel": "C1",
                    "ts": "1700000000.000100",
                    "thread_ts": "1700000000.000001"
                }
            }
        });

        let envelope = envelope(parse_socket_frame(&frame.to_string()).expect("frame"));
        assert_eq!(envelope.envelope_id, "env-1");
        let SlackEvent::AppMention(event) = envelope.event else {
            panic!("expected app mention");
        };
        assert_eq!(event.user_id, "U1");
        assert_eq!(event.channel_id, "C1");
        assert_eq!(event.thread_ts.as_deref(), Some("1700000000.000001"));
    }

    #[test]
    fn app_mention_without_channel_keeps_envelope_id_for_ack() {
        let frame = json!({
            "envelope_id": "env-2",
            "type": "events_api",
            "payload": {
                "type": "event_callback",
                "event": { "type": "app_mention", "user": "U1", "text": "hi", "ts": "1.0" }
            }
        });

        let SocketFrame::Undecodable { envelope_id, reason } =
            parse_socket_frame(&frame.to_string()).expect("frame")
        else {
            panic!("expected undecodable frame");
        };
        assert_eq!(envelope_id, "env-2");
        assert!(reason.contains("`channel`"), "{reason}");
    }

    #[test]
    fn undecodable_payload_without_envelope_id_is_an_error() {
        let frame = json!({
            "type": "events_api",
            "payload": {
                "type": "event_callback",
                "event": { "type": "app_mention", "user": "U1", "text": "hi", "ts": "1.0" }
            }
        });

        let error = parse_socket_frame(&frame.to_string()).expect_err("missing channel");
        assert!(matches!(error, PayloadError::MissingField { field: "channel", .. }));
    }

    #[test]
    fn interactive_block_action_routes_by_action_id() {
        let frame = json!({
            "envelope_id": "env-3",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "user": { "id": "U1" },
                "trigger_id": "trig-1",
                "channel": { "id": "C1" },
                "message": { "ts": "1700000000.1" },
                "actions": [{ "action_id": "button_click", "value": "clicked" }]
            }
        });

        let envelope = envelope(parse_socket_frame(&frame.to_string()).expect("frame"));
        let key = envelope.event.route_key();
        assert_eq!(key.event_type, SlackEventType::BlockAction);
        assert_eq!(key.identifier.as_deref(), Some("button_click"));
        let SlackEvent::BlockAction(event) = envelope.event else {
            panic!("expected block action");
        };
        assert_eq!(event.channel_id.as_deref(), Some("C1"));
        assert_eq!(event.value.as_deref(), Some("clicked"));
    }

    #[test]
    fn message_shortcut_carries_message_text() {
        let frame = json!({
            "envelope_id": "env-4",
            "type": "interactive",
            "payload": {
                "type": "message_action",
                "callback_id": "reading_recommendations",
                "trigger_id": "trig-2",
                "user": { "id": "U2" },
                "channel": { "id": "C2" },
                "message": { "text": "Let's adopt gRPC for the billing service." }
            }
        });

        let SlackEvent::MessageShortcut(event) =
            envelope(parse_socket_frame(&frame.to_string()).expect("frame")).event
        else {
            panic!("expected shortcut");
        };
        assert_eq!(event.callback_id, "reading_recommendations");
        assert_eq!(event.trigger_id, "trig-2");
        assert_eq!(event.message_text, "Let's adopt gRPC for the billing service.");
    }

    #[test]
    fn view_submission_flattens_selected_options() {
        let frame = json!({
            "envelope_id": "env-5",
            "type": "interactive",
            "payload": {
                "type": "view_submission",
                "trigger_id": "trig-3",
                "user": { "id": "U1" },
                "view": {
                    "id": "V1",
                    "callback_id": "topic_selection",
                    "private_metadata": "wf-9",
                    "state": { "values": {
                        "reading.topics.v1": {
                            "reading.topics.select.v1": {
                                "type": "checkboxes",
                                "selected_options": [
                                    { "text": { "type": "plain_text", "text": "Docker" }, "value": "Docker" },
                                    { "text": { "type": "plain_text", "text": "Kubernetes" }, "value": "Kubernetes" }
                                ]
                            }
                        }
                    } }
                }
            }
        });

        let SlackEvent::ViewSubmission(event) =
            envelope(parse_socket_frame(&frame.to_string()).expect("frame")).event
        else {
            panic!("expected view submission");
        };
        assert_eq!(event.view_id, "V1");
        assert_eq!(event.private_metadata, "wf-9");
        assert_eq!(event.selected_values, vec!["Docker".to_owned(), "Kubernetes".to_owned()]);
    }

    #[test]
    fn unknown_frame_types_become_unsupported_events() {
        let frame = json!({ "envelope_id": "env-6", "type": "slash_commands", "payload": {} });

        let envelope = envelope(parse_socket_frame(&frame.to_string()).expect("frame"));
        assert_eq!(envelope.event, SlackEvent::Unsupported { event_type: "slash_commands".to_owned() });
    }

    #[test]
    fn http_url_verification_echoes_challenge() {
        let body = br#"{"type":"url_verification","token":"t","challenge":"abc123"}"#;

        let payload = parse_http_body(Some("application/json"), body).expect("payload");
        assert_eq!(payload, HttpPayload::UrlVerification { challenge: "abc123".to_owned() });
    }

    #[test]
    fn http_event_callback_uses_event_id_as_envelope_id() {
        let body = json!({
            "type": "event_callback",
            "event_id": "Ev42",
            "event": { "type": "message", "channel": "C1", "user": "U1", "text": "hello" }
        })
        .to_string();

        let HttpPayload::Envelope(envelope) =
            parse_http_body(Some("application/json"), body.as_bytes()).expect("payload")
        else {
            panic!("expected envelope");
        };
        assert_eq!(envelope.envelope_id, "Ev42");
        assert_eq!(envelope.event.event_type(), SlackEventType::Message);
    }

    #[test]
    fn http_form_body_decodes_interactive_payload() {
        let inner = json!({
            "type": "block_actions",
            "user": { "id": "U7" },
            "trigger_id": "trig-7",
            "actions": [{ "action_id": "button_click" }]
        })
        .to_string();
        let body = format!("payload={}", urlencoding::encode(&inner));

        let HttpPayload::Envelope(envelope) =
            parse_http_body(Some("application/x-www-form-urlencoded"), body.as_bytes())
                .expect("payload")
        else {
            panic!("expected envelope");
        };
        assert_eq!(envelope.event.user_id(), Some("U7"));
        assert_eq!(envelope.event.event_type(), SlackEventType::BlockAction);
    }

    #[test]
    fn form_body_without_payload_field_is_rejected() {
        let error = parse_http_body(Some("application/x-www-form-urlencoded"), b"token=abc")
            .expect_err("no payload");
        assert!(matches!(error, PayloadError::MissingFormPayload));
    }
}
