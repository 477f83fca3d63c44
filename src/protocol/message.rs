//! Wire schema for the duplex transcription protocol.
//!
//! Control messages are JSON with a `header`/`payload` envelope; audio
//! travels as raw binary messages on the same channel. Server events are
//! routed by `header.name`; names this client does not know are ignored
//! rather than treated as fatal.

use crate::defaults::{PROTOCOL_NAMESPACE, WIRE_FORMAT};
use crate::error::{Result, VocapError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Generate a correlation or message id.
///
/// The service rejects ids containing `-`, so these are v4 UUIDs rendered
/// in the 32-character dashless form.
pub fn wire_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Header carried on every control message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageHeader {
    pub appkey: String,
    pub namespace: String,
    pub name: String,
    pub task_id: String,
    pub message_id: String,
}

/// A client→server control message.
#[derive(Debug, Clone, Serialize)]
pub struct ControlMessage {
    pub header: MessageHeader,
    pub payload: serde_json::Value,
}

impl ControlMessage {
    fn new(appkey: &str, name: &str, task_id: &str, payload: serde_json::Value) -> Self {
        Self {
            header: MessageHeader {
                appkey: appkey.to_string(),
                namespace: PROTOCOL_NAMESPACE.to_string(),
                name: name.to_string(),
                task_id: task_id.to_string(),
                message_id: wire_id(),
            },
            payload,
        }
    }

    /// StartTranscription: declares the audio format and requested features
    /// (interim results, punctuation and number normalization).
    pub fn start_transcription(appkey: &str, task_id: &str, sample_rate: u32) -> Self {
        Self::new(
            appkey,
            "StartTranscription",
            task_id,
            json!({
                "format": WIRE_FORMAT,
                "sample_rate": sample_rate,
                "enable_intermediate_result": true,
                "enable_punctuation_prediction": true,
                "enable_inverse_text_normalization": true,
            }),
        )
    }

    /// StopTranscription: asks the service to finalize the task.
    pub fn stop_transcription(appkey: &str, task_id: &str) -> Self {
        Self::new(appkey, "StopTranscription", task_id, json!({}))
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VocapError::Protocol {
            message: format!("Failed to serialize control message: {}", e),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ServerHeader {
    name: String,
    #[serde(default)]
    status_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerPayload {
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    header: ServerHeader,
    #[serde(default)]
    payload: Option<ServerPayload>,
}

/// A decoded server→client event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The task is accepted; streaming may begin.
    TranscriptionStarted,
    /// The interim suffix changed; replaces the previous interim wholesale.
    ResultChanged { text: String },
    /// The current sentence is final; commit it and clear the interim.
    SentenceEnd { text: String },
    /// The whole task is finalized; no further events follow.
    Completed,
    /// Server-side failure with its status text.
    TaskFailed { status_text: String },
    /// An event name this client does not recognize.
    Ignored,
}

/// Decode one text message from the server.
///
/// # Errors
/// Returns `VocapError::Protocol` on malformed JSON; unknown event names
/// are `ServerEvent::Ignored`, not errors.
pub fn decode_event(text: &str) -> Result<ServerEvent> {
    let message: ServerMessage =
        serde_json::from_str(text).map_err(|e| VocapError::Protocol {
            message: format!("Malformed server event: {}", e),
        })?;

    let result_text = message
        .payload
        .and_then(|p| p.result)
        .unwrap_or_default();

    Ok(match message.header.name.as_str() {
        "TranscriptionStarted" => ServerEvent::TranscriptionStarted,
        "TranscriptionResultChanged" => ServerEvent::ResultChanged { text: result_text },
        "SentenceEnd" => ServerEvent::SentenceEnd { text: result_text },
        "TranscriptionCompleted" => ServerEvent::Completed,
        "TaskFailed" => ServerEvent::TaskFailed {
            status_text: message
                .header
                .status_text
                .unwrap_or_else(|| "unspecified server failure".to_string()),
        },
        _ => ServerEvent::Ignored,
    })
}
