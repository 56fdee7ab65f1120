//! JSON event protocol for the live-session channel.
//!
//! Every WebSocket text frame is one event:
//! ```text
//! {"event": "<name>", "data": <payload>, "noteId": "<id>"?}
//! ```
//!
//! Client → server: `joinNote`, `leaveNote`, `typing`, `stopTyping`,
//! `noteUpdated`, `collaboratorUpdated`.
//! Server → client: `typing`, `stopTyping`, `noteUpdated`,
//! `collaboratorUpdated`. Inbound frames may carry an envelope-level
//! `noteId`, which the session checks against the note it is viewing.

use notely_core::{NoteDraft, NoteId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "joinNote")]
    JoinNote(NoteId),
    #[serde(rename = "leaveNote")]
    LeaveNote(NoteId),
    #[serde(rename = "typing")]
    Typing {
        #[serde(rename = "noteId")]
        note_id: NoteId,
        /// Display name of the typist.
        user: String,
    },
    #[serde(rename = "stopTyping")]
    StopTyping {
        #[serde(rename = "noteId")]
        note_id: NoteId,
    },
    #[serde(rename = "noteUpdated")]
    NoteUpdated {
        #[serde(rename = "noteId")]
        note_id: NoteId,
        data: NoteDraft,
    },
    #[serde(rename = "collaboratorUpdated")]
    CollaboratorUpdated {
        #[serde(rename = "noteId")]
        note_id: NoteId,
    },
}

impl ClientEvent {
    pub fn note_id(&self) -> &NoteId {
        match self {
            ClientEvent::JoinNote(id) | ClientEvent::LeaveNote(id) => id,
            ClientEvent::Typing { note_id, .. }
            | ClientEvent::StopTyping { note_id }
            | ClientEvent::NoteUpdated { note_id, .. }
            | ClientEvent::CollaboratorUpdated { note_id } => note_id,
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinNote(_) => "joinNote",
            ClientEvent::LeaveNote(_) => "leaveNote",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::StopTyping { .. } => "stopTyping",
            ClientEvent::NoteUpdated { .. } => "noteUpdated",
            ClientEvent::CollaboratorUpdated { .. } => "collaboratorUpdated",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Events the server pushes to a note channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A peer is typing; carries their display name.
    Typing(String),
    StopTyping,
    /// A peer saved new title/content.
    NoteUpdated(NoteDraft),
    /// Collaborators changed; peers should re-fetch the list.
    CollaboratorUpdated { message: Option<String> },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Typing(_) => "typing",
            ServerEvent::StopTyping => "stopTyping",
            ServerEvent::NoteUpdated(_) => "noteUpdated",
            ServerEvent::CollaboratorUpdated { .. } => "collaboratorUpdated",
        }
    }
}

/// One inbound frame: the event plus the note it names, when it names one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFrame {
    pub event: ServerEvent,
    pub note_id: Option<NoteId>,
}

#[derive(Serialize, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(rename = "noteId", default, skip_serializing_if = "Option::is_none")]
    note_id: Option<NoteId>,
}

impl ServerFrame {
    pub fn new(event: ServerEvent) -> Self {
        Self { event, note_id: None }
    }

    pub fn for_note(event: ServerEvent, note_id: NoteId) -> Self {
        Self { event, note_id: Some(note_id) }
    }

    /// Decode a text frame. Unknown event names yield `Ok(None)`.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        let mut note_id = raw.note_id;

        let event = match raw.event.as_str() {
            "typing" => {
                // Either a bare display name or the relayed {noteId, user}.
                let user = match &raw.data {
                    Value::String(name) => name.clone(),
                    Value::Object(map) => {
                        if note_id.is_none() {
                            note_id = map.get("noteId").and_then(Value::as_str).map(NoteId::new);
                        }
                        map.get("user")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .ok_or_else(|| malformed("typing", "missing user"))?
                    }
                    _ => return Err(malformed("typing", "expected a display name")),
                };
                ServerEvent::Typing(user)
            }
            "stopTyping" => ServerEvent::StopTyping,
            "noteUpdated" => {
                // Either the bare {title, content} or the relayed {noteId, data}.
                let (payload, nested_id) = match raw.data {
                    Value::Object(mut map) if map.contains_key("data") => {
                        let nested_id = map
                            .get("noteId")
                            .and_then(Value::as_str)
                            .map(NoteId::new);
                        (map.remove("data").unwrap_or(Value::Null), nested_id)
                    }
                    other => (other, None),
                };
                if note_id.is_none() {
                    note_id = nested_id;
                }
                let draft: NoteDraft = serde_json::from_value(payload)
                    .map_err(|e| malformed("noteUpdated", &e.to_string()))?;
                ServerEvent::NoteUpdated(draft)
            }
            "collaboratorUpdated" => {
                let message = raw
                    .data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                ServerEvent::CollaboratorUpdated { message }
            }
            other => {
                log::debug!("Ignoring unknown event {other:?}");
                return Ok(None);
            }
        };

        Ok(Some(Self { event, note_id }))
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let data = match &self.event {
            ServerEvent::Typing(user) => Value::String(user.clone()),
            ServerEvent::StopTyping => Value::Null,
            ServerEvent::NoteUpdated(draft) => serde_json::to_value(draft)
                .map_err(|e| ProtocolError::Serialization(e.to_string()))?,
            ServerEvent::CollaboratorUpdated { message } => match message {
                Some(m) => serde_json::json!({ "message": m }),
                None => serde_json::json!({}),
            },
        };
        let raw = RawFrame {
            event: self.event.name().to_string(),
            data,
            note_id: self.note_id.clone(),
        };
        serde_json::to_string(&raw).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

fn malformed(event: &str, reason: &str) -> ProtocolError {
    ProtocolError::MalformedPayload {
        event: event.to_string(),
        reason: reason.to_string(),
    }
}

/// Connection URL for either channel scope: `<base>?userId=<id>`.
pub fn connection_url(base: &Url, user: &UserId) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("userId", user.as_str());
    url
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Connection closed")]
    ConnectionClosed,
}
