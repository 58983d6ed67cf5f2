//! HTTP transport for the lanchat web API.
//!
//! Every endpoint wraps its payload as `{ ok, data }` or
//! `{ ok: false, error }`; an `ok: false` surfaces as [`ClientError::Api`]
//! and is reported identically to a network failure. Message entries are
//! validated here so malformed rows never reach the store.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::message::{Conversation, ConversationKind, Message, MessageDto};

#[derive(Debug)]
pub enum ClientError {
    /// Network, timeout, or non-2xx HTTP failure reaching the API.
    Http(String),
    /// Well-formed response with `ok: false`.
    Api(String),
    /// Response body that could not be decoded.
    Protocol(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Http(error) => write!(f, "http error: {error}"),
            ClientError::Api(error) => write!(f, "api error: {error}"),
            ClientError::Protocol(error) => write!(f, "protocol error: {error}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Response envelope used by every lanchat endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, ClientError> {
        if !self.ok {
            return Err(ClientError::Api(
                self.error.unwrap_or_else(|| "API error".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ClientError::Protocol("ok response without data".to_string()))
    }
}

/// Result of a forward poll: the batch plus the server's watermark over it.
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    pub messages: Vec<Message>,
    /// Max revision timestamp the server saw for this scope; zero when the
    /// batch carried nothing to anchor on.
    pub max_ts: u64,
}

/// Known peer as reported by `/api/peers`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerSummary {
    pub node_id: String,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub p2p_port: u16,
    pub last_seen: u64,
    pub online: bool,
}

/// Known room as reported by `/api/rooms`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSummary {
    pub room_id: String,
    pub room_name: Option<String>,
    pub policy: Option<String>,
    pub created_at: u64,
}

/// Conversation as reported by `/api/conversations`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationSummary {
    pub conv_id: String,
    pub conv_type: String,
    pub peer_node_id: Option<String>,
    pub room_id: Option<String>,
    pub title: Option<String>,
    pub last_msg_ts: u64,
}

impl ConversationSummary {
    /// Turn a summary into an openable descriptor, if it has a usable scope.
    pub fn to_conversation(&self) -> Option<Conversation> {
        match self.conv_type.as_str() {
            "ROOM" => {
                let key = self.room_id.clone()?;
                let title = self.title.clone().unwrap_or_else(|| key.clone());
                Some(Conversation::room(key, title))
            }
            "PRIVATE" => {
                let key = self.peer_node_id.clone()?;
                let title = self.title.clone().unwrap_or_else(|| key.clone());
                Some(Conversation::private(key, title))
            }
            _ => None,
        }
    }
}

/// Fetch operations the sync engine needs. Implementations are blocking;
/// the engine never holds its state lock across a call.
pub trait Transport: Send + Sync {
    /// Backward window: messages with `ts < before_ts`, at most `limit`.
    /// Order is not assumed; the store re-sorts.
    fn list_messages(
        &self,
        conversation: &Conversation,
        before_ts: u64,
        limit: u32,
    ) -> Result<Vec<Message>, ClientError>;

    /// Forward increment: messages revised strictly after `since_ts`.
    fn poll_messages(
        &self,
        conversation: &Conversation,
        since_ts: u64,
        limit: u32,
    ) -> Result<PollBatch, ClientError>;

    fn send_message(&self, conversation: &Conversation, content: &str) -> Result<(), ClientError>;

    fn list_peers(&self) -> Result<Vec<PeerSummary>, ClientError>;

    fn list_rooms(&self) -> Result<Vec<RoomSummary>, ClientError>;

    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ClientError>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// Per-request timeout. A hung fetch surfaces as [`ClientError::Http`]
/// instead of stalling the poll loop indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// ureq-backed [`Transport`] talking to a lanchat web server.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn scope_param(conversation: &Conversation) -> String {
        match conversation.kind {
            ConversationKind::Room => format!("roomId={}", conversation.key),
            ConversationKind::Private => format!("peerNodeId={}", conversation.key),
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = match self.agent.get(&url).call() {
            Ok(r) => r,
            Err(ureq::Error::Status(code, _)) => {
                return Err(ClientError::Http(format!("server returned {code}")))
            }
            Err(err) => return Err(ClientError::Http(err.to_string())),
        };
        let envelope: ApiEnvelope<T> = response
            .into_json()
            .map_err(|e| ClientError::Protocol(format!("decode {path_and_query}: {e}")))?;
        envelope.into_data()
    }

    fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = match self.agent.post(&url).send_json(body) {
            Ok(r) => r,
            Err(ureq::Error::Status(code, _)) => {
                return Err(ClientError::Http(format!("server returned {code}")))
            }
            Err(err) => return Err(ClientError::Http(err.to_string())),
        };
        let envelope: ApiEnvelope<T> = response
            .into_json()
            .map_err(|e| ClientError::Protocol(format!("decode {path}: {e}")))?;
        envelope.into_data()
    }
}

/// Validate each wire entry, logging and skipping the ones the store could
/// not hold consistently.
fn validate_batch(dtos: Vec<MessageDto>) -> Vec<Message> {
    let mut out = Vec::with_capacity(dtos.len());
    for dto in dtos {
        match dto.validate() {
            Ok(m) => out.push(m),
            Err(reason) => crate::clog!("dropping malformed message entry: {}", reason),
        }
    }
    out
}

/// Poll payload as returned by `/api/poll`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PollDto {
    max_ts: u64,
    messages: Vec<MessageDto>,
}

impl Transport for HttpTransport {
    fn list_messages(
        &self,
        conversation: &Conversation,
        before_ts: u64,
        limit: u32,
    ) -> Result<Vec<Message>, ClientError> {
        let query = format!(
            "/api/messages?beforeTs={before_ts}&limit={limit}&{}",
            Self::scope_param(conversation)
        );
        let dtos: Vec<MessageDto> = self.get_json(&query)?;
        Ok(validate_batch(dtos))
    }

    fn poll_messages(
        &self,
        conversation: &Conversation,
        since_ts: u64,
        limit: u32,
    ) -> Result<PollBatch, ClientError> {
        let query = format!(
            "/api/poll?sinceTs={since_ts}&limit={limit}&{}",
            Self::scope_param(conversation)
        );
        let dto: PollDto = self.get_json(&query)?;
        Ok(PollBatch {
            messages: validate_batch(dto.messages),
            max_ts: dto.max_ts,
        })
    }

    fn send_message(&self, conversation: &Conversation, content: &str) -> Result<(), ClientError> {
        let (path, body) = match conversation.kind {
            ConversationKind::Room => (
                "/api/send/room",
                serde_json::json!({ "roomId": conversation.key, "content": content }),
            ),
            ConversationKind::Private => (
                "/api/send/private",
                serde_json::json!({ "peerNodeId": conversation.key, "content": content }),
            ),
        };
        let _: serde_json::Value = self.post_json(path, body)?;
        Ok(())
    }

    fn list_peers(&self) -> Result<Vec<PeerSummary>, ClientError> {
        self.get_json("/api/peers")
    }

    fn list_rooms(&self) -> Result<Vec<RoomSummary>, ClientError> {
        self.get_json("/api/rooms")
    }

    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        self.get_json("/api/conversations")
    }
}
