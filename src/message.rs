//! Message and conversation value types, plus validation of the wire shapes
//! the lanchat API returns.
//!
//! The API is loosely typed JSON; everything that crosses the transport
//! boundary is coerced into these types up front so the store never holds a
//! partial object. Entries without a usable `msgId` or with an unknown
//! `direction` are rejected at decode time.

use serde::Deserialize;

/// Whether a message was received or sent by the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Delivery state of an outbound message. Meaningless for inbound rows and
/// absent on the wire for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Failed => "FAILED",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "SENT" => Some(DeliveryStatus::Sent),
            "DELIVERED" => Some(DeliveryStatus::Delivered),
            "FAILED" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// One chat entry. `ts` and `updated_at` are milliseconds since epoch;
/// zero means the wire omitted the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_id: String,
    pub ts: u64,
    pub updated_at: u64,
    pub direction: Direction,
    pub status: Option<DeliveryStatus>,
    pub content: String,
    pub from_node_id: Option<String>,
    pub from_name: Option<String>,
}

impl Message {
    /// The newest point this message represents for forward polling:
    /// its revision timestamp when it has one, otherwise its origin
    /// timestamp.
    pub fn watermark(&self) -> u64 {
        if self.updated_at > 0 {
            self.updated_at
        } else {
            self.ts
        }
    }
}

/// Which conversation a timeline belongs to. Identity is `(kind, key)`;
/// the title is display-only and excluded from equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Room,
    Private,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub kind: ConversationKind,
    /// Room ID for rooms, peer node ID for private chats.
    pub key: String,
    pub title: String,
}

impl Conversation {
    pub fn room(room_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: ConversationKind::Room,
            key: room_id.into(),
            title: title.into(),
        }
    }

    pub fn private(peer_node_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: ConversationKind::Private,
            key: peer_node_id.into(),
            title: title.into(),
        }
    }
}

impl PartialEq for Conversation {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.key == other.key
    }
}

impl Eq for Conversation {}

/// Raw message shape as returned by `/api/messages` and `/api/poll`.
///
/// All fields are optional so a malformed entry deserializes rather than
/// failing the whole batch; [`MessageDto::validate`] decides per entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageDto {
    pub msg_id: Option<String>,
    pub ts: Option<u64>,
    pub updated_at: Option<u64>,
    pub direction: Option<String>,
    pub status: Option<String>,
    pub content: Option<String>,
    pub from_node_id: Option<String>,
    pub from_name: Option<String>,
}

/// Why a wire entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireReject {
    MissingId,
    BadDirection(String),
}

impl std::fmt::Display for WireReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireReject::MissingId => write!(f, "missing msgId"),
            WireReject::BadDirection(d) => write!(f, "unknown direction {d:?}"),
        }
    }
}

impl MessageDto {
    /// Coerce a wire entry into a [`Message`], rejecting entries the store
    /// could not hold consistently. Unknown status strings are dropped to
    /// `None` rather than rejecting the whole entry; a missing timestamp
    /// coerces to zero and sorts first.
    pub fn validate(self) -> Result<Message, WireReject> {
        let msg_id = match self.msg_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(WireReject::MissingId),
        };
        let direction = match self.direction.as_deref() {
            Some("IN") => Direction::Inbound,
            Some("OUT") => Direction::Outbound,
            other => {
                return Err(WireReject::BadDirection(
                    other.unwrap_or_default().to_string(),
                ))
            }
        };
        let status = match direction {
            // Status only makes sense for outbound rows.
            Direction::Outbound => self.status.as_deref().and_then(DeliveryStatus::parse),
            Direction::Inbound => None,
        };
        Ok(Message {
            msg_id,
            ts: self.ts.unwrap_or(0),
            updated_at: self.updated_at.unwrap_or(0),
            direction,
            status,
            content: self.content.unwrap_or_default(),
            from_node_id: self.from_node_id.filter(|s| !s.is_empty()),
            from_name: self.from_name.filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(msg_id: &str, direction: &str) -> MessageDto {
        MessageDto {
            msg_id: Some(msg_id.to_string()),
            direction: Some(direction.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn validate_accepts_minimal_inbound() {
        let m = dto("m1", "IN").validate().expect("valid");
        assert_eq!(m.msg_id, "m1");
        assert_eq!(m.direction, Direction::Inbound);
        assert_eq!(m.ts, 0);
        assert_eq!(m.status, None);
    }

    #[test]
    fn validate_rejects_missing_or_empty_id() {
        let mut d = dto("", "IN");
        assert_eq!(d.clone().validate().unwrap_err(), WireReject::MissingId);
        d.msg_id = None;
        assert_eq!(d.validate().unwrap_err(), WireReject::MissingId);
    }

    #[test]
    fn validate_rejects_unknown_direction() {
        let err = dto("m1", "SIDEWAYS").validate().unwrap_err();
        assert_eq!(err, WireReject::BadDirection("SIDEWAYS".to_string()));
    }

    #[test]
    fn status_is_dropped_for_inbound_and_parsed_for_outbound() {
        let mut d = dto("m1", "IN");
        d.status = Some("DELIVERED".to_string());
        assert_eq!(d.clone().validate().unwrap().status, None);

        d.direction = Some("OUT".to_string());
        assert_eq!(
            d.clone().validate().unwrap().status,
            Some(DeliveryStatus::Delivered)
        );

        d.status = Some("SOMETHING_NEW".to_string());
        assert_eq!(d.validate().unwrap().status, None);
    }

    #[test]
    fn watermark_prefers_revision_timestamp() {
        let mut d = dto("m1", "OUT");
        d.ts = Some(100);
        assert_eq!(d.clone().validate().unwrap().watermark(), 100);
        d.updated_at = Some(250);
        assert_eq!(d.validate().unwrap().watermark(), 250);
    }

    #[test]
    fn conversation_identity_ignores_title() {
        let a = Conversation::room("r1", "General");
        let b = Conversation::room("r1", "Renamed");
        let c = Conversation::private("r1", "General");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
