//! Event and connection identity value objects.
//!
//! An [`Event`] is the unit routed between HTTP submitters, the bus and
//! browser WebSocket connections. Its `id` is the only key used to match a
//! reply to the request that caused it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ValidationError;

/// Topic carrying HTTP submissions and cross-instance routing requests.
pub const TOPIC_EVENT_REQUEST: &str = "event:request";

/// Topic carrying socket-originated replies.
pub const TOPIC_EVENT_RESPONSE: &str = "event:response";

/// Correlation identifier of an event.
///
/// Server-assigned on HTTP submissions, echoed back by clients on replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier (e.g. one echoed by a client).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_identity {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Parses a non-empty identifier.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_identity!(
    /// Routing key of a logical tenant / session group.
    ProjectId,
    "project_id"
);

string_identity!(
    /// Client-supplied identifier of one socket within a project.
    ConnectionId,
    "connection_id"
);

/// `(project_id, connection_id)` pair identifying one live WebSocket session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    pub project_id: ProjectId,
    pub connection_id: ConnectionId,
}

impl ConnectionIdentity {
    pub fn new(project_id: ProjectId, connection_id: ConnectionId) -> Self {
        Self {
            project_id,
            connection_id,
        }
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.connection_id)
    }
}

/// The routed unit of information.
///
/// Every field is optional on the wire so that partially-formed replies
/// from browsers still deserialize; a reply without an `id` simply never
/// matches a pending request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: EventId,

    #[serde(default)]
    pub project_id: ProjectId,

    #[serde(rename = "type", default)]
    pub event_type: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

impl Event {
    /// Creates an event with a freshly assigned id.
    pub fn new(project_id: ProjectId, event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            project_id,
            event_type: event_type.into(),
            data,
        }
    }
}
