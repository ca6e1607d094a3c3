//! Domain layer - events, identities and routing topics.

mod errors;
mod event;

pub use errors::ValidationError;
pub use event::{
    ConnectionId, ConnectionIdentity, Event, EventId, ProjectId, TOPIC_EVENT_REQUEST,
    TOPIC_EVENT_RESPONSE,
};
