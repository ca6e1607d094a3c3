//! Ports - Interfaces to external collaborators.
//!
//! The relay core depends on two shared, concurrency-safe capabilities:
//! - [`PubSub`] - topic-based publish/subscribe across instances
//! - [`DistributedLock`] - keyed claims used to deduplicate deliveries

mod distributed_lock;
mod pub_sub;

pub use distributed_lock::{ClaimOutcome, DistributedLock, LockError};
pub use pub_sub::{PubSub, PubSubError, Subscription};
