//! Delivery of committed permission mutations to cache consumers.
//!
//! Every feed receives every mutation published after it subscribed. Nothing
//! is persisted: the role/grant store is the source of truth, and a mutation
//! published with no consumer attached is reported back to the publisher
//! because no cache entry would ever be refreshed for it.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use thiserror::Error;

use crate::PermissionMutation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("no mutation consumer is subscribed")]
    NoConsumers,

    #[error("mutation bus lock poisoned")]
    Poisoned,
}

/// Result of waiting on a [`MutationFeed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Mutation(PermissionMutation),
    /// Nothing arrived within the wait.
    Idle,
    /// The bus is gone; no further mutations will arrive.
    Closed,
}

/// One consumer's view of the bus. Meant to be drained by a single thread.
#[derive(Debug)]
pub struct MutationFeed {
    receiver: Receiver<PermissionMutation>,
}

impl MutationFeed {
    pub fn new(receiver: Receiver<PermissionMutation>) -> Self {
        Self { receiver }
    }

    /// Wait up to `wait` for the next mutation.
    pub fn next(&self, wait: Duration) -> FeedItem {
        match self.receiver.recv_timeout(wait) {
            Ok(mutation) => FeedItem::Mutation(mutation),
            Err(RecvTimeoutError::Timeout) => FeedItem::Idle,
            Err(RecvTimeoutError::Disconnected) => FeedItem::Closed,
        }
    }
}

/// Carries mutations from whatever commits them to the cache invalidation
/// machinery.
///
/// ```text
/// role/grant store (commit) → MutationBus → MutationWorker → InvalidationOrchestrator
/// ```
///
/// The mutation is already committed when `publish` fails, so publishing it
/// again is safe.
pub trait MutationBus: Send + Sync {
    /// Returns how many consumers received the mutation (at least one).
    fn publish(&self, mutation: PermissionMutation) -> Result<usize, BusError>;

    fn subscribe(&self) -> MutationFeed;
}
