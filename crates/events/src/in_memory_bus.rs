//! Single-process mutation bus.

use std::sync::{Mutex, mpsc};

use crate::PermissionMutation;
use crate::bus::{BusError, MutationBus, MutationFeed};

/// Broadcasts each mutation to every live feed; feeds whose consumer went
/// away are dropped on the next publish.
#[derive(Debug, Default)]
pub struct InMemoryMutationBus {
    feeds: Mutex<Vec<mpsc::Sender<PermissionMutation>>>,
}

impl InMemoryMutationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of feeds still attached as of the last publish.
    pub fn consumers(&self) -> usize {
        self.feeds.lock().map(|feeds| feeds.len()).unwrap_or(0)
    }
}

impl MutationBus for InMemoryMutationBus {
    fn publish(&self, mutation: PermissionMutation) -> Result<usize, BusError> {
        let mut feeds = self.feeds.lock().map_err(|_| BusError::Poisoned)?;
        feeds.retain(|tx| tx.send(mutation.clone()).is_ok());

        match feeds.len() {
            0 => Err(BusError::NoConsumers),
            delivered => Ok(delivered),
        }
    }

    fn subscribe(&self) -> MutationFeed {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut feeds) = self.feeds.lock() {
            feeds.push(tx);
        }
        MutationFeed::new(rx)
    }
}
