use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use authgate_events::{Event, FeedItem, MutationBus, MutationFeed};

use crate::orchestrator::InvalidationOrchestrator;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Feeds permission mutations from a bus into the invalidation orchestrator.
///
/// - Subscribes to the bus before returning, so nothing published after
///   `spawn` is missed
/// - Drives each refresh to completion on the given runtime
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct MutationWorker;

impl MutationWorker {
    /// Spawn a worker thread that applies every mutation received on `bus`.
    ///
    /// `runtime` must outlive the worker; the thread blocks on it for each
    /// mutation and must not itself be a runtime worker thread.
    pub fn spawn(
        name: &'static str,
        bus: &dyn MutationBus,
        orchestrator: Arc<InvalidationOrchestrator>,
        runtime: Handle,
    ) -> io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let feed = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, feed, shutdown_rx, &orchestrator, &runtime))?;

        info!(worker = name, "mutation worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop(
    name: &'static str,
    feed: MutationFeed,
    shutdown_rx: mpsc::Receiver<()>,
    orchestrator: &InvalidationOrchestrator,
    runtime: &Handle,
) {
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match feed.next(tick) {
            FeedItem::Mutation(mutation) => {
                let report = runtime.block_on(orchestrator.handle(&mutation));
                if report.is_complete() {
                    debug!(
                        worker = name,
                        event = mutation.event_type(),
                        refreshed = report.refreshed.len(),
                        "mutation applied"
                    );
                } else {
                    warn!(
                        worker = name,
                        event = mutation.event_type(),
                        failed = report.failed.len(),
                        enumeration_failed = report.enumeration_failed,
                        "mutation only partially applied"
                    );
                }
            }
            FeedItem::Idle => continue,
            FeedItem::Closed => break,
        }
    }

    info!(worker = name, "mutation worker stopped");
}
