//! RPC dispatcher (C7): generalizes `rt_msg_dispatcher.cpp`'s
//! pipe-wakes-loop idiom. A single task drains a queue of boxed futures in
//! order, awaiting each to completion before starting the next, so every
//! callback posted onto a given [`Dispatcher`] — whether it's an inbound
//! RPC call or an [`ttsd_coordinator`]-style event delivery — runs on the
//! same task and never interleaves with another. Both the Event Source and
//! the Session rely on that ordering guarantee (spec.md §4.7).

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::trace;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Owns an mpsc queue of boxed futures and a task that awaits each one, in
/// order, as it arrives. Dropping every clone of the returned handle lets
/// the task exit once the queue drains.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Spawn the loop task and return a handle to post work onto it.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                trace!("dispatcher running queued item");
                job.await;
            }
        });
        Self { tx }
    }

    /// Post an async job to run on the dispatcher's task, in submission
    /// order relative to every other job posted here. Never blocks the
    /// caller; silently dropped if the loop has already exited (mirrors
    /// the engine's "destroyed while you were writing to the pipe" case).
    pub fn post<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.tx.send(Box::pin(job));
    }

    /// Post a plain synchronous closure, for callers with no `.await` of
    /// their own.
    pub fn post_sync(&self, job: impl FnOnce() + Send + 'static) {
        self.post(async move { job() });
    }
}
