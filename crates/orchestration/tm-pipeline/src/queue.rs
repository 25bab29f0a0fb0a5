//! Bounded work distribution for the worker pools.
//!
//! Many producers share a `WorkQueue`; each consumer drains its own bounded
//! channel. Sends block when the chosen channel is full, which is the
//! backpressure primitive: with total capacity `k`, at most `k` undelivered
//! items are ever in flight. Dropping every handle of the queue closes the
//! channels, signalling end-of-input; consumers drain what remains and exit.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

/// Round-robin fan-out over per-worker bounded channels.
pub struct WorkQueue<T> {
    senders: Vec<mpsc::Sender<T>>,
    next_worker: AtomicUsize,
}

impl<T: Send> WorkQueue<T> {
    /// Create a queue feeding `workers` consumers with `capacity` total
    /// buffered items, split evenly across the per-worker channels.
    pub fn new(workers: usize, capacity: usize) -> (Self, Vec<mpsc::Receiver<T>>) {
        let workers = workers.max(1);
        let per_worker = (capacity / workers).max(1);

        let mut senders = Vec::with_capacity(workers);
        let mut receivers = Vec::with_capacity(workers);

        for _ in 0..workers {
            let (tx, rx) = mpsc::channel(per_worker);
            senders.push(tx);
            receivers.push(rx);
        }

        (
            Self {
                senders,
                next_worker: AtomicUsize::new(0),
            },
            receivers,
        )
    }

    /// Send an item to the next worker, blocking while its channel is full.
    ///
    /// Returns `Err(item)` when the receiving side is gone.
    pub async fn send(&self, item: T) -> Result<(), T> {
        let idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        self.senders[idx].send(item).await.map_err(|e| e.0)
    }

    /// Number of consumers fed by this queue.
    pub fn num_workers(&self) -> usize {
        self.senders.len()
    }
}
