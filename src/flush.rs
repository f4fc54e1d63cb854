//! Flush Pipeline
//!
//! A bounded queue feeding one background thread that turns detached
//! memtables into segments.
//!
//! ```text
//!   Engine::set ──(bounded queue)──► flush worker ──► SegmentManager::flush
//!                                         │
//!                                         └──► discard sealed WAL
//! ```
//!
//! Jobs are processed strictly in submission order, so segment ids follow
//! the order memtables were filled. After the first failure the worker
//! stops writing segments: later memtables stay sealed (in memory and in
//! their WAL files) so that recovery can replay them in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{KvError, Result};
use crate::memtable::MemTable;
use crate::storage::SegmentManager;
use crate::wal::WalWriter;

/// A detached memtable and the log that made it durable
pub(crate) struct FlushJob {
    pub generation: u64,
    pub memtable: Arc<MemTable>,
    pub wal: WalWriter,
}

enum FlushMsg {
    Flush(FlushJob),
    /// Acknowledged once every earlier job is done
    Barrier(Sender<()>),
}

/// Handle to the background flush thread
pub(crate) struct FlushWorker {
    tx: Option<Sender<FlushMsg>>,
    handle: Option<JoinHandle<()>>,
    errors: Receiver<KvError>,
    poisoned: Arc<AtomicBool>,
}

impl FlushWorker {
    /// Start the worker thread.
    ///
    /// `on_flushed` runs after a memtable's segment is registered and its
    /// WAL discarded.
    pub fn spawn<F>(segments: Arc<SegmentManager>, capacity: usize, on_flushed: F) -> Result<Self>
    where
        F: Fn(&Arc<MemTable>) + Send + 'static,
    {
        let (tx, rx) = channel::bounded(capacity);
        let (err_tx, err_rx) = channel::unbounded();
        let poisoned = Arc::new(AtomicBool::new(false));

        let worker_poisoned = Arc::clone(&poisoned);
        let handle = thread::Builder::new()
            .name("sparsekv-flush".to_string())
            .spawn(move || run(rx, err_tx, worker_poisoned, segments, on_flushed))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            errors: err_rx,
            poisoned,
        })
    }

    /// Queue a job, blocking while the queue is full
    pub fn submit(&self, job: FlushJob) -> Result<()> {
        self.sender()?
            .send(FlushMsg::Flush(job))
            .map_err(|_| stopped())
    }

    /// Block until every job submitted so far has been processed
    pub fn wait_idle(&self) -> Result<()> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.sender()?
            .send(FlushMsg::Barrier(ack_tx))
            .map_err(|_| stopped())?;
        ack_rx.recv().map_err(|_| stopped())
    }

    /// Drain the errors reported since the last call
    pub fn take_errors(&self) -> Vec<KvError> {
        self.errors.try_iter().collect()
    }

    /// Whether a flush has failed (later jobs are being held back)
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs, let queued ones finish, join the thread
    pub fn shutdown(&mut self) -> Result<()> {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| KvError::FlushPipeline("flush worker panicked".to_string()))?;
        }
        Ok(())
    }

    fn sender(&self) -> Result<&Sender<FlushMsg>> {
        self.tx.as_ref().ok_or_else(stopped)
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "Flush worker did not shut down cleanly");
        }
    }
}

fn stopped() -> KvError {
    KvError::FlushPipeline("flush worker has stopped".to_string())
}

fn run<F>(
    rx: Receiver<FlushMsg>,
    errors: Sender<KvError>,
    poisoned: Arc<AtomicBool>,
    segments: Arc<SegmentManager>,
    on_flushed: F,
) where
    F: Fn(&Arc<MemTable>),
{
    tracing::debug!("Flush worker started");

    for msg in rx {
        match msg {
            FlushMsg::Barrier(ack) => {
                let _ = ack.send(());
            }
            FlushMsg::Flush(job) if poisoned.load(Ordering::SeqCst) => {
                tracing::warn!(
                    generation = job.generation,
                    "Holding back flush after an earlier failure; WAL kept for recovery"
                );
            }
            FlushMsg::Flush(job) => {
                let generation = job.generation;
                if let Err(e) = flush_job(&segments, &on_flushed, job) {
                    tracing::error!(generation, error = %e, "Memtable flush failed");
                    poisoned.store(true, Ordering::SeqCst);
                    let _ = errors.send(e);
                }
            }
        }
    }

    tracing::debug!("Flush worker stopped");
}

fn flush_job<F>(segments: &SegmentManager, on_flushed: &F, job: FlushJob) -> Result<()>
where
    F: Fn(&Arc<MemTable>),
{
    let FlushJob {
        generation,
        memtable,
        wal,
    } = job;

    let segment = segments.flush(memtable.iter())?;
    wal.discard()?;
    on_flushed(&memtable);

    tracing::debug!(generation, segment, keys = memtable.len(), "Retired memtable");
    Ok(())
}
