//! WAL Writer
//!
//! The append path and the group-commit worker behind it.
//!
//! Callers never touch the file. Each `write` copies its payload into a
//! pooled request, queues it and blocks. The committer thread takes every
//! request that is queued, writes them back to back, appends one sync marker,
//! flushes once and only then wakes the callers.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::queue::ArrayQueue;
use tracing::{debug, error, trace};

use crate::error::{Result, WalError};

use super::handle::Wal;
use super::record::MAX_RECORD_SIZE;
use super::storage::Storage;

/// Payload buffers larger than this are not kept in the pool
const MAX_POOLED_CAPACITY: usize = 64 * 1024;

// =============================================================================
// Requests
// =============================================================================

/// An append travelling from a caller to the committer and back
#[derive(Debug)]
pub(crate) struct Request {
    data: Vec<u8>,
    result: Option<Result<u64>>,
    done: Sender<Request>,
}

impl Request {
    /// Hand the request back to its caller
    fn complete(mut self, result: Result<u64>) {
        self.result = Some(result);
        let done = self.done.clone();
        // The caller is blocked on the other end until it gets this back
        let _ = done.send(self);
    }
}

/// A reusable request together with the channel its completion arrives on
struct Slot {
    request: Request,
    done: Receiver<Request>,
}

impl Slot {
    fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self {
            request: Request {
                data: Vec::new(),
                result: None,
                done: tx,
            },
            done: rx,
        }
    }
}

/// A submitted request awaiting its commit
pub(crate) struct Pending {
    done: Receiver<Request>,
}

/// Bounded pool of request slots
pub(crate) struct RequestPool {
    slots: ArrayQueue<Slot>,
}

impl RequestPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: ArrayQueue::new(capacity.max(1)),
        }
    }

    fn acquire(&self) -> Slot {
        self.slots.pop().unwrap_or_else(Slot::new)
    }

    fn release(&self, mut slot: Slot) {
        slot.request.result = None;
        slot.request.data.clear();
        if slot.request.data.capacity() > MAX_POOLED_CAPACITY {
            slot.request.data = Vec::new();
        }
        // A full pool just drops the slot
        let _ = self.slots.push(slot);
    }
}

fn check_size(len: usize) -> Result<()> {
    if len > MAX_RECORD_SIZE {
        return Err(WalError::OversizedRecord {
            size: len,
            max: MAX_RECORD_SIZE,
        });
    }
    Ok(())
}

// =============================================================================
// Append Path
// =============================================================================

impl Wal {
    /// Durably append a record, returning the position it was written at
    ///
    /// Blocks until the batch containing the record has been flushed. An
    /// empty payload is a no-op and returns `Ok(None)`.
    ///
    /// Takes a shared hold. Do not call it from a thread that keeps a
    /// [`WalReader`](super::WalReader) open while another thread may be
    /// waiting in `truncate_*`, `backup` or `restore`: the pending exclusive
    /// hold queues this call behind it and the three threads deadlock.
    pub fn write(&self, payload: &[u8]) -> Result<Option<u64>> {
        if payload.is_empty() {
            return Ok(None);
        }
        check_size(payload.len())?;

        let _hold = self.storage.shared()?;
        let pending = self.submit(payload)?;
        self.wait(pending).map(Some)
    }

    /// Append several records, letting them share commits
    ///
    /// All payloads are queued before waiting on any of them. Results come
    /// back in input order, one per payload.
    pub fn write_batch<P: AsRef<[u8]>>(&self, payloads: &[P]) -> Result<Vec<Result<Option<u64>>>> {
        let _hold = self.storage.shared()?;

        let submitted: Vec<Result<Option<Pending>>> = payloads
            .iter()
            .map(|payload| {
                let payload = payload.as_ref();
                if payload.is_empty() {
                    return Ok(None);
                }
                check_size(payload.len())?;
                self.submit(payload).map(Some)
            })
            .collect();

        Ok(submitted
            .into_iter()
            .map(|entry| match entry {
                Ok(Some(pending)) => self.wait(pending).map(Some),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            })
            .collect())
    }

    /// Queue a payload for the committer. Caller must hold a shared hold.
    fn submit(&self, payload: &[u8]) -> Result<Pending> {
        let queue = self.queue.as_ref().ok_or(WalError::Closed)?;
        let Slot { mut request, done } = self.pool.acquire();
        request.data.extend_from_slice(payload);
        queue.send(request).map_err(|_| WalError::Closed)?;
        Ok(Pending { done })
    }

    /// Block until the committer hands the request back
    fn wait(&self, pending: Pending) -> Result<u64> {
        let mut request = pending.done.recv().map_err(|_| WalError::Closed)?;
        let result = request.result.take().unwrap_or(Err(WalError::Closed));
        self.pool.release(Slot {
            request,
            done: pending.done,
        });
        result
    }
}

// =============================================================================
// Committer
// =============================================================================

/// Single serialized writer that turns queued requests into durable batches
pub(crate) struct Committer {
    storage: Arc<Storage>,
    queue: Receiver<Request>,
    max_batch_size: usize,
}

impl Committer {
    /// Start the committer thread. It exits once every sender is dropped.
    pub(crate) fn spawn(
        storage: Arc<Storage>,
        queue: Receiver<Request>,
        max_batch_size: usize,
    ) -> io::Result<JoinHandle<()>> {
        let committer = Self {
            storage,
            queue,
            max_batch_size: max_batch_size.max(1),
        };
        thread::Builder::new()
            .name("atlaswal-committer".to_string())
            .spawn(move || committer.run())
    }

    fn run(self) {
        let mut batch = Vec::with_capacity(self.max_batch_size);

        // Block for one request, then take whatever else is already queued
        while let Ok(first) = self.queue.recv() {
            batch.push(first);
            batch.extend(self.queue.try_iter().take(self.max_batch_size - 1));
            self.commit(&mut batch);
        }

        debug!("committer stopped");
    }

    fn commit(&self, batch: &mut Vec<Request>) {
        let log = self.storage.committer_hold();
        let start = self.storage.position();
        let mut end = start;

        // A record that fails to write leaves `end` where it was, so the
        // next record overwrites its partial bytes.
        let mut results: Vec<Result<u64>> = batch
            .iter()
            .map(|request| -> Result<u64> {
                let pos = end;
                end = self.storage.write_record_at(&log, pos, &request.data)?;
                Ok(pos)
            })
            .collect();

        // Nothing in the batch is durable unless the marker and flush land.
        // The cursor stays at `start`, so the next batch overwrites it all.
        match self.storage.write_sync_marker_at(&log, end) {
            Ok(committed) => self.storage.set_position(committed),
            Err(e) => {
                error!(error = %e, batch = batch.len(), "WAL sync failed");
                for result in results.iter_mut() {
                    *result = Err(WalError::duplicate_io(&e));
                }
            }
        }
        drop(log);

        trace!(batch = batch.len(), position = self.storage.position(), "committed batch");

        for (request, result) in batch.drain(..).zip(results) {
            request.complete(result);
        }
    }
}
