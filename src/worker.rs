//! Worker Loop: drains the command list, materialises files through the
//! storage library, and signals progress to the producer (`spec.md` §4.3).

use std::sync::Arc;

use tracing::{debug, error};

use crate::handshake::{Handshake, WorkerState};
use crate::logging::{self, Level, Sink};
use crate::record::SourcePtr;
use crate::staging::StagingBuffer;
use crate::storage;

/// Entry point for the worker thread spawned by `Instance::init`.
///
/// Any failure returned by the storage library is fatal (`spec.md` §4.3 /
/// §7): the worker logs at error level and aborts the process, because the
/// file under construction is already partially written and the producer's
/// prior `close` has already promised a durable write that cannot be
/// retracted.
pub fn run(handshake: Arc<Handshake>, log: Arc<parking_lot::Mutex<(Sink, Level)>>) {
    loop {
        let mut guard = handshake.mutex.lock();
        while guard.commands.is_empty() && !guard.stop {
            handshake.condvar.wait(&mut guard);
        }

        if guard.stop {
            guard.worker_state = WorkerState::Terminating;
            return;
        }

        guard.worker_state = WorkerState::Busy;

        let (sink, level) = log.lock().clone();
        let dispatch = logging::build_dispatch(sink, level);

        tracing::dispatcher::with_default(&dispatch, || {
            debug!("async HDF5 worker draining write commands");

            let open = match guard.open.take() {
                Some(open) => open,
                None => {
                    error!("worker woke with records but no open file");
                    std::process::abort();
                }
            };

            while let Some(record) = guard.commands.pop_front() {
                debug!(name = %record.name, rank = record.rank, "writing dataset");
                let bytes: &[u8] = match &record.data {
                    SourcePtr::Staged { offset, len } => {
                        &guard.staging.as_slice()[*offset..*offset + *len]
                    }
                    SourcePtr::Caller { ptr, len } => {
                        // SAFETY: only reachable for records the synchronous
                        // fallback path in `Instance::close` already wrote
                        // directly; the worker never sees a `Caller`
                        // pointer for a record it executes, but the match
                        // is kept exhaustive for clarity.
                        unsafe { std::slice::from_raw_parts(*ptr, *len) }
                    }
                };

                if let Err(err) = storage::write_dataset(&open.handle, &record, bytes) {
                    error!(error = %err, name = %record.name, "storage library write failed");
                    std::process::abort();
                }
            }

            debug!("closing file");
            if let Err(err) = open.handle.close() {
                error!(error = %err, "storage library close failed");
                std::process::abort();
            }
        });

        guard.staging.reset();
        guard.worker_state = WorkerState::Idle;
        handshake.condvar.notify_all();
    }
}
