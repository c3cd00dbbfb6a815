//! Façade: the producer-facing operations (`spec.md` §4.2).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::MutexGuard;
use tracing::debug;

use crate::command_list::CommandList;
use crate::config::{Config, StagingStrategyKind};
use crate::error::{Ah5Error, Result};
use crate::handshake::{Handshake, OpenFile, SharedState};
use crate::logging::{Level, Sink};
use crate::record::{SourcePtr, TypeId, WriteRecord};
use crate::slice_copy::{copy_slice, SliceCopyParams};
use crate::staging::{DynamicBuffer, FixedBuffer, MappedFileBuffer, StagingBuffer};
use crate::worker;

/// The unit of ownership (`spec.md` §3): one producer-facing façade, one
/// worker thread, one handshake.
pub struct Instance {
    // SAFETY: transmuted from `MutexGuard<'_, SharedState>` borrowed from
    // `handshake.mutex` below. `open_guard` is declared, and therefore
    // dropped, before `handshake` (Rust drops struct fields in declaration
    // order), so this guard is always released before the `Arc<Handshake>`
    // it borrows from could be dropped by this `Instance`'s own `Drop` —
    // and even then the worker thread holds its own independent clone of
    // that `Arc`, so the pointee outlives both. No other code path reaches
    // into `handshake.mutex` while `open_guard` is held other than the
    // worker thread, which only locks `M` itself (blocking, not racing
    // unsoundly) — this is exactly the "open..write*..close holds M"
    // contract of `spec.md` §4.1, expressed without a borrow that outlives
    // a single method call.
    open_guard: Option<MutexGuard<'static, SharedState>>,
    handshake: Arc<Handshake>,
    log: Arc<parking_lot::Mutex<(Sink, Level)>>,
    worker: Option<std::thread::JoinHandle<()>>,
    config: Config,
}

impl Instance {
    fn spawn(staging: Box<dyn StagingBuffer>, config: Config) -> Result<Self> {
        let handshake = Arc::new(Handshake::new(staging));
        let log = Arc::new(parking_lot::Mutex::new((Sink::default(), config.verbosity)));

        let worker_handshake = handshake.clone();
        let worker_log = log.clone();
        let worker = std::thread::Builder::new()
            .name("ah5rs-writer".into())
            .spawn(move || worker::run(worker_handshake, worker_log))
            .map_err(|e| Ah5Error::Internal { reason: e.to_string() })?;

        Ok(Instance {
            handshake,
            open_guard: None,
            log,
            worker: Some(worker),
            config,
        })
    }

    /// `init()`: dynamic-memory staging, default configuration
    /// (`spec.md` §6.1).
    pub fn init() -> Result<Self> {
        Self::spawn(Box::new(DynamicBuffer::new()), Config::default())
    }

    /// `init_mem(buf, cap)`: fixed-memory staging, growable if `cap == 0`
    /// is expressed here as `None` for "start empty, dynamic within this
    /// strategy" — per `spec.md` §6.1 this crate models it as a true fixed
    /// capacity sized at construction, with `close` falling back to
    /// synchronous writes on overflow.
    pub fn init_mem(region: Option<Box<[u8]>>, capacity: usize) -> Result<Self> {
        let staging: Box<dyn StagingBuffer> = match region {
            Some(region) => Box::new(FixedBuffer::from_caller_region(region)),
            None => Box::new(FixedBuffer::with_capacity(capacity)),
        };
        let mut config = Config::default();
        config.staging = StagingStrategyKind::FixedMemory { capacity };
        Self::spawn(staging, config)
    }

    /// `init_file(dir, cap)`: mapped-file staging (`spec.md` §6.1).
    pub fn init_file(dir: &Path, capacity: Option<usize>) -> Result<Self> {
        let staging = MappedFileBuffer::create_in(dir, 4096, capacity)
            .map_err(|source| Ah5Error::StagingOverflow { requested: 4096, capacity: 0, source })?;
        let mut config = Config::default();
        config.staging = StagingStrategyKind::MappedFile { directory: dir.to_path_buf(), capacity };
        Self::spawn(Box::new(staging), config)
    }

    pub fn set_log_level(&mut self, level: Level) {
        self.config.verbosity = level;
        self.log.lock().1 = level;
    }

    pub fn set_log_file(&mut self, path: &Path) -> Result<()> {
        let sink = Sink::open_file(path).map_err(|source| Ah5Error::StagingOverflow {
            requested: 0,
            capacity: 0,
            source,
        })?;
        self.log.lock().0 = sink;
        Ok(())
    }

    pub fn set_log_stream(&mut self, stream: Box<dyn std::io::Write + Send>, keep_open: bool) {
        self.log.lock().0 = Sink::from_stream(stream, keep_open);
    }

    /// # Safety
    /// See `Sink::from_fd`.
    pub unsafe fn set_log_fd(&mut self, fd: std::os::fd::RawFd, keep_open: bool) {
        self.log.lock().0 = Sink::from_fd(fd, keep_open);
    }

    pub fn set_parallel_copy(&mut self, enabled: bool) {
        self.config.parallel_copy = enabled;
    }

    /// `open(name)` (`spec.md` §4.2): blocks until the worker is `Idle`,
    /// asks the storage library to create/truncate the file, and retains
    /// `M` for the matching `write`/`close` calls.
    pub fn open(&mut self, name: &str) -> Result<()> {
        if self.open_guard.is_some() {
            return Err(Ah5Error::OpenAlreadyActive);
        }

        let guard = self.handshake.wait_idle();
        // SAFETY: see the `open_guard` field comment.
        let mut guard: MutexGuard<'static, SharedState> = unsafe { std::mem::transmute(guard) };

        let path = PathBuf::from(name);
        let handle = crate::storage::create_file(&path)?;
        guard.open = Some(OpenFile { name: name.to_owned(), handle });
        guard.commands = CommandList::new();

        self.open_guard = Some(guard);
        Ok(())
    }

    /// `write(...)` (`spec.md` §4.2): appends a Write Record; does not copy
    /// bulk data yet.
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &mut self,
        ptr: *const u8,
        name: &str,
        type_id: TypeId,
        rank: usize,
        dims: &[usize],
        lbounds: &[usize],
        ubounds: &[usize],
    ) -> Result<()> {
        let guard = self.open_guard.as_mut().ok_or(Ah5Error::NoOpenFile)?;
        let record = WriteRecord::new(
            ptr,
            name,
            type_id,
            rank,
            dims,
            lbounds,
            ubounds,
            self.config.scalar_as_array,
        )?;
        guard.commands.push(record);
        Ok(())
    }

    /// `close()` (`spec.md` §4.2): either stages every record's bytes for
    /// the worker to drain asynchronously, or — when the staging buffer
    /// cannot hold the whole cycle — writes every record of the cycle
    /// synchronously here, in FIFO order. A cycle never mixes the two: a
    /// synchronous write lands on disk inside this call, before the worker
    /// even wakes, while a staged write only lands after this call returns
    /// and releases `M`; staging part of a cycle and falling back the rest
    /// would reorder datasets relative to `write` call order (`spec.md`
    /// §5, Testable Property #1).
    pub fn close(&mut self) -> Result<()> {
        let mut guard = self.open_guard.take().ok_or(Ah5Error::NoOpenFile)?;

        let total: usize = guard.commands.iter_mut().map(|r| r.required_bytes()).sum();
        let grant = guard.staging.ensure_capacity(total).unwrap_or(0);
        let parallel = self.config.parallel_copy;

        let result = if grant >= total {
            let SharedState { commands, staging, .. } = &mut *guard;
            for record in commands.iter_mut() {
                let needed = record.required_bytes();
                let offset = staging.reserve(needed);
                stage_one(record, staging.as_mut_slice(), offset, parallel);
            }
            Ok(())
        } else {
            write_cycle_synchronously(&mut guard)
        };

        // Whatever happened above, `guard.commands` has either been fully
        // staged or fully drained by `write_cycle_synchronously` (which
        // clears it even on a mid-cycle error, per `spec.md` §7: a
        // producer-side error must still leave the instance usable rather
        // than leaving stale records for a later `open` to silently
        // discard). The worker either has new staged work or nothing to
        // do; notifying is harmless either way.
        self.handshake.condvar.notify_all();
        drop(guard);
        result
    }

    /// `finalize()` (`spec.md` §4.2): waits for idle, stops the worker,
    /// joins it.
    pub fn finalize(mut self) -> Result<()> {
        self.finalize_inner()
    }

    fn finalize_inner(&mut self) -> Result<()> {
        if self.open_guard.is_some() {
            return Err(Ah5Error::OpenAlreadyActive);
        }
        {
            let mut guard = self.handshake.wait_idle();
            guard.stop = true;
        }
        self.handshake.condvar.notify_all();
        if let Some(handle) = self.worker.take() {
            handle
                .join()
                .map_err(|_| Ah5Error::Internal { reason: "worker thread panicked".into() })?;
        }
        let (sink, _level) = &*self.log.lock();
        debug!(owned = sink.is_owned(), "instance finalized");
        Ok(())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.finalize_inner();
        }
    }
}

/// Writes every remaining record of the cycle directly against the still-
/// open file, in FIFO order, bypassing the staging buffer entirely
/// (`spec.md` §4.2's synchronous fallback, taken for the whole cycle —
/// see `Instance::close`). Drains `commands` down to empty even when a
/// write fails partway through, so the instance stays usable afterwards
/// instead of silently losing the remainder at the next `open`
/// (`spec.md` §7).
fn write_cycle_synchronously(guard: &mut SharedState) -> Result<()> {
    let mut outcome = Ok(());
    while let Some(record) = guard.commands.pop_front() {
        if outcome.is_err() {
            continue;
        }
        outcome = match guard.open.as_ref() {
            Some(open) => write_one_synchronously(&open.handle, &record),
            None => Err(Ah5Error::NoOpenFile),
        };
    }
    outcome
}

/// Copies one record's bytes into the staging buffer at `offset` and
/// rewrites the record to point there, normalised to a dense block
/// (`spec.md` §3 / §4.2).
fn stage_one(record: &mut WriteRecord, dst_all: &mut [u8], offset: usize, parallel: bool) {
    let len = record.required_bytes();
    let elem_size = record.type_id.byte_size();

    match record.data {
        SourcePtr::Caller { ptr, .. } => {
            let src = unsafe { std::slice::from_raw_parts(ptr, elem_size_total(record)) };
            let dst = &mut dst_all[offset..offset + len];
            if record.rank == 0 {
                dst.copy_from_slice(&src[..elem_size]);
            } else {
                copy_slice(
                    SliceCopyParams {
                        src,
                        dst,
                        elem_size,
                        dims: &record.dims,
                        lbounds: &record.lbounds,
                        ubounds: &record.ubounds,
                    },
                    parallel,
                );
            }
        }
        SourcePtr::Staged { .. } => {
            // Already staged by a prior cycle; nothing to do.
        }
    }

    record.restage(offset);
}

fn elem_size_total(record: &WriteRecord) -> usize {
    let full_elems: usize = if record.rank == 0 {
        1
    } else {
        record.dims.iter().product()
    };
    full_elems * record.type_id.byte_size()
}

fn write_one_synchronously(file: &hdf5::File, record: &WriteRecord) -> Result<()> {
    // `close` only selects records for synchronous fallback before they've
    // been staged, so `data` is always `Caller` here; snapshot it into a
    // small owned buffer (normalised to the dense shape) and write it
    // directly against the still-open file handle, per `spec.md` §4.2's
    // synchronous fallback.
    let SourcePtr::Caller { ptr, .. } = record.data else {
        return Err(Ah5Error::Internal {
            reason: "synchronous fallback selected an already-staged record".into(),
        });
    };

    let len = record.required_bytes();
    let elem_size = record.type_id.byte_size();
    let mut dense = vec![0u8; len];
    let src = unsafe { std::slice::from_raw_parts(ptr, elem_size_total(record)) };
    if record.rank == 0 {
        dense.copy_from_slice(&src[..elem_size]);
    } else {
        copy_slice(
            SliceCopyParams {
                src,
                dst: &mut dense,
                elem_size,
                dims: &record.dims,
                lbounds: &record.lbounds,
                ubounds: &record.ubounds,
            },
            false,
        );
    }

    let dense_record = WriteRecord {
        data: SourcePtr::Staged { offset: 0, len },
        rank: record.rank,
        dims: record.dense_shape(),
        lbounds: vec![0; record.rank],
        ubounds: record.dense_shape(),
        type_id: record.type_id.clone(),
        name: record.name.clone(),
    };

    crate::storage::write_dataset(file, &dense_record, &dense)
}
