//! Handshake: the coordination protocol between producer and worker
//! (`spec.md` §4.1).
//!
//! One mutex `M`, one condition variable `C`, guarding the command list,
//! the worker's observable state, and the currently-open file.

use parking_lot::{Condvar, Mutex};

use crate::command_list::CommandList;
use crate::staging::StagingBuffer;

/// Worker states observable under `M` (`spec.md` §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Command list is empty, `stop == false`; the worker is waiting on `C`.
    Idle,
    /// Command list is non-empty; the worker is executing.
    Busy,
    /// `stop == true`; the worker returns at the next wakeup.
    Terminating,
}

/// An open file description that has been created but may still be
/// accumulating Write Records before its matching `close`.
pub struct OpenFile {
    pub name: String,
    pub handle: hdf5::File,
}

/// Everything the producer and worker share, guarded by one mutex.
pub struct SharedState {
    pub commands: CommandList,
    pub open: Option<OpenFile>,
    pub worker_state: WorkerState,
    pub stop: bool,
    pub staging: Box<dyn StagingBuffer>,
}

impl SharedState {
    pub fn new(staging: Box<dyn StagingBuffer>) -> Self {
        SharedState {
            commands: CommandList::new(),
            open: None,
            worker_state: WorkerState::Idle,
            stop: false,
            staging,
        }
    }
}

/// The shared handshake primitives for one `Instance`.
pub struct Handshake {
    pub mutex: Mutex<SharedState>,
    pub condvar: Condvar,
}

impl Handshake {
    pub fn new(staging: Box<dyn StagingBuffer>) -> Self {
        Handshake { mutex: Mutex::new(SharedState::new(staging)), condvar: Condvar::new() }
    }

    /// Blocks the calling (producer) thread until the worker is `Idle`,
    /// then returns the held guard so the caller can proceed to mutate
    /// `commands`/`open` while still holding `M` — the "retains `M`" half
    /// of `spec.md` §4.1's `open` transition.
    pub fn wait_idle(&self) -> parking_lot::MutexGuard<'_, SharedState> {
        let mut guard = self.mutex.lock();
        while guard.worker_state == WorkerState::Busy {
            self.condvar.wait(&mut guard);
        }
        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::DynamicBuffer;

    #[test]
    fn new_instance_starts_idle() {
        let hs = Handshake::new(Box::new(DynamicBuffer::new()));
        let guard = hs.mutex.lock();
        assert_eq!(guard.worker_state, WorkerState::Idle);
        assert!(guard.commands.is_empty());
    }

    #[test]
    fn wait_idle_returns_immediately_when_already_idle() {
        let hs = Handshake::new(Box::new(DynamicBuffer::new()));
        let guard = hs.wait_idle();
        assert_eq!(guard.worker_state, WorkerState::Idle);
    }
}
