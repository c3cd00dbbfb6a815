//! Asynchronous, worker-threaded writer for the HDF5 hierarchical file
//! format. See `spec.md` / `SPEC_FULL.md` for the full design; in short:
//!
//! - the producer's thread describes a file as a sequence of named, typed,
//!   N-dimensional array writes ([`Instance::open`], [`Instance::write`],
//!   [`Instance::close`]);
//! - a background [`worker`] thread drains the accumulated commands and
//!   performs the actual HDF5 I/O;
//! - a [`staging`] buffer snapshots the producer's live arrays at `close`
//!   time so the producer can resume mutating them immediately.

pub mod command_list;
pub mod config;
pub mod error;
pub mod handshake;
mod instance;
pub mod logging;
pub mod record;
pub mod slice_copy;
pub mod staging;
mod storage;
mod worker;

pub use config::{Config, StagingStrategyKind};
pub use error::{Ah5Error, Result};
pub use instance::Instance;
pub use logging::{Level, Sink};
pub use record::{TypeId, MAX_RANK};
pub use slice_copy::MAX_COPY_THREADS;

/// `spec.md` §6.3.
pub const DEFAULT_VERBOSITY: Level = Level::Warning;
pub const DEFAULT_PARALLEL_COPY: bool = true;
pub const DEFAULT_SCALAR_AS_ARRAY: bool = true;
