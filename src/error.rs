//! Error kinds returned by the public façade (`spec.md` §7).

use snafu::Snafu;

/// The five error kinds named by the specification, plus the context each
/// one needs to produce an actionable message.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Ah5Error {
    #[snafu(display("rank {rank} exceeds MAX_RANK ({max_rank})"))]
    RankTooLarge { rank: usize, max_rank: usize },

    #[snafu(display(
        "dimension {dim}: lbound {lbound} exceeds ubound {ubound}"
    ))]
    BoundsOutOfOrder { dim: usize, lbound: usize, ubound: usize },

    #[snafu(display(
        "dimension {dim}: ubound {ubound} exceeds extent {extent}"
    ))]
    BoundsExceedExtent { dim: usize, ubound: usize, extent: usize },

    #[snafu(display("write record name must not be empty"))]
    EmptyName,

    #[snafu(display("`open` called while a prior file is still unmatched by `close`"))]
    OpenAlreadyActive,

    #[snafu(display("`write` called without a matching `open`"))]
    NoOpenFile,

    #[snafu(display("instance has already been finalized"))]
    InstanceFinalized,

    #[snafu(display("allocation of {requested} bytes failed"))]
    OutOfMemory { requested: usize },

    #[snafu(display(
        "staging buffer cannot hold {requested} bytes (capacity {capacity}) and synchronous fallback failed: {source}"
    ))]
    StagingOverflow {
        requested: usize,
        capacity: usize,
        source: std::io::Error,
    },

    #[snafu(display("storage library operation failed: {source}"))]
    StorageFailure { source: hdf5::Error },

    #[snafu(display("synchronization primitive failure: {reason}"))]
    Internal { reason: String },
}

pub type Result<T> = std::result::Result<T, Ah5Error>;

/// Numeric convention of `spec.md` §6.1: `0` is success, each error kind maps
/// to a distinct non-zero code. Exists for callers that want the C-like
/// integer-return contract (e.g. an eventual `extern "C"` shim).
impl From<&Ah5Error> for i32 {
    fn from(err: &Ah5Error) -> i32 {
        match err {
            Ah5Error::RankTooLarge { .. }
            | Ah5Error::BoundsOutOfOrder { .. }
            | Ah5Error::BoundsExceedExtent { .. }
            | Ah5Error::EmptyName
            | Ah5Error::OpenAlreadyActive
            | Ah5Error::NoOpenFile
            | Ah5Error::InstanceFinalized => 1, // INVALID_ARGUMENT
            Ah5Error::OutOfMemory { .. } => 2,
            Ah5Error::StagingOverflow { .. } => 3,
            Ah5Error::StorageFailure { .. } => 4,
            Ah5Error::Internal { .. } => 5,
        }
    }
}

impl From<Ah5Error> for i32 {
    fn from(err: Ah5Error) -> i32 {
        i32::from(&err)
    }
}
