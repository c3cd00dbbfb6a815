//! Write Record: one pending write operation (`spec.md` §3).

use crate::error::{Ah5Error, Result};

/// `spec.md` §3 / §6.3: the largest number of dimensions a record may carry.
pub const MAX_RANK: usize = 7;

/// Opaque element-type handle from the storage library (`spec.md` §6.2).
/// Thin wrapper so the rest of the crate never touches `hdf5::Datatype`
/// directly outside of `storage`.
#[derive(Clone)]
pub struct TypeId(pub(crate) hdf5::Datatype);

impl TypeId {
    pub fn byte_size(&self) -> usize {
        self.0.size()
    }

    /// Builds a `TypeId` for a native Rust type known to `hdf5`, e.g.
    /// `TypeId::of::<f64>()`. This only touches the HDF5 library's
    /// predefined native types, not a file or dataset, so it is usable
    /// outside of an open `Instance`.
    pub fn of<T: hdf5::H5Type>() -> Result<Self> {
        hdf5::Datatype::from_type::<T>()
            .map(TypeId)
            .map_err(|source| Ah5Error::StorageFailure { source })
    }
}

impl std::fmt::Debug for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeId({} bytes)", self.0.size())
    }
}

/// Where a record's bytes currently live.
///
/// `spec.md` §3's invariant ("after `open` and before `close`, `data_ptr`
/// may alias caller memory; after `close`... `data_ptr` lies inside the
/// staging buffer") is encoded here as a type rather than left as a
/// convention on a raw pointer.
#[derive(Clone, Copy)]
pub enum SourcePtr {
    /// Points into the producer's live array. Valid only until the
    /// matching `close` snapshots it — see `spec.md` §5's producer memory
    /// contract.
    Caller { ptr: *const u8, len: usize },
    /// Points into the instance's staging buffer at `offset..offset+len`.
    Staged { offset: usize, len: usize },
}

// SAFETY: the raw pointer in `Caller` is only dereferenced by the slice
// copier while the producer thread holds the handshake mutex across
// `open..close`, i.e. while the pointed-to memory is guaranteed live per the
// producer memory contract in `spec.md` §5. The record itself is moved
// between threads (producer -> worker) only after the pointer has been
// rewritten to `Staged`.
unsafe impl Send for SourcePtr {}

/// One pending write operation.
pub struct WriteRecord {
    pub data: SourcePtr,
    pub rank: usize,
    pub dims: Vec<usize>,
    pub lbounds: Vec<usize>,
    pub ubounds: Vec<usize>,
    pub type_id: TypeId,
    pub name: String,
}

impl WriteRecord {
    /// Validates and constructs a record pointing at caller memory.
    ///
    /// Applies scalar promotion (`spec.md` §3) when `rank == 0` and
    /// `scalar_as_array` is enabled: the record becomes `rank = 1`,
    /// `dims = ubounds = [1]`, `lbounds = [0]`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ptr: *const u8,
        name: &str,
        type_id: TypeId,
        rank: usize,
        dims: &[usize],
        lbounds: &[usize],
        ubounds: &[usize],
        scalar_as_array: bool,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Ah5Error::EmptyName);
        }
        if rank > MAX_RANK {
            return Err(Ah5Error::RankTooLarge { rank, max_rank: MAX_RANK });
        }
        for d in 0..rank {
            if lbounds[d] > ubounds[d] {
                return Err(Ah5Error::BoundsOutOfOrder {
                    dim: d,
                    lbound: lbounds[d],
                    ubound: ubounds[d],
                });
            }
            if ubounds[d] > dims[d] {
                return Err(Ah5Error::BoundsExceedExtent {
                    dim: d,
                    ubound: ubounds[d],
                    extent: dims[d],
                });
            }
        }

        let (rank, dims, lbounds, ubounds) = if rank == 0 && scalar_as_array {
            (1, vec![1], vec![0], vec![1])
        } else {
            (rank, dims[..rank].to_vec(), lbounds[..rank].to_vec(), ubounds[..rank].to_vec())
        };

        let elem_count: usize = (0..rank).map(|d| ubounds[d] - lbounds[d]).product();
        let elem_count = if rank == 0 { 1 } else { elem_count };
        let len = elem_count * type_id.byte_size();

        Ok(WriteRecord {
            data: SourcePtr::Caller { ptr, len },
            rank,
            dims,
            lbounds,
            ubounds,
            type_id,
            name: name.to_owned(),
        })
    }

    /// Total bytes this record will occupy once densely packed:
    /// `type_size * product(ubounds[d] - lbounds[d])`.
    pub fn required_bytes(&self) -> usize {
        let elems: usize = (0..self.rank)
            .map(|d| self.ubounds[d] - self.lbounds[d])
            .product();
        let elems = if self.rank == 0 { 1 } else { elems };
        elems * self.type_id.byte_size()
    }

    /// Dense shape after the slice has been snapshotted: `ubounds - lbounds`.
    pub fn dense_shape(&self) -> Vec<usize> {
        (0..self.rank).map(|d| self.ubounds[d] - self.lbounds[d]).collect()
    }

    /// Rewrites this record to point inside the staging buffer at
    /// `offset`, and normalises `dims/lbounds/ubounds` to the dense block,
    /// per `spec.md` §3's post-`close` invariant.
    pub fn restage(&mut self, offset: usize) {
        let len = self.required_bytes();
        let shape = self.dense_shape();
        self.dims = shape.clone();
        self.lbounds = vec![0; self.rank];
        self.ubounds = shape;
        self.data = SourcePtr::Staged { offset, len };
    }
}
