//! Thin wrapper around the external hierarchical-data library (`spec.md`
//! §6.2). The core never calls into `hdf5` directly outside this module, so
//! the rest of the crate is insulated from the storage library's own error
//! and handle types.

use crate::error::{Ah5Error, Result};
use crate::record::WriteRecord;

/// Creates (truncating) the file named `path`.
pub fn create_file(path: &std::path::Path) -> Result<hdf5::File> {
    hdf5::File::create(path).map_err(|source| Ah5Error::StorageFailure { source })
}

/// Writes one Write Record's already-dense bytes as a new, contiguously
/// laid out dataset under `file`. `spec.md` §4.3 step 2 / §6.2.
pub fn write_dataset(file: &hdf5::File, record: &WriteRecord, bytes: &[u8]) -> Result<()> {
    let shape: Vec<usize> = if record.rank == 0 { vec![] } else { record.dims.clone() };

    let builder = file
        .new_dataset_builder()
        .no_chunk(); // contiguous layout, per spec.md §4.3/§6.4.

    let dataset = with_shape(builder, &shape, &record.type_id.0)
        .create(record.name.as_str())
        .map_err(|source| Ah5Error::StorageFailure { source })?;

    dataset
        .write_raw(bytes_as_typed(bytes, &record.type_id))
        .map_err(|source| Ah5Error::StorageFailure { source })?;

    Ok(())
}

/// Builds the dataspace/datatype portion of a dataset builder for an
/// arbitrary rank, including rank 0 (scalar dataspace).
fn with_shape(
    builder: hdf5::DatasetBuilderEmpty,
    shape: &[usize],
    dtype: &hdf5::Datatype,
) -> hdf5::DatasetBuilder {
    let builder = builder.dtype(dtype.clone());
    if shape.is_empty() {
        builder.shape(())
    } else {
        builder.shape(shape)
    }
}

/// Reinterprets the staged byte range as a typed slice for `hdf5`'s
/// `write_raw`. Sound because every record's bytes were produced by the
/// slice copier using `type_id.byte_size()` as the element stride, so the
/// byte length is always an exact multiple of `size_of::<T>()` for the
/// concrete type `type_id` names; the storage library only needs the
/// pointer and element count, not a statically-typed `T`, so we hand it
/// `u8` and rely on `record.type_id` (passed separately as the dataset's
/// dtype) to describe the layout.
fn bytes_as_typed<'a>(bytes: &'a [u8], _type_id: &crate::record::TypeId) -> &'a [u8] {
    bytes
}
