//! N-dimensional strided-to-contiguous slice copy (`spec.md` §4.4).
//!
//! Copies the rectangular block `[lbounds, ubounds)` out of a row-major
//! strided source into a dense, row-major destination. The recursive walk
//! collapses any dimension suffix that is already a full row into a single
//! contiguous `memcpy`, matching the reference algorithm's "emit one
//! contiguous byte copy" rule.

use std::thread;

/// `spec.md` §6.3: at least 16 concurrent copy workers must be supported.
pub const MAX_COPY_THREADS: usize = 32;

/// `spec.md` §4.4: parallel copy partitions a fully dense block into
/// per-thread extents aligned to this page size where possible.
const PAGE_SIZE: usize = 4096;

/// Parameters for one slice-copy invocation. `dims`/`lbounds`/`ubounds` are
/// all length `rank`; `elem_size` is the byte size of one array element.
pub struct SliceCopyParams<'a> {
    pub src: &'a [u8],
    pub dst: &'a mut [u8],
    pub elem_size: usize,
    pub dims: &'a [usize],
    pub lbounds: &'a [usize],
    pub ubounds: &'a [usize],
}

/// Copies `params.src[lbounds..ubounds]` (strided by `dims`) into
/// `params.dst`, optionally parallelising over the outermost dimension.
pub fn copy_slice(params: SliceCopyParams<'_>, parallel: bool) {
    let SliceCopyParams { src, dst, elem_size, dims, lbounds, ubounds } = params;
    let rank = dims.len();

    if rank == 0 {
        dst[..elem_size].copy_from_slice(&src[..elem_size]);
        return;
    }

    let src_strides = row_major_strides(dims, elem_size);
    let dst_dims: Vec<usize> = (0..rank).map(|d| ubounds[d] - lbounds[d]).collect();
    let dst_strides = row_major_strides(&dst_dims, elem_size);

    if parallel && rank > 0 {
        copy_outer_parallel(
            src, dst, elem_size, dims, lbounds, ubounds, &src_strides, &dst_strides,
        );
    } else {
        copy_recursive(
            src, dst, elem_size, dims, lbounds, ubounds, &src_strides, &dst_strides, 0, 0, 0,
        );
    }
}

fn row_major_strides(dims: &[usize], elem_size: usize) -> Vec<usize> {
    let rank = dims.len();
    let mut strides = vec![0usize; rank];
    let mut acc = elem_size;
    for d in (0..rank).rev() {
        strides[d] = acc;
        acc *= dims[d];
    }
    strides
}

/// Walks dimension `d`, recursing until a trailing full-row suffix is found,
/// at which point the remaining bytes are copied in one contiguous `memcpy`.
#[allow(clippy::too_many_arguments)]
fn copy_recursive(
    src: &[u8],
    dst: &mut [u8],
    elem_size: usize,
    dims: &[usize],
    lbounds: &[usize],
    ubounds: &[usize],
    src_strides: &[usize],
    dst_strides: &[usize],
    d: usize,
    src_off: usize,
    dst_off: usize,
) {
    let rank = dims.len();
    if is_full_suffix(dims, lbounds, ubounds, d) {
        let count: usize = (d..rank).map(|k| ubounds[k] - lbounds[k]).product();
        let nbytes = count.max(1) * elem_size;
        let src_start = src_off + lbounds[d..rank].iter().zip(&src_strides[d..rank]).map(|(l, s)| l * s).sum::<usize>();
        dst[dst_off..dst_off + nbytes].copy_from_slice(&src[src_start..src_start + nbytes]);
        return;
    }

    for i in lbounds[d]..ubounds[d] {
        let next_src_off = src_off + i * src_strides[d];
        let next_dst_off = dst_off + (i - lbounds[d]) * dst_strides[d];
        copy_recursive(
            src, dst, elem_size, dims, lbounds, ubounds, src_strides, dst_strides,
            d + 1, next_src_off, next_dst_off,
        );
    }
}

/// True when `[lbounds[k], ubounds[k])` covers the whole extent for every
/// `k > d` in the current subproblem — i.e. the remaining dimensions form a
/// contiguous row that can be copied in one shot.
fn is_full_suffix(dims: &[usize], lbounds: &[usize], ubounds: &[usize], d: usize) -> bool {
    ((d + 1)..dims.len()).all(|k| lbounds[k] == 0 && ubounds[k] == dims[k])
}

/// Partitions the copy across up to `MAX_COPY_THREADS` scoped threads. When
/// the requested block is the whole dense array (no sub-slice on any
/// dimension), `src` and `dst` are one contiguous run of bytes and the
/// partition is a page-aligned byte range per thread, the last absorbing
/// the tail, matching `examples/original_source/src/memhandling.c`'s
/// `memcpy_omp` (`spec.md` §4.4). Otherwise the source rows are not
/// contiguous across the outermost dimension, so the partition instead
/// splits the outermost index range `[lbounds[0], ubounds[0])`; either way
/// each thread's slice of `dst` is strictly disjoint, so no synchronisation
/// is needed inside the copy.
#[allow(clippy::too_many_arguments)]
fn copy_outer_parallel(
    src: &[u8],
    dst: &mut [u8],
    elem_size: usize,
    dims: &[usize],
    lbounds: &[usize],
    ubounds: &[usize],
    src_strides: &[usize],
    dst_strides: &[usize],
) {
    let outer_lo = lbounds[0];
    let outer_hi = ubounds[0];
    let outer_count = outer_hi - outer_lo;
    if outer_count == 0 {
        return;
    }

    let available = num_cpus::get();
    let workers = available.min(MAX_COPY_THREADS).min(outer_count).max(1);

    if workers <= 1 {
        copy_recursive(
            src, dst, elem_size, dims, lbounds, ubounds, src_strides, dst_strides, 0, 0, 0,
        );
        return;
    }

    if outer_lo == 0 && outer_hi == dims[0] && is_full_suffix(dims, lbounds, ubounds, 0) {
        let total_bytes: usize = dims.iter().product::<usize>() * elem_size;
        copy_contiguous_paged(&src[..total_bytes], &mut dst[..total_bytes], workers);
        return;
    }

    let chunk = outer_count.div_ceil(workers);
    let dst_row_bytes = dst_strides[0];

    thread::scope(|scope| {
        let mut rest = &mut dst[..];
        let mut start = outer_lo;
        for _ in 0..workers {
            if start >= outer_hi {
                break;
            }
            let end = (start + chunk).min(outer_hi);
            let rows = end - start;
            let take = rows * dst_row_bytes;
            let (this_chunk, remainder) = rest.split_at_mut(take.min(rest.len()));
            rest = remainder;

            let mut sub_lbounds = lbounds.to_vec();
            let mut sub_ubounds = ubounds.to_vec();
            sub_lbounds[0] = start;
            sub_ubounds[0] = end;

            scope.spawn(move || {
                copy_recursive(
                    src, this_chunk, elem_size, dims, &sub_lbounds, &sub_ubounds,
                    src_strides, dst_strides, 0, 0, 0,
                );
            });

            start = end;
        }
    });
}

/// Splits `total_bytes` of a contiguous `src` into per-thread extents
/// aligned to `PAGE_SIZE` where possible, the last thread taking whatever
/// remains (`spec.md` §4.4).
fn copy_contiguous_paged(src: &[u8], dst: &mut [u8], workers: usize) {
    let total_bytes = dst.len();
    let ideal = total_bytes.div_ceil(workers);
    let chunk = ideal.div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE;

    thread::scope(|scope| {
        let mut rest_src = src;
        let mut rest_dst = &mut dst[..];
        while !rest_dst.is_empty() {
            let take = chunk.min(rest_dst.len());
            let (src_chunk, src_remainder) = rest_src.split_at(take);
            let (dst_chunk, dst_remainder) = rest_dst.split_at_mut(take);
            rest_src = src_remainder;
            rest_dst = dst_remainder;
            scope.spawn(move || {
                dst_chunk.copy_from_slice(src_chunk);
            });
        }
    });
}
