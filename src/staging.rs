//! Staging Buffer: snapshots producer bytes so the producer can resume
//! mutating its arrays immediately after `close` returns (`spec.md` §4.5).

use std::io;
use std::path::PathBuf;

use memmap2::MmapMut;

use crate::error::{Ah5Error, Result};

/// Smallest allocation unit dynamic growth rounds up to.
const DYNAMIC_GROWTH_GRANULARITY: usize = 64 * 1024;

/// A contiguous byte region that accepts sequential writes during one
/// `close` cycle and is read back by the worker thread.
pub trait StagingBuffer: Send {
    /// Grows the buffer if the strategy allows it. Returns `Ok(n)` with the
    /// number of requested bytes that can actually be satisfied out of
    /// `used` (the rest must fall back to synchronous writes).
    fn ensure_capacity(&mut self, additional: usize) -> Result<usize>;

    /// Appends `len` bytes reserved at the current `used` offset, returning
    /// that offset. Caller must have already written into
    /// `as_mut_slice()[offset..offset+len]` via `ensure_capacity`.
    fn reserve(&mut self, len: usize) -> usize;

    fn as_mut_slice(&mut self) -> &mut [u8];
    fn as_slice(&self) -> &[u8];

    fn used(&self) -> usize;
    fn capacity(&self) -> usize;

    /// Resets `used` to zero ahead of the next `close` cycle. Dynamic
    /// strategies may also drop their backing allocation here.
    fn reset(&mut self);
}

/// Dynamic memory: grows on demand, discarding previous contents (valid
/// only within one `close` cycle, per `spec.md` §4.5).
pub struct DynamicBuffer {
    data: Vec<u8>,
    used: usize,
}

impl DynamicBuffer {
    pub fn new() -> Self {
        DynamicBuffer { data: Vec::new(), used: 0 }
    }
}

impl Default for DynamicBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn round_up_to_granularity(demand: usize, granularity: usize) -> usize {
    demand.div_ceil(granularity) * granularity
}

impl StagingBuffer for DynamicBuffer {
    fn ensure_capacity(&mut self, additional: usize) -> Result<usize> {
        let needed = self.used + additional;
        if needed > self.data.len() {
            let new_cap = round_up_to_granularity(needed, DYNAMIC_GROWTH_GRANULARITY);
            self.data
                .try_reserve(new_cap - self.data.len())
                .map_err(|_| Ah5Error::OutOfMemory { requested: new_cap })?;
            self.data.resize(new_cap, 0);
        }
        Ok(additional)
    }

    fn reserve(&mut self, len: usize) -> usize {
        let offset = self.used;
        self.used += len;
        offset
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn used(&self) -> usize {
        self.used
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn reset(&mut self) {
        self.used = 0;
    }
}

/// Fixed memory: capacity set at construction, never grown. When
/// insufficient, `close` falls back to synchronous writes for the
/// overflowing records (`spec.md` §4.5).
pub struct FixedBuffer {
    data: Box<[u8]>,
    used: usize,
}

impl FixedBuffer {
    pub fn with_capacity(cap: usize) -> Self {
        FixedBuffer { data: vec![0u8; cap].into_boxed_slice(), used: 0 }
    }

    pub fn from_caller_region(region: Box<[u8]>) -> Self {
        FixedBuffer { data: region, used: 0 }
    }
}

impl StagingBuffer for FixedBuffer {
    fn ensure_capacity(&mut self, additional: usize) -> Result<usize> {
        let remaining = self.data.len().saturating_sub(self.used);
        Ok(additional.min(remaining))
    }

    fn reserve(&mut self, len: usize) -> usize {
        let offset = self.used;
        self.used += len;
        offset
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn used(&self) -> usize {
        self.used
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn reset(&mut self) {
        self.used = 0;
    }
}

/// Mapped file: backed by a file in a caller-nominated directory, grown in
/// page-aligned increments up to an optional cap (`spec.md` §4.5).
pub struct MappedFileBuffer {
    file: std::fs::File,
    mmap: MmapMut,
    used: usize,
    cap: Option<usize>,
    _path: PathBuf,
}

impl MappedFileBuffer {
    pub fn create_in(dir: &std::path::Path, initial: usize, cap: Option<usize>) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = tempfile::Builder::new().prefix("ah5rs-staging-").tempfile_in(dir)?;
        let (file, path) = file.keep().map_err(|e| e.error)?;
        let page = page_align(initial.max(1));
        file.set_len(page as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(MappedFileBuffer { file, mmap, used: 0, cap, _path: path })
    }
}

fn page_align(n: usize) -> usize {
    let page = page_size();
    n.div_ceil(page) * page
}

fn page_size() -> usize {
    // A real syscall lookup would use `libc::sysconf(_SC_PAGESIZE)`; 4 KiB
    // is the value on every platform this crate targets and keeps the
    // dependency list aligned with what the rest of the crate already
    // pulls in.
    4096
}

impl StagingBuffer for MappedFileBuffer {
    fn ensure_capacity(&mut self, additional: usize) -> Result<usize> {
        let needed = self.used + additional;
        if needed > self.mmap.len() {
            if let Some(cap) = self.cap {
                if needed > cap {
                    let remaining = cap.saturating_sub(self.used);
                    return Ok(additional.min(remaining));
                }
            }
            let new_len = page_align(needed);
            self.file
                .set_len(new_len as u64)
                .map_err(|source| Ah5Error::StagingOverflow { requested: needed, capacity: self.mmap.len(), source })?;
            let new_mmap = unsafe { MmapMut::map_mut(&self.file) }
                .map_err(|source| Ah5Error::StagingOverflow { requested: needed, capacity: self.mmap.len(), source })?;
            self.mmap = new_mmap;
        }
        Ok(additional)
    }

    fn reserve(&mut self, len: usize) -> usize {
        let offset = self.used;
        self.used += len;
        offset
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }

    fn used(&self) -> usize {
        self.used
    }

    fn capacity(&self) -> usize {
        self.mmap.len()
    }

    fn reset(&mut self) {
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_buffer_grows_to_granularity_multiple() {
        let mut buf = DynamicBuffer::new();
        let got = buf.ensure_capacity(100).unwrap();
        assert_eq!(got, 100);
        assert_eq!(buf.capacity(), DYNAMIC_GROWTH_GRANULARITY);
        let offset = buf.reserve(100);
        assert_eq!(offset, 0);
        assert_eq!(buf.used(), 100);
    }

    #[test]
    fn fixed_buffer_reports_partial_capacity() {
        let mut buf = FixedBuffer::with_capacity(1024);
        let got = buf.ensure_capacity(2048).unwrap();
        assert_eq!(got, 1024);
        buf.reserve(got);
        let got2 = buf.ensure_capacity(10).unwrap();
        assert_eq!(got2, 0);
    }

    #[test]
    fn mapped_file_buffer_grows_page_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = MappedFileBuffer::create_in(dir.path(), 10, None).unwrap();
        assert_eq!(buf.capacity() % 4096, 0);
        let got = buf.ensure_capacity(9000).unwrap();
        assert_eq!(got, 9000);
        assert_eq!(buf.capacity() % 4096, 0);
        assert!(buf.capacity() >= 9000);
    }

    #[test]
    fn mapped_file_buffer_respects_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = MappedFileBuffer::create_in(dir.path(), 10, Some(2048)).unwrap();
        let got = buf.ensure_capacity(4096).unwrap();
        assert!(got <= 2048);
    }
}
