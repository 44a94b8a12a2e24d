//! The memory region a record batch (or schema stream) is read from.

use std::ops::Range;

use bytes::Bytes;

use crate::error::{IpcError, Result};

/// A contiguous byte region addressed by `(offset, length)` pairs.
///
/// The parser never dereferences a region directly. It asks for bounded host
/// copies of the ranges it must interpret (message prefixes, flatbuffer
/// metadata, dictionary bodies), so an implementation may be backed by device
/// memory and perform a device-to-host transfer in
/// [`copy_to_host`](DataRegion::copy_to_host).
pub trait DataRegion {
    /// Total size of the region in bytes.
    fn size(&self) -> usize;

    /// Copy `len` bytes starting at `offset` into host memory.
    ///
    /// Implementations must return [`IpcError::BufferOutOfRange`] when the
    /// range does not fit in the region and [`IpcError::Transfer`] when the
    /// copy itself fails.
    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Bytes>;
}

/// Validate `offset..offset + len` against a region of `size` bytes.
pub fn checked_range(offset: usize, len: usize, size: usize) -> Result<Range<usize>> {
    offset
        .checked_add(len)
        .filter(|end| *end <= size)
        .map(|end| offset..end)
        .ok_or_else(|| {
            IpcError::out_of_range(format!(
                "range [{offset}, {offset} + {len}) exceeds data region of {size} bytes"
            ))
        })
}

impl DataRegion for [u8] {
    fn size(&self) -> usize {
        self.len()
    }

    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Bytes> {
        let range = checked_range(offset, len, self.len())?;
        Ok(Bytes::copy_from_slice(&self[range]))
    }
}

impl<const N: usize> DataRegion for [u8; N] {
    fn size(&self) -> usize {
        N
    }

    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Bytes> {
        self.as_slice().copy_to_host(offset, len)
    }
}

impl DataRegion for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }

    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Bytes> {
        self.as_slice().copy_to_host(offset, len)
    }
}

impl DataRegion for Bytes {
    fn size(&self) -> usize {
        self.len()
    }

    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Bytes> {
        let range = checked_range(offset, len, self.len())?;
        Ok(self.slice(range))
    }
}

impl<R: DataRegion + ?Sized> DataRegion for &R {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Bytes> {
        (**self).copy_to_host(offset, len)
    }
}
