// SPDX-License-Identifier: BSD-2-Clause

//! Positioned block IO over volumes and volume images.
//!
//! Everything the checker touches on disk goes through [`BlockIO`], so the
//! same code runs against a real device, a partition inside a disk image
//! (via the partition offset) or an in-memory buffer in tests.

pub mod errors;
mod macros;

mod mem;
mod std_io;

pub mod prelude {
    pub use super::BlockIO;
    pub use super::BlockIOExt;
    pub use super::BlockIOMapMut;
    pub use super::BlockIOStructExt;
    pub use super::errors::*;
    pub use super::mem::MemBlockIO;
    pub use super::std_io::StdBlockIO;
}

use errors::*;

/// Block IO abstraction trait.
///
/// Offsets are relative to the start of the volume; the backend adds the
/// partition offset so a filesystem embedded in a larger image needs no
/// special handling in the callers.
pub trait BlockIO {
    /// Writes `data` at `offset` (volume-relative).
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult;

    /// Reads `buf.len()` bytes into `buf` from `offset` (volume-relative).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> BlockIOResult;

    fn set_offset(&mut self, partition_offset: u64) -> u64;
    fn partition_offset(&self) -> u64;
}

/// Convenience helpers layered on [`BlockIO`].
pub trait BlockIOExt: BlockIO {
    /// Fills a region with zeroes.
    #[inline]
    fn zero_fill(&mut self, offset: u64, len: usize) -> BlockIOResult {
        const ZERO: [u8; 4096] = [0u8; 4096];
        let mut remaining = len;
        let mut off = offset;
        while remaining > 0 {
            let chunk = remaining.min(ZERO.len());
            self.write_at(off, &ZERO[..chunk])?;
            off += chunk as u64;
            remaining -= chunk;
        }
        Ok(())
    }

    // Little-endian read/write helpers for primitive types.
    blockio_impl_primitive_rw!(u16, u32, u64);
}

impl<T: BlockIO + ?Sized> BlockIOExt for T {}

/// Seam for backends that can hand out a shared writable mapping of a
/// region of the volume. Backends without mapping support simply do not
/// implement this trait; file-backed IO maps through `mmap(2)`.
///
/// A successful mapping aliases the on-disk bytes: stores through it reach
/// the backing file without further `write_at` calls.
pub trait BlockIOMapMut: BlockIO {
    /// Maps `len` bytes at `offset` (volume-relative) read-write.
    ///
    /// Failure is not fatal for callers: the usual reaction is to fall back
    /// to `read_at` into an owned buffer.
    fn map_mut(&mut self, offset: u64, len: usize) -> BlockIOResult<memmap2::MmapMut>;
}

/// Reads and writes `repr(C, packed)` on-disk structures via zerocopy.
pub trait BlockIOStructExt: BlockIO {
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> BlockIOResult<T> {
        let size = core::mem::size_of::<T>();
        assert!(size <= 4096, "read_struct: type too large");
        let mut buf = [0u8; 4096];
        self.read_at(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| BlockIOError::Other("read_struct failed"))
    }

    fn write_struct<T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
        val: &T,
    ) -> BlockIOResult {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: BlockIO + ?Sized> BlockIOStructExt for T {}
