// SPDX-License-Identifier: BSD-2-Clause

use crate::{BlockIO, BlockIOMapMut, errors::*};

/// In-memory implementation of [`BlockIO`].
///
/// Used by the test suites to build synthetic volumes without touching
/// the filesystem.
#[derive(Debug)]
pub struct MemBlockIO<'a> {
    buffer: &'a mut [u8],
    partition_offset: u64,
}

impl<'a> MemBlockIO<'a> {
    #[inline]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            partition_offset: 0,
        }
    }

    #[inline]
    pub fn new_with_offset(buffer: &'a mut [u8], partition_offset: u64) -> Self {
        Self {
            buffer,
            partition_offset,
        }
    }

    #[inline]
    fn range(&self, offset: u64, len: usize) -> BlockIOResult<core::ops::Range<usize>> {
        let start = self
            .partition_offset
            .checked_add(offset)
            .ok_or(BlockIOError::OutOfBounds)?;
        let end = start
            .checked_add(len as u64)
            .ok_or(BlockIOError::OutOfBounds)?;
        if end > self.buffer.len() as u64 {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(start as usize..end as usize)
    }
}

impl<'a> BlockIO for MemBlockIO<'a> {
    #[inline(always)]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        let range = self.range(offset, data.len())?;
        self.buffer[range].copy_from_slice(data);
        Ok(())
    }

    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.buffer[range]);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> BlockIOResult {
        Ok(())
    }

    #[inline]
    fn set_offset(&mut self, partition_offset: u64) -> u64 {
        self.partition_offset = partition_offset;
        partition_offset
    }

    #[inline]
    fn partition_offset(&self) -> u64 {
        self.partition_offset
    }
}

impl BlockIOMapMut for MemBlockIO<'_> {
    /// Memory buffers have nothing to map; callers fall back to their
    /// copy path.
    fn map_mut(&mut self, _offset: u64, _len: usize) -> BlockIOResult<memmap2::MmapMut> {
        Err(BlockIOError::Unsupported)
    }
}

#[cfg(test)]
mod test {
    use crate::prelude::*;

    #[test]
    fn test_rw() {
        let mut buf = [0u8; 256];
        let mut io = MemBlockIO::new(&mut buf);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_partition_offset() {
        let mut buf = [0u8; 64];
        let mut io = MemBlockIO::new_with_offset(&mut buf, 16);
        io.write_u32_at(0, 0xDEAD_BEEF).unwrap();
        assert_eq!(io.read_u32_at(0).unwrap(), 0xDEAD_BEEF);
        drop(io);
        assert_eq!(&buf[16..20], &0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn test_out_of_bounds() {
        let mut buf = [0u8; 8];
        let mut io = MemBlockIO::new(&mut buf);
        assert_eq!(
            io.write_at(6, &[0; 4]).unwrap_err(),
            BlockIOError::OutOfBounds
        );
        let mut out = [0u8; 4];
        assert_eq!(io.read_at(u64::MAX, &mut out).unwrap_err(), BlockIOError::OutOfBounds);
    }

    #[test]
    fn test_zero_fill() {
        let mut buf = [0xFFu8; 64];
        let mut io = MemBlockIO::new(&mut buf);
        io.zero_fill(10, 8).unwrap();

        let mut out = [0xAAu8; 8];
        io.read_at(10, &mut out).unwrap();
        assert_eq!(out, [0u8; 8]);
    }
}
