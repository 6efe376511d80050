// SPDX-License-Identifier: BSD-2-Clause

use std::fs::File;
use std::io::{Error, Read, Seek, SeekFrom, Write};

use memmap2::MmapOptions;

use crate::{BlockIO, BlockIOMapMut, errors::*};

/// [`BlockIO`] over anything `Read + Write + Seek` (files, block devices).
#[derive(Debug)]
pub struct StdBlockIO<'a, T: Read + Write + Seek> {
    io: &'a mut T,
    partition_offset: u64,
}

impl<'a, T: Read + Write + Seek> StdBlockIO<'a, T> {
    #[inline]
    pub fn new(io: &'a mut T) -> Self {
        Self {
            io,
            partition_offset: 0,
        }
    }

    #[inline]
    pub fn new_with_offset(io: &'a mut T, partition_offset: u64) -> Self {
        Self {
            io,
            partition_offset,
        }
    }
}

impl<'a, T: Read + Write + Seek> BlockIO for StdBlockIO<'a, T> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        self.io.seek(SeekFrom::Start(self.partition_offset + offset))?;
        self.io.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        self.io.seek(SeekFrom::Start(self.partition_offset + offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> BlockIOResult {
        self.io.flush()?;
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

impl<'a> BlockIOMapMut for StdBlockIO<'a, File> {
    /// Shared writable mapping of a file region. The kernel rejects
    /// offsets that are not page aligned, which is common for FAT12/16
    /// layouts; callers treat that as an ordinary fallback-to-copy case.
    fn map_mut(&mut self, offset: u64, len: usize) -> BlockIOResult<memmap2::MmapMut> {
        let map = unsafe {
            MmapOptions::new()
                .offset(self.partition_offset + offset)
                .len(len)
                .map_mut(&*self.io)
        }?;
        Ok(map)
    }
}

impl From<Error> for BlockIOError {
    #[cold]
    #[inline(never)]
    fn from(e: Error) -> Self {
        // Leak the string to produce a 'static str. Acceptable for error mapping.
        let leaked: &'static str = Box::leak(e.to_string().into_boxed_str());
        BlockIOError::Other(leaked)
    }
}

#[cfg(test)]
mod test {
    use crate::prelude::*;
    use tempfile::tempfile;

    #[test]
    fn test_rw() {
        let mut file = tempfile().unwrap();
        let mut io = StdBlockIO::new(&mut file);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_primitive_rw() {
        let mut file = tempfile().unwrap();
        let mut io = StdBlockIO::new(&mut file);

        io.write_u16_at(0, 0xBEEF).unwrap();
        io.write_u32_at(2, 0x0FFF_FFF8).unwrap();
        assert_eq!(io.read_u16_at(0).unwrap(), 0xBEEF);
        assert_eq!(io.read_u32_at(2).unwrap(), 0x0FFF_FFF8);
    }

    #[test]
    fn test_map_mut_page_aligned() {
        let mut file = tempfile().unwrap();
        file.set_len(8192).unwrap();
        let mut io = StdBlockIO::new(&mut file);
        io.write_at(4096, &[0xAB; 16]).unwrap();

        let mut map = io.map_mut(4096, 4096).unwrap();
        assert_eq!(&map[..16], &[0xAB; 16]);
        map[16] = 0xCD;
        map.flush().unwrap();
        drop(map);

        let mut out = [0u8; 1];
        io.read_at(4112, &mut out).unwrap();
        assert_eq!(out[0], 0xCD);
    }

    #[test]
    fn test_map_mut_unaligned_offset_fails() {
        let mut file = tempfile().unwrap();
        file.set_len(8192).unwrap();
        let mut io = StdBlockIO::new(&mut file);
        // 512 is not page aligned on any platform we care about.
        assert!(io.map_mut(512, 512).is_err());
    }
}
