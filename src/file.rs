//! File payload: inode-level allocation and the block-granular read/write path.
//!
//! Grounded on `original_source/src/file.c`'s `fif_create_file`, `fif_resize_file`,
//! `fif_free_file_blocks`, `fif_read_file_data` and `fif_write_file_data`. This module only
//! moves bytes in and out of a file's already-resolved block range; open-handle bookkeeping
//! (buffering, compressors, seek semantics) lives in `handle.rs`.

use crate::error::{FifError, Result};
use crate::format::{Attributes, BlockIndex, InodeIndex, RawInode};
use crate::io::IoAdapter;
use crate::time::UnixTimestamp;
use crate::volume::Mount;

fn div_ceil(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

impl<IO: IoAdapter> Mount<IO> {
    /// Allocates an inode for a new regular file, links it into `directory_inode`, and returns
    /// its index.
    pub(crate) fn create_file(
        &mut self,
        filename: &str,
        directory_inode: InodeIndex,
    ) -> Result<InodeIndex> {
        let inode_index = self.alloc_inode(directory_inode)?;
        let now = UnixTimestamp::now().0;
        let inode = RawInode {
            creation_timestamp: now,
            modification_timestamp: now,
            attributes: Attributes::FILE.0,
            reference_count: 1,
            compression_algorithm: self.new_file_compression_algorithm.0,
            compression_level: self.new_file_compression_level,
            ..RawInode::default()
        };
        self.write_inode(inode_index, &inode)?;

        if let Err(err) = self.add_file_to_directory(directory_inode, filename, inode_index) {
            self.free_inode(inode_index)?;
            return Err(err);
        }

        Ok(inode_index)
    }

    /// Grows or shrinks `inode`'s block range so it can hold `new_size` bytes of on-disk data.
    pub(crate) fn resize_file(&mut self, inode: &mut RawInode, new_size: u32) -> Result<()> {
        let required_blocks = div_ceil(new_size, self.block_size);

        if inode.data_size == 0 && inode.block_count == 0 {
            if required_blocks > 0 {
                let block_index = self.alloc_blocks(BlockIndex::ZERO, required_blocks)?;
                inode.first_block_index = block_index.0;
            }
        } else if required_blocks == 0 {
            self.free_blocks(BlockIndex(inode.first_block_index), inode.block_count)?;
            inode.first_block_index = 0;
        } else {
            let old_block_count = inode.block_count;
            let new_block_index = self.resize_block_range(
                BlockIndex(inode.first_block_index),
                old_block_count,
                required_blocks,
            )?;
            inode.first_block_index = new_block_index.0;
            if required_blocks > old_block_count {
                self.zero_blocks(
                    BlockIndex(inode.first_block_index) + old_block_count,
                    required_blocks - old_block_count,
                )?;
            }
        }

        inode.block_count = required_blocks;
        inode.data_size = new_size;
        Ok(())
    }

    /// Frees every block owned by `inode` and resets its size fields.
    pub(crate) fn free_file_blocks(&mut self, inode: &mut RawInode) -> Result<()> {
        if inode.block_count > 0 {
            self.free_blocks(BlockIndex(inode.first_block_index), inode.block_count)?;
        }
        inode.first_block_index = 0;
        inode.block_count = 0;
        inode.data_size = 0;
        inode.uncompressed_size = 0;
        Ok(())
    }

    /// Reads up to `buffer.len()` bytes of raw (possibly compressed) on-disk payload starting at
    /// `offset`. Stops and returns the bytes transferred so far if an I/O error occurs partway
    /// through, rather than discarding a partial read.
    pub(crate) fn read_file_data(
        &mut self,
        inode: &RawInode,
        offset: u32,
        buffer: &mut [u8],
    ) -> Result<usize> {
        if offset > inode.data_size {
            return Err(FifError::BadOffset);
        }

        let available = (inode.data_size - offset) as usize;
        let to_read = buffer.len().min(available);
        let mut total = 0usize;

        while total < to_read {
            let current_offset = offset as usize + total;
            let block_number = (current_offset as u32) / self.block_size;
            let block_offset = (current_offset as u32) % self.block_size;
            let chunk = (self.block_size - block_offset) as usize;
            let chunk = chunk.min(to_read - total);

            let block_index = BlockIndex(inode.first_block_index) + block_number;
            match self.read_block(block_index, block_offset, &mut buffer[total..total + chunk]) {
                Ok(n) => {
                    total += n;
                    if n < chunk {
                        break;
                    }
                }
                Err(_) if total > 0 => break,
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }

    /// Writes `buffer` into `inode`'s already-allocated block range starting at `offset`. Does
    /// not grow the file; callers resize first.
    pub(crate) fn write_file_data(
        &mut self,
        inode: &RawInode,
        offset: u32,
        buffer: &[u8],
    ) -> Result<usize> {
        if offset > inode.data_size {
            return Err(FifError::BadOffset);
        }

        let available = (inode.data_size - offset) as usize;
        let to_write = buffer.len().min(available);
        let mut total = 0usize;

        while total < to_write {
            let current_offset = offset as usize + total;
            let block_number = (current_offset as u32) / self.block_size;
            let block_offset = (current_offset as u32) % self.block_size;
            let chunk = (self.block_size - block_offset) as usize;
            let chunk = chunk.min(to_write - total);

            let block_index = BlockIndex(inode.first_block_index) + block_number;
            match self.write_block(block_index, block_offset, &buffer[total..total + chunk]) {
                Ok(n) => {
                    total += n;
                    if n < chunk {
                        break;
                    }
                }
                Err(_) if total > 0 => break,
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryIo;
    use crate::options::{MountOptions, VolumeOptions};

    fn fresh_mount() -> Mount<MemoryIo> {
        Mount::create(MemoryIo::new(), VolumeOptions::default(), MountOptions::default()).expect("create volume")
    }

    #[test]
    fn resize_file_grows_and_shrinks_block_range() {
        let mut mount = fresh_mount();
        let mut inode = RawInode::default();

        mount.resize_file(&mut inode, 2000).expect("grow");
        assert_eq!(inode.data_size, 2000);
        assert!(inode.block_count >= 2);

        mount.resize_file(&mut inode, 10).expect("shrink");
        assert_eq!(inode.data_size, 10);
        assert_eq!(inode.block_count, 1);

        mount.resize_file(&mut inode, 0).expect("shrink to empty");
        assert_eq!(inode.data_size, 0);
        assert_eq!(inode.block_count, 0);
    }

    #[test]
    fn write_then_read_file_data_roundtrips() {
        let mut mount = fresh_mount();
        let mut inode = RawInode::default();
        mount.resize_file(&mut inode, 16).expect("resize");

        mount.write_file_data(&inode, 0, b"0123456789abcdef").expect("write");
        let mut out = [0u8; 16];
        let n = mount.read_file_data(&inode, 0, &mut out).expect("read");
        assert_eq!(n, 16);
        assert_eq!(&out, b"0123456789abcdef");
    }

    #[test]
    fn read_file_data_rejects_offset_past_end() {
        let mut mount = fresh_mount();
        let mut inode = RawInode::default();
        mount.resize_file(&mut inode, 4).expect("resize");
        let mut out = [0u8; 1];
        assert!(matches!(
            mount.read_file_data(&inode, 5, &mut out),
            Err(FifError::BadOffset)
        ));
    }
}
