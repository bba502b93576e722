//! Inode tables and the inode allocator.
//!
//! Grounded on `original_source/src/inode.c`. Inodes live in fixed-size tables, one block each;
//! slot 0 of every table doubles as that table's descriptor (its `next_entry` chains to the
//! *block index* of the next table) while slots 1.. are real inode slots, threaded onto a
//! separate free-inode singly-linked list through their own `next_entry` (there it holds the
//! *global inode index* of the next free slot).

use crate::error::{FifError, Result};
use crate::format::{Attributes, BlockIndex, InodeIndex, RawInode};
use crate::io::IoAdapter;
use crate::log::LogLevel;
use crate::volume::Mount;
use bytemuck::{bytes_of, bytes_of_mut};

const INODE_SIZE: u32 = core::mem::size_of::<RawInode>() as u32;

impl<IO: IoAdapter> Mount<IO> {
    fn locate_inode(&mut self, inode_index: InodeIndex) -> Result<(BlockIndex, u32)> {
        let mut table_block = self.first_inode_table_block;
        let mut remaining = inode_index.0;
        loop {
            if table_block.is_zero() {
                self.error_state = true;
                self.log(LogLevel::Error, "inode index beyond table chain");
                return Err(FifError::CorruptVolume("inode index beyond table chain"));
            }
            if remaining < self.inodes_per_table {
                return Ok((table_block, remaining));
            }
            remaining -= self.inodes_per_table;
            let descriptor = self.read_inode_slot(table_block, 0)?;
            table_block = BlockIndex(descriptor.next_entry);
        }
    }

    fn read_inode_slot(&mut self, table_block: BlockIndex, slot: u32) -> Result<RawInode> {
        let mut raw = RawInode::default();
        self.read_block(table_block, slot * INODE_SIZE, bytes_of_mut(&mut raw))?;
        Ok(raw)
    }

    fn write_inode_slot(&mut self, table_block: BlockIndex, slot: u32, inode: &RawInode) -> Result<()> {
        self.write_block(table_block, slot * INODE_SIZE, bytes_of(inode))?;
        Ok(())
    }

    /// Reads the inode at `inode_index`.
    pub(crate) fn read_inode(&mut self, inode_index: InodeIndex) -> Result<RawInode> {
        let (table_block, slot) = self.locate_inode(inode_index)?;
        self.read_inode_slot(table_block, slot)
    }

    /// Writes `inode` back to `inode_index`.
    pub(crate) fn write_inode(&mut self, inode_index: InodeIndex, inode: &RawInode) -> Result<()> {
        let (table_block, slot) = self.locate_inode(inode_index)?;
        self.write_inode_slot(table_block, slot, inode)
    }

    /// Allocates a fresh inode table (one block), threads its slots onto the free-inode list,
    /// and appends it to the inode-table chain.
    pub(crate) fn alloc_inode_table(&mut self) -> Result<BlockIndex> {
        self.check_error_state()?;
        let table_block = self.alloc_blocks(BlockIndex::ZERO, 1)?;
        let ordinal = self.inode_table_count;
        let global_base = ordinal * self.inodes_per_table;

        let descriptor = RawInode::default();
        self.write_inode_slot(table_block, 0, &descriptor)?;

        for slot in 1..self.inodes_per_table {
            let next_entry = if slot == self.inodes_per_table - 1 {
                0
            } else {
                global_base + slot + 1
            };
            let slot_inode = RawInode {
                attributes: Attributes::FREE_INODE.0,
                next_entry,
                ..RawInode::default()
            };
            self.write_inode_slot(table_block, slot, &slot_inode)?;
        }

        let new_head = InodeIndex(global_base + 1);
        let new_tail = InodeIndex(global_base + self.inodes_per_table - 1);

        if self.first_free_inode.is_none() {
            self.first_free_inode = new_head;
            self.last_free_inode = new_tail;
        } else {
            let mut tail_inode = self.read_inode(self.last_free_inode)?;
            tail_inode.next_entry = new_head.0;
            self.write_inode(self.last_free_inode, &tail_inode)?;
            self.last_free_inode = new_tail;
        }

        if self.first_inode_table_block.is_zero() {
            self.first_inode_table_block = table_block;
            self.last_inode_table_block = table_block;
        } else {
            let mut tail_descriptor = self.read_inode_slot(self.last_inode_table_block, 0)?;
            tail_descriptor.next_entry = table_block.0;
            self.write_inode_slot(self.last_inode_table_block, 0, &tail_descriptor)?;
            self.last_inode_table_block = table_block;
        }

        self.inode_table_count += 1;
        self.free_inode_count += self.inodes_per_table - 1;
        self.write_descriptor()?;
        Ok(table_block)
    }

    fn unlink_free_inode(&mut self, found: InodeIndex, prev: InodeIndex) -> Result<()> {
        let found_inode = self.read_inode(found)?;
        let next = InodeIndex(found_inode.next_entry);
        if prev.is_none() {
            self.first_free_inode = next;
        } else {
            let mut prev_inode = self.read_inode(prev)?;
            prev_inode.next_entry = next.0;
            self.write_inode(prev, &prev_inode)?;
        }
        if self.last_free_inode == found {
            self.last_free_inode = prev;
        }
        self.free_inode_count -= 1;
        self.write_descriptor()
    }

    /// Allocates an inode, preferring the free slot closest to `inode_hint` (`InodeIndex::NONE`
    /// takes the head of the free list without searching). Grows the inode-table chain when the
    /// free list is empty.
    pub(crate) fn alloc_inode(&mut self, inode_hint: InodeIndex) -> Result<InodeIndex> {
        self.check_error_state()?;
        if !self.first_free_inode.is_none() {
            if inode_hint.is_none() {
                let found = self.first_free_inode;
                self.unlink_free_inode(found, InodeIndex::NONE)?;
                return Ok(found);
            }

            let mut prev = InodeIndex::NONE;
            let mut current = self.first_free_inode;
            let mut best: Option<(InodeIndex, InodeIndex)> = None;
            let mut best_distance = u64::MAX;

            while !current.is_none() {
                let distance = (i64::from(current.0) - i64::from(inode_hint.0)).unsigned_abs();
                if distance < best_distance {
                    best_distance = distance;
                    best = Some((current, prev));
                }
                let inode = self.read_inode(current)?;
                prev = current;
                current = InodeIndex(inode.next_entry);
            }

            let (found, found_prev) = best.expect("free-inode list traversed but empty");
            self.unlink_free_inode(found, found_prev)?;
            return Ok(found);
        }

        self.alloc_inode_table()?;
        let found = self.first_free_inode;
        self.first_free_inode = InodeIndex(found.0 + 1);
        self.free_inode_count -= 1;
        self.write_descriptor()?;
        Ok(found)
    }

    /// Returns an inode to the free list, keeping the list sorted by index so later scans
    /// terminate early. Unlike the original (which bumps `last_free_inode` unconditionally here),
    /// this increments `free_inode_count`, which is the counter this list's length is reflected in.
    pub(crate) fn free_inode(&mut self, inode_index: InodeIndex) -> Result<()> {
        self.check_error_state()?;
        let mut inode = self.read_inode(inode_index)?;
        inode.attributes = Attributes::FREE_INODE.0;
        inode.reference_count = 0;

        if self.first_free_inode.is_none() || inode_index.0 < self.first_free_inode.0 {
            inode.next_entry = self.first_free_inode.0;
            self.write_inode(inode_index, &inode)?;
            let was_empty = self.first_free_inode.is_none();
            self.first_free_inode = inode_index;
            if was_empty {
                self.last_free_inode = inode_index;
            }
        } else {
            let mut current = self.first_free_inode;
            loop {
                let current_inode = self.read_inode(current)?;
                if current_inode.next_entry == 0 || current_inode.next_entry > inode_index.0 {
                    inode.next_entry = current_inode.next_entry;
                    self.write_inode(inode_index, &inode)?;

                    let mut current_inode = current_inode;
                    current_inode.next_entry = inode_index.0;
                    self.write_inode(current, &current_inode)?;

                    if self.last_free_inode == current {
                        self.last_free_inode = inode_index;
                    }
                    break;
                }
                current = InodeIndex(current_inode.next_entry);
            }
        }

        self.free_inode_count += 1;
        self.write_descriptor()?;
        Ok(())
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
    fn alloc_inode_roundtrips_free_count() {
        let mut mount = fresh_mount();
        let before = mount.free_inode_count;
        let index = mount.alloc_inode(InodeIndex::NONE).expect("alloc");
        assert_eq!(mount.free_inode_count, before - 1);
        mount.free_inode(index).expect("free");
        assert_eq!(mount.free_inode_count, before);
    }

    #[test]
    fn alloc_inode_grows_table_chain_when_free_list_is_empty() {
        let mut mount = fresh_mount();
        let per_table = mount.inodes_per_table;
        let tables_before = mount.inode_table_count;

        // drain every free slot from the existing tables
        let mut allocated = Vec::new();
        while mount.free_inode_count > 0 {
            allocated.push(mount.alloc_inode(InodeIndex::NONE).expect("alloc"));
        }
        assert_eq!(allocated.len() as u32, tables_before * (per_table - 1));

        // one more allocation must grow the chain
        let extra = mount.alloc_inode(InodeIndex::NONE).expect("alloc beyond tables");
        assert_eq!(mount.inode_table_count, tables_before + 1);
        assert!(!extra.is_none());
    }

    #[test]
    fn freed_inode_is_reused() {
        let mut mount = fresh_mount();
        let a = mount.alloc_inode(InodeIndex::NONE).expect("alloc a");
        mount.free_inode(a).expect("free a");
        let b = mount.alloc_inode(InodeIndex::NONE).expect("alloc b");
        assert_eq!(a, b);
    }
}
