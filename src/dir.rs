//! Directory format: a flat list of (name, inode) entries stored as a directory inode's payload.
//!
//! Grounded on `original_source/src/dir.c`. Directories are always uncompressed, small, regular
//! files as far as block allocation is concerned; this module reads/writes their payload
//! directly through [`Mount::read_file_data`]/[`Mount::write_file_data`]/[`Mount::resize_file`]
//! rather than opening a tracked handle for them — fif's public API never exposes an open
//! directory stream, every directory operation here completes within one call.

use crate::error::{FifError, Result};
use crate::format::{Attributes, DirectoryEntry, DirectoryHeader, InodeIndex, Magic, RawInode};
use crate::io::IoAdapter;
use crate::log::LogLevel;
use crate::time::UnixTimestamp;
use crate::volume::Mount;
use bytemuck::{bytes_of, bytes_of_mut};

const HEADER_SIZE: u32 = core::mem::size_of::<DirectoryHeader>() as u32;
const ENTRY_SIZE: u32 = core::mem::size_of::<DirectoryEntry>() as u32;

impl<IO: IoAdapter> Mount<IO> {
    fn read_directory_header(&mut self, inode: &RawInode) -> Result<DirectoryHeader> {
        let mut header = DirectoryHeader::default();
        let n = self.read_file_data(inode, 0, bytes_of_mut(&mut header))?;
        if n != HEADER_SIZE as usize || header.magic != Magic::DIRECTORY_HEADER.0 {
            self.error_state = true;
            self.log(LogLevel::Error, "bad directory header");
            return Err(FifError::CorruptVolume("bad directory header"));
        }
        Ok(header)
    }

    fn write_directory_header(&mut self, inode: &RawInode, header: &DirectoryHeader) -> Result<()> {
        self.write_file_data(inode, 0, bytes_of(header))?;
        Ok(())
    }

    /// Allocates a new, empty directory inode (hinted near `inode_hint`) and returns its index.
    pub(crate) fn create_directory(&mut self, inode_hint: InodeIndex) -> Result<InodeIndex> {
        self.check_error_state()?;
        let inode_index = self.alloc_inode(inode_hint)?;
        let now = UnixTimestamp::now().0;
        let mut inode = RawInode {
            creation_timestamp: now,
            modification_timestamp: now,
            attributes: Attributes::DIRECTORY.0,
            reference_count: 1,
            ..RawInode::default()
        };

        self.resize_file(&mut inode, HEADER_SIZE)?;
        self.write_inode(inode_index, &inode)?;

        let header = DirectoryHeader {
            magic: Magic::DIRECTORY_HEADER.0,
            file_count: 0,
            max_filename_length: 0,
            first_file_inode: 0,
            last_file_inode: 0,
        };
        self.write_directory_header(&inode, &header)?;
        Ok(inode_index)
    }

    /// Resolves a `/`-separated directory path (relative to the volume root) to an inode index.
    pub(crate) fn resolve_directory_name(&mut self, dirname: &str) -> Result<InodeIndex> {
        if dirname.is_empty() || dirname == "/" {
            return Ok(self.root_inode);
        }

        let mut current = self.root_inode;
        for part in dirname.trim_matches('/').split('/') {
            if part.is_empty() {
                continue;
            }
            let (found, _) = self.find_file_in_directory(current, part)?;
            current = found;
        }
        Ok(current)
    }

    /// Looks up `filename` (case-insensitive, matching `strcasecmp` semantics) within
    /// `directory_inode`'s entry list. Returns the matched inode and its byte offset within the
    /// directory payload.
    pub(crate) fn find_file_in_directory(
        &mut self,
        directory_inode: InodeIndex,
        filename: &str,
    ) -> Result<(InodeIndex, u32)> {
        let inode = self.read_inode(directory_inode)?;
        let header = self.read_directory_header(&inode)?;

        let mut offset = HEADER_SIZE;
        for _ in 0..header.file_count {
            let mut entry = DirectoryEntry::default();
            self.read_file_data(&inode, offset, bytes_of_mut(&mut entry))?;

            let entry_offset = offset;
            offset += ENTRY_SIZE;

            if entry.name_length as usize == filename.len() {
                let mut name_buf = vec![0u8; entry.name_length as usize];
                self.read_file_data(&inode, offset, &mut name_buf)?;
                if name_buf.eq_ignore_ascii_case(filename.as_bytes()) {
                    return Ok((InodeIndex(entry.inode_index), entry_offset));
                }
            }

            offset += entry.name_length;
        }

        Err(FifError::FileNotFound)
    }

    /// Appends `filename` → `file_inode` to `directory_inode`'s entry list, updating the
    /// header's summary fields (`file_count`, `max_filename_length`, first/last file inode
    /// hints).
    pub(crate) fn add_file_to_directory(
        &mut self,
        directory_inode: InodeIndex,
        filename: &str,
        file_inode: InodeIndex,
    ) -> Result<()> {
        self.check_error_state()?;
        let mut inode = self.read_inode(directory_inode)?;
        let mut header = self.read_directory_header(&inode)?;

        let name_len = filename.len() as u32;
        if header.file_count == 0 {
            header.first_file_inode = file_inode.0;
            header.last_file_inode = file_inode.0;
        } else {
            header.first_file_inode = header.first_file_inode.min(file_inode.0);
            header.last_file_inode = header.last_file_inode.max(file_inode.0);
        }
        header.file_count += 1;
        header.max_filename_length = header.max_filename_length.max(name_len);

        self.write_directory_header(&inode, &header)?;

        let old_size = inode.data_size;
        let new_size = old_size + ENTRY_SIZE + name_len;
        self.resize_file(&mut inode, new_size)?;

        let entry = DirectoryEntry {
            name_length: name_len,
            inode_index: file_inode.0,
        };
        self.write_file_data(&inode, old_size, bytes_of(&entry))?;
        self.write_file_data(&inode, old_size + ENTRY_SIZE, filename.as_bytes())?;

        self.write_inode(directory_inode, &inode)?;
        Ok(())
    }

    /// Removes the entry named `filename` from `directory_inode`, shifting the remaining tail
    /// down and truncating. Matches the original's behavior of *not* recomputing the
    /// first/last-file-inode hints on removal — they are advisory, not load-bearing.
    pub(crate) fn remove_file_from_directory(
        &mut self,
        directory_inode: InodeIndex,
        filename: &str,
    ) -> Result<()> {
        self.check_error_state()?;
        let (_, entry_offset) = self.find_file_in_directory(directory_inode, filename)?;
        let mut inode = self.read_inode(directory_inode)?;
        let mut header = self.read_directory_header(&inode)?;

        let mut entry = DirectoryEntry::default();
        self.read_file_data(&inode, entry_offset, bytes_of_mut(&mut entry))?;
        let removed_size = ENTRY_SIZE + entry.name_length;
        let tail_start = entry_offset + removed_size;
        let tail_len = inode.data_size - tail_start;

        if tail_len > 0 {
            let mut tail = vec![0u8; tail_len as usize];
            self.read_file_data(&inode, tail_start, &mut tail)?;
            self.write_file_data(&inode, entry_offset, &tail)?;
        }

        header.file_count -= 1;
        self.write_directory_header(&inode, &header)?;

        let new_size = inode.data_size - removed_size;
        self.resize_file(&mut inode, new_size)?;
        self.write_inode(directory_inode, &inode)?;
        Ok(())
    }

    /// Invokes `callback(name, inode_index)` once per entry, stopping early if it returns
    /// `false`.
    pub(crate) fn enumdir(
        &mut self,
        directory_inode: InodeIndex,
        mut callback: impl FnMut(&str, InodeIndex) -> bool,
    ) -> Result<()> {
        let inode = self.read_inode(directory_inode)?;
        let header = self.read_directory_header(&inode)?;

        let mut offset = HEADER_SIZE;
        for _ in 0..header.file_count {
            let mut entry = DirectoryEntry::default();
            self.read_file_data(&inode, offset, bytes_of_mut(&mut entry))?;
            offset += ENTRY_SIZE;

            let mut name_buf = vec![0u8; entry.name_length as usize];
            self.read_file_data(&inode, offset, &mut name_buf)?;
            offset += entry.name_length;

            let name = String::from_utf8_lossy(&name_buf);
            if !callback(&name, InodeIndex(entry.inode_index)) {
                break;
            }
        }
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
    fn add_then_find_then_remove_roundtrips() {
        let mut mount = fresh_mount();
        let root = mount.root_inode;
        let file_inode = mount.alloc_inode(root).expect("alloc");

        mount.add_file_to_directory(root, "hello.txt", file_inode).expect("add");
        let (found, _) = mount.find_file_in_directory(root, "hello.txt").expect("find");
        assert_eq!(found, file_inode);

        // lookup matches case-insensitively, like strcasecmp
        let (found_upper, _) = mount.find_file_in_directory(root, "HELLO.TXT").expect("find case-insensitive");
        assert_eq!(found_upper, file_inode);

        mount.remove_file_from_directory(root, "hello.txt").expect("remove");
        assert!(matches!(
            mount.find_file_in_directory(root, "hello.txt"),
            Err(FifError::FileNotFound)
        ));
    }

    #[test]
    fn enumdir_visits_every_entry() {
        let mut mount = fresh_mount();
        let root = mount.root_inode;
        for name in ["a", "b", "c"] {
            let inode = mount.alloc_inode(root).expect("alloc");
            mount.add_file_to_directory(root, name, inode).expect("add");
        }

        let mut seen = Vec::new();
        mount
            .enumdir(root, |name, _| {
                seen.push(name.to_string());
                true
            })
            .expect("enumdir");
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn enumdir_stops_early_when_callback_returns_false() {
        let mut mount = fresh_mount();
        let root = mount.root_inode;
        for name in ["a", "b", "c"] {
            let inode = mount.alloc_inode(root).expect("alloc");
            mount.add_file_to_directory(root, name, inode).expect("add");
        }

        let mut count = 0;
        mount
            .enumdir(root, |_, _| {
                count += 1;
                false
            })
            .expect("enumdir");
        assert_eq!(count, 1);
    }
}
