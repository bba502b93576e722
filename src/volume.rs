//! The `Mount<IO>` type: its field layout, create/mount/unmount lifecycle, and the path-based
//! public façade (`open`, `unlink`, `mkdir`, `rmdir`, `stat`, `enumdir`, ...).
//!
//! Grounded on `original_source/src/mount.c` (`fif_create_volume`, `fif_mount_volume`,
//! `fif_unmount_volume`, `fif_volume_write_descriptor`, `finalize_mount_structure`) and the
//! `struct fif_mount_s` layout in `fif_internal.h`. `Mount<IO>` is a plain `&mut self` struct
//! rather than an `Arc<RwLock<...>>`-wrapped one: this engine's concurrency model is
//! single-threaded and non-reentrant, so there is nothing to synchronize.

use crate::error::{FifError, Result};
use crate::format::{Attributes, BlockIndex, CompressionAlgorithm, InodeIndex, Magic, RawInode, VolumeHeader};
use crate::handle::{FileHandle, FileInfo, OpenFile, OpenMode};
use crate::io::{IoAdapter, SeekMode};
use crate::log::{LogCallback, LogLevel};
use crate::options::{MountOptions, VolumeOptions};
use crate::path::{canonicalize, split_dirbase};
use bytemuck::{bytes_of, bytes_of_mut};

/// A mounted fif volume over a backing [`IoAdapter`].
pub struct Mount<IO: IoAdapter> {
    pub(crate) io: IO,
    pub(crate) log_callback: Option<LogCallback>,
    pub(crate) read_only: bool,
    pub(crate) error_state: bool,

    pub(crate) block_cache_size: u32,
    pub(crate) new_file_compression_algorithm: CompressionAlgorithm,
    pub(crate) new_file_compression_level: u32,
    pub(crate) fragmentation_threshold: u32,

    pub(crate) block_size: u32,
    pub(crate) smallfile_size: u32,
    pub(crate) hash_table_size: u32,
    pub(crate) block_count: u32,
    pub(crate) inode_table_count: u32,
    pub(crate) free_block_count: u32,
    pub(crate) free_inode_count: u32,
    pub(crate) first_inode_table_block: BlockIndex,
    pub(crate) last_inode_table_block: BlockIndex,
    pub(crate) first_free_inode: InodeIndex,
    pub(crate) last_free_inode: InodeIndex,
    pub(crate) first_free_block: BlockIndex,
    pub(crate) last_free_block: BlockIndex,
    pub(crate) root_inode: InodeIndex,
    pub(crate) inodes_per_table: u32,

    pub(crate) open_files: Vec<Option<OpenFile>>,
}

fn inodes_per_table(block_size: u32) -> u32 {
    block_size / core::mem::size_of::<RawInode>() as u32
}

impl<IO: IoAdapter> Mount<IO> {
    fn descriptor(&self) -> VolumeHeader {
        VolumeHeader {
            magic: Magic::VOLUME_HEADER.0,
            version: VolumeHeader::CURRENT_VERSION,
            block_size: self.block_size,
            block_count: self.block_count,
            smallfile_size: self.smallfile_size,
            hash_table_size: self.hash_table_size,
            inode_table_count: self.inode_table_count,
            free_block_count: self.free_block_count,
            free_inode_count: self.free_inode_count,
            first_inode_table_block: self.first_inode_table_block.0,
            last_inode_table_block: self.last_inode_table_block.0,
            first_free_inode: self.first_free_inode.0,
            last_free_inode: self.last_free_inode.0,
            first_free_block: self.first_free_block.0,
            last_free_block: self.last_free_block.0,
            root_inode: self.root_inode.0,
        }
    }

    /// Short-circuits a mutating call once the volume has been marked corrupt. Every allocator,
    /// inode, and directory mutation checks this first, matching the poison latch `mount->error_state`
    /// guards in the original.
    pub(crate) fn check_error_state(&self) -> Result<()> {
        if self.error_state {
            return Err(FifError::CorruptVolume("volume is marked corrupt"));
        }
        Ok(())
    }

    /// Rewrites the block-0 descriptor. Called any time a superblock-level counter changes; the
    /// sole durability hook for volume metadata.
    pub(crate) fn write_descriptor(&mut self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let header = self.descriptor();
        self.write_block(BlockIndex::ZERO, 0, bytes_of(&header))?;
        Ok(())
    }

    /// Formats a fresh volume over `io`, matching `fif_create_volume`: lay out the descriptor
    /// block, allocate `volume_options.inode_table_count` inode tables, and create the root
    /// directory.
    pub fn create(mut io: IO, volume_options: VolumeOptions, mount_options: MountOptions) -> Result<Self> {
        io.ftruncate(u64::from(volume_options.block_size))?;

        let mut mount = Self {
            io,
            log_callback: None,
            read_only: mount_options.read_only,
            error_state: false,
            block_cache_size: mount_options.block_cache_size,
            new_file_compression_algorithm: mount_options.new_file_compression_algorithm,
            new_file_compression_level: mount_options.new_file_compression_level,
            fragmentation_threshold: mount_options.fragmentation_threshold,
            block_size: volume_options.block_size,
            smallfile_size: volume_options.smallfile_size,
            hash_table_size: volume_options.hash_table_size,
            block_count: 1,
            inode_table_count: 0,
            free_block_count: 0,
            free_inode_count: 0,
            first_inode_table_block: BlockIndex::ZERO,
            last_inode_table_block: BlockIndex::ZERO,
            first_free_inode: InodeIndex::NONE,
            last_free_inode: InodeIndex::NONE,
            first_free_block: BlockIndex::ZERO,
            last_free_block: BlockIndex::ZERO,
            root_inode: InodeIndex::NONE,
            inodes_per_table: inodes_per_table(volume_options.block_size),
            open_files: Vec::new(),
        };

        for _ in 0..volume_options.inode_table_count {
            mount.alloc_inode_table()?;
        }

        mount.root_inode = mount.create_directory(InodeIndex::NONE)?;
        mount.write_descriptor()?;
        Ok(mount)
    }

    /// Mounts an existing volume, matching `fif_mount_volume`: read the block-0 descriptor,
    /// verify its magic, and populate the in-memory superblock fields from it.
    pub fn mount(mut io: IO, options: MountOptions) -> Result<Self> {
        io.seek(0, SeekMode::Set)?;
        let mut header = VolumeHeader::default();
        io.read(bytes_of_mut(&mut header))?;
        if header.magic != Magic::VOLUME_HEADER.0 {
            crate::log::emit(None, LogLevel::Error, "bad volume descriptor magic");
            return Err(FifError::CorruptVolume("bad volume descriptor magic"));
        }

        Ok(Self {
            io,
            log_callback: None,
            read_only: options.read_only,
            error_state: false,
            block_cache_size: options.block_cache_size,
            new_file_compression_algorithm: options.new_file_compression_algorithm,
            new_file_compression_level: options.new_file_compression_level,
            fragmentation_threshold: options.fragmentation_threshold,
            block_size: header.block_size,
            smallfile_size: header.smallfile_size,
            hash_table_size: header.hash_table_size,
            block_count: header.block_count,
            inode_table_count: header.inode_table_count,
            free_block_count: header.free_block_count,
            free_inode_count: header.free_inode_count,
            first_inode_table_block: BlockIndex(header.first_inode_table_block),
            last_inode_table_block: BlockIndex(header.last_inode_table_block),
            first_free_inode: InodeIndex(header.first_free_inode),
            last_free_inode: InodeIndex(header.last_free_inode),
            first_free_block: BlockIndex(header.first_free_block),
            last_free_block: BlockIndex(header.last_free_block),
            root_inode: InodeIndex(header.root_inode),
            inodes_per_table: inodes_per_table(header.block_size),
            open_files: Vec::new(),
        })
    }

    /// Closes every still-open handle and, unless the volume is read-only, flushes the
    /// descriptor one last time.
    pub fn unmount(mut self) -> Result<()> {
        let open: Vec<usize> = self
            .open_files
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.is_some().then_some(index))
            .collect();
        for index in open {
            self.close(FileHandle(index))?;
        }
        if !self.read_only {
            self.write_descriptor()?;
        }
        Ok(())
    }

    /// Registers (or clears, with `None`) a callback invoked alongside the `log` facade for
    /// every diagnostic this volume emits.
    pub fn set_log_callback(&mut self, callback: Option<LogCallback>) {
        self.log_callback = callback;
    }

    pub(crate) fn log(&mut self, level: LogLevel, message: &str) {
        crate::log::emit(self.log_callback.as_mut(), level, message);
    }

    /// Opens (optionally creating) the file or directory at `path`.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle> {
        self.check_error_state()?;
        match self.resolve_file_name(path) {
            // already exists; CREATE without an explicit exclusivity flag just opens it
            Ok((inode_index, _)) => self.open_file_by_inode(inode_index, mode),
            Err(FifError::FileNotFound) if mode.contains(OpenMode::CREATE) => {
                let canonical = canonicalize(path)?;
                let (dirname, basename) = split_dirbase(&canonical);
                let directory_inode = self.resolve_directory_name(dirname.unwrap_or(""))?;

                let inode_index = if mode.contains(OpenMode::DIRECTORY) {
                    let new_dir = self.create_directory(directory_inode)?;
                    if let Err(err) = self.add_file_to_directory(directory_inode, basename, new_dir) {
                        let _ = self.free_inode(new_dir);
                        return Err(err);
                    }
                    new_dir
                } else {
                    self.create_file(basename, directory_inode)?
                };

                self.open_file_by_inode(inode_index, mode)
            }
            Err(err) => Err(err),
        }
    }

    /// Removes a regular file. Returns [`FifError::DirectoryNotEmpty`]'s sibling error via
    /// `rmdir` if `path` names a directory — use `rmdir` for those instead.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        self.check_error_state()?;
        let (inode_index, directory_inode) = self.resolve_file_name(path)?;
        let mut inode = self.read_inode(inode_index)?;
        if Attributes(inode.attributes).contains(Attributes::DIRECTORY) {
            return Err(FifError::FileNotFound);
        }

        let (_, basename) = split_dirbase(&canonicalize(path)?);
        self.remove_file_from_directory(directory_inode, basename)?;
        self.free_file_blocks(&mut inode)?;
        self.free_inode(inode_index)
    }

    /// Creates an empty directory at `path`.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.check_error_state()?;
        let canonical = canonicalize(path)?;
        let (dirname, basename) = split_dirbase(&canonical);
        if basename.is_empty() {
            return Err(FifError::BadPath(path.to_string()));
        }
        let directory_inode = self.resolve_directory_name(dirname.unwrap_or(""))?;
        if self.find_file_in_directory(directory_inode, basename).is_ok() {
            return Err(FifError::AlreadyExists);
        }

        let new_dir = self.create_directory(directory_inode)?;
        if let Err(err) = self.add_file_to_directory(directory_inode, basename, new_dir) {
            let _ = self.free_inode(new_dir);
            return Err(err);
        }
        Ok(())
    }

    /// Removes an empty directory at `path`.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        self.check_error_state()?;
        let (inode_index, directory_inode) = self.resolve_file_name(path)?;
        let mut inode = self.read_inode(inode_index)?;
        if !Attributes(inode.attributes).contains(Attributes::DIRECTORY) {
            return Err(FifError::FileNotFound);
        }

        let mut has_entries = false;
        self.enumdir(inode_index, |_, _| {
            has_entries = true;
            false
        })?;
        if has_entries {
            return Err(FifError::DirectoryNotEmpty);
        }

        let (_, basename) = split_dirbase(&canonicalize(path)?);
        self.remove_file_from_directory(directory_inode, basename)?;
        self.free_file_blocks(&mut inode)?;
        self.free_inode(inode_index)
    }

    /// Returns metadata for the file or directory at `path`, without opening it.
    pub fn stat(&mut self, path: &str) -> Result<FileInfo> {
        self.check_error_state()?;
        let (inode_index, _) = self.resolve_file_name(path)?;
        let inode = self.read_inode(inode_index)?;
        Ok(FileInfo::from_inode(&inode))
    }

    /// Invokes `callback(name, is_directory)` once per entry of the directory at `path`.
    pub fn readdir(&mut self, path: &str, mut callback: impl FnMut(&str, bool) -> bool) -> Result<()> {
        self.check_error_state()?;
        let directory_inode = self.resolve_directory_name(path.trim_start_matches('/'))?;

        let mut entries = Vec::new();
        self.enumdir(directory_inode, |name, inode_index| {
            entries.push((name.to_string(), inode_index));
            true
        })?;

        for (name, inode_index) in entries {
            let inode = self.read_inode(inode_index)?;
            let is_directory =
                Attributes(inode.attributes).contains(Attributes::DIRECTORY);
            if !callback(&name, is_directory) {
                break;
            }
        }
        Ok(())
    }

    /// Reads an entire file's contents into memory.
    pub fn get_file_contents(&mut self, path: &str) -> Result<Vec<u8>> {
        let handle = self.open(path, OpenMode::READ | OpenMode::FULLY_BUFFERED)?;
        let info = self.fstat(handle)?;
        let mut buffer = vec![0u8; info.size as usize];
        let mut total = 0usize;
        while total < buffer.len() {
            let n = self.read(handle, &mut buffer[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buffer.truncate(total);
        self.close(handle)?;
        Ok(buffer)
    }

    /// Overwrites (creating if necessary) a file's entire contents.
    pub fn put_file_contents(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let mode = OpenMode::CREATE | OpenMode::WRITE | OpenMode::TRUNCATE | OpenMode::FULLY_BUFFERED;
        let handle = self.open(path, mode)?;
        self.write(handle, data)?;
        self.close(handle)
    }

    /// fif never supported recompressing an already-open file in place; this mirrors that.
    pub fn compress_file(&mut self, _path: &str, _algorithm: CompressionAlgorithm, _level: u32) -> Result<()> {
        Err(FifError::Generic("in-place recompression is not supported"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::OpenMode;
    use crate::io::MemoryIo;

    fn fresh_mount() -> Mount<MemoryIo> {
        Mount::create(MemoryIo::new(), VolumeOptions::default(), MountOptions::default()).expect("create volume")
    }

    #[test]
    fn mkdir_then_readdir_lists_the_new_directory() {
        let mut mount = fresh_mount();
        mount.mkdir("/docs").expect("mkdir");

        let mut entries = Vec::new();
        mount
            .readdir("/", |name, is_directory| {
                entries.push((name.to_string(), is_directory));
                true
            })
            .expect("readdir");
        assert_eq!(entries, vec![("docs".to_string(), true)]);
    }

    #[test]
    fn mkdir_twice_fails_with_already_exists() {
        let mut mount = fresh_mount();
        mount.mkdir("/docs").expect("first mkdir");
        assert!(matches!(mount.mkdir("/docs"), Err(FifError::AlreadyExists)));
    }

    #[test]
    fn rmdir_rejects_non_empty_directory() {
        let mut mount = fresh_mount();
        mount.mkdir("/docs").expect("mkdir");
        mount.put_file_contents("/docs/a.txt", b"hi").expect("put");
        assert!(matches!(mount.rmdir("/docs"), Err(FifError::DirectoryNotEmpty)));
    }

    #[test]
    fn rmdir_removes_empty_directory() {
        let mut mount = fresh_mount();
        mount.mkdir("/docs").expect("mkdir");
        mount.rmdir("/docs").expect("rmdir");
        assert!(matches!(mount.stat("/docs"), Err(FifError::FileNotFound)));
    }

    #[test]
    fn unlink_removes_a_file_but_not_a_directory() {
        let mut mount = fresh_mount();
        mount.put_file_contents("/a.txt", b"hi").expect("put");
        mount.mkdir("/docs").expect("mkdir");

        assert!(matches!(mount.unlink("/docs"), Err(FifError::FileNotFound)));
        mount.unlink("/a.txt").expect("unlink file");
        assert!(matches!(mount.stat("/a.txt"), Err(FifError::FileNotFound)));
    }

    #[test]
    fn volume_survives_unmount_and_remount() {
        let mut mount = fresh_mount();
        mount.put_file_contents("/a.txt", b"persisted").expect("put");
        mount.mkdir("/docs").expect("mkdir");
        let io = mount.io.clone();
        mount.unmount().expect("unmount");

        let mut remounted = Mount::mount(io, MountOptions::default()).expect("remount");
        let contents = remounted.get_file_contents("/a.txt").expect("get");
        assert_eq!(contents, b"persisted");

        let mut saw_docs = false;
        remounted
            .readdir("/", |name, is_directory| {
                if name == "docs" && is_directory {
                    saw_docs = true;
                }
                true
            })
            .expect("readdir");
        assert!(saw_docs);
    }

    #[test]
    fn open_for_write_twice_without_create_is_a_sharing_violation() {
        let mut mount = fresh_mount();
        mount.put_file_contents("/a.txt", b"hi").expect("put");

        let first = mount
            .open("/a.txt", OpenMode::WRITE | OpenMode::FULLY_BUFFERED)
            .expect("first open");
        let second = mount.open("/a.txt", OpenMode::WRITE | OpenMode::FULLY_BUFFERED);
        assert!(matches!(second, Err(FifError::SharingViolation)));
        mount.close(first).expect("close");
    }
}
