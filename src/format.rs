//! On-disk structures for the fif volume format.
//!
//! All layouts below mirror `fif_format.h` field-for-field: the descriptor at block 0, the
//! packed 64-byte inode, the directory header/entry pair, and the free-block header. Every
//! struct derives [`bytemuck::Pod`]/[`bytemuck::Zeroable`] so a block buffer can be cast
//! directly to/from the wire representation without a manual (de)serializer.

use bytemuck::{Pod, Zeroable};
use core::fmt;
use core::ops::{Add, Sub};

/// A 4-byte magic number used to sanity-check a structure read off disk.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(transparent)]
pub struct Magic(pub u32);

impl Magic {
    pub const VOLUME_HEADER: Self = Self(0x1122_3344);
    pub const INODE_TABLE_HEADER: Self = Self(0x4455_6677);
    pub const DIRECTORY_HEADER: Self = Self(0x7788_9900);
    pub const FRAGMENTATION_HEADER: Self = Self(0x00AA_BBCC);
    pub const FREEBLOCK_HEADER: Self = Self(0xCCDD_EEFF);
}

/// Index of a block within the volume's linear block space. Block 0 is always the descriptor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct BlockIndex(pub u32);

impl BlockIndex {
    pub const ZERO: Self = Self(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u32> for BlockIndex {
    type Output = Self;
    fn add(self, rhs: u32) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub<u32> for BlockIndex {
    type Output = Self;
    fn sub(self, rhs: u32) -> Self {
        Self(self.0 - rhs)
    }
}

/// Number of contiguous blocks, used both for free extents and file payloads.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct BlockCount(pub u32);

impl fmt::Display for BlockCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of an inode within the volume's flat inode-table chain. Inode 0 is reserved (every
/// inode table's slot 0 is its own descriptor, never a real file).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct InodeIndex(pub u32);

impl InodeIndex {
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for InodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inode attribute bits (`FIF_FILE_ATTRIBUTE`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(transparent)]
pub struct Attributes(pub u32);

impl Attributes {
    pub const NONE: Self = Self(0);
    pub const FREE_INODE: Self = Self(1 << 0);
    pub const FILE: Self = Self(1 << 1);
    pub const DIRECTORY: Self = Self(1 << 2);
    pub const SMALL_FILE: Self = Self(1 << 3);
    pub const COMPRESSED: Self = Self(1 << 4);
    pub const FRAGMENTED: Self = Self(1 << 5);

    pub fn contains(self, bit: Self) -> bool {
        (self.0 & bit.0) == bit.0
    }
}

impl core::ops::BitOr for Attributes {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitAnd for Attributes {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl core::ops::BitOrAssign for Attributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl core::ops::BitAndAssign for Attributes {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl core::ops::Not for Attributes {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// `FIF_COMPRESSION_ALGORITHM`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(transparent)]
pub struct CompressionAlgorithm(pub u32);

impl CompressionAlgorithm {
    pub const NONE: Self = Self(0);
    pub const ZLIB: Self = Self(1);
    pub const LZMA: Self = Self(2);
}

/// The volume descriptor, always stored at block 0. `fif_volume_write_descriptor` rewrites this
/// whole structure any time a superblock-level counter changes; it is the sole durability hook.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct VolumeHeader {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub block_count: u32,
    pub smallfile_size: u32,
    pub hash_table_size: u32,
    pub inode_table_count: u32,
    pub free_block_count: u32,
    pub free_inode_count: u32,
    pub first_inode_table_block: u32,
    pub last_inode_table_block: u32,
    pub first_free_inode: u32,
    pub last_free_inode: u32,
    pub first_free_block: u32,
    pub last_free_block: u32,
    pub root_inode: u32,
}

impl VolumeHeader {
    pub const CURRENT_VERSION: u32 = 1;
}

/// A single on-disk inode, `I = 64` bytes wide. Slot 0 of every inode table doubles as that
/// table's descriptor (`next_entry` chains to the next table's global inode index, `attributes`
/// stays zero) rather than describing a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct RawInode {
    pub creation_timestamp: u64,
    pub modification_timestamp: u64,
    pub attributes: u32,
    pub reference_count: u32,
    pub next_entry: u32,
    pub compression_algorithm: u32,
    pub compression_level: u32,
    pub uncompressed_size: u32,
    pub data_size: u32,
    pub checksum: u32,
    pub first_block_index: u32,
    pub block_count: u32,
    pub _padding: [u8; 8],
}

const _: () = assert!(core::mem::size_of::<RawInode>() == 64);

/// Header of the flat directory-entry-list format, stored as the payload of a directory inode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DirectoryHeader {
    pub magic: u32,
    pub file_count: u32,
    pub max_filename_length: u32,
    pub first_file_inode: u32,
    pub last_file_inode: u32,
}

/// One directory entry: a fixed-size header immediately followed by `name_length` raw name
/// bytes (no padding, no trailing NUL on disk).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DirectoryEntry {
    pub name_length: u32,
    pub inode_index: u32,
}

/// Header of a free-extent run, written in place at the start of that run's first block.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FreeBlockHeader {
    pub magic: u32,
    pub block_count: u32,
    pub next_free_block: u32,
}

/// Reserved, unused by the current format revision.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FragmentationHeader {
    pub magic: u32,
    pub fragment_count: u32,
}
