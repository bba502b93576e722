//! Volume-creation and mount-time options.
//!
//! Field names and defaults mirror `fif_set_default_volume_options`/
//! `fif_set_default_mount_options` in `original_source/src/mount.c` exactly.

use crate::format::CompressionAlgorithm;

/// Parameters fixed at volume-creation time and baked into the descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VolumeOptions {
    pub block_size: u32,
    pub smallfile_size: u32,
    pub hash_table_size: u32,
    pub inode_table_count: u32,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            block_size: 1024,
            smallfile_size: 64,
            hash_table_size: 512,
            inode_table_count: 4,
        }
    }
}

/// Parameters chosen when mounting an existing volume; these do not affect the on-disk layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MountOptions {
    pub block_cache_size: u32,
    pub read_only: bool,
    pub new_file_compression_algorithm: CompressionAlgorithm,
    pub new_file_compression_level: u32,
    pub fragmentation_threshold: u32,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            block_cache_size: 0,
            read_only: false,
            new_file_compression_algorithm: CompressionAlgorithm::NONE,
            new_file_compression_level: 0,
            fragmentation_threshold: 128,
        }
    }
}
