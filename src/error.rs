//! Crate-wide error type.
//!
//! One variant per code in `FIF_ERROR` (`fif_types.h`), plus an `Io` variant carrying adapter
//! failures (`std::io::Error`) across the one external boundary this crate has.

use thiserror::Error;

/// Everything that can go wrong operating on a mounted volume.
#[derive(Debug, Error)]
pub enum FifError {
    #[error("bad path: {0}")]
    BadPath(String),

    #[error("file not found")]
    FileNotFound,

    #[error("end of file")]
    EndOfFile,

    #[error("no more files")]
    NoMoreFiles,

    #[error("bad offset")]
    BadOffset,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("already exists")]
    AlreadyExists,

    #[error("out of memory")]
    OutOfMemory,

    #[error("volume is read-only")]
    ReadOnly,

    #[error("corrupt volume: {0}")]
    CorruptVolume(&'static str),

    #[error("insufficient space")]
    InsufficientSpace,

    #[error("sharing violation")]
    SharingViolation,

    #[error("compressor not found")]
    CompressorNotFound,

    #[error("compressor error: {0}")]
    CompressorError(&'static str),

    #[error("generic error: {0}")]
    Generic(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, FifError>;
