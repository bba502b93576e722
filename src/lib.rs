//! `fif` is an embeddable file-in-a-file archive engine: a small POSIX-ish filesystem that lives
//! entirely inside one host-provided byte stream (a file, a memory buffer, a network blob —
//! anything implementing [`io::IoAdapter`]).
//!
//! The entry point is [`volume::Mount`]: create a fresh archive with [`volume::Mount::create`] or
//! open an existing one with [`volume::Mount::mount`], then use its `open`/`read`/`write`/`mkdir`/
//! `readdir`/... methods to work with files and directories inside it.

#![allow(dead_code)]

pub(crate) mod block;
pub mod compress;
pub(crate) mod dir;
pub mod error;
pub(crate) mod file;
pub mod format;
pub mod handle;
pub(crate) mod inode;
pub mod io;
pub mod log;
pub mod options;
pub(crate) mod path;
pub mod time;
pub mod trace;
pub mod volume;

pub use crate::compress::{Compressor, Decompressor};
pub use crate::error::{FifError, Result};
pub use crate::format::CompressionAlgorithm;
pub use crate::handle::{FileHandle, FileInfo, OpenMode};
pub use crate::io::{IoAdapter, LocalFileIo, MemoryIo, SeekMode};
pub use crate::log::{LogCallback, LogLevel};
pub use crate::options::{MountOptions, VolumeOptions};
pub use crate::trace::{TraceReader, TraceRecord, TraceWriter};
pub use crate::volume::Mount;
