//! Timestamp newtype used for inode `creation_timestamp`/`modification_timestamp` fields.
//!
//! `fif_current_timestamp()` (`util.c`) is just `time(NULL)` — seconds since the epoch, stored
//! as a raw `u64` on disk. This wrapper keeps that arithmetic intentional, without dragging in
//! RTC/clock-source concerns this crate has no use for.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the UNIX epoch, as stored in [`crate::format::RawInode`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    /// The current wall-clock time, per the host's `SystemTime`.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }
}

impl From<u64> for UnixTimestamp {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<UnixTimestamp> for u64 {
    fn from(ts: UnixTimestamp) -> Self {
        ts.0
    }
}
