//! Path canonicalization and resolution.
//!
//! `canonicalize` mirrors `fif_canonicalize_path` (`original_source/src/util.c`): it collapses
//! `.` segments and resolves `..` against the already-canonicalized prefix, without ever
//! touching the disk. `split_dirbase` mirrors `fif_split_path_dirbase`.

use crate::error::{FifError, Result};
use crate::format::InodeIndex;
use crate::io::IoAdapter;
use crate::volume::Mount;

/// Collapses `.`/`..` segments out of `path`. The root path `"/"` is returned unchanged.
pub(crate) fn canonicalize(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(FifError::BadPath(path.to_string()));
    }
    if path == "/" {
        return Ok("/".to_string());
    }

    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let mut segments: Vec<&str> = Vec::new();

    for part in trimmed.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(part),
        }
    }

    Ok(segments.join("/"))
}

/// Splits a canonicalized path into `(dirname, basename)`. `dirname` is `None` when the path has
/// no directory component (a top-level entry).
pub(crate) fn split_dirbase(path: &str) -> (Option<&str>, &str) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(pos) => (Some(&trimmed[..pos]), &trimmed[pos + 1..]),
        None => (None, trimmed),
    }
}

impl<IO: IoAdapter> Mount<IO> {
    /// Resolves `path` to `(file_inode, containing_directory_inode)`.
    pub(crate) fn resolve_file_name(&mut self, path: &str) -> Result<(InodeIndex, InodeIndex)> {
        let canonical = canonicalize(path)?;
        let (dirname, basename) = split_dirbase(&canonical);
        if basename.is_empty() {
            return Err(FifError::BadPath(path.to_string()));
        }

        let directory_inode = self.resolve_directory_name(dirname.unwrap_or(""))?;
        let (file_inode, _) = self.find_file_in_directory(directory_inode, basename)?;
        Ok((file_inode, directory_inode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_collapses_dot_segments() {
        assert_eq!(canonicalize("/a/./b").unwrap(), "a/b");
    }

    #[test]
    fn canonicalize_resolves_parent_segments() {
        assert_eq!(canonicalize("/a/b/../c").unwrap(), "a/c");
    }

    #[test]
    fn canonicalize_root_is_unchanged() {
        assert_eq!(canonicalize("/").unwrap(), "/");
    }

    #[test]
    fn split_dirbase_splits_on_rightmost_slash() {
        assert_eq!(split_dirbase("a/b/c"), (Some("a/b"), "c"));
        assert_eq!(split_dirbase("c"), (None, "c"));
    }
}
