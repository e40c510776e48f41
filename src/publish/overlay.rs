use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Counts from one overlay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStats {
    pub files_copied: usize,
    pub dirs_replaced: usize,
}

/// Copy the top-level entries of `src` onto `dst`, skipping `.git`.
///
/// A directory present in both is removed from `dst` and copied fresh, so
/// files deleted from `src` disappear. Files are overwritten. Entries only in
/// `dst` are left alone.
pub fn overlay_tree(src: &Path, dst: &Path) -> io::Result<OverlayStats> {
    let mut stats = OverlayStats::default();
    std::fs::create_dir_all(dst)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if to.is_dir() {
                std::fs::remove_dir_all(&to)?;
                stats.dirs_replaced += 1;
            } else if to.exists() {
                std::fs::remove_file(&to)?;
            }
            stats.files_copied += copy_dir(&from, &to)?;
        } else if file_type.is_file() {
            if to.is_dir() {
                std::fs::remove_dir_all(&to)?;
            }
            std::fs::copy(&from, &to)?;
            stats.files_copied += 1;
        }
    }

    Ok(stats)
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
