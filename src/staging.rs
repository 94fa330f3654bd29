//! Input-scoped staging and atomic placement of artifacts.
//!
//! Artifacts are written into a private staging directory
//! first and only then moved to their final path, so readers
//! of the final path never observe a partially written file.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use tracing::debug;

/// Scratch directory owned by one processing run. Removed on
/// drop.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Create a fresh directory under `root`, prefixed by the
    /// input id so concurrent runs never share names.
    pub fn new(root: &Path, input_id: &str) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let prefix: String = input_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{prefix}-"))
            .tempdir_in(root)?;
        Ok(Staging { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Staging path for a file called `name`.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Move `src` to `dst`, replacing `dst` atomically.
///
/// A plain rename is tried first. When `src` and `dst` live on
/// different filesystems the file is copied next to `dst` and
/// renamed from there.
pub fn relocate(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let parent = dst.parent().unwrap_or_else(|| Path::new("."));
    let name = dst
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;
    let sibling = parent.join(format!(
        ".{}.{}.partial",
        name.to_string_lossy(),
        std::process::id()
    ));

    debug!(src = %src.display(), dst = %dst.display(), "rename failed, copying");
    fs::copy(src, &sibling)?;
    if let Err(e) = fs::rename(&sibling, dst) {
        let _ = fs::remove_file(&sibling);
        return Err(e);
    }
    fs::remove_file(src)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_dirs_are_input_scoped() -> io::Result<()> {
        let root = TempDir::new()?;
        let a = Staging::new(root.path(), "abc/123")?;
        let b = Staging::new(root.path(), "abc/123")?;
        assert_ne!(a.path(), b.path());
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("abc_123-"));

        let kept = a.path().to_owned();
        drop(a);
        assert!(!kept.exists());
        Ok(())
    }

    #[test]
    fn relocate_replaces_destination() -> io::Result<()> {
        let root = TempDir::new()?;
        let staging = Staging::new(root.path(), "id")?;
        let src = staging.file("out.tif");
        let dst = root.path().join("final.tif");

        fs::write(&dst, b"old")?;
        fs::write(&src, b"new")?;
        relocate(&src, &dst)?;

        assert_eq!(fs::read(&dst)?, b"new");
        assert!(!src.exists());
        Ok(())
    }

    #[test]
    fn relocate_missing_source_fails() -> io::Result<()> {
        let root = TempDir::new()?;
        let dst = root.path().join("final.tif");
        assert!(relocate(&root.path().join("nope"), &dst).is_err());
        assert!(!dst.exists());
        Ok(())
    }
}
