use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use fs4::fs_std::FileExt;
use log::warn;
use tempfile::NamedTempFile;

/// Advisory lock shared by every process touching one data file. It lives
/// next to the file as `<name>.lock`, since the data file itself is
/// replaced on each write.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// blocks until no other holder is left
    pub fn acquire(data_path: &Path) -> io::Result<Self> {
        let mut name = OsString::from(data_path.as_os_str());
        name.push(".lock");
        let path = PathBuf::from(name);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file, path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("couldn't unlock {}: {e}", self.path.display());
        }
    }
}

/// Replaces `path` with `contents` in one step, readers see the old file or
/// the new one and never a partial write.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
