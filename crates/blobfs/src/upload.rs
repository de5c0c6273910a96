//! Upload: the streamed-save capability consumed by `store_upload`.
//!
//! An upload is anything with a client-supplied filename that can write its
//! bytes to a path it is given. The backend picks the path; the upload does the
//! transfer.
//!
//! Two implementations ship here:
//! - [`ReaderUpload`] streams from any `Read` (request bodies, stdin).
//! - [`PathUpload`] moves an already spooled file, like a multipart field that a
//!   web framework wrote to a temp directory.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// A streamed upload that can be saved to a destination path.
pub trait Upload {
    /// Client-supplied filename. `None` means the handle is not a file upload.
    fn filename(&self) -> Option<&str>;

    /// Write the full content to `dest`, returning the number of bytes written.
    ///
    /// `dest` may already exist as an empty file and must be overwritten.
    fn save_to(&mut self, dest: &Path) -> io::Result<u64>;
}

impl<U: Upload + ?Sized> Upload for &mut U {
    fn filename(&self) -> Option<&str> {
        (**self).filename()
    }

    fn save_to(&mut self, dest: &Path) -> io::Result<u64> {
        (**self).save_to(dest)
    }
}

/// Upload backed by a reader. Can be saved once.
#[derive(Debug)]
pub struct ReaderUpload<R> {
    filename: Option<String>,
    reader: Option<R>,
}

impl<R: Read> ReaderUpload<R> {
    pub fn new(filename: impl Into<String>, reader: R) -> Self {
        Self {
            filename: Some(filename.into()),
            reader: Some(reader),
        }
    }

    /// A bare stream with no filename; stores reject it.
    pub fn anonymous(reader: R) -> Self {
        Self {
            filename: None,
            reader: Some(reader),
        }
    }

    /// Whether the content has already been saved.
    pub fn is_consumed(&self) -> bool {
        self.reader.is_none()
    }
}

impl<R: Read> Upload for ReaderUpload<R> {
    fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    fn save_to(&mut self, dest: &Path) -> io::Result<u64> {
        let mut reader = self
            .reader
            .take()
            .ok_or_else(|| io::Error::other("upload already saved"))?;

        let file = File::create(dest)?;
        let mut writer = BufWriter::new(file);
        let written = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        Ok(written)
    }
}

/// Upload whose content already sits in a spool file.
///
/// Saving moves the spool file (rename, or copy and delete across filesystems).
#[derive(Debug, Clone)]
pub struct PathUpload {
    filename: String,
    path: PathBuf,
}

impl PathUpload {
    pub fn new(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
        }
    }

    /// Path of the spool file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the spool file to `dest` with `rename`, copying on `EXDEV`.
    fn move_with<F>(&self, dest: &Path, rename: F) -> io::Result<u64>
    where
        F: Fn(&Path, &Path) -> io::Result<()>,
    {
        let size = fs::metadata(&self.path)?.len();

        match rename(&self.path, dest) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                // Cross-filesystem: fall back to copy + delete
                fs::copy(&self.path, dest)?;
                fs::remove_file(&self.path)?;
            }
            Err(e) => return Err(e),
        }

        Ok(size)
    }
}

impl Upload for PathUpload {
    fn filename(&self) -> Option<&str> {
        Some(&self.filename)
    }

    fn save_to(&mut self, dest: &Path) -> io::Result<u64> {
        self.move_with(dest, |from, to| fs::rename(from, to))
    }
}
