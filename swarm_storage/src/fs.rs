//! An abstraction over the filesystem a storage map reads and writes
//! through, so tests can substitute an in-memory implementation.

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file system that a [`crate::storage::TorrentStorage`] performs all its
/// reads and writes through.
///
/// Relative paths are resolved against an implementation-defined root.
pub trait FileSystem {
    type File;

    /// Open a file for read/write, creating it (and any missing parent
    /// directories) if it does not exist.
    fn open_file<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path>;

    /// Size of the file in bytes.
    fn file_size(&self, file: &Self::File) -> io::Result<u64>;

    /// Last-modified time of the file, as a unix timestamp.
    fn file_mtime(&self, file: &Self::File) -> io::Result<i64>;

    /// Read at `offset`, returning the number of bytes read (may be
    /// short of `buffer.len()` only at end of file).
    fn read_file(&self, file: &mut Self::File, offset: u64, buffer: &mut [u8]) -> io::Result<usize>;

    /// Write at `offset`; the file is extended with implicit zero-fill if
    /// `offset` is past the current end.
    fn write_file(&self, file: &mut Self::File, offset: u64, buffer: &[u8]) -> io::Result<usize>;

    /// Remove a single file. Not an error if it is already absent.
    fn remove_file<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>;

    /// Rename/move a path, creating destination parent directories.
    fn rename<P: AsRef<Path>, Q: AsRef<Path>>(&self, from: P, to: Q) -> io::Result<()>;

    /// Remove a directory if it is empty; not an error if it is absent.
    fn remove_dir_if_empty<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>;

    /// Whether a path currently exists.
    fn exists<P>(&self, path: P) -> bool
    where
        P: AsRef<Path>;
}

/// File handle opened against [`NativeFileSystem`].
pub struct NativeFile {
    file: File,
    path: PathBuf,
}

/// Filesystem backed by the OS, rooted at a fixed base directory.
pub struct NativeFileSystem {
    root: PathBuf,
}

impl NativeFileSystem {
    pub fn with_directory<P: AsRef<Path>>(root: P) -> NativeFileSystem {
        NativeFileSystem {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve<'a, P: AsRef<Path>>(&self, path: &'a P) -> Cow<'a, Path> {
        let path = path.as_ref();
        if path.is_absolute() {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(self.root.join(path))
        }
    }
}

impl FileSystem for NativeFileSystem {
    type File = NativeFile;

    fn open_file<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path>,
    {
        let full_path = self.resolve(&path).into_owned();
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&full_path)?;

        Ok(NativeFile {
            file,
            path: full_path,
        })
    }

    fn file_size(&self, file: &Self::File) -> io::Result<u64> {
        file.file.metadata().map(|m| m.len())
    }

    fn file_mtime(&self, file: &Self::File) -> io::Result<i64> {
        let modified = file.file.metadata()?.modified()?;
        let secs = modified
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(secs)
    }

    fn read_file(&self, file: &mut Self::File, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        file.file.seek(SeekFrom::Start(offset))?;
        file.file.read(buffer)
    }

    fn write_file(&self, file: &mut Self::File, offset: u64, buffer: &[u8]) -> io::Result<usize> {
        file.file.seek(SeekFrom::Start(offset))?;
        file.file.write(buffer)
    }

    fn remove_file<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        let full_path = self.resolve(&path);
        match fs::remove_file(&full_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn rename<P: AsRef<Path>, Q: AsRef<Path>>(&self, from: P, to: Q) -> io::Result<()> {
        let full_from = self.resolve(&from).into_owned();
        let full_to = self.resolve(&to).into_owned();
        if let Some(parent) = full_to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(full_from, full_to)
    }

    fn remove_dir_if_empty<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        let full_path = self.resolve(&path);
        match fs::remove_dir(&full_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            // Directory not empty, or other condition: not our job to force it.
            Err(_) => Ok(()),
        }
    }

    fn exists<P>(&self, path: P) -> bool
    where
        P: AsRef<Path>,
    {
        self.resolve(&path).exists()
    }
}
