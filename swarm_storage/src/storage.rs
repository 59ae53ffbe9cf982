//! The storage map: ties a metadata [`Info`] dictionary to a
//! [`FileSystem`] and exposes the read/write/rename/verify operations
//! named for component 1.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{error, warn};
use swarm_metainfo::{Info, Metainfo, ResumeData};

use crate::error::{StorageError, StorageErrorKind, StorageResult};
use crate::fs::{FileSystem, NativeFileSystem};
use crate::map::{self, FileSlice};

/// Ties a `.torrent`'s metadata to an on-disk (or virtual) filesystem
/// and implements the storage-map operations.
///
/// Once any operation fails with a non-recoverable error the storage is
/// poisoned: every subsequent operation returns the same error without
/// retrying I/O, matching the disk-queue's failure contract in the
/// surrounding job scheduler.
pub struct TorrentStorage<F: FileSystem> {
    fs: F,
    info: Info,
    directory: Option<String>,
    open_files: RefCell<HashMap<usize, F::File>>,
    poisoned: RefCell<Option<String>>,
}

impl TorrentStorage<NativeFileSystem> {
    /// Construct storage rooted at `root`, using the OS filesystem.
    pub fn native(metainfo: &Metainfo, root: impl AsRef<Path>) -> TorrentStorage<NativeFileSystem> {
        TorrentStorage::new(metainfo, NativeFileSystem::with_directory(root))
    }
}

impl<F: FileSystem> TorrentStorage<F> {
    pub fn new(metainfo: &Metainfo, fs: F) -> TorrentStorage<F> {
        TorrentStorage {
            fs,
            info: metainfo.info().clone(),
            directory: metainfo.info().directory().map(|d| d.to_string()),
            open_files: RefCell::new(HashMap::new()),
            poisoned: RefCell::new(None),
        }
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    fn check_poisoned(&self) -> StorageResult<()> {
        if let Some(reason) = self.poisoned.borrow().as_ref() {
            return Err(StorageErrorKind::Poisoned {
                reason: reason.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn poison(&self, reason: String) {
        error!("storage poisoned: {}", reason);
        *self.poisoned.borrow_mut() = Some(reason);
    }

    fn file_path(&self, file_index: usize) -> PathBuf {
        let file = self
            .info
            .files()
            .nth(file_index)
            .expect("file_index bounded by map_block");

        let mut path = match &self.directory {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::new(),
        };
        for component in file.path() {
            path.push(component);
        }
        path
    }

    fn with_open_file<R>(&self, file_index: usize, op: impl FnOnce(&mut F::File) -> std::io::Result<R>) -> StorageResult<R> {
        let mut open_files = self.open_files.borrow_mut();
        if !open_files.contains_key(&file_index) {
            let path = self.file_path(file_index);
            let file = self.fs.open_file(&path).map_err(|e| {
                StorageErrorKind::StorageIo {
                    file: file_index,
                    kind: e.kind(),
                }
            })?;
            open_files.insert(file_index, file);
        }
        let file = open_files.get_mut(&file_index).expect("just inserted");
        op(file).map_err(|e| {
            StorageErrorKind::StorageIo {
                file: file_index,
                kind: e.kind(),
            }
            .into()
        })
    }

    /// `map_block(piece, offset, length) -> [slice]`.
    pub fn map_block(&self, piece: u64, offset: u64, length: u64) -> StorageResult<Vec<FileSlice>> {
        map::map_block(&self.info, piece, offset, length)
    }

    /// Read `length` bytes starting at `(piece, offset)` into `buffer`.
    ///
    /// Pad-file regions are filled with zero bytes and never touch disk.
    /// Unaligned reads are satisfied one file-slice at a time: each
    /// slice is itself a contiguous read, so the aggregate result is
    /// byte-identical to a single linear read across the concatenation
    /// of all real and pad files.
    pub fn readv(&self, piece: u64, offset: u64, buffer: &mut [u8]) -> StorageResult<()> {
        self.check_poisoned()?;
        let slices = self.map_block(piece, offset, buffer.len() as u64)?;

        for slice in slices {
            let dst = &mut buffer[slice.buffer_offset..slice.buffer_offset + slice.length];
            if slice.is_pad {
                for b in dst.iter_mut() {
                    *b = 0;
                }
                continue;
            }

            let result = self.read_slice_retrying(slice, dst);
            if let Err(e) = &result {
                self.poison(format!("read failure on file {}: {}", slice.file_index, e));
            }
            result?;
        }

        Ok(())
    }

    fn read_slice_retrying(&self, slice: FileSlice, dst: &mut [u8]) -> StorageResult<()> {
        let mut filled = 0;
        while filled < dst.len() {
            let n = self.with_open_file(slice.file_index, |file| {
                self.fs.read_file(file, slice.file_offset + filled as u64, &mut dst[filled..])
            })?;
            if n == 0 {
                // Short read past end of file: treat the rest as zero-fill,
                // matching a freshly allocated but not yet written file.
                for b in dst[filled..].iter_mut() {
                    *b = 0;
                }
                break;
            }
            filled += n;
        }
        Ok(())
    }

    /// Write `buffer` starting at `(piece, offset)`.
    pub fn writev(&self, piece: u64, offset: u64, buffer: &[u8]) -> StorageResult<()> {
        self.check_poisoned()?;
        let slices = self.map_block(piece, offset, buffer.len() as u64)?;

        for slice in slices {
            if slice.is_pad {
                // Pad bytes are never persisted; writes into a pad region
                // are a caller error we silently absorb, since the
                // picker/disk layer never schedules writes there.
                continue;
            }

            let src = &buffer[slice.buffer_offset..slice.buffer_offset + slice.length];
            let result = self.write_slice_retrying(slice, src);
            if let Err(e) = &result {
                self.poison(format!("write failure on file {}: {}", slice.file_index, e));
            }
            result?;
        }

        Ok(())
    }

    fn write_slice_retrying(&self, slice: FileSlice, src: &[u8]) -> StorageResult<()> {
        let mut written = 0;
        while written < src.len() {
            let n = self.with_open_file(slice.file_index, |file| {
                self.fs.write_file(file, slice.file_offset + written as u64, &src[written..])
            })?;
            if n == 0 {
                return Err(StorageErrorKind::StorageIo {
                    file: slice.file_index,
                    kind: std::io::ErrorKind::WriteZero,
                }
                .into());
            }
            written += n;
        }
        Ok(())
    }

    /// `verify_resume(resume)`: do the recorded `(size, mtime)` pairs
    /// match on-disk state?
    ///
    /// Exact size is always required. In full-allocation mode `mtime`
    /// is not checked (files may have been pre-allocated at a different
    /// time than their content was written). A missing file is
    /// tolerated only if its recorded size is zero.
    pub fn verify_resume(&self, resume: &ResumeData) -> StorageResult<bool> {
        self.check_poisoned()?;
        let full_allocation = resume.is_full_allocation();

        for (file_index, entry) in resume.file_sizes.iter().enumerate() {
            let recorded_size = entry.size();
            let recorded_mtime = entry.mtime();
            let path = self.file_path(file_index);

            if !self.fs.exists(&path) {
                if recorded_size != 0 {
                    return Ok(false);
                }
                continue;
            }

            let opened = self.fs.open_file(&path).map_err(|e| StorageErrorKind::StorageIo {
                file: file_index,
                kind: e.kind(),
            })?;
            let actual_size = self
                .fs
                .file_size(&opened)
                .map_err(|e| StorageErrorKind::StorageIo {
                    file: file_index,
                    kind: e.kind(),
                })?;

            if actual_size as i64 != recorded_size {
                return Ok(false);
            }

            if !full_allocation {
                let actual_mtime = self
                    .fs
                    .file_mtime(&opened)
                    .map_err(|e| StorageErrorKind::StorageIo {
                        file: file_index,
                        kind: e.kind(),
                    })?;
                if actual_mtime != recorded_mtime {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// `release_files()`: close every cached file handle without touching
    /// the underlying files, so another process can open them exclusively.
    pub fn release_files(&self) {
        self.open_files.borrow_mut().clear();
    }

    /// `rename_file(index, new_path)`.
    pub fn rename_file(&self, index: usize, new_path: impl AsRef<Path>) -> StorageResult<()> {
        self.check_poisoned()?;
        self.open_files.borrow_mut().remove(&index);

        let old_path = self.file_path(index);
        let new_path = new_path.as_ref();

        if self.fs.exists(new_path) {
            return Err(StorageErrorKind::PathCollision {
                path: new_path.display().to_string(),
            }
            .into());
        }

        self.fs.rename(&old_path, new_path).map_err(|e| StorageErrorKind::StorageIo {
            file: index,
            kind: e.kind(),
        })?;

        Ok(())
    }

    /// `move_storage(new_root)`.
    ///
    /// Only meaningful for [`NativeFileSystem`]-backed storage; generic
    /// implementations move file-by-file since they have no single root
    /// directory to rename atomically.
    pub fn move_storage(&self, new_root: impl AsRef<Path>) -> StorageResult<()> {
        self.check_poisoned()?;
        let new_root = new_root.as_ref();

        if self.fs.exists(new_root) && !new_root.is_dir() {
            return Err(StorageErrorKind::PathCollision {
                path: new_root.display().to_string(),
            }
            .into());
        }

        self.open_files.borrow_mut().clear();

        for (index, file) in self.info.files().enumerate() {
            if file.is_pad_file() {
                continue;
            }
            let old_path = self.file_path(index);
            let mut new_path = new_root.to_path_buf();
            for component in file.path() {
                new_path.push(component);
            }
            match self.fs.rename(&old_path, &new_path) {
                Ok(()) => {}
                Err(e) => {
                    warn!("cross-device move fallback for file {}: {}", index, e);
                    return Err(StorageErrorKind::StorageIo {
                        file: index,
                        kind: e.kind(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// `delete_files()`: remove every real file, then prune directories
    /// that become empty, deepest first.
    pub fn delete_files(&self) -> StorageResult<()> {
        self.check_poisoned()?;
        self.open_files.borrow_mut().clear();

        let mut dirs: Vec<PathBuf> = Vec::new();

        for (index, file) in self.info.files().enumerate() {
            if file.is_pad_file() {
                continue;
            }
            let path = self.file_path(index);
            if let Some(parent) = path.parent() {
                dirs.push(parent.to_path_buf());
            }
            self.fs.remove_file(&path).map_err(|e| StorageErrorKind::StorageIo {
                file: index,
                kind: e.kind(),
            })?;
        }

        // Deepest directories first so parents are empty by the time we
        // reach them (post-order).
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        dirs.dedup();

        for dir in dirs {
            let _ = self.fs.remove_dir_if_empty(&dir);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_metainfo::{MetainfoBuilder, PieceLength};

    fn build_single_file(dir: &tempfile::TempDir) -> (Metainfo, std::path::PathBuf) {
        let file_path = dir.path().join("payload.bin");
        std::fs::write(&file_path, vec![7u8; 4096]).unwrap();

        let builder = MetainfoBuilder::new().set_piece_length(PieceLength::Custom(1024));
        let bytes = builder.build(&file_path, |_| {}).unwrap();
        (Metainfo::from_bytes(&bytes).unwrap(), file_path)
    }

    #[test]
    fn positive_read_back_what_was_written() {
        let dir = tempfile::tempdir().unwrap();
        let (metainfo, _src) = build_single_file(&dir);

        let storage_root = dir.path().join("store");
        let storage = TorrentStorage::native(&metainfo, &storage_root);

        let piece_len = metainfo.info().piece_length() as u64;
        let payload = vec![42u8; piece_len as usize];
        storage.writev(0, 0, &payload).unwrap();

        let mut out = vec![0u8; piece_len as usize];
        storage.readv(0, 0, &mut out).unwrap();

        assert_eq!(out, payload);
    }

    #[test]
    fn positive_delete_files_removes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (metainfo, _src) = build_single_file(&dir);

        let storage_root = dir.path().join("store");
        let storage = TorrentStorage::native(&metainfo, &storage_root);
        storage.writev(0, 0, &vec![1u8; metainfo.info().piece_length() as usize]).unwrap();

        storage.delete_files().unwrap();

        let expected_path = storage_root.join(&metainfo.info().name);
        assert!(!expected_path.exists());
    }
}
