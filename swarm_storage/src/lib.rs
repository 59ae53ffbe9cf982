//! The storage map (component 1): translates `(piece, offset, length)`
//! into file slices, executes reads/writes across them, and verifies/
//! renames/moves/deletes the files that back a swarm.

#[macro_use]
extern crate error_chain;

pub mod error;
pub mod fs;
mod map;
mod storage;

pub use crate::fs::{FileSystem, NativeFile, NativeFileSystem};
pub use crate::map::{map_block, FileSlice};
pub use crate::storage::TorrentStorage;
