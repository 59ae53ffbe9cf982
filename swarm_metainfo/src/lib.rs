//! Parsing, building, and resume-data handling for bittorrent metainfo
//! (`.torrent`) files.
//!
//! The wire format (bencode) is handled entirely by `serde`/`serde_bencode`;
//! this crate only knows about the shape of the dictionaries it reads and
//! writes.

#[macro_use]
extern crate error_chain;

mod accessor;
mod builder;
pub mod error;
mod hashes;
mod info;
pub mod iter;
mod resume;

pub use crate::accessor::{Accessor, DirectAccessor, FileAccessor, IntoAccessor, PieceAccess};
pub use crate::builder::{MetainfoBuilder, PieceLength};
pub use crate::hashes::{Hashes, Sha1Digest};
pub use crate::info::{File, Info, Key, Metainfo};
pub use crate::resume::{FileEntry, PieceState, PieceStates, ResumeData, FILE_FORMAT};

pub use swarm_util::bt::InfoHash;
