//! The metainfo (`.torrent`) data model: §3 info identity plus the
//! external dictionary shape from §6 ("Metadata (info) file").

use serde::{Deserialize, Serialize};

use swarm_util::bt::InfoHash;
use swarm_util::sha::ShaHashBuilder;

use crate::error::ParseResult;
use crate::hashes::{Hashes, Sha1Digest};
use crate::iter::{Files, Pieces};

/// A single file within a multi-file torrent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct File {
    pub length: u64,
    pub path: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub md5sum: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attr: Option<String>,

    #[serde(
        rename = "symlink path",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub symlink_path: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sha1: Option<Sha1Digest>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mtime: Option<i64>,
}

impl File {
    /// True if the `attr` string carries the `p` (pad) flag.
    pub fn is_pad_file(&self) -> bool {
        self.has_attr('p')
    }

    pub fn is_hidden(&self) -> bool {
        self.has_attr('h')
    }

    pub fn is_executable(&self) -> bool {
        self.has_attr('x')
    }

    pub fn is_symlink(&self) -> bool {
        self.has_attr('l')
    }

    fn has_attr(&self, flag: char) -> bool {
        self.attr
            .as_ref()
            .map(|attr| attr.contains(flag))
            .unwrap_or(false)
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }
}

/// Either the single-file or the multi-file shape of the info dictionary.
/// `#[serde(untagged)]` lets `length` and `files` stay mutually exclusive
/// keys of the same dictionary instead of a nested enum tag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Key {
    SingleFile {
        length: u64,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        md5sum: Option<String>,
    },
    MultiFile {
        files: Vec<File>,
    },
}

/// The `info` dictionary: everything needed to identify and verify a swarm.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Info {
    pub name: String,

    #[serde(rename = "piece length")]
    pub piece_length: u64,

    pub pieces: Hashes,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub private: Option<u8>,

    #[serde(flatten)]
    pub key: Key,
}

impl Info {
    /// `ceil(total_size / piece_length)`, per §3.
    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    /// Size of piece `index`; the last piece is the remainder of
    /// `total_len`, never a full `piece_length` unless it divides evenly.
    pub fn piece_size(&self, index: usize) -> u64 {
        let num_pieces = self.num_pieces();
        if num_pieces == 0 {
            return 0;
        }

        if index + 1 < num_pieces {
            self.piece_length
        } else {
            let total = self.total_len();
            total - (num_pieces as u64 - 1) * self.piece_length
        }
    }

    pub fn is_private(&self) -> bool {
        self.private.unwrap_or(0) != 0
    }

    pub fn is_multi_file(&self) -> bool {
        matches!(self.key, Key::MultiFile { .. })
    }

    /// Directory name for multi-file torrents; `None` for single-file ones
    /// (there `name` is the file name, not a directory).
    pub fn directory(&self) -> Option<&str> {
        match self.key {
            Key::MultiFile { .. } => Some(&self.name),
            Key::SingleFile { .. } => None,
        }
    }

    pub fn files(&self) -> Files<'_> {
        Files::new(self)
    }

    pub fn pieces(&self) -> Pieces<'_> {
        Pieces::new(&self.pieces)
    }

    pub fn total_len(&self) -> u64 {
        match &self.key {
            Key::SingleFile { length, .. } => *length,
            Key::MultiFile { files } => files.iter().map(File::length).sum(),
        }
    }

    /// SHA-1 over the canonical bencoding of this dictionary (§6).
    pub fn info_hash(&self) -> ParseResult<InfoHash> {
        let bytes = serde_bencode::to_bytes(self)?;
        Ok(ShaHashBuilder::new().add_bytes(&bytes).build())
    }
}

/// The root metainfo dictionary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metainfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub announce: Option<String>,

    #[serde(
        rename = "announce-list",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub announce_list: Option<Vec<Vec<String>>>,

    #[serde(
        rename = "creation date",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub creation_date: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comment: Option<String>,

    #[serde(rename = "created by", skip_serializing_if = "Option::is_none", default)]
    pub created_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub encoding: Option<String>,

    pub info: Info,
}

impl Metainfo {
    pub fn from_bytes<B>(bytes: B) -> ParseResult<Metainfo>
    where
        B: AsRef<[u8]>,
    {
        let metainfo = serde_bencode::from_bytes(bytes.as_ref())?;
        Ok(metainfo)
    }

    pub fn to_bytes(&self) -> ParseResult<Vec<u8>> {
        Ok(serde_bencode::to_bytes(self)?)
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn info_hash(&self) -> ParseResult<InfoHash> {
        self.info.info_hash()
    }

    pub fn main_tracker(&self) -> Option<&str> {
        self.announce.as_deref()
    }

    /// All tracker tiers, falling back to `[[announce]]` when no
    /// `announce-list` is present.
    pub fn trackers(&self) -> Vec<Vec<String>> {
        if let Some(list) = &self.announce_list {
            list.clone()
        } else if let Some(main) = &self.announce {
            vec![vec![main.clone()]]
        } else {
            Vec::new()
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn creation_date(&self) -> Option<i64> {
        self.creation_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> Info {
        Info {
            name: "a.txt".to_owned(),
            piece_length: 16 * 1024,
            pieces: Hashes(vec![swarm_util::sha::ShaHash::from([0u8; 20])]),
            private: None,
            key: Key::SingleFile {
                length: 17,
                md5sum: None,
            },
        }
    }

    #[test]
    fn positive_round_trip_single_file() {
        let info = sample_info();
        let metainfo = Metainfo {
            announce: Some("udp://tracker.example:80".to_owned()),
            announce_list: None,
            creation_date: Some(1_600_000_000),
            comment: Some("hello".to_owned()),
            created_by: Some("swarm_metainfo".to_owned()),
            encoding: None,
            info,
        };

        let bytes = metainfo.to_bytes().unwrap();
        let parsed = Metainfo::from_bytes(&bytes).unwrap();

        assert_eq!(metainfo, parsed);
        assert_eq!(parsed.main_tracker(), Some("udp://tracker.example:80"));
    }

    #[test]
    fn positive_piece_size_boundaries() {
        let mut info = sample_info();
        info.piece_length = 10;
        info.pieces = Hashes(vec![
            swarm_util::sha::ShaHash::from([0u8; 20]),
            swarm_util::sha::ShaHash::from([0u8; 20]),
            swarm_util::sha::ShaHash::from([0u8; 20]),
        ]);
        info.key = Key::SingleFile {
            length: 25,
            md5sum: None,
        };

        assert_eq!(info.piece_size(0), 10);
        assert_eq!(info.piece_size(1), 10);
        assert_eq!(info.piece_size(2), 5);
    }

    #[test]
    fn positive_pad_file_attr() {
        let file = File {
            length: 4,
            path: vec![".pad".to_owned(), "4".to_owned()],
            md5sum: None,
            attr: Some("p".to_owned()),
            symlink_path: None,
            sha1: None,
            mtime: None,
        };

        assert!(file.is_pad_file());
        assert!(!file.is_executable());
    }
}
