//! Resume data: the bencoded snapshot described in §6 that lets a swarm
//! rejoin without re-hashing everything it already has.

use std::fmt;

use serde::de::{Error, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use swarm_util::bt::InfoHash;

use crate::error::ParseResult;
use crate::hashes::Sha1Digest;

/// Value of the required `file-format` field.
pub const FILE_FORMAT: &str = "libtorrent resume file";

/// Per-piece ownership state, one byte per piece in the `pieces` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PieceState {
    /// Not downloaded.
    Missing,
    /// Downloaded but not yet hash-verified.
    Have,
    /// Downloaded and hash-verified; announceable.
    Verified,
}

impl PieceState {
    fn to_byte(self) -> u8 {
        match self {
            PieceState::Missing => 0,
            PieceState::Have => 1,
            PieceState::Verified => 2,
        }
    }

    fn from_byte(byte: u8) -> PieceState {
        match byte {
            1 => PieceState::Have,
            2 => PieceState::Verified,
            _ => PieceState::Missing,
        }
    }
}

/// Wrapper giving `Vec<PieceState>` the raw-byte-string wire encoding that
/// `pieces` uses, one byte per piece.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PieceStates(pub Vec<PieceState>);

impl Serialize for PieceStates {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes: Vec<u8> = self.0.iter().map(|s| s.to_byte()).collect();
        serializer.serialize_bytes(&bytes)
    }
}

impl<'de> Deserialize<'de> for PieceStates {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_bytes(PieceStatesVisitor)
    }
}

struct PieceStatesVisitor;

impl<'de> Visitor<'de> for PieceStatesVisitor {
    type Value = PieceStates;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a byte string with one state byte per piece")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(PieceStates(v.iter().map(|b| PieceState::from_byte(*b)).collect()))
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
    where
        E: Error,
    {
        self.visit_bytes(&v)
    }
}

/// One `[size, mtime]` pair from the `file sizes` list, in file order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileEntry(pub i64, pub i64);

impl FileEntry {
    pub fn size(&self) -> i64 {
        self.0
    }

    pub fn mtime(&self) -> i64 {
        self.1
    }
}

/// The `.resume` dictionary: §6 "Resume data", §8 resume round-trip law.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResumeData {
    #[serde(rename = "file-format")]
    pub file_format: String,

    #[serde(rename = "info-hash")]
    pub info_hash: Sha1Digest,

    pub pieces: PieceStates,

    #[serde(rename = "file sizes")]
    pub file_sizes: Vec<FileEntry>,

    pub allocation: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub piece_priority: Option<Vec<u8>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trackers: Option<Vec<Vec<String>>>,

    #[serde(
        rename = "mapped_files",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub mapped_files: Option<Vec<String>>,
}

impl ResumeData {
    /// A fresh resume record for a torrent with no pieces downloaded yet.
    pub fn new(info_hash: InfoHash, num_pieces: usize, file_sizes: Vec<FileEntry>) -> ResumeData {
        ResumeData {
            file_format: FILE_FORMAT.to_owned(),
            info_hash: Sha1Digest(info_hash),
            pieces: PieceStates(vec![PieceState::Missing; num_pieces]),
            file_sizes,
            allocation: "sparse".to_owned(),
            piece_priority: None,
            trackers: None,
            mapped_files: None,
        }
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash.0
    }

    pub fn is_full_allocation(&self) -> bool {
        self.allocation == "full"
    }

    pub fn from_bytes<B: AsRef<[u8]>>(bytes: B) -> ParseResult<ResumeData> {
        let resume = serde_bencode::from_bytes(bytes.as_ref())?;
        Ok(resume)
    }

    pub fn to_bytes(&self) -> ParseResult<Vec<u8>> {
        Ok(serde_bencode::to_bytes(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_bencode_round_trip() {
        let info_hash = InfoHash::from([7u8; 20]);
        let mut resume = ResumeData::new(info_hash, 4, vec![FileEntry(1000, 1_600_000_000)]);
        resume.pieces.0[0] = PieceState::Verified;
        resume.pieces.0[1] = PieceState::Have;

        let bytes = resume.to_bytes().unwrap();
        let parsed = ResumeData::from_bytes(&bytes).unwrap();

        assert_eq!(resume, parsed);
        assert_eq!(parsed.file_format, FILE_FORMAT);
        assert_eq!(parsed.info_hash(), info_hash);
    }

    #[test]
    fn positive_piece_state_byte_round_trip() {
        assert_eq!(PieceState::from_byte(PieceState::Missing.to_byte()), PieceState::Missing);
        assert_eq!(PieceState::from_byte(PieceState::Have.to_byte()), PieceState::Have);
        assert_eq!(PieceState::from_byte(PieceState::Verified.to_byte()), PieceState::Verified);
    }
}
