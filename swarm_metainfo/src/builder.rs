//! Building new torrent metadata from a file or directory on disk, per the
//! `piece length`/`pieces`/pad-file invariants in §3.

use chrono::Utc;
use log::debug;

use swarm_util::sha::{self, ShaHashBuilder};

use crate::accessor::{Accessor, IntoAccessor, PieceAccess};
use crate::error::{ParseError, ParseErrorKind, ParseResult};
use crate::hashes::Hashes;
use crate::info::{File, Info, Key, Metainfo};

// Piece length is inversely related to the file size: a small piece length
// gives better transfer reliability (less to re-download on a hash miss) but
// a bigger metadata file. These thresholds balance the two for different
// use cases; the minimums keep small torrents from picking absurdly small
// pieces.
const BALANCED_MAX_PIECES_SIZE: u64 = 30_000;
const BALANCED_MIN_PIECE_LENGTH: u64 = 512 * 1024;

const FILE_SIZE_MAX_PIECES_SIZE: u64 = 10_000;
const FILE_SIZE_MIN_PIECE_LENGTH: u64 = 1024 * 1024;

const TRANSFER_MAX_PIECES_SIZE: u64 = 50_000;
const TRANSFER_MIN_PIECE_LENGTH: u64 = 1024;

/// Strategy for picking the `piece length` of a torrent being built.
pub enum PieceLength {
    /// Optimize for a balance of metadata size and transfer reliability.
    OptBalanced,
    /// Optimize for metadata (torrent file) size.
    OptFileSize,
    /// Optimize for transfer reliability.
    OptTransfer,
    /// Use an exact, caller-chosen piece length. Must be a power of two.
    Custom(u64),
}

/// Builds a `Metainfo` from a file or directory accessor.
pub struct MetainfoBuilder {
    main_tracker: Option<String>,
    trackers: Option<Vec<Vec<String>>>,
    creation_date: Option<i64>,
    comment: Option<String>,
    created_by: Option<String>,
    private: bool,
    piece_length: PieceLength,
    align_to_piece_boundary: bool,
}

impl Default for MetainfoBuilder {
    fn default() -> MetainfoBuilder {
        MetainfoBuilder::new()
    }
}

impl MetainfoBuilder {
    /// A builder with no tracker and a creation date of now.
    pub fn new() -> MetainfoBuilder {
        MetainfoBuilder {
            main_tracker: None,
            trackers: None,
            creation_date: Some(Utc::now().timestamp()),
            comment: None,
            created_by: None,
            private: false,
            piece_length: PieceLength::OptBalanced,
            align_to_piece_boundary: false,
        }
    }

    pub fn set_main_tracker(mut self, tracker: Option<&str>) -> MetainfoBuilder {
        self.main_tracker = tracker.map(str::to_owned);
        self
    }

    pub fn get_main_tracker(&self) -> Option<String> {
        self.main_tracker.clone()
    }

    pub fn set_trackers(mut self, trackers: Option<&[Vec<String>]>) -> MetainfoBuilder {
        self.trackers = trackers.map(|t| t.to_vec());
        self
    }

    pub fn get_trackers(&self) -> Option<Vec<Vec<String>>> {
        self.trackers.clone()
    }

    pub fn set_creation_date(mut self, secs_epoch: Option<i64>) -> MetainfoBuilder {
        self.creation_date = secs_epoch;
        self
    }

    pub fn get_creation_date(&self) -> Option<i64> {
        self.creation_date
    }

    pub fn set_comment(mut self, comment: Option<&str>) -> MetainfoBuilder {
        self.comment = comment.map(str::to_owned);
        self
    }

    pub fn get_comment(&self) -> Option<String> {
        self.comment.clone()
    }

    pub fn set_created_by(mut self, created_by: Option<&str>) -> MetainfoBuilder {
        self.created_by = created_by.map(str::to_owned);
        self
    }

    pub fn get_created_by(&self) -> Option<String> {
        self.created_by.clone()
    }

    pub fn set_private_flag(mut self, is_private: bool) -> MetainfoBuilder {
        self.private = is_private;
        self
    }

    pub fn get_private_flag(&self) -> bool {
        self.private
    }

    pub fn set_piece_length(mut self, piece_length: PieceLength) -> MetainfoBuilder {
        self.piece_length = piece_length;
        self
    }

    /// Insert pad files so that every real file after the first starts on a
    /// piece boundary. Only affects multi-file torrents; see §3/§8 scenario 5.
    pub fn set_align_to_piece_boundary(mut self, align: bool) -> MetainfoBuilder {
        self.align_to_piece_boundary = align;
        self
    }

    /// Build the torrent, hashing file contents as it goes. `progress` is
    /// called with a value in `[0.0, 1.0]` after each piece is hashed.
    pub fn build<T, C>(self, path: T, mut progress: C) -> ParseResult<Vec<u8>>
    where
        T: IntoAccessor,
        C: FnMut(f64),
    {
        let accessor = path.into_accessor()?;

        let mut metadata = Vec::new();
        accessor.access_metadata(|len, path| {
            let segments = path
                .iter()
                .map(|seg| seg.to_string_lossy().into_owned())
                .collect::<Vec<_>>();
            metadata.push((len, segments));
        })?;

        if metadata.is_empty() {
            return Err(ParseError::from_kind(ParseErrorKind::InvalidData {
                details: "no files found at the given path".to_owned(),
            }));
        }

        let total_len: u64 = metadata.iter().map(|(len, _)| *len).sum();
        let piece_length = determine_piece_length(total_len, self.piece_length);

        let is_directory = accessor.access_directory().is_some();
        let layout = if is_directory && self.align_to_piece_boundary {
            build_padded_layout(&metadata, piece_length)
        } else {
            metadata
                .iter()
                .map(|(len, _)| LayoutEntry::Real { length: *len })
                .collect()
        };

        debug!(
            "building torrent: {} files, {} bytes, piece length {}",
            metadata.len(),
            total_len,
            piece_length
        );

        let pieces = generate_pieces(&accessor, &layout, piece_length, total_len, &mut progress)?;

        let key = if is_directory {
            let files = merge_layout_with_paths(layout, metadata);
            Key::MultiFile { files }
        } else {
            Key::SingleFile {
                length: metadata[0].0,
                md5sum: None,
            }
        };

        let name = if let Some(dir) = accessor.access_directory() {
            dir.to_string_lossy().into_owned()
        } else {
            metadata[0]
                .1
                .last()
                .cloned()
                .unwrap_or_else(|| "unknown".to_owned())
        };

        let info = Info {
            name,
            piece_length,
            pieces,
            private: if self.private { Some(1) } else { None },
            key,
        };

        let metainfo = Metainfo {
            announce: self.main_tracker,
            announce_list: self.trackers,
            creation_date: self.creation_date,
            comment: self.comment,
            created_by: self.created_by,
            encoding: None,
            info,
        };

        metainfo.to_bytes()
    }
}

enum LayoutEntry {
    /// A file that exists on disk and must be hashed.
    Real { length: u64 },
    /// Deterministic zero-filled padding with no backing file.
    Pad { length: u64 },
}

/// Computes pad file lengths so that every `Real` entry after the first
/// starts at a piece boundary. No padding is added after the final file.
fn build_padded_layout(metadata: &[(u64, Vec<String>)], piece_length: u64) -> Vec<LayoutEntry> {
    let mut layout = Vec::with_capacity(metadata.len());
    let mut offset = 0u64;

    for (index, (len, _)) in metadata.iter().enumerate() {
        layout.push(LayoutEntry::Real { length: *len });
        offset += len;

        let is_last = index + 1 == metadata.len();
        let remainder = offset % piece_length;
        if !is_last && remainder != 0 && *len > 0 {
            let pad_len = piece_length - remainder;
            layout.push(LayoutEntry::Pad { length: pad_len });
            offset += pad_len;
        }
    }

    layout
}

/// Zips the (possibly pad-interleaved) layout back up with the real files'
/// declared paths, giving each pad entry a synthetic `.pad/<len>` path.
fn merge_layout_with_paths(layout: Vec<LayoutEntry>, metadata: Vec<(u64, Vec<String>)>) -> Vec<File> {
    let mut real_paths = metadata.into_iter();
    let mut pad_index = 0usize;

    layout
        .into_iter()
        .map(|entry| match entry {
            LayoutEntry::Real { length } => {
                let (_, path) = real_paths.next().expect("layout has one Real per file");
                File {
                    length,
                    path,
                    md5sum: None,
                    attr: None,
                    symlink_path: None,
                    sha1: None,
                    mtime: None,
                }
            }
            LayoutEntry::Pad { length } => {
                pad_index += 1;
                File {
                    length,
                    path: vec![".pad".to_owned(), pad_index.to_string()],
                    md5sum: None,
                    attr: Some("p".to_owned()),
                    symlink_path: None,
                    sha1: None,
                    mtime: None,
                }
            }
        })
        .collect()
}

/// Running state for [`generate_pieces`], broken out of the function so the
/// hashing step isn't a web of closures capturing each other.
struct PieceHasher {
    piece_length: usize,
    total_len: u64,
    pieces: Vec<u8>,
    hasher: ShaHashBuilder,
    bytes_in_piece: usize,
    hashed_total: u64,
}

impl PieceHasher {
    fn new(piece_length: usize, total_len: u64) -> PieceHasher {
        PieceHasher {
            piece_length,
            total_len,
            pieces: Vec::new(),
            hasher: ShaHashBuilder::new(),
            bytes_in_piece: 0,
            hashed_total: 0,
        }
    }

    fn hash_bytes<C: FnMut(f64)>(&mut self, buf: &[u8], progress: &mut C) {
        self.hasher = std::mem::replace(&mut self.hasher, ShaHashBuilder::new()).add_bytes(buf);
        self.bytes_in_piece += buf.len();
        self.hashed_total += buf.len() as u64;

        if self.bytes_in_piece == self.piece_length {
            self.flush(progress);
        }
    }

    fn flush<C: FnMut(f64)>(&mut self, progress: &mut C) {
        let finished = std::mem::replace(&mut self.hasher, ShaHashBuilder::new());
        self.pieces.extend_from_slice(finished.build().as_ref());
        self.bytes_in_piece = 0;

        if self.total_len > 0 {
            progress((self.hashed_total as f64 / self.total_len as f64).min(1.0));
        }
    }

    /// Hashes `length` deterministic zero bytes (a pad file's contents).
    fn hash_pad<C: FnMut(f64)>(&mut self, length: u64, progress: &mut C) {
        let zero_chunk = [0u8; 4096];
        let mut remaining = length as usize;
        while remaining > 0 {
            let space_in_piece = self.piece_length - self.bytes_in_piece;
            let take = remaining.min(zero_chunk.len()).min(space_in_piece);
            self.hash_bytes(&zero_chunk[..take], progress);
            remaining -= take;
        }
    }
}

/// Hashes the concatenation of every `Real`/`Pad` entry in `layout`, in
/// order, into `piece_length`-sized SHA-1 digests.
///
/// `access_pieces` only ever sees real, on-disk files, so this drives it
/// with a cursor into `layout` that's advanced past `Pad` entries (hashed
/// directly as zero runs) before each real file's bytes are consumed.
fn generate_pieces<A, C>(
    accessor: &A,
    layout: &[LayoutEntry],
    piece_length: u64,
    total_len: u64,
    progress: &mut C,
) -> ParseResult<Hashes>
where
    A: Accessor,
    C: FnMut(f64),
{
    let mut state = PieceHasher::new(piece_length as usize, total_len);
    let mut layout_index = 0usize;

    // Pad entries that precede the first real file (layout[0] is always
    // Real in practice, but this keeps the invariant local to one place).
    while let Some(LayoutEntry::Pad { length }) = layout.get(layout_index) {
        state.hash_pad(*length, progress);
        layout_index += 1;
    }

    accessor.access_pieces(|access| {
        match access {
            PieceAccess::PreComputed(hash) => {
                if state.bytes_in_piece != 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "pre-computed hash did not land on a piece boundary",
                    ));
                }
                state.pieces.extend_from_slice(hash.as_ref());
            }
            PieceAccess::Compute(reader) => {
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let want = (state.piece_length - state.bytes_in_piece).min(buf.len());
                    let read = reader.read(&mut buf[..want])?;
                    if read == 0 {
                        break;
                    }
                    state.hash_bytes(&buf[..read], progress);
                }
            }
        }

        // This real file corresponds to layout[layout_index]; step past it,
        // then drain any pad entries before the next real file.
        layout_index += 1;
        while let Some(LayoutEntry::Pad { length }) = layout.get(layout_index) {
            state.hash_pad(*length, progress);
            layout_index += 1;
        }

        Ok(())
    })?;

    if state.bytes_in_piece != 0 {
        state.flush(progress);
    }

    let hashes = state
        .pieces
        .chunks_exact(sha::SHA_HASH_LEN)
        .map(|chunk| {
            let mut buf = [0u8; sha::SHA_HASH_LEN];
            buf.copy_from_slice(chunk);
            buf.into()
        })
        .collect();

    Ok(Hashes(hashes))
}

/// Resolves a [`PieceLength`] strategy into a concrete power-of-two length.
fn determine_piece_length(total_file_size: u64, piece_length: PieceLength) -> u64 {
    match piece_length {
        PieceLength::Custom(len) => len,
        PieceLength::OptBalanced => {
            calculate_piece_length(total_file_size, BALANCED_MAX_PIECES_SIZE, BALANCED_MIN_PIECE_LENGTH)
        }
        PieceLength::OptFileSize => {
            calculate_piece_length(total_file_size, FILE_SIZE_MAX_PIECES_SIZE, FILE_SIZE_MIN_PIECE_LENGTH)
        }
        PieceLength::OptTransfer => {
            calculate_piece_length(total_file_size, TRANSFER_MAX_PIECES_SIZE, TRANSFER_MIN_PIECE_LENGTH)
        }
    }
}

/// Picks the smallest power-of-two piece length that keeps the `pieces`
/// string under `max_pieces_size` bytes, never going below `min_piece_length`.
fn calculate_piece_length(total_file_size: u64, max_pieces_size: u64, min_piece_length: u64) -> u64 {
    let num_pieces = (max_pieces_size as f64) / (sha::SHA_HASH_LEN as f64);
    let piece_length = ((total_file_size as f64) / num_pieces + 0.5) as u64;

    let pot_piece_length = piece_length.max(1).next_power_of_two();

    pot_piece_length.max(min_piece_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::DirectAccessor;
    use crate::info::Metainfo;

    #[test]
    fn positive_build_single_file() {
        let contents = b"hello world, this is torrent content";
        let accessor = DirectAccessor::new("hello.txt", contents);

        let bytes = MetainfoBuilder::new()
            .set_main_tracker(Some("udp://tracker.example:80"))
            .set_piece_length(PieceLength::Custom(16))
            .build(accessor, |_| {})
            .unwrap();

        let metainfo = Metainfo::from_bytes(&bytes).unwrap();
        assert_eq!(metainfo.main_tracker(), Some("udp://tracker.example:80"));
        assert_eq!(metainfo.info().total_len(), contents.len() as u64);
        assert_eq!(
            metainfo.info().num_pieces(),
            ((contents.len() + 15) / 16)
        );
    }

    #[test]
    fn positive_piece_length_is_power_of_two() {
        let len = determine_piece_length(10_000_000, PieceLength::OptBalanced);
        assert!(len.is_power_of_two());
        assert!(len >= BALANCED_MIN_PIECE_LENGTH);
    }

    #[test]
    fn positive_pad_layout_aligns_to_piece_boundary() {
        let metadata = vec![
            (17u64, vec!["a".to_owned()]),
            (612u64, vec!["b".to_owned()]),
            (3253u64, vec!["c".to_owned()]),
        ];
        let piece_length = 128u64;

        let layout = build_padded_layout(&metadata, piece_length);

        let mut offset = 0u64;
        let mut pad_count = 0usize;
        for entry in &layout {
            match entry {
                LayoutEntry::Real { length } => offset += length,
                LayoutEntry::Pad { length } => {
                    assert_eq!(offset % piece_length, 0);
                    offset += length;
                    pad_count += 1;
                }
            }
        }

        // Aligns between file a/b and b/c; nothing follows c, so no trailing pad.
        assert_eq!(pad_count, 2);
    }
}
