//! Translate `(piece, offset, length)` into a sequence of file slices.

use swarm_metainfo::Info;

use crate::error::{StorageErrorKind, StorageResult};

/// A contiguous region of one logical file that a block maps onto.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileSlice {
    /// Index into `info.files()`.
    pub file_index: usize,
    /// Byte offset within that file.
    pub file_offset: u64,
    /// Offset within the caller's block buffer this slice starts at.
    pub buffer_offset: usize,
    /// Length of the slice in bytes.
    pub length: usize,
    /// Whether this slice belongs to a pad file (never read from or
    /// written to disk; filled with zero bytes).
    pub is_pad: bool,
}

/// Map `(piece, offset_in_piece, length)` to a list of file slices, in
/// file order, whose lengths sum to `length`.
///
/// Fails with `out_of_range` if the requested span exceeds the total
/// size described by `info`.
pub fn map_block(info: &Info, piece: u64, offset: u64, length: u64) -> StorageResult<Vec<FileSlice>> {
    let piece_length = info.piece_length() as u64;
    let total_len = info.total_len();

    let mut remaining_skip = piece
        .checked_mul(piece_length)
        .and_then(|base| base.checked_add(offset))
        .ok_or_else(|| StorageErrorKind::OutOfRange {
            requested: u64::MAX,
            total: total_len,
        })?;

    if remaining_skip.checked_add(length).map_or(true, |end| end > total_len) {
        return Err(StorageErrorKind::OutOfRange {
            requested: remaining_skip + length,
            total: total_len,
        }
        .into());
    }

    let mut slices = Vec::new();
    let mut bytes_accessed: u64 = 0;

    for (file_index, file) in info.files().enumerate() {
        let file_len = file.length() as u64;
        let mut available = file_len;

        let skip_here = remaining_skip.min(available);
        remaining_skip -= skip_here;
        available -= skip_here;

        if available > 0 && bytes_accessed < length {
            let remaining_needed = length - bytes_accessed;
            let take = remaining_needed.min(available);
            let file_offset = file_len - available;

            slices.push(FileSlice {
                file_index,
                file_offset,
                buffer_offset: bytes_accessed as usize,
                length: take as usize,
                is_pad: file.is_pad_file(),
            });

            bytes_accessed += take;
        }

        if bytes_accessed == length {
            break;
        }
    }

    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::map_block;
    use swarm_metainfo::{File, Hashes, Info, Key, Metainfo};
    use swarm_util::sha::ShaHash;

    fn two_file_torrent() -> Metainfo {
        // 10-byte piece length, files of length 15 and 5 (20 bytes total, 2 pieces).
        let files = vec![
            File {
                length: 15,
                path: vec!["a.txt".to_owned()],
                md5sum: None,
                attr: None,
                symlink_path: None,
                sha1: None,
                mtime: None,
            },
            File {
                length: 5,
                path: vec!["b.txt".to_owned()],
                md5sum: None,
                attr: None,
                symlink_path: None,
                sha1: None,
                mtime: None,
            },
        ];

        let info = Info {
            name: "root".to_owned(),
            piece_length: 10,
            pieces: Hashes(vec![ShaHash::from([0u8; 20]), ShaHash::from([0u8; 20])]),
            private: None,
            key: Key::MultiFile { files },
        };

        Metainfo {
            announce: None,
            announce_list: None,
            creation_date: None,
            comment: None,
            created_by: None,
            encoding: None,
            info,
        }
    }

    #[test]
    fn positive_block_within_single_file() {
        let metainfo = two_file_torrent();
        let slices = map_block(metainfo.info(), 0, 0, 5).unwrap();

        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].file_index, 0);
        assert_eq!(slices[0].file_offset, 0);
        assert_eq!(slices[0].length, 5);
    }

    #[test]
    fn positive_block_spans_file_boundary() {
        let metainfo = two_file_torrent();
        // Piece 1 covers bytes [10, 20): bytes [10,15) of a.txt, then [0,5) of b.txt.
        let slices = map_block(metainfo.info(), 1, 0, 10).unwrap();

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].file_index, 0);
        assert_eq!(slices[0].file_offset, 10);
        assert_eq!(slices[0].length, 5);
        assert_eq!(slices[1].file_index, 1);
        assert_eq!(slices[1].file_offset, 0);
        assert_eq!(slices[1].length, 5);
    }

    #[test]
    fn negative_out_of_range() {
        let metainfo = two_file_torrent();
        assert!(map_block(metainfo.info(), 1, 5, 10).is_err());
    }
}
