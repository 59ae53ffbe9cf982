//! The block, the transfer unit REQUEST/PIECE messages address.

/// Standard block length (§ GLOSSARY "Block").
pub const BLOCK_SIZE: u64 = 16 * 1024;

/// Identifies one block within a torrent: `(piece, offset, length)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockInfo {
    pub piece: u64,
    pub offset: u64,
    pub length: u64,
}

impl BlockInfo {
    pub fn new(piece: u64, offset: u64, length: u64) -> BlockInfo {
        BlockInfo { piece, offset, length }
    }
}

/// Splits a piece of `piece_len` bytes into its `BLOCK_SIZE`-aligned
/// blocks, the last one truncated to whatever remains.
pub fn blocks_in_piece(piece: u64, piece_len: u64) -> Vec<BlockInfo> {
    let mut blocks = Vec::new();
    let mut offset = 0u64;
    while offset < piece_len {
        let length = BLOCK_SIZE.min(piece_len - offset);
        blocks.push(BlockInfo::new(piece, offset, length));
        offset += length;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_splits_evenly() {
        let blocks = blocks_in_piece(0, BLOCK_SIZE * 2);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].offset, BLOCK_SIZE);
    }

    #[test]
    fn positive_last_block_truncated() {
        let blocks = blocks_in_piece(3, BLOCK_SIZE + 100);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].length, 100);
        assert!(blocks.iter().all(|b| b.piece == 3));
    }
}
