//! Errors surfaced by the piece picker.

use swarm_metainfo::error::ParseError;

error_chain! {
    types {
        SelectError, SelectErrorKind, SelectResultExt, SelectResult;
    }

    foreign_links {
        Parse(ParseError);
    }

    errors {
        PieceOutOfRange {
            piece: u64,
            num_pieces: usize
        } {
            description("piece index is out of range for this torrent")
            display("piece {} is out of range (num_pieces = {})", piece, num_pieces)
        }
        BlockNotFound {
            piece: u64,
            offset: u64
        } {
            description("no block exists at this piece offset")
            display("no block at piece {} offset {}", piece, offset)
        }
        AlreadyFinished {
            piece: u64,
            offset: u64
        } {
            description("mutation requested on an already-finished block")
            display("block at piece {} offset {} is already finished", piece, offset)
        }
    }
}
