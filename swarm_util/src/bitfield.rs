//! A piece bitmap, stored as a dense bit set indexed by piece index.
//!
//! On the wire a bitfield is a byte string where piece 0 is the highest
//! order bit of the first byte; `Bitfield` stores pieces with the natural
//! (lowest bit = index 0) ordering that `bit_set::BitSet` expects and
//! flips the bit order only at the wire boundary.

use bit_set::BitSet;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bitfield {
    bits: BitSet<u32>,
    num_pieces: usize,
}

impl Bitfield {
    pub fn new(num_pieces: usize) -> Bitfield {
        Bitfield { bits: BitSet::with_capacity(num_pieces), num_pieces }
    }

    /// Parse a bitfield message payload for a torrent with `num_pieces` pieces.
    ///
    /// Trailing spare bits (padding out the last byte) are ignored even if set.
    pub fn from_wire_bytes(bytes: &[u8], num_pieces: usize) -> Bitfield {
        let mut bits = BitSet::with_capacity(num_pieces);

        for (byte_index, byte) in bytes.iter().enumerate() {
            for bit_index in 0..8 {
                let piece = byte_index * 8 + bit_index;
                if piece >= num_pieces {
                    break;
                }

                let mask = 0x80u8 >> bit_index;
                if byte & mask != 0 {
                    bits.insert(piece);
                }
            }
        }

        Bitfield { bits, num_pieces }
    }

    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let num_bytes = (self.num_pieces + 7) / 8;
        let mut out = vec![0u8; num_bytes];

        for piece in self.bits.iter() {
            out[piece / 8] |= 0x80 >> (piece % 8);
        }

        out
    }

    pub fn num_pieces(&self) -> usize {
        self.num_pieces
    }

    pub fn has_piece(&self, piece: usize) -> bool {
        self.bits.contains(piece)
    }

    pub fn set_piece(&mut self, piece: usize) {
        debug_assert!(piece < self.num_pieces);
        self.bits.insert(piece);
    }

    pub fn unset_piece(&mut self, piece: usize) {
        self.bits.remove(piece);
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn count(&self) -> usize {
        self.bits.len()
    }

    pub fn is_full(&self) -> bool {
        self.count() == self.num_pieces
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter()
    }

    /// Pieces present in `self` but not in `other` (what we could request from them).
    pub fn difference<'a>(&'a self, other: &'a Bitfield) -> impl Iterator<Item = usize> + 'a {
        self.bits.difference(&other.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::Bitfield;

    #[test]
    fn positive_round_trip_single_byte() {
        let mut bf = Bitfield::new(8);
        bf.set_piece(0);
        bf.set_piece(7);

        let bytes = bf.to_wire_bytes();
        assert_eq!(bytes, vec![0x81]);

        let parsed = Bitfield::from_wire_bytes(&bytes, 8);
        assert!(parsed.has_piece(0));
        assert!(parsed.has_piece(7));
        assert!(!parsed.has_piece(3));
    }

    #[test]
    fn positive_ignores_spare_bits() {
        let bytes = [0xFFu8];
        let bf = Bitfield::from_wire_bytes(&bytes, 3);

        assert_eq!(bf.count(), 3);
        assert!(!bf.has_piece(7));
    }

    #[test]
    fn positive_multi_byte() {
        let mut bf = Bitfield::new(16);
        bf.set_piece(0);
        bf.set_piece(8);
        bf.set_piece(15);

        let bytes = bf.to_wire_bytes();
        assert_eq!(bytes, vec![0x80, 0x81]);
    }
}
