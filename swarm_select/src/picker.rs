//! The piece picker (§4.3): rarest-first selection with priority
//! classes, affinity, whole-piece mode, and end-game duplication.

use std::collections::{HashMap, HashSet};

use log::trace;
use swarm_metainfo::Metainfo;
use swarm_util::bt::{InfoHash, PeerId};
use swarm_util::trans::{LocallyShuffledIds, TransactionIds};
use swarm_util::Bitfield;

use crate::block::{blocks_in_piece, BlockInfo};
use crate::error::{SelectErrorKind, SelectResult};

/// Default piece priority assigned when a torrent is registered; the
/// middle of the 0..=7 scale, so later calls to `set_priority` can move
/// a piece either more or less urgent without a special-cased baseline.
pub const DEFAULT_PRIORITY: u8 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BlockState {
    Open,
    Requested,
    Writing,
    Finished,
}

struct BlockSlot {
    info: BlockInfo,
    state: BlockState,
    holders: HashSet<PeerId>,
}

struct PieceEntry {
    priority: u8,
    peer_count: usize,
    shuffle_key: u64,
    blocks: Vec<BlockSlot>,
    requesting_peers: HashSet<PeerId>,
}

impl PieceEntry {
    fn all_finished(&self) -> bool {
        self.blocks.iter().all(|b| b.state == BlockState::Finished)
    }

    fn has_open(&self) -> bool {
        self.blocks.iter().any(|b| b.state == BlockState::Open)
    }

    fn has_requested(&self) -> bool {
        self.blocks.iter().any(|b| b.state == BlockState::Requested)
    }

    fn block_mut(&mut self, offset: u64) -> Option<&mut BlockSlot> {
        self.blocks.iter_mut().find(|b| b.info.offset == offset)
    }
}

/// Tunables for the selection algorithm beyond the per-piece priority.
#[derive(Copy, Clone, Debug)]
pub struct SelectorSettings {
    /// Pipeline depth at or above which whole-piece mode kicks in
    /// (§4.3 point 5).
    pub whole_pieces_threshold: usize,
    /// Maximum number of peers that may simultaneously hold the same
    /// block during end-game (§4.3 point 6).
    pub end_game_duplication_cap: usize,
    /// Seeds the rarest-first tie-break permutation (§4.3 point 3).
    /// Identical inputs and the same seed reproduce the same picks.
    pub seed: u64,
}

impl Default for SelectorSettings {
    fn default() -> SelectorSettings {
        SelectorSettings {
            whole_pieces_threshold: 4,
            end_game_duplication_cap: 2,
            seed: 0,
        }
    }
}

/// Per-torrent piece selection state, as named throughout §4.3.
pub struct PieceSelector {
    info_hash: InfoHash,
    pieces: Vec<PieceEntry>,
    we_have: Bitfield,
    peer_pieces: HashMap<PeerId, Bitfield>,
    shuffle: LocallyShuffledIds<u64>,
    settings: SelectorSettings,
}

impl PieceSelector {
    pub fn new(metainfo: &Metainfo, settings: SelectorSettings) -> SelectResult<PieceSelector> {
        let info = metainfo.info();
        let num_pieces = info.num_pieces();

        let mut shuffle = LocallyShuffledIds::new(settings.seed);
        let pieces = (0..num_pieces)
            .map(|index| PieceEntry {
                priority: DEFAULT_PRIORITY,
                peer_count: 0,
                shuffle_key: shuffle.generate(),
                blocks: blocks_in_piece(index as u64, info.piece_size(index))
                    .into_iter()
                    .map(|b| BlockSlot { info: b, state: BlockState::Open, holders: HashSet::new() })
                    .collect(),
                requesting_peers: HashSet::new(),
            })
            .collect();

        Ok(PieceSelector {
            info_hash: metainfo.info_hash()?,
            pieces,
            we_have: Bitfield::new(num_pieces),
            peer_pieces: HashMap::new(),
            shuffle,
            settings,
        })
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }

    fn piece(&self, piece: u64) -> SelectResult<&PieceEntry> {
        self.pieces
            .get(piece as usize)
            .ok_or_else(|| SelectErrorKind::PieceOutOfRange { piece, num_pieces: self.pieces.len() }.into())
    }

    fn piece_mut(&mut self, piece: u64) -> SelectResult<&mut PieceEntry> {
        let num_pieces = self.pieces.len();
        self.pieces
            .get_mut(piece as usize)
            .ok_or_else(|| SelectErrorKind::PieceOutOfRange { piece, num_pieces }.into())
    }

    pub fn set_priority(&mut self, piece: u64, priority: u8) -> SelectResult<()> {
        self.piece_mut(piece)?.priority = priority.min(7);
        Ok(())
    }

    fn piece_wanted(&self, piece: usize) -> bool {
        self.pieces[piece].priority > 0 && !self.we_have.has_piece(piece)
    }

    // ---- peer bookkeeping -------------------------------------------------

    pub fn add_peer(&mut self, peer: PeerId) {
        self.peer_pieces.entry(peer).or_insert_with(|| Bitfield::new(self.pieces.len()));
    }

    pub fn remove_peer(&mut self, peer: PeerId) {
        if let Some(bits) = self.peer_pieces.remove(&peer) {
            for piece in bits.iter() {
                self.pieces[piece].peer_count = self.pieces[piece].peer_count.saturating_sub(1);
            }
        }

        for entry in &mut self.pieces {
            entry.requesting_peers.remove(&peer);
            for block in &mut entry.blocks {
                if block.holders.remove(&peer) && block.holders.is_empty() && block.state != BlockState::Finished {
                    block.state = BlockState::Open;
                }
            }
        }
    }

    pub fn peer_bitfield(&mut self, peer: PeerId, bitfield: &Bitfield) {
        let previous = self.peer_pieces.entry(peer).or_insert_with(|| Bitfield::new(self.pieces.len()));
        for piece in bitfield.iter() {
            if !previous.has_piece(piece) {
                self.pieces[piece].peer_count += 1;
            }
        }
        for piece in previous.iter() {
            if !bitfield.has_piece(piece) {
                self.pieces[piece].peer_count = self.pieces[piece].peer_count.saturating_sub(1);
            }
        }
        *previous = bitfield.clone();
    }

    pub fn peer_have(&mut self, peer: PeerId, piece: u64) -> SelectResult<()> {
        self.piece(piece)?;
        let bits = self.peer_pieces.entry(peer).or_insert_with(|| Bitfield::new(self.pieces.len()));
        if !bits.has_piece(piece as usize) {
            bits.set_piece(piece as usize);
            self.pieces[piece as usize].peer_count += 1;
        }
        Ok(())
    }

    // ---- selection ----------------------------------------------------

    /// Select up to `count` blocks to request from `peer`, who has
    /// pipeline depth `pipeline_depth` already outstanding.
    pub fn pick_blocks(&mut self, peer: PeerId, pipeline_depth: usize, count: usize) -> Vec<BlockInfo> {
        let mut picked = Vec::new();
        if count == 0 {
            return picked;
        }

        let peer_bits = match self.peer_pieces.get(&peer) {
            Some(bits) => bits.clone(),
            None => return picked,
        };

        // Step 4: affinity. If the peer already has outstanding requests
        // in a partial piece, fill it out first.
        if let Some(piece_idx) = self.affinity_piece(peer) {
            self.pick_from_piece(piece_idx, peer, count, &mut picked);
        }
        if picked.len() >= count {
            return picked;
        }

        let mut candidates: Vec<usize> =
            (0..self.pieces.len()).filter(|&i| self.piece_wanted(i) && peer_bits.has_piece(i)).collect();
        self.sort_by_priority_then_rarity(&mut candidates);

        let whole_piece_mode = pipeline_depth >= self.settings.whole_pieces_threshold;

        // Step 5: whole-piece mode prefers pieces already in progress
        // over starting a fresh one, to avoid fragmentation.
        if whole_piece_mode {
            for &piece_idx in &candidates {
                if picked.len() >= count {
                    break;
                }
                if self.pieces[piece_idx].has_requested() {
                    self.pick_from_piece(piece_idx, peer, count, &mut picked);
                }
            }
        }

        for &piece_idx in &candidates {
            if picked.len() >= count {
                break;
            }
            self.pick_from_piece(piece_idx, peer, count, &mut picked);
        }

        // Step 6: end-game. Once the normal pass can't fill the request
        // because remaining candidate blocks are already requested,
        // duplicate up to the cap rather than starve the peer.
        if picked.len() < count && !candidates.is_empty() {
            trace!("entering end-game duplication for {} candidate pieces", candidates.len());
            self.pick_end_game(&candidates, peer, count, &mut picked);
        }

        picked
    }

    fn affinity_piece(&self, peer: PeerId) -> Option<usize> {
        self.pieces.iter().enumerate().find_map(|(index, entry)| {
            if entry.requesting_peers.contains(&peer) && !entry.all_finished() && entry.has_open() {
                Some(index)
            } else {
                None
            }
        })
    }

    fn sort_by_priority_then_rarity(&self, candidates: &mut [usize]) {
        candidates.sort_by(|&a, &b| {
            let pa = &self.pieces[a];
            let pb = &self.pieces[b];
            pb.priority
                .cmp(&pa.priority)
                .then(pa.peer_count.cmp(&pb.peer_count))
                .then(pa.shuffle_key.cmp(&pb.shuffle_key))
        });
    }

    fn pick_from_piece(&mut self, piece_idx: usize, peer: PeerId, count: usize, picked: &mut Vec<BlockInfo>) {
        let entry = &mut self.pieces[piece_idx];
        for block in &mut entry.blocks {
            if picked.len() >= count {
                break;
            }
            if block.state == BlockState::Open {
                block.state = BlockState::Requested;
                block.holders.insert(peer);
                picked.push(block.info);
                entry.requesting_peers.insert(peer);
            }
        }
    }

    fn pick_end_game(&mut self, candidates: &[usize], peer: PeerId, count: usize, picked: &mut Vec<BlockInfo>) {
        let cap = self.settings.end_game_duplication_cap;
        for &piece_idx in candidates {
            if picked.len() >= count {
                break;
            }
            let entry = &mut self.pieces[piece_idx];
            for block in &mut entry.blocks {
                if picked.len() >= count {
                    break;
                }
                if block.state == BlockState::Requested && block.holders.len() < cap && !block.holders.contains(&peer) {
                    block.holders.insert(peer);
                    picked.push(block.info);
                    entry.requesting_peers.insert(peer);
                }
            }
        }
    }

    // ---- mutation operations (§4.3) ------------------------------------

    pub fn mark_as_downloading(&mut self, block: BlockInfo, peer: PeerId) -> SelectResult<()> {
        let num_pieces = self.pieces.len();
        let entry = self
            .pieces
            .get_mut(block.piece as usize)
            .ok_or_else(|| SelectErrorKind::PieceOutOfRange { piece: block.piece, num_pieces })?;
        let slot = entry
            .block_mut(block.offset)
            .ok_or_else(|| SelectErrorKind::BlockNotFound { piece: block.piece, offset: block.offset })?;

        if slot.state == BlockState::Finished {
            return Err(SelectErrorKind::AlreadyFinished { piece: block.piece, offset: block.offset }.into());
        }

        slot.state = BlockState::Requested;
        slot.holders.insert(peer);
        entry.requesting_peers.insert(peer);
        Ok(())
    }

    pub fn mark_as_writing(&mut self, block: BlockInfo, peer: PeerId) -> SelectResult<HashSet<PeerId>> {
        let entry = self
            .pieces
            .get_mut(block.piece as usize)
            .ok_or_else(|| SelectErrorKind::PieceOutOfRange { piece: block.piece, num_pieces: self.pieces.len() })?;
        let slot = entry
            .block_mut(block.offset)
            .ok_or_else(|| SelectErrorKind::BlockNotFound { piece: block.piece, offset: block.offset })?;

        if slot.state == BlockState::Finished {
            return Err(SelectErrorKind::AlreadyFinished { piece: block.piece, offset: block.offset }.into());
        }

        let mut others = slot.holders.clone();
        others.remove(&peer);
        slot.state = BlockState::Writing;
        slot.holders.clear();
        slot.holders.insert(peer);
        Ok(others)
    }

    pub fn mark_as_finished(&mut self, block: BlockInfo, peer: PeerId) -> SelectResult<()> {
        let entry = self
            .pieces
            .get_mut(block.piece as usize)
            .ok_or_else(|| SelectErrorKind::PieceOutOfRange { piece: block.piece, num_pieces: self.pieces.len() })?;
        {
            let slot = entry
                .block_mut(block.offset)
                .ok_or_else(|| SelectErrorKind::BlockNotFound { piece: block.piece, offset: block.offset })?;
            slot.state = BlockState::Finished;
            slot.holders.clear();
        }

        if !entry.blocks.iter().any(|b| b.holders.contains(&peer)) {
            entry.requesting_peers.remove(&peer);
        }
        Ok(())
    }

    pub fn abort_download(&mut self, block: BlockInfo, peer: PeerId) -> SelectResult<()> {
        let entry = self
            .pieces
            .get_mut(block.piece as usize)
            .ok_or_else(|| SelectErrorKind::PieceOutOfRange { piece: block.piece, num_pieces: self.pieces.len() })?;
        {
            let slot = entry
                .block_mut(block.offset)
                .ok_or_else(|| SelectErrorKind::BlockNotFound { piece: block.piece, offset: block.offset })?;

            if slot.state == BlockState::Finished {
                return Err(SelectErrorKind::AlreadyFinished { piece: block.piece, offset: block.offset }.into());
            }

            slot.holders.remove(&peer);
            if slot.holders.is_empty() {
                slot.state = BlockState::Open;
            }
        }

        if !entry.blocks.iter().any(|b| b.holders.contains(&peer)) {
            entry.requesting_peers.remove(&peer);
        }
        Ok(())
    }

    pub fn we_have(&mut self, piece: u64) -> SelectResult<()> {
        let entry = self.piece_mut(piece)?;
        for block in &mut entry.blocks {
            block.state = BlockState::Finished;
            block.holders.clear();
        }
        entry.requesting_peers.clear();
        self.we_have.set_piece(piece as usize);
        Ok(())
    }

    pub fn we_dont_have(&mut self, piece: u64) -> SelectResult<()> {
        self.piece(piece)?;
        self.we_have.unset_piece(piece as usize);
        Ok(())
    }

    pub fn restore_piece(&mut self, piece: u64) -> SelectResult<()> {
        self.we_have.unset_piece(piece as usize);
        let entry = self.piece_mut(piece)?;
        for block in &mut entry.blocks {
            block.state = BlockState::Open;
            block.holders.clear();
        }
        entry.requesting_peers.clear();
        Ok(())
    }

    /// Our current bitfield, for announcing and for completion checks.
    pub fn we_have_bitfield(&self) -> &Bitfield {
        &self.we_have
    }

    /// Whether every wanted piece is finished (priority-0 pieces don't
    /// block completion).
    pub fn is_complete(&self) -> bool {
        self.pieces
            .iter()
            .enumerate()
            .all(|(index, entry)| entry.priority == 0 || self.we_have.has_piece(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_metainfo::{DirectAccessor, MetainfoBuilder, PieceLength};
    use swarm_util::sha::ShaHash;

    fn metainfo(num_pieces: usize, piece_len: u64) -> Metainfo {
        let data = vec![0u8; num_pieces * piece_len as usize];
        let accessor = DirectAccessor::new("a.txt", &data);
        let bytes = MetainfoBuilder::new()
            .set_piece_length(PieceLength::Custom(piece_len))
            .build(accessor, |_| ())
            .unwrap();
        Metainfo::from_bytes(&bytes).unwrap()
    }

    fn peer(byte: u8) -> PeerId {
        ShaHash::from([byte; 20])
    }

    #[test]
    fn positive_rarest_first_picks_least_available() {
        let mi = metainfo(3, crate::block::BLOCK_SIZE);
        let mut selector = PieceSelector::new(&mi, SelectorSettings::default()).unwrap();

        let p1 = peer(1);
        let p2 = peer(2);
        selector.add_peer(p1);
        selector.add_peer(p2);

        // Both peers have everything, but piece 1 is rarer (only p1).
        selector.peer_have(p1, 0).unwrap();
        selector.peer_have(p1, 1).unwrap();
        selector.peer_have(p1, 2).unwrap();
        selector.peer_have(p2, 0).unwrap();
        selector.peer_have(p2, 2).unwrap();

        let picked = selector.pick_blocks(p1, 0, 1);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].piece, 1);
    }

    #[test]
    fn positive_affinity_keeps_peer_on_same_piece() {
        let mi = metainfo(2, crate::block::BLOCK_SIZE * 2);
        let mut selector = PieceSelector::new(&mi, SelectorSettings::default()).unwrap();

        let p1 = peer(9);
        selector.add_peer(p1);
        selector.peer_have(p1, 0).unwrap();
        selector.peer_have(p1, 1).unwrap();

        let first = selector.pick_blocks(p1, 0, 1);
        assert_eq!(first[0].piece, 0);

        let second = selector.pick_blocks(p1, 1, 1);
        assert_eq!(second[0].piece, 0, "affinity should keep picking from piece 0");
    }

    #[test]
    fn positive_abort_reopens_block_with_no_other_holder() {
        let mi = metainfo(1, crate::block::BLOCK_SIZE);
        let mut selector = PieceSelector::new(&mi, SelectorSettings::default()).unwrap();

        let p1 = peer(3);
        selector.add_peer(p1);
        selector.peer_have(p1, 0).unwrap();

        let picked = selector.pick_blocks(p1, 0, 1);
        let block = picked[0];

        selector.abort_download(block, p1).unwrap();

        let picked_again = selector.pick_blocks(p1, 0, 1);
        assert_eq!(picked_again[0], block);
    }

    #[test]
    fn positive_end_game_duplicates_when_all_requested() {
        let mi = metainfo(1, crate::block::BLOCK_SIZE);
        let mut selector = PieceSelector::new(&mi, SelectorSettings::default()).unwrap();

        let p1 = peer(4);
        let p2 = peer(5);
        selector.add_peer(p1);
        selector.add_peer(p2);
        selector.peer_have(p1, 0).unwrap();
        selector.peer_have(p2, 0).unwrap();

        let first = selector.pick_blocks(p1, 0, 1);
        assert_eq!(first.len(), 1);

        let second = selector.pick_blocks(p2, 0, 1);
        assert_eq!(second, first, "end-game should duplicate the only outstanding block");
    }

    #[test]
    fn positive_restore_piece_reopens_all_blocks() {
        let mi = metainfo(1, crate::block::BLOCK_SIZE * 2);
        let mut selector = PieceSelector::new(&mi, SelectorSettings::default()).unwrap();

        let p1 = peer(6);
        selector.add_peer(p1);
        selector.peer_have(p1, 0).unwrap();

        let picked = selector.pick_blocks(p1, 0, 2);
        assert_eq!(picked.len(), 2);

        selector.restore_piece(0).unwrap();
        let picked_again = selector.pick_blocks(p1, 0, 2);
        assert_eq!(picked_again.len(), 2);
    }

    #[test]
    fn negative_zero_priority_piece_never_picked() {
        let mi = metainfo(2, crate::block::BLOCK_SIZE);
        let mut selector = PieceSelector::new(&mi, SelectorSettings::default()).unwrap();
        selector.set_priority(0, 0).unwrap();

        let p1 = peer(7);
        selector.add_peer(p1);
        selector.peer_have(p1, 0).unwrap();
        selector.peer_have(p1, 1).unwrap();

        let picked = selector.pick_blocks(p1, 0, 10);
        assert!(picked.iter().all(|b| b.piece == 1));
    }
}
