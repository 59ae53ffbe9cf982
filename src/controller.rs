//! The swarm controller's torrent state machine (§4.5): reacts to
//! disk-job completions and hash results, owns the picker, and tracks
//! per-peer failure counts. Deliberately decoupled from any particular
//! executor loop or disk transport — the caller drives it by calling
//! these methods from wherever it receives `swarm_disk::Completion`s
//! and hashed-piece results.

use std::collections::HashMap;

use swarm_disk::StorageId;
use swarm_metainfo::Metainfo;
use swarm_select::{PieceSelector, SelectorSettings};
use swarm_util::bt::PeerId;

use crate::error::{SwarmErrorKind, SwarmResult};

/// §4.5's state diagram. `Error` is terminal until the user intervenes
/// (e.g. by re-submitting `check_files`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentState {
    CheckingResume,
    CheckingFiles,
    Downloading,
    Finished,
    Seeding,
    Error { reason: String },
}

impl TorrentState {
    fn name(&self) -> &'static str {
        match self {
            TorrentState::CheckingResume => "checking_resume",
            TorrentState::CheckingFiles => "checking_files",
            TorrentState::Downloading => "downloading",
            TorrentState::Finished => "finished",
            TorrentState::Seeding => "seeding",
            TorrentState::Error { .. } => "error",
        }
    }
}

/// What the caller should do after a piece hash job completes.
pub enum PieceHashOutcome {
    /// The piece matched; `now_complete` is true once every wanted
    /// piece is verified (the caller should then announce HAVE and,
    /// once an optional `completed` tracker event has gone out, call
    /// [`TorrentController::begin_seeding`]).
    Verified { now_complete: bool },
    /// The piece failed verification; `disconnect` lists peers whose
    /// failure count just crossed `max_failcount` and should be dropped.
    Failed { disconnect: Vec<PeerId> },
}

/// Owns one torrent's picker and state machine.
pub struct TorrentController {
    storage: StorageId,
    state: TorrentState,
    picker: PieceSelector,
    max_failcount: u32,
    failcounts: HashMap<PeerId, u32>,
}

impl TorrentController {
    pub fn new(metainfo: &Metainfo, storage: StorageId, picker_settings: SelectorSettings, max_failcount: u32) -> SwarmResult<TorrentController> {
        Ok(TorrentController {
            storage,
            state: TorrentState::CheckingResume,
            picker: PieceSelector::new(metainfo, picker_settings)?,
            max_failcount,
            failcounts: HashMap::new(),
        })
    }

    pub fn storage(&self) -> StorageId {
        self.storage
    }

    pub fn state(&self) -> &TorrentState {
        &self.state
    }

    pub fn picker(&self) -> &PieceSelector {
        &self.picker
    }

    pub fn picker_mut(&mut self) -> &mut PieceSelector {
        &mut self.picker
    }

    /// "On start: submit `check_fastresume`; on success, transition to
    /// `downloading` (or `seeding` if all pieces verified)."
    pub fn on_fastresume_checked(&mut self, matched: bool) {
        if matched {
            self.advance_past_verification();
        } else {
            self.state = TorrentState::CheckingFiles;
        }
    }

    /// "On resume-data mismatch: submit `check_files` which hashes each
    /// piece present and tells the picker what we have."
    pub fn on_files_checked(&mut self, good_pieces: &[u64]) -> SwarmResult<()> {
        for &piece in good_pieces {
            self.picker.we_have(piece)?;
        }
        self.advance_past_verification();
        Ok(())
    }

    fn advance_past_verification(&mut self) {
        self.state = if self.picker.is_complete() { TorrentState::Seeding } else { TorrentState::Downloading };
    }

    /// "On every piece flush: issue a hash job; on match, mark
    /// verified, announce HAVE to all peers, possibly advance to
    /// finished." `contributors` are the peers whose blocks made up
    /// this piece.
    pub fn on_piece_hashed(&mut self, piece: u64, matched: bool, contributors: &[PeerId]) -> SwarmResult<PieceHashOutcome> {
        if matched {
            self.picker.we_have(piece)?;
            for peer in contributors {
                self.failcounts.remove(peer);
            }

            let now_complete = self.picker.is_complete();
            if now_complete && self.state == TorrentState::Downloading {
                self.state = TorrentState::Finished;
            }
            Ok(PieceHashOutcome::Verified { now_complete })
        } else {
            self.on_hash_mismatch(piece, contributors)
        }
    }

    /// "On hash mismatch: call `picker.restore_piece`, increment the
    /// failure counter for peers that contributed blocks, disconnect
    /// peers whose failure counter exceeds the threshold."
    fn on_hash_mismatch(&mut self, piece: u64, contributors: &[PeerId]) -> SwarmResult<PieceHashOutcome> {
        self.picker.restore_piece(piece)?;

        let mut disconnect = Vec::new();
        for &peer in contributors {
            let count = self.failcounts.entry(peer).or_insert(0);
            *count += 1;
            if *count > self.max_failcount {
                disconnect.push(peer);
            }
        }

        Ok(PieceHashOutcome::Failed { disconnect })
    }

    /// Move from `finished` to `seeding`, once the caller has announced
    /// the `completed` tracker event.
    pub fn begin_seeding(&mut self) -> SwarmResult<()> {
        match self.state {
            TorrentState::Finished => {
                self.state = TorrentState::Seeding;
                Ok(())
            }
            _ => Err(SwarmErrorKind::InvalidStateTransition { from: self.state.name(), to: "seeding" }.into()),
        }
    }

    /// "persistent [disk error] -> mark the swarm errored, stop
    /// announcing, keep peer connections only for uploads of
    /// already-verified pieces" (§7).
    pub fn on_fatal_disk_error(&mut self, reason: String) {
        self.state = TorrentState::Error { reason };
    }

    /// The failure count a peer has accumulated from contributing to
    /// hash-mismatched pieces.
    pub fn failcount(&self, peer: PeerId) -> u32 {
        self.failcounts.get(&peer).copied().unwrap_or(0)
    }

    pub fn forget_peer(&mut self, peer: PeerId) {
        self.failcounts.remove(&peer);
        self.picker.remove_peer(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_metainfo::{DirectAccessor, MetainfoBuilder, PieceLength};

    fn metainfo() -> Metainfo {
        let data = vec![1u8; 16 * 1024 * 2];
        let accessor = DirectAccessor::new("a.txt", &data);
        let bytes = MetainfoBuilder::new()
            .set_piece_length(PieceLength::Custom(16 * 1024))
            .build(accessor, |_| ())
            .unwrap();
        Metainfo::from_bytes(&bytes).unwrap()
    }

    fn peer(byte: u8) -> PeerId {
        PeerId::from([byte; 20])
    }

    fn storage_id() -> StorageId {
        swarm_disk::StorageIdGenerator::new().generate()
    }

    #[test]
    fn positive_fastresume_match_with_full_bitfield_goes_straight_to_seeding() {
        let mut controller = TorrentController::new(&metainfo(), storage_id(), SelectorSettings::default(), 5).unwrap();
        controller.picker_mut().we_have(0).unwrap();
        controller.picker_mut().we_have(1).unwrap();

        controller.on_fastresume_checked(true);
        assert_eq!(*controller.state(), TorrentState::Seeding);
    }

    #[test]
    fn positive_hash_match_completes_and_then_begins_seeding() {
        let mut controller = TorrentController::new(&metainfo(), storage_id(), SelectorSettings::default(), 5).unwrap();
        controller.on_fastresume_checked(false);
        controller.on_files_checked(&[]).unwrap();
        assert_eq!(*controller.state(), TorrentState::Downloading);

        controller.on_piece_hashed(0, true, &[peer(1)]).unwrap();
        assert_eq!(*controller.state(), TorrentState::Downloading);

        let outcome = controller.on_piece_hashed(1, true, &[peer(1)]).unwrap();
        assert!(matches!(outcome, PieceHashOutcome::Verified { now_complete: true }));
        assert_eq!(*controller.state(), TorrentState::Finished);

        controller.begin_seeding().unwrap();
        assert_eq!(*controller.state(), TorrentState::Seeding);
    }

    #[test]
    fn negative_hash_mismatch_disconnects_peer_past_failcount() {
        let mut controller = TorrentController::new(&metainfo(), storage_id(), SelectorSettings::default(), 1).unwrap();
        controller.on_fastresume_checked(false);
        controller.on_files_checked(&[]).unwrap();

        let first = controller.on_piece_hashed(0, false, &[peer(9)]).unwrap();
        assert!(matches!(first, PieceHashOutcome::Failed { ref disconnect } if disconnect.is_empty()));

        let second = controller.on_piece_hashed(0, false, &[peer(9)]).unwrap();
        match second {
            PieceHashOutcome::Failed { disconnect } => assert_eq!(disconnect, vec![peer(9)]),
            _ => panic!("expected Failed"),
        }
    }

    #[test]
    fn negative_begin_seeding_outside_finished_is_rejected() {
        let mut controller = TorrentController::new(&metainfo(), storage_id(), SelectorSettings::default(), 5).unwrap();
        assert!(controller.begin_seeding().is_err());
    }
}
