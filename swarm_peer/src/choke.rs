//! Choke/interest state (§4.4 "Choking") and coalescing of pending
//! outgoing control messages.

use crate::message::Message;

/// Pending outgoing interest state, coalesced so that a later flip
/// cancels an as-yet-unsent earlier one (§4.4 "Send side": "a pending
/// `interested` cancels a pending `not_interested`").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PendingInterest {
    None,
    Interested,
    NotInterested,
}

/// The four-way choke/interest state of one peer connection.
#[derive(Debug)]
pub struct ChokeState {
    am_choking: bool,
    am_interested: bool,
    peer_choking: bool,
    peer_interested: bool,
    pending_interest: PendingInterest,
    pending_choke: Option<bool>,
}

impl Default for ChokeState {
    fn default() -> ChokeState {
        ChokeState {
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
            pending_interest: PendingInterest::None,
            pending_choke: None,
        }
    }
}

impl ChokeState {
    pub fn am_choking(&self) -> bool {
        self.am_choking
    }

    pub fn am_interested(&self) -> bool {
        self.am_interested
    }

    pub fn peer_choking(&self) -> bool {
        self.peer_choking
    }

    pub fn peer_interested(&self) -> bool {
        self.peer_interested
    }

    /// Record an incoming message's effect on the peer's state.
    pub fn on_incoming(&mut self, message: &Message) {
        match message {
            Message::Choke => self.peer_choking = true,
            Message::Unchoke => self.peer_choking = false,
            Message::Interested => self.peer_interested = true,
            Message::NotInterested => self.peer_interested = false,
            _ => {}
        }
    }

    /// Queue an outgoing interest flip, coalescing with any not-yet-sent
    /// flip in the other direction.
    pub fn set_interested(&mut self, interested: bool) {
        self.pending_interest = if interested { PendingInterest::Interested } else { PendingInterest::NotInterested };
    }

    /// Queue an outgoing choke flip for the local side, coalescing the
    /// same way as interest.
    pub fn set_choking(&mut self, choking: bool) {
        self.pending_choke = Some(choking);
    }

    /// Drain the pending control messages to flush on the send side.
    pub fn drain_pending(&mut self) -> Vec<Message> {
        let mut out = Vec::new();

        match self.pending_interest {
            PendingInterest::Interested if !self.am_interested => {
                self.am_interested = true;
                out.push(Message::Interested);
            }
            PendingInterest::NotInterested if self.am_interested => {
                self.am_interested = false;
                out.push(Message::NotInterested);
            }
            _ => {}
        }
        self.pending_interest = PendingInterest::None;

        if let Some(choking) = self.pending_choke.take() {
            if choking != self.am_choking {
                self.am_choking = choking;
                out.push(if choking { Message::Choke } else { Message::Unchoke });
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_coalesces_interest_flips() {
        let mut state = ChokeState::default();
        state.set_interested(true);
        state.set_interested(false);

        assert!(state.drain_pending().is_empty(), "flip back to the starting state sends nothing");
    }

    #[test]
    fn positive_flips_are_applied_and_idempotent() {
        let mut state = ChokeState::default();
        state.set_interested(true);
        assert_eq!(state.drain_pending(), vec![Message::Interested]);
        assert!(state.am_interested());

        assert!(state.drain_pending().is_empty());
    }

    #[test]
    fn positive_incoming_unchoke_updates_peer_choking() {
        let mut state = ChokeState::default();
        assert!(state.peer_choking());
        state.on_incoming(&Message::Unchoke);
        assert!(!state.peer_choking());
    }
}
