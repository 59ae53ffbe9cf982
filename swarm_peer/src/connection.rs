//! A single peer connection: framing, choke state, request pipeline,
//! and the keepalive/peer-timeout timers (§4.4).

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use swarm_select::BlockInfo;
use swarm_util::bt::PeerId;

use crate::choke::ChokeState;
use crate::error::PeerResult;
use crate::message::{Message, MessageCodec, PieceGeometry};
use crate::pipeline::RequestPipeline;

/// Default interval at which a zero-length keepalive is sent on an
/// otherwise idle connection (§4.4 "Timers").
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);
/// Default duration of silence (no traffic at all) before a peer is
/// disconnected.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(180);

/// One established, post-handshake peer wire protocol connection.
pub struct PeerConnection<T> {
    peer_id: PeerId,
    framed: Framed<T, MessageCodec>,
    choke: ChokeState,
    pipeline: RequestPipeline,
    last_received: Instant,
    last_sent: Instant,
    keepalive_interval: Duration,
    peer_timeout: Duration,
}

impl<T> PeerConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(peer_id: PeerId, io: T) -> PeerConnection<T> {
        let now = Instant::now();
        PeerConnection {
            peer_id,
            framed: Framed::new(io, MessageCodec::default()),
            choke: ChokeState::default(),
            pipeline: RequestPipeline::default(),
            last_received: now,
            last_sent: now,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> PeerConnection<T> {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_peer_timeout(mut self, timeout: Duration) -> PeerConnection<T> {
        self.peer_timeout = timeout;
        self
    }

    /// Bind the negotiated piece geometry so incoming PIECE messages are
    /// validated against it (§4.4 FSM: reject oversized or misaligned
    /// payloads). Without this, `recv` accepts any PIECE that parses.
    pub fn with_piece_geometry(mut self, geometry: PieceGeometry) -> PeerConnection<T> {
        let codec = MessageCodec::default().with_geometry(geometry);
        self.framed = Framed::new(self.framed.into_inner(), codec);
        self
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn choke(&self) -> &ChokeState {
        &self.choke
    }

    pub fn choke_mut(&mut self) -> &mut ChokeState {
        &mut self.choke
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// Send one message immediately, bypassing choke-flip coalescing
    /// (used for HAVE, PIECE, BITFIELD, and anything else that isn't a
    /// choke/interest flip).
    pub async fn send(&mut self, message: Message) -> PeerResult<()> {
        self.framed.send(message).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Flush any coalesced choke/interest flips queued via
    /// `choke_mut().set_interested`/`set_choking`.
    pub async fn flush_pending_control(&mut self) -> PeerResult<()> {
        let pending = self.choke.drain_pending();
        for message in pending {
            self.send(message).await?;
        }
        Ok(())
    }

    /// Receive the next message, updating choke state and the
    /// last-received timer. `Ok(None)` means the peer closed the
    /// connection cleanly.
    pub async fn recv(&mut self) -> PeerResult<Option<Message>> {
        match self.framed.next().await {
            Some(Ok(message)) => {
                self.last_received = Instant::now();
                self.choke.on_incoming(&message);
                Ok(Some(message))
            }
            Some(Err(error)) => Err(error),
            None => Ok(None),
        }
    }

    /// Request a block from this peer if its choke state and pipeline
    /// depth allow it. Returns `false` (and queues nothing) if
    /// `peer_choking` or the pipeline is already full.
    pub fn try_request(&mut self, block: BlockInfo, now: Instant) -> bool {
        if self.choke.peer_choking() || self.pipeline.available_slots() == 0 {
            return false;
        }
        self.pipeline.push(block, now);
        true
    }

    /// Blocks timed out of the request pipeline, to be returned to the
    /// picker and counted against this peer's failure budget.
    pub fn expire_requests(&mut self, now: Instant) -> Vec<BlockInfo> {
        self.pipeline.expire(now)
    }

    /// Whether a zero-length keepalive should be sent, given `now`.
    pub fn needs_keepalive(&self, now: Instant) -> bool {
        now.duration_since(self.last_sent) >= self.keepalive_interval
    }

    /// Whether this connection has been silent long enough to
    /// disconnect for inactivity.
    pub fn timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.last_received) >= self.peer_timeout
    }

    /// Consume the connection, returning every block still in flight so
    /// the caller can hand them back to the picker.
    pub fn into_outstanding_requests(mut self) -> Vec<BlockInfo> {
        self.pipeline.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn peer_id(byte: u8) -> PeerId {
        PeerId::from([byte; 20])
    }

    #[tokio::test]
    async fn positive_send_then_recv_round_trip() {
        let (client_io, server_io) = duplex(4096);
        let mut client = PeerConnection::new(peer_id(1), client_io);
        let mut server = PeerConnection::new(peer_id(2), server_io);

        client.send(Message::Interested).await.unwrap();
        let received = server.recv().await.unwrap().unwrap();

        assert_eq!(received, Message::Interested);
        assert!(server.choke().peer_interested());
    }

    #[tokio::test]
    async fn positive_recv_rejects_piece_exceeding_negotiated_size() {
        let (client_io, server_io) = duplex(4096);
        let mut client = PeerConnection::new(peer_id(1), client_io);
        let mut server = PeerConnection::new(peer_id(2), server_io)
            .with_piece_geometry(PieceGeometry::new(16 * 1024, 16 * 1024));

        let oversized = Message::Piece { piece: 0, begin: 0, block: vec![0u8; 16 * 1024 + 1].into() };
        client.send(oversized).await.unwrap();

        let result = server.recv().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn positive_try_request_respects_peer_choking() {
        let (client_io, _server_io) = duplex(4096);
        let mut client = PeerConnection::new(peer_id(1), client_io);

        let block = BlockInfo::new(0, 0, 16 * 1024);
        assert!(!client.try_request(block, Instant::now()), "peer starts choking us");

        client.choke_mut().on_incoming(&Message::Unchoke);
        assert!(client.try_request(block, Instant::now()));
    }
}
