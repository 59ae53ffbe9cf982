//! Messages passed to and returned from the handshaking process.

use std::net::SocketAddr;

use swarm_util::bt::{InfoHash, PeerId};

use crate::extensions::Extensions;
use crate::protocol::Protocol;

/// Message used to initiate a handshake with a remote peer.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct InitiateMessage {
    prot: Protocol,
    hash: InfoHash,
    addr: SocketAddr,
}

impl InitiateMessage {
    pub fn new(prot: Protocol, hash: InfoHash, addr: SocketAddr) -> InitiateMessage {
        InitiateMessage { prot, hash, addr }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.prot
    }

    pub fn hash(&self) -> &InfoHash {
        &self.hash
    }

    pub fn address(&self) -> &SocketAddr {
        &self.addr
    }

    pub fn into_parts(self) -> (Protocol, InfoHash, SocketAddr) {
        (self.prot, self.hash, self.addr)
    }
}

/// Message containing completed handshake information, carrying the
/// socket `S` the handshake was performed over so callers can hand it
/// straight to the peer wire protocol layer.
pub struct CompleteMessage<S> {
    prot: Protocol,
    ext: Extensions,
    hash: InfoHash,
    pid: PeerId,
    addr: SocketAddr,
    sock: S,
}

impl<S> CompleteMessage<S> {
    pub fn new(prot: Protocol, ext: Extensions, hash: InfoHash, pid: PeerId, addr: SocketAddr, sock: S) -> CompleteMessage<S> {
        CompleteMessage { prot, ext, hash, pid, addr, sock }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.prot
    }

    pub fn extensions(&self) -> &Extensions {
        &self.ext
    }

    pub fn hash(&self) -> &InfoHash {
        &self.hash
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.pid
    }

    pub fn address(&self) -> &SocketAddr {
        &self.addr
    }

    pub fn socket(&self) -> &S {
        &self.sock
    }

    pub fn into_parts(self) -> (Protocol, Extensions, InfoHash, PeerId, SocketAddr, S) {
        (self.prot, self.ext, self.hash, self.pid, self.addr, self.sock)
    }
}
