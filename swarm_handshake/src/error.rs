//! Errors for connection establishment and handshaking.

use std::io;

use swarm_util::bt::{InfoHash, PeerId};

error_chain! {
    types {
        HandshakeError, HandshakeErrorKind, HandshakeResultExt, HandshakeResult;
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        ProtocolMismatch {
            expected: Vec<u8>,
            actual: Vec<u8>
        } {
            description("peer advertised a different protocol string")
            display("protocol mismatch: expected {:?}, got {:?}", expected, actual)
        }
        InfoHashMismatch {
            hash: InfoHash
        } {
            description("peer's info hash does not match any tracked swarm")
            display("no swarm registered for info hash {:?}", hash)
        }
        DuplicatePeerId {
            peer_id: PeerId
        } {
            description("peer id is already attached to this swarm")
            display("peer id {:?} already has a live connection to this swarm", peer_id)
        }
        ConnectTimedOut {
            millis: u64
        } {
            description("connection attempt did not complete within the configured timeout")
            display("connect timed out after {} ms", millis)
        }
        HandshakeTimedOut {
            millis: u64
        } {
            description("handshake did not complete within the configured timeout")
            display("handshake timed out after {} ms", millis)
        }
        Filtered {
            reason: String
        } {
            description("connection rejected by the configured filter")
            display("connection filtered: {}", reason)
        }
    }
}
