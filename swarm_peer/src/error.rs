//! Errors for peer wire protocol framing and connection handling.

use std::io;

error_chain! {
    types {
        PeerError, PeerErrorKind, PeerResultExt, PeerResult;
    }

    foreign_links {
        Io(io::Error);
        Bencode(serde_bencode::Error);
    }

    errors {
        MessageTooLarge {
            len: u32,
            max: u32
        } {
            description("message length exceeds the configured maximum packet size")
            display("message of {} bytes exceeds the {} byte cap", len, max)
        }
        UnknownExtendedId {
            id: u8
        } {
            description("extended message id has no registered handler")
            display("unrecognized extended message id {}", id)
        }
        ProtocolViolation {
            reason: String
        } {
            description("peer violated the wire protocol")
            display("protocol violation: {}", reason)
        }
    }
}
