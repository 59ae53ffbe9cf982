//! The peer wire protocol (§4.4): message framing, the extension
//! handshake, choke/interest state, and the outbound request pipeline.

#[macro_use]
extern crate error_chain;

pub mod error;

mod choke;
mod connection;
mod extension;
mod message;
mod pipeline;

pub use crate::choke::ChokeState;
pub use crate::connection::{PeerConnection, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_PEER_TIMEOUT};
pub use crate::extension::{ExtendedHandshake, ExtensionIds, EXTENDED_HANDSHAKE_ID, UT_METADATA, UT_PEX};
pub use crate::message::{Message, MessageCodec, PieceGeometry, DEFAULT_MAX_MESSAGE_LEN};
pub use crate::pipeline::RequestPipeline;
