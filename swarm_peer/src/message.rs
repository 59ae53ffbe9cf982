//! Wire message framing (§4.4): `<4-byte big-endian length><payload>`,
//! the first payload byte being the message id.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use byteorder::{BigEndian, ByteOrder};
use tokio_util::codec::{Decoder, Encoder};

use swarm_select::BLOCK_SIZE;

use crate::error::{PeerErrorKind, PeerResult};

pub const CHOKE_ID: u8 = 0;
pub const UNCHOKE_ID: u8 = 1;
pub const INTERESTED_ID: u8 = 2;
pub const NOT_INTERESTED_ID: u8 = 3;
pub const HAVE_ID: u8 = 4;
pub const BITFIELD_ID: u8 = 5;
pub const REQUEST_ID: u8 = 6;
pub const PIECE_ID: u8 = 7;
pub const CANCEL_ID: u8 = 8;
pub const PORT_ID: u8 = 9;
pub const EXTENDED_ID: u8 = 20;

const LENGTH_PREFIX_LEN: usize = 4;

/// Default cap on a single message's declared length (§4.4 "Packet size
/// is capped (default 1 MiB)").
pub const DEFAULT_MAX_MESSAGE_LEN: u32 = 1024 * 1024;

/// The piece-size geometry negotiated for this connection's torrent:
/// every piece is `piece_len` bytes except the last, which is
/// whatever remains of `total_len`. Used to bound-check incoming
/// PIECE payloads against the real piece size and the block grid
/// (§4.4: "The FSM never accepts a PIECE payload larger than the
/// negotiated piece size or unaligned to the block grid").
#[derive(Copy, Clone, Debug)]
pub struct PieceGeometry {
    piece_len: u64,
    total_len: u64,
}

impl PieceGeometry {
    pub fn new(piece_len: u64, total_len: u64) -> PieceGeometry {
        PieceGeometry { piece_len, total_len }
    }

    fn num_pieces(&self) -> u64 {
        if self.piece_len == 0 {
            0
        } else {
            (self.total_len + self.piece_len - 1) / self.piece_len
        }
    }

    /// The real size of `piece`, or `None` if `piece` is out of range.
    pub fn piece_size(&self, piece: u64) -> Option<u64> {
        let num_pieces = self.num_pieces();
        if num_pieces == 0 || piece >= num_pieces {
            return None;
        }
        if piece + 1 < num_pieces {
            Some(self.piece_len)
        } else {
            Some(self.total_len - (num_pieces - 1) * self.piece_len)
        }
    }
}

/// A single peer wire protocol message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece: u32 },
    Bitfield(Bytes),
    Request { piece: u32, begin: u32, length: u32 },
    Piece { piece: u32, begin: u32, block: Bytes },
    Cancel { piece: u32, begin: u32, length: u32 },
    Port { port: u16 },
    Extended { ext_id: u8, payload: Bytes },
}

impl Message {
    /// The message id byte, or `None` for the zero-length keepalive.
    pub fn id(&self) -> Option<u8> {
        match self {
            Message::KeepAlive => None,
            Message::Choke => Some(CHOKE_ID),
            Message::Unchoke => Some(UNCHOKE_ID),
            Message::Interested => Some(INTERESTED_ID),
            Message::NotInterested => Some(NOT_INTERESTED_ID),
            Message::Have { .. } => Some(HAVE_ID),
            Message::Bitfield(_) => Some(BITFIELD_ID),
            Message::Request { .. } => Some(REQUEST_ID),
            Message::Piece { .. } => Some(PIECE_ID),
            Message::Cancel { .. } => Some(CANCEL_ID),
            Message::Port { .. } => Some(PORT_ID),
            Message::Extended { .. } => Some(EXTENDED_ID),
        }
    }
}

/// A `tokio_util` codec implementing the length-prefixed peer wire
/// framing, rejecting any message whose declared length exceeds
/// `max_len`. When `geometry` is set, incoming PIECE payloads are also
/// bound-checked against the negotiated piece size and block grid.
pub struct MessageCodec {
    max_len: u32,
    geometry: Option<PieceGeometry>,
}

impl MessageCodec {
    pub fn new(max_len: u32) -> MessageCodec {
        MessageCodec { max_len, geometry: None }
    }

    /// Enable PIECE bound-checking against `geometry`.
    pub fn with_geometry(mut self, geometry: PieceGeometry) -> MessageCodec {
        self.geometry = Some(geometry);
        self
    }
}

impl Default for MessageCodec {
    fn default() -> MessageCodec {
        MessageCodec::new(DEFAULT_MAX_MESSAGE_LEN)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = crate::error::PeerError;

    fn decode(&mut self, src: &mut BytesMut) -> PeerResult<Option<Message>> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let len = BigEndian::read_u32(&src[..LENGTH_PREFIX_LEN]);
        if len > self.max_len {
            return Err(PeerErrorKind::MessageTooLarge { len, max: self.max_len }.into());
        }

        let total_len = LENGTH_PREFIX_LEN + len as usize;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        if len == 0 {
            return Ok(Some(Message::KeepAlive));
        }

        let mut payload = src.split_to(len as usize);
        let id = payload.split_to(1)[0];
        let message = decode_body(id, payload.freeze(), self.geometry)?;
        Ok(Some(message))
    }
}

fn decode_body(id: u8, body: Bytes, geometry: Option<PieceGeometry>) -> PeerResult<Message> {
    match id {
        CHOKE_ID => Ok(Message::Choke),
        UNCHOKE_ID => Ok(Message::Unchoke),
        INTERESTED_ID => Ok(Message::Interested),
        NOT_INTERESTED_ID => Ok(Message::NotInterested),
        HAVE_ID => {
            require_len(&body, 4)?;
            Ok(Message::Have { piece: BigEndian::read_u32(&body) })
        }
        BITFIELD_ID => Ok(Message::Bitfield(body)),
        REQUEST_ID => {
            require_len(&body, 12)?;
            Ok(Message::Request {
                piece: BigEndian::read_u32(&body[0..4]),
                begin: BigEndian::read_u32(&body[4..8]),
                length: BigEndian::read_u32(&body[8..12]),
            })
        }
        PIECE_ID => {
            if body.len() < 8 {
                return Err(PeerErrorKind::ProtocolViolation { reason: "piece message shorter than 8 bytes".into() }.into());
            }
            let piece = BigEndian::read_u32(&body[0..4]);
            let begin = BigEndian::read_u32(&body[4..8]);
            let block = body.slice(8..);

            if let Some(geometry) = geometry {
                let piece_size = geometry.piece_size(piece as u64).ok_or_else(|| {
                    PeerErrorKind::ProtocolViolation { reason: format!("piece {} is out of range", piece) }
                })?;
                if begin as u64 % BLOCK_SIZE != 0 {
                    return Err(PeerErrorKind::ProtocolViolation {
                        reason: format!("piece {} block begin {} is not aligned to the block grid", piece, begin),
                    }
                    .into());
                }
                let end = begin as u64 + block.len() as u64;
                if end > piece_size {
                    return Err(PeerErrorKind::ProtocolViolation {
                        reason: format!("piece {} block [{}, {}) exceeds piece size {}", piece, begin, end, piece_size),
                    }
                    .into());
                }
            }

            Ok(Message::Piece { piece, begin, block })
        }
        CANCEL_ID => {
            require_len(&body, 12)?;
            Ok(Message::Cancel {
                piece: BigEndian::read_u32(&body[0..4]),
                begin: BigEndian::read_u32(&body[4..8]),
                length: BigEndian::read_u32(&body[8..12]),
            })
        }
        PORT_ID => {
            require_len(&body, 2)?;
            Ok(Message::Port { port: BigEndian::read_u16(&body) })
        }
        EXTENDED_ID => {
            if body.is_empty() {
                return Err(PeerErrorKind::ProtocolViolation { reason: "extended message missing ext-id byte".into() }.into());
            }
            Ok(Message::Extended { ext_id: body[0], payload: body.slice(1..) })
        }
        other => Err(PeerErrorKind::ProtocolViolation { reason: format!("unknown message id {}", other) }.into()),
    }
}

fn require_len(body: &Bytes, expected: usize) -> PeerResult<()> {
    if body.len() != expected {
        return Err(PeerErrorKind::ProtocolViolation {
            reason: format!("expected {} byte payload, got {}", expected, body.len()),
        }
        .into());
    }
    Ok(())
}

impl Encoder<Message> for MessageCodec {
    type Error = crate::error::PeerError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> PeerResult<()> {
        match message {
            Message::KeepAlive => dst.put_u32(0),
            Message::Choke => write_header(dst, 1, CHOKE_ID),
            Message::Unchoke => write_header(dst, 1, UNCHOKE_ID),
            Message::Interested => write_header(dst, 1, INTERESTED_ID),
            Message::NotInterested => write_header(dst, 1, NOT_INTERESTED_ID),
            Message::Have { piece } => {
                write_header(dst, 5, HAVE_ID);
                dst.put_u32(piece);
            }
            Message::Bitfield(bits) => {
                write_header(dst, 1 + bits.len() as u32, BITFIELD_ID);
                dst.put_slice(&bits);
            }
            Message::Request { piece, begin, length } => {
                write_header(dst, 13, REQUEST_ID);
                dst.put_u32(piece);
                dst.put_u32(begin);
                dst.put_u32(length);
            }
            Message::Piece { piece, begin, block } => {
                write_header(dst, 9 + block.len() as u32, PIECE_ID);
                dst.put_u32(piece);
                dst.put_u32(begin);
                dst.put_slice(&block);
            }
            Message::Cancel { piece, begin, length } => {
                write_header(dst, 13, CANCEL_ID);
                dst.put_u32(piece);
                dst.put_u32(begin);
                dst.put_u32(length);
            }
            Message::Port { port } => {
                write_header(dst, 3, PORT_ID);
                dst.put_u16(port);
            }
            Message::Extended { ext_id, payload } => {
                write_header(dst, 2 + payload.len() as u32, EXTENDED_ID);
                dst.put_u8(ext_id);
                dst.put_slice(&payload);
            }
        }
        Ok(())
    }
}

fn write_header(dst: &mut BytesMut, len: u32, id: u8) {
    dst.put_u32(len);
    dst.put_u8(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: Message) -> Message {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(message, &mut buf).unwrap();
        codec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn positive_round_trips_control_messages() {
        assert_eq!(round_trip(Message::KeepAlive), Message::KeepAlive);
        assert_eq!(round_trip(Message::Choke), Message::Choke);
        assert_eq!(round_trip(Message::Interested), Message::Interested);
    }

    #[test]
    fn positive_round_trips_request_and_piece() {
        let request = Message::Request { piece: 3, begin: 16384, length: 16384 };
        assert_eq!(round_trip(request.clone()), request);

        let piece = Message::Piece { piece: 3, begin: 0, block: Bytes::from_static(&[1, 2, 3, 4]) };
        assert_eq!(round_trip(piece.clone()), piece);
    }

    #[test]
    fn positive_decode_waits_for_full_message() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Message::Have { piece: 1 }, &mut buf).unwrap();

        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn negative_oversized_length_is_rejected() {
        let mut codec = MessageCodec::new(16);
        let mut buf = BytesMut::new();
        buf.put_u32(1024);
        assert!(codec.decode(&mut buf).is_err());
    }
}
