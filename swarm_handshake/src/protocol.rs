//! The protocol name field of a handshake (§4.4: `0x13 "BitTorrent protocol"`).

const BT_PROTOCOL: &[u8] = b"BitTorrent protocol";

/// `Protocol` information transmitted as part of the handshake.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Protocol {
    BitTorrent,
    Custom(Vec<u8>),
}

impl Protocol {
    /// Parse a length-prefixed protocol name off the front of `bytes`,
    /// returning the protocol and the remaining bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<(Protocol, &[u8])> {
        let &len = bytes.first()?;
        let len = len as usize;
        let rest = bytes.get(1..)?;
        let name = rest.get(..len)?;
        let remaining = rest.get(len..)?;

        let protocol = if name == BT_PROTOCOL {
            Protocol::BitTorrent
        } else {
            Protocol::Custom(name.to_vec())
        };

        Some((protocol, remaining))
    }

    /// Append the length-prefixed protocol name to `out`.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        let name = self.name();
        out.push(name.len() as u8);
        out.extend_from_slice(name);
    }

    /// Length of the protocol name, not including the length byte.
    pub fn write_len(&self) -> usize {
        self.name().len()
    }

    fn name(&self) -> &[u8] {
        match self {
            Protocol::BitTorrent => BT_PROTOCOL,
            Protocol::Custom(name) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_round_trips_bittorrent_protocol() {
        let mut bytes = Vec::new();
        Protocol::BitTorrent.write_bytes(&mut bytes);

        let (parsed, rest) = Protocol::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, Protocol::BitTorrent);
        assert!(rest.is_empty());
    }

    #[test]
    fn positive_round_trips_custom_protocol() {
        let custom = Protocol::Custom(b"Some Other Protocol".to_vec());
        let mut bytes = Vec::new();
        custom.write_bytes(&mut bytes);
        bytes.push(0xFF);

        let (parsed, rest) = Protocol::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, custom);
        assert_eq!(rest, &[0xFF]);
    }

    #[test]
    fn negative_truncated_protocol_returns_none() {
        assert!(Protocol::from_bytes(&[19, b'B', b'i']).is_none());
    }
}
