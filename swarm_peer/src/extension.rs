//! The BEP 10 extension handshake (§4.4 "`extended` carries <1-byte
//! ext-id><bencoded payload>. `ext-id=0` is the extension handshake,
//! establishing peer-local ids for each named extension").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PeerResult;

/// The reserved ext-id for the handshake message itself.
pub const EXTENDED_HANDSHAKE_ID: u8 = 0;

/// Registered extension names this crate knows how to speak.
pub const UT_METADATA: &str = "ut_metadata";
pub const UT_PEX: &str = "ut_pex";

/// The bencoded payload of an `ext-id=0` extension handshake.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedHandshake {
    #[serde(rename = "m")]
    pub extensions: HashMap<String, u8>,
    #[serde(rename = "v", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    #[serde(rename = "reqq", skip_serializing_if = "Option::is_none")]
    pub max_request_queue: Option<u32>,
}

impl ExtendedHandshake {
    pub fn to_bytes(&self) -> PeerResult<Vec<u8>> {
        Ok(serde_bencode::to_bytes(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> PeerResult<ExtendedHandshake> {
        Ok(serde_bencode::from_bytes(bytes)?)
    }
}

/// The peer-local extension ids a remote peer advertised, keyed by
/// extension name. Looked up whenever we want to send that peer an
/// extension message.
#[derive(Debug, Clone, Default)]
pub struct ExtensionIds {
    ids: HashMap<String, u8>,
}

impl ExtensionIds {
    pub fn from_handshake(handshake: &ExtendedHandshake) -> ExtensionIds {
        ExtensionIds { ids: handshake.extensions.clone() }
    }

    pub fn id_for(&self, name: &str) -> Option<u8> {
        self.ids.get(name).copied()
    }

    pub fn supports(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_round_trips_handshake_bytes() {
        let mut handshake = ExtendedHandshake::default();
        handshake.extensions.insert(UT_METADATA.to_owned(), 1);
        handshake.listen_port = Some(6881);

        let bytes = handshake.to_bytes().unwrap();
        let parsed = ExtendedHandshake::from_bytes(&bytes).unwrap();

        assert_eq!(parsed, handshake);
    }

    #[test]
    fn positive_extension_ids_look_up_by_name() {
        let mut handshake = ExtendedHandshake::default();
        handshake.extensions.insert(UT_METADATA.to_owned(), 3);

        let ids = ExtensionIds::from_handshake(&handshake);
        assert_eq!(ids.id_for(UT_METADATA), Some(3));
        assert!(!ids.supports(UT_PEX));
    }
}
