//! The 8 reserved bytes of a handshake (§4.4), advertising pre-handshake
//! feature support: fast-extensions, DHT, and the extension protocol.

/// Number of bytes that the extension protocol takes.
pub const NUM_EXTENSION_BYTES: usize = 8;

/// Enumeration of all reserved-bit extensions that can be activated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Extension {
    /// BEP 10 extension protocol, bit 44 (5th byte from the end, bit 4).
    ExtensionProtocol = 43,
    /// BEP 6 fast extensions, bit 61.
    FastExtension = 61,
    /// BEP 5 DHT support, bit 63 (last bit of the last byte).
    Dht = 63,
}

/// `Extensions` supported by either end of a handshake.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct Extensions {
    bytes: [u8; NUM_EXTENSION_BYTES],
}

impl Extensions {
    /// Create a new `Extensions` with zero extensions.
    pub fn new() -> Extensions {
        Extensions { bytes: [0u8; NUM_EXTENSION_BYTES] }
    }

    /// Add the given extension to the list of supported `Extensions`.
    pub fn add(&mut self, extension: Extension) {
        let (byte_index, bit_index) = Self::bit_position(extension);
        self.bytes[byte_index] |= 0x80 >> bit_index;
    }

    /// Remove the given extension from the list of supported `Extensions`.
    pub fn remove(&mut self, extension: Extension) {
        let (byte_index, bit_index) = Self::bit_position(extension);
        self.bytes[byte_index] &= !(0x80 >> bit_index);
    }

    /// Check if a given extension is activated.
    pub fn contains(&self, extension: Extension) -> bool {
        let (byte_index, bit_index) = Self::bit_position(extension);
        self.bytes[byte_index] & (0x80 >> bit_index) != 0
    }

    /// Create a union of the extensions that both clients support.
    pub fn intersection(&self, other: &Extensions) -> Extensions {
        let mut result = Extensions::new();
        for index in 0..NUM_EXTENSION_BYTES {
            result.bytes[index] = self.bytes[index] & other.bytes[index];
        }
        result
    }

    fn bit_position(extension: Extension) -> (usize, usize) {
        let active_bit = extension as usize;
        (active_bit / 8, active_bit % 8)
    }
}

impl From<[u8; NUM_EXTENSION_BYTES]> for Extensions {
    fn from(bytes: [u8; NUM_EXTENSION_BYTES]) -> Extensions {
        Extensions { bytes }
    }
}

impl From<Extensions> for [u8; NUM_EXTENSION_BYTES] {
    fn from(extensions: Extensions) -> [u8; NUM_EXTENSION_BYTES] {
        extensions.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::{Extension, Extensions};

    #[test]
    fn positive_add_extension_protocol() {
        let mut extensions = Extensions::new();
        extensions.add(Extension::ExtensionProtocol);

        let expected: Extensions = [0, 0, 0, 0, 0, 0x10, 0, 0].into();
        assert_eq!(expected, extensions);
        assert!(extensions.contains(Extension::ExtensionProtocol));
    }

    #[test]
    fn positive_remove_extension_protocol() {
        let mut extensions = Extensions::new();
        extensions.add(Extension::ExtensionProtocol);
        extensions.remove(Extension::ExtensionProtocol);

        assert_eq!(Extensions::new(), extensions);
        assert!(!extensions.contains(Extension::ExtensionProtocol));
    }

    #[test]
    fn positive_intersection_keeps_only_shared_bits() {
        let mut ours = Extensions::new();
        ours.add(Extension::ExtensionProtocol);
        ours.add(Extension::Dht);

        let mut theirs = Extensions::new();
        theirs.add(Extension::Dht);

        let shared = ours.intersection(&theirs);
        assert!(shared.contains(Extension::Dht));
        assert!(!shared.contains(Extension::ExtensionProtocol));
    }
}
