//! Byte-string encodings used by the metainfo dictionary: the concatenated
//! piece hashes and the optional per-file sha1 field are both raw 20-byte
//! strings on the wire, not bencode lists, so they need their own
//! `Serialize`/`Deserialize` impls rather than deriving one.

use std::fmt;

use serde::de::{Error, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use swarm_util::sha::{self, ShaHash};

/// The `pieces` field: one 20-byte SHA-1 hash per piece, concatenated.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Hashes(pub Vec<ShaHash>);

impl Hashes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ShaHash> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShaHash> {
        self.0.iter()
    }
}

impl Serialize for Hashes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut flat = Vec::with_capacity(self.0.len() * sha::SHA_HASH_LEN);
        for hash in &self.0 {
            flat.extend_from_slice(hash.as_ref());
        }
        serializer.serialize_bytes(&flat)
    }
}

impl<'de> Deserialize<'de> for Hashes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_bytes(HashesVisitor)
    }
}

struct HashesVisitor;

impl<'de> Visitor<'de> for HashesVisitor {
    type Value = Hashes;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a byte string whose length is a multiple of 20")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: Error,
    {
        if v.len() % sha::SHA_HASH_LEN != 0 {
            return Err(E::custom(format!(
                "pieces length {} is not a multiple of {}",
                v.len(),
                sha::SHA_HASH_LEN
            )));
        }

        let hashes = v
            .chunks_exact(sha::SHA_HASH_LEN)
            .map(|chunk| {
                let mut buf = [0u8; sha::SHA_HASH_LEN];
                buf.copy_from_slice(chunk);
                ShaHash::from(buf)
            })
            .collect();

        Ok(Hashes(hashes))
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
    where
        E: Error,
    {
        self.visit_bytes(&v)
    }
}

/// A single 20-byte SHA-1 hash, used for the optional per-file `sha1` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Sha1Digest(pub ShaHash);

impl Serialize for Sha1Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.0.as_ref())
    }
}

impl<'de> Deserialize<'de> for Sha1Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_bytes(Sha1Visitor)
    }
}

struct Sha1Visitor;

impl<'de> Visitor<'de> for Sha1Visitor {
    type Value = Sha1Digest;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a 20 byte string")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: Error,
    {
        if v.len() != sha::SHA_HASH_LEN {
            return Err(E::custom(format!("sha1 length {} is not 20", v.len())));
        }

        let mut buf = [0u8; sha::SHA_HASH_LEN];
        buf.copy_from_slice(v);
        Ok(Sha1Digest(ShaHash::from(buf)))
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
    where
        E: Error,
    {
        self.visit_bytes(&v)
    }
}
