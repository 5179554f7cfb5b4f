use crate::*;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::str::FromStr;

pub const DOMAIN_BB_LEAF: &[u8] = b"votechain:bb:leaf:v1:";
pub const DOMAIN_BB_NODE: &[u8] = b"votechain:bb:node:v1:";
pub const DOMAIN_BB_EMPTY: &[u8] = b"votechain:bb:empty:v1";
pub const DOMAIN_NULLIFIER: &[u8] = b"votechain:nullifier:v1:";
pub const DOMAIN_DID: &[u8] = b"votechain:did:v1:";
pub const DOMAIN_MANIFEST: &[u8] = b"votechain:manifest:v1:";
pub const DOMAIN_LEDGER_TX: &[u8] = b"votechain:ledger:tx:v1:";
pub const DOMAIN_BALLOT: &[u8] = b"votechain:ballot:v1:";
pub const DOMAIN_REQUEST: &[u8] = b"votechain:ewp:request:v1:";
pub const DOMAIN_TALLY: &[u8] = b"votechain:tally:v1:";
pub const DOMAIN_ELECTION_KEY: &[u8] = b"votechain:election_key:v1:";

/// A SHA-256 digest, hex encoded on the wire
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// SHA-256 over a domain tag followed by each part, in order
pub fn tagged_hash(domain: &[u8], parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    Hash256(hasher.finalize().into())
}

/// RFC 8785 canonical JSON of any serializable value
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    let value = serde_json::to_value(value)?;
    serde_json_canonicalizer::to_string(&value).map_err(|e| Error::Canonicalization(e.to_string()))
}

/// Domain-tagged hash of the canonical JSON of a value
pub fn canonical_hash<T: Serialize + ?Sized>(domain: &[u8], value: &T) -> Result<Hash256, Error> {
    let canonical = canonical_json(value)?;
    Ok(tagged_hash(domain, &[canonical.as_bytes()]))
}

impl FromStr for Hash256 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| Error::HashBadHex)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| Error::HashBadLen)?;
        Ok(Hash256(bytes))
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        std::str::FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_keys() {
        let value = serde_json::json!({"b": 1, "a": {"d": true, "c": null}});
        assert_eq!(canonical_json(&value).unwrap(), r#"{"a":{"c":null,"d":true},"b":1}"#);
    }

    #[test]
    fn domain_tags_separate_hashes() {
        let a = tagged_hash(DOMAIN_BB_LEAF, &[b"x"]);
        let b = tagged_hash(DOMAIN_BB_NODE, &[b"x"]);
        assert_ne!(a, b);
        assert_eq!(a, tagged_hash(DOMAIN_BB_LEAF, &[b"x"]));
    }

    #[test]
    fn hex_round_trip() {
        let h = tagged_hash(DOMAIN_BALLOT, &[b"ciphertext"]);
        let parsed: Hash256 = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);

        assert!(matches!("zz".parse::<Hash256>(), Err(Error::HashBadHex)));
        assert!(matches!("abcd".parse::<Hash256>(), Err(Error::HashBadLen)));
    }
}
