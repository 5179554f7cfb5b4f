use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use std::borrow::Cow;

pub use hex_buffer_serde::Hex;

// a single-purpose type for use in `#[serde(with)]`
pub enum SignatureHex {}

impl Hex<Signature> for SignatureHex {
    type Error = p256::ecdsa::Error;

    fn create_bytes(sig: &Signature) -> Cow<[u8]> {
        Cow::from(sig.to_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Signature, Self::Error> {
        Signature::from_slice(bytes)
    }
}

// a single-purpose type for use in `#[serde(with)]`, compressed SEC1
pub enum VerifyingKeyHex {}

impl Hex<VerifyingKey> for VerifyingKeyHex {
    type Error = p256::ecdsa::Error;

    fn create_bytes(key: &VerifyingKey) -> Cow<[u8]> {
        Cow::from(key.to_encoded_point(true).as_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<VerifyingKey, Self::Error> {
        VerifyingKey::from_sec1_bytes(bytes)
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum SigningKeyHex {}

impl Hex<SigningKey> for SigningKeyHex {
    type Error = p256::ecdsa::Error;

    fn create_bytes(key: &SigningKey) -> Cow<[u8]> {
        Cow::from(key.to_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<SigningKey, Self::Error> {
        SigningKey::from_slice(bytes)
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum Key32Hex {}

impl Hex<[u8; 32]> for Key32Hex {
    type Error = String;

    fn create_bytes(key: &[u8; 32]) -> Cow<[u8]> {
        Cow::from(&key[..])
    }

    fn from_bytes(bytes: &[u8]) -> Result<[u8; 32], Self::Error> {
        bytes
            .try_into()
            .map_err(|_| format!("expected 32 bytes, found {}", bytes.len()))
    }
}
