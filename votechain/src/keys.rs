use crate::*;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

pub const SIGNATURE_ALG: &str = "ES256";

/// The four signing authorities of an election
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    Manifest,
    Gateway,
    BulletinBoard,
    Ledger,
}

impl KeyRole {
    pub fn default_kid(&self) -> &'static str {
        match self {
            KeyRole::Manifest => "manifest-kid-1",
            KeyRole::Gateway => "gateway-kid-1",
            KeyRole::BulletinBoard => "bb-kid-1",
            KeyRole::Ledger => "ledger-kid-1",
        }
    }
}

/// Compressed SEC1 encoding of a public key, hex encoded
pub fn public_key_hex(key: &VerifyingKey) -> String {
    hex::encode(key.to_encoded_point(true).as_bytes())
}

/// An ES256 signing keypair identified by a key id
#[derive(Serialize, Deserialize, Clone)]
pub struct Keypair {
    pub kid: String,
    pub alg: String,

    #[serde(with = "SigningKeyHex")]
    secret: SigningKey,
}

impl Keypair {
    pub fn generate(kid: impl Into<String>) -> Self {
        Keypair {
            kid: kid.into(),
            alg: SIGNATURE_ALG.to_string(),
            secret: SigningKey::random(&mut OsRng),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey {
            kid: self.kid.clone(),
            alg: self.alg.clone(),
            key: *self.secret.verifying_key(),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

/// Public half of a [`Keypair`], as published to verifiers
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PublicKey {
    pub kid: String,
    pub alg: String,

    #[serde(rename = "public_key", with = "VerifyingKeyHex")]
    pub key: VerifyingKey,
}

impl PublicKey {
    /// Verify a signature made by this key. A signature under any other kid is rejected.
    pub fn verify(&self, kid: &str, message: &[u8], sig: &Signature) -> Result<(), Error> {
        if kid != self.kid {
            return Err(Error::MismatchedKeyId {
                expected: self.kid.clone(),
                found: kid.to_string(),
            });
        }
        Ok(self.key.verify(message, sig)?)
    }
}

/// All signing keys held by the election authorities
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthorityKeys {
    pub manifest: Keypair,
    pub gateway: Keypair,
    pub bulletin_board: Keypair,
    pub ledger: Keypair,
}

impl AuthorityKeys {
    pub fn generate() -> Self {
        AuthorityKeys {
            manifest: Keypair::generate(KeyRole::Manifest.default_kid()),
            gateway: Keypair::generate(KeyRole::Gateway.default_kid()),
            bulletin_board: Keypair::generate(KeyRole::BulletinBoard.default_kid()),
            ledger: Keypair::generate(KeyRole::Ledger.default_kid()),
        }
    }

    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            manifest: self.manifest.public(),
            gateway: self.gateway.public(),
            bulletin_board: self.bulletin_board.public(),
            ledger: self.ledger.public(),
        }
    }
}

/// Published verification keys for an election
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PublicKeys {
    pub manifest: PublicKey,
    pub gateway: PublicKey,
    pub bulletin_board: PublicKey,
    pub ledger: PublicKey,
}

/// Symmetric election key. Ballot keys are wrapped under it so the tally can open ballots.
#[derive(Serialize, Deserialize, Clone)]
pub struct ElectionKey {
    #[serde(with = "Key32Hex")]
    key: AesKey,
}

impl ElectionKey {
    pub fn generate() -> Self {
        ElectionKey {
            key: random_aes_key(),
        }
    }

    /// Published in the manifest so the key cannot be swapped after the fact
    pub fn commitment(&self) -> Hash256 {
        tagged_hash(DOMAIN_ELECTION_KEY, &[&self.key[..]])
    }

    pub(crate) fn as_aes_key(&self) -> &AesKey {
        &self.key
    }
}

impl fmt::Debug for ElectionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ElectionKey({})", self.commitment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let keys = AuthorityKeys::generate();
        let public = keys.public_keys();

        let sig = keys.gateway.sign(b"receipt");
        public.gateway.verify("gateway-kid-1", b"receipt", &sig).unwrap();

        // Wrong message
        assert!(public.gateway.verify("gateway-kid-1", b"receipt!", &sig).is_err());

        // Wrong key
        assert!(public.ledger.verify("gateway-kid-1", b"receipt", &sig).is_err());

        // Wrong kid
        assert!(matches!(
            public.gateway.verify("bb-kid-1", b"receipt", &sig),
            Err(Error::MismatchedKeyId { .. })
        ));
    }

    #[test]
    fn keypair_persists() {
        let keypair = Keypair::generate("test-kid");
        let json = serde_json::to_string(&keypair).unwrap();
        let restored: Keypair = serde_json::from_str(&json).unwrap();
        assert_eq!(keypair.public(), restored.public());

        let sig = restored.sign(b"message");
        keypair.public().verify("test-kid", b"message", &sig).unwrap();
    }

    #[test]
    fn debug_hides_secrets() {
        let keypair = Keypair::generate("test-kid");
        let secret = hex::encode(keypair.secret.to_bytes());
        assert!(!format!("{:?}", keypair).contains(&secret));
    }
}
