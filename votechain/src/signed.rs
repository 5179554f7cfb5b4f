use crate::*;
use p256::ecdsa::Signature;
use serde::Serialize;
use std::ops::Deref;

/// An object that is signed over its own canonical JSON form
pub trait Signable: Serialize {
    /// Key id of the key expected to sign this object
    fn kid(&self) -> &str;

    fn signing_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(canonical_json(self)?.into_bytes())
    }
}

/// A generic signed object
///
/// On the wire the inner fields and `sig` sit side by side, so the signature
/// covers exactly the object with its `sig` member removed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Signed<T> {
    #[serde(flatten)]
    pub body: T,

    #[serde(with = "SignatureHex")]
    pub sig: Signature,
}

impl<T: Signable> Signed<T> {
    /// Sign an object, producing a Signed<T>
    pub fn sign(keypair: &Keypair, body: T) -> Result<Self, Error> {
        if body.kid() != keypair.kid {
            return Err(Error::MismatchedKeyId {
                expected: keypair.kid.clone(),
                found: body.kid().to_string(),
            });
        }

        let sig = keypair.sign(&body.signing_bytes()?);
        Ok(Signed { body, sig })
    }

    /// Verify the signature against a published key
    pub fn verify_signature(&self, key: &PublicKey) -> Result<(), Error> {
        key.verify(self.body.kid(), &self.body.signing_bytes()?, &self.sig)
    }
}

impl<T> Deref for Signed<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    struct Note {
        text: String,
        kid: String,
    }

    impl Signable for Note {
        fn kid(&self) -> &str {
            &self.kid
        }
    }

    #[test]
    fn sign_verify_and_wire_shape() {
        let keypair = Keypair::generate("note-kid");
        let note = Note {
            text: "hello".to_string(),
            kid: "note-kid".to_string(),
        };

        let signed = Signed::sign(&keypair, note.clone()).unwrap();
        signed.verify_signature(&keypair.public()).unwrap();

        let json = serde_json::to_value(&signed).unwrap();
        assert_eq!(json["text"], "hello");
        assert!(json["sig"].is_string());

        let restored: Signed<Note> = serde_json::from_value(json).unwrap();
        assert_eq!(restored, signed);
        restored.verify_signature(&keypair.public()).unwrap();

        let mut tampered = signed;
        tampered.body.text = "goodbye".to_string();
        assert!(tampered.verify_signature(&keypair.public()).is_err());
    }

    #[test]
    fn refuses_foreign_kid() {
        let keypair = Keypair::generate("note-kid");
        let note = Note {
            text: "hello".to_string(),
            kid: "other-kid".to_string(),
        };
        assert!(matches!(
            Signed::sign(&keypair, note),
            Err(Error::MismatchedKeyId { .. })
        ));
    }
}
