use crate::*;
use chrono::{DateTime, Utc};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

pub const DID_PREFIX: &str = "did:votechain:";
pub const ELIGIBILITY_DOMAIN: &str = "votechain:eligibility_proof:v1";
pub const ELIGIBILITY_SUITE: &str = "ecdsa_p256_signature_v1";
pub const ELIGIBILITY_VK_ID: &str = "poc-eligibility-vk-1";

/// The nullifier a voter holding `public_key` uses in `election_id`
pub fn compute_nullifier(public_key: &VerifyingKey, election_id: &str) -> Hash256 {
    let encoded = public_key.to_encoded_point(true);
    tagged_hash(DOMAIN_NULLIFIER, &[encoded.as_bytes(), election_id.as_bytes()])
}

pub fn derive_did(public_key: &VerifyingKey) -> String {
    let encoded = public_key.to_encoded_point(true);
    format!("{}{}", DID_PREFIX, tagged_hash(DOMAIN_DID, &[encoded.as_bytes()]))
}

/// A voter's long-lived credential
#[derive(Serialize, Deserialize, Clone)]
pub struct VoterCredential {
    pub did: String,
    pub alg: String,
    pub created_at: DateTime<Utc>,

    #[serde(with = "VerifyingKeyHex")]
    pub public_key: VerifyingKey,

    #[serde(with = "SigningKeyHex")]
    secret: SigningKey,
}

impl VoterCredential {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let secret = SigningKey::random(&mut OsRng);
        let public_key = *secret.verifying_key();
        VoterCredential {
            did: derive_did(&public_key),
            alg: SIGNATURE_ALG.to_string(),
            created_at: now,
            public_key,
            secret,
        }
    }

    pub fn nullifier(&self, election_id: &str) -> Hash256 {
        compute_nullifier(&self.public_key, election_id)
    }

    /// Prove eligibility by signing the public inputs with the credential key
    pub fn prove_eligibility(&self, public_inputs: PublicInputs) -> Result<EligibilityProof, Error> {
        let transcript = proof_transcript(&public_inputs, &self.public_key)?;
        let sig: Signature = self.secret.sign(&transcript);
        Ok(EligibilityProof {
            zk_suite: ELIGIBILITY_SUITE.to_string(),
            vk_id: ELIGIBILITY_VK_ID.to_string(),
            public_inputs,
            proof: sig.to_bytes().to_vec(),
            disclosed_key: self.public_key,
        })
    }
}

impl fmt::Debug for VoterCredential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VoterCredential")
            .field("did", &self.did)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Values the eligibility proof commits to
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublicInputs {
    pub election_id: String,
    pub jurisdiction_id: String,
    pub nullifier: Hash256,
    pub challenge: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EligibilityProof {
    pub zk_suite: String,
    pub vk_id: String,
    pub public_inputs: PublicInputs,

    #[serde(with = "hex_serde")]
    pub proof: Vec<u8>,

    #[serde(with = "VerifyingKeyHex")]
    pub disclosed_key: VerifyingKey,
}

#[derive(Serialize)]
struct ProofTranscript<'a> {
    domain: &'static str,
    public_inputs: &'a PublicInputs,
    credential_pub: String,
}

fn proof_transcript(public_inputs: &PublicInputs, key: &VerifyingKey) -> Result<Vec<u8>, Error> {
    let transcript = ProofTranscript {
        domain: ELIGIBILITY_DOMAIN,
        public_inputs,
        credential_pub: public_key_hex(key),
    };
    Ok(canonical_json(&transcript)?.into_bytes())
}

/// Checks eligibility proofs. The gateway holds one behind this trait so the
/// proof system can be replaced without touching the cast pipeline.
pub trait EligibilityVerifier: Send + Sync {
    fn verify(&self, proof: &EligibilityProof) -> bool;
}

/// Accepts a proof when it is a valid signature by the disclosed key over the public inputs
#[derive(Default, Clone, Copy, Debug)]
pub struct SignatureEligibilityVerifier;

impl EligibilityVerifier for SignatureEligibilityVerifier {
    fn verify(&self, proof: &EligibilityProof) -> bool {
        let sig = match Signature::from_slice(&proof.proof) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        match proof_transcript(&proof.public_inputs, &proof.disclosed_key) {
            Ok(transcript) => proof.disclosed_key.verify(&transcript, &sig).is_ok(),
            Err(_) => false,
        }
    }
}
