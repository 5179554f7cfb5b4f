use crate::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const BALLOT_VALIDITY_PROOF: &str = "selections_checked_by_gateway_v1";

/// A voter's choice in one contest
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub contest_id: String,
    pub selection: String,
}

impl Selection {
    pub fn new(contest_id: &str, selection: &str) -> Self {
        Selection {
            contest_id: contest_id.to_string(),
            selection: selection.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BallotPlaintext {
    pub election_id: String,
    pub manifest_id: Hash256,
    pub ballot_id: String,
    pub contests: Vec<Selection>,
    pub cast_at: DateTime<Utc>,
}

/// An encrypted ballot as submitted and posted to the bulletin board
///
/// `ciphertext` is `iv || AES-256-GCM(ballot_key, canonical(plaintext))`. The ballot key
/// is wrapped under the election key, bound to the election and ballot ids.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedBallot {
    pub ballot_id: String,

    #[serde(with = "hex_serde")]
    pub ciphertext: Vec<u8>,

    #[serde(with = "hex_serde")]
    pub wrapped_ballot_key: Vec<u8>,

    pub ballot_validity_proof: String,
    pub ballot_hash: Hash256,
}

impl EncryptedBallot {
    /// Whether `ballot_hash` matches the ciphertext
    pub fn hash_matches(&self) -> bool {
        compute_ballot_hash(&self.ciphertext) == self.ballot_hash
    }
}

pub fn compute_ballot_hash(ciphertext: &[u8]) -> Hash256 {
    tagged_hash(DOMAIN_BALLOT, &[ciphertext])
}

fn wrap_aad(election_id: &str, ballot_id: &str) -> Vec<u8> {
    [election_id.as_bytes(), &b"|"[..], ballot_id.as_bytes()].concat()
}

/// Whether every selection names a known contest and option, with at most one selection per contest
pub fn validate_selections(manifest: &ManifestBody, selections: &[Selection]) -> bool {
    for (i, selection) in selections.iter().enumerate() {
        let contest = match manifest.get_contest(&selection.contest_id) {
            Some(contest) => contest,
            None => return false,
        };
        if contest.get_option(&selection.selection).is_none() {
            return false;
        }
        if selections[..i].iter().any(|s| s.contest_id == selection.contest_id) {
            return false;
        }
    }
    true
}

/// Whether a decrypted ballot belongs to this manifest and carries only valid selections
pub fn validate_plaintext(manifest: &ElectionManifest, plaintext: &BallotPlaintext) -> bool {
    plaintext.election_id == manifest.election_id
        && plaintext.manifest_id == manifest.manifest_id
        && validate_selections(manifest, &plaintext.contests)
}

/// A ballot encrypted on the voting device, with the secrets needed to spoil it
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PreparedBallot {
    pub encrypted_ballot: EncryptedBallot,

    #[serde(with = "hex_serde")]
    pub iv: Vec<u8>,

    #[serde(with = "hex_serde")]
    pub ballot_key: Vec<u8>,

    pub plaintext: BallotPlaintext,
}

/// Encrypt a plaintext ballot under a fresh ballot key. No selection checks are made.
pub fn encrypt_plaintext(
    plaintext: BallotPlaintext,
    election_key: &ElectionKey,
) -> Result<PreparedBallot, Error> {
    let ballot_key = random_aes_key();
    let iv = random_iv();

    let ciphertext = aes_encrypt_with_iv(&ballot_key, &iv, canonical_json(&plaintext)?.as_bytes(), b"")?;
    let wrapped_ballot_key = aes_encrypt(
        election_key.as_aes_key(),
        &ballot_key,
        &wrap_aad(&plaintext.election_id, &plaintext.ballot_id),
    )?;

    let encrypted_ballot = EncryptedBallot {
        ballot_id: plaintext.ballot_id.clone(),
        ballot_hash: compute_ballot_hash(&ciphertext),
        ciphertext,
        wrapped_ballot_key,
        ballot_validity_proof: BALLOT_VALIDITY_PROOF.to_string(),
    };

    Ok(PreparedBallot {
        encrypted_ballot,
        iv: iv.to_vec(),
        ballot_key: ballot_key.to_vec(),
        plaintext,
    })
}

/// Build and encrypt a ballot for casting
pub fn encrypt_ballot(
    manifest: &ElectionManifest,
    election_key: &ElectionKey,
    selections: Vec<Selection>,
    now: DateTime<Utc>,
) -> Result<PreparedBallot, Error> {
    if !validate_selections(manifest, &selections) {
        return Err(Error::InvalidSelections);
    }
    let plaintext = BallotPlaintext {
        election_id: manifest.election_id.clone(),
        manifest_id: manifest.manifest_id,
        ballot_id: Uuid::new_v4().to_string(),
        contests: selections,
        cast_at: now,
    };
    encrypt_plaintext(plaintext, election_key)
}

/// Opens encrypted ballots for tallying
pub trait TallyDecryptor {
    fn decrypt(&self, election_id: &str, ballot: &EncryptedBallot) -> Result<BallotPlaintext, Error>;
}

/// Unwraps the ballot key with the election key, then decrypts the ballot
pub struct SymmetricTallyDecryptor {
    election_key: ElectionKey,
}

impl SymmetricTallyDecryptor {
    pub fn new(election_key: ElectionKey) -> Self {
        SymmetricTallyDecryptor { election_key }
    }
}

impl TallyDecryptor for SymmetricTallyDecryptor {
    fn decrypt(&self, election_id: &str, ballot: &EncryptedBallot) -> Result<BallotPlaintext, Error> {
        let ballot_key = aes_decrypt(
            self.election_key.as_aes_key(),
            &ballot.wrapped_ballot_key,
            &wrap_aad(election_id, &ballot.ballot_id),
        )?;
        let ballot_key: AesKey = ballot_key.try_into().map_err(|_| Error::DecryptionError)?;
        let plaintext = aes_decrypt(&ballot_key, &ballot.ciphertext, b"")?;
        serde_json::from_slice(&plaintext).map_err(|_| Error::DecryptionError)
    }
}

/// Receipt proving that a ballot was spoiled rather than cast
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoilReceiptBody {
    pub receipt_id: String,
    pub election_id: String,
    pub ballot_hash: Hash256,
    pub spoiled_at: DateTime<Utc>,
    pub kid: String,
}

impl Signable for SpoilReceiptBody {
    fn kid(&self) -> &str {
        &self.kid
    }
}

pub type SpoilReceipt = Signed<SpoilReceiptBody>;

/// Everything needed to re-create the ciphertext of a spoiled ballot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RandomnessReveal {
    pub ballot_id: String,

    #[serde(with = "hex_serde")]
    pub iv: Vec<u8>,

    #[serde(with = "hex_serde")]
    pub ballot_key: Vec<u8>,

    pub plaintext: BallotPlaintext,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpoilStatus {
    BallotSpoiled,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoilResponse {
    pub status: SpoilStatus,
    pub spoil_receipt: SpoilReceipt,
    pub randomness_reveal: RandomnessReveal,
}

/// A spoiled ballot, kept so the gateway refuses to later accept it as a cast
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpoiledBallotRecord {
    pub ballot_hash: Hash256,
    pub encrypted_ballot: EncryptedBallot,
    pub spoil_receipt: SpoilReceipt,
    pub randomness_reveal: RandomnessReveal,
}

/// Spoil a prepared ballot: sign a spoil receipt and reveal its encryption secrets
pub fn spoil_ballot(
    prepared: &PreparedBallot,
    gateway_key: &Keypair,
    now: DateTime<Utc>,
) -> Result<SpoilResponse, Error> {
    let body = SpoilReceiptBody {
        receipt_id: Uuid::new_v4().to_string(),
        election_id: prepared.plaintext.election_id.clone(),
        ballot_hash: prepared.encrypted_ballot.ballot_hash,
        spoiled_at: now,
        kid: gateway_key.kid.clone(),
    };

    Ok(SpoilResponse {
        status: SpoilStatus::BallotSpoiled,
        spoil_receipt: Signed::sign(gateway_key, body)?,
        randomness_reveal: RandomnessReveal {
            ballot_id: prepared.plaintext.ballot_id.clone(),
            iv: prepared.iv.clone(),
            ballot_key: prepared.ballot_key.clone(),
            plaintext: prepared.plaintext.clone(),
        },
    })
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpoilVerification {
    #[serde(rename = "match")]
    pub matches: bool,
    pub details: String,
}

/// Re-encrypt the revealed plaintext and compare with the submitted ciphertext
pub fn verify_spoil(encrypted: &EncryptedBallot, reveal: &RandomnessReveal) -> SpoilVerification {
    let mismatch = |reason: &str| SpoilVerification {
        matches: false,
        details: format!("MISMATCH: {}", reason),
    };

    let key: AesKey = match reveal.ballot_key.as_slice().try_into() {
        Ok(key) => key,
        Err(_) => return mismatch("revealed ballot key is not 32 bytes"),
    };
    let iv: AesIv = match reveal.iv.as_slice().try_into() {
        Ok(iv) => iv,
        Err(_) => return mismatch("revealed iv is not 12 bytes"),
    };
    let plaintext = match canonical_json(&reveal.plaintext) {
        Ok(plaintext) => plaintext,
        Err(e) => return mismatch(&format!("could not encode revealed plaintext: {}", e)),
    };

    match aes_encrypt_with_iv(&key, &iv, plaintext.as_bytes(), b"") {
        Ok(recomputed) if recomputed == encrypted.ciphertext => SpoilVerification {
            matches: true,
            details: "Ciphertext matches re-encryption. Device encrypted honestly.".to_string(),
        },
        Ok(_) => mismatch("re-encrypting the revealed plaintext does not reproduce the ciphertext. The device may have altered the ballot."),
        Err(e) => mismatch(&format!("re-encryption failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ElectionManifest, ElectionKey) {
        let election_key = ElectionKey::generate();
        let keypair = Keypair::generate(KeyRole::Manifest.default_kid());
        let body = ManifestBody::new(&ElectionConfig::demo(), &election_key, Utc::now());
        (ElectionManifest::sign(&keypair, body).unwrap(), election_key)
    }

    fn selections() -> Vec<Selection> {
        vec![
            Selection::new("us-senate-ny-2026", "chen-r"),
            Selection::new("prop-12-infrastructure", "yes"),
        ]
    }

    #[test]
    fn selection_rules() {
        let (manifest, _) = setup();
        assert!(validate_selections(&manifest, &selections()));
        assert!(validate_selections(&manifest, &[]));
        assert!(!validate_selections(&manifest, &[Selection::new("us-senate-ny-2026", "yes")]));
        assert!(!validate_selections(&manifest, &[Selection::new("governor", "chen-r")]));
        assert!(!validate_selections(
            &manifest,
            &[
                Selection::new("prop-12-infrastructure", "yes"),
                Selection::new("prop-12-infrastructure", "no"),
            ]
        ));
    }

    #[test]
    fn encrypt_and_decrypt() {
        let (manifest, election_key) = setup();
        let prepared = encrypt_ballot(&manifest, &election_key, selections(), Utc::now()).unwrap();
        let ballot = &prepared.encrypted_ballot;
        assert!(ballot.hash_matches());

        let decryptor = SymmetricTallyDecryptor::new(election_key);
        let plaintext = decryptor.decrypt(&manifest.election_id, ballot).unwrap();
        assert_eq!(plaintext, prepared.plaintext);
        assert!(validate_plaintext(&manifest, &plaintext));

        // The wrapped key is bound to the election
        assert!(decryptor.decrypt("another-election", ballot).is_err());

        // Wrong election key
        let stranger = SymmetricTallyDecryptor::new(ElectionKey::generate());
        assert!(stranger.decrypt(&manifest.election_id, ballot).is_err());

        assert!(matches!(
            encrypt_ballot(&manifest, &ElectionKey::generate(), vec![Selection::new("x", "y")], Utc::now()),
            Err(Error::InvalidSelections)
        ));
    }

    #[test]
    fn spoil_reveals_honest_encryption() {
        let (manifest, election_key) = setup();
        let gateway_key = Keypair::generate(KeyRole::Gateway.default_kid());
        let prepared = encrypt_ballot(&manifest, &election_key, selections(), Utc::now()).unwrap();

        let spoiled = spoil_ballot(&prepared, &gateway_key, Utc::now()).unwrap();
        spoiled.spoil_receipt.verify_signature(&gateway_key.public()).unwrap();
        assert_eq!(spoiled.spoil_receipt.ballot_hash, prepared.encrypted_ballot.ballot_hash);

        let check = verify_spoil(&prepared.encrypted_ballot, &spoiled.randomness_reveal);
        assert!(check.matches, "{}", check.details);
        assert_eq!(check.details, "Ciphertext matches re-encryption. Device encrypted honestly.");

        // A device that lies about the plaintext is caught
        let mut lie = spoiled.randomness_reveal.clone();
        lie.plaintext.contests[0].selection = "gutierrez-d".to_string();
        let check = verify_spoil(&prepared.encrypted_ballot, &lie);
        assert!(!check.matches);
        assert!(check.details.starts_with("MISMATCH"));

        let mut short_key = spoiled.randomness_reveal;
        short_key.ballot_key.pop();
        assert!(!verify_spoil(&prepared.encrypted_ballot, &short_key).matches);
    }
}
