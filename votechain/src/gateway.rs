use crate::*;
use chrono::{DateTime, Utc};
use p256::ecdsa::Signature;
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

pub const CHALLENGE_BYTES: usize = 32;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChallengeRequest {
    pub client_session: String,
}

#[derive(Serialize)]
struct ChallengeSigningPayload<'a> {
    challenge_id: &'a str,
    challenge: &'a str,
    expires_at: &'a DateTime<Utc>,
    client_session: &'a str,
    kid: &'a str,
}

/// A single-use challenge, signed by the gateway
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub challenge: String,
    pub expires_at: DateTime<Utc>,
    pub kid: String,

    #[serde(with = "SignatureHex")]
    pub server_sig: Signature,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChallengeRecord {
    pub challenge_id: String,
    pub challenge: String,
    pub client_session: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

/// A cast request as submitted by a voting client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CastRequest {
    pub ewp_version: String,
    pub election_id: String,
    pub jurisdiction_id: String,
    pub manifest_id: Hash256,
    pub challenge_id: String,
    pub challenge: String,
    pub nullifier: Hash256,
    pub eligibility_proof: EligibilityProof,
    pub encrypted_ballot: EncryptedBallot,
}

impl CastRequest {
    /// Hash of the canonical request body, used to detect idempotency-key reuse
    pub fn request_hash(&self) -> Result<Hash256, Error> {
        canonical_hash(DOMAIN_REQUEST, self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LedgerAnchor {
    pub tx_id: Hash256,
    pub event_type: EventType,
    pub sth_root_hash: Hash256,
}

/// Receipt for a recorded cast, before signing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReceiptBody {
    pub receipt_id: String,
    pub election_id: String,
    pub manifest_id: Hash256,
    pub ballot_hash: Hash256,
    pub bb_leaf_hash: Hash256,
    pub bb_sth: SignedTreeHead,
    pub ledger_anchor: LedgerAnchor,
    pub kid: String,
}

impl Signable for ReceiptBody {
    fn kid(&self) -> &str {
        &self.kid
    }
}

pub type CastReceipt = Signed<ReceiptBody>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CastResponse {
    CastRecorded { cast_receipt: CastReceipt },

    /// Reserved for asynchronous gateways; never produced here
    CastPending { cast_id: String },
}

impl CastResponse {
    pub fn receipt(&self) -> Option<&CastReceipt> {
        match self {
            CastResponse::CastRecorded { cast_receipt } => Some(cast_receipt),
            CastResponse::CastPending { .. } => None,
        }
    }
}

/// Response remembered under an idempotency key
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StoredResponse {
    Accepted(CastResponse),
    Rejected(ErrorResponse),
}

impl StoredResponse {
    fn replay(&self) -> Result<CastResponse, EwpError> {
        match self {
            StoredResponse::Accepted(response) => Ok(response.clone()),
            StoredResponse::Rejected(response) => Err(response.error.clone()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub request_hash: Hash256,
    pub response: StoredResponse,
    pub stored_at: DateTime<Utc>,
}

/// A cast request that passed every check and may be committed
struct ValidatedCast<'a> {
    request: &'a CastRequest,
}

fn reject(code: EwpErrorCode, message: &str) -> EwpError {
    EwpError::new(code, message)
}

/// The voter-facing gateway
///
/// Owns the election state and its store. Every mutating operation takes `&mut self`,
/// so one gateway is one writer; wrap it in a `Mutex` to share it between threads.
pub struct Gateway<S: Store> {
    store: S,
    state: ElectionState,
    clock: Box<dyn Clock>,
    verifier: Box<dyn EligibilityVerifier>,
}

impl<S: Store> Gateway<S> {
    pub fn open(store: S, config: ElectionConfig) -> Result<Self, Error> {
        Gateway::open_with(
            store,
            config,
            Box::new(SystemClock),
            Box::new(SignatureEligibilityVerifier),
        )
    }

    pub fn open_with(
        mut store: S,
        config: ElectionConfig,
        clock: Box<dyn Clock>,
        verifier: Box<dyn EligibilityVerifier>,
    ) -> Result<Self, Error> {
        let state = load_or_initialize(&mut store, config, clock.now())?;
        Ok(Gateway {
            store,
            state,
            clock,
            verifier,
        })
    }

    pub fn state(&self) -> &ElectionState {
        &self.state
    }

    pub fn manifest(&self) -> &ElectionManifest {
        &self.state.manifest
    }

    pub fn public_keys(&self) -> PublicKeys {
        self.state.public_keys()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn persist(&mut self) -> Result<(), Error> {
        let raw = self.state.to_json()?;
        self.store.save(&raw)
    }

    /// Discard in-memory changes and return to the last saved state
    fn rollback(&mut self) -> Result<(), Error> {
        if let Some(raw) = self.store.load()? {
            self.state = ElectionState::from_json(&raw)?;
        }
        Ok(())
    }

    /// Throw away the election and start a new one with fresh keys
    pub fn reset(&mut self) -> Result<(), Error> {
        self.store.clear()?;
        self.state = ElectionState::initialize(self.state.config.clone(), self.clock.now())?;
        self.persist()?;
        info!("gateway: election {} reset", self.state.manifest.election_id);
        Ok(())
    }

    /// The enrolled voter credential, created on first use
    pub fn ensure_credential(&mut self) -> Result<VoterCredential, Error> {
        if let Some(credential) = &self.state.credential {
            return Ok(credential.clone());
        }
        let credential = VoterCredential::generate(self.clock.now());
        info!("gateway: enrolled credential {}", credential.did);
        self.state.credential = Some(credential.clone());
        self.persist()?;
        Ok(credential)
    }

    pub fn has_already_voted(&self, credential: &VoterCredential) -> bool {
        let nullifier = credential.nullifier(&self.state.manifest.election_id);
        self.state.ledger.has_cast_nullifier(nullifier)
    }

    pub fn issue_challenge(&mut self, request: &ChallengeRequest) -> Result<ChallengeResponse, Error> {
        let now = self.clock.now();
        let mut nonce = [0u8; CHALLENGE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let record = ChallengeRecord {
            challenge_id: Uuid::new_v4().to_string(),
            challenge: hex::encode(nonce),
            client_session: request.client_session.clone(),
            issued_at: now,
            expires_at: now + self.state.config.challenge_ttl(),
            used: false,
        };

        let gateway_key = &self.state.keys.gateway;
        let payload = canonical_json(&ChallengeSigningPayload {
            challenge_id: &record.challenge_id,
            challenge: &record.challenge,
            expires_at: &record.expires_at,
            client_session: &record.client_session,
            kid: &gateway_key.kid,
        })?;
        let response = ChallengeResponse {
            challenge_id: record.challenge_id.clone(),
            challenge: record.challenge.clone(),
            expires_at: record.expires_at,
            kid: gateway_key.kid.clone(),
            server_sig: gateway_key.sign(payload.as_bytes()),
        };

        debug!("gateway: issued challenge {}", record.challenge_id);
        self.state.challenges.insert(record.challenge_id.clone(), record);
        self.persist()?;
        Ok(response)
    }

    /// Encrypt selections on behalf of the voting device
    pub fn encrypt_ballot(&self, selections: Vec<Selection>) -> Result<PreparedBallot, Error> {
        encrypt_ballot(&self.state.manifest, &self.state.election_key, selections, self.clock.now())
    }

    /// Assemble a cast request for the enrolled credential
    pub fn build_cast_request(
        &mut self,
        encrypted_ballot: EncryptedBallot,
        challenge: &ChallengeResponse,
    ) -> Result<CastRequest, Error> {
        let credential = self.ensure_credential()?;
        let manifest = &self.state.manifest;
        let nullifier = credential.nullifier(&manifest.election_id);

        let eligibility_proof = credential.prove_eligibility(PublicInputs {
            election_id: manifest.election_id.clone(),
            jurisdiction_id: manifest.jurisdiction_id.clone(),
            nullifier,
            challenge: challenge.challenge.clone(),
        })?;

        Ok(CastRequest {
            ewp_version: EWP_VERSION.to_string(),
            election_id: manifest.election_id.clone(),
            jurisdiction_id: manifest.jurisdiction_id.clone(),
            manifest_id: manifest.manifest_id,
            challenge_id: challenge.challenge_id.clone(),
            challenge: challenge.challenge.clone(),
            nullifier,
            eligibility_proof,
            encrypted_ballot,
        })
    }

    /// Validate and record a cast
    ///
    /// The outcome, accepted or rejected, is remembered under `idempotency_key`;
    /// repeating the same request with the same key returns the same outcome.
    pub fn cast(&mut self, request: &CastRequest, idempotency_key: &str) -> Result<CastResponse, CastError> {
        let now = self.clock.now();
        let request_hash = request.request_hash()?;

        if let Some(record) = self.state.idempotency.get(idempotency_key) {
            if record.request_hash != request_hash {
                return Err(reject(
                    EwpErrorCode::IdempotencyMismatch,
                    "Idempotency key was already used with a different request body",
                )
                .into());
            }
            debug!("gateway: replaying response for idempotency key {}", idempotency_key);
            return Ok(record.response.replay()?);
        }

        let outcome = match self.validate(request, now) {
            Ok(validated) => match self.commit(validated, now) {
                Ok(response) => Ok(response),
                Err(e) => {
                    error!("gateway: commit failed, rolling back: {}", e);
                    self.rollback()?;
                    return Err(e.into());
                }
            },
            Err(rejection) => {
                if rejection.code == EwpErrorCode::NullifierUsed {
                    self.flag_duplicate_vote(request, now)?;
                }
                warn!("gateway: rejected cast: {}", rejection);
                Err(rejection)
            }
        };

        let response = match &outcome {
            Ok(response) => StoredResponse::Accepted(response.clone()),
            Err(error) => StoredResponse::Rejected(ErrorResponse { error: error.clone() }),
        };
        self.state.idempotency.insert(
            idempotency_key.to_string(),
            IdempotencyRecord {
                request_hash,
                response,
                stored_at: now,
            },
        );
        self.persist()?;

        Ok(outcome?)
    }

    fn validate<'r>(&self, request: &'r CastRequest, now: DateTime<Utc>) -> Result<ValidatedCast<'r>, EwpError> {
        let manifest = &self.state.manifest;
        let keys = self.state.public_keys();

        // Manifest
        if manifest.verify(&keys.manifest).is_err() {
            return Err(reject(EwpErrorCode::BadManifest, "Manifest signature is invalid"));
        }
        if request.ewp_version != EWP_VERSION {
            return Err(reject(EwpErrorCode::BadManifest, "Unsupported ewp_version"));
        }
        if request.election_id != manifest.election_id
            || request.jurisdiction_id != manifest.jurisdiction_id
            || request.manifest_id != manifest.manifest_id
        {
            return Err(reject(EwpErrorCode::BadManifest, "Request does not match the election manifest"));
        }
        if !manifest.is_open_at(now) {
            return Err(reject(EwpErrorCode::BadManifest, "Election is not open"));
        }
        if self.state.tally.is_some() {
            return Err(reject(EwpErrorCode::BadManifest, "Election is closed; the tally has been published"));
        }

        // Challenge
        let challenge = match self.state.challenges.get(&request.challenge_id) {
            Some(record) if record.challenge == request.challenge => record,
            _ => return Err(reject(EwpErrorCode::ProofInvalid, "Unknown challenge")),
        };
        if challenge.used {
            return Err(reject(EwpErrorCode::ProofInvalid, "Challenge already used"));
        }
        if now > challenge.expires_at {
            return Err(reject(EwpErrorCode::ChallengeExpired, "Challenge expired"));
        }

        // Eligibility
        let proof = &request.eligibility_proof;
        let expected_inputs = PublicInputs {
            election_id: request.election_id.clone(),
            jurisdiction_id: request.jurisdiction_id.clone(),
            nullifier: request.nullifier,
            challenge: request.challenge.clone(),
        };
        if proof.public_inputs != expected_inputs {
            return Err(reject(EwpErrorCode::ProofInvalid, "Proof public inputs do not match the request"));
        }
        if compute_nullifier(&proof.disclosed_key, &request.election_id) != request.nullifier {
            return Err(reject(EwpErrorCode::ProofInvalid, "Nullifier does not match the disclosed credential"));
        }
        if !self.verifier.verify(proof) {
            return Err(reject(EwpErrorCode::ProofInvalid, "Eligibility proof did not verify")
                .with_details(serde_json::json!({ "vk_id": proof.vk_id })));
        }

        // Double voting
        if self.state.ledger.has_cast_nullifier(request.nullifier) {
            return Err(reject(EwpErrorCode::NullifierUsed, "A ballot was already cast with this nullifier"));
        }

        // Ballot
        let ballot = &request.encrypted_ballot;
        if !ballot.hash_matches() {
            return Err(reject(EwpErrorCode::BallotInvalid, "ballot_hash does not match ciphertext"));
        }
        if self
            .state
            .spoiled_ballots
            .iter()
            .any(|spoiled| spoiled.ballot_hash == ballot.ballot_hash)
        {
            return Err(reject(EwpErrorCode::BallotInvalid, "Ballot was spoiled and cannot be cast"));
        }
        let decryptor = SymmetricTallyDecryptor::new(self.state.election_key.clone());
        let plaintext = decryptor
            .decrypt(&request.election_id, ballot)
            .map_err(|_| reject(EwpErrorCode::BallotInvalid, "Ballot could not be decrypted"))?;
        if plaintext.ballot_id != ballot.ballot_id || !validate_plaintext(manifest, &plaintext) {
            return Err(reject(EwpErrorCode::BallotInvalid, "Ballot selections are invalid"));
        }

        Ok(ValidatedCast { request })
    }

    fn commit(&mut self, validated: ValidatedCast, now: DateTime<Utc>) -> Result<CastResponse, Error> {
        let request = validated.request;
        let state = &mut self.state;

        if let Some(challenge) = state.challenges.get_mut(&request.challenge_id) {
            challenge.used = true;
        }

        let (leaf_index, leaf_hash) = state.bb.append_leaf(LeafPayload {
            ewp_version: request.ewp_version.clone(),
            election_id: request.election_id.clone(),
            manifest_id: request.manifest_id,
            encrypted_ballot: request.encrypted_ballot.clone(),
            received_at: now,
            gateway_id: state.config.gateway_id.clone(),
        })?;
        let sth = state.bb.issue_sth(&state.keys.bulletin_board, now)?;
        state
            .ledger
            .append(&state.keys.ledger, EventBody::SthPublished(sth.clone()), now)?;

        let ballot_hash = request.encrypted_ballot.ballot_hash;
        let cast_tx_id = state
            .ledger
            .append(
                &state.keys.ledger,
                EventBody::BallotCast(BallotCast {
                    election_id: request.election_id.clone(),
                    jurisdiction_id: request.jurisdiction_id.clone(),
                    nullifier: request.nullifier,
                    ballot_hash,
                    bb_leaf_hash: leaf_hash,
                    bb_root_hash: sth.root_hash,
                    gateway_id: state.config.gateway_id.clone(),
                }),
                now,
            )?
            .tx_id;

        let receipt = Signed::sign(
            &state.keys.gateway,
            ReceiptBody {
                receipt_id: Uuid::new_v4().to_string(),
                election_id: request.election_id.clone(),
                manifest_id: request.manifest_id,
                ballot_hash,
                bb_leaf_hash: leaf_hash,
                ledger_anchor: LedgerAnchor {
                    tx_id: cast_tx_id,
                    event_type: EventType::BallotCast,
                    sth_root_hash: sth.root_hash,
                },
                bb_sth: sth,
                kid: state.keys.gateway.kid.clone(),
            },
        )?;

        info!("gateway: recorded ballot {} at leaf {}", ballot_hash, leaf_index);
        Ok(CastResponse::CastRecorded { cast_receipt: receipt })
    }

    fn flag_duplicate_vote(&mut self, request: &CastRequest, now: DateTime<Utc>) -> Result<(), Error> {
        let flag = FraudFlag::duplicate_vote_attempt(&request.election_id, &request.jurisdiction_id, request.nullifier);
        let event = self
            .state
            .ledger
            .append(&self.state.keys.ledger, EventBody::FraudFlag(flag), now)?;
        warn!("gateway: duplicate vote attempt, opened fraud case {}", event.tx_id);
        Ok(())
    }

    /// Spoil a prepared ballot instead of casting it
    pub fn spoil(&mut self, prepared: &PreparedBallot) -> Result<SpoilResponse, Error> {
        let response = spoil_ballot(prepared, &self.state.keys.gateway, self.clock.now())?;
        self.state.spoiled_ballots.push(SpoiledBallotRecord {
            ballot_hash: prepared.encrypted_ballot.ballot_hash,
            encrypted_ballot: prepared.encrypted_ballot.clone(),
            spoil_receipt: response.spoil_receipt.clone(),
            randomness_reveal: response.randomness_reveal.clone(),
        });
        self.persist()?;
        info!("gateway: spoiled ballot {}", prepared.encrypted_ballot.ballot_hash);
        Ok(response)
    }

    pub fn publish_tally(&mut self) -> Result<Tally, Error> {
        let decryptor = SymmetricTallyDecryptor::new(self.state.election_key.clone());
        let tally = publish_tally(&mut self.state, &decryptor, self.clock.now())?;
        self.persist()?;
        Ok(tally)
    }

    pub fn fraud_cases(&self) -> Vec<FraudCase> {
        derive_fraud_cases(&self.state.ledger)
    }

    pub fn review_fraud_case(&mut self, review: FraudReview) -> Result<FraudCase, Error> {
        let now = self.clock.now();
        let case = review_fraud_case(&mut self.state.ledger, &self.state.keys.ledger, review, now)?;
        self.persist()?;
        Ok(case)
    }

    pub fn verify_receipt(&self, receipt: &CastReceipt) -> ReceiptVerification {
        verify_receipt(receipt, &self.state.ledger, &self.state.bb, &self.public_keys())
    }

    pub fn lookup_ballot(&self, ballot_hash: Hash256) -> BallotLookup {
        lookup_ballot(ballot_hash, &self.state.ledger, &self.state.bb, &self.public_keys())
    }

    pub fn snapshot(&self) -> TrustSnapshot {
        TrustSnapshot::capture(&self.state)
    }
}
