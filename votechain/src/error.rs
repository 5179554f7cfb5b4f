use crate::*;
use std::fmt;
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("votechain: signature error: {0}")]
    SignatureError(#[from] p256::ecdsa::Error),

    #[error("votechain: mismatched key id, expected {expected} but got {found}")]
    MismatchedKeyId { expected: String, found: String },

    #[error("votechain: invalid key material")]
    InvalidKey,

    #[error("votechain: invalid hash - invalid hexidecimal")]
    HashBadHex,

    #[error("votechain: invalid hash - wrong length")]
    HashBadLen,

    #[error("votechain: JSON error: {0}")]
    JSON(#[from] serde_json::Error),

    #[error("votechain: canonical JSON error: {0}")]
    Canonicalization(String),

    #[error("votechain: state storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("votechain: authenticated encryption failed")]
    EncryptionError,

    #[error("votechain: failed to decrypt ballot")]
    DecryptionError,

    #[error("votechain: ballot selections are not valid for this manifest")]
    InvalidSelections,

    #[error("votechain: manifest_id does not match manifest contents")]
    ManifestIdMismatch,

    #[error("votechain: tx_id does not match ledger event contents")]
    TxIdMismatch,

    #[error("votechain: no signed tree head has been published")]
    NoTreeHead,

    #[error("votechain: election is still open until {0}")]
    ElectionNotClosed(chrono::DateTime<chrono::Utc>),

    #[error("votechain: unknown fraud case {0}")]
    UnknownFraudCase(Hash256),

    #[error("votechain: reviewer_id is required")]
    MissingReviewer,

    #[error("votechain: Case is already {0}. Only notes are allowed.")]
    FraudCaseResolved(FraudStatus),

    #[error("votechain: bulletin board index {index} is outside tree of size {tree_size}")]
    LeafOutOfRange { index: u64, tree_size: u64 },
}

/// Protocol error codes returned to voters on the wire
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EwpErrorCode {
    #[serde(rename = "EWP_BAD_MANIFEST")]
    BadManifest,

    #[serde(rename = "EWP_PROOF_INVALID")]
    ProofInvalid,

    #[serde(rename = "EWP_NULLIFIER_USED")]
    NullifierUsed,

    #[serde(rename = "EWP_BALLOT_INVALID")]
    BallotInvalid,

    #[serde(rename = "EWP_CHALLENGE_EXPIRED")]
    ChallengeExpired,

    #[serde(rename = "EWP_IDEMPOTENCY_MISMATCH")]
    IdempotencyMismatch,

    #[serde(rename = "EWP_RATE_LIMITED")]
    RateLimited,

    #[serde(rename = "EWP_GATEWAY_OVERLOADED")]
    GatewayOverloaded,
}

impl EwpErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EwpErrorCode::BadManifest => "EWP_BAD_MANIFEST",
            EwpErrorCode::ProofInvalid => "EWP_PROOF_INVALID",
            EwpErrorCode::NullifierUsed => "EWP_NULLIFIER_USED",
            EwpErrorCode::BallotInvalid => "EWP_BALLOT_INVALID",
            EwpErrorCode::ChallengeExpired => "EWP_CHALLENGE_EXPIRED",
            EwpErrorCode::IdempotencyMismatch => "EWP_IDEMPOTENCY_MISMATCH",
            EwpErrorCode::RateLimited => "EWP_RATE_LIMITED",
            EwpErrorCode::GatewayOverloaded => "EWP_GATEWAY_OVERLOADED",
        }
    }

    /// Whether a client may retry the same request after this error
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EwpErrorCode::ChallengeExpired
                | EwpErrorCode::RateLimited
                | EwpErrorCode::GatewayOverloaded
        )
    }
}

impl fmt::Display for EwpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A protocol-level rejection, serialized as the `error` member of an error response
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct EwpError {
    pub code: EwpErrorCode,
    pub message: String,
    pub retryable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EwpError {
    pub fn new(code: EwpErrorCode, message: impl Into<String>) -> Self {
        EwpError {
            code,
            message: message.into(),
            retryable: code.retryable(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Wire shape of every error returned by the gateway
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: EwpError,
}

/// Outcome of a cast that did not produce a response
#[derive(Debug, Error)]
pub enum CastError {
    #[error("cast rejected: {0}")]
    Rejected(#[from] EwpError),

    #[error(transparent)]
    Internal(#[from] Error),
}

impl CastError {
    /// The protocol rejection, if this was one
    pub fn rejection(&self) -> Option<&EwpError> {
        match self {
            CastError::Rejected(e) => Some(e),
            CastError::Internal(_) => None,
        }
    }
}
