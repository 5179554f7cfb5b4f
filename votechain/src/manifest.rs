use crate::*;
use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::Signature;
use std::ops::Deref;

pub const EWP_VERSION: &str = "0.1-preview";
pub const CRYPTO_SUITE: &str = "ewp_suite_p256_aesgcm_single_key_v1";
pub const TALLY_SCHEME: &str = "symmetric_decrypt_and_count";

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContestType {
    Candidate,
    Referendum,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContestOption {
    pub id: String,
    pub label: String,
}

impl ContestOption {
    pub fn new(id: &str, label: &str) -> Self {
        ContestOption {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Contest {
    pub contest_id: String,
    pub title: String,

    #[serde(rename = "type")]
    pub contest_type: ContestType,

    pub options: Vec<ContestOption>,
}

impl Contest {
    /// Get an option with the given ID
    pub fn get_option(&self, option_id: &str) -> Option<&ContestOption> {
        self.options.iter().find(|option| option.id == option_id)
    }
}

/// Static definition of an election, from which the manifest is built
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionConfig {
    pub election_id: String,
    pub jurisdiction_id: String,
    pub gateway_id: String,
    pub contests: Vec<Contest>,

    /// Seconds before initialization that voting opens
    pub opens_before_secs: i64,

    /// Seconds after initialization that voting closes
    pub closes_after_secs: i64,

    pub challenge_ttl_secs: i64,
}

impl ElectionConfig {
    /// The single demonstration election
    pub fn demo() -> Self {
        ElectionConfig {
            election_id: "poc-2026-demo".to_string(),
            jurisdiction_id: "poc_jurisdiction_hash_0x9c1d".to_string(),
            gateway_id: "ewg_poc_1".to_string(),
            contests: vec![
                Contest {
                    contest_id: "us-senate-ny-2026".to_string(),
                    title: "U.S. Senate (New York)".to_string(),
                    contest_type: ContestType::Candidate,
                    options: vec![
                        ContestOption::new("gutierrez-d", "Maria Gutierrez (D)"),
                        ContestOption::new("chen-r", "James Chen (R)"),
                        ContestOption::new("okafor-i", "Adaeze Okafor (I)"),
                    ],
                },
                Contest {
                    contest_id: "prop-12-infrastructure".to_string(),
                    title: "Proposition 12: Infrastructure Bond".to_string(),
                    contest_type: ContestType::Referendum,
                    options: vec![
                        ContestOption::new("yes", "Yes"),
                        ContestOption::new("no", "No"),
                    ],
                },
            ],
            opens_before_secs: 60 * 60,
            closes_after_secs: 7 * 24 * 60 * 60,
            challenge_ttl_secs: 10 * 60,
        }
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::seconds(self.challenge_ttl_secs)
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        ElectionConfig::demo()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionParams {
    pub key_commitment: Hash256,
    pub tally_scheme: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CryptoParams {
    pub suite: String,
    pub election_params: ElectionParams,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub challenge: String,
    pub cast: String,
    pub bb: String,
}

/// The unsigned contents of a manifest
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManifestBody {
    pub election_id: String,
    pub jurisdiction_id: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub crypto: CryptoParams,
    pub contests: Vec<Contest>,
    pub endpoints: Endpoints,
}

impl ManifestBody {
    pub fn new(config: &ElectionConfig, election_key: &ElectionKey, now: DateTime<Utc>) -> Self {
        let base = format!("/v1/elections/{}", config.election_id);
        ManifestBody {
            election_id: config.election_id.clone(),
            jurisdiction_id: config.jurisdiction_id.clone(),
            not_before: now - Duration::seconds(config.opens_before_secs),
            not_after: now + Duration::seconds(config.closes_after_secs),
            crypto: CryptoParams {
                suite: CRYPTO_SUITE.to_string(),
                election_params: ElectionParams {
                    key_commitment: election_key.commitment(),
                    tally_scheme: TALLY_SCHEME.to_string(),
                },
            },
            contests: config.contests.clone(),
            endpoints: Endpoints {
                challenge: format!("{}/challenge", base),
                cast: format!("{}/cast", base),
                bb: format!("{}/bulletin-board", base),
            },
        }
    }

    /// Content-derived identifier of these manifest fields
    pub fn manifest_id(&self) -> Result<Hash256, Error> {
        canonical_hash(DOMAIN_MANIFEST, self)
    }

    /// Get a contest with the given ID
    pub fn get_contest(&self, contest_id: &str) -> Option<&Contest> {
        self.contests.iter().find(|contest| contest.contest_id == contest_id)
    }

    /// Whether voting is open at the given instant (both ends inclusive)
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManifestSigning {
    pub alg: String,
    pub kid: String,

    #[serde(with = "SignatureHex")]
    pub sig: Signature,
}

#[derive(Serialize)]
struct ManifestSigningPayload<'a> {
    #[serde(flatten)]
    body: &'a ManifestBody,
    manifest_id: &'a Hash256,
}

/// A signed election manifest
///
/// `manifest_id` is the hash of the unsigned fields. The signature covers the
/// unsigned fields together with `manifest_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionManifest {
    #[serde(flatten)]
    pub body: ManifestBody,
    pub manifest_id: Hash256,
    pub signing: ManifestSigning,
}

impl ElectionManifest {
    pub fn sign(keypair: &Keypair, body: ManifestBody) -> Result<Self, Error> {
        let manifest_id = body.manifest_id()?;
        let payload = canonical_json(&ManifestSigningPayload {
            body: &body,
            manifest_id: &manifest_id,
        })?;
        let sig = keypair.sign(payload.as_bytes());

        Ok(ElectionManifest {
            body,
            manifest_id,
            signing: ManifestSigning {
                alg: keypair.alg.clone(),
                kid: keypair.kid.clone(),
                sig,
            },
        })
    }

    /// Check the manifest id against the contents, then the signature
    pub fn verify(&self, key: &PublicKey) -> Result<(), Error> {
        if self.body.manifest_id()? != self.manifest_id {
            return Err(Error::ManifestIdMismatch);
        }
        let payload = canonical_json(&ManifestSigningPayload {
            body: &self.body,
            manifest_id: &self.manifest_id,
        })?;
        key.verify(&self.signing.kid, payload.as_bytes(), &self.signing.sig)
    }
}

impl Deref for ElectionManifest {
    type Target = ManifestBody;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}
