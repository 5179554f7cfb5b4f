use crate::*;
use chrono::{DateTime, Utc};
use num_enum::TryFromPrimitive;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Layout version of persisted election state
#[derive(TryFromPrimitive, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum StateVersion {
    /// Single-key ballots with no key commitment in the manifest. Not loadable.
    V1 = 1,
    V2 = 2,
}

pub const CURRENT_STATE_VERSION: StateVersion = StateVersion::V2;

impl Serialize for StateVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(*self as u32)
    }
}

impl<'de> Deserialize<'de> for StateVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u32::deserialize(deserializer)?;
        StateVersion::try_from_primitive(raw).map_err(|_| de::Error::custom(format!("unknown state version {}", raw)))
    }
}

/// Everything one election instance persists between runs
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ElectionState {
    pub version: StateVersion,
    pub created_at: DateTime<Utc>,
    pub config: ElectionConfig,
    pub keys: AuthorityKeys,
    pub election_key: ElectionKey,
    pub manifest: ElectionManifest,

    #[serde(default)]
    pub credential: Option<VoterCredential>,

    #[serde(default)]
    pub challenges: BTreeMap<String, ChallengeRecord>,

    #[serde(default)]
    pub idempotency: BTreeMap<String, IdempotencyRecord>,

    pub bb: BulletinBoard,
    pub ledger: Ledger,

    #[serde(default)]
    pub spoiled_ballots: Vec<SpoiledBallotRecord>,

    #[serde(default)]
    pub tally: Option<Tally>,
}

impl ElectionState {
    /// Generate keys, sign the manifest and anchor it on a fresh ledger
    pub fn initialize(config: ElectionConfig, now: DateTime<Utc>) -> Result<Self, Error> {
        let keys = AuthorityKeys::generate();
        let election_key = ElectionKey::generate();
        let manifest = ElectionManifest::sign(&keys.manifest, ManifestBody::new(&config, &election_key, now))?;

        let mut ledger = Ledger::new();
        ledger.append(
            &keys.ledger,
            EventBody::ManifestPublished(ManifestPublished {
                election_id: manifest.election_id.clone(),
                jurisdiction_id: manifest.jurisdiction_id.clone(),
                manifest_id: manifest.manifest_id,
                signer_kid: manifest.signing.kid.clone(),
            }),
            now,
        )?;

        info!(
            "state: initialized election {} with manifest {}",
            manifest.election_id, manifest.manifest_id
        );

        Ok(ElectionState {
            version: CURRENT_STATE_VERSION,
            created_at: now,
            config,
            keys,
            election_key,
            manifest,
            credential: None,
            challenges: BTreeMap::new(),
            idempotency: BTreeMap::new(),
            bb: BulletinBoard::new(),
            ledger,
            spoiled_ballots: Vec::new(),
            tally: None,
        })
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn public_keys(&self) -> PublicKeys {
        self.keys.public_keys()
    }
}

/// Why persisted state could not be resumed
fn incompatibility(raw: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return Some(format!("state is not valid JSON: {}", e)),
    };

    match value.get("version").and_then(|v| v.as_u64()) {
        Some(v) if v == CURRENT_STATE_VERSION as u64 => {}
        Some(v) => return Some(format!("state version {} is not {}", v, CURRENT_STATE_VERSION as u32)),
        None => return Some("state has no version".to_string()),
    }

    match value.pointer("/manifest/crypto/suite").and_then(|s| s.as_str()) {
        Some(CRYPTO_SUITE) => None,
        Some(other) => Some(format!("crypto suite {} is not {}", other, CRYPTO_SUITE)),
        None => Some("manifest has no crypto suite".to_string()),
    }
}

/// Resume persisted state, or start a new election when there is none or it cannot be used
pub fn load_or_initialize<S: Store>(
    store: &mut S,
    config: ElectionConfig,
    now: DateTime<Utc>,
) -> Result<ElectionState, Error> {
    if let Some(raw) = store.load()? {
        let resumed = match incompatibility(&raw) {
            Some(reason) => Err(reason),
            None => ElectionState::from_json(&raw).map_err(|e| e.to_string()),
        };
        match resumed {
            Ok(state) => {
                debug!("state: resumed election {}", state.manifest.election_id);
                return Ok(state);
            }
            Err(reason) => warn!("state: discarding stored state: {}", reason),
        }
    }

    let state = ElectionState::initialize(config, now)?;
    store.save(&state.to_json()?)?;
    Ok(state)
}

/// Persistence for a single serialized election state
pub trait Store {
    fn load(&self) -> Result<Option<String>, Error>;
    fn save(&mut self, state: &str) -> Result<(), Error>;
    fn clear(&mut self) -> Result<(), Error>;
}

/// A simple store that keeps state in memory
#[derive(Default, Clone, Debug)]
pub struct MemStore {
    inner: Option<String>,
}

impl Store for MemStore {
    fn load(&self) -> Result<Option<String>, Error> {
        Ok(self.inner.clone())
    }

    fn save(&mut self, state: &str) -> Result<(), Error> {
        self.inner = Some(state.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.inner = None;
        Ok(())
    }
}

impl From<String> for MemStore {
    fn from(item: String) -> Self {
        MemStore { inner: Some(item) }
    }
}

/// Stores state as a JSON file, replaced atomically on every save
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for FileStore {
    fn load(&self) -> Result<Option<String>, Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, state: &str) -> Result<(), Error> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, state)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
