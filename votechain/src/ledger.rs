use crate::*;
use chrono::{DateTime, Utc};
use p256::ecdsa::Signature;
use std::fmt;

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ManifestPublished,
    BallotCast,
    SthPublished,
    TallyPublished,
    FraudFlag,
    FraudFlagAction,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EventType::ManifestPublished => "manifest_published",
            EventType::BallotCast => "ballot_cast",
            EventType::SthPublished => "sth_published",
            EventType::TallyPublished => "tally_published",
            EventType::FraudFlag => "fraud_flag",
            EventType::FraudFlagAction => "fraud_flag_action",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManifestPublished {
    pub election_id: String,
    pub jurisdiction_id: String,
    pub manifest_id: Hash256,
    pub signer_kid: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BallotCast {
    pub election_id: String,
    pub jurisdiction_id: String,
    pub nullifier: Hash256,
    pub ballot_hash: Hash256,
    pub bb_leaf_hash: Hash256,
    pub bb_root_hash: Hash256,
    pub gateway_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TallyPublished {
    pub election_id: String,
    pub manifest_id: Hash256,
    pub bb_close_root_hash: Hash256,
    pub tally_hash: Hash256,
}

/// Event type and payload, serialized as adjacent `type` and `payload` members
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    ManifestPublished(ManifestPublished),
    BallotCast(BallotCast),
    SthPublished(SignedTreeHead),
    TallyPublished(TallyPublished),
    FraudFlag(FraudFlag),
    FraudFlagAction(FraudFlagAction),
}

impl EventBody {
    pub fn event_type(&self) -> EventType {
        match self {
            EventBody::ManifestPublished(_) => EventType::ManifestPublished,
            EventBody::BallotCast(_) => EventType::BallotCast,
            EventBody::SthPublished(_) => EventType::SthPublished,
            EventBody::TallyPublished(_) => EventType::TallyPublished,
            EventBody::FraudFlag(_) => EventType::FraudFlag,
            EventBody::FraudFlagAction(_) => EventType::FraudFlagAction,
        }
    }
}

#[derive(Serialize)]
struct TxContent<'a> {
    #[serde(flatten)]
    body: &'a EventBody,
    recorded_at: &'a DateTime<Utc>,
    kid: &'a str,
}

#[derive(Serialize)]
struct TxSigningPayload<'a> {
    tx_id: &'a Hash256,

    #[serde(flatten)]
    content: TxContent<'a>,
}

/// A signed, append-only ledger event
///
/// `tx_id` is the hash of `{type, recorded_at, payload, kid}`; the signature
/// covers those fields plus `tx_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LedgerEvent {
    pub tx_id: Hash256,

    #[serde(flatten)]
    pub body: EventBody,

    pub recorded_at: DateTime<Utc>,
    pub kid: String,

    #[serde(with = "SignatureHex")]
    pub sig: Signature,
}

impl LedgerEvent {
    pub fn new(keypair: &Keypair, body: EventBody, recorded_at: DateTime<Utc>) -> Result<Self, Error> {
        let content = TxContent {
            body: &body,
            recorded_at: &recorded_at,
            kid: &keypair.kid,
        };
        let tx_id = canonical_hash(DOMAIN_LEDGER_TX, &content)?;
        let payload = canonical_json(&TxSigningPayload {
            tx_id: &tx_id,
            content,
        })?;
        let sig = keypair.sign(payload.as_bytes());

        Ok(LedgerEvent {
            tx_id,
            kid: keypair.kid.clone(),
            body,
            recorded_at,
            sig,
        })
    }

    pub fn event_type(&self) -> EventType {
        self.body.event_type()
    }

    fn content(&self) -> TxContent<'_> {
        TxContent {
            body: &self.body,
            recorded_at: &self.recorded_at,
            kid: &self.kid,
        }
    }

    /// Recompute tx_id from the event contents
    pub fn compute_tx_id(&self) -> Result<Hash256, Error> {
        canonical_hash(DOMAIN_LEDGER_TX, &self.content())
    }

    /// Check tx_id against the contents, then the signature
    pub fn verify(&self, key: &PublicKey) -> Result<(), Error> {
        if self.compute_tx_id()? != self.tx_id {
            return Err(Error::TxIdMismatch);
        }
        let payload = canonical_json(&TxSigningPayload {
            tx_id: &self.tx_id,
            content: self.content(),
        })?;
        key.verify(&self.kid, payload.as_bytes(), &self.sig)
    }
}

/// Append-only list of signed events
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    events: Vec<LedgerEvent>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    /// Sign and append an event
    pub fn append(
        &mut self,
        keypair: &Keypair,
        body: EventBody,
        recorded_at: DateTime<Utc>,
    ) -> Result<&LedgerEvent, Error> {
        let event = LedgerEvent::new(keypair, body, recorded_at)?;
        debug!("ledger: appended {} event {}", event.event_type(), event.tx_id);
        self.events.push(event);
        Ok(&self.events[self.events.len() - 1])
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events_of(&self, event_type: EventType) -> impl Iterator<Item = &LedgerEvent> {
        self.events
            .iter()
            .filter(move |event| event.event_type() == event_type)
    }

    /// Get an event with the given tx_id
    pub fn find(&self, tx_id: Hash256) -> Option<&LedgerEvent> {
        self.events.iter().find(|event| event.tx_id == tx_id)
    }

    /// All ballot_cast payloads, in ledger order
    pub fn ballot_casts(&self) -> impl Iterator<Item = (&LedgerEvent, &BallotCast)> {
        self.events.iter().filter_map(|event| match &event.body {
            EventBody::BallotCast(cast) => Some((event, cast)),
            _ => None,
        })
    }

    /// The ballot_cast event that anchors a bulletin-board leaf
    pub fn anchor_for_leaf(&self, leaf_hash: Hash256) -> Option<(&LedgerEvent, &BallotCast)> {
        self.ballot_casts().find(|(_, cast)| cast.bb_leaf_hash == leaf_hash)
    }

    pub fn anchor_for_ballot(&self, ballot_hash: Hash256) -> Option<(&LedgerEvent, &BallotCast)> {
        self.ballot_casts().find(|(_, cast)| cast.ballot_hash == ballot_hash)
    }

    /// The manifest_published event for a manifest
    pub fn manifest_event(&self, manifest_id: Hash256) -> Option<&LedgerEvent> {
        self.events.iter().find(|event| match &event.body {
            EventBody::ManifestPublished(published) => published.manifest_id == manifest_id,
            _ => false,
        })
    }

    /// Whether a ballot has already been cast under this nullifier
    pub fn has_cast_nullifier(&self, nullifier: Hash256) -> bool {
        self.ballot_casts().any(|(_, cast)| cast.nullifier == nullifier)
    }

    /// Verify every event, in order
    pub fn verify_all(&self, key: &PublicKey) -> Vec<(&LedgerEvent, bool)> {
        self.events
            .iter()
            .map(|event| (event, event.verify(key).is_ok()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast_body(nullifier: Hash256, leaf: Hash256) -> EventBody {
        EventBody::BallotCast(BallotCast {
            election_id: "poc-2026-demo".to_string(),
            jurisdiction_id: "poc_jurisdiction_hash_0x9c1d".to_string(),
            nullifier,
            ballot_hash: tagged_hash(DOMAIN_BALLOT, &[b"ct"]),
            bb_leaf_hash: leaf,
            bb_root_hash: leaf,
            gateway_id: "ewg_poc_1".to_string(),
        })
    }

    #[test]
    fn append_and_verify() {
        let keypair = Keypair::generate(KeyRole::Ledger.default_kid());
        let mut ledger = Ledger::new();
        let nullifier = tagged_hash(DOMAIN_NULLIFIER, &[b"voter"]);
        let leaf = tagged_hash(DOMAIN_BB_LEAF, &[b"leaf"]);

        let tx_id = ledger
            .append(&keypair, cast_body(nullifier, leaf), Utc::now())
            .unwrap()
            .tx_id;

        assert_eq!(ledger.len(), 1);
        assert!(ledger.has_cast_nullifier(nullifier));
        assert!(!ledger.has_cast_nullifier(leaf));
        assert_eq!(ledger.anchor_for_leaf(leaf).unwrap().0.tx_id, tx_id);
        assert_eq!(
            ledger.anchor_for_ballot(tagged_hash(DOMAIN_BALLOT, &[b"ct"])).unwrap().0.tx_id,
            tx_id
        );
        assert_eq!(ledger.events_of(EventType::BallotCast).count(), 1);
        assert!(ledger.events_of(EventType::FraudFlag).next().is_none());
        assert!(ledger.verify_all(&keypair.public()).iter().all(|(_, ok)| *ok));

        let event = ledger.find(tx_id).unwrap();
        assert_eq!(event.compute_tx_id().unwrap(), tx_id);
    }

    #[test]
    fn wire_shape_and_round_trip() {
        let keypair = Keypair::generate(KeyRole::Ledger.default_kid());
        let leaf = tagged_hash(DOMAIN_BB_LEAF, &[b"leaf"]);
        let event = LedgerEvent::new(&keypair, cast_body(leaf, leaf), Utc::now()).unwrap();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ballot_cast");
        assert_eq!(json["payload"]["gateway_id"], "ewg_poc_1");
        assert_eq!(json["kid"], "ledger-kid-1");

        let restored: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(restored, event);
        restored.verify(&keypair.public()).unwrap();
    }

    #[test]
    fn tampered_event_fails() {
        let keypair = Keypair::generate(KeyRole::Ledger.default_kid());
        let leaf = tagged_hash(DOMAIN_BB_LEAF, &[b"leaf"]);
        let mut event = LedgerEvent::new(&keypair, cast_body(leaf, leaf), Utc::now()).unwrap();

        if let EventBody::BallotCast(cast) = &mut event.body {
            cast.gateway_id = "ewg_rogue".to_string();
        }
        assert!(matches!(event.verify(&keypair.public()), Err(Error::TxIdMismatch)));

        event.tx_id = event.compute_tx_id().unwrap();
        assert!(matches!(event.verify(&keypair.public()), Err(Error::SignatureError(_))));
    }
}
