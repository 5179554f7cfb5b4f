//! Trust portal: public re-verification of everything an election has published.

use crate::*;
use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManifestAudit {
    pub valid: bool,
    pub manifest_id: Hash256,
    pub kid: String,
}

pub fn verify_manifest_signature(manifest: &ElectionManifest, keys: &PublicKeys) -> ManifestAudit {
    ManifestAudit {
        valid: manifest.verify(&keys.manifest).is_ok(),
        manifest_id: manifest.manifest_id,
        kid: manifest.signing.kid.clone(),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SthAudit {
    pub tree_size: u64,
    pub root_hash: Hash256,
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LedgerEventAudit {
    pub tx_id: Hash256,
    pub event_type: EventType,
    pub recorded_at: DateTime<Utc>,
    pub valid: bool,
}

/// Results of checking every item in a published series
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditSummary<T> {
    pub total: usize,
    pub valid: usize,
    pub all_valid: bool,
    pub results: Vec<T>,
}

impl<T> AuditSummary<T> {
    fn new(results: Vec<T>, is_valid: impl Fn(&T) -> bool) -> Self {
        let valid = results.iter().filter(|r| is_valid(*r)).count();
        AuditSummary {
            total: results.len(),
            valid,
            all_valid: valid == results.len(),
            results,
        }
    }
}

pub fn verify_all_sth_signatures(bb: &BulletinBoard, keys: &PublicKeys) -> AuditSummary<SthAudit> {
    let results: Vec<SthAudit> = bb
        .sth_history()
        .iter()
        .map(|sth| SthAudit {
            tree_size: sth.tree_size,
            root_hash: sth.root_hash,
            timestamp: sth.timestamp,
            valid: sth.verify_signature(&keys.bulletin_board).is_ok(),
        })
        .collect();
    AuditSummary::new(results, |r| r.valid)
}

pub fn verify_all_ledger_signatures(ledger: &Ledger, keys: &PublicKeys) -> AuditSummary<LedgerEventAudit> {
    let results: Vec<LedgerEventAudit> = ledger
        .verify_all(&keys.ledger)
        .into_iter()
        .map(|(event, valid)| LedgerEventAudit {
            tx_id: event.tx_id,
            event_type: event.event_type(),
            recorded_at: event.recorded_at,
            valid,
        })
        .collect();
    AuditSummary::new(results, |r| r.valid)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoardIntegrity {
    pub valid: bool,
    pub tree_size: u64,
    pub computed_root: Hash256,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_sth_root: Option<Hash256>,

    pub details: String,
}

/// Recompute every leaf hash and the root, and compare with the latest tree head
pub fn verify_bulletin_board_integrity(bb: &BulletinBoard) -> BoardIntegrity {
    let computed_root = bb.root();
    let tree_size = bb.len() as u64;
    let latest_sth_root = bb.latest_sth().map(|sth| sth.root_hash);

    let tampered_leaf = bb
        .leaves()
        .iter()
        .position(|leaf| leaf.payload.leaf_hash().ok() != Some(leaf.leaf_hash));

    let (valid, details) = match (tampered_leaf, bb.latest_sth()) {
        (Some(index), _) => (false, format!("Leaf {} does not match its payload", index)),
        (None, None) if tree_size == 0 => (true, "Bulletin board is empty".to_string()),
        (None, None) => (false, "Leaves exist but no tree head was published".to_string()),
        (None, Some(sth)) if sth.tree_size != tree_size => (
            false,
            format!("Latest tree head covers {} of {} leaves", sth.tree_size, tree_size),
        ),
        (None, Some(sth)) if sth.root_hash != computed_root => {
            (false, "Computed root differs from the latest tree head".to_string())
        }
        (None, Some(_)) => (true, "Computed root matches the latest tree head".to_string()),
    };

    BoardIntegrity {
        valid,
        tree_size,
        computed_root,
        latest_sth_root,
        details,
    }
}

/// Everything a public observer needs to audit the election
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrustSnapshot {
    pub election_id: String,
    pub manifest: ElectionManifest,
    pub public_keys: PublicKeys,
    pub manifest_audit: ManifestAudit,
    pub sth_audit: AuditSummary<SthAudit>,
    pub ledger_audit: AuditSummary<LedgerEventAudit>,
    pub bb_integrity: BoardIntegrity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_sth: Option<SignedTreeHead>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tally: Option<Tally>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tally_verification: Option<Verification>,

    pub ballot_count: usize,
    pub ledger_event_count: usize,
    pub cast_count: usize,
    pub fraud_flag_count: usize,
    pub spoiled_count: usize,
    pub open_fraud_cases: usize,
    pub fraud_cases: Vec<FraudCase>,
}

impl TrustSnapshot {
    pub fn capture(state: &ElectionState) -> Self {
        let keys = state.public_keys();
        let fraud_cases = derive_fraud_cases(&state.ledger);
        TrustSnapshot {
            election_id: state.manifest.election_id.clone(),
            manifest: state.manifest.clone(),
            manifest_audit: verify_manifest_signature(&state.manifest, &keys),
            sth_audit: verify_all_sth_signatures(&state.bb, &keys),
            ledger_audit: verify_all_ledger_signatures(&state.ledger, &keys),
            bb_integrity: verify_bulletin_board_integrity(&state.bb),
            latest_sth: state.bb.latest_sth().cloned(),
            tally_verification: state
                .tally
                .as_ref()
                .map(|tally| verify_tally(tally, &state.ledger, &state.bb, &keys)),
            tally: state.tally.clone(),
            ballot_count: state.bb.len(),
            ledger_event_count: state.ledger.len(),
            cast_count: state.ledger.events_of(EventType::BallotCast).count(),
            fraud_flag_count: state.ledger.events_of(EventType::FraudFlag).count(),
            spoiled_count: state.spoiled_ballots.len(),
            open_fraud_cases: fraud_cases.iter().filter(|case| !case.status.is_resolved()).count(),
            fraud_cases,
            public_keys: keys,
        }
    }

    /// Whether every published signature and the board itself check out
    pub fn all_valid(&self) -> bool {
        self.manifest_audit.valid
            && self.sth_audit.all_valid
            && self.ledger_audit.all_valid
            && self.bb_integrity.valid
            && self.tally_verification.as_ref().map_or(true, Verification::is_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_election_audits_clean() {
        let state = ElectionState::initialize(ElectionConfig::demo(), Utc::now()).unwrap();
        let snapshot = TrustSnapshot::capture(&state);
        assert!(snapshot.all_valid());
        assert_eq!(snapshot.ledger_audit.total, 1);
        assert_eq!(snapshot.ledger_event_count, 1);
        assert_eq!(snapshot.cast_count, 0);
        assert!(snapshot.fraud_cases.is_empty());
        assert_eq!(snapshot.sth_audit.total, 0);
        assert_eq!(snapshot.bb_integrity.details, "Bulletin board is empty");
    }

    #[test]
    fn foreign_keys_fail_audit() {
        let state = ElectionState::initialize(ElectionConfig::demo(), Utc::now()).unwrap();
        let impostor = AuthorityKeys::generate().public_keys();

        assert!(!verify_manifest_signature(&state.manifest, &impostor).valid);
        let ledger = verify_all_ledger_signatures(&state.ledger, &impostor);
        assert!(!ledger.all_valid);
        assert_eq!(ledger.valid, 0);
    }
}
