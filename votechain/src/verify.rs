use crate::*;
use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Fail,
}

/// One named verification step
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub details: String,
}

impl Check {
    pub fn pass(name: &str, details: impl Into<String>) -> Self {
        Check {
            name: name.to_string(),
            status: CheckStatus::Ok,
            details: details.into(),
        }
    }

    pub fn fail(name: &str, details: impl Into<String>) -> Self {
        Check {
            name: name.to_string(),
            status: CheckStatus::Fail,
            details: details.into(),
        }
    }

    pub fn from_result(name: &str, result: Result<(), Error>, ok_details: &str) -> Self {
        match result {
            Ok(()) => Check::pass(name, ok_details),
            Err(e) => Check::fail(name, e.to_string()),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Ok,
    Fail,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Verification {
    pub status: VerificationStatus,
    pub checks: Vec<Check>,
}

impl Verification {
    pub fn new(checks: Vec<Check>) -> Self {
        let status = if checks.iter().all(Check::passed) {
            VerificationStatus::Ok
        } else {
            VerificationStatus::Fail
        };
        Verification { status, checks }
    }

    pub fn is_ok(&self) -> bool {
        self.status == VerificationStatus::Ok
    }

    pub fn get_check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|check| check.name == name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReceiptVerification {
    #[serde(flatten)]
    pub verification: Verification,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion_proof: Option<InclusionProof>,
}

/// Independently re-check a cast receipt against the published ledger and bulletin board
pub fn verify_receipt(
    receipt: &CastReceipt,
    ledger: &Ledger,
    bb: &BulletinBoard,
    keys: &PublicKeys,
) -> ReceiptVerification {
    let mut checks = Vec::new();

    checks.push(match ledger.manifest_event(receipt.manifest_id) {
        Some(event) => Check::pass(
            "manifest_anchored",
            format!("Manifest {} published in ledger event {}", receipt.manifest_id, event.tx_id),
        ),
        None => Check::fail("manifest_anchored", "Manifest was never published on the ledger"),
    });

    checks.push(Check::from_result(
        "receipt_signature",
        receipt.verify_signature(&keys.gateway),
        "Receipt signed by the gateway key",
    ));

    checks.push(Check::from_result(
        "bb_sth_signature",
        receipt.bb_sth.verify_signature(&keys.bulletin_board),
        "Tree head signed by the bulletin board key",
    ));

    let leaf = bb.find_leaf(receipt.bb_leaf_hash);
    checks.push(match leaf {
        Some((index, leaf)) if leaf.payload.encrypted_ballot.ballot_hash == receipt.ballot_hash => {
            Check::pass("bb_leaf_exists", format!("Leaf found at index {}", index))
        }
        Some(_) => Check::fail("bb_leaf_exists", "Leaf found but carries a different ballot"),
        None => Check::fail("bb_leaf_exists", "Leaf not found on the bulletin board"),
    });

    let proof = leaf.and_then(|(index, _)| bb.inclusion_proof_at(index, receipt.bb_sth.tree_size).ok());
    checks.push(match &proof {
        Some(proof) if proof.verify() && proof.root_hash == receipt.bb_sth.root_hash => Check::pass(
            "bb_inclusion_proof",
            format!("Leaf included under root {} of size {}", proof.root_hash, proof.tree_size),
        ),
        Some(_) => Check::fail("bb_inclusion_proof", "Inclusion proof does not reach the receipt's tree head"),
        None => Check::fail("bb_inclusion_proof", "No inclusion proof for this leaf at the receipt's tree size"),
    });

    let anchor = ledger.find(receipt.ledger_anchor.tx_id);
    let anchor_matches = match anchor.map(|event| &event.body) {
        Some(EventBody::BallotCast(cast)) => {
            receipt.ledger_anchor.event_type == EventType::BallotCast
                && cast.ballot_hash == receipt.ballot_hash
                && cast.bb_leaf_hash == receipt.bb_leaf_hash
                && cast.bb_root_hash == receipt.ledger_anchor.sth_root_hash
        }
        _ => false,
    };
    checks.push(if anchor_matches {
        Check::pass("ledger_anchor", format!("Anchored by ballot_cast event {}", receipt.ledger_anchor.tx_id))
    } else {
        Check::fail("ledger_anchor", "No matching ballot_cast event for this receipt")
    });

    checks.push(match anchor {
        Some(event) => Check::from_result(
            "ledger_anchor_signature",
            event.verify(&keys.ledger),
            "Anchor event signed by the ledger key",
        ),
        None => Check::fail("ledger_anchor_signature", "Anchor event not found"),
    });

    ReceiptVerification {
        verification: Verification::new(checks),
        inclusion_proof: proof,
    }
}

/// Summary of the ledger event anchoring a ballot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnchorSummary {
    pub tx_id: Hash256,
    pub event_type: EventType,
    pub recorded_at: DateTime<Utc>,
    pub bb_root_hash: Hash256,
}

/// Public lookup of a ballot by its hash
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BallotLookup {
    pub ballot_hash: Hash256,
    pub found: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_hash: Option<Hash256>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_index: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion_proof: Option<InclusionProof>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_sth: Option<SignedTreeHead>,

    pub checks: Vec<Check>,
}

impl BallotLookup {
    pub fn is_ok(&self) -> bool {
        self.found && self.checks.iter().all(Check::passed)
    }
}

/// Find a ballot on the bulletin board and check its inclusion and anchoring
pub fn lookup_ballot(ballot_hash: Hash256, ledger: &Ledger, bb: &BulletinBoard, keys: &PublicKeys) -> BallotLookup {
    let (index, leaf) = match bb.find_ballot(ballot_hash) {
        Some(found) => found,
        None => {
            return BallotLookup {
                ballot_hash,
                found: false,
                leaf_hash: None,
                leaf_index: None,
                received_at: None,
                inclusion_proof: None,
                anchor: None,
                latest_sth: None,
                checks: vec![Check::fail(
                    "ballot_on_bulletin_board",
                    "Ballot not found on the bulletin board",
                )],
            }
        }
    };

    let mut checks = vec![Check::pass(
        "ballot_on_bulletin_board",
        format!("Ballot found at leaf index {}", index),
    )];

    let proof = bb.inclusion_proof(index);
    let current_root = bb.root();
    checks.push(match &proof {
        Some(proof) if proof.verify() && proof.root_hash == current_root => Check::pass(
            "merkle_inclusion_proof",
            format!("Leaf included under current root {}", current_root),
        ),
        _ => Check::fail("merkle_inclusion_proof", "Inclusion proof does not reach the current root"),
    });

    let anchor = ledger.anchor_for_leaf(leaf.leaf_hash);
    checks.push(match anchor {
        Some((event, cast)) if cast.ballot_hash == ballot_hash => Check::pass(
            "ledger_anchor",
            format!("Anchored by ballot_cast event {}", event.tx_id),
        ),
        _ => Check::fail("ledger_anchor", "No ballot_cast event anchors this leaf"),
    });

    checks.push(match anchor {
        Some((event, _)) => Check::from_result(
            "anchor_signature",
            event.verify(&keys.ledger),
            "Anchor event signed by the ledger key",
        ),
        None => Check::fail("anchor_signature", "Anchor event not found"),
    });

    let latest_sth = bb.latest_sth();
    checks.push(match latest_sth {
        Some(sth) => Check::from_result(
            "latest_sth_signature",
            sth.verify_signature(&keys.bulletin_board),
            "Latest tree head signed by the bulletin board key",
        ),
        None => Check::fail("latest_sth_signature", "No signed tree head published"),
    });

    BallotLookup {
        ballot_hash,
        found: true,
        leaf_hash: Some(leaf.leaf_hash),
        leaf_index: Some(index),
        received_at: Some(leaf.payload.received_at),
        inclusion_proof: proof,
        anchor: anchor.map(|(event, cast)| AnchorSummary {
            tx_id: event.tx_id,
            event_type: event.event_type(),
            recorded_at: event.recorded_at,
            bb_root_hash: cast.bb_root_hash,
        }),
        latest_sth: latest_sth.cloned(),
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_on_the_wire() {
        let good = Verification::new(vec![Check::pass("a", "fine"), Check::pass("b", "fine")]);
        let json = serde_json::to_value(&good).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["checks"][0]["status"], "ok");
        assert!(good.is_ok());

        let bad = Verification::new(vec![
            Check::pass("a", "fine"),
            Check::from_result("b", Err(Error::NoTreeHead), "unused"),
        ]);
        let json = serde_json::to_value(&bad).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["checks"][1]["status"], "fail");
        assert_eq!(json["checks"][1]["details"], "votechain: no signed tree head has been published");
        assert!(!bad.is_ok());
        assert!(!bad.get_check("b").unwrap().passed());
    }

    #[test]
    fn missing_ballot_fails_lookup() {
        let state = ElectionState::initialize(ElectionConfig::demo(), Utc::now()).unwrap();
        let missing = tagged_hash(DOMAIN_BALLOT, &[b"never cast"]);

        let lookup = lookup_ballot(missing, &state.ledger, &state.bb, &state.public_keys());
        assert!(!lookup.found);
        assert!(!lookup.is_ok());
        assert_eq!(lookup.checks.len(), 1);
        assert_eq!(lookup.checks[0].name, "ballot_on_bulletin_board");
        assert_eq!(lookup.checks[0].status, CheckStatus::Fail);

        let json = serde_json::to_value(&lookup).unwrap();
        assert_eq!(json["checks"][0]["status"], "fail");
    }
}
