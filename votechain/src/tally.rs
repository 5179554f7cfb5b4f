use crate::*;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Per-contest, per-option vote counts
pub type Totals = IndexMap<String, IndexMap<String, u64>>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TallyBody {
    pub election_id: String,
    pub manifest_id: Hash256,
    pub bb_close_root_hash: Hash256,
    pub computed_at: DateTime<Utc>,
    pub totals: Totals,
    pub ballot_count: u64,
    pub kid: String,
}

impl Signable for TallyBody {
    fn kid(&self) -> &str {
        &self.kid
    }
}

pub type Tally = Signed<TallyBody>;

/// Hash under which a tally is anchored on the ledger
pub fn tally_hash(tally: &Tally) -> Result<Hash256, Error> {
    canonical_hash(DOMAIN_TALLY, tally)
}

fn zero_totals(manifest: &ManifestBody) -> Totals {
    manifest
        .contests
        .iter()
        .map(|contest| {
            let options: IndexMap<String, u64> =
                contest.options.iter().map(|option| (option.id.clone(), 0)).collect();
            (contest.contest_id.clone(), options)
        })
        .collect()
}

/// Decrypt and count every ballot covered by the latest signed tree head
///
/// Ballots that fail to decrypt or carry invalid selections are skipped.
pub fn compute_tally(
    manifest: &ElectionManifest,
    bb: &BulletinBoard,
    decryptor: &dyn TallyDecryptor,
    gateway_key: &Keypair,
    now: DateTime<Utc>,
) -> Result<Tally, Error> {
    let sth = bb.latest_sth().ok_or(Error::NoTreeHead)?;
    let mut totals = zero_totals(manifest);
    let mut ballot_count = 0;

    for leaf in bb.leaves().iter().take(sth.tree_size as usize) {
        let ballot = &leaf.payload.encrypted_ballot;
        let plaintext = match decryptor.decrypt(&manifest.election_id, ballot) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!("tally: skipping ballot {}: {}", ballot.ballot_hash, e);
                continue;
            }
        };
        if !validate_plaintext(manifest, &plaintext) {
            warn!("tally: skipping ballot {}: invalid selections", ballot.ballot_hash);
            continue;
        }

        for selection in &plaintext.contests {
            if let Some(count) = totals
                .get_mut(&selection.contest_id)
                .and_then(|options| options.get_mut(&selection.selection))
            {
                *count += 1;
            }
        }
        ballot_count += 1;
    }

    let body = TallyBody {
        election_id: manifest.election_id.clone(),
        manifest_id: manifest.manifest_id,
        bb_close_root_hash: sth.root_hash,
        computed_at: now,
        totals,
        ballot_count,
        kid: gateway_key.kid.clone(),
    };
    Signed::sign(gateway_key, body)
}

/// Compute a tally, record it in state and anchor it on the ledger
pub fn publish_tally(
    state: &mut ElectionState,
    decryptor: &dyn TallyDecryptor,
    now: DateTime<Utc>,
) -> Result<Tally, Error> {
    if now <= state.manifest.not_after {
        return Err(Error::ElectionNotClosed(state.manifest.not_after));
    }
    let tally = compute_tally(&state.manifest, &state.bb, decryptor, &state.keys.gateway, now)?;
    let anchor = TallyPublished {
        election_id: tally.election_id.clone(),
        manifest_id: tally.manifest_id,
        bb_close_root_hash: tally.bb_close_root_hash,
        tally_hash: tally_hash(&tally)?,
    };
    state
        .ledger
        .append(&state.keys.ledger, EventBody::TallyPublished(anchor), now)?;

    info!(
        "tally: published {} ballots over root {}",
        tally.ballot_count, tally.bb_close_root_hash
    );
    state.tally = Some(tally.clone());
    Ok(tally)
}

/// Re-check a published tally: its signature, its ledger anchor and its close root
pub fn verify_tally(tally: &Tally, ledger: &Ledger, bb: &BulletinBoard, keys: &PublicKeys) -> Verification {
    let mut checks = Vec::new();

    checks.push(Check::from_result(
        "tally_signature",
        tally.verify_signature(&keys.gateway),
        "Tally signed by the gateway key",
    ));

    let anchor = match tally_hash(tally) {
        Ok(hash) => ledger.events().iter().find(|event| match &event.body {
            EventBody::TallyPublished(published) => published.tally_hash == hash,
            _ => false,
        }),
        Err(_) => None,
    };
    checks.push(match anchor {
        Some(event) => Check::pass("tally_anchor", format!("Anchored by ledger event {}", event.tx_id)),
        None => Check::fail("tally_anchor", "No tally_published event carries this tally hash"),
    });

    let closing_sth = bb
        .sth_history()
        .iter()
        .find(|sth| sth.root_hash == tally.bb_close_root_hash);
    checks.push(match closing_sth {
        Some(sth) => Check::pass(
            "bb_close_root",
            format!("Close root matches signed tree head of size {}", sth.tree_size),
        ),
        None => Check::fail("bb_close_root", "Close root does not match any signed tree head"),
    });

    Verification::new(checks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn tally_waits_for_close() {
        let now = Utc::now();
        let mut state = ElectionState::initialize(ElectionConfig::demo(), now).unwrap();
        state.bb.issue_sth(&state.keys.bulletin_board, now).unwrap();
        let decryptor = SymmetricTallyDecryptor::new(state.election_key.clone());

        let not_after = state.manifest.not_after;
        assert!(matches!(
            publish_tally(&mut state, &decryptor, now),
            Err(Error::ElectionNotClosed(at)) if at == not_after
        ));
        assert!(matches!(
            publish_tally(&mut state, &decryptor, not_after),
            Err(Error::ElectionNotClosed(_))
        ));
        assert!(state.tally.is_none());
        assert_eq!(state.ledger.events_of(EventType::TallyPublished).count(), 0);

        publish_tally(&mut state, &decryptor, not_after + Duration::seconds(1)).unwrap();
        assert!(state.tally.is_some());
    }

    #[test]
    fn tally_requires_tree_head() {
        let now = Utc::now();
        let mut state = ElectionState::initialize(ElectionConfig::demo(), now).unwrap();
        let decryptor = SymmetricTallyDecryptor::new(state.election_key.clone());
        let closed = now + Duration::days(8);
        assert!(matches!(publish_tally(&mut state, &decryptor, closed), Err(Error::NoTreeHead)));
    }

    #[test]
    fn zero_totals_cover_every_option() {
        let now = Utc::now();
        let mut state = ElectionState::initialize(ElectionConfig::demo(), now).unwrap();
        let gateway = state.keys.gateway.clone();
        state.bb.issue_sth(&state.keys.bulletin_board, now).unwrap();

        let decryptor = SymmetricTallyDecryptor::new(state.election_key.clone());
        let tally = publish_tally(&mut state, &decryptor, now + Duration::days(8)).unwrap();

        assert_eq!(tally.ballot_count, 0);
        assert_eq!(tally.totals["us-senate-ny-2026"]["okafor-i"], 0);
        assert_eq!(tally.totals["prop-12-infrastructure"].len(), 2);
        assert_eq!(tally.kid, gateway.kid);

        let keys = state.keys.public_keys();
        assert!(verify_tally(&tally, &state.ledger, &state.bb, &keys).is_ok());

        let mut inflated = tally;
        inflated.body.ballot_count = 1000;
        let verification = verify_tally(&inflated, &state.ledger, &state.bb, &keys);
        assert!(!verification.is_ok());
    }
}
