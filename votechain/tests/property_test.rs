//! Property-based tests using proptest.
//!
//! These check properties of the bulletin board, canonical hashing and ballot
//! encryption for arbitrary inputs.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::json;

use votechain::{
    canonical_hash, canonical_json, compute_ballot_hash, encrypt_ballot, merkle_inclusion_proof,
    merkle_root, tagged_hash, validate_selections, verify_spoil, BulletinBoard, ElectionConfig,
    ElectionKey, ElectionManifest, Error, Hash256, KeyRole, Keypair, LeafPayload, ManifestBody,
    RandomnessReveal, Selection, Side, DOMAIN_BB_LEAF, DOMAIN_ELECTION_KEY, DOMAIN_TALLY,
};

// ============================================================================
// Custom Strategies
// ============================================================================

fn arb_leaves(max: usize) -> impl Strategy<Value = Vec<Hash256>> {
    prop::collection::vec(any::<[u8; 32]>(), 1..max)
        .prop_map(|raw| raw.iter().map(|bytes| tagged_hash(DOMAIN_BB_LEAF, &[&bytes[..]])).collect())
}

/// Selections for the demo election: an optional choice per contest
fn arb_selections() -> impl Strategy<Value = Vec<Selection>> {
    (0usize..4, 0usize..3).prop_map(|(senate, prop)| {
        let mut selections = Vec::new();
        if let Some(choice) = ["gutierrez-d", "chen-r", "okafor-i"].get(senate) {
            selections.push(Selection::new("us-senate-ny-2026", choice));
        }
        if let Some(choice) = ["yes", "no"].get(prop) {
            selections.push(Selection::new("prop-12-infrastructure", choice));
        }
        selections
    })
}

fn demo_manifest() -> (ElectionManifest, ElectionKey) {
    let election_key = ElectionKey::generate();
    let keypair = Keypair::generate(KeyRole::Manifest.default_kid());
    let body = ManifestBody::new(&ElectionConfig::demo(), &election_key, Utc::now());
    (ElectionManifest::sign(&keypair, body).unwrap(), election_key)
}

fn reveal_for(prepared: &votechain::PreparedBallot) -> RandomnessReveal {
    RandomnessReveal {
        ballot_id: prepared.plaintext.ballot_id.clone(),
        iv: prepared.iv.clone(),
        ballot_key: prepared.ballot_key.clone(),
        plaintext: prepared.plaintext.clone(),
    }
}

/// Apply one edit to a signed manifest field
fn edit_manifest(body: &mut ManifestBody, field: usize, tag: &str, secs: i64) {
    match field {
        0 => body.election_id.push_str(tag),
        1 => body.jurisdiction_id.push_str(tag),
        2 => body.not_before = body.not_before - Duration::seconds(secs),
        3 => body.not_after = body.not_after + Duration::seconds(secs),
        4 => body.crypto.suite.push_str(tag),
        5 => body.crypto.election_params.key_commitment = tagged_hash(DOMAIN_ELECTION_KEY, &[tag.as_bytes()]),
        6 => body.crypto.election_params.tally_scheme.push_str(tag),
        7 => body.contests[0].title.push_str(tag),
        8 => body.contests[1].options[0].label.push_str(tag),
        9 => {
            body.contests[0].options.pop();
        }
        10 => body.endpoints.cast.push_str(tag),
        _ => body.endpoints.bb.push_str(tag),
    }
}

// ============================================================================
// Merkle Properties
// ============================================================================

proptest! {
    #[test]
    fn every_inclusion_proof_verifies(leaves in arb_leaves(64)) {
        let root = merkle_root(&leaves);
        for index in 0..leaves.len() {
            let proof = merkle_inclusion_proof(&leaves, index).unwrap();
            prop_assert_eq!(proof.root_hash, root);
            prop_assert!(proof.verify());
        }
    }

    #[test]
    fn flipped_side_breaks_proof(leaves in arb_leaves(64), pick in any::<prop::sample::Index>()) {
        prop_assume!(leaves.len() > 1);
        let index = pick.index(leaves.len());
        let mut proof = merkle_inclusion_proof(&leaves, index).unwrap();
        let step = &mut proof.path[0];
        prop_assume!(step.hash != proof.leaf_hash);
        step.side = match step.side {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        };
        prop_assert!(!proof.verify());
    }

    #[test]
    fn old_tree_heads_stay_provable(leaves in arb_leaves(32), pick in any::<prop::sample::Index>()) {
        let cut = pick.index(leaves.len()) + 1;
        let old_root = merkle_root(&leaves[..cut]);
        for index in 0..cut {
            let proof = merkle_inclusion_proof(&leaves[..cut], index).unwrap();
            prop_assert_eq!(proof.root_hash, old_root);
            prop_assert!(proof.verify());
        }
    }
}

// ============================================================================
// Canonical JSON Properties
// ============================================================================

proptest! {
    #[test]
    fn canonical_hash_ignores_key_order(a in any::<i32>(), b in ".*", c in any::<bool>()) {
        let forward = json!({ "a": a, "b": b, "c": { "x": c, "y": [1, 2, 3] } });
        let reversed = json!({ "c": { "y": [1, 2, 3], "x": c }, "b": b, "a": a });
        prop_assert_eq!(canonical_json(&forward).unwrap(), canonical_json(&reversed).unwrap());
        prop_assert_eq!(
            canonical_hash(DOMAIN_TALLY, &forward).unwrap(),
            canonical_hash(DOMAIN_TALLY, &reversed).unwrap()
        );
    }
}

// ============================================================================
// Ballot Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn valid_selections_encrypt_and_spoil(selections in arb_selections()) {
        let (manifest, election_key) = demo_manifest();
        prop_assert!(validate_selections(&manifest, &selections));

        let prepared = encrypt_ballot(&manifest, &election_key, selections, Utc::now()).unwrap();
        let ballot = &prepared.encrypted_ballot;
        prop_assert_eq!(ballot.ballot_hash, compute_ballot_hash(&ballot.ciphertext));

        prop_assert!(verify_spoil(ballot, &reveal_for(&prepared)).matches);
    }

    #[test]
    fn altered_ballot_key_breaks_spoil_check(
        selections in arb_selections(),
        pick in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let (manifest, election_key) = demo_manifest();
        let prepared = encrypt_ballot(&manifest, &election_key, selections, Utc::now()).unwrap();

        let mut reveal = reveal_for(&prepared);
        let index = pick.index(reveal.ballot_key.len());
        reveal.ballot_key[index] ^= mask;

        let check = verify_spoil(&prepared.encrypted_ballot, &reveal);
        prop_assert!(!check.matches);
        prop_assert!(check.details.starts_with("MISMATCH"));
    }

    #[test]
    fn leaf_hash_changes_with_any_ballot(selections in arb_selections()) {
        let (manifest, election_key) = demo_manifest();
        let mut bb = BulletinBoard::new();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let prepared = encrypt_ballot(&manifest, &election_key, selections.clone(), Utc::now()).unwrap();
            let (_, leaf_hash) = bb.append_leaf(LeafPayload {
                ewp_version: votechain::EWP_VERSION.to_string(),
                election_id: manifest.election_id.clone(),
                manifest_id: manifest.manifest_id,
                encrypted_ballot: prepared.encrypted_ballot,
                received_at: Utc::now(),
                gateway_id: "ewg_poc_1".to_string(),
            }).unwrap();
            prop_assert!(!seen.contains(&leaf_hash));
            seen.push(leaf_hash);
        }
        prop_assert_eq!(bb.root(), merkle_root(&seen));
    }
}

// ============================================================================
// Manifest Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_manifest_edit_is_detected(field in 0usize..12, tag in "[a-z0-9]{1,8}", secs in 1i64..1_000_000) {
        let keypair = Keypair::generate(KeyRole::Manifest.default_kid());
        let body = ManifestBody::new(&ElectionConfig::demo(), &ElectionKey::generate(), Utc::now());
        let manifest = ElectionManifest::sign(&keypair, body).unwrap();
        prop_assert!(manifest.verify(&keypair.public()).is_ok());

        let mut edited = manifest.clone();
        edit_manifest(&mut edited.body, field, &tag, secs);

        let recomputed = edited.body.manifest_id().unwrap();
        prop_assert_ne!(recomputed, manifest.manifest_id);
        prop_assert!(matches!(edited.verify(&keypair.public()), Err(Error::ManifestIdMismatch)));

        // A matching id does not help without the manifest key
        edited.manifest_id = recomputed;
        prop_assert!(matches!(edited.verify(&keypair.public()), Err(Error::SignatureError(_))));
    }
}
