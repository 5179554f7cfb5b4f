use serde::Serialize;
use votechain::{FileStore, Gateway};

pub fn command_init(gateway: &Gateway<FileStore>) {
    let manifest = gateway.manifest();
    println!(
        "Election {} ready, manifest {}",
        manifest.election_id, manifest.manifest_id
    );
}

pub fn command_reset(gateway: &mut Gateway<FileStore>) {
    if let Err(e) = gateway.reset() {
        crate::fail("reset", e);
    }
    println!("Election reset, new manifest {}", gateway.manifest().manifest_id);
}

#[derive(Serialize)]
struct Status<'a> {
    election_id: &'a str,
    jurisdiction_id: &'a str,
    manifest_id: String,
    open: bool,
    voter_did: String,
    has_voted: bool,
    ballots_on_board: usize,
    ledger_events: usize,
    spoiled_ballots: usize,
    open_fraud_cases: usize,
    tally_published: bool,
}

pub fn command_status(gateway: &mut Gateway<FileStore>) {
    let credential = match gateway.ensure_credential() {
        Ok(credential) => credential,
        Err(e) => crate::fail("status", e),
    };

    let state = gateway.state();
    let open_fraud_cases = gateway
        .fraud_cases()
        .iter()
        .filter(|case| !case.status.is_resolved())
        .count();

    let status = Status {
        election_id: &state.manifest.election_id,
        jurisdiction_id: &state.manifest.jurisdiction_id,
        manifest_id: state.manifest.manifest_id.to_hex(),
        open: state.manifest.is_open_at(gateway.now()),
        voter_did: credential.did.clone(),
        has_voted: gateway.has_already_voted(&credential),
        ballots_on_board: state.bb.len(),
        ledger_events: state.ledger.len(),
        spoiled_ballots: state.spoiled_ballots.len(),
        open_fraud_cases,
        tally_published: state.tally.is_some(),
    };
    crate::print_json(&status);
}
