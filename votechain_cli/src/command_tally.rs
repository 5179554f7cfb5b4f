use votechain::{FileStore, Gateway};

pub fn command_tally(gateway: &mut Gateway<FileStore>) {
    let tally = match gateway.publish_tally() {
        Ok(tally) => tally,
        Err(e) => crate::fail("tally", e),
    };

    let state = gateway.state();
    let verification = votechain::verify_tally(&tally, &state.ledger, &state.bb, &state.public_keys());
    if !verification.is_ok() {
        log::error!("published tally failed its own verification");
    }

    crate::print_json(&tally);
}
