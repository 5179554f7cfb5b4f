use clap::ArgMatches;
use std::fs::File;
use votechain::{CastReceipt, FileStore, Gateway, Hash256};

pub fn command_verify_receipt(matches: &ArgMatches, gateway: &Gateway<FileStore>) {
    let filename = crate::expand(matches.value_of("INPUT").unwrap_or_default());

    let file = match File::open(&filename) {
        Ok(file) => file,
        Err(e) => crate::fail("verify-receipt", format!("unable to read {}: {}", filename, e)),
    };
    let receipt: CastReceipt = match serde_json::from_reader(file) {
        Ok(receipt) => receipt,
        Err(e) => crate::fail("verify-receipt", format!("unable to parse {}: {}", filename, e)),
    };

    let verification = gateway.verify_receipt(&receipt);
    crate::print_json(&verification);
    if !verification.verification.is_ok() {
        std::process::exit(2);
    }
}

pub fn command_lookup(matches: &ArgMatches, gateway: &Gateway<FileStore>) {
    let ballot_hash: Hash256 = match matches.value_of("BALLOT-HASH").unwrap_or_default().parse() {
        Ok(hash) => hash,
        Err(e) => crate::fail("lookup", e),
    };

    let lookup = gateway.lookup_ballot(ballot_hash);
    crate::print_json(&lookup);
    if !lookup.is_ok() {
        std::process::exit(2);
    }
}
