use clap::ArgMatches;
use votechain::{FileStore, FraudAction, FraudReview, Gateway, Hash256};

pub fn command_fraud(matches: &ArgMatches, gateway: &mut Gateway<FileStore>) {
    match matches.subcommand() {
        ("list", Some(_)) => crate::print_json(&gateway.fraud_cases()),
        ("review", Some(matches)) => command_fraud_review(matches, gateway),
        _ => unreachable!("clap requires a fraud subcommand"),
    }
}

fn command_fraud_review(matches: &ArgMatches, gateway: &mut Gateway<FileStore>) {
    let case_id: Hash256 = match matches.value_of("CASE-ID").unwrap_or_default().parse() {
        Ok(case_id) => case_id,
        Err(e) => crate::fail("fraud review", e),
    };
    let action: FraudAction = match matches.value_of("ACTION").unwrap_or_default().parse() {
        Ok(action) => action,
        Err(e) => crate::fail("fraud review", e),
    };

    let review = FraudReview {
        case_id,
        reviewer_id: matches.value_of("reviewer").unwrap_or_default().to_string(),
        action,
        reason_code: matches.value_of("reason").map(str::to_string),
        note: matches.value_of("note").map(str::to_string),
    };

    match gateway.review_fraud_case(review) {
        Ok(case) => crate::print_json(&case),
        Err(e) => crate::fail("fraud review", e),
    }
}
