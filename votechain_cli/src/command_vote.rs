use clap::ArgMatches;
use serde::Serialize;
use votechain::{ChallengeRequest, ErrorResponse, FileStore, Gateway, PreparedBallot, Selection};

pub fn parse_selections(matches: &ArgMatches) -> Result<Vec<Selection>, String> {
    let values = match matches.values_of("select") {
        Some(values) => values,
        None => return Err("at least one --select CONTEST=OPTION is required".to_string()),
    };

    values
        .map(|value| match value.split_once('=') {
            Some((contest, option)) if !contest.is_empty() && !option.is_empty() => {
                Ok(Selection::new(contest.trim(), option.trim()))
            }
            _ => Err(format!("invalid selection '{}', expected CONTEST=OPTION", value)),
        })
        .collect()
}

fn prepare(context: &str, matches: &ArgMatches, gateway: &Gateway<FileStore>) -> PreparedBallot {
    let selections = match parse_selections(matches) {
        Ok(selections) => selections,
        Err(e) => crate::fail(context, e),
    };
    match gateway.encrypt_ballot(selections) {
        Ok(prepared) => prepared,
        Err(e) => crate::fail(context, e),
    }
}

pub fn command_vote(matches: &ArgMatches, gateway: &mut Gateway<FileStore>) {
    let prepared = prepare("vote", matches, gateway);

    let challenge_request = ChallengeRequest {
        client_session: uuid::Uuid::new_v4().to_string(),
    };
    let challenge = match gateway.issue_challenge(&challenge_request) {
        Ok(challenge) => challenge,
        Err(e) => crate::fail("vote", e),
    };

    let request = match gateway.build_cast_request(prepared.encrypted_ballot, &challenge) {
        Ok(request) => request,
        Err(e) => crate::fail("vote", e),
    };

    let idempotency_key = match matches.value_of("idempotency-key") {
        Some(key) => key.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };

    let response = match gateway.cast(&request, &idempotency_key) {
        Ok(response) => response,
        Err(e) => match e.rejection() {
            Some(rejection) => {
                crate::print_json(&ErrorResponse {
                    error: rejection.clone(),
                });
                std::process::exit(2);
            }
            None => crate::fail("vote", &e),
        },
    };

    if let (Some(path), Some(receipt)) = (matches.value_of("receipt"), response.receipt()) {
        let path = crate::expand(path);
        let json = match serde_json::to_string_pretty(receipt) {
            Ok(json) => json,
            Err(e) => crate::fail("vote", e),
        };
        if let Err(e) = std::fs::write(&path, json) {
            crate::fail("vote", format!("unable to write receipt to {}: {}", path, e));
        }
        log::info!("receipt written to {}", path);
    }

    crate::print_json(&response);
}

#[derive(Serialize)]
struct SpoilOutput {
    #[serde(flatten)]
    response: votechain::SpoilResponse,
    verification: votechain::SpoilVerification,
}

pub fn command_spoil(matches: &ArgMatches, gateway: &mut Gateway<FileStore>) {
    let prepared = prepare("spoil", matches, gateway);

    let response = match gateway.spoil(&prepared) {
        Ok(response) => response,
        Err(e) => crate::fail("spoil", e),
    };

    let verification = votechain::verify_spoil(&prepared.encrypted_ballot, &response.randomness_reveal);
    let matched = verification.matches;
    crate::print_json(&SpoilOutput {
        response,
        verification,
    });
    if !matched {
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{App, Arg};

    fn matches_for(args: &[&str]) -> ArgMatches<'static> {
        App::new("test")
            .arg(
                Arg::with_name("select")
                    .long("select")
                    .takes_value(true)
                    .multiple(true)
                    .number_of_values(1),
            )
            .get_matches_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_selections() {
        let matches = matches_for(&["test", "--select", "us-senate-ny-2026=chen-r", "--select", "prop-12=yes"]);
        let selections = parse_selections(&matches).unwrap();
        assert_eq!(
            selections,
            vec![Selection::new("us-senate-ny-2026", "chen-r"), Selection::new("prop-12", "yes")]
        );

        let matches = matches_for(&["test", "--select", "no-option"]);
        assert!(parse_selections(&matches).is_err());

        let matches = matches_for(&["test"]);
        assert!(parse_selections(&matches).is_err());
    }
}
