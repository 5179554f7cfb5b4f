use std::env::var;
use votechain::ElectionConfig;

pub struct Config {
    pub state_path: String,
    pub election: ElectionConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let state_path: String = match var("VOTECHAIN_STATE_PATH") {
            Ok(val) => crate::expand(&val),
            Err(_e) => "./votechain-state.json".to_owned(),
        };

        let mut election = ElectionConfig::demo();
        election.challenge_ttl_secs = seconds_from_env("VOTECHAIN_CHALLENGE_TTL_SECS", election.challenge_ttl_secs);
        election.closes_after_secs = seconds_from_env("VOTECHAIN_CLOSES_AFTER_SECS", election.closes_after_secs);

        Config {
            state_path,
            election,
        }
    }
}

// Only takes effect for new elections; a stored election keeps its manifest window
fn seconds_from_env(name: &str, default: i64) -> i64 {
    let val = match var(name) {
        Ok(val) => val,
        Err(_e) => return default,
    };
    match val.parse::<i64>() {
        Ok(secs) if secs > 0 => secs,
        _ => {
            log::warn!("ignoring {}={}, using {} seconds", name, val, default);
            default
        }
    }
}
