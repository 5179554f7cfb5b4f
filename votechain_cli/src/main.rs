use clap::{App, AppSettings, Arg, SubCommand};
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use num_enum::TryFromPrimitive;
use votechain::{FileStore, Gateway};

mod command_audit;
mod command_election;
mod command_fraud;
mod command_tally;
mod command_verify;
mod command_vote;
mod config;

use command_audit::*;
use command_election::*;
use command_fraud::*;
use command_tally::*;
use command_verify::*;
use command_vote::*;
use config::Config;

#[derive(TryFromPrimitive, PartialEq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Verbosity {
    Warn = 0,
    Info = 1,
    Debug = 2,
    Trace = 3,
}

impl Verbosity {
    fn level(self) -> LevelFilter {
        match self {
            Verbosity::Warn => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
            Verbosity::Trace => LevelFilter::Trace,
        }
    }
}

fn selection_arg() -> Arg<'static, 'static> {
    Arg::with_name("select")
        .long("select")
        .short("s")
        .takes_value(true)
        .multiple(true)
        .number_of_values(1)
        .value_name("CONTEST=OPTION")
        .help("A selection, for example us-senate-ny-2026=chen-r. Repeat for each contest.")
}

fn main() {
    let matches = App::new("VoteChain CLI")
        .version("0.1")
        .about("Runs a verifiable e-ballot election from the command line")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("state")
                .long("state")
                .takes_value(true)
                .help("Path to the election state file - can also be set with VOTECHAIN_STATE_PATH"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(SubCommand::with_name("init").about("Create the election if it does not exist"))
        .subcommand(SubCommand::with_name("reset").about("Discard the election and start over with fresh keys"))
        .subcommand(SubCommand::with_name("status").about("Show election and voter status"))
        .subcommand(SubCommand::with_name("manifest").about("Print the signed election manifest"))
        .subcommand(SubCommand::with_name("keys").about("Print the published verification keys"))
        .subcommand(
            SubCommand::with_name("vote")
                .about("Encrypt and cast a ballot with the enrolled credential")
                .arg(selection_arg())
                .arg(
                    Arg::with_name("idempotency-key")
                        .long("idempotency-key")
                        .takes_value(true)
                        .help("Reuse to safely retry a cast; defaults to a random key"),
                )
                .arg(
                    Arg::with_name("receipt")
                        .long("receipt")
                        .takes_value(true)
                        .help("Also write the cast receipt to this file"),
                ),
        )
        .subcommand(
            SubCommand::with_name("spoil")
                .about("Encrypt a ballot, then spoil it and check the device encrypted honestly")
                .arg(selection_arg()),
        )
        .subcommand(
            SubCommand::with_name("verify-receipt")
                .about("Verify a cast receipt against the ledger and bulletin board")
                .arg(
                    Arg::with_name("INPUT")
                        .index(1)
                        .required(true)
                        .help("Receipt file in JSON format"),
                ),
        )
        .subcommand(
            SubCommand::with_name("lookup")
                .about("Look up a ballot on the bulletin board by its hash")
                .arg(Arg::with_name("BALLOT-HASH").index(1).required(true)),
        )
        .subcommand(SubCommand::with_name("tally").about("Decrypt, count and publish the tally"))
        .subcommand(
            SubCommand::with_name("fraud")
                .about("Review fraud cases")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(SubCommand::with_name("list").about("List fraud cases, most recently updated first"))
                .subcommand(
                    SubCommand::with_name("review")
                        .about("Act on a fraud case")
                        .arg(Arg::with_name("CASE-ID").index(1).required(true))
                        .arg(
                            Arg::with_name("ACTION")
                                .index(2)
                                .required(true)
                                .possible_values(&[
                                    "take_case",
                                    "start_investigation",
                                    "escalate",
                                    "resolve_cleared",
                                    "resolve_confirmed_fraud",
                                    "resolve_system_error",
                                    "note",
                                ]),
                        )
                        .arg(
                            Arg::with_name("reviewer")
                                .long("reviewer")
                                .takes_value(true)
                                .required(true),
                        )
                        .arg(Arg::with_name("note").long("note").takes_value(true))
                        .arg(Arg::with_name("reason").long("reason").takes_value(true)),
                ),
        )
        .subcommand(SubCommand::with_name("audit").about("Re-verify everything the election has published"))
        .get_matches();

    let occurrences = matches.occurrences_of("v").min(3) as u8;
    let verbosity = Verbosity::try_from_primitive(occurrences).unwrap_or(Verbosity::Trace);
    init_logging(verbosity);

    let mut config = Config::from_env();
    if let Some(path) = matches.value_of("state") {
        config.state_path = expand(path);
    }
    log::debug!("using state file {}", config.state_path);

    let mut gateway = match Gateway::open(FileStore::new(&config.state_path), config.election.clone()) {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("votechain: unable to open election state {}: {}", config.state_path, e);
            std::process::exit(1);
        }
    };

    // Subcommands
    match matches.subcommand() {
        ("init", Some(_)) => command_init(&gateway),
        ("reset", Some(_)) => command_reset(&mut gateway),
        ("status", Some(_)) => command_status(&mut gateway),
        ("manifest", Some(_)) => print_json(gateway.manifest()),
        ("keys", Some(_)) => print_json(&gateway.public_keys()),
        ("vote", Some(matches)) => command_vote(matches, &mut gateway),
        ("spoil", Some(matches)) => command_spoil(matches, &mut gateway),
        ("verify-receipt", Some(matches)) => command_verify_receipt(matches, &gateway),
        ("lookup", Some(matches)) => command_lookup(matches, &gateway),
        ("tally", Some(_)) => command_tally(&mut gateway),
        ("fraud", Some(matches)) => command_fraud(matches, &mut gateway),
        ("audit", Some(_)) => command_audit(&gateway),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn init_logging(verbosity: Verbosity) {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {h({l})} {t} - {m}{n}")))
        .build();

    let config = log4rs::config::Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(verbosity.level()));

    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("votechain: unable to initialise logging: {}", e);
            }
        }
        Err(e) => eprintln!("votechain: invalid logging configuration: {}", e),
    }
}

pub fn expand(path: &str) -> String {
    shellexpand::full(path)
        .map(|expanded| expanded.into_owned())
        .unwrap_or_else(|_| path.to_owned())
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("votechain: unable to encode output: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print an error and exit
pub fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("votechain {}: {}", context, err);
    std::process::exit(1);
}
