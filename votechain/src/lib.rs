//! VoteChain: a verifiable electronic-ballot protocol engine.
//!
//! Voters fetch a signed election manifest, obtain a single-use challenge, submit an
//! encrypted ballot with an eligibility proof, and receive a signed receipt anchored
//! on an append-only Merkle bulletin board and a signed event ledger. Anyone holding
//! the public keys can re-verify receipts, the board, the ledger and the tally.

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

mod aead;
mod audit;
mod ballot;
mod bulletin_board;
mod clock;
mod credential;
mod error;
mod fraud;
mod gateway;
mod hash;
mod keys;
mod ledger;
mod manifest;
mod serde_hex;
mod signed;
mod state;
mod tally;
mod verify;

pub use aead::*;
pub use audit::*;
pub use ballot::*;
pub use bulletin_board::*;
pub use clock::*;
pub use credential::*;
pub use error::*;
pub use fraud::*;
pub use gateway::*;
pub use hash::*;
pub use keys::*;
pub use ledger::*;
pub use manifest::*;
pub use serde_hex::*;
pub use signed::*;
pub use state::*;
pub use tally::*;
pub use verify::*;
