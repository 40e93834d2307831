//! Market data clients
//!
//! Only EOD Historical Data is supported: end-of-day option chains and
//! daily underlying bars over its REST API.

mod eod;

pub use eod::{available_expiries, eod_symbol, parse_chain_response, EodBar, EodClient};
