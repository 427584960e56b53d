//! It exposes the errors, event tags, token types and the whitelist shared by the auction contracts.
#![cfg_attr(not(feature = "std"), no_std)]
pub use crate::{constants::*, errors::*, structs::*, types::*, whitelist::*};
use concordium_cis2::*;
use concordium_std::*;

pub mod test;

mod constants;
mod errors;
mod structs;
mod types;
mod whitelist;
