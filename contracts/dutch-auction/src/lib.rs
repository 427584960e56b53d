//! Descending price auction of a fixed supply of a CIS-2 token.
//!
//! Whitelisted accounts commit CCD at or above a price that falls linearly from the start price to the reserve price.
//! Late bids push the deadline out. Once the deadline has passed the owner ends the round, and the token supply is
//! split between the bidders in proportion to the CCD each of them committed.
#![cfg_attr(not(feature = "std"), no_std)]

mod asset;
mod contract;
mod events;
mod external;
mod price;
mod state;
