/// Tag for the auction Start event.
pub const START_TAG: u8 = u8::MAX - 5;

/// Tag for the Custom Biding event.
pub const BIDING_TAG: u8 = u8::MAX - 6;

/// Tag for the bid Ceiling event.
pub const CEILING_TAG: u8 = u8::MAX - 7;

/// Tag for the Whitelist update event.
pub const WHITELIST_TAG: u8 = u8::MAX - 8;

/// Tag for the per bidder Settle event.
pub const SETTLE_TAG: u8 = u8::MAX - 9;

/// Tag for the auction End event.
pub const END_TAG: u8 = u8::MAX - 10;

/// Tag for the Withdraw event of remaining tokens.
pub const WITHDRAW_TAG: u8 = u8::MAX - 11;

/// Tag for the Refund event.
pub const REFUND_TAG: u8 = u8::MAX - 12;
