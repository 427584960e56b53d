use super::*;

/// The custom errors the auction contract can produce.
#[derive(Serialize, Debug, PartialEq, Eq, Reject, SchemaType)]
pub enum CustomContractError {
    /// Failed parsing the parameter (Error code: -1).
    #[from(ParseError)]
    ParseParams,
    /// Failed logging: Log is full (Error code: -2).
    LogFull,
    /// Failed logging: Log is malformed (Error code: -3).
    LogMalformed,
    /// Operator functions called by someone else, or bidding by the operator (Error code: -4).
    Unauthorized,
    /// Only account addresses can bid or receive refunds (Error code: -5).
    OnlyAccountAddress,
    /// No auction round has been started yet (Error code: -6).
    NotStarted,
    /// Previous round has not reached its end time (Error code: -7).
    AuctionInProgress,
    /// Round has already been ended (Error code: -8).
    AlreadyEnded,
    /// Raised if there is an attempt to finalize the auction before its expiry,
    /// or to use a post-settlement function before the round is ended
    /// (Error code: -9).
    AuctionStillActive,
    /// Bidding deadline has passed but the round is not ended yet (Error code: -10).
    BiddingClosed,
    /// Start parameters are inconsistent (Error code: -11).
    InvalidAuctionParams,
    /// Contract holds less of the auctioned token than the round distributes
    /// (Error code: -12).
    InsufficientAssetSupply,
    /// Sender is not on the whitelist (Error code: -13).
    NotWhitelisted,
    /// Bid without any attached amount (Error code: -14).
    InvalidBid,
    /// Bid is below the current auction price (Error code: -15).
    BidBelowCurrentPrice,
    /// Cumulative bid does not exceed the bidder's ceiling (Error code: -16).
    BidNotIncreasing,
    /// New ceiling does not exceed the current one (Error code: -17).
    CeilingNotIncreasing,
    /// Roster of the round is full (Error code: -18).
    TooManyBidders,
    /// Total of all bids is below the reserve price (Error code: -19).
    ReserveNotMet,
    /// Settlement would distribute more than the round quantity (Error code: -20).
    OverDistribution,
    /// Arithmetic overflow (Error code: -21).
    Overflow,
    /// Token contract rejected the transfer (Error code: -22).
    AssetTransferFailed,
    /// Token contract does not behave like a CIS-2 contract (Error code: -23).
    AssetLedgerIncompatible,
    /// Failed to invoke a CCD transfer (Error code: -24).
    CurrencyTransferFailed,
    /// Sender has no bid to refund (Error code: -25).
    NothingToRefund,
    /// Too many accounts in a single whitelist update (Error code: -26).
    BatchTooLarge,
}

/// Mapping the logging errors to CustomContractError.
impl From<LogError> for CustomContractError {
    fn from(le: LogError) -> Self {
        match le {
            LogError::Full => Self::LogFull,
            LogError::Malformed => Self::LogMalformed,
        }
    }
}

/// Mapping errors related to CCD transfers to CustomContractError.
impl From<TransferError> for CustomContractError {
    fn from(_te: TransferError) -> Self {
        Self::CurrencyTransferFailed
    }
}
