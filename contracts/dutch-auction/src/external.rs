use commons::{ContractResult, ContractTokenAmount, CustomContractError, Token};
use concordium_std::*;

use crate::state::Round;

/// Parameters of one auction round, supplied to `startAuction`.
#[derive(Debug, Clone, Serialize, SchemaType, PartialEq, Eq)]
pub struct AuctionConfig {
    /// CIS-2 token being sold.
    pub asset: Token,
    /// Time over which the price falls to the reserve. Also the initial bidding period.
    pub duration: Duration,
    /// Quantity of `asset` distributed at settlement.
    pub total_quantity: ContractTokenAmount,
    /// Price at the opening of the round.
    pub start_price: Amount,
    /// Price floor, and the smallest total of all bids for which the round can be settled.
    pub reserve_price: Amount,
    /// Informational only. The price always falls linearly over `duration`.
    pub decay_rate: Amount,
}

impl AuctionConfig {
    pub fn validate(&self) -> ContractResult<()> {
        ensure!(
            self.duration.millis() > 0,
            CustomContractError::InvalidAuctionParams
        );
        ensure!(
            self.total_quantity.0 > 0,
            CustomContractError::InvalidAuctionParams
        );
        ensure!(
            self.start_price >= self.reserve_price,
            CustomContractError::InvalidAuctionParams
        );
        Ok(())
    }
}

/// Lifecycle phase of the contract.
#[derive(Debug, Clone, Copy, Serialize, SchemaType, PartialEq, Eq)]
pub enum AuctionPhase {
    /// No round was ever started.
    Uninitialized,
    /// A round is open, or past its deadline but not ended yet.
    Active,
    /// The latest round has been settled.
    Ended,
}

/// Return value of the `view` function.
#[derive(Debug, Clone, Serialize, SchemaType, PartialEq, Eq)]
pub struct ViewState {
    /// Account that runs the auction and receives the proceeds.
    pub operator: AccountAddress,
    pub phase: AuctionPhase,
    /// Current or most recent round.
    pub round: Option<Round>,
    /// CCD held for bids of rounds that were replaced without being ended.
    pub unclaimed: Amount,
}

/// Return value of the `viewBid` function.
#[derive(Debug, Clone, Serialize, SchemaType, PartialEq, Eq)]
pub struct BidView {
    pub whitelisted: bool,
    /// Cumulative bid in the current round.
    pub bid: Amount,
    /// Highest cumulative bid committed or declared. Kept across rounds.
    pub ceiling: Amount,
    /// Bids left in rounds that were replaced without being ended.
    pub unclaimed: Amount,
}
