use crate::external::AuctionConfig;
use commons::{
    ContractTokenAmount, Token, WhitelistUpdateKind, BIDING_TAG, CEILING_TAG, END_TAG,
    REFUND_TAG, SETTLE_TAG, START_TAG, WHITELIST_TAG, WITHDRAW_TAG,
};
use concordium_std::*;

/// Round start event data.
#[derive(Debug, Serial)]
pub struct StartEvent<'a> {
    /// Round identifier.
    pub round: u64,
    /// Asset, quantity and prices of the round.
    pub config: &'a AuctionConfig,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Bid event data.
#[derive(Debug, Serial)]
pub struct BidEvent<'a> {
    pub round: u64,
    /// Bidder account address.
    pub bidder: &'a AccountAddress,
    /// Amount attached to this bid.
    pub amount: Amount,
    /// Cumulative bid after this bid.
    pub cumulative: Amount,
    /// Deadline after a possible extension.
    pub end: Timestamp,
}

/// Bid ceiling event data.
#[derive(Debug, Serial)]
pub struct CeilingEvent<'a> {
    pub round: u64,
    pub account: &'a AccountAddress,
    pub ceiling: Amount,
}

/// Whitelist update event data.
#[derive(Debug, Serial)]
pub struct WhitelistEvent<'a> {
    pub kind: WhitelistUpdateKind,
    pub account: &'a AccountAddress,
}

/// Per bidder settlement event data.
#[derive(Debug, Serial)]
pub struct SettleEvent<'a> {
    pub round: u64,
    pub bidder: &'a AccountAddress,
    /// Cumulative bid of the bidder.
    pub bid: Amount,
    /// Quantity of the asset transferred to the bidder.
    pub share: ContractTokenAmount,
}

/// Round end event data.
#[derive(Debug, Serial)]
pub struct EndEvent {
    pub round: u64,
    /// Sum of all cumulative bids.
    pub total_bid: Amount,
    /// Quantity of the asset distributed to bidders.
    pub distributed: ContractTokenAmount,
    /// CCD transferred to the operator.
    pub proceeds: Amount,
}

/// Withdrawal of the undistributed asset.
#[derive(Debug, Serial)]
pub struct WithdrawEvent<'a> {
    pub round: u64,
    pub asset: &'a Token,
    pub amount: ContractTokenAmount,
    pub operator: &'a AccountAddress,
}

/// Refund event data.
#[derive(Debug, Serial)]
pub struct RefundEvent<'a> {
    pub round: u64,
    pub account: &'a AccountAddress,
    pub amount: Amount,
}

/// Tagged Custom event to be serialized for the event log.
#[derive(Debug)]
pub enum AuctionEvents<'a> {
    Start(StartEvent<'a>),
    Bid(BidEvent<'a>),
    Ceiling(CeilingEvent<'a>),
    Whitelist(WhitelistEvent<'a>),
    Settle(SettleEvent<'a>),
    End(EndEvent),
    Withdraw(WithdrawEvent<'a>),
    Refund(RefundEvent<'a>),
}

impl<'a> AuctionEvents<'a> {
    pub fn start(round: u64, config: &'a AuctionConfig, start: Timestamp, end: Timestamp) -> Self {
        Self::Start(StartEvent {
            round,
            config,
            start,
            end,
        })
    }

    pub fn bid(
        round: u64,
        bidder: &'a AccountAddress,
        amount: Amount,
        cumulative: Amount,
        end: Timestamp,
    ) -> Self {
        Self::Bid(BidEvent {
            round,
            bidder,
            amount,
            cumulative,
            end,
        })
    }

    pub fn ceiling(round: u64, account: &'a AccountAddress, ceiling: Amount) -> Self {
        Self::Ceiling(CeilingEvent {
            round,
            account,
            ceiling,
        })
    }

    pub fn whitelist(kind: WhitelistUpdateKind, account: &'a AccountAddress) -> Self {
        Self::Whitelist(WhitelistEvent { kind, account })
    }

    pub fn settle(
        round: u64,
        bidder: &'a AccountAddress,
        bid: Amount,
        share: ContractTokenAmount,
    ) -> Self {
        Self::Settle(SettleEvent {
            round,
            bidder,
            bid,
            share,
        })
    }

    pub fn end(
        round: u64,
        total_bid: Amount,
        distributed: ContractTokenAmount,
        proceeds: Amount,
    ) -> Self {
        Self::End(EndEvent {
            round,
            total_bid,
            distributed,
            proceeds,
        })
    }

    pub fn withdraw(
        round: u64,
        asset: &'a Token,
        amount: ContractTokenAmount,
        operator: &'a AccountAddress,
    ) -> Self {
        Self::Withdraw(WithdrawEvent {
            round,
            asset,
            amount,
            operator,
        })
    }

    pub fn refund(round: u64, account: &'a AccountAddress, amount: Amount) -> Self {
        Self::Refund(RefundEvent {
            round,
            account,
            amount,
        })
    }
}

impl<'a> Serial for AuctionEvents<'a> {
    fn serial<W: Write>(&self, out: &mut W) -> Result<(), W::Err> {
        match self {
            AuctionEvents::Start(event) => {
                out.write_u8(START_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Bid(event) => {
                out.write_u8(BIDING_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Ceiling(event) => {
                out.write_u8(CEILING_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Whitelist(event) => {
                out.write_u8(WHITELIST_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Settle(event) => {
                out.write_u8(SETTLE_TAG)?;
                event.serial(out)
            }
            AuctionEvents::End(event) => {
                out.write_u8(END_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Withdraw(event) => {
                out.write_u8(WITHDRAW_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Refund(event) => {
                out.write_u8(REFUND_TAG)?;
                event.serial(out)
            }
        }
    }
}
