use core::convert::TryFrom;

use commons::{ContractResult, ContractTokenAmount, CustomContractError, Token, Whitelist};
use concordium_cis2::TokenAmountU64;
use concordium_std::*;

use crate::external::{AuctionConfig, AuctionPhase, BidView};
use crate::price;

/// Upper bound on distinct bidders in one round. Settlement logs an event per bidder, so the roster has to fit into
/// the event budget of a single invocation.
pub const MAX_BIDDERS: usize = 50;

/// One auction round, from `startAuction` to `endAuction`.
#[derive(Debug, Clone, Serialize, SchemaType, PartialEq, Eq)]
pub struct Round {
    /// Sequence number, starting at 1.
    pub id: u64,
    pub config: AuctionConfig,
    /// Time the round was opened. The price decay is counted from here.
    pub start: Timestamp,
    /// Bidding deadline. Late bids push it forward, never back.
    pub end: Timestamp,
    /// Set once the round has been settled.
    pub ended: bool,
    /// Bidders in order of their first bid in this round.
    pub roster: Vec<AccountAddress>,
}

impl Round {
    pub fn current_price(&self, now: Timestamp) -> Amount {
        price::current_price(&self.config, self.start, self.end, now)
    }

    fn ensure_bidding(&self, now: Timestamp) -> ContractResult<()> {
        ensure!(!self.ended, CustomContractError::AlreadyEnded);
        ensure!(now < self.end, CustomContractError::BiddingClosed);
        Ok(())
    }
}

/// Accepted bid.
pub struct BidReceipt {
    pub round: u64,
    /// Cumulative bid of the bidder after this bid.
    pub cumulative: Amount,
    /// Deadline after a possible extension.
    pub end: Timestamp,
}

/// Token share of a single bidder.
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    pub bidder: AccountAddress,
    pub bid: Amount,
    pub share: ContractTokenAmount,
}

/// Outcome of settling a round. It is computed in full before any transfer happens.
#[must_use]
#[derive(Debug)]
pub struct Settlement {
    pub round: u64,
    pub asset: Token,
    pub total_bid: Amount,
    pub distributed: ContractTokenAmount,
    /// Bidders with a non-zero share, in roster order.
    pub allocations: Vec<Allocation>,
}

/// CCD owed to an account on refund.
#[derive(Debug, PartialEq, Eq)]
pub struct Refund {
    /// Cumulative bid in the current round, once it is ended.
    pub bid: Amount,
    /// Bids left in rounds that expired without being ended.
    pub unclaimed: Amount,
    /// Sum of both.
    pub amount: Amount,
}

/// The contract state.
#[derive(Serial, DeserialWithState, StateClone)]
#[concordium(state_parameter = "S")]
pub struct State<S: HasStateApi> {
    /// Accounts allowed to bid. Kept across rounds.
    pub whitelist: Whitelist<S>,
    /// Highest cumulative bid each account has committed to or declared. Kept across rounds.
    pub ceilings: StateMap<AccountAddress, Amount, S>,
    /// Cumulative bids by round id and bidder.
    pub bids: StateMap<(u64, AccountAddress), Amount, S>,
    /// Bids of rounds that were replaced without being ended, refundable at any time.
    pub unclaimed: StateMap<AccountAddress, Amount, S>,
    /// Sum of `unclaimed`. Settlement does not sweep this part of the balance.
    pub unclaimed_total: Amount,
    /// Current or most recent round.
    pub round: Option<Round>,
}

impl<S: HasStateApi> State<S> {
    /// Create a new state without any round.
    pub fn new(state_builder: &mut StateBuilder<S>) -> Self {
        State {
            whitelist: Whitelist::new(state_builder),
            ceilings: state_builder.new_map(),
            bids: state_builder.new_map(),
            unclaimed: state_builder.new_map(),
            unclaimed_total: Amount::zero(),
            round: None,
        }
    }

    pub fn phase(&self) -> AuctionPhase {
        match &self.round {
            None => AuctionPhase::Uninitialized,
            Some(round) if round.ended => AuctionPhase::Ended,
            Some(_) => AuctionPhase::Active,
        }
    }

    pub fn bid_in(&self, round: u64, account: &AccountAddress) -> Amount {
        self.bids
            .get(&(round, *account))
            .map(|amount| *amount)
            .unwrap_or_else(Amount::zero)
    }

    /// Cumulative bid of `account` in the current round.
    pub fn bid_of(&self, account: &AccountAddress) -> Amount {
        self.round
            .as_ref()
            .map_or_else(Amount::zero, |round| self.bid_in(round.id, account))
    }

    pub fn ceiling_of(&self, account: &AccountAddress) -> Amount {
        self.ceilings
            .get(account)
            .map(|amount| *amount)
            .unwrap_or_else(Amount::zero)
    }

    pub fn unclaimed_of(&self, account: &AccountAddress) -> Amount {
        self.unclaimed
            .get(account)
            .map(|amount| *amount)
            .unwrap_or_else(Amount::zero)
    }

    pub fn bid_view(&self, account: &AccountAddress) -> BidView {
        BidView {
            whitelisted: self.whitelist.contains(account),
            bid: self.bid_of(account),
            ceiling: self.ceiling_of(account),
            unclaimed: self.unclaimed_of(account),
        }
    }

    pub fn current_price(&self, now: Timestamp) -> ContractResult<Amount> {
        self.round
            .as_ref()
            .map(|round| round.current_price(now))
            .ok_or(CustomContractError::NotStarted)
    }

    /// The round that has been settled most recently.
    pub fn ended_round(&self) -> ContractResult<&Round> {
        let round = self
            .round
            .as_ref()
            .ok_or(CustomContractError::NotStarted)?;
        ensure!(round.ended, CustomContractError::AuctionStillActive);
        Ok(round)
    }

    /// A new round may only start once the deadline of the previous one has passed.
    pub fn ensure_startable(&self, now: Timestamp) -> ContractResult<()> {
        if let Some(round) = &self.round {
            ensure!(now >= round.end, CustomContractError::AuctionInProgress);
        }
        Ok(())
    }

    /// Open a new round. `available` is the token balance the contract holds.
    ///
    /// Records of a settled previous round are discarded. Bids of a previous round that expired without being
    /// ended move to `unclaimed`, where their owners can get them back with a refund. Ceilings and the whitelist
    /// are kept.
    pub fn start(
        &mut self,
        config: AuctionConfig,
        now: Timestamp,
        available: ContractTokenAmount,
    ) -> ContractResult<&Round> {
        self.ensure_startable(now)?;
        config.validate()?;
        ensure!(
            available.0 >= config.total_quantity.0,
            CustomContractError::InsufficientAssetSupply
        );

        let end = now
            .checked_add(config.duration)
            .ok_or(CustomContractError::Overflow)?;
        let id = self.round.as_ref().map_or(1, |round| round.id + 1);

        let mut carried = Vec::new();
        let mut unclaimed_total = self.unclaimed_total.micro_ccd;
        if let Some(previous) = self.round.as_ref().filter(|round| !round.ended) {
            for bidder in previous.roster.iter() {
                let bid = self.bid_in(previous.id, bidder).micro_ccd;
                let unclaimed = self
                    .unclaimed_of(bidder)
                    .micro_ccd
                    .checked_add(bid)
                    .ok_or(CustomContractError::Overflow)?;
                unclaimed_total = unclaimed_total
                    .checked_add(bid)
                    .ok_or(CustomContractError::Overflow)?;
                carried.push((*bidder, Amount::from_micro_ccd(unclaimed)));
            }
        }

        if let Some(previous) = self.round.take() {
            for bidder in previous.roster.iter() {
                self.bids.remove(&(previous.id, *bidder));
            }
        }
        for (bidder, unclaimed) in carried {
            self.unclaimed.insert(bidder, unclaimed);
        }
        self.unclaimed_total = Amount::from_micro_ccd(unclaimed_total);

        Ok(&*self.round.insert(Round {
            id,
            config,
            start: now,
            end,
            ended: false,
            roster: Vec::new(),
        }))
    }

    /// Record a bid of `amount` on top of the bidder's cumulative bid.
    pub fn bid(
        &mut self,
        bidder: AccountAddress,
        operator: &AccountAddress,
        amount: Amount,
        now: Timestamp,
    ) -> ContractResult<BidReceipt> {
        let round = self
            .round
            .as_ref()
            .ok_or(CustomContractError::NotStarted)?;
        round.ensure_bidding(now)?;

        // Operator is not allowed to bid in its own auction
        ensure!(bidder != *operator, CustomContractError::Unauthorized);
        ensure!(
            self.whitelist.contains(&bidder),
            CustomContractError::NotWhitelisted
        );
        ensure!(amount > Amount::zero(), CustomContractError::InvalidBid);
        ensure!(
            amount >= round.current_price(now),
            CustomContractError::BidBelowCurrentPrice
        );

        let cumulative = self
            .bid_in(round.id, &bidder)
            .micro_ccd
            .checked_add(amount.micro_ccd)
            .map(Amount::from_micro_ccd)
            .ok_or(CustomContractError::Overflow)?;
        ensure!(
            cumulative > self.ceiling_of(&bidder),
            CustomContractError::BidNotIncreasing
        );

        let first_bid = !round.roster.contains(&bidder);
        ensure!(
            !first_bid || round.roster.len() < MAX_BIDDERS,
            CustomContractError::TooManyBidders
        );

        let round = self
            .round
            .as_mut()
            .ok_or(CustomContractError::NotStarted)?;
        if first_bid {
            round.roster.push(bidder);
        }
        round.end = price::extended_deadline(round.end, now);
        let receipt = BidReceipt {
            round: round.id,
            cumulative,
            end: round.end,
        };

        self.bids.insert((receipt.round, bidder), cumulative);
        self.ceilings.insert(bidder, cumulative);

        Ok(receipt)
    }

    /// Raise the ceiling of `account` without committing any funds. Returns the round id.
    pub fn raise_ceiling(
        &mut self,
        account: AccountAddress,
        operator: &AccountAddress,
        ceiling: Amount,
        now: Timestamp,
    ) -> ContractResult<u64> {
        let round = self
            .round
            .as_ref()
            .ok_or(CustomContractError::NotStarted)?;
        round.ensure_bidding(now)?;
        ensure!(account != *operator, CustomContractError::Unauthorized);
        ensure!(
            self.whitelist.contains(&account),
            CustomContractError::NotWhitelisted
        );
        ensure!(
            ceiling > self.ceiling_of(&account),
            CustomContractError::CeilingNotIncreasing
        );

        let id = round.id;
        self.ceilings.insert(account, ceiling);
        Ok(id)
    }

    /// Compute the pro rata distribution of the round. Nothing is modified, see [`State::mark_ended`].
    pub fn settlement(&self, now: Timestamp) -> ContractResult<Settlement> {
        let round = self
            .round
            .as_ref()
            .ok_or(CustomContractError::NotStarted)?;
        ensure!(!round.ended, CustomContractError::AlreadyEnded);
        ensure!(now >= round.end, CustomContractError::AuctionStillActive);

        let mut total: u64 = 0;
        for bidder in round.roster.iter() {
            total = total
                .checked_add(self.bid_in(round.id, bidder).micro_ccd)
                .ok_or(CustomContractError::Overflow)?;
        }
        ensure!(
            total >= round.config.reserve_price.micro_ccd,
            CustomContractError::ReserveNotMet
        );

        let quantity = round.config.total_quantity.0;
        let mut distributed: u64 = 0;
        let mut allocations = Vec::with_capacity(round.roster.len());
        if total > 0 {
            for bidder in round.roster.iter() {
                let bid = self.bid_in(round.id, bidder);
                let share = u128::from(bid.micro_ccd) * u128::from(quantity) / u128::from(total);
                let share = u64::try_from(share).map_err(|_| CustomContractError::Overflow)?;
                if share > 0 {
                    distributed = distributed
                        .checked_add(share)
                        .ok_or(CustomContractError::Overflow)?;
                    allocations.push(Allocation {
                        bidder: *bidder,
                        bid,
                        share: TokenAmountU64(share),
                    });
                }
            }
        }
        ensure!(
            distributed <= quantity,
            CustomContractError::OverDistribution
        );

        Ok(Settlement {
            round: round.id,
            asset: round.config.asset.clone(),
            total_bid: Amount::from_micro_ccd(total),
            distributed: TokenAmountU64(distributed),
            allocations,
        })
    }

    /// Close the current round. Bid records stay in place.
    pub fn mark_ended(&mut self) -> ContractResult<()> {
        let round = self
            .round
            .as_mut()
            .ok_or(CustomContractError::NotStarted)?;
        ensure!(!round.ended, CustomContractError::AlreadyEnded);
        round.ended = true;
        Ok(())
    }

    /// What `account` can get back: its bid in the ended current round plus any unclaimed bids.
    ///
    /// Unclaimed bids are refundable at any time. Without them the current round has to be ended.
    pub fn refundable(&self, account: &AccountAddress) -> ContractResult<Refund> {
        let unclaimed = self.unclaimed_of(account);
        let bid = match &self.round {
            Some(round) if round.ended => self.bid_in(round.id, account),
            _ => Amount::zero(),
        };

        if unclaimed == Amount::zero() {
            self.ended_round()?;
            ensure!(bid > Amount::zero(), CustomContractError::NothingToRefund);
        }

        let amount = bid
            .micro_ccd
            .checked_add(unclaimed.micro_ccd)
            .map(Amount::from_micro_ccd)
            .ok_or(CustomContractError::Overflow)?;

        Ok(Refund {
            bid,
            unclaimed,
            amount,
        })
    }

    /// Remove what `refund` paid out. A refunded bid of the current round also zeroes the ceiling.
    pub fn clear_refund(&mut self, account: &AccountAddress, refund: &Refund) {
        if refund.unclaimed > Amount::zero() {
            self.unclaimed.remove(account);
            self.unclaimed_total = Amount::from_micro_ccd(
                self.unclaimed_total
                    .micro_ccd
                    .saturating_sub(refund.unclaimed.micro_ccd),
            );
        }
        if refund.bid > Amount::zero() {
            if let Some(round) = &self.round {
                self.bids.remove(&(round.id, *account));
            }
            self.ceilings.remove(account);
        }
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use commons::{WhitelistUpdateKind, MAX_WHITELIST_BATCH};
    use concordium_cis2::TokenIdVec;
    use test_infrastructure::*;

    const OPERATOR: AccountAddress = AccountAddress([0; 32]);
    const ALICE: AccountAddress = AccountAddress([1; 32]);
    const BOB: AccountAddress = AccountAddress([2; 32]);
    const CAROL: AccountAddress = AccountAddress([3; 32]);

    const START: u64 = 1_000_000_000;
    const DURATION: u64 = 1_000_000;

    fn at(offset: u64) -> Timestamp {
        Timestamp::from_timestamp_millis(START + offset)
    }

    fn config(total_quantity: u64, start_price: u64, reserve_price: u64) -> AuctionConfig {
        AuctionConfig {
            asset: Token {
                contract: ContractAddress {
                    index: 7,
                    subindex: 0,
                },
                id: TokenIdVec(vec![1]),
            },
            duration: Duration::from_millis(DURATION),
            total_quantity: TokenAmountU64(total_quantity),
            start_price: Amount::from_micro_ccd(start_price),
            reserve_price: Amount::from_micro_ccd(reserve_price),
            decay_rate: Amount::zero(),
        }
    }

    fn default_state(accounts: &[AccountAddress]) -> State<TestStateApi> {
        let mut state_builder = TestStateBuilder::new();
        let mut state = State::new(&mut state_builder);
        for batch in accounts.chunks(MAX_WHITELIST_BATCH) {
            state
                .whitelist
                .handle_update(WhitelistUpdateKind::Add, batch)
                .expect_report("Whitelist update failed");
        }
        state
    }

    fn started_state(accounts: &[AccountAddress], config: AuctionConfig) -> State<TestStateApi> {
        let mut state = default_state(accounts);
        let quantity = config.total_quantity;
        state
            .start(config, at(0), quantity)
            .expect_report("Starting a round failed");
        state
    }

    fn micro(amount: u64) -> Amount {
        Amount::from_micro_ccd(amount)
    }

    #[concordium_test]
    fn test_start_validation() {
        let mut state = default_state(&[]);
        claim_eq!(state.phase(), AuctionPhase::Uninitialized);

        let mut invalid = config(100, 5, 1);
        invalid.duration = Duration::from_millis(0);
        claim_eq!(
            state.start(invalid, at(0), TokenAmountU64(100)).map(|_| ()),
            Err(CustomContractError::InvalidAuctionParams)
        );
        claim_eq!(
            state
                .start(config(0, 5, 1), at(0), TokenAmountU64(100))
                .map(|_| ()),
            Err(CustomContractError::InvalidAuctionParams)
        );
        claim_eq!(
            state
                .start(config(100, 1, 5), at(0), TokenAmountU64(100))
                .map(|_| ()),
            Err(CustomContractError::InvalidAuctionParams)
        );
        claim_eq!(
            state
                .start(config(100, 5, 1), at(0), TokenAmountU64(99))
                .map(|_| ()),
            Err(CustomContractError::InsufficientAssetSupply)
        );
        claim_eq!(state.phase(), AuctionPhase::Uninitialized);

        let round = state
            .start(config(100, 5, 1), at(0), TokenAmountU64(100))
            .expect_report("Starting a round failed")
            .clone();
        claim_eq!(round.id, 1);
        claim_eq!(round.start, at(0));
        claim_eq!(round.end, at(DURATION));
        claim!(round.roster.is_empty());
        claim_eq!(state.phase(), AuctionPhase::Active);

        // The deadline of the first round has not passed
        claim_eq!(
            state
                .start(config(100, 5, 1), at(DURATION - 1), TokenAmountU64(100))
                .map(|_| ()),
            Err(CustomContractError::AuctionInProgress)
        );
    }

    #[concordium_test]
    fn test_bid_checks() {
        let mut state = started_state(&[ALICE], config(100, 1_000, 100));

        claim_eq!(
            state.bid(BOB, &OPERATOR, micro(1_000), at(0)).map(|_| ()),
            Err(CustomContractError::NotWhitelisted)
        );
        claim_eq!(
            state.bid(OPERATOR, &OPERATOR, micro(1_000), at(0)).map(|_| ()),
            Err(CustomContractError::Unauthorized)
        );
        claim_eq!(
            state.bid(ALICE, &OPERATOR, Amount::zero(), at(0)).map(|_| ()),
            Err(CustomContractError::InvalidBid)
        );
        claim_eq!(
            state.bid(ALICE, &OPERATOR, micro(999), at(0)).map(|_| ()),
            Err(CustomContractError::BidBelowCurrentPrice)
        );
        // Half way through the price is 550
        claim_eq!(
            state
                .bid(ALICE, &OPERATOR, micro(549), at(DURATION / 2))
                .map(|_| ()),
            Err(CustomContractError::BidBelowCurrentPrice)
        );
        claim!(state.bid_of(&ALICE) == Amount::zero());
        claim!(state.round.as_ref().map_or(false, |r| r.roster.is_empty()));

        let receipt = state
            .bid(ALICE, &OPERATOR, micro(550), at(DURATION / 2))
            .expect_report("Bid at the current price failed");
        claim_eq!(receipt.round, 1);
        claim_eq!(receipt.cumulative, micro(550));
        claim_eq!(receipt.end, at(DURATION));

        claim_eq!(
            state.bid(ALICE, &OPERATOR, micro(550), at(DURATION)).map(|_| ()),
            Err(CustomContractError::BiddingClosed)
        );
    }

    #[concordium_test]
    fn test_bids_accumulate_and_roster_keeps_order() {
        let mut state = started_state(&[ALICE, BOB, CAROL], config(100, 10, 1));

        state
            .bid(BOB, &OPERATOR, micro(10), at(0))
            .expect_report("Bob's bid failed");
        state
            .bid(ALICE, &OPERATOR, micro(10), at(0))
            .expect_report("Alice's bid failed");
        let receipt = state
            .bid(BOB, &OPERATOR, micro(15), at(10))
            .expect_report("Bob's top up failed");

        claim_eq!(receipt.cumulative, micro(25));
        claim_eq!(state.bid_of(&BOB), micro(25));
        claim_eq!(state.ceiling_of(&BOB), micro(25));
        claim_eq!(
            state.round.as_ref().map(|round| round.roster.clone()),
            Some(vec![BOB, ALICE])
        );
    }

    #[concordium_test]
    fn test_ceiling_blocks_smaller_bids() {
        let mut state = started_state(&[ALICE], config(100, 10, 1));

        let round = state
            .raise_ceiling(ALICE, &OPERATOR, micro(50), at(0))
            .expect_report("Raising the ceiling failed");
        claim_eq!(round, 1);
        claim_eq!(
            state
                .raise_ceiling(ALICE, &OPERATOR, micro(50), at(0))
                .map(|_| ()),
            Err(CustomContractError::CeilingNotIncreasing)
        );

        claim_eq!(
            state.bid(ALICE, &OPERATOR, micro(50), at(0)).map(|_| ()),
            Err(CustomContractError::BidNotIncreasing)
        );
        claim_eq!(state.bid_of(&ALICE), Amount::zero());

        let receipt = state
            .bid(ALICE, &OPERATOR, micro(51), at(0))
            .expect_report("Bid above the ceiling failed");
        claim_eq!(receipt.cumulative, micro(51));
        claim_eq!(state.ceiling_of(&ALICE), micro(51));

        claim_eq!(
            state.raise_ceiling(BOB, &OPERATOR, micro(60), at(0)),
            Err(CustomContractError::NotWhitelisted)
        );
        claim_eq!(state.ceiling_of(&BOB), Amount::zero());
        claim_eq!(
            state.raise_ceiling(OPERATOR, &OPERATOR, micro(60), at(0)),
            Err(CustomContractError::Unauthorized)
        );
        claim_eq!(state.ceiling_of(&OPERATOR), Amount::zero());
        claim_eq!(
            state.raise_ceiling(ALICE, &OPERATOR, micro(60), at(DURATION)),
            Err(CustomContractError::BiddingClosed)
        );
        claim_eq!(state.ceiling_of(&ALICE), micro(51));

        state.mark_ended().expect_report("Ending failed");
        claim_eq!(
            state.raise_ceiling(ALICE, &OPERATOR, micro(60), at(DURATION)),
            Err(CustomContractError::AlreadyEnded)
        );
        claim_eq!(state.ceiling_of(&ALICE), micro(51));
    }

    #[concordium_test]
    fn test_late_bid_extends_deadline() {
        let mut state = started_state(&[ALICE, BOB], config(100, 10, 1));
        let window = price::EXTENSION_WINDOW_MILLIS;

        let receipt = state
            .bid(ALICE, &OPERATOR, micro(10), at(DURATION - window))
            .expect_report("Bid at the window edge failed");
        claim_eq!(receipt.end, at(DURATION));

        let receipt = state
            .bid(BOB, &OPERATOR, micro(10), at(DURATION - 1))
            .expect_report("Late bid failed");
        claim_eq!(receipt.end, at(DURATION - 1 + window));

        // Bidding past the original deadline is fine once it moved
        let receipt = state
            .bid(ALICE, &OPERATOR, micro(10), at(DURATION + 1_000))
            .expect_report("Bid after extension failed");
        claim_eq!(receipt.end, at(DURATION + 1_000 + window));
    }

    #[concordium_test]
    fn test_roster_is_bounded() {
        let accounts: Vec<AccountAddress> = (1..=MAX_BIDDERS as u8 + 1)
            .map(|i| AccountAddress([i; 32]))
            .collect();
        let mut state = started_state(&accounts, config(1_000, 10, 1));

        for account in accounts.iter().take(MAX_BIDDERS) {
            state
                .bid(*account, &OPERATOR, micro(10), at(0))
                .expect_report("Bid failed");
        }

        claim_eq!(
            state
                .bid(accounts[MAX_BIDDERS], &OPERATOR, micro(10), at(0))
                .map(|_| ()),
            Err(CustomContractError::TooManyBidders)
        );
        // Bidders already on the roster can still top up
        state
            .bid(accounts[0], &OPERATOR, micro(10), at(0))
            .expect_report("Top up on a full roster failed");
    }

    #[concordium_test]
    fn test_settlement_is_pro_rata() {
        let mut state = started_state(&[ALICE, BOB, CAROL], config(1_000, 7, 1));

        state.bid(ALICE, &OPERATOR, micro(7), at(0)).expect_report("Bid failed");
        state.bid(BOB, &OPERATOR, micro(13), at(0)).expect_report("Bid failed");
        state.bid(CAROL, &OPERATOR, micro(29), at(0)).expect_report("Bid failed");

        claim_eq!(
            state.settlement(at(DURATION - 1)).map(|_| ()),
            Err(CustomContractError::AuctionStillActive)
        );

        let settlement = state
            .settlement(at(DURATION))
            .expect_report("Settlement failed");
        claim_eq!(settlement.round, 1);
        claim_eq!(settlement.total_bid, micro(49));
        // 7000/49, 13000/49 and 29000/49, floored
        claim_eq!(
            settlement.allocations,
            vec![
                Allocation {
                    bidder: ALICE,
                    bid: micro(7),
                    share: TokenAmountU64(142),
                },
                Allocation {
                    bidder: BOB,
                    bid: micro(13),
                    share: TokenAmountU64(265),
                },
                Allocation {
                    bidder: CAROL,
                    bid: micro(29),
                    share: TokenAmountU64(591),
                },
            ]
        );
        claim_eq!(settlement.distributed, TokenAmountU64(998));

        // Computing the settlement does not end the round
        claim_eq!(state.phase(), AuctionPhase::Active);
        state.mark_ended().expect_report("Ending failed");
        claim_eq!(state.phase(), AuctionPhase::Ended);
        claim_eq!(
            state.settlement(at(DURATION)).map(|_| ()),
            Err(CustomContractError::AlreadyEnded)
        );
        claim_eq!(state.mark_ended(), Err(CustomContractError::AlreadyEnded));

        // Bid records survive settlement
        claim_eq!(state.bid_of(&ALICE), micro(7));
    }

    #[concordium_test]
    fn test_settlement_never_over_distributes() {
        let accounts: Vec<AccountAddress> = (1..=20u8).map(|i| AccountAddress([i; 32])).collect();

        for quantity in [1u64, 3, 97, 1_000, 1_000_003].iter() {
            let mut state = started_state(&accounts, config(*quantity, 10, 1));
            for (i, account) in accounts.iter().enumerate() {
                let amount = 10 + (i as u64 * 7_919) % 1_013;
                state
                    .bid(*account, &OPERATOR, micro(amount), at(0))
                    .expect_report("Bid failed");
            }

            let settlement = state
                .settlement(at(DURATION))
                .expect_report("Settlement failed");
            let total = settlement.total_bid.micro_ccd;
            let sum: u64 = settlement.allocations.iter().map(|a| a.share.0).sum();

            claim_eq!(sum, settlement.distributed.0);
            claim!(sum <= *quantity);
            for allocation in settlement.allocations.iter() {
                let exact = u128::from(allocation.bid.micro_ccd) * u128::from(*quantity);
                claim!(u128::from(allocation.share.0) * u128::from(total) <= exact);
                claim!(u128::from(allocation.share.0 + 1) * u128::from(total) > exact);
            }
        }
    }

    #[concordium_test]
    fn test_settlement_reserve() {
        let mut state = started_state(&[ALICE], config(100, 10, 1));

        claim_eq!(
            state.settlement(at(DURATION)).map(|_| ()),
            Err(CustomContractError::ReserveNotMet)
        );
        claim_eq!(state.phase(), AuctionPhase::Active);

        // Without a reserve an empty round settles with nothing to distribute
        let mut state = started_state(&[ALICE], config(100, 10, 0));
        let settlement = state
            .settlement(at(DURATION))
            .expect_report("Settlement failed");
        claim!(settlement.allocations.is_empty());
        claim_eq!(settlement.distributed, TokenAmountU64(0));
        state.mark_ended().expect_report("Ending failed");
    }

    #[concordium_test]
    fn test_refund_requires_ended_round() {
        let mut state = started_state(&[ALICE, BOB], config(100, 10, 1));
        state.bid(ALICE, &OPERATOR, micro(10), at(0)).expect_report("Bid failed");

        claim_eq!(
            state.refundable(&ALICE),
            Err(CustomContractError::AuctionStillActive)
        );

        state.mark_ended().expect_report("Ending failed");
        let refund = state.refundable(&ALICE).expect_report("Nothing refundable");
        claim_eq!(
            refund,
            Refund {
                bid: micro(10),
                unclaimed: Amount::zero(),
                amount: micro(10),
            }
        );
        claim_eq!(
            state.refundable(&BOB),
            Err(CustomContractError::NothingToRefund)
        );

        state.clear_refund(&ALICE, &refund);
        claim_eq!(state.bid_of(&ALICE), Amount::zero());
        claim_eq!(state.ceiling_of(&ALICE), Amount::zero());
        claim_eq!(
            state.refundable(&ALICE),
            Err(CustomContractError::NothingToRefund)
        );
    }

    #[concordium_test]
    fn test_expired_round_bids_become_unclaimed() {
        let mut state = started_state(&[ALICE, BOB], config(100, 10, 1));
        state.bid(ALICE, &OPERATOR, micro(10), at(0)).expect_report("Bid failed");
        state.bid(BOB, &OPERATOR, micro(12), at(0)).expect_report("Bid failed");

        // The first round is never ended
        state
            .start(config(100, 10, 1), at(DURATION), TokenAmountU64(100))
            .expect_report("Starting the second round failed");
        claim_eq!(state.bid_in(1, &ALICE), Amount::zero());
        claim_eq!(state.bid_of(&ALICE), Amount::zero());
        claim_eq!(state.unclaimed_of(&ALICE), micro(10));
        claim_eq!(state.unclaimed_of(&BOB), micro(12));
        claim_eq!(state.unclaimed_total, micro(22));

        // Unclaimed bids do not wait for the running round
        state.bid(ALICE, &OPERATOR, micro(11), at(DURATION)).expect_report("Bid failed");
        let refund = state.refundable(&ALICE).expect_report("Nothing refundable");
        claim_eq!(
            refund,
            Refund {
                bid: Amount::zero(),
                unclaimed: micro(10),
                amount: micro(10),
            }
        );
        state.clear_refund(&ALICE, &refund);
        claim_eq!(state.unclaimed_of(&ALICE), Amount::zero());
        claim_eq!(state.unclaimed_total, micro(12));
        // The running bid and its ceiling are untouched
        claim_eq!(state.bid_of(&ALICE), micro(11));
        claim_eq!(state.ceiling_of(&ALICE), micro(11));
        claim_eq!(
            state.refundable(&ALICE),
            Err(CustomContractError::AuctionStillActive)
        );

        // Once the second round ends Bob gets both parts back at once
        state.bid(BOB, &OPERATOR, micro(13), at(DURATION)).expect_report("Bid failed");
        state.mark_ended().expect_report("Ending failed");
        claim_eq!(
            state.refundable(&BOB),
            Ok(Refund {
                bid: micro(13),
                unclaimed: micro(12),
                amount: micro(25),
            })
        );
    }

    #[concordium_test]
    fn test_unclaimed_bids_add_up_across_rounds() {
        let mut state = started_state(&[ALICE], config(100, 10, 1));
        state.bid(ALICE, &OPERATOR, micro(10), at(0)).expect_report("Bid failed");
        state
            .start(config(100, 10, 1), at(DURATION), TokenAmountU64(100))
            .expect_report("Starting the second round failed");
        state
            .bid(ALICE, &OPERATOR, micro(11), at(DURATION))
            .expect_report("Bid failed");
        state
            .start(config(100, 10, 1), at(2 * DURATION), TokenAmountU64(100))
            .expect_report("Starting the third round failed");

        claim_eq!(state.unclaimed_of(&ALICE), micro(21));
        claim_eq!(state.unclaimed_total, micro(21));
    }

    #[concordium_test]
    fn test_new_round_starts_empty() {
        let mut state = started_state(&[ALICE, BOB], config(100, 10, 1));
        state.bid(ALICE, &OPERATOR, micro(10), at(0)).expect_report("Bid failed");
        state.bid(BOB, &OPERATOR, micro(12), at(0)).expect_report("Bid failed");
        state
            .raise_ceiling(ALICE, &OPERATOR, micro(40), at(0))
            .expect_report("Raising the ceiling failed");
        state.mark_ended().expect_report("Ending failed");

        let round = state
            .start(config(100, 10, 1), at(DURATION), TokenAmountU64(100))
            .expect_report("Starting the second round failed")
            .clone();
        claim_eq!(round.id, 2);
        claim!(round.roster.is_empty());
        claim_eq!(state.phase(), AuctionPhase::Active);

        // Cumulative bids are gone, whitelist and ceilings are not
        claim_eq!(state.bid_of(&ALICE), Amount::zero());
        claim_eq!(state.bid_of(&BOB), Amount::zero());
        claim_eq!(state.bid_in(1, &ALICE), Amount::zero());
        // A settled round leaves nothing unclaimed
        claim_eq!(state.unclaimed_total, Amount::zero());
        claim_eq!(
            state.bid_view(&ALICE),
            BidView {
                whitelisted: true,
                bid: Amount::zero(),
                ceiling: micro(40),
                unclaimed: Amount::zero(),
            }
        );

        // Alice has to exceed the ceiling she carried over
        claim_eq!(
            state
                .bid(ALICE, &OPERATOR, micro(40), at(DURATION))
                .map(|_| ()),
            Err(CustomContractError::BidNotIncreasing)
        );
        let receipt = state
            .bid(ALICE, &OPERATOR, micro(41), at(DURATION))
            .expect_report("Bid above the carried ceiling failed");
        claim_eq!(receipt.round, 2);
        claim_eq!(receipt.cumulative, micro(41));
    }
}
