use commons::{
    ContractResult, ContractTokenAmount, CustomContractError, WhitelistParams,
    WhitelistUpdateKind, WhitelistViewParams,
};
use concordium_std::*;

use crate::asset;
use crate::events::AuctionEvents;
use crate::external::*;
use crate::state::State;

/// Initialize the auction contract. The instance owner becomes the operator.
#[init(contract = "DutchAuction")]
fn contract_init<S: HasStateApi>(
    _ctx: &impl HasInitContext,
    state_builder: &mut StateBuilder<S>,
) -> InitResult<State<S>> {
    Ok(State::new(state_builder))
}

/// Open a new round.
///
///  It rejects if:
///  - Sender is not the operator.
///  - Fails to parse `AuctionConfig` parameters or they are inconsistent.
///  - The deadline of the previous round has not passed.
///  - The contract holds less of the asset than `total_quantity`.
#[receive(
    mutable,
    contract = "DutchAuction",
    name = "startAuction",
    parameter = "AuctionConfig",
    enable_logger
)]
fn contract_start_auction<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    ensure_operator(ctx)?;
    let config = AuctionConfig::deserial(&mut ctx.parameter_cursor())?;
    let now = ctx.metadata().slot_time();

    // Fail early before querying the token contract
    host.state().ensure_startable(now)?;
    config.validate()?;

    let available = asset::balance_of(host, &config.asset, Address::Contract(ctx.self_address()))?;

    let round = host.state_mut().start(config, now, available)?;
    logger.log(&AuctionEvents::start(
        round.id,
        &round.config,
        round.start,
        round.end,
    ))?;

    Ok(())
}

#[receive(
    mutable,
    contract = "DutchAuction",
    name = "addToWhitelist",
    parameter = "WhitelistParams",
    enable_logger
)]
fn contract_add_to_whitelist<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    update_whitelist(ctx, host, logger, WhitelistUpdateKind::Add)
}

#[receive(
    mutable,
    contract = "DutchAuction",
    name = "removeFromWhitelist",
    parameter = "WhitelistParams",
    enable_logger
)]
fn contract_remove_from_whitelist<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    update_whitelist(ctx, host, logger, WhitelistUpdateKind::Remove)
}

/// Price a bid has to match at the current block time.
#[receive(contract = "DutchAuction", name = "currentPrice", return_value = "Amount")]
fn contract_current_price<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ContractResult<Amount> {
    host.state().current_price(ctx.metadata().slot_time())
}

/// Place a bid with the attached amount. Bids accumulate within a round.
#[receive(
    mutable,
    payable,
    contract = "DutchAuction",
    name = "bid",
    enable_logger
)]
fn contract_bid<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    amount: Amount,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    let bidder = sender_account(ctx)?;

    let receipt = host
        .state_mut()
        .bid(bidder, &ctx.owner(), amount, ctx.metadata().slot_time())?;

    logger.log(&AuctionEvents::bid(
        receipt.round,
        &bidder,
        amount,
        receipt.cumulative,
        receipt.end,
    ))?;

    Ok(())
}

/// Declare a higher ceiling without attaching funds. Later bids have to exceed it.
#[receive(
    mutable,
    contract = "DutchAuction",
    name = "setBidCeiling",
    parameter = "Amount",
    enable_logger
)]
fn contract_set_bid_ceiling<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    let account = sender_account(ctx)?;
    let ceiling = Amount::deserial(&mut ctx.parameter_cursor())?;

    let round = host.state_mut().raise_ceiling(
        account,
        &ctx.owner(),
        ceiling,
        ctx.metadata().slot_time(),
    )?;

    logger.log(&AuctionEvents::ceiling(round, &account, ceiling))?;

    Ok(())
}

/// Settle the round: distribute the asset pro rata and transfer the CCD balance to the operator. CCD held for
/// unclaimed bids of earlier rounds stays in the contract.
///
///  It rejects if:
///  - Sender is not the operator.
///  - The round was already ended or its deadline has not passed.
///  - The total of all bids is below the reserve price.
///  - The token contract refuses the transfer.
#[receive(
    mutable,
    contract = "DutchAuction",
    name = "endAuction",
    enable_logger
)]
fn contract_end_auction<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    ensure_operator(ctx)?;
    let settlement = host.state().settlement(ctx.metadata().slot_time())?;

    let payouts: Vec<(AccountAddress, ContractTokenAmount)> = settlement
        .allocations
        .iter()
        .map(|allocation| (allocation.bidder, allocation.share))
        .collect();
    asset::transfer(
        host,
        &settlement.asset,
        Address::Contract(ctx.self_address()),
        &payouts,
    )?;

    for allocation in settlement.allocations.iter() {
        logger.log(&AuctionEvents::settle(
            settlement.round,
            &allocation.bidder,
            allocation.bid,
            allocation.share,
        ))?;
    }

    // Bid records stay untouched, refunds after this point have nothing to pay out from
    let held = host.state().unclaimed_total;
    let proceeds = Amount::from_micro_ccd(
        host.self_balance()
            .micro_ccd
            .saturating_sub(held.micro_ccd),
    );
    if proceeds > Amount::zero() {
        host.invoke_transfer(&ctx.owner(), proceeds)?;
    }

    logger.log(&AuctionEvents::end(
        settlement.round,
        settlement.total_bid,
        settlement.distributed,
        proceeds,
    ))?;

    host.state_mut().mark_ended()?;

    Ok(())
}

/// Return the asset the settlement left behind to the operator.
#[receive(
    mutable,
    contract = "DutchAuction",
    name = "withdrawRemainingAssets",
    enable_logger
)]
fn contract_withdraw_remaining_assets<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    ensure_operator(ctx)?;

    let (round, token) = {
        let round = host.state().ended_round()?;
        (round.id, round.config.asset.clone())
    };
    let operator = ctx.owner();
    let contract = Address::Contract(ctx.self_address());

    let remaining = asset::balance_of(host, &token, contract)?;
    if remaining.0 > 0 {
        asset::transfer(host, &token, contract, &[(operator, remaining)])?;
    }

    logger.log(&AuctionEvents::withdraw(round, &token, remaining, &operator))?;

    Ok(())
}

/// Pay the sender's cumulative bid back once the round is ended, together with bids left in rounds that were
/// replaced without being ended. The latter are refundable at any time.
#[receive(
    mutable,
    contract = "DutchAuction",
    name = "refund",
    enable_logger
)]
fn contract_refund<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    let account = sender_account(ctx)?;
    let refund = host.state().refundable(&account)?;
    let round = host.state().round.as_ref().map_or(0, |round| round.id);

    host.invoke_transfer(&account, refund.amount)?;
    host.state_mut().clear_refund(&account, &refund);

    logger.log(&AuctionEvents::refund(round, &account, refund.amount))?;

    Ok(())
}

#[receive(contract = "DutchAuction", name = "view", return_value = "ViewState")]
fn contract_view<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ContractResult<ViewState> {
    let state = host.state();

    Ok(ViewState {
        operator: ctx.owner(),
        phase: state.phase(),
        round: state.round.clone(),
        unclaimed: state.unclaimed_total,
    })
}

#[receive(
    contract = "DutchAuction",
    name = "viewBid",
    parameter = "AccountAddress",
    return_value = "BidView"
)]
fn contract_view_bid<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ContractResult<BidView> {
    let account = AccountAddress::deserial(&mut ctx.parameter_cursor())?;
    Ok(host.state().bid_view(&account))
}

/// Function to view the whitelisted accounts, paginated.
#[receive(
    contract = "DutchAuction",
    name = "viewWhitelist",
    parameter = "WhitelistViewParams",
    return_value = "Vec<AccountAddress>"
)]
fn contract_view_whitelist<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ContractResult<Vec<AccountAddress>> {
    let params = WhitelistViewParams::deserial(&mut ctx.parameter_cursor())?;
    Ok(host.state().whitelist.handle_view(params))
}

fn update_whitelist<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
    kind: WhitelistUpdateKind,
) -> ContractResult<()> {
    ensure_operator(ctx)?;
    let params = WhitelistParams::deserial(&mut ctx.parameter_cursor())?;

    let changed = host
        .state_mut()
        .whitelist
        .handle_update(kind, &params.accounts)?;

    for account in changed.iter() {
        logger.log(&AuctionEvents::whitelist(kind, account))?;
    }

    Ok(())
}

fn ensure_operator(ctx: &impl HasReceiveContext) -> ContractResult<()> {
    ensure!(
        ctx.sender().matches_account(&ctx.owner()),
        CustomContractError::Unauthorized
    );
    Ok(())
}

fn sender_account(ctx: &impl HasReceiveContext) -> ContractResult<AccountAddress> {
    match ctx.sender() {
        Address::Account(account) => Ok(account),
        Address::Contract(_) => bail!(CustomContractError::OnlyAccountAddress),
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use crate::price::EXTENSION_WINDOW_MILLIS;
    use crate::state::Round;
    use commons::{test::*, Token, TransferParameter};
    use concordium_cis2::{TokenAmountU64, TokenIdVec};
    use test_infrastructure::*;

    const OPERATOR: AccountAddress = AccountAddress([0; 32]);
    const ALICE: AccountAddress = AccountAddress([1; 32]);
    const BOB: AccountAddress = AccountAddress([2; 32]);
    const CAROL: AccountAddress = AccountAddress([3; 32]);

    const SELF_ADDRESS: ContractAddress = ContractAddress {
        index: 10,
        subindex: 0,
    };
    const TOKEN_CONTRACT: ContractAddress = ContractAddress {
        index: 7,
        subindex: 0,
    };

    const START: u64 = 1_650_000_000_000;
    const DURATION_SECONDS: u64 = 1000;
    const END: u64 = DURATION_SECONDS * 1000;

    type Host = TestHost<State<TestStateApi>>;

    fn at(offset: u64) -> Timestamp {
        Timestamp::from_timestamp_millis(START + offset)
    }

    fn asset() -> Token {
        Token {
            contract: TOKEN_CONTRACT,
            id: TokenIdVec(vec![1]),
        }
    }

    fn auction_config(total_quantity: u64, start_price: Amount, reserve_price: Amount) -> AuctionConfig {
        AuctionConfig {
            asset: asset(),
            duration: Duration::from_seconds(DURATION_SECONDS),
            total_quantity: TokenAmountU64(total_quantity),
            start_price,
            reserve_price,
            decay_rate: Amount::zero(),
        }
    }

    fn receive_ctx<'a>(
        sender: AccountAddress,
        now: Timestamp,
        parameter: &'a [u8],
    ) -> TestReceiveContext<'a> {
        let mut ctx = TestReceiveContext::empty();
        ctx.set_owner(OPERATOR)
            .set_sender(Address::Account(sender))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(now)
            .set_parameter(parameter);
        ctx
    }

    fn default_host() -> Host {
        let ctx = TestInitContext::empty();
        let mut state_builder = TestStateBuilder::new();

        let state =
            contract_init(&ctx, &mut state_builder).expect_report("Failed during init_DutchAuction");
        let mut host = TestHost::new(state, state_builder);

        let params = to_bytes(&WhitelistParams {
            accounts: vec![ALICE, BOB],
        });
        let ctx = receive_ctx(OPERATOR, at(0), &params);
        let mut logger = TestLogger::init();
        contract_add_to_whitelist(&ctx, &mut host, &mut logger)
            .expect_report("Failed to whitelist bidders");

        host
    }

    fn start(host: &mut Host, config: &AuctionConfig, now: Timestamp, balance: u64) -> ContractResult<()> {
        host.setup_mock_entrypoint(
            TOKEN_CONTRACT,
            OwnedEntrypointName::new_unchecked("balanceOf".into()),
            balance_of_mock(TokenAmountU64(balance)),
        );

        let params = to_bytes(config);
        let ctx = receive_ctx(OPERATOR, now, &params);
        let mut logger = TestLogger::init();
        contract_start_auction(&ctx, host, &mut logger)
    }

    fn started_host(config: &AuctionConfig) -> Host {
        let mut host = default_host();
        start(&mut host, config, at(0), config.total_quantity.0).expect_report("Failed to start the auction");
        host
    }

    fn bid(host: &mut Host, bidder: AccountAddress, amount: Amount, now: Timestamp) -> ContractResult<()> {
        let ctx = receive_ctx(bidder, now, &[]);
        let mut logger = TestLogger::init();
        contract_bid(&ctx, host, amount, &mut logger)
    }

    fn current_price(host: &Host, now: Timestamp) -> ContractResult<Amount> {
        let ctx = receive_ctx(ALICE, now, &[]);
        contract_current_price(&ctx, host)
    }

    fn set_ceiling(host: &mut Host, account: AccountAddress, ceiling: Amount, now: Timestamp) -> ContractResult<()> {
        let params = to_bytes(&ceiling);
        let ctx = receive_ctx(account, now, &params);
        let mut logger = TestLogger::init();
        contract_set_bid_ceiling(&ctx, host, &mut logger)
    }

    fn end(host: &mut Host, sender: AccountAddress, now: Timestamp) -> ContractResult<()> {
        let ctx = receive_ctx(sender, now, &[]);
        let mut logger = TestLogger::init();
        contract_end_auction(&ctx, host, &mut logger)
    }

    fn refund(host: &mut Host, account: AccountAddress, now: Timestamp) -> ContractResult<()> {
        let ctx = receive_ctx(account, now, &[]);
        let mut logger = TestLogger::init();
        contract_refund(&ctx, host, &mut logger)
    }

    fn view(host: &Host) -> ViewState {
        let ctx = receive_ctx(ALICE, at(0), &[]);
        contract_view(&ctx, host).expect_report("View failed")
    }

    fn view_round(host: &Host) -> Round {
        view(host).round.expect_report("No round recorded")
    }

    fn view_bid(host: &Host, account: AccountAddress) -> BidView {
        let params = to_bytes(&account);
        let ctx = receive_ctx(OPERATOR, at(0), &params);
        contract_view_bid(&ctx, host).expect_report("View failed")
    }

    fn transfer_mock(expected: Vec<(AccountAddress, u64)>) -> MockFn<State<TestStateApi>> {
        parse_and_check_mock::<TransferParameter, _>(
            move |params| {
                params.0.len() == expected.len()
                    && params.0.iter().zip(expected.iter()).all(|(transfer, (to, amount))| {
                        transfer.from == Address::Contract(SELF_ADDRESS)
                            && transfer.token_id == TokenIdVec(vec![1])
                            && transfer.to.address() == Address::Account(*to)
                            && transfer.amount == TokenAmountU64(*amount)
                    })
            },
            (),
        )
    }

    fn setup_transfer(host: &mut Host, mock: MockFn<State<TestStateApi>>) {
        host.setup_mock_entrypoint(
            TOKEN_CONTRACT,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            mock,
        );
    }

    #[concordium_test]
    fn test_init() {
        let ctx = TestInitContext::empty();
        let mut state_builder = TestStateBuilder::new();

        let state =
            contract_init(&ctx, &mut state_builder).expect_report("Failed during init_DutchAuction");
        let host = TestHost::new(state, state_builder);

        claim_eq!(
            view(&host),
            ViewState {
                operator: OPERATOR,
                phase: AuctionPhase::Uninitialized,
                round: None,
                unclaimed: Amount::zero(),
            }
        );
        claim_eq!(
            current_price(&host, at(0)),
            Err(CustomContractError::NotStarted)
        );
    }

    #[concordium_test]
    fn test_whitelist_updates() {
        let mut host = default_host();

        // Only the operator manages the whitelist
        let params = to_bytes(&WhitelistParams {
            accounts: vec![CAROL],
        });
        let ctx = receive_ctx(ALICE, at(0), &params);
        let mut logger = TestLogger::init();
        let result = contract_add_to_whitelist(&ctx, &mut host, &mut logger);
        claim_eq!(result, Err(CustomContractError::Unauthorized));
        claim!(!view_bid(&host, CAROL).whitelisted);

        // Already listed accounts are not logged again
        let params = to_bytes(&WhitelistParams {
            accounts: vec![ALICE, CAROL],
        });
        let ctx = receive_ctx(OPERATOR, at(0), &params);
        let mut logger = TestLogger::init();
        let result = contract_add_to_whitelist(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));
        claim_eq!(
            logger.logs,
            vec![to_bytes(&AuctionEvents::whitelist(
                WhitelistUpdateKind::Add,
                &CAROL
            ))]
        );
        claim!(view_bid(&host, CAROL).whitelisted);

        let params = to_bytes(&WhitelistParams {
            accounts: vec![BOB],
        });
        let ctx = receive_ctx(OPERATOR, at(0), &params);
        let mut logger = TestLogger::init();
        let result = contract_remove_from_whitelist(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));
        claim_eq!(
            logger.logs,
            vec![to_bytes(&AuctionEvents::whitelist(
                WhitelistUpdateKind::Remove,
                &BOB
            ))]
        );

        let params = to_bytes(&WhitelistViewParams { skip: 0, show: 10 });
        let ctx = receive_ctx(BOB, at(0), &params);
        let listed = contract_view_whitelist(&ctx, &host).expect_report("View failed");
        claim_eq!(listed.len(), 2);
        claim!(listed.contains(&ALICE));
        claim!(listed.contains(&CAROL));
    }

    #[concordium_test]
    fn test_start_auction() {
        let mut host = default_host();
        let config = auction_config(100, Amount::from_ccd(5), Amount::from_ccd(1));

        host.setup_mock_entrypoint(
            TOKEN_CONTRACT,
            OwnedEntrypointName::new_unchecked("balanceOf".into()),
            balance_of_mock(TokenAmountU64(100)),
        );
        let params = to_bytes(&config);
        let ctx = receive_ctx(OPERATOR, at(0), &params);
        let mut logger = TestLogger::init();
        let result = contract_start_auction(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));

        let round = view_round(&host);
        claim_eq!(round.id, 1);
        claim_eq!(round.config, config);
        claim_eq!(round.start, at(0));
        claim_eq!(round.end, at(END));
        claim!(!round.ended);
        claim_eq!(view(&host).phase, AuctionPhase::Active);
        claim_eq!(
            logger.logs,
            vec![to_bytes(&AuctionEvents::start(1, &config, at(0), at(END)))]
        );
        claim_eq!(current_price(&host, at(0)), Ok(Amount::from_ccd(5)));
    }

    #[concordium_test]
    fn test_start_auction_rejects() {
        let mut host = default_host();
        let config = auction_config(100, Amount::from_ccd(5), Amount::from_ccd(1));

        let params = to_bytes(&config);
        let ctx = receive_ctx(ALICE, at(0), &params);
        let mut logger = TestLogger::init();
        let result = contract_start_auction(&ctx, &mut host, &mut logger);
        claim_eq!(result, Err(CustomContractError::Unauthorized));

        claim_eq!(
            start(&mut host, &config, at(0), 99),
            Err(CustomContractError::InsufficientAssetSupply)
        );

        let invalid = auction_config(100, Amount::from_ccd(1), Amount::from_ccd(5));
        claim_eq!(
            start(&mut host, &invalid, at(0), 100),
            Err(CustomContractError::InvalidAuctionParams)
        );
        claim_eq!(view(&host).phase, AuctionPhase::Uninitialized);

        claim_eq!(start(&mut host, &config, at(0), 100), Ok(()));
        claim_eq!(
            start(&mut host, &config, at(END - 1), 100),
            Err(CustomContractError::AuctionInProgress)
        );
        claim_eq!(view_round(&host).id, 1);
    }

    #[concordium_test]
    fn test_bid() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(5),
            Amount::from_ccd(1),
        ));

        let price = current_price(&host, at(250_000)).expect_report("Price not available");
        claim_eq!(price, Amount::from_ccd(4));

        let ctx = receive_ctx(ALICE, at(250_000), &[]);
        let mut logger = TestLogger::init();
        let result = contract_bid(&ctx, &mut host, price, &mut logger);
        claim_eq!(result, Ok(()));
        claim_eq!(
            logger.logs,
            vec![to_bytes(&AuctionEvents::bid(
                1,
                &ALICE,
                price,
                price,
                at(END)
            ))]
        );

        // Top up at a later, lower price
        claim_eq!(
            bid(&mut host, ALICE, Amount::from_ccd(3), at(500_000)),
            Ok(())
        );
        claim_eq!(
            view_bid(&host, ALICE),
            BidView {
                whitelisted: true,
                bid: Amount::from_ccd(7),
                ceiling: Amount::from_ccd(7),
                unclaimed: Amount::zero(),
            }
        );
        claim_eq!(view_round(&host).roster, vec![ALICE]);
    }

    #[concordium_test]
    fn test_bid_rejects() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(5),
            Amount::from_ccd(1),
        ));

        claim_eq!(
            bid(&mut host, OPERATOR, Amount::from_ccd(5), at(0)),
            Err(CustomContractError::Unauthorized)
        );
        claim_eq!(
            bid(&mut host, CAROL, Amount::from_ccd(5), at(0)),
            Err(CustomContractError::NotWhitelisted)
        );
        claim_eq!(
            bid(&mut host, ALICE, Amount::zero(), at(0)),
            Err(CustomContractError::InvalidBid)
        );
        claim_eq!(
            bid(&mut host, ALICE, Amount::from_micro_ccd(4_999_999), at(0)),
            Err(CustomContractError::BidBelowCurrentPrice)
        );
        claim_eq!(
            bid(&mut host, ALICE, Amount::from_ccd(5), at(END)),
            Err(CustomContractError::BiddingClosed)
        );

        let mut ctx = receive_ctx(ALICE, at(0), &[]);
        ctx.set_sender(Address::Contract(TOKEN_CONTRACT));
        let mut logger = TestLogger::init();
        let result = contract_bid(&ctx, &mut host, Amount::from_ccd(5), &mut logger);
        claim_eq!(result, Err(CustomContractError::OnlyAccountAddress));

        claim!(view_round(&host).roster.is_empty());
        claim_eq!(view_bid(&host, ALICE).bid, Amount::zero());
    }

    #[concordium_test]
    fn test_bid_ceiling() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(5),
            Amount::from_ccd(1),
        ));

        let params = to_bytes(&Amount::from_ccd(20));
        let ctx = receive_ctx(ALICE, at(0), &params);
        let mut logger = TestLogger::init();
        let result = contract_set_bid_ceiling(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));
        claim_eq!(
            logger.logs,
            vec![to_bytes(&AuctionEvents::ceiling(
                1,
                &ALICE,
                Amount::from_ccd(20)
            ))]
        );

        let mut logger = TestLogger::init();
        let result = contract_set_bid_ceiling(&ctx, &mut host, &mut logger);
        claim_eq!(result, Err(CustomContractError::CeilingNotIncreasing));

        claim_eq!(
            bid(&mut host, ALICE, Amount::from_ccd(20), at(0)),
            Err(CustomContractError::BidNotIncreasing)
        );
        claim_eq!(
            bid(&mut host, ALICE, Amount::from_ccd(21), at(0)),
            Ok(())
        );
        claim_eq!(view_bid(&host, ALICE).ceiling, Amount::from_ccd(21));

        claim_eq!(
            set_ceiling(&mut host, CAROL, Amount::from_ccd(30), at(0)),
            Err(CustomContractError::NotWhitelisted)
        );
        claim_eq!(view_bid(&host, CAROL).ceiling, Amount::zero());
        claim_eq!(
            set_ceiling(&mut host, OPERATOR, Amount::from_ccd(30), at(0)),
            Err(CustomContractError::Unauthorized)
        );
        claim_eq!(view_bid(&host, OPERATOR).ceiling, Amount::zero());
        claim_eq!(
            set_ceiling(&mut host, ALICE, Amount::from_ccd(30), at(END)),
            Err(CustomContractError::BiddingClosed)
        );
        claim_eq!(view_bid(&host, ALICE).ceiling, Amount::from_ccd(21));

        host.set_self_balance(Amount::from_ccd(21));
        setup_transfer(&mut host, transfer_mock(vec![(ALICE, 100)]));
        claim_eq!(end(&mut host, OPERATOR, at(END)), Ok(()));
        claim_eq!(
            set_ceiling(&mut host, ALICE, Amount::from_ccd(30), at(END)),
            Err(CustomContractError::AlreadyEnded)
        );
        claim_eq!(view_bid(&host, ALICE).ceiling, Amount::from_ccd(21));
    }

    #[concordium_test]
    fn test_late_bid_extends_deadline() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(5),
            Amount::from_ccd(1),
        ));

        let late = END - 1_000;
        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(2), at(late)), Ok(()));
        claim_eq!(view_round(&host).end, at(late + EXTENSION_WINDOW_MILLIS));

        // Closing at the original deadline is no longer possible
        claim_eq!(
            end(&mut host, OPERATOR, at(END)),
            Err(CustomContractError::AuctionStillActive)
        );
        claim_eq!(current_price(&host, at(END)), Ok(Amount::from_ccd(1)));
        claim_eq!(bid(&mut host, BOB, Amount::from_ccd(1), at(END)), Ok(()));
        claim_eq!(view_round(&host).end, at(END + EXTENSION_WINDOW_MILLIS));
    }

    /// Two equal bids split the asset evenly and the proceeds go to the operator.
    #[concordium_test]
    fn test_end_auction_even_split() {
        let config = auction_config(100, Amount::from_ccd(5), Amount::from_ccd(1));
        let mut host = started_host(&config);

        let now = at(250_000);
        let price = current_price(&host, now).expect_report("Price not available");
        claim_eq!(bid(&mut host, ALICE, price, now), Ok(()));
        claim_eq!(bid(&mut host, BOB, price, now), Ok(()));
        host.set_self_balance(Amount::from_ccd(8));

        setup_transfer(&mut host, transfer_mock(vec![(ALICE, 50), (BOB, 50)]));

        let ctx = receive_ctx(OPERATOR, at(END), &[]);
        let mut logger = TestLogger::init();
        let result = contract_end_auction(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));

        claim_eq!(
            logger.logs,
            vec![
                to_bytes(&AuctionEvents::settle(1, &ALICE, price, TokenAmountU64(50))),
                to_bytes(&AuctionEvents::settle(1, &BOB, price, TokenAmountU64(50))),
                to_bytes(&AuctionEvents::end(
                    1,
                    Amount::from_ccd(8),
                    TokenAmountU64(100),
                    Amount::from_ccd(8)
                )),
            ]
        );
        claim!(host.transfer_occurred(&OPERATOR, Amount::from_ccd(8)));
        claim_eq!(view(&host).phase, AuctionPhase::Ended);
        claim!(view_round(&host).ended);

        // Bid records survive the settlement
        claim_eq!(view_bid(&host, ALICE).bid, price);

        claim_eq!(
            end(&mut host, OPERATOR, at(END)),
            Err(CustomContractError::AlreadyEnded)
        );
    }

    #[concordium_test]
    fn test_end_auction_rejects() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(10),
            Amount::from_ccd(10),
        ));

        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(10), at(0)), Ok(()));
        host.set_self_balance(Amount::from_ccd(10));

        claim_eq!(
            end(&mut host, ALICE, at(END)),
            Err(CustomContractError::Unauthorized)
        );
        claim_eq!(
            end(&mut host, OPERATOR, at(END - 1)),
            Err(CustomContractError::AuctionStillActive)
        );

        // Token contract refusing the distribution leaves the round open
        setup_transfer(&mut host, rejecting_mock());
        claim_eq!(
            end(&mut host, OPERATOR, at(END)),
            Err(CustomContractError::AssetTransferFailed)
        );
        claim_eq!(view(&host).phase, AuctionPhase::Active);
        claim!(!host.transfer_occurred(&OPERATOR, Amount::from_ccd(10)));
    }

    #[concordium_test]
    fn test_end_auction_reserve_not_met() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(20),
            Amount::from_ccd(10),
        ));

        // Nobody manages to bid, so the total stays below the reserve
        claim_eq!(
            bid(&mut host, ALICE, Amount::from_ccd(4), at(END - 1)),
            Err(CustomContractError::BidBelowCurrentPrice)
        );
        claim_eq!(view_round(&host).end, at(END));

        let ctx = receive_ctx(OPERATOR, at(END), &[]);
        let mut logger = TestLogger::init();
        let result = contract_end_auction(&ctx, &mut host, &mut logger);
        claim_eq!(result, Err(CustomContractError::ReserveNotMet));
        claim!(logger.logs.is_empty());
        claim_eq!(view(&host).phase, AuctionPhase::Active);
        claim!(!view_round(&host).ended);
    }

    /// Settlement sweeps the whole balance, so a refund afterwards has nothing to pay out from.
    #[concordium_test]
    fn test_refund_after_settlement_fails() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(5),
            Amount::from_ccd(1),
        ));

        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(5), at(0)), Ok(()));
        claim_eq!(bid(&mut host, BOB, Amount::from_ccd(6), at(0)), Ok(()));
        host.set_self_balance(Amount::from_ccd(11));

        // 500/11 and 600/11, floored
        setup_transfer(&mut host, transfer_mock(vec![(ALICE, 45), (BOB, 54)]));
        claim_eq!(end(&mut host, OPERATOR, at(END)), Ok(()));
        claim!(host.transfer_occurred(&OPERATOR, Amount::from_ccd(11)));
        host.set_self_balance(Amount::zero());

        claim_eq!(
            refund(&mut host, ALICE, at(END)),
            Err(CustomContractError::CurrencyTransferFailed)
        );
        claim_eq!(view_bid(&host, ALICE).bid, Amount::from_ccd(5));
        claim_eq!(view_bid(&host, ALICE).ceiling, Amount::from_ccd(5));
    }

    #[concordium_test]
    fn test_refund() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(5),
            Amount::from_ccd(1),
        ));

        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(5), at(0)), Ok(()));
        claim_eq!(
            refund(&mut host, ALICE, at(0)),
            Err(CustomContractError::AuctionStillActive)
        );

        host.set_self_balance(Amount::from_ccd(5));
        setup_transfer(&mut host, transfer_mock(vec![(ALICE, 100)]));
        claim_eq!(end(&mut host, OPERATOR, at(END)), Ok(()));

        claim_eq!(
            refund(&mut host, BOB, at(END)),
            Err(CustomContractError::NothingToRefund)
        );

        // Operator pays the bid back into the contract
        host.set_self_balance(Amount::from_ccd(5));
        let ctx = receive_ctx(ALICE, at(END), &[]);
        let mut logger = TestLogger::init();
        let result = contract_refund(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));
        claim_eq!(
            logger.logs,
            vec![to_bytes(&AuctionEvents::refund(1, &ALICE, Amount::from_ccd(5)))]
        );
        claim!(host.transfer_occurred(&OPERATOR, Amount::from_ccd(5)));
        claim!(host.transfer_occurred(&ALICE, Amount::from_ccd(5)));
        claim_eq!(
            view_bid(&host, ALICE),
            BidView {
                whitelisted: true,
                bid: Amount::zero(),
                ceiling: Amount::zero(),
                unclaimed: Amount::zero(),
            }
        );
        claim_eq!(
            refund(&mut host, ALICE, at(END)),
            Err(CustomContractError::NothingToRefund)
        );
    }

    #[concordium_test]
    fn test_withdraw_remaining_assets() {
        let mut host = started_host(&auction_config(
            100,
            Amount::from_ccd(5),
            Amount::from_ccd(1),
        ));

        let ctx = receive_ctx(OPERATOR, at(END), &[]);
        let mut logger = TestLogger::init();
        let result = contract_withdraw_remaining_assets(&ctx, &mut host, &mut logger);
        claim_eq!(result, Err(CustomContractError::AuctionStillActive));

        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(5), at(0)), Ok(()));
        claim_eq!(bid(&mut host, BOB, Amount::from_ccd(6), at(0)), Ok(()));
        host.set_self_balance(Amount::from_ccd(11));
        setup_transfer(&mut host, transfer_mock(vec![(ALICE, 45), (BOB, 54)]));
        claim_eq!(end(&mut host, OPERATOR, at(END)), Ok(()));

        let ctx = receive_ctx(ALICE, at(END), &[]);
        let mut logger = TestLogger::init();
        let result = contract_withdraw_remaining_assets(&ctx, &mut host, &mut logger);
        claim_eq!(result, Err(CustomContractError::Unauthorized));

        // One unit is left over from rounding
        host.setup_mock_entrypoint(
            TOKEN_CONTRACT,
            OwnedEntrypointName::new_unchecked("balanceOf".into()),
            balance_of_mock(TokenAmountU64(1)),
        );
        setup_transfer(&mut host, transfer_mock(vec![(OPERATOR, 1)]));

        let ctx = receive_ctx(OPERATOR, at(END), &[]);
        let mut logger = TestLogger::init();
        let result = contract_withdraw_remaining_assets(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));
        claim_eq!(
            logger.logs,
            vec![to_bytes(&AuctionEvents::withdraw(
                1,
                &asset(),
                TokenAmountU64(1),
                &OPERATOR
            ))]
        );
    }

    #[concordium_test]
    fn test_next_round_starts_empty() {
        let config = auction_config(100, Amount::from_ccd(5), Amount::from_ccd(1));
        let mut host = started_host(&config);

        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(5), at(0)), Ok(()));
        host.set_self_balance(Amount::from_ccd(5));
        setup_transfer(&mut host, transfer_mock(vec![(ALICE, 100)]));
        claim_eq!(end(&mut host, OPERATOR, at(END)), Ok(()));

        let next = at(END + 1);
        claim_eq!(start(&mut host, &config, next, 100), Ok(()));

        let round = view_round(&host);
        claim_eq!(round.id, 2);
        claim!(round.roster.is_empty());
        claim_eq!(view(&host).phase, AuctionPhase::Active);
        claim_eq!(
            view_bid(&host, ALICE),
            BidView {
                whitelisted: true,
                bid: Amount::zero(),
                ceiling: Amount::from_ccd(5),
                unclaimed: Amount::zero(),
            }
        );

        // The carried over ceiling still has to be exceeded
        claim_eq!(
            bid(&mut host, ALICE, Amount::from_ccd(5), next),
            Err(CustomContractError::BidNotIncreasing)
        );
        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(6), next), Ok(()));
        claim_eq!(bid(&mut host, BOB, Amount::from_ccd(5), next), Ok(()));
        claim_eq!(view_round(&host).roster, vec![ALICE, BOB]);
    }

    /// A round that expired without being ended keeps its bids refundable, and the next settlement leaves them alone.
    #[concordium_test]
    fn test_expired_round_bids_stay_refundable() {
        let config = auction_config(100, Amount::from_ccd(5), Amount::from_ccd(1));
        let mut host = started_host(&config);

        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(5), at(0)), Ok(()));
        host.set_self_balance(Amount::from_ccd(5));

        // No endAuction for the first round
        let next = at(END + 1);
        claim_eq!(start(&mut host, &config, next, 100), Ok(()));
        claim_eq!(view(&host).unclaimed, Amount::from_ccd(5));
        claim_eq!(
            view_bid(&host, ALICE),
            BidView {
                whitelisted: true,
                bid: Amount::zero(),
                ceiling: Amount::from_ccd(5),
                unclaimed: Amount::from_ccd(5),
            }
        );

        claim_eq!(bid(&mut host, BOB, Amount::from_ccd(5), next), Ok(()));
        host.set_self_balance(Amount::from_ccd(10));
        setup_transfer(&mut host, transfer_mock(vec![(BOB, 100)]));

        let ctx = receive_ctx(OPERATOR, at(2 * END + 1), &[]);
        let mut logger = TestLogger::init();
        let result = contract_end_auction(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));
        claim_eq!(
            logger.logs.last(),
            Some(&to_bytes(&AuctionEvents::end(
                2,
                Amount::from_ccd(5),
                TokenAmountU64(100),
                Amount::from_ccd(5)
            )))
        );
        claim!(host.transfer_occurred(&OPERATOR, Amount::from_ccd(5)));
        claim!(!host.transfer_occurred(&OPERATOR, Amount::from_ccd(10)));

        let ctx = receive_ctx(ALICE, at(2 * END + 1), &[]);
        let mut logger = TestLogger::init();
        let result = contract_refund(&ctx, &mut host, &mut logger);
        claim_eq!(result, Ok(()));
        claim_eq!(
            logger.logs,
            vec![to_bytes(&AuctionEvents::refund(2, &ALICE, Amount::from_ccd(5)))]
        );
        claim!(host.transfer_occurred(&ALICE, Amount::from_ccd(5)));
        claim_eq!(view(&host).unclaimed, Amount::zero());
        claim_eq!(
            refund(&mut host, ALICE, at(2 * END + 1)),
            Err(CustomContractError::NothingToRefund)
        );
    }

    /// Unclaimed bids can be refunded while a newer round is still running.
    #[concordium_test]
    fn test_unclaimed_refund_during_next_round() {
        let config = auction_config(100, Amount::from_ccd(5), Amount::from_ccd(1));
        let mut host = started_host(&config);

        claim_eq!(bid(&mut host, ALICE, Amount::from_ccd(5), at(0)), Ok(()));
        claim_eq!(start(&mut host, &config, at(END), 100), Ok(()));
        host.set_self_balance(Amount::from_ccd(5));

        claim_eq!(
            refund(&mut host, BOB, at(END)),
            Err(CustomContractError::AuctionStillActive)
        );
        claim_eq!(refund(&mut host, ALICE, at(END)), Ok(()));
        claim!(host.transfer_occurred(&ALICE, Amount::from_ccd(5)));
        claim_eq!(view_bid(&host, ALICE).unclaimed, Amount::zero());
        // The ceiling of the replaced round still holds
        claim_eq!(view_bid(&host, ALICE).ceiling, Amount::from_ccd(5));
    }
}
