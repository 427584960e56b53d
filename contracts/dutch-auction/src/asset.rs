use commons::{
    ContractBalanceOfQueryParams, ContractBalanceOfQueryResponse, ContractResult,
    ContractTokenAmount, CustomContractError, Token, TransferParameter,
};
use concordium_cis2::{AdditionalData, BalanceOfQuery, Receiver, Transfer, TransferParams};
use concordium_std::*;

/// Balance of `owner` in the CIS-2 contract of `token`.
pub fn balance_of<T>(
    host: &impl HasHost<T>,
    token: &Token,
    owner: Address,
) -> ContractResult<ContractTokenAmount> {
    let params = ContractBalanceOfQueryParams {
        queries: vec![BalanceOfQuery {
            token_id: token.id.clone(),
            address: owner,
        }],
    };

    let mut response = host
        .invoke_contract_read_only(
            &token.contract,
            &params,
            EntrypointName::new_unchecked("balanceOf"),
            Amount::zero(),
        )
        .map_err(handle_call_error)?
        .ok_or(CustomContractError::AssetLedgerIncompatible)?;

    let ContractBalanceOfQueryResponse(amounts) =
        ContractBalanceOfQueryResponse::deserial(&mut response)
            .map_err(|_| CustomContractError::AssetLedgerIncompatible)?;

    amounts
        .first()
        .copied()
        .ok_or(CustomContractError::AssetLedgerIncompatible)
}

/// Transfer `token` from `from` to every account in `payouts` with a single `transfer` call.
pub fn transfer<T>(
    host: &mut impl HasHost<T>,
    token: &Token,
    from: Address,
    payouts: &[(AccountAddress, ContractTokenAmount)],
) -> ContractResult<()> {
    if payouts.is_empty() {
        return Ok(());
    }

    let params: TransferParameter = TransferParams(
        payouts
            .iter()
            .map(|(to, amount)| Transfer {
                token_id: token.id.clone(),
                amount: *amount,
                from,
                to: Receiver::Account(*to),
                data: AdditionalData::empty(),
            })
            .collect(),
    );

    host.invoke_contract(
        &token.contract,
        &params,
        EntrypointName::new_unchecked("transfer"),
        Amount::zero(),
    )
    .map_err(handle_call_error)?;

    Ok(())
}

fn handle_call_error<R>(error: CallContractError<R>) -> CustomContractError {
    match error {
        CallContractError::MissingContract
        | CallContractError::MissingEntrypoint
        | CallContractError::MessageFailed => CustomContractError::AssetLedgerIncompatible,
        _ => CustomContractError::AssetTransferFailed,
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use commons::test::*;
    use concordium_cis2::{TokenAmountU64, TokenIdVec};
    use concordium_std::test_infrastructure::*;

    const TOKEN_CONTRACT: ContractAddress = ContractAddress {
        index: 1,
        subindex: 0,
    };
    const SELF_ADDRESS: ContractAddress = ContractAddress {
        index: 2,
        subindex: 0,
    };

    const USER_1: AccountAddress = AccountAddress([1; 32]);
    const USER_2: AccountAddress = AccountAddress([2; 32]);

    fn token() -> Token {
        Token {
            contract: TOKEN_CONTRACT,
            id: TokenIdVec(vec![1]),
        }
    }

    #[concordium_test]
    fn test_balance_of() {
        let mut host = TestHost::new((), TestStateBuilder::new());

        host.setup_mock_entrypoint(
            TOKEN_CONTRACT,
            OwnedEntrypointName::new_unchecked("balanceOf".into()),
            balance_of_mock(TokenAmountU64(42)),
        );

        let balance = balance_of(&host, &token(), Address::Contract(SELF_ADDRESS));

        claim_eq!(balance, Ok(TokenAmountU64(42)));
    }

    #[concordium_test]
    fn test_balance_of_empty_response() {
        let mut host = TestHost::new((), TestStateBuilder::new());

        host.setup_mock_entrypoint(
            TOKEN_CONTRACT,
            OwnedEntrypointName::new_unchecked("balanceOf".into()),
            parse_and_ok_mock::<ContractBalanceOfQueryParams, _>(0u16),
        );

        let balance = balance_of(&host, &token(), Address::Contract(SELF_ADDRESS));

        claim_eq!(balance, Err(CustomContractError::AssetLedgerIncompatible));
    }

    #[concordium_test]
    fn test_transfer_batches_payouts() {
        let mut host = TestHost::new((), TestStateBuilder::new());

        host.setup_mock_entrypoint(
            TOKEN_CONTRACT,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            parse_and_check_mock::<TransferParameter, _>(
                |params| {
                    params.0.len() == 2
                        && params.0.iter().all(|t| {
                            t.from == Address::Contract(SELF_ADDRESS)
                                && t.token_id == TokenIdVec(vec![1])
                        })
                        && params.0[0].to.address() == Address::Account(USER_1)
                        && params.0[0].amount == TokenAmountU64(30)
                        && params.0[1].to.address() == Address::Account(USER_2)
                        && params.0[1].amount == TokenAmountU64(12)
                },
                (),
            ),
        );

        let result = transfer(
            &mut host,
            &token(),
            Address::Contract(SELF_ADDRESS),
            &[(USER_1, TokenAmountU64(30)), (USER_2, TokenAmountU64(12))],
        );

        claim_eq!(result, Ok(()));
    }

    #[concordium_test]
    fn test_transfer_without_payouts() {
        // No mock is set up, so any call would fail
        let mut host = TestHost::new((), TestStateBuilder::new());

        let result = transfer(&mut host, &token(), Address::Contract(SELF_ADDRESS), &[]);

        claim_eq!(result, Ok(()));
    }

    #[concordium_test]
    fn test_transfer_rejected() {
        let mut host = TestHost::new((), TestStateBuilder::new());

        host.setup_mock_entrypoint(
            TOKEN_CONTRACT,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            rejecting_mock(),
        );

        let result = transfer(
            &mut host,
            &token(),
            Address::Contract(SELF_ADDRESS),
            &[(USER_1, TokenAmountU64(1))],
        );

        claim_eq!(result, Err(CustomContractError::AssetTransferFailed));
    }
}
