use concordium_std::concordium_cfg_test;

#[concordium_cfg_test]
pub use inner::*;

/// Mock entrypoints standing in for the CIS-2 token contract in unit tests.
#[concordium_cfg_test]
mod inner {
    use crate::{ContractBalanceOfQueryParams, ContractTokenAmount};
    use concordium_cis2::BalanceOfQueryResponse;
    use concordium_std::test_infrastructure::MockFn;
    use concordium_std::*;

    /// Accept any parameter that parses as `D` and answer with `return_value`.
    pub fn parse_and_ok_mock<D: Deserial, S>(
        return_value: impl Clone + Serial + 'static,
    ) -> MockFn<S> {
        MockFn::new(move |parameter, _amount, _balance, _state| {
            D::deserial(&mut Cursor::new(parameter.as_ref())).map_err(|_| CallContractError::Trap)?;
            Ok((false, Some(return_value.clone())))
        })
    }

    /// Like [`parse_and_ok_mock`], but trap unless `check` accepts the parsed parameter.
    pub fn parse_and_check_mock<D: Deserial, S>(
        check: impl Fn(&D) -> bool + 'static,
        return_value: impl Clone + Serial + 'static,
    ) -> MockFn<S> {
        MockFn::new(move |parameter, _, _, _state| {
            let value =
                D::deserial(&mut Cursor::new(parameter.as_ref())).map_err(|_| CallContractError::Trap)?;
            if !check(&value) {
                return Err(CallContractError::Trap);
            };
            Ok((false, Some(return_value.clone())))
        })
    }

    /// Answer every `balanceOf` query with `amount`.
    pub fn balance_of_mock<S>(amount: ContractTokenAmount) -> MockFn<S> {
        MockFn::new_v1(move |parameter, _, _, _state| {
            let params = ContractBalanceOfQueryParams::deserial(&mut Cursor::new(parameter.as_ref()))
                .map_err(|_| CallContractError::Trap)?;
            Ok((
                false,
                BalanceOfQueryResponse(params.queries.iter().map(|_| amount).collect()),
            ))
        })
    }

    /// Fail every call, as a token contract refusing a transfer would.
    pub fn rejecting_mock<S>() -> MockFn<S> {
        MockFn::new(move |_parameter, _, _, _state| {
            Err::<(bool, Option<()>), _>(CallContractError::Trap)
        })
    }
}
