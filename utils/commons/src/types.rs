use super::*;

pub type ContractResult<A> = Result<A, CustomContractError>;

/// Token ID type of the auctioned CIS-2 token.
pub type ContractTokenId = TokenIdVec;

/// Token amount type of the auctioned CIS-2 token.
pub type ContractTokenAmount = TokenAmountU64;

pub type TransferParameter = TransferParams<ContractTokenId, ContractTokenAmount>;

/// Parameter type for the CIS-2 function `balanceOf` specialized to the subset
/// of TokenIDs used by the auction.
pub type ContractBalanceOfQueryParams = BalanceOfQueryParams<ContractTokenId>;

/// Response type for the CIS-2 function `balanceOf` specialized to the subset
/// of TokenAmounts used by the auction.
pub type ContractBalanceOfQueryResponse = BalanceOfQueryResponse<ContractTokenAmount>;
