use crate::{ContractResult, CustomContractError};
use concordium_std::*;

/// Upper bound on accounts in a single whitelist update. Every changed account is logged, so this keeps an update
/// inside the event budget of one invocation.
pub const MAX_WHITELIST_BATCH: usize = 50;

#[derive(Debug, Serial, DeserialWithState, StateClone)]
#[concordium(state_parameter = "S")]
pub struct Whitelist<S: HasStateApi> {
    /// Accounts that are allowed to take part in auctions
    accounts: StateSet<AccountAddress, S>,
}

impl<S: HasStateApi> Whitelist<S> {
    pub fn new(state_builder: &mut StateBuilder<S>) -> Self {
        Self {
            accounts: state_builder.new_set(),
        }
    }

    pub fn contains(&self, account: &AccountAddress) -> bool {
        self.accounts.contains(account)
    }

    /// Apply the update and return the accounts whose membership actually changed, in parameter order.
    pub fn handle_update(
        &mut self,
        kind: WhitelistUpdateKind,
        accounts: &[AccountAddress],
    ) -> ContractResult<Vec<AccountAddress>> {
        ensure!(
            accounts.len() <= MAX_WHITELIST_BATCH,
            CustomContractError::BatchTooLarge
        );

        let mut changed = Vec::new();
        for account in accounts {
            let updated = match kind {
                WhitelistUpdateKind::Add => self.accounts.insert(*account),
                WhitelistUpdateKind::Remove => self.accounts.remove(account),
            };
            if updated {
                changed.push(*account);
            }
        }

        Ok(changed)
    }

    pub fn handle_view(&self, view: WhitelistViewParams) -> Vec<AccountAddress> {
        self.accounts
            .iter()
            .skip(view.skip as usize)
            .take(view.show as usize)
            .map(|a| *a)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, SchemaType, Serialize, PartialEq, Eq)]
pub enum WhitelistUpdateKind {
    Remove,
    Add,
}

#[derive(Debug, SchemaType, Serialize)]
pub struct WhitelistParams {
    pub accounts: Vec<AccountAddress>,
}

#[derive(Debug, SchemaType, Serialize)]
pub struct WhitelistViewParams {
    pub skip: u32,
    pub show: u32,
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use concordium_std::test_infrastructure::*;

    const USER_1: AccountAddress = AccountAddress([16; 32]);
    const USER_2: AccountAddress = AccountAddress([17; 32]);
    const USER_3: AccountAddress = AccountAddress([18; 32]);

    fn default_whitelist() -> Whitelist<TestStateApi> {
        let mut state_builder = TestStateBuilder::new();

        let mut whitelist = Whitelist::new(&mut state_builder);
        whitelist.accounts.insert(USER_1);

        whitelist
    }

    #[concordium_test]
    fn test_whitelist_add() {
        let mut whitelist = default_whitelist();

        let result = whitelist.handle_update(WhitelistUpdateKind::Add, &[USER_1, USER_2, USER_2]);

        // USER_1 was already listed and the second USER_2 is a repeat
        claim_eq!(result, Ok(vec![USER_2]));
        claim!(whitelist.contains(&USER_1));
        claim!(whitelist.contains(&USER_2));
        claim!(!whitelist.contains(&USER_3));
    }

    #[concordium_test]
    fn test_whitelist_remove() {
        let mut whitelist = default_whitelist();

        let result = whitelist.handle_update(WhitelistUpdateKind::Remove, &[USER_1, USER_3]);

        claim_eq!(result, Ok(vec![USER_1]));
        claim!(!whitelist.contains(&USER_1));
    }

    #[concordium_test]
    fn test_whitelist_batch_too_large() {
        let mut whitelist = default_whitelist();
        let accounts: Vec<AccountAddress> = (0..=MAX_WHITELIST_BATCH)
            .map(|i| AccountAddress([i as u8; 32]))
            .collect();

        let result = whitelist.handle_update(WhitelistUpdateKind::Add, &accounts);

        claim_eq!(result, Err(CustomContractError::BatchTooLarge));
        claim!(!whitelist.contains(&AccountAddress([0; 32])));
    }

    #[concordium_test]
    fn test_whitelist_view() {
        let mut whitelist = default_whitelist();
        whitelist
            .handle_update(WhitelistUpdateKind::Add, &[USER_2, USER_3])
            .expect_report("Whitelist update failed");

        let all = whitelist.handle_view(WhitelistViewParams { skip: 0, show: 10 });
        claim_eq!(all.len(), 3);
        claim!(all.contains(&USER_1));
        claim!(all.contains(&USER_2));
        claim!(all.contains(&USER_3));

        let page = whitelist.handle_view(WhitelistViewParams { skip: 1, show: 1 });
        claim_eq!(page.len(), 1);

        let empty = whitelist.handle_view(WhitelistViewParams { skip: 3, show: 10 });
        claim!(empty.is_empty());
    }
}
