/// Host ledger abstraction
///
/// Every value movement the presale core performs (attached native value on
/// invest, token pre-funding on creation, token payout on claim, fund
/// withdrawal) goes through the [`Ledger`] trait. The presale core never
/// keeps balances of its own beyond its accounting records.
pub mod memory;

pub use memory::InMemoryLedger;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by the host ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient balance: {account} holds {available}, needs {required}")]
    InsufficientBalance {
        account: Address,
        available: U256,
        required: U256,
    },

    #[error("insufficient allowance: {spender} may spend {available} of {owner}, needs {required}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        available: U256,
        required: U256,
    },

    #[error("unknown token {0}")]
    UnknownToken(Address),

    #[error("balance overflow")]
    Overflow,
}

/// ERC-20 style token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

/// Balance and transfer semantics of the chain a sale lives on.
///
/// Native currency is addressed implicitly; tokens are addressed by their
/// contract address.
pub trait Ledger: Send + Sync {
    /// Address the next contract deployed by `deployer` will live at
    fn allocate_contract_address(&self, deployer: Address) -> Address;

    /// Native currency balance of an account
    fn native_balance(&self, who: Address) -> U256;

    /// Move native currency between accounts
    fn transfer_native(&self, from: Address, to: Address, amount: U256)
        -> Result<(), LedgerError>;

    /// Token balance of an account
    fn token_balance(&self, token: Address, who: Address) -> Result<U256, LedgerError>;

    /// Move tokens out of `from`, authorized by `from` itself
    fn transfer_token(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError>;

    /// Move tokens out of `from` using an allowance granted to `spender`
    fn transfer_token_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError>;
}
