//! In-memory host ledger
//!
//! Stands in for the chain during tests, local simulation and the CLI.
//! Contract addresses are derived the way CREATE derives them
//! (`keccak(rlp(deployer, nonce))`), so every deployment gets a fresh,
//! deterministic address.

use alloy_primitives::{Address, U256};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::debug;

use super::{Ledger, LedgerError, TokenMetadata};

#[derive(Debug, Default)]
struct TokenState {
    metadata: TokenMetadata,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            symbol: String::new(),
            decimals: 18,
            total_supply: U256::ZERO,
        }
    }
}

impl TokenState {
    fn balance(&self, who: &Address) -> U256 {
        self.balances.get(who).copied().unwrap_or_default()
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        let available = self.balance(&from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                available,
                required: amount,
            });
        }
        if from == to || amount.is_zero() {
            return Ok(());
        }
        let credited = self
            .balance(&to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert(from, available - amount);
        self.balances.insert(to, credited);
        Ok(())
    }
}

/// Ledger holding native balances and ERC-20 style tokens in memory
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    native: RwLock<HashMap<Address, U256>>,
    tokens: RwLock<HashMap<Address, TokenState>>,
    nonces: Mutex<HashMap<Address, u64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit native currency to an account out of thin air
    pub fn fund(&self, who: Address, amount: U256) -> Result<(), LedgerError> {
        let mut native = self.native.write();
        let balance = native.entry(who).or_default();
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Sum of all native balances
    pub fn total_native(&self) -> U256 {
        self.native
            .read()
            .values()
            .fold(U256::ZERO, |acc, v| acc.saturating_add(*v))
    }

    /// Deploy a token, minting the whole initial supply to the deployer
    pub fn deploy_token(
        &self,
        deployer: Address,
        name: &str,
        symbol: &str,
        decimals: u8,
        initial_supply: U256,
    ) -> Address {
        let address = self.allocate_contract_address(deployer);
        let mut state = TokenState {
            metadata: TokenMetadata {
                name: name.to_string(),
                symbol: symbol.to_string(),
                decimals,
                total_supply: initial_supply,
            },
            ..Default::default()
        };
        state.balances.insert(deployer, initial_supply);
        self.tokens.write().insert(address, state);
        debug!("Deployed token {} ({}) at {}", name, symbol, address);
        address
    }

    pub fn token_metadata(&self, token: Address) -> Result<TokenMetadata, LedgerError> {
        self.tokens
            .read()
            .get(&token)
            .map(|t| t.metadata.clone())
            .ok_or(LedgerError::UnknownToken(token))
    }

    pub fn mint(&self, token: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        let mut tokens = self.tokens.write();
        let state = tokens.get_mut(&token).ok_or(LedgerError::UnknownToken(token))?;
        let supply = state
            .metadata
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let balance = state.balance(&to).checked_add(amount).ok_or(LedgerError::Overflow)?;
        state.metadata.total_supply = supply;
        state.balances.insert(to, balance);
        Ok(())
    }

    /// Set the amount `spender` may move out of `owner`'s balance
    pub fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let mut tokens = self.tokens.write();
        let state = tokens.get_mut(&token).ok_or(LedgerError::UnknownToken(token))?;
        state.allowances.insert((owner, spender), amount);
        Ok(())
    }

    pub fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, LedgerError> {
        let tokens = self.tokens.read();
        let state = tokens.get(&token).ok_or(LedgerError::UnknownToken(token))?;
        Ok(state
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default())
    }
}

impl Ledger for InMemoryLedger {
    fn allocate_contract_address(&self, deployer: Address) -> Address {
        let mut nonces = self.nonces.lock();
        let nonce = nonces.entry(deployer).or_insert(0);
        let address = deployer.create(*nonce);
        *nonce += 1;
        address
    }

    fn native_balance(&self, who: Address) -> U256 {
        self.native.read().get(&who).copied().unwrap_or_default()
    }

    fn transfer_native(&self, from: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        let mut native = self.native.write();
        let available = native.get(&from).copied().unwrap_or_default();
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                available,
                required: amount,
            });
        }
        if from == to || amount.is_zero() {
            return Ok(());
        }
        let credited = native
            .get(&to)
            .copied()
            .unwrap_or_default()
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        native.insert(from, available - amount);
        native.insert(to, credited);
        Ok(())
    }

    fn token_balance(&self, token: Address, who: Address) -> Result<U256, LedgerError> {
        self.tokens
            .read()
            .get(&token)
            .map(|t| t.balance(&who))
            .ok_or(LedgerError::UnknownToken(token))
    }

    fn transfer_token(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let mut tokens = self.tokens.write();
        let state = tokens.get_mut(&token).ok_or(LedgerError::UnknownToken(token))?;
        state.move_balance(from, to, amount)
    }

    fn transfer_token_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let mut tokens = self.tokens.write();
        let state = tokens.get_mut(&token).ok_or(LedgerError::UnknownToken(token))?;

        let allowed = state
            .allowances
            .get(&(from, spender))
            .copied()
            .unwrap_or_default();
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: from,
                spender,
                available: allowed,
                required: amount,
            });
        }

        state.move_balance(from, to, amount)?;

        // An allowance of U256::MAX is treated as unlimited
        if allowed != U256::MAX {
            state.allowances.insert((from, spender), allowed - amount);
        }
        Ok(())
    }
}
