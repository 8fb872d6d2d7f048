//! Sale instance
//!
//! A [`Sale`] is the per-instance storage of one presale: contributions,
//! claim flags and the native balance the owner can withdraw. Its methods
//! are pure state transitions; [`SaleHandle`] couples them with the host
//! ledger.
//!
//! Every value-moving operation runs in three steps: mark the state under
//! the instance lock, release the lock and perform the transfer, then
//! compensate if the transfer failed. A ledger that calls back into the
//! same sale during a transfer therefore sees the already-marked state.
//!
//! An investment's cap reservation is held while its native transfer is in
//! flight. A concurrent investment that only fits once that reservation is
//! released gets `ERR_HARD_CAP_EXCEEDED` and has to be retried.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::types::{
    token_allocation, InvestorPosition, PresaleEvent, ProjectDetails, SaleInfo, SaleParams,
    SaleStatus,
};
use crate::error::Error;
use crate::ledger::Ledger;

/// What a claim consumed, kept so a failed payout can be undone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClaimReceipt {
    pub(crate) contribution: U256,
    pub(crate) tokens: U256,
    pub(crate) first_claim: bool,
}

/// Storage of a single sale instance
#[derive(Debug, Clone)]
pub struct Sale {
    address: Address,
    implementation: Address,
    initialized: bool,
    owner: Address,
    exchange_rate: U256,
    hard_cap: U256,
    total_raised: U256,
    sale_token: Address,
    project_details: ProjectDetails,
    contributions: BTreeMap<Address, U256>,
    claimed: BTreeSet<Address>,
    balance: U256,
    total_withdrawn: U256,
    total_claimed_tokens: U256,
    created_at: DateTime<Utc>,
}

impl Sale {
    /// Fresh, uninitialized copy of `implementation` living at `address`
    pub fn clone_of(implementation: Address, address: Address) -> Self {
        Self {
            address,
            implementation,
            initialized: false,
            owner: Address::ZERO,
            exchange_rate: U256::ZERO,
            hard_cap: U256::ZERO,
            total_raised: U256::ZERO,
            sale_token: Address::ZERO,
            project_details: ProjectDetails::default(),
            contributions: BTreeMap::new(),
            claimed: BTreeSet::new(),
            balance: U256::ZERO,
            total_withdrawn: U256::ZERO,
            total_claimed_tokens: U256::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Set the sale parameters. Allowed exactly once.
    pub fn initialize(&mut self, params: SaleParams) -> Result<(), Error> {
        if self.initialized {
            return Err(Error::AlreadyInitialized);
        }
        params.validate()?;

        self.owner = params.owner;
        self.exchange_rate = params.exchange_rate;
        self.hard_cap = params.hard_cap;
        self.sale_token = params.sale_token;
        self.project_details = params.project_details;
        self.initialized = true;
        Ok(())
    }

    /// Book `amount` against the cap. Returns the new raised total.
    ///
    /// The investor's contribution and the native balance are credited by
    /// [`Sale::settle_investment`] once the value has actually arrived, so a
    /// pending investment can never be claimed against. Until then the
    /// reservation counts against the cap for every other investor.
    pub(crate) fn reserve_investment(&mut self, amount: U256) -> Result<U256, Error> {
        if amount.is_zero() {
            return Err(Error::ZeroBuyAmount);
        }
        let raised = self
            .total_raised
            .checked_add(amount)
            .ok_or(Error::HardCapExceeded)?;
        if raised > self.hard_cap {
            return Err(Error::HardCapExceeded);
        }

        self.total_raised = raised;
        Ok(raised)
    }

    pub(crate) fn settle_investment(&mut self, investor: Address, amount: U256) {
        *self.contributions.entry(investor).or_default() += amount;
        self.balance += amount;
    }

    /// Release a reservation whose value never arrived
    pub(crate) fn revert_investment(&mut self, amount: U256) {
        self.total_raised = self.total_raised.saturating_sub(amount);
    }

    /// Consume the investor's unclaimed contribution.
    ///
    /// Returns the contribution consumed and the tokens it converts into.
    /// Raised total and balance are untouched; the native value stays with
    /// the sale for the owner.
    pub(crate) fn mark_claim(&mut self, investor: Address) -> Result<ClaimReceipt, Error> {
        let contribution = self.contribution_of(investor);
        if contribution.is_zero() {
            return Err(Error::NoTokensToClaim);
        }
        let tokens = token_allocation(contribution, self.exchange_rate)?;
        if tokens.is_zero() {
            return Err(Error::NoTokensToClaim);
        }

        self.contributions.insert(investor, U256::ZERO);
        let first_claim = self.claimed.insert(investor);
        self.total_claimed_tokens += tokens;
        Ok(ClaimReceipt {
            contribution,
            tokens,
            first_claim,
        })
    }

    /// Give back a contribution whose payout failed
    pub(crate) fn revert_claim(&mut self, investor: Address, receipt: ClaimReceipt) {
        *self.contributions.entry(investor).or_default() += receipt.contribution;
        if receipt.first_claim {
            self.claimed.remove(&investor);
        }
        self.total_claimed_tokens = self.total_claimed_tokens.saturating_sub(receipt.tokens);
    }

    /// Zero the withdrawable balance and return what was in it
    pub(crate) fn mark_withdraw(&mut self, caller: Address) -> Result<U256, Error> {
        if caller != self.owner {
            return Err(Error::CallerNotOwner);
        }
        let amount = self.balance;
        self.balance = U256::ZERO;
        self.total_withdrawn += amount;
        Ok(amount)
    }

    pub(crate) fn revert_withdraw(&mut self, amount: U256) {
        self.balance += amount;
        self.total_withdrawn = self.total_withdrawn.saturating_sub(amount);
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn implementation(&self) -> Address {
        self.implementation
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn exchange_rate(&self) -> U256 {
        self.exchange_rate
    }

    pub fn hard_cap(&self) -> U256 {
        self.hard_cap
    }

    pub fn total_raised(&self) -> U256 {
        self.total_raised
    }

    pub fn sale_token(&self) -> Address {
        self.sale_token
    }

    pub fn project_details(&self) -> &ProjectDetails {
        &self.project_details
    }

    pub fn balance(&self) -> U256 {
        self.balance
    }

    /// Contribution not yet converted into tokens
    pub fn contribution_of(&self, investor: Address) -> U256 {
        self.contributions.get(&investor).copied().unwrap_or_default()
    }

    /// Whether the investor has claimed at least once
    pub fn has_claimed(&self, investor: Address) -> bool {
        self.claimed.contains(&investor)
    }

    pub fn remaining_capacity(&self) -> U256 {
        self.hard_cap.saturating_sub(self.total_raised)
    }

    pub fn is_cap_reached(&self) -> bool {
        self.initialized && self.total_raised == self.hard_cap
    }

    pub fn status(&self) -> SaleStatus {
        if !self.initialized {
            SaleStatus::Created
        } else if self.is_cap_reached() {
            SaleStatus::CapReached
        } else {
            SaleStatus::Accepting
        }
    }

    /// Tokens the investor's current contribution converts into
    pub fn tokens_for(&self, investor: Address) -> Result<U256, Error> {
        token_allocation(self.contribution_of(investor), self.exchange_rate)
    }

    /// Everyone who has invested, including fully claimed investors
    pub fn investors(&self) -> Vec<Address> {
        self.contributions.keys().copied().collect()
    }

    pub fn position(&self, investor: Address) -> Result<InvestorPosition, Error> {
        Ok(InvestorPosition {
            investor,
            contributed: self.contribution_of(investor),
            tokens_allocated: self.tokens_for(investor)?,
            claimed: self.has_claimed(investor),
        })
    }

    pub fn info(&self) -> SaleInfo {
        SaleInfo {
            address: self.address,
            implementation: self.implementation,
            owner: self.owner,
            sale_token: self.sale_token,
            exchange_rate: self.exchange_rate,
            hard_cap: self.hard_cap,
            total_raised: self.total_raised,
            remaining_capacity: self.remaining_capacity(),
            balance: self.balance,
            total_withdrawn: self.total_withdrawn,
            total_claimed_tokens: self.total_claimed_tokens,
            investor_count: self.contributions.len() as u64,
            status: self.status(),
            project_details: self.project_details.clone(),
            created_at: self.created_at,
        }
    }
}

/// A live sale instance bound to the host ledger.
///
/// Handles are cheap to clone; all clones share the same storage.
pub struct SaleHandle<L: Ledger> {
    state: Arc<Mutex<Sale>>,
    ledger: Arc<L>,
    events: broadcast::Sender<PresaleEvent>,
}

impl<L: Ledger> Clone for SaleHandle<L> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            ledger: self.ledger.clone(),
            events: self.events.clone(),
        }
    }
}

impl<L: Ledger> std::fmt::Debug for SaleHandle<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sale = self.state.lock();
        f.debug_struct("SaleHandle")
            .field("address", &sale.address)
            .field("total_raised", &sale.total_raised)
            .field("hard_cap", &sale.hard_cap)
            .finish()
    }
}

impl<L: Ledger> SaleHandle<L> {
    pub(crate) fn new(
        state: Arc<Mutex<Sale>>,
        ledger: Arc<L>,
        events: broadcast::Sender<PresaleEvent>,
    ) -> Self {
        Self {
            state,
            ledger,
            events,
        }
    }

    /// Contribute `amount` of native currency from `investor`
    pub fn invest(&self, investor: Address, amount: U256) -> Result<(), Error> {
        let (sale, total_raised, cap_reached) = {
            let mut state = self.state.lock();
            let total_raised = state.reserve_investment(amount)?;
            (state.address, total_raised, total_raised == state.hard_cap)
        };

        if let Err(err) = self.ledger.transfer_native(investor, sale, amount) {
            self.state.lock().revert_investment(amount);
            warn!("Investment of {} from {} into {} failed: {}", amount, investor, sale, err);
            return Err(err.into());
        }
        self.state.lock().settle_investment(investor, amount);

        info!(%sale, %investor, %amount, %total_raised, "Investment accepted");
        let _ = self.events.send(PresaleEvent::Invested {
            sale,
            investor,
            amount,
            total_raised,
        });
        if cap_reached {
            info!(%sale, "Hard cap reached");
            let _ = self.events.send(PresaleEvent::HardCapReached {
                sale,
                final_investor: investor,
            });
        }
        Ok(())
    }

    /// Convert the investor's unclaimed contribution into sale tokens.
    ///
    /// Investing again afterwards opens a new claim. Returns the token amount
    /// transferred.
    pub fn claim(&self, investor: Address) -> Result<U256, Error> {
        let (sale, token, receipt) = {
            let mut state = self.state.lock();
            let receipt = state.mark_claim(investor)?;
            (state.address, state.sale_token, receipt)
        };
        let tokens = receipt.tokens;

        if let Err(err) = self.ledger.transfer_token(token, sale, investor, tokens) {
            self.state.lock().revert_claim(investor, receipt);
            warn!("Claim of {} tokens by {} from {} failed: {}", tokens, investor, sale, err);
            return Err(err.into());
        }

        info!(%sale, %investor, %tokens, "Tokens claimed");
        let _ = self.events.send(PresaleEvent::TokensClaimed {
            sale,
            investor,
            amount: tokens,
        });
        Ok(tokens)
    }

    /// Send the whole native balance to the sale owner.
    ///
    /// Returns the amount transferred; zero when there was nothing to send.
    pub fn withdraw(&self, caller: Address) -> Result<U256, Error> {
        let (sale, owner, amount) = {
            let mut state = self.state.lock();
            let amount = state.mark_withdraw(caller)?;
            (state.address, state.owner, amount)
        };

        if amount.is_zero() {
            debug!("Nothing to withdraw from {}", sale);
            return Ok(U256::ZERO);
        }

        if let Err(err) = self.ledger.transfer_native(sale, owner, amount) {
            self.state.lock().revert_withdraw(amount);
            warn!("Withdrawal of {} from {} failed: {}", amount, sale, err);
            return Err(err.into());
        }

        info!(%sale, %owner, %amount, "Funds withdrawn");
        let _ = self.events.send(PresaleEvent::FundsWithdrawn {
            sale,
            owner,
            amount,
        });
        Ok(amount)
    }

    pub fn address(&self) -> Address {
        self.state.lock().address()
    }

    pub fn owner(&self) -> Address {
        self.state.lock().owner()
    }

    pub fn total_raised(&self) -> U256 {
        self.state.lock().total_raised()
    }

    pub fn hard_cap(&self) -> U256 {
        self.state.lock().hard_cap()
    }

    pub fn exchange_rate(&self) -> U256 {
        self.state.lock().exchange_rate()
    }

    pub fn sale_token(&self) -> Address {
        self.state.lock().sale_token()
    }

    pub fn balance(&self) -> U256 {
        self.state.lock().balance()
    }

    pub fn remaining_capacity(&self) -> U256 {
        self.state.lock().remaining_capacity()
    }

    pub fn is_cap_reached(&self) -> bool {
        self.state.lock().is_cap_reached()
    }

    pub fn contribution_of(&self, investor: Address) -> U256 {
        self.state.lock().contribution_of(investor)
    }

    pub fn has_claimed(&self, investor: Address) -> bool {
        self.state.lock().has_claimed(investor)
    }

    pub fn tokens_for(&self, investor: Address) -> Result<U256, Error> {
        self.state.lock().tokens_for(investor)
    }

    pub fn project_details(&self) -> ProjectDetails {
        self.state.lock().project_details().clone()
    }

    pub fn investors(&self) -> Vec<Address> {
        self.state.lock().investors()
    }

    pub fn position(&self, investor: Address) -> Result<InvestorPosition, Error> {
        self.state.lock().position(investor)
    }

    pub fn info(&self) -> SaleInfo {
        self.state.lock().info()
    }
}
