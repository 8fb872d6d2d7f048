/// Presale-specific types and structures
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One whole unit of native currency (18 decimals)
pub const NATIVE_UNIT: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Native currency decimals
pub const NATIVE_DECIMALS: u8 = 18;

/// Token amount owed for a native contribution.
///
/// `exchange_rate` is expressed in sale-token base units per whole unit of
/// native currency, so the result is `contribution * exchange_rate / 10^18`,
/// rounded down.
pub fn token_allocation(contribution: U256, exchange_rate: U256) -> Result<U256, Error> {
    contribution
        .checked_mul(exchange_rate)
        .map(|scaled| scaled / NATIVE_UNIT)
        .ok_or(Error::Overflow)
}

/// Descriptive metadata attached to a sale at creation. Never affects
/// accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectDetails {
    pub logo_url: String,
    pub banner_url: String,
    pub website_url: String,
    pub telegram_url: String,
    pub github_url: String,
    pub twitter_url: String,
    pub discord_url: String,
    pub youtube_presentation_video_url: String,
    pub whitelist_contest_url: String,
    pub reddit_url: String,
    pub project_description: String,
}

impl ProjectDetails {
    /// Details carrying only a description
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            project_description: description.into(),
            ..Default::default()
        }
    }
}

/// Parameters a sale instance is initialized with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleParams {
    pub owner: Address,
    pub exchange_rate: U256,
    pub hard_cap: U256,
    pub sale_token: Address,
    pub project_details: ProjectDetails,
}

impl SaleParams {
    /// Reject parameters no sale could operate with
    pub fn validate(&self) -> Result<(), Error> {
        if self.owner == Address::ZERO || self.sale_token == Address::ZERO {
            return Err(Error::ZeroAddress);
        }
        if self.hard_cap.is_zero() {
            return Err(Error::ZeroHardCap);
        }
        if self.exchange_rate.is_zero() {
            return Err(Error::ZeroExchangeRate);
        }
        Ok(())
    }

    /// Tokens the sale must hold to honour every claim once the cap is hit
    pub fn required_token_supply(&self) -> Result<U256, Error> {
        token_allocation(self.hard_cap, self.exchange_rate)
    }
}

/// Coarse sale status derived from the raised total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Cloned but not yet initialized
    Created,
    /// Raised total below the hard cap
    Accepting,
    /// Raised total equals the hard cap; every invest fails
    CapReached,
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaleStatus::Created => write!(f, "Created"),
            SaleStatus::Accepting => write!(f, "Accepting"),
            SaleStatus::CapReached => write!(f, "CapReached"),
        }
    }
}

/// Read-only snapshot of a sale instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleInfo {
    pub address: Address,
    pub implementation: Address,
    pub owner: Address,
    pub sale_token: Address,
    pub exchange_rate: U256,
    pub hard_cap: U256,
    pub total_raised: U256,
    pub remaining_capacity: U256,
    /// Native currency currently held by the sale
    pub balance: U256,
    pub total_withdrawn: U256,
    pub total_claimed_tokens: U256,
    pub investor_count: u64,
    pub status: SaleStatus,
    pub project_details: ProjectDetails,
    pub created_at: DateTime<Utc>,
}

/// Per-investor position in a sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorPosition {
    pub investor: Address,
    /// Contribution not yet converted into tokens
    pub contributed: U256,
    pub tokens_allocated: U256,
    /// Claimed at least once
    pub claimed: bool,
}

/// Committed state changes, published to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresaleEvent {
    TemplateUpdated {
        previous: Address,
        current: Address,
    },
    OwnershipTransferred {
        previous: Address,
        current: Address,
    },
    PresaleCreated {
        sale: Address,
        creator: Address,
        index: u64,
        sale_token: Address,
        hard_cap: U256,
        exchange_rate: U256,
    },
    Invested {
        sale: Address,
        investor: Address,
        amount: U256,
        total_raised: U256,
    },
    HardCapReached {
        sale: Address,
        final_investor: Address,
    },
    TokensClaimed {
        sale: Address,
        investor: Address,
        amount: U256,
    },
    FundsWithdrawn {
        sale: Address,
        owner: Address,
        amount: U256,
    },
}
