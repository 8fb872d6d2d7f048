pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod presale;

// Main client exports
pub use client::{DeploymentInfo, IdoClient, IdoClientBuilder};
pub use config::{EnvironmentConfig, LoggingEnvConfig, ManagerEnvConfig};
pub use error::Error;
pub use logging::init_tracing;

// Ledger exports
pub use ledger::{InMemoryLedger, Ledger, LedgerError, TokenMetadata};

// Presale exports
pub use presale::{
    token_allocation, InvestorPosition, PresaleEvent, ProjectDetails, Sale, SaleHandle, SaleInfo,
    SaleManager, SaleParams, SaleStatus, DEFAULT_EVENT_CAPACITY, NATIVE_DECIMALS, NATIVE_UNIT,
};

// Re-export common primitive types
pub use alloy_primitives::{Address, U256};
