/// Error types for the IDO SDK
///
/// Presale rejections render as the bare reason string the sale contracts
/// revert with (`ERR_HARD_CAP_EXCEEDED`, ...), so callers can match on
/// either the variant or the message.
use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum Error {
    /// A required address argument is the zero address
    #[error("ERR_ZERO_ADDRESS")]
    ZeroAddress,

    /// Target address is not a sale created by this manager
    #[error("ERR_SALE_NOT_VALID")]
    SaleNotValid,

    /// Investment amount is zero
    #[error("ERR_0_BUY_AMOUNT")]
    ZeroBuyAmount,

    /// Investment would push the raised total past the hard cap
    #[error("ERR_HARD_CAP_EXCEEDED")]
    HardCapExceeded,

    /// Caller has no unclaimed contribution
    #[error("ERR_NO_TOKENS_TO_CLAIM")]
    NoTokensToClaim,

    /// Caller is not the owner of the sale
    #[error("ERR_CALLER_NOT_OWNER")]
    CallerNotOwner,

    /// Caller is not the owner of the manager
    #[error("Ownable: caller is not the owner")]
    NotManagerOwner,

    #[error("ERR_0_HARD_CAP")]
    ZeroHardCap,

    #[error("ERR_0_EXCHANGE_RATE")]
    ZeroExchangeRate,

    #[error("Initializable: contract is already initialized")]
    AlreadyInitialized,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl Error {
    /// Bare rejection reason, without any wrapping context
    pub fn reason(&self) -> String {
        match self {
            Error::Ledger(inner) => inner.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the error is a presale rule rejection rather than an
    /// infrastructure failure
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Error::Ledger(_)
                | Error::Config(_)
                | Error::Io(_)
                | Error::Serialization(_)
                | Error::InvalidArguments(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
