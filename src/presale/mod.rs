/// Presale Module
/// Handles sale creation from a clonable template, investments, token claims
/// and withdrawal of raised funds

pub mod manager;
pub mod sale;
pub mod types;

pub use manager::{SaleManager, DEFAULT_EVENT_CAPACITY};
pub use sale::{Sale, SaleHandle};
pub use types::*;
