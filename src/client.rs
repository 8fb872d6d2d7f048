/// IDO SDK Client
///
/// Deployment entry point: places the clonable sale template and the sale
/// manager on a ledger and hands out the resulting manager.
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::EnvironmentConfig;
use crate::error::Error;
use crate::ledger::{InMemoryLedger, Ledger};
use crate::presale::{ProjectDetails, SaleManager};

/// Addresses produced by a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub deployer: Address,
    pub owner: Address,
    pub sale_template: Address,
    pub manager: Address,
    pub deployed_at: DateTime<Utc>,
}

/// Main IDO client owning a deployed sale manager
pub struct IdoClient<L: Ledger> {
    /// Host ledger the contracts live on
    ledger: Arc<L>,

    /// Configuration the deployment was made with
    config: EnvironmentConfig,

    /// Deployed contracts
    deployment: DeploymentInfo,

    manager: Arc<SaleManager<L>>,
}

impl<L: Ledger> std::fmt::Debug for IdoClient<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdoClient")
            .field("deployment", &self.deployment)
            .field("manager", &self.manager)
            .finish()
    }
}

impl<L: Ledger> IdoClient<L> {
    /// Deploy the sale template, then a manager initialized with it.
    ///
    /// The manager is owned by the configured owner, or by `deployer` when
    /// none is configured.
    pub fn deploy(
        ledger: Arc<L>,
        deployer: Address,
        config: EnvironmentConfig,
    ) -> Result<Self, Error> {
        if deployer == Address::ZERO {
            return Err(Error::ZeroAddress);
        }
        config.validate()?;

        let owner = config.get_owner()?.unwrap_or(deployer);
        let sale_template = ledger.allocate_contract_address(deployer);
        info!(%deployer, %sale_template, "Sale template deployed");

        let manager_address = ledger.allocate_contract_address(deployer);
        let manager = SaleManager::new(
            ledger.clone(),
            manager_address,
            owner,
            sale_template,
            config.get_event_capacity(),
        )?;
        info!(manager = %manager_address, %owner, "Sale manager deployed");

        Ok(Self {
            ledger,
            config,
            deployment: DeploymentInfo {
                deployer,
                owner,
                sale_template,
                manager: manager_address,
                deployed_at: Utc::now(),
            },
            manager: Arc::new(manager),
        })
    }

    // ============ Accessors ============

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<SaleManager<L>> {
        &self.manager
    }

    pub fn deployment(&self) -> &DeploymentInfo {
        &self.deployment
    }

    /// Address of the template the deployment started with
    pub fn sale_template(&self) -> Address {
        self.deployment.sale_template
    }

    /// Create a sale using the configured default rate and hard cap
    pub fn create_presale_with_defaults(
        &self,
        creator: Address,
        sale_token: Address,
        project_details: ProjectDetails,
    ) -> Result<Address, Error> {
        let exchange_rate = self.config.get_default_exchange_rate()?;
        let hard_cap = self.config.get_default_hard_cap()?;
        self.manager
            .create_presale(creator, exchange_rate, hard_cap, sale_token, project_details)
    }

    /// Token amount a creator must approve for a sale with these terms
    pub fn required_allowance(&self, exchange_rate: U256, hard_cap: U256) -> Result<U256, Error> {
        crate::presale::token_allocation(hard_cap, exchange_rate)
    }

    /// Get a summary of the deployment
    pub fn get_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "deployment": self.deployment,
            "template": self.manager.template(),
            "owner": self.manager.owner(),
            "total_presales": self.manager.total_presales(),
        })
    }
}

impl IdoClient<InMemoryLedger> {
    /// Deploy onto a fresh in-memory ledger
    pub fn local(deployer: Address, config: EnvironmentConfig) -> Result<Self, Error> {
        Self::deploy(Arc::new(InMemoryLedger::new()), deployer, config)
    }
}

/// Builder pattern for IdoClient construction
pub struct IdoClientBuilder<L: Ledger = InMemoryLedger> {
    ledger: Option<Arc<L>>,
    config: Option<EnvironmentConfig>,
    deployer: Option<Address>,
}

impl<L: Ledger> IdoClientBuilder<L> {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            ledger: None,
            config: None,
            deployer: None,
        }
    }

    /// Set the ledger to deploy onto
    pub fn with_ledger(mut self, ledger: Arc<L>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_config(mut self, config: EnvironmentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the deploying account
    pub fn with_deployer(mut self, deployer: Address) -> Self {
        self.deployer = Some(deployer);
        self
    }

    /// Deploy and return the client
    pub fn build(self) -> Result<IdoClient<L>, Error> {
        let ledger = self
            .ledger
            .ok_or_else(|| Error::InvalidArguments("a ledger is required".to_string()))?;
        let config = self.config.unwrap_or_default();
        let deployer = match self.deployer {
            Some(deployer) => deployer,
            None => config.get_owner()?.ok_or_else(|| {
                Error::InvalidArguments("a deployer or configured owner is required".to_string())
            })?,
        };
        IdoClient::deploy(ledger, deployer, config)
    }
}

impl IdoClientBuilder<InMemoryLedger> {
    /// Build onto a fresh in-memory ledger when none was supplied
    pub fn build_local(mut self) -> Result<IdoClient<InMemoryLedger>, Error> {
        if self.ledger.is_none() {
            self.ledger = Some(Arc::new(InMemoryLedger::new()));
        }
        self.build()
    }
}

impl<L: Ledger> Default for IdoClientBuilder<L> {
    fn default() -> Self {
        Self::new()
    }
}
