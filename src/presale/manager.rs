/// Sale manager: the factory and registry of sale instances
///
/// The manager holds the address of the clonable sale template, creates new
/// instances from it, indexes them by creator and by global sequence, and
/// routes invest/claim/withdraw calls to them. It never holds funds itself.
use alloy_primitives::{Address, U256};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::sale::{Sale, SaleHandle};
use super::types::{PresaleEvent, ProjectDetails, SaleInfo, SaleParams};
use crate::error::Error;
use crate::ledger::Ledger;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Registry {
    owner: Address,
    template: Address,
    /// Next CREATE nonce of the manager; contract nonces start at 1
    clone_nonce: u64,
    sales: HashMap<Address, Arc<Mutex<Sale>>>,
    by_creator: HashMap<Address, Vec<Address>>,
    all: Vec<Address>,
}

/// Owner-governed factory of presale instances
pub struct SaleManager<L: Ledger> {
    address: Address,
    ledger: Arc<L>,
    registry: RwLock<Registry>,
    events: broadcast::Sender<PresaleEvent>,
}

impl<L: Ledger> std::fmt::Debug for SaleManager<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("SaleManager")
            .field("address", &self.address)
            .field("owner", &registry.owner)
            .field("template", &registry.template)
            .field("sales", &registry.all.len())
            .finish()
    }
}

impl<L: Ledger> SaleManager<L> {
    /// Create a manager living at `address`, owned by `owner`, cloning
    /// `template`
    pub fn new(
        ledger: Arc<L>,
        address: Address,
        owner: Address,
        template: Address,
        event_capacity: usize,
    ) -> Result<Self, Error> {
        if address == Address::ZERO || owner == Address::ZERO || template == Address::ZERO {
            return Err(Error::ZeroAddress);
        }
        if event_capacity == 0 {
            return Err(Error::InvalidArguments(
                "event capacity must be greater than 0".to_string(),
            ));
        }

        let (events, _) = broadcast::channel(event_capacity);
        info!(%address, %owner, %template, "Sale manager initialized");

        Ok(Self {
            address,
            ledger,
            registry: RwLock::new(Registry {
                owner,
                template,
                clone_nonce: 1,
                sales: HashMap::new(),
                by_creator: HashMap::new(),
                all: Vec::new(),
            }),
            events,
        })
    }

    /// Subscribe to committed state changes of the manager and its sales
    pub fn subscribe(&self) -> broadcast::Receiver<PresaleEvent> {
        self.events.subscribe()
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    // ============ Owner Methods ============

    /// Replace the clonable sale template (owner only)
    pub fn update_template(&self, caller: Address, new_template: Address) -> Result<(), Error> {
        let mut registry = self.registry.write();
        if caller != registry.owner {
            warn!(%caller, "Rejected template update from non-owner");
            return Err(Error::NotManagerOwner);
        }
        if new_template == Address::ZERO {
            return Err(Error::ZeroAddress);
        }

        let previous = std::mem::replace(&mut registry.template, new_template);
        drop(registry);

        info!(%previous, current = %new_template, "Sale template updated");
        let _ = self.events.send(PresaleEvent::TemplateUpdated {
            previous,
            current: new_template,
        });
        Ok(())
    }

    /// Hand manager ownership to `new_owner` (owner only)
    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), Error> {
        let mut registry = self.registry.write();
        if caller != registry.owner {
            warn!(%caller, "Rejected ownership transfer from non-owner");
            return Err(Error::NotManagerOwner);
        }
        if new_owner == Address::ZERO {
            return Err(Error::ZeroAddress);
        }

        let previous = std::mem::replace(&mut registry.owner, new_owner);
        drop(registry);

        info!(%previous, current = %new_owner, "Manager ownership transferred");
        let _ = self.events.send(PresaleEvent::OwnershipTransferred {
            previous,
            current: new_owner,
        });
        Ok(())
    }

    // ============ Factory ============

    /// Clone the template into a new sale owned by `caller`.
    ///
    /// The caller must have approved this manager on `sale_token` for at
    /// least `hard_cap * exchange_rate / 10^18`; that amount is moved into
    /// the new sale so every future claim is covered.
    pub fn create_presale(
        &self,
        caller: Address,
        exchange_rate: U256,
        hard_cap: U256,
        sale_token: Address,
        project_details: ProjectDetails,
    ) -> Result<Address, Error> {
        let params = SaleParams {
            owner: caller,
            exchange_rate,
            hard_cap,
            sale_token,
            project_details,
        };
        params.validate()?;
        let required_tokens = params.required_token_supply()?;

        // Reserve the clone address. A failed creation burns it; addresses
        // are never handed out twice.
        let (template, sale) = {
            let mut registry = self.registry.write();
            let sale = self.address.create(registry.clone_nonce);
            registry.clone_nonce += 1;
            (registry.template, sale)
        };

        let mut instance = Sale::clone_of(template, sale);
        instance.initialize(params)?;

        self.ledger
            .transfer_token_from(sale_token, self.address, caller, sale, required_tokens)
            .map_err(|err| {
                warn!("Funding sale {} with {} tokens failed: {}", sale, required_tokens, err);
                Error::from(err)
            })?;

        let index = {
            let mut registry = self.registry.write();
            registry.sales.insert(sale, Arc::new(Mutex::new(instance)));
            let created = registry.by_creator.entry(caller).or_default();
            created.push(sale);
            let index = (created.len() - 1) as u64;
            registry.all.push(sale);
            index
        };

        info!(%sale, creator = %caller, index, %template, "Presale created");
        let _ = self.events.send(PresaleEvent::PresaleCreated {
            sale,
            creator: caller,
            index,
            sale_token,
            hard_cap,
            exchange_rate,
        });
        Ok(sale)
    }

    // ============ Routing ============

    /// Handle to a sale created by this manager
    pub fn sale(&self, sale: Address) -> Result<SaleHandle<L>, Error> {
        let registry = self.registry.read();
        let state = registry.sales.get(&sale).ok_or(Error::SaleNotValid)?;
        Ok(SaleHandle::new(
            state.clone(),
            self.ledger.clone(),
            self.events.clone(),
        ))
    }

    pub fn invest_into_presale(
        &self,
        caller: Address,
        sale: Address,
        amount: U256,
    ) -> Result<(), Error> {
        debug!(%caller, %sale, %amount, "Routing investment");
        self.sale(sale)?.invest(caller, amount)
    }

    pub fn claim_tokens_from_presale(&self, caller: Address, sale: Address) -> Result<U256, Error> {
        debug!(%caller, %sale, "Routing claim");
        self.sale(sale)?.claim(caller)
    }

    pub fn withdraw_fund_raised(&self, caller: Address, sale: Address) -> Result<U256, Error> {
        debug!(%caller, %sale, "Routing withdrawal");
        self.sale(sale)?.withdraw(caller)
    }

    // ============ Query Methods ============

    /// Manager contract address
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.registry.read().owner
    }

    /// Current clonable sale template
    pub fn template(&self) -> Address {
        self.registry.read().template
    }

    /// Number of sales ever created across all creators
    pub fn total_presales(&self) -> u64 {
        self.registry.read().all.len() as u64
    }

    pub fn total_presales_created_by(&self, creator: Address) -> u64 {
        self.registry
            .read()
            .by_creator
            .get(&creator)
            .map_or(0, |sales| sales.len() as u64)
    }

    /// The `index`-th sale created by `creator`
    pub fn presale_address_by_owner_and_id(&self, creator: Address, index: u64) -> Option<Address> {
        let registry = self.registry.read();
        let sales = registry.by_creator.get(&creator)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| sales.get(i))
            .copied()
    }

    pub fn presales_created_by(&self, creator: Address) -> Vec<Address> {
        self.registry
            .read()
            .by_creator
            .get(&creator)
            .cloned()
            .unwrap_or_default()
    }

    /// The sale with global sequence number `index`
    pub fn presale_at(&self, index: u64) -> Option<Address> {
        let registry = self.registry.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| registry.all.get(i))
            .copied()
    }

    pub fn all_presales(&self) -> Vec<Address> {
        self.registry.read().all.clone()
    }

    pub fn is_presale(&self, sale: Address) -> bool {
        self.registry.read().sales.contains_key(&sale)
    }

    pub fn project_details_of(&self, sale: Address) -> Result<ProjectDetails, Error> {
        Ok(self.sale(sale)?.project_details())
    }

    pub fn sale_info(&self, sale: Address) -> Result<SaleInfo, Error> {
        Ok(self.sale(sale)?.info())
    }
}
