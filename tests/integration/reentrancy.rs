//! Reentrancy and rollback tests
//!
//! `ReentrantLedger` wraps the in-memory ledger and calls back into the
//! manager from inside outbound transfers, the way a malicious token or
//! receiving contract would.

use super::presale_fixtures::*;
use alloy_primitives::{Address, U256};
use ido_sdk::{
    EnvironmentConfig, Error, IdoClient, InMemoryLedger, Ledger, LedgerError, SaleManager,
};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attack {
    /// Claim again while the payout is in flight
    Claim { sale: Address, investor: Address },
    /// Withdraw again while the payout is in flight
    Withdraw { sale: Address, owner: Address },
    /// Invest from another account while a transfer is in flight
    Invest {
        sale: Address,
        investor: Address,
        amount: U256,
    },
}

#[derive(Default)]
struct ReentrantLedger {
    inner: InMemoryLedger,
    manager: OnceLock<Weak<SaleManager<ReentrantLedger>>>,
    armed: Mutex<Option<Attack>>,
    observed: Mutex<Vec<Result<U256, String>>>,
}

impl ReentrantLedger {
    fn arm(&self, attack: Attack) {
        *self.armed.lock() = Some(attack);
    }

    fn observed(&self) -> Vec<Result<U256, String>> {
        self.observed.lock().clone()
    }

    fn strike(&self) {
        let Some(attack) = self.armed.lock().take() else {
            return;
        };
        let Some(manager) = self.manager.get().and_then(Weak::upgrade) else {
            return;
        };
        let result = match attack {
            Attack::Claim { sale, investor } => manager.claim_tokens_from_presale(investor, sale),
            Attack::Withdraw { sale, owner } => manager.withdraw_fund_raised(owner, sale),
            Attack::Invest {
                sale,
                investor,
                amount,
            } => manager
                .invest_into_presale(investor, sale, amount)
                .map(|()| amount),
        };
        self.observed
            .lock()
            .push(result.map_err(|err| err.to_string()));
    }
}

impl Ledger for ReentrantLedger {
    fn allocate_contract_address(&self, deployer: Address) -> Address {
        self.inner.allocate_contract_address(deployer)
    }

    fn native_balance(&self, who: Address) -> U256 {
        self.inner.native_balance(who)
    }

    fn transfer_native(&self, from: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        self.strike();
        self.inner.transfer_native(from, to, amount)
    }

    fn token_balance(&self, token: Address, who: Address) -> Result<U256, LedgerError> {
        self.inner.token_balance(token, who)
    }

    fn transfer_token(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        self.strike();
        self.inner.transfer_token(token, from, to, amount)
    }

    fn transfer_token_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        self.inner
            .transfer_token_from(token, spender, from, to, amount)
    }
}

struct HostileEnv {
    ledger: Arc<ReentrantLedger>,
    manager: Arc<SaleManager<ReentrantLedger>>,
    token: Address,
    sale: Address,
}

/// Manager on a reentrant ledger with one standard sale created by CREATOR
fn hostile_env() -> HostileEnv {
    let ledger = Arc::new(ReentrantLedger::default());
    let client = IdoClient::deploy(ledger.clone(), DEPLOYER, EnvironmentConfig::default())
        .expect("deployment succeeds");
    let manager = client.manager().clone();
    ledger
        .manager
        .set(Arc::downgrade(&manager))
        .unwrap_or_else(|_| panic!("manager registered once"));

    let token = ledger
        .inner
        .deploy_token(CREATOR, "PreSale Token", "PST", 18, ether(1_000));
    ledger
        .inner
        .approve(token, CREATOR, manager.address(), ether(1_000))
        .unwrap();
    let sale = manager
        .create_presale(CREATOR, ether(100), ether(5), token, sample_details())
        .unwrap();

    HostileEnv {
        ledger,
        manager,
        token,
        sale,
    }
}

#[test]
fn test_reentrant_claim_is_rejected() {
    let env = hostile_env();
    env.ledger.inner.fund(INVESTOR_A, ether(2)).unwrap();
    env.manager
        .invest_into_presale(INVESTOR_A, env.sale, ether(2))
        .unwrap();

    env.ledger.arm(Attack::Claim {
        sale: env.sale,
        investor: INVESTOR_A,
    });
    let paid = env
        .manager
        .claim_tokens_from_presale(INVESTOR_A, env.sale)
        .unwrap();

    assert_eq!(paid, ether(200));
    assert_eq!(
        env.ledger.observed(),
        vec![Err("ERR_NO_TOKENS_TO_CLAIM".to_string())]
    );
    assert_eq!(
        env.ledger.token_balance(env.token, INVESTOR_A).unwrap(),
        ether(200)
    );
}

#[test]
fn test_reentrant_withdraw_transfers_nothing() {
    let env = hostile_env();
    env.ledger.inner.fund(INVESTOR_A, ether(3)).unwrap();
    env.manager
        .invest_into_presale(INVESTOR_A, env.sale, ether(3))
        .unwrap();

    env.ledger.arm(Attack::Withdraw {
        sale: env.sale,
        owner: CREATOR,
    });
    let withdrawn = env.manager.withdraw_fund_raised(CREATOR, env.sale).unwrap();

    assert_eq!(withdrawn, ether(3));
    assert_eq!(env.ledger.observed(), vec![Ok(U256::ZERO)]);
    assert_eq!(env.ledger.native_balance(CREATOR), ether(3));
    assert_eq!(env.ledger.native_balance(env.sale), U256::ZERO);
}

#[test]
fn test_invest_reentering_claim_sees_no_pending_contribution() {
    let env = hostile_env();
    env.ledger.inner.fund(INVESTOR_A, ether(1)).unwrap();

    // The callback fires during the investor's own native transfer
    env.ledger.arm(Attack::Claim {
        sale: env.sale,
        investor: INVESTOR_A,
    });
    env.manager
        .invest_into_presale(INVESTOR_A, env.sale, ether(1))
        .unwrap();

    assert_eq!(
        env.ledger.observed(),
        vec![Err("ERR_NO_TOKENS_TO_CLAIM".to_string())]
    );
    let handle = env.manager.sale(env.sale).unwrap();
    assert_eq!(handle.contribution_of(INVESTOR_A), ether(1));
    assert!(!handle.has_claimed(INVESTOR_A));
}

#[test]
fn test_pending_investment_holds_cap_room() {
    let env = hostile_env();
    // INVESTOR_A reserves 4 of the 5 cap but cannot pay for it
    env.ledger.inner.fund(INVESTOR_A, ether(1)).unwrap();
    env.ledger.inner.fund(INVESTOR_B, ether(2)).unwrap();

    env.ledger.arm(Attack::Invest {
        sale: env.sale,
        investor: INVESTOR_B,
        amount: ether(2),
    });
    let err = env
        .manager
        .invest_into_presale(INVESTOR_A, env.sale, ether(4))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Ledger(LedgerError::InsufficientBalance { .. })
    ));
    assert_eq!(
        env.ledger.observed(),
        vec![Err("ERR_HARD_CAP_EXCEEDED".to_string())]
    );

    // Once the reservation is rolled back the same investment fits
    let handle = env.manager.sale(env.sale).unwrap();
    assert_eq!(handle.total_raised(), U256::ZERO);
    env.manager
        .invest_into_presale(INVESTOR_B, env.sale, ether(2))
        .unwrap();
    assert_eq!(handle.total_raised(), ether(2));
    assert_eq!(handle.contribution_of(INVESTOR_B), ether(2));
}

// ============ Rollback ============

#[test]
fn test_failed_payout_keeps_claim_available() {
    let env = TestEnv::deploy();
    let token = env.creator_token(CREATOR);
    let sale = env.standard_sale(CREATOR, token);
    env.fund(INVESTOR_A, ether(1));
    env.manager.invest_into_presale(INVESTOR_A, sale, ether(1)).unwrap();

    // Move the escrow out so the payout cannot be made
    env.ledger
        .transfer_token(token, sale, OUTSIDER, ether(500))
        .unwrap();
    let err = env
        .manager
        .claim_tokens_from_presale(INVESTOR_A, sale)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Ledger(LedgerError::InsufficientBalance { .. })
    ));
    assert!(!env.manager.sale(sale).unwrap().has_claimed(INVESTOR_A));

    // Once the escrow is back the claim goes through
    env.ledger
        .transfer_token(token, OUTSIDER, sale, ether(500))
        .unwrap();
    assert_eq!(
        env.manager.claim_tokens_from_presale(INVESTOR_A, sale).unwrap(),
        ether(100)
    );
}

#[test]
fn test_failed_withdrawal_restores_balance() {
    let env = TestEnv::deploy();
    let token = env.creator_token(CREATOR);
    let sale = env.standard_sale(CREATOR, token);
    env.fund(INVESTOR_A, ether(2));
    env.manager.invest_into_presale(INVESTOR_A, sale, ether(2)).unwrap();

    env.ledger.transfer_native(sale, OUTSIDER, ether(2)).unwrap();
    assert!(env.manager.withdraw_fund_raised(CREATOR, sale).is_err());

    let info = env.manager.sale_info(sale).unwrap();
    assert_eq!(info.balance, ether(2));
    assert_eq!(info.total_withdrawn, U256::ZERO);
}
