//! Event stream tests

use super::presale_fixtures::*;
use ido_sdk::PresaleEvent;
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn test_sale_lifecycle_events_in_order() {
    let env = TestEnv::deploy();
    let mut events = env.manager.subscribe();
    let token = env.creator_token(CREATOR);
    let sale = env.standard_sale(CREATOR, token);

    env.fund(INVESTOR_A, ether(5));
    env.manager.invest_into_presale(INVESTOR_A, sale, ether(5)).unwrap();
    env.manager.claim_tokens_from_presale(INVESTOR_A, sale).unwrap();
    env.manager.withdraw_fund_raised(CREATOR, sale).unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        PresaleEvent::PresaleCreated {
            sale,
            creator: CREATOR,
            index: 0,
            sale_token: token,
            hard_cap: ether(5),
            exchange_rate: ether(100),
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PresaleEvent::Invested {
            sale,
            investor: INVESTOR_A,
            amount: ether(5),
            total_raised: ether(5),
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PresaleEvent::HardCapReached {
            sale,
            final_investor: INVESTOR_A,
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PresaleEvent::TokensClaimed {
            sale,
            investor: INVESTOR_A,
            amount: ether(500),
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PresaleEvent::FundsWithdrawn {
            sale,
            owner: CREATOR,
            amount: ether(5),
        }
    );
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_rejected_calls_emit_nothing() {
    let env = TestEnv::deploy();
    let token = env.creator_token(CREATOR);
    let sale = env.standard_sale(CREATOR, token);
    let mut events = env.manager.subscribe();

    assert!(env.manager.invest_into_presale(INVESTOR_A, sale, ether(1)).is_err());
    assert!(env.manager.claim_tokens_from_presale(OUTSIDER, sale).is_err());
    assert!(env.manager.withdraw_fund_raised(OUTSIDER, sale).is_err());
    assert!(env.manager.update_template(OUTSIDER, OUTSIDER).is_err());
    // An empty withdrawal succeeds but moves nothing
    env.manager.withdraw_fund_raised(CREATOR, sale).unwrap();

    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_subscriber_task_sees_template_updates() {
    let env = TestEnv::deploy();
    let mut events = env.manager.subscribe();
    let original = env.manager.template();

    let listener = tokio::spawn(async move { events.recv().await });

    env.manager.update_template(DEPLOYER, OUTSIDER).unwrap();

    let event = listener.await.unwrap().unwrap();
    assert_eq!(
        event,
        PresaleEvent::TemplateUpdated {
            previous: original,
            current: OUTSIDER,
        }
    );
}
