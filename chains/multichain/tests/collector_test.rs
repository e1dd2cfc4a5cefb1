mod common;

use common::{create_db, fast_config, MockPrices, Mocks};
use multichain_warmup::engine::{
    CollectorStrategy, ManualBridgeStrategy, Sizing, StepOutcome, TokenChoice,
};
use multichain_warmup::gateway::GatewayError;
use multichain_warmup::registry::ChainName;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_collector_sweeps_every_other_chain_once() {
    let dir = tempdir().unwrap();
    let mut db = create_db(&dir.path().join("db.json"), 1, &[]);
    let mocks = Mocks::new();
    mocks.bridge.push_result(Err(GatewayError::ZeroAmount));
    let mut engine = mocks.engine(fast_config());
    let strategy = CollectorStrategy::new(ChainName::Arbitrum, TokenChoice::Native);

    let outcome = engine.step(&mut db, &strategy, 0).await.unwrap();

    assert!(matches!(outcome, StepOutcome::Finished(_)), "{}", outcome);
    let calls = mocks.bridge.bridge_calls();
    assert_eq!(calls.len(), ChainName::ALL.len() - 1);
    assert!(calls.iter().all(|c| c.to == ChainName::Arbitrum));
    assert!(calls.iter().all(|c| c.from != ChainName::Arbitrum));
    assert!(calls.iter().all(|c| c.amount.is_none()));

    let wallet = db.get(0).unwrap();
    assert!(wallet.collector_finished);
    // No in-flight markers for fire-and-forget sends.
    assert_eq!(wallet.current_chain, None);
    assert_eq!(wallet.initial_balance, None);
}

#[tokio::test]
async fn test_collector_finishes_even_when_sends_fail() {
    let dir = tempdir().unwrap();
    let mut db = create_db(&dir.path().join("db.json"), 1, &[]);
    let mocks = Mocks::new();
    mocks
        .bridge
        .fail_times(7, GatewayError::Rejected("no route".into()));
    let mut engine = mocks.engine(fast_config());
    let strategy = CollectorStrategy::new(ChainName::Base, TokenChoice::Native);

    let outcome = engine.step(&mut db, &strategy, 0).await.unwrap();

    assert!(matches!(outcome, StepOutcome::Finished(_)));
    assert!(db.get(0).unwrap().collector_finished);
}

#[tokio::test]
async fn test_collector_picks_largest_usd_token() {
    let dir = tempdir().unwrap();
    let mut db = create_db(&dir.path().join("db.json"), 1, &[]);
    let mut mocks = Mocks::new();
    mocks.prices = MockPrices::with_prices(2000.0, &[("usdc", 1.0)]);
    mocks.chain.set_balances(ChainName::Base, "eth", &[0.001]);
    mocks.chain.set_balances(ChainName::Base, "usdc", &[50.0]);
    mocks.chain.set_balances(ChainName::Linea, "eth", &[0.1]);
    mocks.chain.set_balances(ChainName::Linea, "usdc", &[5.0]);
    let mut engine = mocks.engine(fast_config());
    let strategy = CollectorStrategy::new(ChainName::Arbitrum, TokenChoice::LargestUsd);

    let outcome = engine.step(&mut db, &strategy, 0).await.unwrap();

    assert!(matches!(outcome, StepOutcome::Finished(_)));
    let calls = mocks.bridge.bridge_calls();
    assert_eq!(calls.len(), 2);
    let base = calls.iter().find(|c| c.from == ChainName::Base).unwrap();
    assert_eq!((base.token_in.as_str(), base.token_out.as_str()), ("usdc", "usdc"));
    let linea = calls.iter().find(|c| c.from == ChainName::Linea).unwrap();
    assert_eq!((linea.token_in.as_str(), linea.token_out.as_str()), ("eth", "eth"));
}

#[tokio::test]
async fn test_collector_run_covers_every_wallet() {
    let dir = tempdir().unwrap();
    let mut db = create_db(&dir.path().join("db.json"), 3, &[]);
    let mocks = Mocks::new();
    let mut engine = mocks.engine(fast_config());
    let strategy = CollectorStrategy::new(ChainName::Optimism, TokenChoice::Native);

    let summary = engine
        .run(&mut db, &strategy, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.steps, 3);
    assert_eq!(summary.finished, 3);
    assert!(!db.any_collector_pending());
}

#[tokio::test]
async fn test_manual_bridge_finishes_after_one_send() {
    let dir = tempdir().unwrap();
    let mut db = create_db(&dir.path().join("db.json"), 1, &[]);
    let mocks = Mocks::new();
    let mut engine = mocks.engine(fast_config());
    let strategy = ManualBridgeStrategy::new(ChainName::Base, ChainName::Linea, Sizing::Full);

    let outcome = engine.step(&mut db, &strategy, 0).await.unwrap();

    assert!(matches!(outcome, StepOutcome::Finished(_)), "{}", outcome);
    let calls = mocks.bridge.bridge_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!((calls[0].from, calls[0].to), (ChainName::Base, ChainName::Linea));
    assert!(db.get(0).unwrap().manual_bridge_finished);
}

#[tokio::test]
async fn test_manual_bridge_failure_keeps_wallet_pending() {
    let dir = tempdir().unwrap();
    let mut db = create_db(&dir.path().join("db.json"), 1, &[]);
    let mocks = Mocks::new();
    mocks
        .bridge
        .push_result(Err(GatewayError::InsufficientBalance("0 ETH".into())));
    let mut engine = mocks.engine(fast_config());
    let strategy = ManualBridgeStrategy::new(ChainName::Base, ChainName::Linea, Sizing::Full);

    let outcome = engine.step(&mut db, &strategy, 0).await.unwrap();

    assert!(matches!(outcome, StepOutcome::NoProgress(_)));
    assert!(!db.get(0).unwrap().manual_bridge_finished);
}

#[tokio::test]
async fn test_manual_bridge_rejects_same_chain() {
    let dir = tempdir().unwrap();
    let mut db = create_db(&dir.path().join("db.json"), 1, &[]);
    let mocks = Mocks::new();
    let mut engine = mocks.engine(fast_config());
    let strategy = ManualBridgeStrategy::new(ChainName::Base, ChainName::Base, Sizing::Full);

    let result = engine
        .run(&mut db, &strategy, &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert_eq!(mocks.bridge.call_count(), 0);
}
