mod common;

use payroute::domain::charge::{ChargeRequest, ChargeStatus, Provider, TransactionFilter};
use payroute::domain::risk::{FraudRules, MAX_JITTER, RiskScoringEngine};
use payroute::domain::routing::ProviderRouter;

#[tokio::test]
async fn test_routing_matches_thresholds() {
    let (engine, _) = common::engine_with_clock(1.0);
    let requests = [
        ChargeRequest::new(500, "USD", "tok_visa", "a@gmail.com").unwrap(),
        ChargeRequest::new(500, "USD", "tok_visa", "a@test.com").unwrap(),
        ChargeRequest::new(100_000, "NGN", "tok_test", "x@mailinator.com").unwrap(),
    ];

    let mut providers = Vec::new();
    for request in requests {
        let receipt = engine.process_charge(request).await.unwrap();
        assert!((0.0..=1.0).contains(&receipt.risk_score));
        assert_eq!(receipt.status == ChargeStatus::Blocked, receipt.provider == Provider::Blocked);
        providers.push(receipt.provider);
    }

    assert_eq!(providers, vec![Provider::Stripe, Provider::Paypal, Provider::Blocked]);
}

#[test]
fn test_score_stays_within_jitter_band() {
    let engine = RiskScoringEngine::new(FraudRules::default());
    let router = ProviderRouter::default();
    let request = ChargeRequest::new(5_000, "EUR", "tok_visa", "a@gmail.com").unwrap();
    let base = engine.base_score(&request);

    for _ in 0..200 {
        let score = engine.score(&request);
        assert!(score >= base && score <= base + MAX_JITTER);
        assert_eq!(router.route(score), Provider::Stripe);
    }
}

#[tokio::test]
async fn test_ledger_queries() {
    let (engine, clock) = common::engine_with_clock(1.0);

    let first = engine
        .process_charge(ChargeRequest::new(500, "USD", "tok_visa", "a@gmail.com").unwrap())
        .await
        .unwrap();
    clock.advance(chrono::Duration::minutes(5));
    let second = engine
        .process_charge(ChargeRequest::new(100_000, "NGN", "tok_test", "x@mailinator.com").unwrap())
        .await
        .unwrap();

    let all = engine.transactions(&TransactionFilter::default()).await.unwrap();
    let ids: Vec<_> = all.iter().map(|tx| tx.id).collect();
    assert_eq!(ids, vec![second.transaction_id, first.transaction_id]);

    let blocked = engine
        .transactions(&TransactionFilter {
            status: Some(ChargeStatus::Blocked),
            ..TransactionFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].id, second.transaction_id);

    let window = engine
        .transactions(&TransactionFilter {
            from: Some(common::start()),
            to: Some(common::start()),
            min_amount: Some(500),
            max_amount: Some(500),
            ..TransactionFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].id, first.transaction_id);

    let stats = engine.transaction_stats().await.unwrap();
    assert_eq!(stats.total_transactions, 2);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.blocked, 1);
    assert_eq!(stats.total_amount, 100_500);
}

#[tokio::test]
async fn test_offline_explanations_are_templated() {
    let (engine, _) = common::engine_with_clock(1.0);
    let receipt = engine
        .process_charge(ChargeRequest::new(100_000, "NGN", "tok_test", "x@mailinator.com").unwrap())
        .await
        .unwrap();

    assert!(receipt.explanation.starts_with("Transaction blocked due to high risk score"));
    assert!(receipt.explanation.ends_with(
        "with risk factors: large amount, suspicious email domain, foreign currency, test payment source"
    ));
}
