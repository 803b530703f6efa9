//! Integration tests for the full referral pipeline.
//!
//! Tests: click → conversion report → decision → payout, through the engine and store.
//!
//! Verifies:
//! - Racing reports of one order yield exactly one conversion
//! - Racing approvals credit the affiliate exactly once
//! - Racing payouts never overdraw
//! - Balances stay equal to Σ approved − Σ committed payouts

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use reftrack_affiliates::{Affiliate, NewAffiliate};
    use reftrack_attribution::ClickMetadata;
    use reftrack_conversions::{ConversionStatus, Decision};
    use reftrack_core::DomainError;
    use reftrack_products::{CommissionRule, NewProduct, Product};

    use crate::engine::{EngineConfig, EngineError, ReferralEngine};
    use crate::store::{ConversionFilter, InMemoryReferralStore, Page, PayoutFilter};

    type Engine = ReferralEngine<InMemoryReferralStore>;

    async fn setup(commission: CommissionRule) -> (Arc<Engine>, Product, Affiliate) {
        let engine = ReferralEngine::new(InMemoryReferralStore::new(), EngineConfig::default());
        let tenant = engine.create_tenant("Demo Lender").await.unwrap();
        let product = engine
            .create_product(NewProduct {
                tenant_id: tenant.id,
                name: "Kredit Pintar".to_string(),
                slug: "kredit-pintar".to_string(),
                domain: "kreditpintar.example".to_string(),
                commission,
                cookie_duration_days: Some(30),
            })
            .await
            .unwrap();
        let affiliate = engine
            .register_affiliate(NewAffiliate {
                tenant_id: tenant.id,
                code: "DEMO001".to_string(),
                email: "demo@example.com".to_string(),
            })
            .await
            .unwrap();
        (Arc::new(engine), product, affiliate)
    }

    fn is_domain(err: &EngineError, pred: impl Fn(&DomainError) -> bool) -> bool {
        err.domain().is_some_and(pred)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_reports_create_one_conversion() {
        let (engine, product, affiliate) = setup(CommissionRule::Fixed(150_000)).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let key = product.api_key.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .report_conversion(&key, affiliate.id, "ORD-RACE", 1_000_000)
                    .await
            }));
        }

        let mut successes = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => {
                    assert!(is_domain(&err, |e| matches!(e, DomainError::DuplicateOrder { .. })));
                    duplicates += 1;
                }
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(duplicates, 7);

        let listed = engine
            .list_conversions(&ConversionFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(listed.total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_credit_once() {
        let (engine, product, affiliate) =
            setup(CommissionRule::Percentage(Decimal::new(20, 2))).await;
        let conversion = engine
            .report_conversion(&product.api_key, affiliate.id, "ORD-1", 500_000)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.decide_conversion(conversion.id, Decision::Approve).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(c) => {
                    assert_eq!(c.status, ConversionStatus::Approved);
                    successes += 1;
                }
                Err(err) => {
                    assert!(is_domain(&err, |e| matches!(
                        e,
                        DomainError::AlreadyDecided { status, .. } if status == "approved"
                    )));
                }
            }
        }
        assert_eq!(successes, 1);

        let stats = engine.affiliate_stats("DEMO001").await.unwrap();
        assert_eq!(stats.snapshot.affiliate.balance(), 100_000);
        assert!(stats.balance_audit().consistent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_payouts_never_overdraw() {
        let (engine, product, affiliate) = setup(CommissionRule::Fixed(600_000)).await;
        for i in 0..2 {
            let conversion = engine
                .report_conversion(&product.api_key, affiliate.id, &format!("ORD-{i}"), 1)
                .await
                .unwrap();
            engine
                .decide_conversion(conversion.id, Decision::Approve)
                .await
                .unwrap();
        }
        // Balance 1_200_000 covers exactly two payouts of 500_000.

        let mut handles = Vec::new();
        for _ in 0..6 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.request_payout("DEMO001", 500_000).await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(err) => assert!(is_domain(&err, |e| matches!(
                    e,
                    DomainError::InsufficientBalance { .. }
                ))),
            }
        }
        assert_eq!(granted, 2);

        let audit = engine.audit_balance(affiliate.id).await.unwrap();
        assert_eq!(audit.stored_balance, 200_000);
        assert!(audit.consistent);

        let payouts = engine
            .list_payouts(&PayoutFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(payouts.total, 2);
    }

    #[tokio::test]
    async fn end_to_end_referral_flow() {
        let (engine, product, affiliate) =
            setup(CommissionRule::Percentage(Decimal::new(20, 2))).await;

        let outcome = engine
            .record_click(
                "kredit-pintar",
                "demo001",
                ClickMetadata::new(Some("203.0.113.7"), Some("Mozilla/5.0")),
            )
            .await
            .unwrap();
        assert_eq!(outcome.click.metadata.ip, "203.0.113.7");
        let marker = outcome.marker();

        // The marker's affiliate id is what the merchant reports back.
        let conversion = engine
            .report_conversion(&product.api_key, marker.affiliate_id, "ORD-1", 3_000_000)
            .await
            .unwrap();
        assert_eq!(conversion.commission_amount, 600_000);
        engine
            .decide_conversion(conversion.id, Decision::Approve)
            .await
            .unwrap();

        let payout = engine.request_payout("DEMO001", 500_000).await.unwrap();
        engine.settle_payout(payout.id).await.unwrap();

        let stats = engine.affiliate_stats("DEMO001").await.unwrap();
        let snapshot = &stats.snapshot;
        assert_eq!(snapshot.clicks, 1);
        assert_eq!(snapshot.conversions, 1);
        assert_eq!(snapshot.approved.amount, 600_000);
        assert_eq!(snapshot.pending.count, 0);
        assert_eq!(snapshot.paid_total, 500_000);
        assert_eq!(snapshot.affiliate.balance(), 100_000);
        assert_eq!(snapshot.referral_product_slug.as_deref(), Some("kredit-pintar"));
        assert_eq!(stats.conversion_rate, Decimal::ONE);
        assert!(stats.balance_audit().consistent);

        let mine = engine
            .affiliate_conversions("DEMO001", Page::default())
            .await
            .unwrap();
        assert_eq!(mine.items.len(), 1);
        assert_eq!(mine.items[0].conversion.affiliate_id, affiliate.id);
        assert_eq!(mine.items[0].product_slug, "kredit-pintar");
    }

    #[tokio::test]
    async fn listings_are_newest_first_and_paginated() {
        let (engine, product, affiliate) = setup(CommissionRule::Fixed(1_000)).await;
        for i in 0..5 {
            engine
                .report_conversion(&product.api_key, affiliate.id, &format!("ORD-{i}"), 10)
                .await
                .unwrap();
        }

        let first = engine
            .list_conversions(&ConversionFilter::default(), Page::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.total_pages(), 3);
        assert_eq!(first.items[0].conversion.order_id.as_str(), "ORD-4");
        assert_eq!(first.items[1].conversion.order_id.as_str(), "ORD-3");

        let last = engine
            .list_conversions(&ConversionFilter::default(), Page::new(Some(3), Some(2)))
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].conversion.order_id.as_str(), "ORD-0");

        let approved_only = ConversionFilter {
            affiliate_id: None,
            status: Some(ConversionStatus::Approved),
        };
        let none = engine
            .list_conversions(&approved_only, Page::default())
            .await
            .unwrap();
        assert_eq!(none.total, 0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Report(i64),
            Approve(usize),
            Reject(usize),
            Payout(i64),
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                (1i64..5_000_000).prop_map(Step::Report),
                (0usize..16).prop_map(Step::Approve),
                (0usize..16).prop_map(Step::Reject),
                (1i64..2_000_000).prop_map(Step::Payout),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Property: whatever succeeds or fails, the stored balance equals the balance
            /// derived from history, and never goes negative.
            #[test]
            fn balance_is_conserved(steps in prop::collection::vec(step(), 1..40)) {
                let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
                runtime.block_on(async {
                    let (engine, product, affiliate) =
                        setup(CommissionRule::Percentage(Decimal::new(20, 2))).await;
                    let mut reported = Vec::new();

                    for (i, step) in steps.into_iter().enumerate() {
                        match step {
                            Step::Report(amount) => {
                                let order_id = format!("ORD-{i}");
                                let conversion = engine
                                    .report_conversion(&product.api_key, affiliate.id, &order_id, amount)
                                    .await
                                    .unwrap();
                                reported.push(conversion.id);
                            }
                            Step::Approve(_) | Step::Reject(_) if reported.is_empty() => {}
                            Step::Approve(n) => {
                                let id = reported[n % reported.len()];
                                let _ = engine.decide_conversion(id, Decision::Approve).await;
                            }
                            Step::Reject(n) => {
                                let id = reported[n % reported.len()];
                                let _ = engine.decide_conversion(id, Decision::Reject).await;
                            }
                            Step::Payout(amount) => {
                                let _ = engine.request_payout("DEMO001", amount).await;
                            }
                        }

                        let audit = engine.audit_balance(affiliate.id).await.unwrap();
                        assert!(audit.stored_balance >= 0);
                        assert!(audit.consistent, "audit mismatch: {audit:?}");
                    }
                });
            }
        }
    }
}
