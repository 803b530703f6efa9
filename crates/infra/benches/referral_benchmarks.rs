use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use reftrack_affiliates::{Affiliate, NewAffiliate};
use reftrack_attribution::ClickMetadata;
use reftrack_conversions::Decision;
use reftrack_infra::store::{ConversionFilter, InMemoryReferralStore, Page};
use reftrack_infra::{EngineConfig, ReferralEngine};
use reftrack_products::{CommissionRule, NewProduct, Product};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

type Engine = ReferralEngine<InMemoryReferralStore>;

fn setup(runtime: &Runtime) -> (Engine, Product, Affiliate) {
    runtime.block_on(async {
        let engine = ReferralEngine::new(InMemoryReferralStore::new(), EngineConfig::default());
        let tenant = engine.create_tenant("Bench Lender").await.unwrap();
        let product = engine
            .create_product(NewProduct {
                tenant_id: tenant.id,
                name: "Bench Loan".to_string(),
                slug: "bench-loan".to_string(),
                domain: "bench.example".to_string(),
                commission: CommissionRule::Percentage(Decimal::new(20, 2)),
                cookie_duration_days: None,
            })
            .await
            .unwrap();
        let affiliate = engine
            .register_affiliate(NewAffiliate {
                tenant_id: tenant.id,
                code: "BENCH001".to_string(),
                email: "bench@example.com".to_string(),
            })
            .await
            .unwrap();
        (engine, product, affiliate)
    })
}

fn bench_click_recording(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let (engine, _, _) = setup(&runtime);

    let mut group = c.benchmark_group("click_recording");
    group.sample_size(1000);
    group.throughput(Throughput::Elements(1));

    group.bench_function("record_click", |b| {
        b.iter(|| {
            let outcome = runtime
                .block_on(engine.record_click(
                    "bench-loan",
                    "bench001",
                    ClickMetadata::new(Some("198.51.100.1"), Some("bench")),
                ))
                .unwrap();
            black_box(outcome.marker());
        });
    });

    group.finish();
}

fn bench_conversion_lifecycle(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let (engine, product, affiliate) = setup(&runtime);

    let mut group = c.benchmark_group("conversion_lifecycle");
    group.sample_size(1000);

    let mut order = 0u64;
    group.bench_function("report_and_approve", |b| {
        b.iter(|| {
            order += 1;
            let order_id = format!("ORD-{order}");
            runtime.block_on(async {
                let conversion = engine
                    .report_conversion(&product.api_key, affiliate.id, &order_id, 2_500_000)
                    .await
                    .unwrap();
                let decided = engine
                    .decide_conversion(conversion.id, Decision::Approve)
                    .await
                    .unwrap();
                black_box(decided);
            });
        });
    });

    // Balance accumulated above easily funds the minimum payout per iteration.
    group.bench_function("request_and_settle_payout", |b| {
        b.iter(|| {
            runtime.block_on(async {
                order += 1;
                let order_id = format!("ORD-{order}");
                let conversion = engine
                    .report_conversion(&product.api_key, affiliate.id, &order_id, 2_500_000)
                    .await
                    .unwrap();
                engine
                    .decide_conversion(conversion.id, Decision::Approve)
                    .await
                    .unwrap();
                let payout = engine.request_payout("BENCH001", 500_000).await.unwrap();
                black_box(engine.settle_payout(payout.id).await.unwrap());
            });
        });
    });

    group.finish();
}

fn bench_reporting_reads(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("reporting_reads");

    for history in [100usize, 1_000, 10_000].iter() {
        let (engine, product, affiliate) = setup(&runtime);
        runtime.block_on(async {
            for i in 0..*history {
                let conversion = engine
                    .report_conversion(&product.api_key, affiliate.id, &format!("ORD-{i}"), 1_000_000)
                    .await
                    .unwrap();
                if i % 2 == 0 {
                    engine
                        .decide_conversion(conversion.id, Decision::Approve)
                        .await
                        .unwrap();
                }
            }
        });

        group.throughput(Throughput::Elements(*history as u64));
        group.bench_with_input(
            BenchmarkId::new("affiliate_stats", history),
            history,
            |b, _| {
                b.iter(|| black_box(runtime.block_on(engine.affiliate_stats("BENCH001")).unwrap()));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("list_conversions_first_page", history),
            history,
            |b, _| {
                b.iter(|| {
                    black_box(
                        runtime
                            .block_on(engine.list_conversions(&ConversionFilter::default(), Page::default()))
                            .unwrap(),
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_click_recording,
    bench_conversion_lifecycle,
    bench_reporting_reads
);
criterion_main!(benches);
