//! Performance benchmarks for the request shield.
//!
//! Run with: cargo bench -p tablegate-gateway

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tablegate_core::{ShieldConfig, TierPolicy};
use tablegate_gateway::shield::{EndpointClassifier, RateLimiter, RequestInfo};

fn limiter(max: u32) -> RateLimiter {
    let mut config = ShieldConfig::default();
    config.tiers.general = TierPolicy::per_minute(max);
    config.ddos.suspicious_threshold = u32::MAX;
    config.ddos.block_threshold = u32::MAX;
    RateLimiter::with_config(config).unwrap()
}

/// Benchmark admission checks against clients with varying history depth.
fn bench_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter_check");

    for history in [0usize, 100, 1_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("history", history),
            history,
            |b, &history| {
                let limiter = limiter(u32::MAX);
                let request = RequestInfo::new("203.0.113.10", "/api/menu");
                for _ in 0..history {
                    limiter.check(&request).unwrap();
                }

                b.iter(|| limiter.check(black_box(&request)).unwrap());
            },
        );
    }

    group.finish();
}

/// Benchmark checks spread across many clients.
fn bench_many_clients(c: &mut Criterion) {
    c.bench_function("rate_limiter_many_clients", |b| {
        let limiter = limiter(100);
        let requests: Vec<RequestInfo> = (0..1_000)
            .map(|i| RequestInfo::new(format!("10.0.{}.{}", i / 256, i % 256).as_str(), "/api/quote"))
            .collect();
        let mut next = 0;

        b.iter(|| {
            let request = &requests[next % requests.len()];
            next += 1;
            limiter.check(black_box(request)).unwrap()
        });
    });
}

/// Benchmark endpoint classification.
fn bench_classify(c: &mut Criterion) {
    let classifier = EndpointClassifier::new();
    c.bench_function("classify_path", |b| {
        b.iter(|| classifier.classify(black_box("/api/events/2026-06-01/Check-Date")));
    });
}

criterion_group!(benches, bench_check, bench_many_clients, bench_classify);
criterion_main!(benches);
