//! Benchmarks for backend selection and health bookkeeping.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lingualink::backend::{BackendRegistry, LoadBalancer};
use lingualink::config::{BackendConfig, Strategy};
use lingualink::health::HealthState;
use lingualink::metrics::{MetricsCollector, RequestOutcome};
use lingualink::stats::RequestStats;
use std::sync::Arc;
use std::time::Duration;

fn create_balancer(strategy: Strategy, num_backends: usize) -> LoadBalancer {
    let configs: Vec<BackendConfig> = (1..=num_backends)
        .map(|i| BackendConfig {
            url: format!("https://node{}.lingualink.test", i),
            label: format!("node-{}", i),
        })
        .collect();
    let registry = Arc::new(BackendRegistry::from_config(&configs).unwrap());
    let health = Arc::new(HealthState::new());

    for backend in registry.snapshot().iter() {
        health.register(backend.id);
        let latency = Duration::from_millis(20 + backend.id * 37 % 400);
        health.record_success(backend.id, Some(latency), Some(backend.id as f64 * 900.0));
    }

    LoadBalancer::new(
        registry,
        health,
        Arc::new(RequestStats::new()),
        MetricsCollector::new(),
        strategy,
    )
}

fn benchmark_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_backend");
    group.throughput(Throughput::Elements(1));

    for strategy in Strategy::ALL {
        let balancer = create_balancer(strategy, 5);
        group.bench_with_input(BenchmarkId::from_parameter(strategy), &balancer, |b, balancer| {
            b.iter(|| {
                if let Some(backend) = balancer.select_backend() {
                    balancer.release(black_box(backend.id));
                }
            })
        });
    }

    group.finish();
}

fn benchmark_exclusion(c: &mut Criterion) {
    let balancer = create_balancer(Strategy::HealthBased, 10);
    let attempted = [1, 2, 3];

    c.bench_function("select_excluding", |b| {
        b.iter(|| {
            if let Some(backend) = balancer.select_excluding(black_box(&attempted)) {
                balancer.release(backend.id);
            }
        })
    });
}

fn benchmark_health_state(c: &mut Criterion) {
    let state = HealthState::new();
    for id in 1..=100 {
        state.register(id);
    }

    let mut group = c.benchmark_group("health_state");

    group.bench_function("is_eligible", |b| {
        b.iter(|| {
            black_box(state.is_eligible(black_box(50)));
        })
    });

    group.bench_function("record_success", |b| {
        b.iter(|| {
            state.record_success(50, Some(Duration::from_millis(40)), None);
        })
    });

    group.bench_function("record_failure", |b| {
        b.iter(|| {
            state.record_failure(50, "timeout");
        })
    });

    group.finish();
}

fn benchmark_metrics(c: &mut Criterion) {
    let collector = MetricsCollector::new();

    let mut group = c.benchmark_group("metrics");
    group.throughput(Throughput::Elements(1));

    group.bench_function("record_request", |b| {
        b.iter(|| {
            collector.record_request(
                black_box(3),
                black_box(RequestOutcome::Success),
                black_box(Duration::from_millis(10)),
            );
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_strategies,
    benchmark_exclusion,
    benchmark_health_state,
    benchmark_metrics,
);

criterion_main!(benches);
