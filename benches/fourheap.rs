//! Throughput benchmarks for the four-heap and the simulation loop.
//!
//! Measures:
//! - Insert into a book with N resting orders per side
//! - Withdraw of a matched order (forces re-matching)
//! - Clear of a crossed book
//! - A full zero-intelligence run

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use marketsim::{
    AgentId, ExpInterarrivals, FourHeap, Latency, MarketId, MarketSpec, MarketTime, Order, OrderId,
    Price, Side, Simulation, Tick, ZiAgent, ZiParams,
};

const M: MarketId = MarketId(0);

/// Book with `depth` non-crossing orders on each side: bids at 99_000 and
/// below, asks at 101_000 and above.
fn build_book(depth: usize) -> (FourHeap, u64) {
    let mut book = FourHeap::new(M);
    let mut seq = 0;
    for i in 0..depth as i64 {
        for (side, price) in [(Side::Buy, 99_000 - i * 10), (Side::Sell, 101_000 + i * 10)] {
            seq += 1;
            let order = Order::new(M, AgentId(0), side, Price(price), 1, MarketTime::new(Tick::ZERO, seq));
            book.insert(order).unwrap();
        }
    }
    (book, seq)
}

fn order(side: Side, price: i64, seq: u64) -> Order {
    Order::new(M, AgentId(1), side, Price(price), 1, MarketTime::new(Tick::ZERO, seq))
}

/// Benchmark: insert that rests without matching
fn bench_insert_resting(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_resting");
    group.throughput(Throughput::Elements(1));

    for depth in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter_batched(
                || build_book(depth),
                |(mut book, seq)| black_box(book.insert(order(Side::Buy, 50_000, seq + 1))),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark: insert that crosses the best ask
fn bench_insert_crossing(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_crossing");
    group.throughput(Throughput::Elements(1));

    for depth in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter_batched(
                || build_book(depth),
                |(mut book, seq)| black_box(book.insert(order(Side::Buy, 105_000, seq + 1))),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark: withdraw a matched buy so its sell has to find a new partner
fn bench_withdraw_matched(c: &mut Criterion) {
    let mut group = c.benchmark_group("withdraw_matched");
    group.throughput(Throughput::Elements(1));

    group.bench_function("rematch", |b| {
        b.iter_batched(
            || {
                let (mut book, seq) = build_book(100);
                let hit = book.insert(order(Side::Buy, 101_000, seq + 1)).unwrap();
                book.insert(order(Side::Buy, 101_000, seq + 2)).unwrap();
                (book, hit)
            },
            |(mut book, hit): (FourHeap, OrderId)| black_box(book.withdraw(hit, 1)),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark: clear a book where every order is matched
fn bench_clear(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear");

    for pairs in [10u64, 100, 1000] {
        group.throughput(Throughput::Elements(pairs));
        group.bench_with_input(BenchmarkId::from_parameter(pairs), &pairs, |b, &pairs| {
            b.iter_batched(
                || {
                    let mut book = FourHeap::new(M);
                    for seq in 0..pairs {
                        book.insert(order(Side::Buy, 100_000 + seq as i64, 2 * seq)).unwrap();
                        book.insert(order(Side::Sell, 100_000 - seq as i64, 2 * seq + 1)).unwrap();
                    }
                    book
                },
                |mut book| black_box(book.clear()),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark: zero-intelligence traders on one continuous market
fn bench_zi_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("zi_run");
    group.sample_size(20);

    for agents in [10u64, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(agents), &agents, |b, &agents| {
            b.iter(|| {
                let mut sim = Simulation::without_sink(1, Latency::Immediate);
                let market = sim.add_market(MarketSpec::continuous()).unwrap();
                let params = ZiParams {
                    private_value_range: 2_000,
                    ..ZiParams::default()
                };
                for n in 0..agents {
                    let agent = ZiAgent::new(
                        format!("zi{n}"),
                        market,
                        params,
                        sim.agent_rng(2 + 2 * n),
                        ExpInterarrivals::new(0.01, sim.agent_rng(3 + 2 * n)),
                    );
                    sim.add_agent(agent, Tick::ZERO);
                }
                sim.run_until(Tick(10_000)).unwrap();
                black_box(sim.market(market).map(|m| m.transactions().len()))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_resting,
    bench_insert_crossing,
    bench_withdraw_matched,
    bench_clear,
    bench_zi_run,
);
criterion_main!(benches);
