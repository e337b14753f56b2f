use criterion::{criterion_group, criterion_main, Criterion};

use paxoskv::{tests::cluster, Request};
use std::time::Duration;
use tokio::{runtime::Builder, time::Instant};

fn bench_put(c: &mut Criterion) {
    env_logger::init();
    const N: usize = 3;
    const NQUERIES: usize = 100;

    c.bench_function(&format!("{} put op with {} nodes", NQUERIES, N), |b| {
        b.iter_custom(|iters| {
            let rt = Builder::new_multi_thread()
                .worker_threads(8)
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let cluster = cluster(N).await;
                let clients: Vec<_> = cluster
                    .clients
                    .iter()
                    .map(|c| c.clone().with_timeout(Duration::from_secs(60)))
                    .collect();

                let get_key = |i| format!("key-{}", i);
                let get_value = |i| format!("value-{}", i);

                let start = Instant::now();

                let mut setters = Vec::new();
                for _ in 0..iters {
                    for i in 0..NQUERIES {
                        let client = clients[i % N].clone();
                        setters.push(tokio::spawn(async move {
                            client.put(Request::put(get_key(i), get_value(i))).await
                        }));
                    }
                }

                for s in setters {
                    s.await.expect("setters should not panic").expect("node should reply");
                }

                start.elapsed()
            })
        });
    });
}

criterion_group!(
    name = benches;
    // This can be any expression that returns a `Criterion` object.
    config = Criterion::default().sample_size(10);
    targets = bench_put,
);
criterion_main!(benches);
