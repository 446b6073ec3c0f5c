use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mds_api::search::{fan_out, group_by_type, score_result, sort_results, SearchHit, SearchResult, Target};
use std::hint::black_box;
use tokio::runtime::Runtime;

const KINDS: [(&str, f64); 5] =
    [("mine", 500.0), ("party", 150.0), ("permit", 1000.0), ("mine_documents", 250.0), ("permit_documents", 250.0)];

fn synthetic_results(n: usize) -> Vec<SearchResult> {
    (0..n)
        .map(|i| {
            let (kind, base) = KINDS[i % KINDS.len()];
            let value = format!("Copper Mountain {}", i % 97);
            let similarity = ((i * 7919) % 1000) as f64 / 1000.0;
            SearchResult {
                score: score_result(similarity, "copper", &value, base),
                kind: kind.to_string(),
                result: SearchHit { id: format!("{:08x}", i % (n / 2 + 1)), value },
            }
        })
        .collect()
}

fn benchmark_scoring(c: &mut Criterion) {
    let values: Vec<String> = (0..1000).map(|i| format!("Copper Mountain Mine {}", i)).collect();
    c.bench_function("score_1000_values", |b| {
        b.iter(|| {
            let mut total = 0.0;
            for v in &values {
                total += score_result(black_box(0.42), black_box("copper mountain"), v, 500.0);
            }
            black_box(total)
        })
    });
}

fn benchmark_sort_and_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_and_group");
    for n in [100usize, 1_000, 10_000] {
        let results = synthetic_results(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &results, |b, results| {
            b.iter(|| {
                let mut merged = results.clone();
                sort_results(&mut merged);
                black_box(group_by_type(&merged, 5))
            })
        });
    }
    group.finish();
}

#[derive(Clone, Copy)]
struct Table(&'static str);

impl Target for Table {
    fn kind(&self) -> &'static str {
        self.0
    }
}

fn benchmark_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tables: Vec<Table> = (0..64).map(|i| Table(KINDS[i % KINDS.len()].0)).collect();

    let mut group = c.benchmark_group("fan_out_workers");
    for workers in [1usize, 4, 16, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| {
                rt.block_on(async {
                    let out = fan_out(&tables, workers, |table| async move {
                        tokio::task::yield_now().await;
                        Ok::<_, std::convert::Infallible>(vec![table.0; 8])
                    })
                    .await;
                    black_box(out.results.len())
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_scoring, benchmark_sort_and_group, benchmark_fan_out);
criterion_main!(benches);
