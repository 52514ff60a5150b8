//! Benchmarks for the vergec preprocessor and lexer.
//!
//! Run with: `cargo bench --package vergec_lexer`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use vergec_lexer::{Lexer, NoIncludes, Preprocessor};

fn source_of_size(functions: usize) -> String {
    let mut source = String::new();
    for i in 0..functions {
        source.push_str(&format!(
            "func f{i}(a: Int, b: Int): Int {{ let x: Int = a + b * 2; return x - 1; }}\n"
        ));
    }
    source
}

fn bench_preprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessor/preprocess");
    for size in [10, 100, 1_000] {
        let source = source_of_size(size);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| {
                black_box(
                    Preprocessor::new(&NoIncludes)
                        .preprocess(source, "bench.vg")
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer/tokenize_all");
    for size in [10, 100, 1_000] {
        let source = source_of_size(size);
        let preprocessed = Preprocessor::new(&NoIncludes)
            .preprocess(&source, "bench.vg")
            .unwrap();
        group.throughput(Throughput::Bytes(preprocessed.source.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &preprocessed,
            |b, preprocessed| {
                b.iter(|| {
                    black_box(Lexer::tokenize_all(
                        &preprocessed.source,
                        &preprocessed.resolution_map,
                    ))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_preprocess, bench_tokenize);
criterion_main!(benches);
