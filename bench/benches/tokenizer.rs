use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use jackc::tokenizer::Tokenizer;

static INPUT: &str = include_str!("../data/sieve.jack");

fn tokenize(input: &str) {
    let tokens = Tokenizer::new(input).expect("fixture tokenizes");
    black_box(tokens.tokens().len());
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("tokenize", |b| b.iter(|| tokenize(black_box(INPUT))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
