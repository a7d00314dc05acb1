// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Benchmarks for compile, encode and decode.
//!
//! Run with: `cargo bench --bench pipeline`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lumo_engine::ast::Program;
use lumo_engine::ast::builder::*;
use lumo_engine::{Chunk, compile};

/// `count` functions, each with a counting loop and a capturing closure,
/// plus a `main` that calls them all.
fn synthetic_program(count: usize) -> Program {
    let mut body = Vec::with_capacity(count + 1);
    for n in 0..count {
        body.push(fn_decl(
            &format!("f{}", n),
            &["x"],
            vec![
                let_("total", int(0)),
                for_in(
                    "i",
                    range(int(0), ident("x")),
                    vec![expr_stmt(assign(
                        ident("total"),
                        add(ident("total"), mul(ident("i"), int(n as i64))),
                    ))],
                ),
                let_("get", arrow(&[], ident("total"))),
                ret(Some(call(ident("get"), vec![]))),
            ],
        ));
    }
    body.push(fn_decl(
        "main",
        &[],
        (0..count)
            .map(|n| expr_stmt(call(ident(&format!("f{}", n)), vec![int(10)])))
            .collect(),
    ));
    program(body)
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for size in [10, 100, 500] {
        let program = synthetic_program(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &program, |b, program| {
            b.iter(|| black_box(compile(black_box(program)).unwrap()));
        });
    }
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    for size in [10, 100, 500] {
        let chunk = compile(&synthetic_program(size)).unwrap();
        let bytes = chunk.encode().unwrap();

        group.bench_with_input(BenchmarkId::new("encode", size), &chunk, |b, chunk| {
            b.iter(|| black_box(chunk.encode().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &bytes, |b, bytes| {
            b.iter(|| black_box(Chunk::decode(black_box(bytes)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_codec);
criterion_main!(benches);
