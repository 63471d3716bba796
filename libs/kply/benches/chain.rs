// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{Criterion, criterion_group, criterion_main};
use futures::FutureExt;
use kply::adapter::yield_now;
use kply::combinator::{bind, ret, while_loop, zero};
use kply::{Ply, run};

const STEPS: u64 = 10_000;

fn chain(n: u64) -> Ply<u64> {
    let mut ply = ret(0);
    for _ in 0..n {
        ply = bind(ply, |x| ret(x + 1));
    }
    ply
}

fn synchronous_chain_10k(c: &mut Criterion) {
    c.bench_function("synchronous_chain_10k", |b| {
        b.iter(|| {
            let task = run(|| chain(STEPS));
            assert_eq!(task.now_or_never().unwrap().unwrap(), STEPS);
        });
    });
}

fn synchronous_loop_10k(c: &mut Criterion) {
    c.bench_function("synchronous_loop_10k", |b| {
        b.iter(|| {
            let mut remaining = STEPS;
            let task = run(move || {
                while_loop(
                    move || {
                        remaining -= 1;
                        remaining > 0
                    },
                    zero,
                )
            });
            task.now_or_never().unwrap().unwrap();
        });
    });
}

fn yielding_loop_10k(c: &mut Criterion) {
    c.bench_function("yielding_loop_10k", |b| {
        b.iter(|| {
            let mut remaining = STEPS;
            let task = run(move || {
                while_loop(
                    move || {
                        remaining -= 1;
                        remaining > 0
                    },
                    || bind(yield_now(), |()| zero()),
                )
            });
            task.now_or_never().unwrap().unwrap();
        });
    });
}

fn async_block_10k(c: &mut Criterion) {
    c.bench_function("async_block_10k", |b| {
        b.iter(|| {
            let fut = async {
                let mut x = 0;
                for _ in 0..STEPS {
                    x = core::future::ready(x + 1).await;
                }
                x
            };
            assert_eq!(fut.now_or_never().unwrap(), STEPS);
        });
    });
}

criterion_group!(
    benches,
    synchronous_chain_10k,
    synchronous_loop_10k,
    yielding_loop_10k,
    async_block_10k
);
criterion_main!(benches);
