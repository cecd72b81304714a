//! Engine overhead benchmark suite
//!
//! Measures the work done around each statement rather than the database:
//! - Script parsing
//! - Template compilation and per-iteration rendering
//! - Scheduling a loop benchmark against an executor that does nothing

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbbench::databases::dry_run::DryRun;
use dbbench::descriptor::BenchmarkDescriptor;
use dbbench::harness::{CancelToken, Scheduler};
use dbbench::random::RandomSource;
use dbbench::script::parse_str;
use dbbench::template::Template;

const SCRIPT: &str = "\
\\benchmark once \\name setup
CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);

\\benchmark loop 1.0 \\name inserts
INSERT INTO t VALUES ({{.Iter}}, '{{call .RandString 3 10}}');

\\benchmark loop 0.5 \\name selects
-- look up by key
SELECT * FROM t WHERE id = {{.Iter}};

\\benchmark loop 0.25 \\parallel \\name updates
UPDATE t SET name = '{{call .RandString 3 10}}' WHERE id = {{.Iter}};

\\benchmark once \\name teardown
DROP TABLE t;
";

const INSERT: &str = "INSERT INTO Generic (GenericId, Name, Balance, Description) VALUES \
    ({{.Iter}}, '{{call .RandString 3 10}}', {{call .RandInt63n 9999999999}}, '{{call .RandString 0 100}}');";

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("script");

    group.bench_function("parse_small", |bencher| {
        bencher.iter(|| parse_str(black_box(SCRIPT)))
    });

    let large = SCRIPT.repeat(100);
    group.bench_function("parse_large", |bencher| {
        bencher.iter(|| parse_str(black_box(&large)))
    });

    group.finish();
}

fn bench_template(c: &mut Criterion) {
    let mut group = c.benchmark_group("template");

    group.bench_function("compile_insert", |bencher| {
        bencher.iter(|| Template::compile(black_box(INSERT)))
    });

    for (name, source) in [
        ("static", "SELECT 1;"),
        ("iter_only", "SELECT * FROM t WHERE id = {{.Iter}};"),
        ("insert", INSERT),
        ("date_and_id", "SELECT {{call .RandId \"t\" \"sqlite\"}}, '{{call .RandDate}}';"),
    ] {
        let template = Template::compile(source).unwrap();
        let mut rng = RandomSource::from_seed(42);
        let mut i = 0u64;
        group.bench_with_input(BenchmarkId::new("render", name), &template, |bencher, t| {
            bencher.iter(|| {
                i += 1;
                black_box(t.render(i, &mut rng))
            })
        });
    }

    group.finish();
}

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");
    group.sample_size(20);

    let scheduler = Scheduler::new(Arc::new(DryRun::new()), 0, CancelToken::new());
    let descriptor = BenchmarkDescriptor::looped("inserts", INSERT);

    for workers in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("loop_1000", workers),
            &workers,
            |bencher, &workers| {
                bencher.iter(|| {
                    let handle = scheduler.run(&descriptor, 1_000, workers).unwrap();
                    black_box(handle.join().unwrap())
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_template, bench_schedule);
criterion_main!(benches);
