use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sqlbridge::{PlaceholderStyle, Record, Value, build_insert, build_update};

/// A record with `n` columns: col0 = 0, col1 = "1", col2 = 2, ...
fn build_record(n: usize) -> Value {
    let mut record = Record::new();
    for i in 0..n {
        let column = format!("col{i}");
        if i % 2 == 0 {
            record.insert(&column, i as i64);
        } else {
            record.insert(&column, i.to_string());
        }
    }
    Value::Object(record)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/insert");

    for n in [1, 5, 10, 50, 100] {
        let record = build_record(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &record, |b, record| {
            b.iter(|| black_box(build_insert("t", record, &["id"], PlaceholderStyle::Numbered)));
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/update");

    for n in [1, 5, 10, 50, 100] {
        let data = build_record(n);
        let filter = build_record(n.min(3));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(build_update("t", &data, &filter, PlaceholderStyle::Positional)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_update);
criterion_main!(benches);
