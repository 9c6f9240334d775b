use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::net::Ipv4Addr;

use lodestar_resolver::cache::Cache;
use lodestar_wire::protocol::types::{Name, RData, Record, RecordType};

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for size in [1, 100, 1000] {
        let (records, _) = make_records(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| build_cache(records));
        });
    }
    group.finish();
}

fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get/hit");
    for size in [1, 100, 1000] {
        let (records, queries) = make_records(size);
        let cache = build_cache(&records);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &cache, |b, cache| {
            b.iter(|| {
                for (name, rtype) in &queries {
                    cache.get(name, *rtype);
                }
            });
        });
    }
    group.finish();
}

fn bench_get_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("get/miss");
    for size in [1, 100, 1000] {
        let (records, queries) = make_records(size);
        let cache = build_cache(&records);
        let name = Name::new("name.which.is.not.in.the.cache.example.com");
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &cache, |b, cache| {
            b.iter(|| {
                for (_, rtype) in &queries {
                    cache.get(&name, *rtype);
                }
            });
        });
    }
    group.finish();
}

fn bench_remove_expired(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_expired");
    for size in [1, 100, 1000] {
        let (records, _) = make_records(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter_batched(
                || build_cache(records),
                |mut cache| cache.remove_expired(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn build_cache(records: &[Record]) -> Cache {
    let mut cache = Cache::new();
    for record in records {
        cache.insert(record);
    }
    cache
}

fn make_records(size: usize) -> (Vec<Record>, Vec<(Name, RecordType)>) {
    let mut records = Vec::with_capacity(size);
    let mut queries = Vec::with_capacity(size);

    for i in 0..size {
        let name = Name::new(&format!("www-{}.example.com", i / 2));

        if i % 2 == 0 {
            queries.push((name.clone(), RecordType::A));
            records.push(Record {
                name,
                rdata: RData::A {
                    address: Ipv4Addr::from(u32::try_from(i).unwrap()),
                },
                ttl: 300,
            });
        } else {
            queries.push((name.clone(), RecordType::NS));
            records.push(Record {
                name: name.clone(),
                rdata: RData::NS {
                    nsdname: Name::new(&format!("ns-{}.example.com", i / 2)),
                },
                ttl: 300,
            });
        }
    }

    (records, queries)
}

criterion_group!(
    benches,
    bench_insert,
    bench_get_hit,
    bench_get_miss,
    bench_remove_expired
);
criterion_main!(benches);
