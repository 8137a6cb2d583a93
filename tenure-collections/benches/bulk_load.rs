use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tenure_collections::{HashLongMap, KeyState, LargeLongArray, LongMap, LongMapVersion};

const SIZES: [usize; 3] = [10_000, 100_000, 1_000_000];

/// Bulk load then probe every 64th key, for both map versions.
fn bench_map_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_bulk_load");
    for size in SIZES {
        let keys: Vec<i64> = (1..=size as i64).collect();
        group.throughput(Throughput::Elements(size as u64));
        for version in [LongMapVersion::Eager, LongMapVersion::DualMode] {
            group.bench_with_input(
                BenchmarkId::new(format!("{version:?}"), size),
                &keys,
                |b, keys| {
                    b.iter(|| {
                        let mut map: HashLongMap<u32> =
                            HashLongMap::builder().version(version).build();
                        map.put_multi_rows(keys.clone(), 1, KeyState::UniqueSorted)
                            .unwrap();
                        for key in keys.iter().step_by(64) {
                            black_box(map.get(*key));
                        }
                    })
                },
            );
        }
    }
    group.finish();
}

/// Sort an array appended in descending order.
fn bench_array_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_sort");
    for size in SIZES {
        let mut source = LargeLongArray::builder()
            .segment_size(65_536)
            .expected_capacity(size)
            .build()
            .unwrap();
        for value in (1..=size as i64).rev() {
            source.append(value).unwrap();
        }
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| {
                let mut array = source.clone();
                black_box(array.sort().unwrap());
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_map_bulk_load, bench_array_sort);
criterion_main!(benches);
