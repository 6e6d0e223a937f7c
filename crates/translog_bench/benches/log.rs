//! Log insert and query benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::HashSet;
use tempfile::TempDir;
use translog_bench::{fill, random_data, topic_names};
use translog_core::{
    Log, LogConfig, OpenMode, TimeRange, Timestamp, TopicFilter, TopicPattern,
};

/// Benchmark inserts into an in-memory log.
fn bench_memory_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_insert");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let log = Log::open_in_memory().unwrap();
            let data = random_data(size);
            let mut sec = 0;

            b.iter(|| {
                sec += 1;
                log.insert_message(Timestamp::new(sec, 0), "/bench", "bench.Bytes", black_box(&data))
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark inserts into a file-backed log, with and without a flush per insert.
fn bench_file_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_insert");
    group.sample_size(50);

    for sync in [false, true] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("sync_on_insert", sync), &sync, |b, &sync| {
            let temp_dir = TempDir::new().unwrap();
            let mut log = Log::new();
            log.open_with_config(
                temp_dir.path().join("bench.tlog"),
                OpenMode::ReadWrite,
                &LogConfig::new().sync_on_insert(sync),
            )
            .unwrap();
            let data = random_data(256);
            let mut sec = 0;

            b.iter(|| {
                sec += 1;
                log.insert_message(Timestamp::new(sec, 0), "/bench", "bench.Bytes", black_box(&data))
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark iterating a full log.
fn bench_full_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_scan");

    for count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let log = Log::open_in_memory().unwrap();
            fill(&log, &topic_names(4), count, 128).unwrap();

            b.iter(|| {
                let seen = log.all_messages().unwrap().map(|m| m.unwrap()).count();
                black_box(seen);
            });
        });
    }
    group.finish();
}

/// Benchmark selective queries over a log with many topics.
fn bench_selective_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("selective_query");
    let log = Log::open_in_memory().unwrap();
    let topics = topic_names(50);
    fill(&log, &topics, 10000, 128).unwrap();

    let one: HashSet<String> = [topics[7].clone()].into();
    group.bench_function("exact_topic", |b| {
        b.iter(|| black_box(log.query_messages(&one).unwrap().count()));
    });

    let pattern = TopicPattern::new("/topic1.*").unwrap();
    group.bench_function("pattern", |b| {
        b.iter(|| black_box(log.query_messages_matching(&pattern).unwrap().count()));
    });

    let window = TimeRange::between(Timestamp::new(4000, 0), Timestamp::new(4100, 0));
    group.bench_function("time_window", |b| {
        b.iter(|| black_box(log.query(&TopicFilter::All, window).unwrap().count()));
    });
    group.finish();
}

/// Benchmark reopening a file log, which rebuilds the index from disk.
fn bench_reopen(c: &mut Criterion) {
    let mut group = c.benchmark_group("reopen");
    group.sample_size(20);

    for count in [1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("bench.tlog");
            {
                let mut log = Log::new();
                log.open_with_config(
                    &path,
                    OpenMode::ReadWrite,
                    &LogConfig::new().sync_on_insert(false),
                )
                .unwrap();
                fill(&log, &topic_names(8), count, 128).unwrap();
            }

            b.iter(|| {
                let mut log = Log::new();
                log.open(black_box(&path), OpenMode::Read).unwrap();
                black_box(log.message_count().unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_memory_insert,
    bench_file_insert,
    bench_full_scan,
    bench_selective_query,
    bench_reopen,
);

criterion_main!(benches);
