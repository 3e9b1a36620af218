//! Benchmarks for snapshot assembly
//!
//! Run with: cargo bench -p feedsync-core
//!
//! Every remote change re-decodes and re-sorts the whole collection, so
//! these establish baselines for:
//! - Building a snapshot from a fresh builder
//! - Rebuilding after one new pending document
//! - Stored-name generation for uploads

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use feedsync_core::media::stored_name;
use feedsync_core::sync::{RemoteDocument, SnapshotBuilder, TIMESTAMP_FIELD};
use feedsync_core::{CollectionRef, DocId, Post};
use serde_json::{json, Value};

fn remote_docs(count: usize) -> Vec<RemoteDocument> {
    (0..count)
        .map(|i| RemoteDocument {
            id: DocId::new(format!("doc-{:06}", i)),
            fields: json!({
                "avatar": "https://avatars/ann.png",
                "image": "",
                "text": format!("post number {}", i),
                "username": "ann",
                TIMESTAMP_FIELD: 1_700_000_000_000i64 + (i as i64 % 97),
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        })
        .collect()
}

// ============================================================================
// Snapshot Benchmarks
// ============================================================================

fn bench_build_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_snapshot");

    for size in [10usize, 100, 1000] {
        let docs = remote_docs(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &docs, |b, docs| {
            b.iter_batched(
                || (SnapshotBuilder::new(), docs.clone()),
                |(mut builder, docs)| black_box(builder.build::<Post>(&CollectionRef::Posts, docs)),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_rebuild_with_pending(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_with_pending");

    for size in [100usize, 1000] {
        let mut docs = remote_docs(size);
        let mut builder = SnapshotBuilder::new();
        let _: feedsync_core::Snapshot<Post> = builder.build(&CollectionRef::Posts, docs.clone());
        let mut pending = remote_docs(1).remove(0);
        pending.id = DocId::new("pending");
        pending.fields.insert(TIMESTAMP_FIELD.to_string(), Value::Null);
        docs.push(pending);

        group.bench_with_input(BenchmarkId::from_parameter(size), &docs, |b, docs| {
            b.iter(|| black_box(builder.build::<Post>(&CollectionRef::Posts, docs.clone())))
        });
    }

    group.finish();
}

// ============================================================================
// Upload Naming Benchmarks
// ============================================================================

fn bench_stored_name(c: &mut Criterion) {
    c.bench_function("stored_name", |b| b.iter(|| black_box(stored_name("cat.png"))));
}

criterion_group!(
    benches,
    bench_build_snapshot,
    bench_rebuild_with_pending,
    bench_stored_name
);
criterion_main!(benches);
