//! Sync engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use diffsync_bench::{mutate_text, random_text};
use diffsync_engine::{ClientSynchronizer, EngineConfig, SyncEngine, TextSynchronizer};
use diffsync_protocol::{ClientDocument, Edit, PatchMessage};
use diffsync_store::{FileDataStore, FileStoreConfig, InMemoryDataStore};
use tempfile::TempDir;

fn document(content: String) -> ClientDocument<String> {
    ClientDocument::new("bench", "client", content)
}

/// Benchmark a local edit followed by the peer's acknowledgement.
fn bench_round_trip_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");

    group.bench_function("memory", |b| {
        b.iter_batched(
            || {
                let engine = SyncEngine::new(
                    EngineConfig::default(),
                    TextSynchronizer,
                    InMemoryDataStore::<String>::new(),
                );
                let base = random_text(1024);
                engine.add_document(&document(base.clone())).unwrap();
                (engine, mutate_text(&base))
            },
            |(engine, edited)| {
                let message = engine.diff(&document(edited)).unwrap();
                let shadow = engine.shadow(&message.key()).unwrap().unwrap();
                let ack = Edit::new(
                    "bench",
                    "client",
                    shadow.client_version,
                    shadow.server_version,
                    TextSynchronizer.checksum(shadow.content()),
                );
                black_box(engine.patch(&PatchMessage::new("bench", "client", vec![ack])).unwrap());
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark queuing edits against the file store.
fn bench_diff_file_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    group.sample_size(20);

    group.bench_function("file_store", |b| {
        let dir = TempDir::new().unwrap();
        let store = FileDataStore::<String>::open(dir.path(), FileStoreConfig::default()).unwrap();
        let engine = SyncEngine::new(EngineConfig::default(), TextSynchronizer, store);
        let mut content = random_text(1024);
        engine.add_document(&document(content.clone())).unwrap();

        b.iter(|| {
            content = mutate_text(&content);
            // Keep the pending queue from growing without bound.
            engine.reset_document(&document(content.clone())).unwrap();
            content = mutate_text(&content);
            black_box(engine.diff(&document(content.clone())).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_round_trip_memory, bench_diff_file_store);
criterion_main!(benches);
