use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use langgraph_checkpoint::{Checkpoint, CheckpointFormatVersion, CheckpointStore, InMemoryCheckpointStore};

fn sample_checkpoint(thread_id: &str, id: &str, step: u64) -> Checkpoint {
    Checkpoint {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        run_id: "bench-run".to_string(),
        step_index: step,
        schema_version: "hsw.v1".to_string(),
        graph_version: "bench-graph".to_string(),
        checkpoint_format_version: CheckpointFormatVersion::CURRENT,
        store_payloads: BTreeMap::new(),
        frontier: vec![],
        pending_interrupt: None,
    }
}

fn checkpoint_save_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint save", |b| {
        b.to_async(&runtime).iter(|| async {
            let store = InMemoryCheckpointStore::new();
            store
                .save(black_box(sample_checkpoint("bench-thread", "cp-0", 0)))
                .await
                .unwrap();
        });
    });
}

fn checkpoint_load_latest_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint load_latest", |b| {
        b.to_async(&runtime).iter(|| async {
            let store = InMemoryCheckpointStore::new();
            store
                .save(sample_checkpoint("bench-thread", "cp-0", 0))
                .await
                .unwrap();
            store.load_latest(black_box("bench-thread")).await.unwrap();
        });
    });
}

criterion_group!(benches, checkpoint_save_benchmark, checkpoint_load_latest_benchmark);
criterion_main!(benches);
