use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use langgraph_core::channel::{ChannelSpec, Persistence, Scope, UpdatePolicy};
use langgraph_core::event::EventBus;
use langgraph_core::graph::GraphBuilder;
use langgraph_core::node::{Node, NodeInput, NodeOutput};
use langgraph_core::schema::SchemaBuilder;
use langgraph_core::store::{Store, WriteBatch};
use langgraph_core::{FrontierMember, NextDirective, Result, Scheduler};

struct EchoNode {
    channel: &'static str,
}

#[async_trait]
impl Node for EchoNode {
    async fn invoke(&self, _input: NodeInput) -> Result<NodeOutput> {
        let mut writes = WriteBatch::new();
        writes.push(self.channel, Value::from("hi"));
        Ok(NodeOutput::commit(writes, NextDirective::End))
    }
}

fn schema() -> Arc<langgraph_core::schema::Schema> {
    Arc::new(
        SchemaBuilder::default()
            .channel(ChannelSpec::last_write_wins(
                "out",
                Scope::Global,
                UpdatePolicy::Single,
                Persistence::Ephemeral,
                "string",
                || Option::<String>::None,
            ))
            .build(),
    )
}

fn single_node_step_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let graph = Arc::new(GraphBuilder::default().node("a", Arc::new(EchoNode { channel: "out" })).start_at(["a"]).build().unwrap());

    c.bench_function("scheduler single-node step", |b| {
        b.to_async(&runtime).iter(|| {
            let graph = graph.clone();
            async move {
                let store = Arc::new(Store::new(schema()));
                let (bus, _rx) = EventBus::new(16);
                let scheduler = Scheduler::new(graph, store, bus, 4);
                let frontier = vec![FrontierMember::new("a", "__start__")];
                scheduler
                    .run_step(
                        0,
                        black_box(frontier),
                        &HashMap::new(),
                        &"run-1".to_string(),
                        &"thread-1".to_string(),
                        &CancellationToken::new(),
                    )
                    .await
                    .unwrap();
            }
        });
    });
}

fn fan_out_step_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut builder = GraphBuilder::default();
    let mut node_ids = Vec::new();
    for i in 0..16 {
        let id = format!("n{i}");
        builder = builder.node(id.clone(), Arc::new(EchoNode { channel: "out" }));
        node_ids.push(id);
    }
    let graph = Arc::new(builder.start_at(node_ids.clone()).build().unwrap());

    c.bench_function("scheduler 16-way fan-out step", |b| {
        b.to_async(&runtime).iter(|| {
            let graph = graph.clone();
            let node_ids = node_ids.clone();
            async move {
                let store = Arc::new(Store::new(schema()));
                let (bus, _rx) = EventBus::new(64);
                let scheduler = Scheduler::new(graph, store, bus, 4);
                let frontier: Vec<FrontierMember> = node_ids.iter().map(|id| FrontierMember::new(id.clone(), "__start__")).collect();
                scheduler
                    .run_step(
                        0,
                        black_box(frontier),
                        &HashMap::new(),
                        &"run-1".to_string(),
                        &"thread-1".to_string(),
                        &CancellationToken::new(),
                    )
                    .await
                    .unwrap();
            }
        });
    });
}

criterion_group!(benches, single_node_step_benchmark, fan_out_step_benchmark);
criterion_main!(benches);
