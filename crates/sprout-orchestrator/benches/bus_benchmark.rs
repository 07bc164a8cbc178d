//! Throughput benchmarks for the message bus and the interaction pipeline.
//!
//! Agents answer immediately, so the numbers measure queueing, dispatch and
//! pipeline overhead only.

use criterion::{Criterion, criterion_group, criterion_main};
use sprout_models::MockModel;
use sprout_orchestrator::bus::FnEventHandler;
use sprout_orchestrator::{
    AgentEvent, Engine, EngineConfig, EventKind, EventPayload, LearnerProfile, MessageBus,
    Participant, Priority, StudentInteraction,
};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

const PRIORITIES: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent];

fn event(i: usize) -> AgentEvent {
    AgentEvent::new(
        Participant::Orchestrator,
        EventPayload::StateUpdated { learner_id: format!("learner-{i}"), session_id: "bench".to_string() },
        PRIORITIES[i % PRIORITIES.len()],
    )
}

fn bench_publish_and_drain(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    for count in [100_usize, 1_000] {
        c.bench_function(&format!("bus_publish_drain_{count}events"), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let bus = MessageBus::default();
                    bus.register_handler(EventKind::StateUpdated, Arc::new(FnEventHandler::new(|_: &AgentEvent| Ok(()))))
                        .await;
                    for i in 0..count {
                        bus.publish(event(i)).await;
                    }
                    black_box(bus.drain().await)
                })
            });
        });
    }
}

fn bench_overflow(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("bus_publish_overflow_2000_into_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let bus = MessageBus::default();
                for i in 0..2_000 {
                    bus.publish(event(i)).await;
                }
                black_box(bus.metrics().await.events_evicted)
            })
        });
    });
}

fn bench_interaction(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(async {
        let engine = Engine::builder(EngineConfig::default())
            .with_default_agents(Arc::new(MockModel::new("bench".into())))
            .build()
            .await
            .unwrap();
        engine.start().await.unwrap();
        engine.orchestrator().initialize_learning_state("bench", LearnerProfile::new("Bench", 9)).await;
        engine
    });

    c.bench_function("orchestrator_single_interaction", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    engine
                        .orchestrator()
                        .process_student_interaction("bench", StudentInteraction::chat("what comes after 9?"))
                        .await,
                )
            })
        });
    });

    rt.block_on(engine.stop());
}

criterion_group!(benches, bench_publish_and_drain, bench_overflow, bench_interaction);
criterion_main!(benches);
