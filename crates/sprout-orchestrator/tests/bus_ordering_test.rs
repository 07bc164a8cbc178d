//! Delivery order and overflow behavior of the message bus.

use chrono::{TimeZone, Utc};
use sprout_orchestrator::bus::FnEventHandler;
use sprout_orchestrator::config::BusConfig;
use sprout_orchestrator::{AgentEvent, EventKind, EventPayload, MessageBus, Participant, Priority};
use std::sync::{Arc, Mutex};

fn labelled(label: &str, priority: Priority, second: i64) -> AgentEvent {
    let timestamp = Utc.timestamp_opt(1_700_000_000 + second, 0).single().unwrap();
    AgentEvent::new(
        Participant::Orchestrator,
        EventPayload::StateUpdated { learner_id: label.to_string(), session_id: "s".to_string() },
        priority,
    )
    .with_timestamp(timestamp)
}

fn recording_bus(config: BusConfig) -> (MessageBus, Arc<Mutex<Vec<String>>>) {
    let bus = MessageBus::new(config);
    let seen = Arc::new(Mutex::new(Vec::new()));
    (bus, seen)
}

async fn attach_recorder(bus: &MessageBus, seen: &Arc<Mutex<Vec<String>>>) {
    let sink = Arc::clone(seen);
    bus.register_handler(
        EventKind::StateUpdated,
        Arc::new(FnEventHandler::new(move |event: &AgentEvent| {
            if let EventPayload::StateUpdated { learner_id, .. } = &event.payload {
                sink.lock().unwrap().push(learner_id.clone());
            }
            Ok(())
        })),
    )
    .await;
}

#[tokio::test]
async fn test_priority_first_then_timestamp() {
    let (bus, seen) = recording_bus(BusConfig::default());
    attach_recorder(&bus, &seen).await;

    bus.publish(labelled("A", Priority::Urgent, 1)).await;
    bus.publish(labelled("B", Priority::Low, 0)).await;
    bus.publish(labelled("C", Priority::Urgent, 0)).await;
    let report = bus.drain().await;

    assert_eq!(report.events_dispatched, 3);
    assert_eq!(*seen.lock().unwrap(), vec!["C", "A", "B"]);
}

#[tokio::test]
async fn test_overflow_evicts_lowest_priority() {
    let config = BusConfig { max_queue_size: 2, ..BusConfig::default() };
    let (bus, seen) = recording_bus(config);
    attach_recorder(&bus, &seen).await;

    bus.publish(labelled("low", Priority::Low, 0)).await;
    bus.publish(labelled("high", Priority::High, 1)).await;
    bus.publish(labelled("urgent", Priority::Urgent, 2)).await;
    assert_eq!(bus.pending().await, (2, 0));

    bus.drain().await;
    assert_eq!(*seen.lock().unwrap(), vec!["urgent", "high"]);
    assert_eq!(bus.metrics().await.events_evicted, 1);
}
