//! Priority-ordered, single-process message/event bus.
//!
//! The bus keeps two bounded priority queues, one for events and one for
//! routed messages. A drain pass repeatedly takes the next item across both
//! queues (highest priority, then earliest timestamp, then publish order)
//! and hands it to every matching handler or agent, one after another.
//! Each invocation races the configured handler timeout; failures and
//! timeouts are logged and counted but never stop the drain.
//!
//! The orchestrator's assess and recommend stages do not go through the
//! queues: [`MessageBus::request`] calls the target agent directly and
//! returns its response.

pub mod deadline;
pub mod dispatcher;
pub mod handler;
pub mod monitor;
pub mod queue;

pub use deadline::{Interrupted, run_with_deadline};
pub use dispatcher::BusDispatcher;
pub use handler::{EventHandler, FnEventHandler, FnMessageHandler, MessageHandler};
pub use monitor::{LatencyStats, PerformanceMonitor};
pub use queue::{BoundedPriorityQueue, PushOutcome, QueueKey};

use crate::agent::{Agent, AgentContext};
use crate::config::BusConfig;
use crate::error::{OrchestrationError, Result};
use crate::messages::{
    AgentEvent, AgentMessage, AgentResponse, EventKind, EventPayload, MessageKind, MessagePayload,
};
use crate::registry::AgentRegistry;
use crate::types::{AgentType, Participant, Priority, Recipient};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Events dispatched during the pass.
    pub events_dispatched: usize,
    /// Messages dispatched during the pass.
    pub messages_dispatched: usize,
    /// Handler invocations that returned an error.
    pub handler_failures: usize,
    /// Handler invocations that hit the deadline.
    pub handler_timeouts: usize,
    /// Wall time of the pass.
    pub elapsed: Duration,
    /// Whether the pass exceeded the bottleneck threshold.
    pub bottleneck: bool,
    /// True when another pass was already running and this one did nothing.
    pub skipped: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self { skipped: true, ..Self::default() }
    }

    /// Items dispatched during the pass.
    pub const fn dispatched(&self) -> usize {
        self.events_dispatched + self.messages_dispatched
    }
}

/// Cumulative bus counters and latency statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BusMetrics {
    /// Events accepted by `publish`.
    pub events_published: u64,
    /// Messages accepted by `route`.
    pub messages_routed: u64,
    /// Events dropped on overflow.
    pub events_evicted: u64,
    /// Messages dropped on overflow.
    pub messages_evicted: u64,
    /// Events dispatched.
    pub events_dispatched: u64,
    /// Messages dispatched.
    pub messages_dispatched: u64,
    /// Handler invocations that returned an error.
    pub handler_failures: u64,
    /// Handler invocations that hit the deadline.
    pub handler_timeouts: u64,
    /// Completed drain passes.
    pub drain_passes: u64,
    /// Drain passes flagged as bottlenecks.
    pub bottleneck_passes: u64,
    /// Events waiting in the queue.
    pub pending_events: usize,
    /// Messages waiting in the queue.
    pub pending_messages: usize,
    /// Duration of the latest drain pass.
    pub last_drain: Option<Duration>,
    /// Dispatch latency per event type or message kind.
    pub latencies: BTreeMap<String, LatencyStats>,
}

#[derive(Debug, Default)]
struct BusCounters {
    events_published: AtomicU64,
    messages_routed: AtomicU64,
    events_evicted: AtomicU64,
    messages_evicted: AtomicU64,
    events_dispatched: AtomicU64,
    messages_dispatched: AtomicU64,
    handler_failures: AtomicU64,
    handler_timeouts: AtomicU64,
    drain_passes: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

enum Dispatch {
    Event(AgentEvent),
    Message(AgentMessage),
}

/// Clears the processing flag when a drain pass ends, even by unwinding.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The message/event bus.
pub struct MessageBus {
    config: BusConfig,
    registry: AgentRegistry,
    events: Mutex<BoundedPriorityQueue<AgentEvent>>,
    messages: Mutex<BoundedPriorityQueue<AgentMessage>>,
    subscriptions: RwLock<HashMap<EventKind, Vec<AgentType>>>,
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    inbox: RwLock<Vec<(String, Arc<dyn MessageHandler>)>>,
    processing: AtomicBool,
    monitor: Mutex<PerformanceMonitor>,
    counters: BusCounters,
    wake: Notify,
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("pending_events", &self.events.try_lock().map(|q| q.len()).unwrap_or(0))
            .field("pending_messages", &self.messages.try_lock().map(|q| q.len()).unwrap_or(0))
            .field("processing", &self.processing.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MessageBus {
    /// Creates a bus with the given configuration.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        let events = BoundedPriorityQueue::new(config.max_queue_size);
        let messages = BoundedPriorityQueue::sharing_sequence(config.max_queue_size, &events);
        let monitor = PerformanceMonitor::new(config.bottleneck_threshold());

        Self {
            config,
            registry: AgentRegistry::new(),
            events: Mutex::new(events),
            messages: Mutex::new(messages),
            subscriptions: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            inbox: RwLock::new(Vec::new()),
            processing: AtomicBool::new(false),
            monitor: Mutex::new(monitor),
            counters: BusCounters::default(),
            wake: Notify::new(),
        }
    }

    /// The bus configuration.
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The agent registry.
    pub const fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Registers an agent and subscribes it to the kinds it asks for.
    ///
    /// # Errors
    /// Returns `DuplicateAgent` if the type is already registered.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let agent_type = agent.agent_type();
        let kinds = agent.subscriptions();
        self.registry.register(agent).await?;
        if !kinds.is_empty() {
            self.subscribe(agent_type, &kinds).await;
        }
        Ok(())
    }

    /// Delivers events of `kinds` to `agent_type` from now on.
    pub async fn subscribe(&self, agent_type: AgentType, kinds: &[EventKind]) {
        let mut subscriptions = self.subscriptions.write().await;
        for kind in kinds {
            let subscribers = subscriptions.entry(*kind).or_default();
            if !subscribers.contains(&agent_type) {
                subscribers.push(agent_type);
            }
        }
        debug!(agent = %agent_type, kinds = ?kinds, "Agent subscribed to events");
    }

    /// Registers a handler for one event kind. Handlers run in registration order.
    pub async fn register_handler(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.entry(kind).or_default().push(handler);
        debug!(kind = %kind, "Event handler registered");
    }

    /// Registers a handler for messages addressed to the orchestrator.
    /// `owner` names the component so it can later remove only its own handlers.
    pub async fn register_inbox(&self, owner: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let owner = owner.into();
        debug!(owner = %owner, "Inbox handler registered");
        self.inbox.write().await.push((owner, handler));
    }

    /// Removes the inbox handlers registered by `owner` and returns how many
    /// were removed.
    pub async fn remove_inbox(&self, owner: &str) -> usize {
        let mut inbox = self.inbox.write().await;
        let before = inbox.len();
        inbox.retain(|(registered_by, _)| registered_by != owner);
        before - inbox.len()
    }

    /// Queues an event for the next drain pass.
    pub async fn publish(&self, event: AgentEvent) {
        debug!(
            event_id = %event.id,
            kind = %event.kind(),
            source = %event.source,
            priority = ?event.priority,
            "Publishing event"
        );
        bump(&self.counters.events_published);

        let outcome = self.events.lock().await.push(event.priority, event.timestamp, event);
        if let PushOutcome::Evicted(evicted) = outcome {
            bump(&self.counters.events_evicted);
            warn!(
                event_id = %evicted.id,
                kind = %evicted.kind(),
                priority = ?evicted.priority,
                capacity = self.config.max_queue_size,
                "Event queue full, evicted lowest-priority event"
            );
        }
        self.wake.notify_one();
    }

    /// Queues a message for the next drain pass.
    pub async fn route(&self, message: AgentMessage) {
        debug!(
            message_id = %message.id,
            kind = %message.kind(),
            from = %message.from,
            to = %message.to,
            priority = ?message.priority,
            "Routing message"
        );
        bump(&self.counters.messages_routed);

        let outcome = self.messages.lock().await.push(message.priority, message.timestamp, message);
        if let PushOutcome::Evicted(evicted) = outcome {
            bump(&self.counters.messages_evicted);
            warn!(
                message_id = %evicted.id,
                kind = %evicted.kind(),
                to = %evicted.to,
                priority = ?evicted.priority,
                capacity = self.config.max_queue_size,
                "Message queue full, evicted lowest-priority message"
            );
        }
        self.wake.notify_one();
    }

    /// Sends `message` to its agent and waits for the response.
    ///
    /// # Arguments
    /// * `message` - A message addressed to an agent
    /// * `timeout` - Maximum time to wait for the agent
    ///
    /// # Errors
    /// Returns `AgentNotFound`, `AgentDegraded`, `AgentTimeout` or
    /// `AgentProcessingFailure`. Timeouts and failures are also published as
    /// `agent-failure` events.
    pub async fn request(&self, message: AgentMessage, timeout: Duration) -> Result<AgentResponse> {
        let Recipient::Agent(agent_type) = message.to else {
            let mut report = DrainReport::default();
            self.deliver_to_inbox(&message, &mut report).await;
            return Ok(AgentResponse::ack());
        };

        let agent =
            self.registry.get(agent_type).await.ok_or(OrchestrationError::AgentNotFound(agent_type))?;
        if self.registry.is_degraded(agent_type).await {
            debug!(agent = %agent_type, "Request to degraded agent rejected");
            return Err(OrchestrationError::AgentDegraded(agent_type));
        }

        let started = Instant::now();
        let result = self.invoke_agent(agent.as_ref(), &message, timeout).await;
        self.monitor.lock().await.record_dispatch(message.kind().as_str(), started.elapsed());

        match result {
            Ok(response) if response.success => Ok(response),
            Ok(response) => {
                let reason = response.error.unwrap_or_else(|| "unspecified failure".to_string());
                warn!(agent = %agent_type, reason = %reason, "Agent request failed");
                self.report_agent_failure(agent_type, reason.clone()).await;
                Err(OrchestrationError::AgentProcessingFailure { agent: agent_type, reason })
            }
            Err(limit) => {
                warn!(agent = %agent_type, timeout = ?limit, "Agent request timed out");
                self.report_agent_failure(agent_type, Interrupted::Elapsed(limit).to_string()).await;
                Err(OrchestrationError::AgentTimeout { agent: agent_type, timeout })
            }
        }
    }

    /// Publishes an `agent-failure` event for `agent_type`.
    pub async fn report_agent_failure(&self, agent_type: AgentType, reason: impl Into<String>) {
        self.publish(AgentEvent::new(
            Participant::Agent(agent_type),
            EventPayload::AgentFailure { agent: agent_type, reason: reason.into() },
            Priority::High,
        ))
        .await;
    }

    /// Runs one drain pass over both queues.
    ///
    /// Returns immediately with `skipped == true` if a pass is already running.
    pub async fn drain(&self) -> DrainReport {
        if self.processing.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            debug!("Drain already in progress");
            return DrainReport::skipped();
        }
        let _guard = ProcessingGuard(&self.processing);

        let started = Instant::now();
        let mut report = DrainReport::default();

        while let Some(item) = self.next_item().await {
            match item {
                Dispatch::Event(event) => {
                    self.dispatch_event(&event, &mut report).await;
                    report.events_dispatched += 1;
                }
                Dispatch::Message(message) => {
                    self.dispatch_message(&message, &mut report).await;
                    report.messages_dispatched += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        report.bottleneck =
            self.monitor.lock().await.record_drain(report.elapsed, report.dispatched());
        bump(&self.counters.drain_passes);
        report
    }

    /// True while a drain pass runs.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Number of queued events and messages.
    pub async fn pending(&self) -> (usize, usize) {
        let events = self.events.lock().await.len();
        let messages = self.messages.lock().await.len();
        (events, messages)
    }

    /// Snapshot of the bus counters.
    pub async fn metrics(&self) -> BusMetrics {
        let (pending_events, pending_messages) = self.pending().await;
        let monitor = self.monitor.lock().await;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        BusMetrics {
            events_published: load(&self.counters.events_published),
            messages_routed: load(&self.counters.messages_routed),
            events_evicted: load(&self.counters.events_evicted),
            messages_evicted: load(&self.counters.messages_evicted),
            events_dispatched: load(&self.counters.events_dispatched),
            messages_dispatched: load(&self.counters.messages_dispatched),
            handler_failures: load(&self.counters.handler_failures),
            handler_timeouts: load(&self.counters.handler_timeouts),
            drain_passes: load(&self.counters.drain_passes),
            bottleneck_passes: monitor.bottleneck_passes(),
            pending_events,
            pending_messages,
            last_drain: monitor.last_drain(),
            latencies: monitor.all_stats(),
        }
    }

    /// Waits until something is published or routed.
    pub(crate) async fn notified(&self) {
        self.wake.notified().await;
    }

    async fn next_item(&self) -> Option<Dispatch> {
        let mut events = self.events.lock().await;
        let mut messages = self.messages.lock().await;

        match (events.peek_key(), messages.peek_key()) {
            (Some(event_key), Some(message_key)) if message_key > event_key => {
                messages.pop().map(Dispatch::Message)
            }
            (Some(_), _) => events.pop().map(Dispatch::Event),
            (None, Some(_)) => messages.pop().map(Dispatch::Message),
            (None, None) => None,
        }
    }

    async fn dispatch_event(&self, event: &AgentEvent, report: &mut DrainReport) {
        let kind = event.kind();
        let started = Instant::now();
        let timeout = self.config.handler_timeout();

        let handlers = self.handlers.read().await.get(&kind).cloned().unwrap_or_default();
        for handler in handlers {
            let result =
                run_with_deadline(timeout, CancellationToken::new(), |_| handler.handle(event)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.count_failure(report);
                    warn!(event_id = %event.id, kind = %kind, error = %e, "Event handler failed");
                }
                Err(Interrupted::Panicked(reason)) => {
                    self.count_failure(report);
                    warn!(event_id = %event.id, kind = %kind, error = %reason, "Event handler panicked");
                }
                Err(Interrupted::Elapsed(limit)) => {
                    self.count_timeout(report);
                    warn!(event_id = %event.id, kind = %kind, timeout = ?limit, "Event handler timed out");
                }
            }
        }

        let subscribers = self.subscriptions.read().await.get(&kind).cloned().unwrap_or_default();
        for agent_type in subscribers {
            let Some(agent) = self.registry.get(agent_type).await else {
                continue;
            };
            if self.registry.is_degraded(agent_type).await {
                debug!(agent = %agent_type, kind = %kind, "Skipping degraded subscriber");
                continue;
            }

            let delivery = AgentMessage::new(
                event.source,
                Recipient::Agent(agent_type),
                MessagePayload::Event(event.clone()),
                event.priority,
            );
            // Subscriber failures are not re-published: a failing subscriber of
            // agent-failure would otherwise feed itself.
            match self.invoke_agent(agent.as_ref(), &delivery, self.config.handler_timeout()).await {
                Ok(response) if response.success => {}
                Ok(response) => {
                    self.count_failure(report);
                    warn!(
                        agent = %agent_type,
                        kind = %kind,
                        error = ?response.error,
                        "Subscribed agent failed to handle event"
                    );
                }
                Err(limit) => {
                    self.count_timeout(report);
                    warn!(agent = %agent_type, kind = %kind, timeout = ?limit, "Subscribed agent timed out");
                }
            }
        }

        bump(&self.counters.events_dispatched);
        self.monitor.lock().await.record_dispatch(kind.as_str(), started.elapsed());
    }

    async fn dispatch_message(&self, message: &AgentMessage, report: &mut DrainReport) {
        let started = Instant::now();

        match message.to {
            Recipient::Agent(agent_type) => self.deliver_to_agent(agent_type, message, report).await,
            Recipient::Orchestrator => self.deliver_to_inbox(message, report).await,
        }

        bump(&self.counters.messages_dispatched);
        self.monitor.lock().await.record_dispatch(message.kind().as_str(), started.elapsed());
    }

    async fn deliver_to_agent(
        &self,
        agent_type: AgentType,
        message: &AgentMessage,
        report: &mut DrainReport,
    ) {
        let Some(agent) = self.registry.get(agent_type).await else {
            warn!(message_id = %message.id, agent = %agent_type, "No agent registered for message, dropping");
            return;
        };
        if self.registry.is_degraded(agent_type).await {
            warn!(message_id = %message.id, agent = %agent_type, "Agent degraded, dropping message");
            return;
        }

        let response = match self.invoke_agent(agent.as_ref(), message, self.config.handler_timeout()).await {
            Ok(response) => response,
            Err(limit) => {
                self.count_timeout(report);
                warn!(message_id = %message.id, agent = %agent_type, timeout = ?limit, "Agent timed out");
                self.report_agent_failure(agent_type, Interrupted::Elapsed(limit).to_string()).await;
                return;
            }
        };

        if !response.success {
            self.count_failure(report);
            let reason = response.error.clone().unwrap_or_else(|| "unspecified failure".to_string());
            warn!(message_id = %message.id, agent = %agent_type, reason = %reason, "Agent failed to handle message");
            self.report_agent_failure(agent_type, reason).await;
        }

        if message.kind() == MessageKind::Request
            && let Some(reply_to) = message.from.as_recipient()
        {
            self.route(AgentMessage::new(
                Participant::Agent(agent_type),
                reply_to,
                MessagePayload::Reply { in_reply_to: message.id.clone(), response },
                message.priority,
            ))
            .await;
        }
    }

    async fn deliver_to_inbox(&self, message: &AgentMessage, report: &mut DrainReport) {
        let inbox: Vec<_> = self.inbox.read().await.iter().map(|(_, handler)| Arc::clone(handler)).collect();
        if inbox.is_empty() {
            debug!(message_id = %message.id, "No orchestrator inbox registered, dropping message");
            return;
        }

        let timeout = self.config.handler_timeout();
        for handler in inbox {
            let result =
                run_with_deadline(timeout, CancellationToken::new(), |_| handler.handle(message)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.count_failure(report);
                    warn!(message_id = %message.id, error = %e, "Inbox handler failed");
                }
                Err(Interrupted::Panicked(reason)) => {
                    self.count_failure(report);
                    warn!(message_id = %message.id, error = %reason, "Inbox handler panicked");
                }
                Err(Interrupted::Elapsed(limit)) => {
                    self.count_timeout(report);
                    warn!(message_id = %message.id, timeout = ?limit, "Inbox handler timed out");
                }
            }
        }
    }

    /// Calls `agent` under `timeout`. A panic becomes a failed response;
    /// `Err` carries the elapsed deadline.
    async fn invoke_agent(
        &self,
        agent: &dyn Agent,
        message: &AgentMessage,
        timeout: Duration,
    ) -> std::result::Result<AgentResponse, Duration> {
        let result = run_with_deadline(timeout, CancellationToken::new(), |cancel| {
            agent.handle_message(message, AgentContext { bus: self, cancel })
        })
        .await;
        match result {
            Ok(response) => Ok(response),
            Err(Interrupted::Panicked(reason)) => {
                Ok(AgentResponse::failure(format!("agent {} panicked: {reason}", agent.agent_type())))
            }
            Err(Interrupted::Elapsed(limit)) => Err(limit),
        }
    }

    fn count_failure(&self, report: &mut DrainReport) {
        report.handler_failures += 1;
        bump(&self.counters.handler_failures);
    }

    fn count_timeout(&self, report: &mut DrainReport) {
        report.handler_timeouts += 1;
        bump(&self.counters.handler_timeouts);
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{NoticeTopic, ResponsePayload};
    use crate::testing::ScriptedAgent;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex as StdMutex;

    fn failure_event(agent: AgentType, priority: Priority, secs: i64) -> AgentEvent {
        AgentEvent::new(
            Participant::Agent(agent),
            EventPayload::AgentFailure { agent, reason: format!("{agent}@{secs}") },
            priority,
        )
        .with_timestamp(Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn recorder(bus_log: &Arc<StdMutex<Vec<String>>>) -> Arc<dyn EventHandler> {
        let log = Arc::clone(bus_log);
        Arc::new(FnEventHandler::new(move |event: &AgentEvent| {
            if let EventPayload::AgentFailure { reason, .. } = &event.payload {
                log.lock().unwrap().push(reason.clone());
            }
            Ok(())
        }))
    }

    fn notice(to: Recipient) -> AgentMessage {
        AgentMessage::new(
            Participant::Agent(AgentType::Game),
            to,
            MessagePayload::Notice {
                learner_id: "kid".to_string(),
                topic: NoticeTopic::GameSuggestion,
                detail: "play".to_string(),
            },
            Priority::Medium,
        )
    }

    #[tokio::test]
    async fn test_drain_orders_by_priority_then_timestamp() {
        let bus = MessageBus::default();
        let log = Arc::new(StdMutex::new(Vec::new()));
        bus.register_handler(EventKind::AgentFailure, recorder(&log)).await;

        bus.publish(failure_event(AgentType::Game, Priority::Urgent, 1)).await; // A
        bus.publish(failure_event(AgentType::Reflection, Priority::Low, 0)).await; // B
        bus.publish(failure_event(AgentType::Assessment, Priority::Urgent, 0)).await; // C

        let report = bus.drain().await;
        assert_eq!(report.events_dispatched, 3);
        assert_eq!(*log.lock().unwrap(), vec!["assessment@0", "game@1", "reflection@0"]);
    }

    #[tokio::test]
    async fn test_fifo_within_priority_band() {
        let bus = MessageBus::default();
        let log = Arc::new(StdMutex::new(Vec::new()));
        bus.register_handler(EventKind::AgentFailure, recorder(&log)).await;

        for agent in [AgentType::Game, AgentType::Reflection, AgentType::Communication] {
            bus.publish(failure_event(agent, Priority::Medium, 7)).await;
        }
        bus.drain().await;
        assert_eq!(*log.lock().unwrap(), vec!["game@7", "reflection@7", "communication@7"]);
    }

    #[tokio::test]
    async fn test_overflow_evicts_lowest_priority_and_counts() {
        let bus = MessageBus::new(BusConfig { max_queue_size: 2, ..BusConfig::default() });
        let log = Arc::new(StdMutex::new(Vec::new()));
        bus.register_handler(EventKind::AgentFailure, recorder(&log)).await;

        bus.publish(failure_event(AgentType::Game, Priority::Low, 0)).await;
        bus.publish(failure_event(AgentType::Reflection, Priority::High, 1)).await;
        bus.publish(failure_event(AgentType::Assessment, Priority::Urgent, 2)).await;

        let metrics = bus.metrics().await;
        assert_eq!(metrics.events_evicted, 1);
        assert_eq!(metrics.pending_events, 2);

        bus.drain().await;
        assert_eq!(*log.lock().unwrap(), vec!["assessment@2", "reflection@1"]);
    }

    struct SlowHandler;

    #[async_trait]
    impl EventHandler for SlowHandler {
        async fn handle(&self, _event: &AgentEvent) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_and_failing_handlers_are_skipped() {
        let bus = MessageBus::new(BusConfig { handler_timeout_ms: 100, ..BusConfig::default() });
        let log = Arc::new(StdMutex::new(Vec::new()));
        bus.register_handler(EventKind::AgentFailure, Arc::new(SlowHandler)).await;
        bus.register_handler(
            EventKind::AgentFailure,
            Arc::new(FnEventHandler::new(|_: &AgentEvent| -> anyhow::Result<()> {
                anyhow::bail!("handler exploded")
            })),
        )
        .await;
        bus.register_handler(EventKind::AgentFailure, recorder(&log)).await;

        bus.publish(failure_event(AgentType::Game, Priority::High, 0)).await;
        bus.publish(failure_event(AgentType::Reflection, Priority::Medium, 0)).await;
        let report = bus.drain().await;

        assert_eq!(report.events_dispatched, 2);
        assert_eq!(report.handler_timeouts, 2);
        assert_eq!(report.handler_failures, 2);
        assert_eq!(*log.lock().unwrap(), vec!["game@0", "reflection@0"]);
    }

    #[tokio::test]
    async fn test_subscribed_agent_receives_events() {
        let bus = MessageBus::default();
        let agent = Arc::new(ScriptedAgent::new(AgentType::Game).subscribed_to([EventKind::StateUpdated]));
        bus.register_agent(agent.clone()).await.unwrap();

        bus.publish(AgentEvent::new(
            Participant::Orchestrator,
            EventPayload::StateUpdated { learner_id: "kid".into(), session_id: "s".into() },
            Priority::Medium,
        ))
        .await;
        bus.publish(failure_event(AgentType::Reflection, Priority::High, 0)).await;
        bus.drain().await;

        let received = agent.received();
        assert_eq!(received.len(), 1);
        assert!(matches!(&received[0].payload, MessagePayload::Event(e) if e.kind() == EventKind::StateUpdated));
    }

    #[tokio::test]
    async fn test_request_paths() {
        let bus = MessageBus::default();
        let ok = Arc::new(ScriptedAgent::new(AgentType::PathPlanning).with_reply(ResponsePayload::Recommendations(vec![])));
        let failing = Arc::new(ScriptedAgent::new(AgentType::Intervention).failing_messages());
        bus.register_agent(ok).await.unwrap();
        bus.register_agent(failing).await.unwrap();

        let to = |agent| notice(Recipient::Agent(agent));
        let timeout = Duration::from_secs(1);

        let response = bus.request(to(AgentType::PathPlanning), timeout).await.unwrap();
        assert_eq!(response.payload, Some(ResponsePayload::Recommendations(vec![])));

        let err = bus.request(to(AgentType::Intervention), timeout).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::AgentProcessingFailure { .. }));

        let err = bus.request(to(AgentType::Reflection), timeout).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::AgentNotFound(AgentType::Reflection)));

        bus.registry().set_degraded(AgentType::PathPlanning, true).await;
        let err = bus.request(to(AgentType::PathPlanning), timeout).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::AgentDegraded(AgentType::PathPlanning)));

        // The processing failure was published for the supervisor.
        assert_eq!(bus.metrics().await.pending_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let bus = MessageBus::default();
        let slow = Arc::new(ScriptedAgent::new(AgentType::Communication).with_delay(Duration::from_secs(30)));
        bus.register_agent(slow.clone()).await.unwrap();

        let err = bus
            .request(notice(Recipient::Agent(AgentType::Communication)), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::AgentTimeout { agent: AgentType::Communication, .. }));
        assert!(slow.received().is_empty());
    }

    #[tokio::test]
    async fn test_routed_request_reply_reaches_inbox() {
        let bus = MessageBus::default();
        bus.register_agent(Arc::new(ScriptedAgent::new(AgentType::PathPlanning))).await.unwrap();

        let inbox = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        bus.register_inbox("test", Arc::new(FnMessageHandler::new(move |message: &AgentMessage| {
            sink.lock().unwrap().push(message.kind());
            Ok(())
        })))
        .await;

        let state = crate::state::LearningState::new("kid", crate::state::LearnerProfile::new("Kid", 8));
        bus.route(AgentMessage::new(
            Participant::Orchestrator,
            Recipient::Agent(AgentType::PathPlanning),
            MessagePayload::AssessInteraction {
                learner_id: "kid".into(),
                interaction: crate::state::StudentInteraction::chat("hi"),
                state: Box::new(state),
            },
            Priority::Medium,
        ))
        .await;
        bus.route(notice(Recipient::Orchestrator)).await;

        let report = bus.drain().await;
        assert_eq!(report.messages_dispatched, 3);
        assert_eq!(*inbox.lock().unwrap(), vec![MessageKind::Notification, MessageKind::Response]);
    }

    #[tokio::test]
    async fn test_drain_is_single_flight() {
        let bus = MessageBus::default();
        bus.processing.store(true, Ordering::SeqCst);
        assert!(bus.drain().await.skipped);
        bus.processing.store(false, Ordering::SeqCst);
        assert!(!bus.drain().await.skipped);
        assert_eq!(bus.metrics().await.drain_passes, 1);
    }
}
