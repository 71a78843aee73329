//! Node registry, subscription map, and event dispatch.

use std::collections::HashMap;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use screenlink_types::MessageType;

use crate::bus::{Event, EventQueue};
use crate::error::CoreError;
use crate::node::{Node, NodeStatus};

struct NodeEntry {
    node: Box<dyn Node>,
    status: NodeStatus,
}

struct ProducerDriver {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns every component, drives producers, and dispatches events.
///
/// Dispatch is strictly serial: each consumer's `handle_event` completes
/// before the next consumer sees the event, and the next event is not
/// dispatched until the previous one finished. The handoff logic depends
/// on this ordering.
pub struct NodeManager {
    queue: EventQueue,
    entries: Vec<NodeEntry>,
    index: HashMap<String, usize>,
    /// Event type -> consumer names, in subscription order.
    subscriptions: HashMap<MessageType, Vec<String>>,
    drivers: HashMap<String, ProducerDriver>,
}

impl NodeManager {
    #[must_use]
    pub fn new(queue: EventQueue) -> Self {
        Self {
            queue,
            entries: Vec::new(),
            index: HashMap::new(),
            subscriptions: HashMap::new(),
            drivers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Register a node; status starts as stopped. A second node with the
    /// same name is ignored.
    pub fn add(&mut self, node: Box<dyn Node>) {
        let name = node.name().to_string();
        if self.index.contains_key(&name) {
            warn!(node = %name, "node already registered; ignoring");
            return;
        }
        info!(node = %name, "node registered");
        self.index.insert(name, self.entries.len());
        self.entries.push(NodeEntry {
            node,
            status: NodeStatus::Stopped,
        });
    }

    /// Diagnostic lookup.
    #[must_use]
    pub fn get_node(&self, name: &str) -> Option<&dyn Node> {
        self.index
            .get(name)
            .map(|&idx| self.entries[idx].node.as_ref())
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<NodeStatus> {
        self.index.get(name).map(|&idx| self.entries[idx].status)
    }

    /// Register a consumer for an event type. Idempotent.
    pub fn subscribe(&mut self, ty: MessageType, consumer: &str) {
        let consumers = self.subscriptions.entry(ty).or_default();
        if !consumers.iter().any(|name| name == consumer) {
            consumers.push(consumer.to_string());
        }
    }

    /// Remove a consumer's registration for an event type.
    pub fn unsubscribe(&mut self, ty: MessageType, consumer: &str) {
        if let Some(consumers) = self.subscriptions.get_mut(&ty) {
            consumers.retain(|name| name != consumer);
        }
    }

    /// Start a node: run its setup, add declared subscriptions, and spawn
    /// the producer driver if it produces. Idempotent when already running.
    pub async fn setup(&mut self, name: &str) -> Result<(), CoreError> {
        let &idx = self
            .index
            .get(name)
            .ok_or_else(|| CoreError::NodeNotFound(name.to_string()))?;
        if self.entries[idx].status == NodeStatus::Running {
            return Ok(());
        }

        self.entries[idx].node.setup().await?;
        self.entries[idx].status = NodeStatus::Running;

        let declared = self.entries[idx]
            .node
            .consumer()
            .map(|consumer| consumer.subscriptions())
            .unwrap_or_default();
        for ty in declared {
            self.subscribe(ty, name);
        }

        let stream = self.entries[idx]
            .node
            .producer()
            .and_then(|producer| producer.event_stream());
        if let Some(mut rx) = stream {
            let token = CancellationToken::new();
            let task_token = token.clone();
            let queue = self.queue.clone();
            let origin = name.to_string();
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = task_token.cancelled() => break,
                        msg = rx.recv() => {
                            let Some(msg) = msg else {
                                debug!(node = %origin, "producer stream ended");
                                break;
                            };
                            let event = Event::new(origin.clone(), msg);
                            tokio::select! {
                                () = task_token.cancelled() => break,
                                result = queue.push(event) => {
                                    if result.is_err() {
                                        warn!(node = %origin, "bus closed; producer driver exiting");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            });
            self.drivers
                .insert(name.to_string(), ProducerDriver { token, handle });
        }

        info!(node = %name, "node setup complete");
        Ok(())
    }

    /// Stop a node: remove every subscription it holds (including ones
    /// added at runtime), cancel and await its producer driver, then run
    /// its teardown. Idempotent when already stopped.
    pub async fn teardown(&mut self, name: &str) -> Result<(), CoreError> {
        let &idx = self
            .index
            .get(name)
            .ok_or_else(|| CoreError::NodeNotFound(name.to_string()))?;
        if self.entries[idx].status == NodeStatus::Stopped {
            return Ok(());
        }

        for consumers in self.subscriptions.values_mut() {
            consumers.retain(|consumer| consumer != name);
        }

        if let Some(driver) = self.drivers.remove(name) {
            driver.token.cancel();
            let _ = driver.handle.await;
        }

        self.entries[idx].status = NodeStatus::Stopped;
        self.entries[idx].node.teardown().await?;
        info!(node = %name, "node teardown complete");
        Ok(())
    }

    /// Start every registered node, in registration order.
    pub async fn setup_all(&mut self) -> Result<(), CoreError> {
        let names: Vec<String> = self.entries.iter().map(|e| e.node.name().to_string()).collect();
        for name in names {
            self.setup(&name).await?;
        }
        Ok(())
    }

    /// Stop every running node, in reverse registration order. Individual
    /// failures are logged; teardown continues.
    pub async fn teardown_all(&mut self) {
        let names: Vec<String> = self
            .entries
            .iter()
            .rev()
            .map(|e| e.node.name().to_string())
            .collect();
        for name in names {
            if let Err(e) = self.teardown(&name).await {
                warn!(node = %name, error = %e, "teardown failed");
            }
        }
    }

    /// Deliver one event to its subscribed consumers, in subscription
    /// order, skipping the origin. A failing consumer is logged and
    /// skipped; it stays subscribed.
    pub async fn dispatch(&mut self, event: Event) {
        let ty = event.message.message_type();
        let Some(consumers) = self.subscriptions.get(&ty).cloned() else {
            return;
        };
        let queue = self.queue.clone();
        for name in consumers {
            if name == event.origin {
                continue;
            }
            let Some(&idx) = self.index.get(&name) else {
                continue;
            };
            let entry = &mut self.entries[idx];
            if entry.status != NodeStatus::Running {
                continue;
            }
            let Some(consumer) = entry.node.consumer() else {
                continue;
            };
            if let Err(e) = consumer.handle_event(&event, &queue).await {
                warn!(node = %name, event = ?ty, error = %e, "consumer failed; event skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Consumer, Producer};
    use async_trait::async_trait;
    use screenlink_types::{Message, SwitchOp};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Test node: optionally consumes CaptureControl, optionally produces.
    struct TestNode {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        consume: bool,
        stream: Option<mpsc::Receiver<Message>>,
        fail_handling: bool,
        setup_count: Arc<Mutex<u32>>,
        teardown_count: Arc<Mutex<u32>>,
    }

    impl TestNode {
        fn consuming(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log,
                consume: true,
                stream: None,
                fail_handling: false,
                setup_count: Arc::default(),
                teardown_count: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl Node for TestNode {
        fn name(&self) -> &str {
            self.name
        }

        async fn setup(&mut self) -> Result<(), CoreError> {
            *self.setup_count.lock().unwrap() += 1;
            Ok(())
        }

        async fn teardown(&mut self) -> Result<(), CoreError> {
            *self.teardown_count.lock().unwrap() += 1;
            Ok(())
        }

        fn consumer(&mut self) -> Option<&mut dyn Consumer> {
            if self.consume {
                Some(self)
            } else {
                None
            }
        }

        fn producer(&mut self) -> Option<&mut dyn Producer> {
            if self.stream.is_some() {
                Some(self)
            } else {
                None
            }
        }
    }

    #[async_trait]
    impl Consumer for TestNode {
        fn subscriptions(&self) -> Vec<MessageType> {
            vec![MessageType::CaptureControl]
        }

        async fn handle_event(
            &mut self,
            event: &Event,
            _bus: &EventQueue,
        ) -> Result<(), CoreError> {
            if self.fail_handling {
                return Err(CoreError::Command("boom".to_string()));
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("{}<-{}", self.name, event.origin));
            Ok(())
        }
    }

    impl Producer for TestNode {
        fn event_stream(&mut self) -> Option<mpsc::Receiver<Message>> {
            self.stream.take()
        }
    }

    fn capture_event(origin: &str) -> Event {
        Event::new(origin, Message::CaptureControl(SwitchOp::Start))
    }

    #[tokio::test]
    async fn dispatch_in_subscription_order_skipping_origin() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = NodeManager::new(EventQueue::new(8));
        manager.add(Box::new(TestNode::consuming("alpha", log.clone())));
        manager.add(Box::new(TestNode::consuming("beta", log.clone())));
        manager.add(Box::new(TestNode::consuming("gamma", log.clone())));
        manager.setup_all().await.unwrap();

        manager.dispatch(capture_event("beta")).await;

        let entries = log.lock().unwrap().clone();
        assert_eq!(entries, vec!["alpha<-beta", "gamma<-beta"]);
    }

    #[tokio::test]
    async fn failing_consumer_is_skipped_but_stays_subscribed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = NodeManager::new(EventQueue::new(8));
        let mut bad = TestNode::consuming("bad", log.clone());
        bad.fail_handling = true;
        manager.add(Box::new(bad));
        manager.add(Box::new(TestNode::consuming("good", log.clone())));
        manager.setup_all().await.unwrap();

        manager.dispatch(capture_event("x")).await;
        manager.dispatch(capture_event("x")).await;

        // The good consumer saw both events despite the bad one failing.
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_removes_subscriptions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = NodeManager::new(EventQueue::new(8));
        let node = TestNode::consuming("alpha", log.clone());
        let teardown_count = node.teardown_count.clone();
        manager.add(Box::new(node));
        manager.setup("alpha").await.unwrap();

        // Runtime subscription added dynamically.
        manager.subscribe(MessageType::Border, "alpha");

        manager.teardown("alpha").await.unwrap();
        manager.teardown("alpha").await.unwrap();
        assert_eq!(*teardown_count.lock().unwrap(), 1);

        assert!(manager
            .subscriptions
            .values()
            .all(|consumers| consumers.is_empty()));

        manager.dispatch(capture_event("x")).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribe_twice_equals_once() {
        let mut manager = NodeManager::new(EventQueue::new(8));
        manager.subscribe(MessageType::Border, "alpha");
        manager.subscribe(MessageType::Border, "alpha");
        assert_eq!(manager.subscriptions[&MessageType::Border].len(), 1);
    }

    #[tokio::test]
    async fn setup_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = NodeManager::new(EventQueue::new(8));
        let node = TestNode::consuming("alpha", log);
        let setup_count = node.setup_count.clone();
        manager.add(Box::new(node));
        manager.setup("alpha").await.unwrap();
        manager.setup("alpha").await.unwrap();
        assert_eq!(*setup_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn producer_driver_forwards_stream_to_queue() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(4);
        let mut node = TestNode::consuming("source", log);
        node.consume = false;
        node.stream = Some(rx);

        let queue = EventQueue::new(8);
        let mut manager = NodeManager::new(queue.clone());
        manager.add(Box::new(node));
        manager.setup("source").await.unwrap();

        tx.send(Message::CaptureControl(SwitchOp::Stop))
            .await
            .unwrap();
        let event = queue.pop().await.unwrap();
        assert_eq!(event.origin, "source");

        // Cancelling via teardown stops the driver promptly.
        manager.teardown("source").await.unwrap();
        assert!(manager.drivers.is_empty());
    }
}
