//! Node traits for the event bus.
//!
//! Components plug into the [`NodeManager`](crate::manager::NodeManager) as
//! nodes. A node may additionally act as a [`Consumer`] (receives
//! dispatched events), a [`Producer`] (feeds events into the bus through a
//! manager-driven task), or both. Capability accessors replace downcasting:
//! a node that consumes overrides [`Node::consumer`] to return itself.

use async_trait::async_trait;
use screenlink_types::{Message, MessageType};
use tokio::sync::mpsc;

use crate::bus::{Event, EventQueue};
use crate::error::CoreError;

/// Lifecycle status tracked by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Stopped,
    Running,
}

/// A managed component.
#[async_trait]
pub trait Node: Send {
    /// Stable name used for registration, dispatch origin, and lookup.
    fn name(&self) -> &str;

    /// Acquire resources and become operational.
    async fn setup(&mut self) -> Result<(), CoreError>;

    /// Release resources on every exit path; must be idempotent.
    async fn teardown(&mut self) -> Result<(), CoreError>;

    /// The consuming half of this node, if any.
    fn consumer(&mut self) -> Option<&mut dyn Consumer> {
        None
    }

    /// The producing half of this node, if any.
    fn producer(&mut self) -> Option<&mut dyn Producer> {
        None
    }
}

/// Receives dispatched events.
#[async_trait]
pub trait Consumer: Send {
    /// Event types to subscribe on setup. Further subscriptions may be
    /// added at runtime through the manager; teardown removes them all.
    fn subscriptions(&self) -> Vec<MessageType>;

    /// Handle one event. Events the consumer emits in response go through
    /// `bus`; dispatch waits for this call before moving to the next
    /// consumer. Errors are logged and the event is skipped for this
    /// consumer only.
    async fn handle_event(&mut self, event: &Event, bus: &EventQueue) -> Result<(), CoreError>;
}

/// Feeds events into the bus.
pub trait Producer: Send {
    /// Hand over the outbound stream. Called once per setup; the manager
    /// runs a driver task that forwards the stream into the shared queue
    /// with this node as origin.
    fn event_stream(&mut self) -> Option<mpsc::Receiver<Message>>;
}
