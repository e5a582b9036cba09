use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use anyhow::bail;
use async_trait::async_trait;
use tracing::{error, trace, warn};

use crate::{context::BroadcastContext, event::Event};

/// Receives every event published after subscription.
///
/// Delivery is in subscription order, one event at a time; a handler never
/// sees event `n+1` before every subscriber has seen event `n`.
#[async_trait]
pub trait Subscriber: Send {
    async fn handle(&mut self, event: &Event, ctx: &BroadcastContext) -> anyhow::Result<()>;
}

#[async_trait]
impl Subscriber for Box<dyn Subscriber> {
    async fn handle(&mut self, event: &Event, ctx: &BroadcastContext) -> anyhow::Result<()> {
        (**self).handle(event, ctx).await
    }
}

/// Write-only handle onto the bus queue.
///
/// Handlers publish through this (via the context) instead of the bus
/// itself, so they cannot retain the bus across ticks. Events published
/// during delivery are appended and drained before the originating
/// [`EventBus::publish`] returns.
#[derive(Clone)]
pub struct Publisher {
    queue: Arc<Mutex<VecDeque<Event>>>,
    closed: Arc<AtomicBool>,
}

impl Publisher {
    pub fn publish(&self, event: Event) {
        if self.closed.load(Ordering::Relaxed) {
            warn!(event = event.name(), "rejected publish on closed bus");
            return;
        }
        trace!(event = event.name(), "queued");
        self.queue
            .lock()
            .expect("Shouldnt be poisoned")
            .push_back(event);
    }
}

#[cfg(any(test, feature = "unstable"))]
impl Publisher {
    /// Removes and returns everything queued without delivering it.
    pub fn take_queued(&self) -> Vec<Event> {
        self.queue
            .lock()
            .expect("Shouldnt be poisoned")
            .drain(..)
            .collect()
    }
}

/// Single-threaded cooperative pub/sub, rebuilt for every tick.
///
/// The queue drains to fixed point inside `publish`, so the effective
/// delivery order is a deterministic traversal of event causality.
pub struct EventBus {
    queue: Arc<Mutex<VecDeque<Event>>>,
    closed: Arc<AtomicBool>,
    subscribers: Vec<Box<dyn Subscriber>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            queue: Default::default(),
            closed: Default::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher {
            queue: self.queue.clone(),
            closed: self.closed.clone(),
        }
    }

    pub fn subscribe(&mut self, subscriber: impl Subscriber + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Enqueues `event` and drains the queue to fixed point.
    pub async fn publish(&mut self, event: Event, ctx: &BroadcastContext) -> anyhow::Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            bail!("bus is closed");
        }
        self.publisher().publish(event);
        self.drain(ctx).await;
        Ok(())
    }

    async fn drain(&mut self, ctx: &BroadcastContext) {
        loop {
            if self.closed.load(Ordering::Relaxed) {
                let abandoned = self.queue.lock().expect("Shouldnt be poisoned").len();
                if abandoned > 0 {
                    warn!(abandoned, "bus closed during delivery");
                }
                return;
            }
            let next = self.queue.lock().expect("Shouldnt be poisoned").pop_front();
            let Some(event) = next else {
                return;
            };
            trace!(event = event.name(), "delivering");
            for subscriber in self.subscribers.iter_mut() {
                if let Err(e) = subscriber.handle(&event, ctx).await {
                    // Not redelivered. The next tick re-evaluates from
                    // persisted state.
                    error!(event = event.name(), error = %e, "subscriber failed");
                }
            }
        }
    }

    /// Rejects further publishes; in-flight delivery is abandoned.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::BroadcastConfig,
        testing::{RecordedEvents, TestCollaborators},
    };

    struct Echo {
        seen: RecordedEvents,
        republish: Option<Event>,
    }

    #[async_trait]
    impl Subscriber for Echo {
        async fn handle(&mut self, event: &Event, ctx: &BroadcastContext) -> anyhow::Result<()> {
            self.seen.push(event.name());
            if event == &Event::Start {
                if let Some(e) = self.republish.take() {
                    ctx.publisher.publish(e);
                }
            }
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Subscriber for Failing {
        async fn handle(&mut self, _event: &Event, _ctx: &BroadcastContext) -> anyhow::Result<()> {
            bail!("boom")
        }
    }

    #[tokio::test]
    async fn nested_publishes_drain_in_causal_order() {
        let collaborators = TestCollaborators::new();
        let mut bus = EventBus::new();
        let first = RecordedEvents::default();
        let second = RecordedEvents::default();
        bus.subscribe(Echo {
            seen: first.clone(),
            republish: Some(Event::Started),
        });
        bus.subscribe(Echo {
            seen: second.clone(),
            republish: None,
        });
        let ctx = collaborators.context(BroadcastConfig::default(), bus.publisher());

        bus.publish(Event::Start, &ctx).await.unwrap();

        // The nested Started is appended behind Start for both subscribers.
        assert_eq!(vec!["startEvent", "startedEvent"], first.names());
        assert_eq!(vec!["startEvent", "startedEvent"], second.names());
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_stop_delivery() {
        let collaborators = TestCollaborators::new();
        let mut bus = EventBus::new();
        let seen = RecordedEvents::default();
        bus.subscribe(Failing);
        bus.subscribe(Echo {
            seen: seen.clone(),
            republish: None,
        });
        let ctx = collaborators.context(BroadcastConfig::default(), bus.publisher());

        bus.publish(Event::Finish, &ctx).await.unwrap();

        assert_eq!(vec!["finishEvent"], seen.names());
    }

    #[tokio::test]
    async fn closed_bus_rejects_publishes() {
        let collaborators = TestCollaborators::new();
        let mut bus = EventBus::new();
        let seen = RecordedEvents::default();
        bus.subscribe(Echo {
            seen: seen.clone(),
            republish: None,
        });
        let ctx = collaborators.context(BroadcastConfig::default(), bus.publisher());
        let publisher = bus.publisher();
        bus.close();

        assert!(bus.publish(Event::Start, &ctx).await.is_err());
        publisher.publish(Event::Finish);

        assert!(seen.names().is_empty());
    }
}
