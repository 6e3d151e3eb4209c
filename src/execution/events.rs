use super::status::ExecutionMode;
use crate::model::Outcome;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Change notifications emitted while a state machine executes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    StatusChanged {
        from: ExecutionMode,
        to: ExecutionMode,
    },
    /// A state's `active` flag became true.
    StateEntered { path: String },
    /// A state's `active` flag became false.
    StateExited { path: String, outcome: Outcome },
}

/// Receives execution events. Called on the thread that produced the event.
pub trait Subscriber: Send + Sync {
    fn notify(&self, event: &ExecutionEvent);
}

impl<F> Subscriber for F
where
    F: Fn(&ExecutionEvent) + Send + Sync,
{
    fn notify(&self, event: &ExecutionEvent) {
        self(event)
    }
}

struct ChannelSubscriber {
    sender: Sender<ExecutionEvent>,
}

impl Subscriber for ChannelSubscriber {
    fn notify(&self, event: &ExecutionEvent) {
        // A dropped receiver just means nobody listens anymore.
        let _ = self.sender.send(event.clone());
    }
}

/// Publish/subscribe hub for execution events.
///
/// Publishing with no subscriber registered does nothing, so the engine
/// never depends on an observer being present.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Registers an unbounded channel and returns its receiving end.
    pub fn subscribe_channel(&self) -> Receiver<ExecutionEvent> {
        let (sender, receiver) = unbounded();
        self.subscribe(Arc::new(ChannelSubscriber { sender }));
        receiver
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.read().is_empty()
    }

    pub fn publish(&self, event: ExecutionEvent) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            subscriber.notify(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        bus.publish(ExecutionEvent::StateEntered {
            path: "root".to_string(),
        });
    }

    #[test]
    fn closures_and_channels_receive_events() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        bus.subscribe(Arc::new(move |_: &ExecutionEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let receiver = bus.subscribe_channel();

        bus.publish(ExecutionEvent::StateEntered {
            path: "root".to_string(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            receiver.try_recv().unwrap(),
            ExecutionEvent::StateEntered {
                path: "root".to_string()
            }
        );
    }
}
