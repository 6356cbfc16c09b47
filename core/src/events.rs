//! The per-session event bus (C10): a typed publish/subscribe point over the
//! fixed catalog in `conveyor_protocol::event`. One bus per agent, not a
//! process-wide singleton, so sessions never cross-talk.

use std::sync::Arc;
use std::sync::RwLock;

use conveyor_protocol::Event;
use conveyor_protocol::EventMsg;

pub type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// Thread-safe for `emit`/`on`/`off` per spec.md §5; subscriber lists are
/// stored behind an `RwLock` rather than append-only like the tool
/// registry's callbacks because UIs attach/detach listeners during a live
/// session.
#[derive(Default)]
pub struct EventBus {
    session_id: String,
    subscribers: RwLock<Vec<(String, String, Subscriber)>>,
}

impl EventBus {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to `event_name` (see `EventMsg::name`). Returns an opaque
    /// subscription id usable with `off`.
    pub fn on(&self, event_name: &str, handler: Subscriber) -> String {
        let sub_id = uuid::Uuid::new_v4().to_string();
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push((sub_id.clone(), event_name.to_string(), handler));
        }
        sub_id
    }

    pub fn off(&self, subscription_id: &str) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.retain(|(id, _, _)| id != subscription_id);
        }
    }

    pub fn emit(&self, msg: EventMsg) {
        let event = Event::new(self.session_id.clone(), msg);
        let name = event.msg.name();
        if let Ok(subs) = self.subscribers.read() {
            for (_, subscribed_name, handler) in subs.iter() {
                if subscribed_name == name {
                    handler(&event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[test]
    fn delivers_only_to_matching_subscribers() {
        let bus = EventBus::new("sess-1");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.on(
            "processing:completed",
            Arc::new(move |_e| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.on("processing:error", Arc::new(|_e| panic!("should not fire")));

        bus.emit(EventMsg::ProcessingCompleted {
            response: "hi".to_string(),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_subscriber() {
        let bus = EventBus::new("sess-1");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let sub = bus.on(
            "processing:aborted",
            Arc::new(move |_e| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.off(&sub);
        bus.emit(EventMsg::ProcessingAborted);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
