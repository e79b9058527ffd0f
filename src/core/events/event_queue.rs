//=========================================================================
// Event Queue
//=========================================================================
//
// Double-buffered pub/sub channel between event producers (input, state
// machines, scripts) and their consumers.
//
// Architecture:
//   Producers → enqueue() → pending
//                              ↓  begin_dispatch() swaps buffers
//   Coordinator ──────────→ processing → subscribers (snapshot per event)
//                              ↓  end_dispatch() recycles the buffer
//
// Pattern: enqueue (any time) → dispatch (once per frame) → repeat
//
// Events enqueued while a batch is being dispatched land in `pending`
// and are seen on the next dispatch, never the current one.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use log::{trace, warn};

//=== Internal Dependencies ===============================================

use super::event::{Event, EventKind, EventPayload};
use crate::core::script::{ScriptRef, VmGeneration};

//=== Public API ==========================================================

/// Opaque handle for an event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u32);

/// Type-erased native subscriber.
pub type NativeEventFn = Rc<RefCell<dyn FnMut(&Event)>>;

/// Who receives matching events.
#[derive(Clone)]
pub enum Subscriber {
    Native(NativeEventFn),
    Script(Rc<ScriptRef>),
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native"),
            Self::Script(r) => write!(f, "Script({})", r.generation()),
        }
    }
}

#[derive(Debug)]
struct Subscription {
    handle: SubscriptionHandle,
    kind: EventKind,
    subscriber: Subscriber,
}

//=========================================================================

/// Double-buffered event queue with kind-filtered subscribers.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Vec<Event>,
    processing: Vec<Event>,
    subscriptions: Vec<Subscription>,
    next_handle: u32,
    dispatching: bool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    //--- Producing --------------------------------------------------------

    /// Appends to the pending buffer. Never dispatches synchronously.
    pub fn enqueue(&mut self, event: impl Into<Event>) {
        self.pending.push(event.into());
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    /// Drops pending events past `len`.
    pub fn truncate_pending(&mut self, len: usize) {
        self.pending.truncate(len);
    }

    //--- Subscribing ------------------------------------------------------

    /// Subscribes a typed native closure to one payload type.
    pub fn subscribe<T, F>(&mut self, mut f: F) -> SubscriptionHandle
    where
        T: EventPayload,
        F: FnMut(&T) + 'static,
    {
        let erased = move |event: &Event| {
            if let Some(payload) = T::from_event(event) {
                f(payload);
            }
        };
        self.subscribe_raw(T::KIND, Subscriber::Native(Rc::new(RefCell::new(erased))))
    }

    /// Subscribes a script callback to every event of `kind`.
    pub fn subscribe_script(&mut self, kind: EventKind, callback: Rc<ScriptRef>) -> SubscriptionHandle {
        self.subscribe_raw(kind, Subscriber::Script(callback))
    }

    fn subscribe_raw(&mut self, kind: EventKind, subscriber: Subscriber) -> SubscriptionHandle {
        self.next_handle += 1;
        let handle = SubscriptionHandle(self.next_handle);
        self.subscriptions.push(Subscription { handle, kind, subscriber });
        trace!(target: "events", "Subscription {:?} for {kind}", handle);
        handle
    }

    /// Removes a subscription. Returns `false` for unknown handles.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.handle != handle);
        self.subscriptions.len() != before
    }

    /// Origin of a subscription (`Some(None)` for native subscribers),
    /// `None` for unknown handles.
    pub fn subscription_origin(&self, handle: SubscriptionHandle) -> Option<Option<VmGeneration>> {
        self.subscriptions
            .iter()
            .find(|s| s.handle == handle)
            .map(|s| match &s.subscriber {
                Subscriber::Script(r) => Some(r.generation()),
                Subscriber::Native(_) => None,
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Copies the subscribers for `event` in subscription order.
    pub fn subscribers_for(&self, event: &Event) -> Vec<Subscriber> {
        let kind = event.kind();
        self.subscriptions
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.subscriber.clone())
            .collect()
    }

    //--- Dispatch Buffers -------------------------------------------------

    /// Swaps pending into processing and hands the batch out.
    ///
    /// Returns `None` when a dispatch is already in progress.
    pub fn begin_dispatch(&mut self) -> Option<Vec<Event>> {
        if self.dispatching {
            warn!(target: "events", "Nested dispatch ignored; events stay pending");
            return None;
        }
        self.dispatching = true;
        mem::swap(&mut self.pending, &mut self.processing);
        Some(mem::take(&mut self.processing))
    }

    /// Returns the drained batch so its allocation is reused.
    pub fn end_dispatch(&mut self, mut batch: Vec<Event>) {
        batch.clear();
        self.processing = batch;
        self.dispatching = false;
    }

    pub fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    //--- Lifecycle --------------------------------------------------------

    /// Drops subscriptions pinned by `generation`. Returns the count.
    pub fn release_generation(&mut self, generation: VmGeneration) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| match &s.subscriber {
            Subscriber::Script(r) => r.generation() != generation,
            Subscriber::Native(_) => true,
        });
        before - self.subscriptions.len()
    }

    /// Drops every subscription and every queued event.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.pending.clear();
        self.processing.clear();
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{CustomEvent, InputActionEvent};
    use crate::core::input::Phase;

    fn custom(name: &str) -> CustomEvent {
        CustomEvent { name: name.into() }
    }

    fn run_native(queue: &RefCell<EventQueue>) {
        let Some(batch) = queue.borrow_mut().begin_dispatch() else {
            return;
        };
        for event in &batch {
            let subscribers = queue.borrow().subscribers_for(event);
            for subscriber in subscribers {
                if let Subscriber::Native(f) = subscriber {
                    (&mut *f.borrow_mut())(event);
                }
            }
        }
        queue.borrow_mut().end_dispatch(batch);
    }

    //=== Buffering =======================================================

    #[test]
    fn enqueue_only_fills_pending() {
        let mut queue = EventQueue::new();
        queue.enqueue(custom("a"));
        queue.enqueue(custom("b"));
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn begin_dispatch_swaps_and_empties_pending() {
        let mut queue = EventQueue::new();
        queue.enqueue(custom("a"));

        let batch = queue.begin_dispatch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(queue.pending_len(), 0);

        queue.enqueue(custom("b"));
        assert!(queue.begin_dispatch().is_none(), "nested dispatch refused");
        queue.end_dispatch(batch);

        let next = queue.begin_dispatch().unwrap();
        assert_eq!(next, vec![Event::Custom(custom("b"))]);
    }

    #[test]
    fn truncate_pending_drops_tail() {
        let mut queue = EventQueue::new();
        queue.enqueue(custom("keep"));
        queue.enqueue(custom("drop"));
        queue.truncate_pending(1);
        assert_eq!(queue.pending(), &[Event::Custom(custom("keep"))]);
    }

    //=== Subscriptions ===================================================

    #[test]
    fn typed_subscribers_see_only_their_payload_in_fifo_order() {
        let queue = RefCell::new(EventQueue::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        queue
            .borrow_mut()
            .subscribe::<CustomEvent, _>(move |e| sink.borrow_mut().push(e.name.clone()));

        queue.borrow_mut().enqueue(custom("first"));
        queue.borrow_mut().enqueue(InputActionEvent::new("jump", Phase::Pressed));
        queue.borrow_mut().enqueue(custom("second"));
        run_native(&queue);

        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn events_enqueued_during_dispatch_wait_for_next_pass() {
        let queue = Rc::new(RefCell::new(EventQueue::new()));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let producer = Rc::clone(&queue);
        let sink = Rc::clone(&seen);
        queue.borrow_mut().subscribe::<CustomEvent, _>(move |e| {
            sink.borrow_mut().push(e.name.clone());
            if e.name == "ping" {
                producer.borrow_mut().enqueue(custom("pong"));
            }
        });

        queue.borrow_mut().enqueue(custom("ping"));
        run_native(&queue);
        assert_eq!(*seen.borrow(), vec!["ping"]);

        run_native(&queue);
        assert_eq!(*seen.borrow(), vec!["ping", "pong"]);
    }

    #[test]
    fn unsubscribe_inside_callback_fires_once() {
        let queue = Rc::new(RefCell::new(EventQueue::new()));
        let count = Rc::new(RefCell::new(0));
        let handle = Rc::new(RefCell::new(None));

        let q = Rc::clone(&queue);
        let c = Rc::clone(&count);
        let h = Rc::clone(&handle);
        let subscribed = queue.borrow_mut().subscribe::<CustomEvent, _>(move |_| {
            *c.borrow_mut() += 1;
            if let Some(own) = h.borrow_mut().take() {
                q.borrow_mut().unsubscribe(own);
            }
        });
        *handle.borrow_mut() = Some(subscribed);

        queue.borrow_mut().enqueue(custom("a"));
        queue.borrow_mut().enqueue(custom("b"));
        run_native(&queue);

        assert_eq!(*count.borrow(), 1);
        assert_eq!(queue.borrow().subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_unknown_handle_is_false() {
        let mut queue = EventQueue::new();
        assert!(!queue.unsubscribe(SubscriptionHandle(1)));
    }

    #[test]
    fn clear_drops_events_and_subscribers() {
        let mut queue = EventQueue::new();
        queue.subscribe::<CustomEvent, _>(|_| {});
        queue.enqueue(custom("x"));
        queue.clear();
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(queue.subscriber_count(), 0);
    }
}
