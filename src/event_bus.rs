//! L2: event bus.
//!
//! A list of listeners plus one queue of pending events. Each event occupies
//! two consecutive queue elements: a fixed-size code record, then a payload
//! record (possibly zero-length). `run` drains the queue and fans each event
//! out synchronously to every registered listener, most-recently-subscribed
//! first (subscription links at the head, same as `ez_event_bus_subscribe`'s
//! `EZ_LINKEDLIST_ADD_HEAD` followed by a head-first
//! `EZ_LINKEDLIST_FOR_EACH`).
//!
//! A listener must not call `send_event` on the same bus from within its own
//! callback: `run` holds no lock across the fan-out loop, so a reentrant
//! call would interleave with the draining in-progress, and nothing in this
//! module detects or prevents that -- it is a caller contract, not a
//! runtime-enforced one.

use crate::list::{Arena, List};
use crate::queue::Queue;

pub type EventCode = u32;

pub type ListenerFn = fn(EventCode, &[u8]);

struct Listener {
    callback: ListenerFn,
}

/// Token returned by `subscribe`, naming a registered listener so it can
/// later be removed with `unlisten`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(usize);

/// Registration + dispatch for one event bus.
///
/// `LISTENERS` bounds how many callbacks can be registered; `ITEMS`/`BLOCKS`
/// size the backing queue (two queue elements are consumed per event);
/// `MAX_PAYLOAD` bounds the scratch copy `run` makes of a payload while
/// draining, so delivery never needs a heap allocation.
pub struct EventBus<
    const LISTENERS: usize = 8,
    const ITEMS: usize = 32,
    const BLOCKS: usize = 128,
    const MAX_PAYLOAD: usize = 64,
> {
    listeners: Arena<Listener, LISTENERS>,
    order: List,
    queue: Queue<ITEMS, BLOCKS>,
}

impl<const LISTENERS: usize, const ITEMS: usize, const BLOCKS: usize, const MAX_PAYLOAD: usize>
    EventBus<LISTENERS, ITEMS, BLOCKS, MAX_PAYLOAD>
{
    pub const fn new() -> Self {
        EventBus {
            listeners: Arena::new(),
            order: List::new(),
            queue: Queue::new(),
        }
    }

    pub fn create(&mut self, buffer: &'static mut [u8]) -> bool {
        self.queue.create(buffer)
    }

    /// Re-initialises the listener list and drains every pending event.
    /// Leaves the backing queue's buffer installed -- only `listeners`,
    /// `order` and the queue's contents are reset, per §4.5.
    pub fn reset_bus(&mut self) {
        self.listeners = Arena::new();
        self.order = List::new();
        while self.queue.pop_front() {}
    }

    /// Links `callback` at the head of the listener list, so it is delivered
    /// before every previously-registered listener (§5: "most recently
    /// added first"). Returns a handle `unlisten` can later pass back in, or
    /// `None` if the listener table is full.
    pub fn subscribe(&mut self, callback: ListenerFn) -> Option<ListenerHandle> {
        match self.listeners.insert(Listener { callback }) {
            Ok(idx) => {
                self.order.push_front(&mut self.listeners, idx);
                Some(ListenerHandle(idx))
            }
            Err(_) => None,
        }
    }

    /// Unlinks the listener identified by `handle`. Returns `false` (without
    /// mutating any state) if `handle` does not currently name a listener
    /// registered on this bus -- a repeated `unlisten` is a clean no-op, not
    /// a panic.
    pub fn unlisten(&mut self, handle: ListenerHandle) -> bool {
        let idx = handle.0;
        if !self.order.iter(&self.listeners).any(|i| i == idx) {
            return false;
        }
        self.order.unlink(&mut self.listeners, idx);
        self.listeners.remove(idx);
        true
    }

    /// Enqueues an event for later delivery by `run`. Returns `false` if the
    /// backing queue has no room for both the code and payload records.
    pub fn send_event(&mut self, code: EventCode, payload: &[u8]) -> bool {
        if !self.queue.push(&code.to_ne_bytes()) {
            return false;
        }
        if !self.queue.push(payload) {
            // Roll back the code record so a partial send never leaves a
            // dangling code with no matching payload in the queue.
            self.queue.pop_back();
            return false;
        }
        true
    }

    /// Drains every pending event, delivering each to every listener --
    /// most-recently-subscribed first -- before moving to the next event. A
    /// payload longer than `MAX_PAYLOAD` is truncated in the copy handed to
    /// listeners -- `send_event` callers are expected to stay within that
    /// bound.
    pub fn run(&mut self) {
        loop {
            let Some(code) = self.queue.get_front() else {
                break;
            };
            let mut code_bytes = [0u8; 4];
            code_bytes.copy_from_slice(&code[..4]);
            let code = EventCode::from_ne_bytes(code_bytes);
            self.queue.pop_front();

            let mut payload = [0u8; MAX_PAYLOAD];
            let payload_len = self.queue.get_front().map_or(0, |p| {
                let n = p.len().min(MAX_PAYLOAD);
                payload[..n].copy_from_slice(&p[..n]);
                n
            });
            self.queue.pop_front();

            for idx in self.order.iter(&self.listeners) {
                (self.listeners.get(idx).callback)(code, &payload[..payload_len]);
            }
        }
    }

    pub fn pending_events(&self) -> usize {
        self.queue.num_elements() / 2
    }
}

impl<const LISTENERS: usize, const ITEMS: usize, const BLOCKS: usize> Default
    for EventBus<LISTENERS, ITEMS, BLOCKS>
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};
    use spin::Mutex;

    fn leaked(size: usize) -> &'static mut [u8] {
        Box::leak(std::vec![0u8; size].into_boxed_slice())
    }

    static SEEN_A: AtomicU32 = AtomicU32::new(0);
    static SEEN_B: AtomicU32 = AtomicU32::new(0);
    static SEEN_C: AtomicU32 = AtomicU32::new(0);

    fn listener_a(code: EventCode, _payload: &[u8]) {
        SEEN_A.fetch_add(code, Ordering::SeqCst);
    }

    fn listener_b(code: EventCode, _payload: &[u8]) {
        SEEN_B.fetch_add(code * 2, Ordering::SeqCst);
    }

    fn listener_c(code: EventCode, _payload: &[u8]) {
        SEEN_C.fetch_add(code, Ordering::SeqCst);
    }

    #[test]
    fn fans_out_to_every_listener() {
        let mut bus: EventBus<4, 16, 64> = EventBus::new();
        assert!(bus.create(leaked(512)));
        assert!(bus.subscribe(listener_a).is_some());
        assert!(bus.subscribe(listener_b).is_some());

        assert!(bus.send_event(7, b"hi"));
        assert_eq!(bus.pending_events(), 1);
        bus.run();

        assert_eq!(SEEN_A.load(Ordering::SeqCst), 7);
        assert_eq!(SEEN_B.load(Ordering::SeqCst), 14);
        assert_eq!(bus.pending_events(), 0);
    }

    #[test]
    fn empty_payload_events_round_trip() {
        let mut bus: EventBus<2, 8, 32> = EventBus::new();
        assert!(bus.create(leaked(256)));
        assert!(bus.subscribe(listener_c).is_some());
        assert!(bus.send_event(3, &[]));
        bus.run();
        assert_eq!(SEEN_C.load(Ordering::SeqCst), 3);
    }

    /// §5: listeners are invoked "most-recently-added first, since insertion
    /// is at head" -- verify LIFO delivery order, not just that every
    /// listener ran once (P5 alone doesn't catch ordering regressions).
    #[test]
    fn delivery_order_is_most_recently_subscribed_first() {
        static ORDER: Mutex<std::vec::Vec<&'static str>> = Mutex::new(std::vec::Vec::new());

        fn first(_code: EventCode, _payload: &[u8]) {
            ORDER.lock().push("first");
        }
        fn second(_code: EventCode, _payload: &[u8]) {
            ORDER.lock().push("second");
        }
        fn third(_code: EventCode, _payload: &[u8]) {
            ORDER.lock().push("third");
        }

        let mut bus: EventBus<4, 16, 64> = EventBus::new();
        assert!(bus.create(leaked(512)));
        assert!(bus.subscribe(first).is_some());
        assert!(bus.subscribe(second).is_some());
        assert!(bus.subscribe(third).is_some());

        assert!(bus.send_event(1, &[]));
        bus.run();

        assert_eq!(*ORDER.lock(), std::vec!["third", "second", "first"]);
    }

    #[test]
    fn unlisten_removes_a_listener_and_is_idempotent() {
        let mut bus: EventBus<4, 16, 64> = EventBus::new();
        assert!(bus.create(leaked(512)));
        let handle_a = bus.subscribe(listener_a).unwrap();
        assert!(bus.subscribe(listener_b).is_some());

        assert!(bus.unlisten(handle_a));
        assert!(!bus.unlisten(handle_a), "double unlisten must be a clean no-op");

        let before = SEEN_A.load(Ordering::SeqCst);
        assert!(bus.send_event(5, &[]));
        bus.run();
        assert_eq!(SEEN_A.load(Ordering::SeqCst), before, "unlistened callback must not run");
        assert_eq!(SEEN_B.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn reset_bus_clears_listeners_and_drains_pending_events() {
        let mut bus: EventBus<4, 16, 64> = EventBus::new();
        assert!(bus.create(leaked(512)));
        assert!(bus.subscribe(listener_a).is_some());
        assert!(bus.send_event(9, &[]));
        assert_eq!(bus.pending_events(), 1);

        bus.reset_bus();
        assert_eq!(bus.pending_events(), 0);

        let before = SEEN_A.load(Ordering::SeqCst);
        // The queue's buffer is still installed after a reset; only
        // listeners and pending events are cleared.
        assert!(bus.send_event(9, &[]));
        bus.run();
        assert_eq!(SEEN_A.load(Ordering::SeqCst), before, "reset must clear listeners too");
    }
}
