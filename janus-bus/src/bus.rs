//! The [`EventBus`] worker: a single queue serving ordered, typed events
//! from broker callbacks to subscribers (§4.2).

use crate::event::{Event, Topic};
use chrono::Utc;
use janus_core::data::TickData;
use janus_core::shutdown::AsyncShutdown;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::warn;

/// Default capacity of the bounded tick ring buffer before the oldest
/// unread tick is dropped (§4.2 "bounded queue + drop-oldest on overflow for
/// TICKs only").
pub const DEFAULT_TICK_QUEUE_CAPACITY: usize = 4096;

/// Default cadence of the `TIMER` source (§4.2 "a fixed cadence (e.g., 1s)").
pub const DEFAULT_TIMER_CADENCE: Duration = Duration::from_secs(1);

/// Backlog length on the unbounded (non-tick) queue past which a warning is
/// logged once per crossing, per §4.2 "other kinds use unbounded with
/// backpressure warnings".
const BACKPRESSURE_WARN_THRESHOLD: usize = 10_000;
const BROADCAST_CAPACITY: usize = 4096;

struct Inner {
    tick_queue: Mutex<VecDeque<Arc<TickData>>>,
    tick_capacity: usize,
    tick_notify: Notify,
    tick_dropped: AtomicU64,

    other_tx: mpsc::UnboundedSender<Event>,
    pending_other: AtomicUsize,
    warned_backpressure: std::sync::atomic::AtomicBool,

    topic_subs: Mutex<HashMap<Topic, broadcast::Sender<Event>>>,
    symbol_subs: Mutex<HashMap<String, broadcast::Sender<Arc<TickData>>>>,
    generic_subs: broadcast::Sender<Event>,

    /// The OMS cache's dedicated ingest channel (§5 "OMS cache is written
    /// only by the EventBus worker"). Unbounded like `other_tx`, so the
    /// authoritative cache never silently drops an event the way a lagging
    /// `broadcast` subscriber would (§4.2, §8). `None` until the OMS cache
    /// registers itself via [`EventBus::register_oms_sink`].
    oms_sink: Mutex<Option<mpsc::UnboundedSender<Event>>>,
}

impl Inner {
    fn publish_tick(&self, tick: Arc<TickData>) {
        let mut queue = self.tick_queue.lock();
        if queue.len() >= self.tick_capacity {
            queue.pop_front();
            let dropped = self.tick_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                warn!(dropped, "tick queue overflow, dropping oldest unread tick");
            }
        }
        queue.push_back(tick);
        drop(queue);
        self.tick_notify.notify_one();
    }

    fn publish_other(&self, event: Event) {
        let pending = self.pending_other.fetch_add(1, Ordering::Relaxed) + 1;
        if pending > BACKPRESSURE_WARN_THRESHOLD {
            if !self.warned_backpressure.swap(true, Ordering::Relaxed) {
                warn!(pending, "event bus backlog past threshold, no events are being dropped");
            }
        } else {
            self.warned_backpressure.store(false, Ordering::Relaxed);
        }
        if self.other_tx.send(event).is_err() {
            warn!("event bus worker is not running, event dropped");
        }
    }

    fn drain_ticks(&self) {
        loop {
            let tick = {
                let mut queue = self.tick_queue.lock();
                queue.pop_front()
            };
            match tick {
                Some(tick) => self.dispatch(Event::Tick(tick)),
                None => break,
            }
        }
    }

    fn dispatch(&self, event: Event) {
        let topic = event.topic();

        if let Some(symbol_topic) = event.symbol_topic() {
            if let Event::Tick(tick) = &event {
                let subs = self.symbol_subs.lock();
                if let Some(tx) = subs.get(&symbol_topic) {
                    let _ = tx.send(Arc::clone(tick));
                }
            }
        }

        {
            let subs = self.topic_subs.lock();
            if let Some(tx) = subs.get(&topic) {
                let _ = tx.send(event.clone());
            }
        }

        if let Some(tx) = self.oms_sink.lock().as_ref() {
            let _ = tx.send(event.clone());
        }

        let _ = self.generic_subs.send(event);
    }
}

/// Single-producer-at-a-time ordered dispatch from broker callbacks to
/// subscribers. One worker task drains the queue and fans events out to
/// type-keyed and generic subscribers; a timer task emits `TIMER` at a fixed
/// cadence (§4.2).
pub struct EventBus {
    inner: Arc<Inner>,
    other_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    timer_cadence: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("running", &self.worker.lock().is_some())
            .finish()
    }
}

impl EventBus {
    pub fn new(tick_capacity: usize, timer_cadence: Duration) -> Self {
        let (other_tx, other_rx) = mpsc::unbounded_channel();
        let (generic_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tick_queue: Mutex::new(VecDeque::with_capacity(tick_capacity)),
                tick_capacity,
                tick_notify: Notify::new(),
                tick_dropped: AtomicU64::new(0),
                other_tx,
                pending_other: AtomicUsize::new(0),
                warned_backpressure: std::sync::atomic::AtomicBool::new(false),
                topic_subs: Mutex::new(HashMap::new()),
                symbol_subs: Mutex::new(HashMap::new()),
                generic_subs: generic_tx,
                oms_sink: Mutex::new(None),
            }),
            other_rx: Mutex::new(Some(other_rx)),
            shutdown_tx,
            shutdown_rx,
            timer_cadence,
            worker: Mutex::new(None),
            timer: Mutex::new(None),
        }
    }

    /// Non-blocking enqueue. Never blocks the calling thread (§4.2, §4.4
    /// "Gateway methods must return promptly").
    pub fn publish(&self, event: Event) {
        match event {
            Event::Tick(tick) => self.inner.publish_tick(tick),
            other => self.inner.publish_other(other),
        }
    }

    /// Subscribe to every event of a given [`Topic`].
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        let mut subs = self.inner.topic_subs.lock();
        subs.entry(topic)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to ticks for one `vt_symbol` only (§6 `eTick.<vt_symbol>`).
    pub fn subscribe_symbol(&self, vt_symbol: &str) -> broadcast::Receiver<Arc<TickData>> {
        let topic = format!("{}.{vt_symbol}", Topic::Tick.wire_name());
        let mut subs = self.inner.symbol_subs.lock();
        subs.entry(topic)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to every event regardless of kind (§4.2 "a set of generic
    /// subscribers"). Backed by a bounded `broadcast` channel: a subscriber
    /// that falls more than `BROADCAST_CAPACITY` events behind observes a
    /// `Lagged` error and misses the skipped events. Fine for best-effort
    /// consumers like the RPC publisher; the authoritative OMS cache must
    /// use [`EventBus::register_oms_sink`] instead.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.inner.generic_subs.subscribe()
    }

    /// Registers the single authoritative consumer's ingest channel (§5
    /// "OMS cache is written only by the EventBus worker"). Unlike
    /// `subscribe_all`, this is an unbounded `mpsc` channel fed directly
    /// from `Inner::dispatch`: no event is ever dropped on this path,
    /// matching §4.2/§8's "no other event kind is dropped" besides ticks
    /// under the bounded ring's overflow policy. Calling this more than
    /// once replaces the previous sink — intended to be called exactly
    /// once, by the OMS cache, at server startup.
    pub fn register_oms_sink(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.oms_sink.lock() = Some(tx);
        rx
    }

    /// Number of ticks dropped so far due to queue overflow. Exposed for
    /// tests and operator diagnostics, not part of the dispatch contract.
    pub fn tick_dropped_count(&self) -> u64 {
        self.inner.tick_dropped.load(Ordering::Relaxed)
    }

    /// Spawns the worker and timer tasks (§4.2 `start()`). Safe to call
    /// through a shared `Arc<EventBus>`: the handles it stores live behind a
    /// lock so a caller never needs exclusive ownership just to start or
    /// stop the bus.
    pub fn start(&self) {
        let mut worker_slot = self.worker.lock();
        if worker_slot.is_some() {
            return;
        }
        let mut other_rx = self
            .other_rx
            .lock()
            .take()
            .expect("EventBus::start called twice without stop");
        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.shutdown_rx.clone();
        *worker_slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            while let Ok(event) = other_rx.try_recv() {
                                inner.pending_other.fetch_sub(1, Ordering::Relaxed);
                                inner.dispatch(event);
                            }
                            inner.drain_ticks();
                            break;
                        }
                    }
                    maybe_event = other_rx.recv() => {
                        match maybe_event {
                            Some(event) => {
                                inner.pending_other.fetch_sub(1, Ordering::Relaxed);
                                inner.dispatch(event);
                            }
                            None => break,
                        }
                    }
                    _ = inner.tick_notify.notified() => {
                        inner.drain_ticks();
                    }
                }
            }
        }));
        drop(worker_slot);

        let inner = Arc::clone(&self.inner);
        let cadence = self.timer_cadence;
        let mut shutdown_rx = self.shutdown_rx.clone();
        *self.timer.lock() = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        inner.publish_other(Event::Timer(Utc::now()));
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// Stops accepting new timer ticks, drains whatever is already queued,
    /// then joins both tasks (§4.2 "`stop()` drains then joins"). Takes
    /// `&self` so it can be called through a shared `Arc<EventBus>` even
    /// while adapters elsewhere still hold their own clone.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            let _ = handle.await;
        }
        let timer = self.timer.lock().take();
        if let Some(handle) = timer {
            let _ = handle.await;
        }
    }
}

impl AsyncShutdown for EventBus {
    type Result = ();

    async fn shutdown(&mut self) -> Self::Result {
        EventBus::stop(self).await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_QUEUE_CAPACITY, DEFAULT_TIMER_CADENCE)
    }
}
