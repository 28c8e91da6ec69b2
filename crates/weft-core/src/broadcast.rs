#![forbid(unsafe_code)]

//! Event fan-out.
//!
//! One [`EventBus`] sits between the backend input loop (the single
//! producer) and any number of consumers. Publishing never blocks: each
//! explicit subscription is an unbounded FIFO channel, and the implicit
//! *default* subscription that backs the convenience read APIs is a
//! bounded ring of [`DEFAULT_CAPACITY`] events with drop-oldest discard,
//! so an application that never reads cannot pin unbounded memory.
//!
//! # Ordering
//!
//! Per-subscriber order always matches publish order. No relative order
//! is guaranteed between subscribers.
//!
//! # Completion
//!
//! [`EventBus::complete`] marks terminal shutdown: later publishes are
//! dropped, blocked readers wake with [`Error::EndOfInput`] (or the
//! recorded failure), and later subscribers observe an already-ended
//! stream.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::event::Event;

/// Capacity of the implicit default subscription.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Subscriber {
    id: u64,
    tx: UnboundedSender<Event>,
}

#[derive(Debug, Default)]
struct Completion {
    ended: bool,
    /// Human-readable failure recorded at completion, if any.
    error: Option<String>,
}

#[derive(Debug)]
struct BusInner {
    subscribers: Mutex<Vec<Subscriber>>,
    /// `None` until the first default-read API call activates buffering.
    default_queue: Mutex<Option<VecDeque<Event>>>,
    notify: Notify,
    completion: Mutex<Completion>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Multi-subscriber event broadcaster.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                default_queue: Mutex::new(None),
                notify: Notify::new(),
                completion: Mutex::new(Completion::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Publish an event to every live subscription.
    ///
    /// Non-blocking and infallible; after [`complete`](Self::complete)
    /// the event is silently dropped.
    pub fn publish(&self, event: Event) {
        if lock(&self.inner.completion).ended {
            return;
        }

        {
            let mut subs = lock(&self.inner.subscribers);
            subs.retain(|s| s.tx.send(event.clone()).is_ok());
        }

        {
            let mut queue = lock(&self.inner.default_queue);
            if let Some(q) = queue.as_mut() {
                if q.len() >= DEFAULT_CAPACITY {
                    q.pop_front();
                    tracing::trace!("default event queue full, dropping oldest event");
                }
                q.push_back(event);
            }
        }
        self.inner.notify.notify_waiters();
    }

    /// Mark the stream as ended.
    pub fn complete(&self) {
        self.finish(None);
    }

    /// Mark the stream as ended with a failure that readers will observe.
    pub fn complete_with_error(&self, error: &Error) {
        self.finish(Some(error.to_string()));
    }

    fn finish(&self, error: Option<String>) {
        {
            let mut completion = lock(&self.inner.completion);
            if completion.ended {
                return;
            }
            completion.ended = true;
            completion.error = error;
        }
        // Dropping the senders ends every subscription stream.
        lock(&self.inner.subscribers).clear();
        self.inner.notify.notify_waiters();
        tracing::debug!("event bus completed");
    }

    /// True once [`complete`](Self::complete) has run.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        lock(&self.inner.completion).ended
    }

    fn end_error(&self) -> Error {
        let completion = lock(&self.inner.completion);
        match &completion.error {
            Some(msg) => Error::Io(std::io::Error::other(msg.clone())),
            None => Error::EndOfInput,
        }
    }

    /// Open a dedicated unbounded subscription.
    ///
    /// Dropping the handle unsubscribes; dropping the reader has the same
    /// effect on the next publish. Subscribing after completion returns an
    /// already-ended reader.
    #[must_use]
    pub fn subscribe(&self) -> (SubscriptionHandle, EventReader) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if !lock(&self.inner.completion).ended {
            lock(&self.inner.subscribers).push(Subscriber { id, tx });
        }
        (
            SubscriptionHandle {
                id,
                inner: Arc::clone(&self.inner),
            },
            EventReader {
                rx,
                bus: self.clone(),
            },
        )
    }

    /// Subscribe and expose the events as a [`Stream`].
    #[must_use]
    pub fn stream(&self) -> EventStream {
        let (handle, reader) = self.subscribe();
        EventStream {
            _handle: handle,
            inner: UnboundedReceiverStream::new(reader.rx),
        }
    }

    fn activate_default(&self) {
        let mut queue = lock(&self.inner.default_queue);
        if queue.is_none() {
            *queue = Some(VecDeque::with_capacity(DEFAULT_CAPACITY.min(64)));
        }
    }

    fn pop_default(&self) -> Option<Event> {
        lock(&self.inner.default_queue)
            .as_mut()
            .and_then(VecDeque::pop_front)
    }

    /// Pop the next event from the default subscription without waiting.
    #[must_use]
    pub fn try_read(&self) -> Option<Event> {
        self.activate_default();
        self.pop_default()
    }

    /// Clone the next buffered event without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<Event> {
        self.activate_default();
        lock(&self.inner.default_queue)
            .as_ref()
            .and_then(|q| q.front().cloned())
    }

    /// Await the next event on the default subscription.
    ///
    /// Cancel-safe: dropping the future never consumes an event.
    pub async fn read(&self) -> Result<Event> {
        self.activate_default();
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(event) = self.pop_default() {
                return Ok(event);
            }
            if self.is_completed() {
                return Err(self.end_error());
            }
            notified.await;
        }
    }

    /// [`read`](Self::read) that completes with [`Error::Cancelled`] when
    /// the token fires, without consuming an event.
    pub async fn read_cancellable(&self, cancel: &CancellationToken) -> Result<Event> {
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            event = self.read() => event,
        }
    }
}

/// Unsubscribes its subscription when dropped.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: u64,
    inner: Arc<BusInner>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        lock(&self.inner.subscribers).retain(|s| s.id != self.id);
    }
}

/// Reading half of a dedicated subscription (unbounded FIFO).
#[derive(Debug)]
pub struct EventReader {
    rx: UnboundedReceiver<Event>,
    bus: EventBus,
}

impl EventReader {
    /// Pop the next event without waiting.
    #[must_use]
    pub fn try_read(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Await the next event.
    pub async fn read(&mut self) -> Result<Event> {
        match self.rx.recv().await {
            Some(event) => Ok(event),
            None => Err(self.bus.end_error()),
        }
    }

    /// [`read`](Self::read) that completes with [`Error::Cancelled`] when
    /// the token fires, without consuming an event.
    pub async fn read_cancellable(&mut self, cancel: &CancellationToken) -> Result<Event> {
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            event = self.read() => event,
        }
    }
}

/// A subscription exposed as a [`Stream`] of events.
///
/// The stream ends when the bus completes.
#[derive(Debug)]
pub struct EventStream {
    _handle: SubscriptionHandle,
    inner: UnboundedReceiverStream<Event>,
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Key, KeyEvent};
    use tokio_stream::StreamExt;

    fn key(ch: char) -> Event {
        Event::Key(KeyEvent::from_char(ch))
    }

    #[tokio::test]
    async fn subscriber_sees_publish_order() {
        let bus = EventBus::new();
        let (_handle, mut reader) = bus.subscribe();
        bus.publish(key('a'));
        bus.publish(key('b'));
        assert_eq!(reader.read().await.unwrap(), key('a'));
        assert_eq!(reader.read().await.unwrap(), key('b'));
    }

    #[tokio::test]
    async fn default_queue_drops_oldest_beyond_capacity() {
        let bus = EventBus::new();
        assert!(bus.try_read().is_none()); // activate the default queue
        for i in 0..(DEFAULT_CAPACITY + 10) {
            bus.publish(Event::Text(format!("{i}")));
        }
        let first = bus.try_read().unwrap();
        assert_eq!(first, Event::Text("10".into()));
        let mut count = 1;
        while bus.try_read().is_some() {
            count += 1;
        }
        assert_eq!(count, DEFAULT_CAPACITY);
    }

    #[tokio::test]
    async fn default_queue_is_lazy() {
        let bus = EventBus::new();
        bus.publish(key('x')); // nothing is buffering yet
        assert!(bus.try_read().is_none());
        bus.publish(key('y'));
        assert_eq!(bus.try_read(), Some(key('y')));
    }

    #[tokio::test]
    async fn dropping_handle_unsubscribes() {
        let bus = EventBus::new();
        let (handle, mut reader) = bus.subscribe();
        bus.publish(key('a'));
        drop(handle);
        bus.publish(key('b'));
        assert_eq!(reader.read().await.unwrap(), key('a'));
        assert!(reader.read().await.unwrap_err().is_end_of_input());
    }

    #[tokio::test]
    async fn complete_wakes_blocked_reader() {
        let bus = EventBus::new();
        let reader_bus = bus.clone();
        let task = tokio::spawn(async move { reader_bus.read().await });
        tokio::task::yield_now().await;
        bus.complete();
        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_end_of_input());
    }

    #[tokio::test]
    async fn publish_after_complete_is_noop() {
        let bus = EventBus::new();
        bus.complete();
        bus.publish(key('a'));
        assert!(bus.try_read().is_none());
        let (_handle, mut reader) = bus.subscribe();
        assert!(reader.read().await.unwrap_err().is_end_of_input());
    }

    #[tokio::test]
    async fn cancellation_does_not_lose_events() {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = bus.read_cancellable(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        bus.publish(key('a'));
        assert_eq!(bus.try_read(), Some(key('a')));
    }

    #[tokio::test]
    async fn stream_yields_until_completion() {
        let bus = EventBus::new();
        let mut stream = bus.stream();
        bus.publish(key('a'));
        bus.publish(key('b'));
        bus.complete();
        assert_eq!(stream.next().await, Some(key('a')));
        assert_eq!(stream.next().await, Some(key('b')));
        assert_eq!(stream.next().await, None);
    }
}
