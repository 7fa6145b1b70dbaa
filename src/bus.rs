//! # The message bus façade.
//!
//! Wires the subscription manager, the matching policy, the error-handler
//! plumbing, and the async dispatch pool into one front door.
//!
//! ## Architecture
//! ```text
//! publish(m)            publish_async(m)
//!     │                      │
//!     │                 [bounded MPMC queue] ──► bus-dispatch-N workers
//!     │                      │                        │
//!     └──────────► Publisher (tiers per PublishMode) ◄┘
//!                      │
//!                 SubscriptionManager lookups ──► Subscription::deliver
//! ```
//!
//! ## Rules
//! - Sync publishes run entirely on the caller's thread; async publishes run
//!   the same path on a pool worker.
//! - No publish panics or returns an error: every failure is routed to the
//!   registered error handlers.
//! - After [`shutdown`](MessageBus::shutdown) every operation is a safe
//!   no-op; publishes are reported as `ShutdownInProgress`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::dispatch::{Dispatcher, Job};
use crate::error::{DispatchError, ErrorHandler, ErrorHandlers, PublicationError};
use crate::listener::Listener;
use crate::message::{AnyMessage, Message, MessageType};
use crate::publish::Publisher;
use crate::subscription::SubscriptionManager;

/// In-process publish/subscribe message bus.
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use typebus::{Handlers, Listener, Message, MessageBus};
///
/// struct Tick;
/// impl Message for Tick {}
///
/// #[derive(Default)]
/// struct Clock {
///     ticks: AtomicUsize,
/// }
///
/// impl Listener for Clock {
///     fn configure(handlers: &mut Handlers<Self>) {
///         handlers.on::<Tick>(|clock, _tick| {
///             clock.ticks.fetch_add(1, Ordering::Relaxed);
///         });
///     }
/// }
///
/// let bus = MessageBus::new();
/// let clock = Arc::new(Clock::default());
/// bus.subscribe(clock.clone());
/// bus.publish(Tick);
/// assert_eq!(clock.ticks.load(Ordering::Relaxed), 1);
/// ```
pub struct MessageBus {
    publisher: Arc<Publisher>,
    dispatcher: Mutex<Dispatcher>,
    errors: Arc<ErrorHandlers>,
    shutting_down: AtomicBool,
}

impl MessageBus {
    /// Creates a bus with the default [`Config`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a bus with an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        let errors = Arc::new(ErrorHandlers::default());
        let manager = Arc::new(SubscriptionManager::new(errors.clone()));
        let publisher = Arc::new(Publisher::new(
            config.publish_mode,
            manager,
            errors.clone(),
        ));
        let dispatcher = Dispatcher::start(
            publisher.clone(),
            config.dispatch_threads_clamped(),
            config.queue_capacity_clamped(),
        );
        Self {
            publisher,
            dispatcher: Mutex::new(dispatcher),
            errors,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// The subscription state behind this bus, for inspection.
    pub fn subscription_manager(&self) -> &SubscriptionManager {
        self.publisher.manager()
    }

    /// Registers an error handler. Without one, the first reported error
    /// installs a console reporter.
    pub fn add_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        self.errors.add(handler);
    }

    /// Attaches a listener instance. Instances of types with no enabled
    /// handlers are ignored. Subscribing the same `Arc` twice attaches it
    /// twice.
    pub fn subscribe<L: Listener>(&self, listener: Arc<L>) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        self.publisher.manager().subscribe(listener);
    }

    /// Detaches one occurrence of the instance. A no-op for listeners that
    /// were never subscribed.
    pub fn unsubscribe<L: Listener>(&self, listener: &Arc<L>) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        self.publisher.manager().unsubscribe(listener);
    }

    /// Publishes one message synchronously on the calling thread.
    pub fn publish<M: Message>(&self, message: M) {
        if self.rejects(&[MessageType::of::<M>()]) {
            return;
        }
        self.publisher.publish_one(&AnyMessage::new(message));
    }

    /// Publishes two messages as one event to `(M1, M2)` handlers.
    pub fn publish_pair<M1: Message, M2: Message>(&self, first: M1, second: M2) {
        if self.rejects(&[MessageType::of::<M1>(), MessageType::of::<M2>()]) {
            return;
        }
        self.publisher
            .publish_two(&AnyMessage::new(first), &AnyMessage::new(second));
    }

    /// Publishes three messages as one event to `(M1, M2, M3)` handlers.
    pub fn publish_triple<M1: Message, M2: Message, M3: Message>(
        &self,
        first: M1,
        second: M2,
        third: M3,
    ) {
        if self.rejects(&[
            MessageType::of::<M1>(),
            MessageType::of::<M2>(),
            MessageType::of::<M3>(),
        ]) {
            return;
        }
        self.publisher.publish_three(
            &AnyMessage::new(first),
            &AnyMessage::new(second),
            &AnyMessage::new(third),
        );
    }

    /// Publishes an array of messages as one event to `[M]` handlers.
    pub fn publish_vec<M: Message>(&self, messages: Vec<M>) {
        if self.rejects(&[MessageType::array_of::<M>()]) {
            return;
        }
        let elements: Vec<AnyMessage> = messages.into_iter().map(AnyMessage::new).collect();
        self.publisher
            .publish_array(&elements, MessageType::of::<M>());
    }

    /// Enqueues one message for a dispatch worker.
    pub fn publish_async<M: Message>(&self, message: M) {
        let types = [MessageType::of::<M>()];
        if self.rejects(&types) {
            return;
        }
        self.enqueue(Job::One(AnyMessage::new(message)), &types);
    }

    /// Enqueues two messages for a dispatch worker.
    pub fn publish_pair_async<M1: Message, M2: Message>(&self, first: M1, second: M2) {
        let types = [MessageType::of::<M1>(), MessageType::of::<M2>()];
        if self.rejects(&types) {
            return;
        }
        self.enqueue(
            Job::Two(AnyMessage::new(first), AnyMessage::new(second)),
            &types,
        );
    }

    /// Enqueues three messages for a dispatch worker.
    pub fn publish_triple_async<M1: Message, M2: Message, M3: Message>(
        &self,
        first: M1,
        second: M2,
        third: M3,
    ) {
        let types = [
            MessageType::of::<M1>(),
            MessageType::of::<M2>(),
            MessageType::of::<M3>(),
        ];
        if self.rejects(&types) {
            return;
        }
        self.enqueue(
            Job::Three(
                AnyMessage::new(first),
                AnyMessage::new(second),
                AnyMessage::new(third),
            ),
            &types,
        );
    }

    /// Enqueues an array publish for a dispatch worker.
    pub fn publish_vec_async<M: Message>(&self, messages: Vec<M>) {
        let types = [MessageType::array_of::<M>()];
        if self.rejects(&types) {
            return;
        }
        let elements: Vec<AnyMessage> = messages.into_iter().map(AnyMessage::new).collect();
        self.enqueue(Job::Array(elements, MessageType::of::<M>()), &types);
    }

    /// True while async jobs are queued and not yet picked up by a worker.
    pub fn has_pending_messages(&self) -> bool {
        self.dispatcher.lock().has_pending()
    }

    /// Stops the dispatch pool and clears all subscription state.
    /// Idempotent; also invoked by `Drop`.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dispatcher.lock().shutdown();
        self.publisher.manager().shutdown();
    }

    fn rejects(&self, types: &[MessageType]) -> bool {
        if self.shutting_down.load(Ordering::Acquire) {
            self.errors.report(
                PublicationError::new(DispatchError::ShutdownInProgress)
                    .with_message_types(types.iter().copied()),
            );
            return true;
        }
        false
    }

    fn enqueue(&self, job: Job, types: &[MessageType]) {
        // Clone the sender out so a send blocked on a full queue does not
        // hold the dispatcher lock.
        let sender = self.dispatcher.lock().sender();
        let accepted = match sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !accepted {
            self.errors.report(
                PublicationError::new(DispatchError::ShutdownInProgress)
                    .with_message_types(types.iter().copied()),
            );
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}
