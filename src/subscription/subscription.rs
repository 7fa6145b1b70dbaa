//! # One handler, many listener instances.
//!
//! A [`Subscription`] binds one handler descriptor to the live instances of
//! its declaring listener type. It is created the first time the type is
//! subscribed and lives until manager shutdown, even with an empty listener
//! set, so publish paths can hold references into the index without
//! coordinating against deletion.
//!
//! ## Rules
//! - Listener entries are mutated only under the manager's write lock.
//! - Dispatch clones a snapshot of the entries and invokes without holding
//!   any lock; a subscribe racing a publish either is or is not in the
//!   snapshot, never observed half-way.
//! - Listeners are invoked in subscription order. A panic in one listener is
//!   caught, reported, and does not skip the remaining listeners.
//! - Duplicate entries are legal: subscribing the same instance twice means
//!   it is invoked twice per matching publish.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::error::{DispatchError, ErrorHandlers, PublicationError};
use crate::listener::handler::{HandlerDescriptor, HandlerFn, InvokeError};

/// Arguments of one dispatch, matching the handler shapes.
pub(crate) enum DispatchArgs<'a> {
    One(&'a dyn Any),
    Two(&'a dyn Any, &'a dyn Any),
    Three(&'a dyn Any, &'a dyn Any, &'a dyn Any),
    Array(&'a [&'a dyn Any]),
}

#[derive(Clone)]
struct ListenerEntry {
    instance: Arc<dyn Any + Send + Sync>,
    /// Present iff the handler is `exclusive`: serialises invocations on
    /// this listener entry.
    exclusive: Option<Arc<Mutex<()>>>,
}

/// Container binding one handler descriptor to its live listeners.
pub struct Subscription {
    descriptor: Arc<HandlerDescriptor>,
    listeners: RwLock<Vec<ListenerEntry>>,
}

impl Subscription {
    pub(crate) fn new(descriptor: Arc<HandlerDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// The handler this subscription dispatches to.
    #[inline]
    pub fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    /// Number of currently attached listener instances.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Appends a listener instance. Caller holds the manager write lock.
    pub(crate) fn add(&self, instance: Arc<dyn Any + Send + Sync>) {
        let exclusive = self
            .descriptor
            .exclusive()
            .then(|| Arc::new(Mutex::new(())));
        self.listeners.write().push(ListenerEntry {
            instance,
            exclusive,
        });
    }

    /// Removes the first entry holding the given instance pointer. No effect
    /// if absent. Caller holds the manager write lock.
    pub(crate) fn remove(&self, instance: *const ()) {
        let mut listeners = self.listeners.write();
        if let Some(position) = listeners
            .iter()
            .position(|entry| Arc::as_ptr(&entry.instance) as *const () == instance)
        {
            listeners.remove(position);
        }
    }

    /// Dispatches one publish to every attached listener, in subscription
    /// order. Returns the number of listeners invoked; failures count, since
    /// the handler did run.
    pub(crate) fn deliver(&self, args: &DispatchArgs<'_>, errors: &ErrorHandlers) -> usize {
        let snapshot: SmallVec<[ListenerEntry; 4]> = {
            let listeners = self.listeners.read();
            listeners.iter().cloned().collect()
        };

        for entry in &snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let _serialised = entry.exclusive.as_ref().map(|lock| lock.lock());
                self.invoke(&*entry.instance, args)
            }));

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(invoke_err)) => {
                    errors.report(self.error_for(DispatchError::TypeMismatch {
                        detail: invoke_err.to_string(),
                    }));
                }
                Err(panic_err) => {
                    let any = &*panic_err;
                    let info = if let Some(msg) = any.downcast_ref::<&'static str>() {
                        (*msg).to_string()
                    } else if let Some(msg) = any.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    errors.report(self.error_for(DispatchError::HandlerPanicked { info }));
                }
            }
        }
        snapshot.len()
    }

    fn invoke(&self, listener: &dyn Any, args: &DispatchArgs<'_>) -> Result<(), InvokeError> {
        match (self.descriptor.invoker(), args) {
            (HandlerFn::One(invoke), DispatchArgs::One(message)) => invoke(listener, *message),
            (HandlerFn::Two(invoke), DispatchArgs::Two(first, second)) => {
                invoke(listener, *first, *second)
            }
            (HandlerFn::Three(invoke), DispatchArgs::Three(first, second, third)) => {
                invoke(listener, *first, *second, *third)
            }
            (HandlerFn::Array(invoke), DispatchArgs::Array(elements)) => {
                invoke(listener, elements)
            }
            _ => Err(InvokeError::Arity),
        }
    }

    fn error_for(&self, error: DispatchError) -> PublicationError {
        PublicationError::new(error)
            .with_listener(self.descriptor.listener())
            .with_handler(self.descriptor.label())
            .with_message_types(self.descriptor.message_types().iter().copied())
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("handler", &self.descriptor.label())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{Handlers, Listener};
    use crate::message::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping;
    impl Message for Ping {}

    #[derive(Default)]
    struct Probe {
        hits: AtomicUsize,
        blow_up: bool,
    }

    impl Listener for Probe {
        fn configure(handlers: &mut Handlers<Self>) {
            handlers.on::<Ping>(|probe, _ping| {
                if probe.blow_up {
                    panic!("listener failure");
                }
                probe.hits.fetch_add(1, Ordering::SeqCst);
            });
        }
    }

    fn subscription() -> Arc<Subscription> {
        let mut handlers = Handlers::<Probe>::new();
        Probe::configure(&mut handlers);
        let descriptor = handlers.into_descriptors().remove(0);
        Subscription::new(Arc::new(descriptor))
    }

    fn instance(probe: &Arc<Probe>) -> Arc<dyn Any + Send + Sync> {
        probe.clone()
    }

    fn thin(probe: &Arc<Probe>) -> *const () {
        Arc::as_ptr(probe) as *const ()
    }

    #[test]
    fn listeners_are_invoked_in_subscription_order_and_counted() {
        let sub = subscription();
        let first = Arc::new(Probe::default());
        let second = Arc::new(Probe::default());
        sub.add(instance(&first));
        sub.add(instance(&second));

        let errors = ErrorHandlers::default();
        let delivered = sub.deliver(&DispatchArgs::One(&Ping), &errors);

        assert_eq!(delivered, 2);
        assert_eq!(first.hits.load(Ordering::SeqCst), 1);
        assert_eq!(second.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_instances_are_invoked_once_per_entry() {
        let sub = subscription();
        let probe = Arc::new(Probe::default());
        sub.add(instance(&probe));
        sub.add(instance(&probe));

        let errors = ErrorHandlers::default();
        sub.deliver(&DispatchArgs::One(&Ping), &errors);
        assert_eq!(probe.hits.load(Ordering::SeqCst), 2);

        // One remove drops one entry, not both.
        sub.remove(thin(&probe));
        assert_eq!(sub.listener_count(), 1);
    }

    #[test]
    fn remove_of_absent_listener_is_a_no_op() {
        let sub = subscription();
        let probe = Arc::new(Probe::default());
        sub.remove(thin(&probe));
        assert_eq!(sub.listener_count(), 0);
    }

    #[test]
    fn a_panicking_listener_does_not_skip_the_rest() {
        struct Captured(Mutex<Vec<String>>);
        impl crate::ErrorHandler for Captured {
            fn handle(&self, error: &PublicationError) {
                self.0.lock().push(error.error.as_label().to_string());
            }
        }

        let sub = subscription();
        let faulty = Arc::new(Probe {
            hits: AtomicUsize::new(0),
            blow_up: true,
        });
        let healthy = Arc::new(Probe::default());
        sub.add(instance(&faulty));
        sub.add(instance(&healthy));

        let errors = ErrorHandlers::default();
        let captured = Arc::new(Captured(Mutex::new(Vec::new())));
        errors.add(captured.clone());

        let delivered = sub.deliver(&DispatchArgs::One(&Ping), &errors);

        assert_eq!(delivered, 2);
        assert_eq!(healthy.hits.load(Ordering::SeqCst), 1);
        assert_eq!(captured.0.lock().as_slice(), ["handler_panicked"]);
    }
}
