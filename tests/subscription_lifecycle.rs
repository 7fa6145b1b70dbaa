//! Subscription lifecycle invariants: duplicates, round-trips, snapshots,
//! panic isolation, and error-handler plumbing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use typebus::{
    Config, ErrorHandler, Handlers, Listener, Message, MessageBus, MessageType,
    PublicationError, PublishMode,
};

struct Ping;
impl Message for Ping {}

#[derive(Default)]
struct Counter {
    hits: AtomicUsize,
}
impl Listener for Counter {
    fn configure(handlers: &mut Handlers<Self>) {
        handlers.on::<Ping>(|listener, _ping| {
            listener.hits.fetch_add(1, Ordering::SeqCst);
        });
    }
}

#[derive(Default)]
struct Fragile {
    hits: AtomicUsize,
}
impl Listener for Fragile {
    fn configure(handlers: &mut Handlers<Self>) {
        handlers
            .on::<Ping>(|listener, _ping| {
                listener.hits.fetch_add(1, Ordering::SeqCst);
                panic!("handler blew up");
            })
            .named("fragile_ping");
    }
}

struct CapturedErrors(Mutex<Vec<String>>);
impl ErrorHandler for CapturedErrors {
    fn handle(&self, error: &PublicationError) {
        self.0.lock().unwrap().push(error.error.as_label().to_string());
    }
}

fn bus() -> MessageBus {
    MessageBus::with_config(Config {
        publish_mode: PublishMode::ExactWithSuperTypes,
        dispatch_threads: 2,
        ..Config::default()
    })
}

#[test]
fn duplicate_subscriptions_are_not_deduplicated() {
    let bus = bus();
    let listener = Arc::new(Counter::default());
    bus.subscribe(listener.clone());
    bus.subscribe(listener.clone());

    bus.publish(Ping);
    assert_eq!(listener.hits.load(Ordering::SeqCst), 2);

    // One unsubscribe removes one of the two attachments.
    bus.unsubscribe(&listener);
    bus.publish(Ping);
    assert_eq!(listener.hits.load(Ordering::SeqCst), 3);
}

#[test]
fn subscribe_unsubscribe_round_trip_behaves_like_never_subscribed() {
    let bus = bus();
    let listener = Arc::new(Counter::default());
    bus.subscribe(listener.clone());
    bus.unsubscribe(&listener);

    bus.publish(Ping);
    assert_eq!(listener.hits.load(Ordering::SeqCst), 0);

    // The subscription itself survives with an empty listener set.
    let subs = bus.subscription_manager().exact(MessageType::of::<Ping>());
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].listener_count(), 0);
}

#[test]
fn unsubscribing_a_never_subscribed_listener_is_a_no_op() {
    let bus = bus();
    bus.unsubscribe(&Arc::new(Counter::default()));
    bus.publish(Ping);
}

#[test]
fn unsubscribe_only_detaches_the_given_instance() {
    let bus = bus();
    let kept = Arc::new(Counter::default());
    let dropped = Arc::new(Counter::default());
    bus.subscribe(kept.clone());
    bus.subscribe(dropped.clone());

    bus.unsubscribe(&dropped);
    bus.publish(Ping);

    assert_eq!(kept.hits.load(Ordering::SeqCst), 1);
    assert_eq!(dropped.hits.load(Ordering::SeqCst), 0);
}

#[test]
fn a_panicking_handler_is_reported_and_isolated() {
    let bus = bus();
    let errors = Arc::new(CapturedErrors(Mutex::new(Vec::new())));
    bus.add_error_handler(errors.clone());

    let fragile = Arc::new(Fragile::default());
    let healthy = Arc::new(Counter::default());
    bus.subscribe(fragile.clone());
    bus.subscribe(healthy.clone());

    bus.publish(Ping);

    assert_eq!(fragile.hits.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        errors.0.lock().unwrap().as_slice(),
        ["handler_panicked"]
    );
}

#[test]
fn a_panicking_registration_marks_the_type_as_non_listener() {
    struct Broken;
    impl Listener for Broken {
        fn configure(_handlers: &mut Handlers<Self>) {
            panic!("registration failure");
        }
    }

    let bus = bus();
    let errors = Arc::new(CapturedErrors(Mutex::new(Vec::new())));
    bus.add_error_handler(errors.clone());

    bus.subscribe(Arc::new(Broken));
    // Reported once; the second subscribe takes the early-reject path.
    bus.subscribe(Arc::new(Broken));

    assert_eq!(
        errors.0.lock().unwrap().as_slice(),
        ["registration_panicked"]
    );
}

#[test]
fn shutdown_is_idempotent_and_clears_state() {
    let bus = bus();
    let listener = Arc::new(Counter::default());
    bus.subscribe(listener.clone());

    bus.shutdown();
    bus.shutdown();

    assert!(bus
        .subscription_manager()
        .exact(MessageType::of::<Ping>())
        .is_empty());
}

#[test]
fn exclusive_handlers_still_deliver() {
    #[derive(Default)]
    struct Serial {
        hits: AtomicUsize,
    }
    impl Listener for Serial {
        fn configure(handlers: &mut Handlers<Self>) {
            handlers
                .on::<Ping>(|listener, _ping| {
                    listener.hits.fetch_add(1, Ordering::SeqCst);
                })
                .exclusive(true);
        }
    }

    let bus = bus();
    let listener = Arc::new(Serial::default());
    bus.subscribe(listener.clone());

    bus.publish(Ping);
    bus.publish(Ping);
    assert_eq!(listener.hits.load(Ordering::SeqCst), 2);
}
