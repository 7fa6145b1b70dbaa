//! Concurrent subscribe/publish behavior and the async dispatch pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use typebus::{Config, Handlers, Listener, Message, MessageBus, MessageType, PublishMode};

struct Alpha;
impl Message for Alpha {}
struct Beta;
impl Message for Beta {}
struct Gamma;
impl Message for Gamma {}

macro_rules! counting_listener {
    ($name:ident, $message:ty) => {
        #[derive(Default)]
        struct $name {
            hits: AtomicUsize,
        }
        impl Listener for $name {
            fn configure(handlers: &mut Handlers<Self>) {
                handlers.on::<$message>(|listener, _message| {
                    listener.hits.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
    };
}

counting_listener!(OnAlpha, Alpha);
counting_listener!(OnBeta, Beta);
counting_listener!(OnGamma, Gamma);

fn bus() -> MessageBus {
    MessageBus::with_config(Config {
        publish_mode: PublishMode::ExactWithSuperTypes,
        dispatch_threads: 2,
        ..Config::default()
    })
}

const INSTANCES_PER_LISTENER: usize = 5_000;
const THREADS: usize = 10;

#[test]
fn concurrent_subscribes_settle_to_exact_listener_counts() {
    let bus = Arc::new(bus());

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let bus = bus.clone();
            scope.spawn(move || {
                for _ in 0..INSTANCES_PER_LISTENER / THREADS {
                    bus.subscribe(Arc::new(OnAlpha::default()));
                    bus.subscribe(Arc::new(OnBeta::default()));
                    bus.subscribe(Arc::new(OnGamma::default()));
                }
            });
        }
    });

    let manager = bus.subscription_manager();
    for ty in [
        MessageType::of::<Alpha>(),
        MessageType::of::<Beta>(),
        MessageType::of::<Gamma>(),
    ] {
        let subs = manager.exact(ty);
        assert_eq!(subs.len(), 1, "one subscription per listener type");
        assert_eq!(subs[0].listener_count(), INSTANCES_PER_LISTENER);
    }
}

#[test]
fn publishes_racing_subscribes_never_lose_settled_listeners() {
    let bus = Arc::new(bus());
    let settled = Arc::new(OnAlpha::default());
    bus.subscribe(settled.clone());

    let publishes = 1_000;
    std::thread::scope(|scope| {
        let publisher = bus.clone();
        scope.spawn(move || {
            for _ in 0..publishes {
                publisher.publish(Alpha);
            }
        });

        let churner = bus.clone();
        scope.spawn(move || {
            for _ in 0..200 {
                let transient = Arc::new(OnAlpha::default());
                churner.subscribe(transient.clone());
                churner.unsubscribe(&transient);
            }
        });
    });

    // The settled listener was attached before any publish started, so it
    // must observe every single one.
    assert_eq!(settled.hits.load(Ordering::SeqCst), publishes);
}

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn async_publishes_drain_through_the_worker_pool() {
    let bus = bus();
    let listener = Arc::new(OnAlpha::default());
    bus.subscribe(listener.clone());

    let publishes = 500;
    for _ in 0..publishes {
        bus.publish_async(Alpha);
    }

    assert!(
        wait_until(Duration::from_secs(5), || {
            listener.hits.load(Ordering::SeqCst) == publishes
        }),
        "async publishes did not drain: {}",
        listener.hits.load(Ordering::SeqCst)
    );
    assert!(!bus.has_pending_messages());
}

#[test]
fn async_publishes_after_shutdown_are_dropped() {
    let bus = bus();
    let listener = Arc::new(OnAlpha::default());
    bus.subscribe(listener.clone());

    bus.shutdown();
    bus.publish_async(Alpha);

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(listener.hits.load(Ordering::SeqCst), 0);
}
