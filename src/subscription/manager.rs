//! # The subscription manager.
//!
//! Front door for the whole subscription state: owns the triple index, the
//! type hierarchy, the derived caches, and the single-writer discipline that
//! keeps them coherent.
//!
//! ## Architecture
//! ```text
//! subscribe(listener)                    publish path (readers)
//!     │                                       │
//!     ├─ exclusive write lock                 ├─ shared read lock
//!     │    ├─ clear super/var-arg caches      ├─ exact / exact_multi snapshot
//!     │    ├─ group exists? attach            ├─ super resolver (cached)
//!     │    └─ else: describe type,            └─ var-arg resolver (cached)
//!     │       build subscriptions,
//!     │       index them, pre-warm
//!     │       hierarchy, install group,
//!     │       attach
//!     └─ release (happens-before readers)
//! ```
//!
//! ## Rules
//! - Subscribe and unsubscribe are mutually exclusive; a successful
//!   subscribe happens-before any publish that observes it.
//! - The read path never blocks except against a writer holding the lock.
//! - Derived caches only affect latency: flushing them never changes a
//!   publish result.
//! - Subscriptions are never deleted; an empty listener set is a normal
//!   state. Groups are built once per listener type.

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::hierarchy::TypeHierarchy;
use super::index::SubscriberIndex;
use super::subscription::Subscription;
use super::supertypes::{SuperEntry, SuperTypeResolver};
use super::varargs::VarArgResolver;
use crate::error::{DispatchError, ErrorHandlers, PublicationError};
use crate::listener::metadata::ListenerMetadata;
use crate::listener::Listener;
use crate::message::MessageType;

pub struct SubscriptionManager {
    index: RwLock<SubscriberIndex>,
    metadata: ListenerMetadata,
    hierarchy: Arc<TypeHierarchy>,
    supers: SuperTypeResolver,
    varargs: VarArgResolver,
    /// Listener types known to declare no enabled handlers (or whose
    /// registration panicked). Checked before taking any lock.
    non_listeners: DashMap<TypeId, ()>,
    /// Set once an array-typed handler is indexed; lets publishes skip the
    /// var-arg tiers entirely when no such handler exists.
    vararg_possibility: AtomicBool,
    errors: Arc<ErrorHandlers>,
}

impl SubscriptionManager {
    pub(crate) fn new(errors: Arc<ErrorHandlers>) -> Self {
        let hierarchy = Arc::new(TypeHierarchy::new());
        Self {
            index: RwLock::new(SubscriberIndex::new()),
            metadata: ListenerMetadata::default(),
            supers: SuperTypeResolver::new(hierarchy.clone()),
            varargs: VarArgResolver::new(hierarchy.clone()),
            hierarchy,
            non_listeners: DashMap::new(),
            vararg_possibility: AtomicBool::new(false),
            errors,
        }
    }

    /// Attaches a listener instance to every subscription of its type,
    /// building the type's subscription group on first encounter.
    pub fn subscribe<L: Listener>(&self, listener: Arc<L>) {
        let listener_ty = TypeId::of::<L>();
        if self.non_listeners.contains_key(&listener_ty) {
            return;
        }

        let mut index = self.index.write();

        // Cleared while the lock is held: a reader that refilled with the
        // old index state while we waited is wiped here, and no reader can
        // fill again before we release. Refills are lazy.
        self.supers.clear();
        self.varargs.clear();

        if let Some(group) = index.group(listener_ty) {
            for sub in group.iter() {
                sub.add(listener.clone());
            }
            return;
        }

        let descriptors = match self.metadata.describe::<L>() {
            Ok(descriptors) => descriptors,
            Err(panic) => {
                drop(index);
                self.non_listeners.insert(listener_ty, ());
                log::warn!(
                    "listener registration panicked for {}: {}",
                    std::any::type_name::<L>(),
                    panic.info
                );
                self.errors.report(PublicationError::new(
                    DispatchError::RegistrationPanicked {
                        listener: std::any::type_name::<L>(),
                        info: panic.info,
                    },
                ));
                return;
            }
        };

        if descriptors.is_empty() {
            self.non_listeners.insert(listener_ty, ());
            return;
        }

        let mut group = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors.iter() {
            let subscription = Subscription::new(descriptor.clone());
            match descriptor.message_types() {
                [only] => {
                    if only.is_array() {
                        self.vararg_possibility.store(true, Ordering::Release);
                    }
                    // Pre-warm the closure so readers hit the memo directly.
                    self.hierarchy.supertypes(*only);
                    index.insert_single(*only, subscription.clone());
                }
                types => {
                    for ty in types {
                        self.hierarchy.supertypes(*ty);
                    }
                    index.insert_multi(types, subscription.clone());
                }
            }
            group.push(subscription);
        }

        let group: Arc<[Arc<Subscription>]> = group.into();
        for sub in group.iter() {
            sub.add(listener.clone());
        }
        index.install_group(listener_ty, group);

        log::debug!(
            "built subscription group for {} ({} handlers)",
            std::any::type_name::<L>(),
            descriptors.len()
        );
    }

    /// Detaches one occurrence of the instance from every subscription of
    /// its type. No effect for unknown listeners.
    pub fn unsubscribe<L: Listener>(&self, listener: &Arc<L>) {
        let listener_ty = TypeId::of::<L>();
        if self.non_listeners.contains_key(&listener_ty) {
            return;
        }

        let index = self.index.write();
        self.supers.clear();
        self.varargs.clear();

        if let Some(group) = index.group(listener_ty) {
            let instance = Arc::as_ptr(listener) as *const ();
            for sub in group.iter() {
                sub.remove(instance);
            }
        }
    }

    /// True once any array-typed handler has been indexed.
    pub(crate) fn has_vararg_possibility(&self) -> bool {
        self.vararg_possibility.load(Ordering::Acquire)
    }

    /// Snapshot of the subscriptions registered under exactly `ty`.
    pub fn exact(&self, ty: MessageType) -> Vec<Arc<Subscription>> {
        let index = self.index.read();
        index.exact(ty).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Snapshot of the subscriptions registered under exactly the tuple.
    pub fn exact_multi(&self, types: &[MessageType]) -> Vec<Arc<Subscription>> {
        let index = self.index.read();
        index.exact_multi(types).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Snapshot of the exact subscriptions of `ty` followed by the
    /// subtype-accepting subscriptions of its supertypes.
    pub fn exact_and_super(&self, ty: MessageType) -> Vec<Arc<Subscription>> {
        let index = self.index.read();
        let mut subs: Vec<Arc<Subscription>> =
            index.exact(ty).map(<[_]>::to_vec).unwrap_or_default();
        for entry in self.supers.of(ty, &index).iter() {
            subs.push(entry.sub.clone());
        }
        subs
    }

    /// Tuple variant of [`exact_and_super`](Self::exact_and_super).
    pub fn exact_and_super_multi(&self, types: &[MessageType]) -> Vec<Arc<Subscription>> {
        let index = self.index.read();
        let mut subs: Vec<Arc<Subscription>> =
            index.exact_multi(types).map(<[_]>::to_vec).unwrap_or_default();
        for entry in self.supers.of_tuple(types, &index).iter() {
            subs.push(entry.sub.clone());
        }
        subs
    }

    pub(crate) fn super_entries(&self, ty: MessageType) -> Arc<Vec<SuperEntry>> {
        let index = self.index.read();
        self.supers.of(ty, &index)
    }

    pub(crate) fn super_entries_tuple(&self, types: &[MessageType]) -> Arc<Vec<SuperEntry>> {
        let index = self.index.read();
        self.supers.of_tuple(types, &index)
    }

    pub(crate) fn vararg_exact(&self, ty: MessageType) -> Arc<Vec<Arc<Subscription>>> {
        let index = self.index.read();
        self.varargs.exact_of(ty, &index)
    }

    pub(crate) fn vararg_super(&self, ty: MessageType) -> Arc<Vec<SuperEntry>> {
        let index = self.index.read();
        self.varargs.super_of(ty, &index)
    }

    pub(crate) fn vararg_super_tuple(&self, types: &[MessageType]) -> Arc<Vec<SuperEntry>> {
        let index = self.index.read();
        self.varargs.super_of_tuple(types, &index)
    }

    /// Clears every index and cache. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut index = self.index.write();
            index.clear();
        }
        self.non_listeners.clear();
        self.metadata.clear();
        self.hierarchy.clear();
        self.supers.clear();
        self.varargs.clear();
        self.vararg_possibility.store(false, Ordering::Release);
        log::debug!("subscription manager cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Handlers;
    use crate::message::Message;
    use std::sync::atomic::AtomicUsize;

    struct Ping;
    impl Message for Ping {}

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }
    impl Listener for Counter {
        fn configure(handlers: &mut Handlers<Self>) {
            handlers.on::<Ping>(|counter, _| {
                counter.hits.fetch_add(1, Ordering::SeqCst);
            });
        }
    }

    struct Mute;
    impl Listener for Mute {
        fn configure(handlers: &mut Handlers<Self>) {
            handlers.on::<Ping>(|_, _| {}).enabled(false);
        }
    }

    fn manager() -> SubscriptionManager {
        SubscriptionManager::new(Arc::new(ErrorHandlers::default()))
    }

    #[test]
    fn first_subscribe_builds_one_group_and_attaches() {
        let manager = manager();
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());

        manager.subscribe(first);
        manager.subscribe(second);

        let subs = manager.exact(MessageType::of::<Ping>());
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].listener_count(), 2);
    }

    #[test]
    fn types_without_enabled_handlers_become_non_listeners() {
        let manager = manager();
        manager.subscribe(Arc::new(Mute));
        assert!(manager.non_listeners.contains_key(&TypeId::of::<Mute>()));
        assert!(manager.exact(MessageType::of::<Ping>()).is_empty());

        // Second subscribe takes the early-reject path.
        manager.subscribe(Arc::new(Mute));
    }

    #[test]
    fn unsubscribe_round_trip_leaves_the_subscription_in_place() {
        let manager = manager();
        let listener = Arc::new(Counter::default());
        manager.subscribe(listener.clone());
        manager.unsubscribe(&listener);

        let subs = manager.exact(MessageType::of::<Ping>());
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].listener_count(), 0);
    }

    #[test]
    fn unsubscribe_of_unknown_listener_is_a_no_op() {
        let manager = manager();
        manager.unsubscribe(&Arc::new(Counter::default()));
        assert!(manager.exact(MessageType::of::<Ping>()).is_empty());
    }

    #[test]
    fn exact_and_super_is_the_ordered_union() {
        use crate::message::ParentLink;

        struct Sub {
            base: Ping,
        }
        impl Message for Sub {
            fn parents() -> Vec<ParentLink> {
                vec![ParentLink::to::<Sub, Ping>(|s| &s.base)]
            }
        }

        let manager = manager();
        manager.subscribe(Arc::new(Counter::default()));

        // Exact type: just the exact subscription.
        assert_eq!(manager.exact_and_super(MessageType::of::<Ping>()).len(), 1);

        // Subtype: no exact entry, the Ping subscription through its parent.
        let through_super = manager.exact_and_super(MessageType::of::<Sub>());
        assert_eq!(through_super.len(), 1);
        assert_eq!(
            through_super[0].descriptor().message_types(),
            &[MessageType::of::<Ping>()]
        );
    }

    #[test]
    fn shutdown_is_idempotent() {
        let manager = manager();
        manager.subscribe(Arc::new(Counter::default()));
        manager.shutdown();
        manager.shutdown();
        assert!(manager.exact(MessageType::of::<Ping>()).is_empty());
    }
}
