//! # The triple subscription index.
//!
//! - `per_listener`: listener type → its subscription group, used by
//!   subscribe/unsubscribe. A group is built once, on the first subscribe of
//!   a type, and never resized.
//! - `single`: message type → subscriptions of single-message handlers. The
//!   primary dispatch lookup. Lists are append-only and insertion-ordered;
//!   var-arg handlers live here under the array identity of their element.
//! - `multi`: interned type tuple → subscriptions of multi-message handlers.
//!
//! All mutation happens under the manager's exclusive write lock; readers
//! hold the shared read lock and copy out snapshots.

use std::any::TypeId;
use std::sync::Arc;

use fxhash::FxHashMap;

use super::class_tree::{ClassTree, CompositeKey};
use super::subscription::Subscription;
use crate::message::MessageType;

#[derive(Default)]
pub(crate) struct SubscriberIndex {
    per_listener: FxHashMap<TypeId, Arc<[Arc<Subscription>]>>,
    single: FxHashMap<MessageType, Vec<Arc<Subscription>>>,
    multi_tree: ClassTree,
    multi: FxHashMap<CompositeKey, Vec<Arc<Subscription>>>,
}

impl SubscriberIndex {
    pub(crate) fn new() -> Self {
        Self {
            per_listener: FxHashMap::default(),
            single: FxHashMap::default(),
            multi_tree: ClassTree::new(),
            multi: FxHashMap::default(),
        }
    }

    /// Subscription group of a listener type, if one was ever built.
    pub(crate) fn group(&self, listener: TypeId) -> Option<Arc<[Arc<Subscription>]>> {
        self.per_listener.get(&listener).cloned()
    }

    /// Publishes a freshly built group. Called at most once per type.
    pub(crate) fn install_group(&mut self, listener: TypeId, group: Arc<[Arc<Subscription>]>) {
        self.per_listener.insert(listener, group);
    }

    /// Appends a subscription to the single-message list of `ty`.
    pub(crate) fn insert_single(&mut self, ty: MessageType, subscription: Arc<Subscription>) {
        self.single.entry(ty).or_default().push(subscription);
    }

    /// Appends a subscription to the multi-message list of the tuple.
    pub(crate) fn insert_multi(&mut self, types: &[MessageType], subscription: Arc<Subscription>) {
        let key = self.multi_tree.get(types);
        self.multi.entry(key).or_default().push(subscription);
    }

    /// Single-message subscriptions registered under exactly `ty`.
    pub(crate) fn exact(&self, ty: MessageType) -> Option<&[Arc<Subscription>]> {
        self.single.get(&ty).map(Vec::as_slice)
    }

    /// Multi-message subscriptions registered under exactly the tuple.
    pub(crate) fn exact_multi(&self, types: &[MessageType]) -> Option<&[Arc<Subscription>]> {
        let key = self.multi_tree.lookup(types)?;
        self.multi.get(&key).map(Vec::as_slice)
    }

    pub(crate) fn clear(&mut self) {
        self.per_listener.clear();
        self.single.clear();
        self.multi_tree.clear();
        self.multi.clear();
    }
}
