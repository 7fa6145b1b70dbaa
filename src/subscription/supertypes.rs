//! # Supertype subscription resolution.
//!
//! Answers "which subscriptions should also see a publish of `T` because
//! they are registered under a supertype of `T` and opted into subtypes",
//! for single types and for tuples.
//!
//! Results are memoised per query. The caches are cleared at the start of
//! every subscribe/unsubscribe and refilled lazily by publishers; two
//! publishers racing to fill the same entry compute the same deterministic
//! list, so the duplicate work is tolerated instead of locked away.

use std::sync::Arc;

use dashmap::DashMap;
use fxhash::FxHashSet;
use smallvec::{smallvec, SmallVec};

use super::hierarchy::{SuperType, TypeHierarchy};
use super::index::SubscriberIndex;
use super::subscription::Subscription;
use crate::message::{identity_projection, MessageType, ProjectFn};

/// A supertype match: the subscription plus one projection per published
/// argument, turning each argument into the view the handler declared.
#[derive(Clone)]
pub(crate) struct SuperEntry {
    pub(crate) sub: Arc<Subscription>,
    pub(crate) projections: SmallVec<[ProjectFn; 3]>,
}

type TupleKey = SmallVec<[MessageType; 3]>;

pub(crate) struct SuperTypeResolver {
    hierarchy: Arc<TypeHierarchy>,
    single: DashMap<MessageType, Arc<Vec<SuperEntry>>>,
    multi: DashMap<TupleKey, Arc<Vec<SuperEntry>>>,
}

impl SuperTypeResolver {
    pub(crate) fn new(hierarchy: Arc<TypeHierarchy>) -> Self {
        Self {
            hierarchy,
            single: DashMap::new(),
            multi: DashMap::new(),
        }
    }

    /// Subscriptions registered under a strict supertype of `ty` that accept
    /// subtypes, in closure order then index insertion order.
    ///
    /// The caller holds the index read lock for the duration of the call.
    pub(crate) fn of(&self, ty: MessageType, index: &SubscriberIndex) -> Arc<Vec<SuperEntry>> {
        if let Some(entries) = self.single.get(&ty) {
            return entries.value().clone();
        }

        let mut entries = Vec::new();
        for supertype in self.hierarchy.supertypes(ty).iter() {
            let Some(subs) = index.exact(supertype.ty) else {
                continue;
            };
            for sub in subs {
                if sub.descriptor().accepts_subtypes() {
                    entries.push(SuperEntry {
                        sub: sub.clone(),
                        projections: smallvec![supertype.project.clone()],
                    });
                }
            }
        }

        let entries = Arc::new(entries);
        self.single.insert(ty, entries.clone());
        entries
    }

    /// Tuple variant: walks the cross-product of self-or-supertype per
    /// position, excluding the exact tuple itself, and deduplicates the
    /// result. Supported for arities 2 and 3.
    pub(crate) fn of_tuple(
        &self,
        types: &[MessageType],
        index: &SubscriberIndex,
    ) -> Arc<Vec<SuperEntry>> {
        let key: TupleKey = SmallVec::from_slice(types);
        if let Some(entries) = self.multi.get(&key) {
            return entries.value().clone();
        }

        let candidates: SmallVec<[Vec<SuperType>; 3]> = types
            .iter()
            .map(|ty| self.self_or_supertypes(*ty))
            .collect();

        let mut entries = Vec::new();
        let mut seen: FxHashSet<*const Subscription> = FxHashSet::default();

        match candidates.as_slice() {
            [first, second] => {
                for (i, a) in first.iter().enumerate() {
                    for (j, b) in second.iter().enumerate() {
                        if i == 0 && j == 0 {
                            continue;
                        }
                        self.collect_tuple(&[a, b], index, &mut seen, &mut entries);
                    }
                }
            }
            [first, second, third] => {
                for (i, a) in first.iter().enumerate() {
                    for (j, b) in second.iter().enumerate() {
                        for (k, c) in third.iter().enumerate() {
                            if i == 0 && j == 0 && k == 0 {
                                continue;
                            }
                            self.collect_tuple(&[a, b, c], index, &mut seen, &mut entries);
                        }
                    }
                }
            }
            _ => {}
        }

        let entries = Arc::new(entries);
        self.multi.insert(key, entries.clone());
        entries
    }

    fn collect_tuple(
        &self,
        combo: &[&SuperType],
        index: &SubscriberIndex,
        seen: &mut FxHashSet<*const Subscription>,
        entries: &mut Vec<SuperEntry>,
    ) {
        let tuple: SmallVec<[MessageType; 3]> = combo.iter().map(|entry| entry.ty).collect();
        let Some(subs) = index.exact_multi(&tuple) else {
            return;
        };
        for sub in subs {
            if !sub.descriptor().accepts_subtypes() {
                continue;
            }
            if !seen.insert(Arc::as_ptr(sub)) {
                continue;
            }
            entries.push(SuperEntry {
                sub: sub.clone(),
                projections: combo.iter().map(|entry| entry.project.clone()).collect(),
            });
        }
    }

    /// `{ty}` (with the identity projection) followed by the strict
    /// supertype closure of `ty`.
    fn self_or_supertypes(&self, ty: MessageType) -> Vec<SuperType> {
        let closure = self.hierarchy.supertypes(ty);
        let mut all = Vec::with_capacity(closure.len() + 1);
        all.push(SuperType {
            ty,
            project: identity_projection(),
        });
        all.extend(closure.iter().cloned());
        all
    }

    pub(crate) fn clear(&self) {
        self.single.clear();
        self.multi.clear();
    }
}
