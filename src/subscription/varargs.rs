//! # Var-arg subscription resolution.
//!
//! Handlers declared over `[T]` can receive a bundle built from scalar
//! publishes: `publish(a1, a2, a3)` with three values of type `T` reaches a
//! `[T]` handler once, with all three in one array. The super variant covers
//! handlers declared over `[U]` where `U` is a supertype of the published
//! type(s); each element is projected to its `U` view before bundling.
//!
//! These resolvers are only consulted when the manager has ever indexed an
//! array-typed handler, and never for a publish whose argument is already an
//! array. Caches mirror the supertype resolver's lifecycle: cleared on every
//! subscribe/unsubscribe, refilled lazily under read.

use std::sync::Arc;

use dashmap::DashMap;
use fxhash::FxHashSet;
use smallvec::{smallvec, SmallVec};

use super::hierarchy::{SuperType, TypeHierarchy};
use super::index::SubscriberIndex;
use super::subscription::Subscription;
use super::supertypes::SuperEntry;
use crate::message::{identity_projection, MessageType};

type TupleKey = SmallVec<[MessageType; 3]>;

pub(crate) struct VarArgResolver {
    hierarchy: Arc<TypeHierarchy>,
    exact: DashMap<MessageType, Arc<Vec<Arc<Subscription>>>>,
    supers: DashMap<MessageType, Arc<Vec<SuperEntry>>>,
    supers_multi: DashMap<TupleKey, Arc<Vec<SuperEntry>>>,
}

impl VarArgResolver {
    pub(crate) fn new(hierarchy: Arc<TypeHierarchy>) -> Self {
        Self {
            hierarchy,
            exact: DashMap::new(),
            supers: DashMap::new(),
            supers_multi: DashMap::new(),
        }
    }

    /// Subscriptions declared exactly `[ty]`.
    pub(crate) fn exact_of(
        &self,
        ty: MessageType,
        index: &SubscriberIndex,
    ) -> Arc<Vec<Arc<Subscription>>> {
        if let Some(subs) = self.exact.get(&ty) {
            return subs.value().clone();
        }

        let subs = match ty.as_array().and_then(|array_ty| index.exact(array_ty)) {
            Some(listed) => Arc::new(listed.to_vec()),
            None => Arc::new(Vec::new()),
        };
        self.exact.insert(ty, subs.clone());
        subs
    }

    /// Subscriptions declared `[U]` for a strict supertype `U` of `ty` that
    /// accept subtypes, each paired with the element projection to `U`.
    pub(crate) fn super_of(
        &self,
        ty: MessageType,
        index: &SubscriberIndex,
    ) -> Arc<Vec<SuperEntry>> {
        if let Some(entries) = self.supers.get(&ty) {
            return entries.value().clone();
        }

        let mut entries = Vec::new();
        for supertype in self.hierarchy.supertypes(ty).iter() {
            let Some(array_ty) = supertype.ty.as_array() else {
                continue;
            };
            let Some(subs) = index.exact(array_ty) else {
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
        self.supers.insert(ty, entries.clone());
        entries
    }

    /// Mixed-type variant for 2- and 3-message publishes: subscriptions
    /// declared `[U]` where `U` is in the common self-or-supertype set of
    /// every argument type, with one element projection per position.
    ///
    /// Common types are ordered by the first position's closure. An empty
    /// result means the arguments share no declared type.
    pub(crate) fn super_of_tuple(
        &self,
        types: &[MessageType],
        index: &SubscriberIndex,
    ) -> Arc<Vec<SuperEntry>> {
        let key: TupleKey = SmallVec::from_slice(types);
        if let Some(entries) = self.supers_multi.get(&key) {
            return entries.value().clone();
        }

        let per_position: SmallVec<[Vec<SuperType>; 3]> = types
            .iter()
            .map(|ty| self.self_or_supertypes(*ty))
            .collect();

        let mut entries = Vec::new();
        let mut seen: FxHashSet<*const Subscription> = FxHashSet::default();

        if let Some((first, rest)) = per_position.split_first() {
            for candidate in first {
                let positions: Option<SmallVec<[&SuperType; 3]>> = rest
                    .iter()
                    .map(|others| others.iter().find(|entry| entry.ty == candidate.ty))
                    .collect();
                let Some(others) = positions else {
                    continue;
                };

                let Some(array_ty) = candidate.ty.as_array() else {
                    continue;
                };
                let Some(subs) = index.exact(array_ty) else {
                    continue;
                };
                for sub in subs {
                    if !sub.descriptor().accepts_subtypes() {
                        continue;
                    }
                    if !seen.insert(Arc::as_ptr(sub)) {
                        continue;
                    }
                    let mut projections: SmallVec<[_; 3]> = smallvec![candidate.project.clone()];
                    projections.extend(others.iter().map(|entry| entry.project.clone()));
                    entries.push(SuperEntry {
                        sub: sub.clone(),
                        projections,
                    });
                }
            }
        }

        let entries = Arc::new(entries);
        self.supers_multi.insert(key, entries.clone());
        entries
    }

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
        self.exact.clear();
        self.supers.clear();
        self.supers_multi.clear();
    }
}
