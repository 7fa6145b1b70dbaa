//! # The tiered publish path.
//!
//! A publish runs the tiers its [`PublishMode`] enables, in a fixed order:
//!
//! ```text
//! exact ──► super ──► var-arg ──► var-arg-super ──► DeadMessage?
//! ```
//!
//! Each tier counts the listeners it reached; when the total across all
//! tiers is zero, the arguments are wrapped in a [`DeadMessage`] and offered
//! to its exact subscribers. Within a tier, subscriptions run in index
//! insertion order.
//!
//! Supertype tiers project every argument to the view the handler declared
//! before invoking. A failed projection (a mis-declared parent link) skips
//! that handler and is reported; it never aborts the publish.

use std::any::Any;
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

use super::PublishMode;
use crate::error::{DispatchError, ErrorHandlers, PublicationError};
use crate::message::{AnyMessage, DeadMessage, MessageType};
use crate::subscription::{DispatchArgs, SubscriptionManager, SuperEntry};

pub(crate) struct Publisher {
    mode: PublishMode,
    manager: Arc<SubscriptionManager>,
    errors: Arc<ErrorHandlers>,
}

impl Publisher {
    pub(crate) fn new(
        mode: PublishMode,
        manager: Arc<SubscriptionManager>,
        errors: Arc<ErrorHandlers>,
    ) -> Self {
        Self {
            mode,
            manager,
            errors,
        }
    }

    #[inline]
    pub(crate) fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }

    /// Single-message publish.
    pub(crate) fn publish_one(&self, message: &AnyMessage) {
        let ty = message.message_type();
        let mut delivered = 0;

        for sub in self.manager.exact(ty) {
            delivered += sub.deliver(&DispatchArgs::One(message.payload()), &self.errors);
        }

        if self.mode.includes_supertypes() {
            for entry in self.manager.super_entries(ty).iter() {
                match self.project(entry, 0, message.payload(), &[ty]) {
                    Some(projected) => {
                        delivered +=
                            entry.sub.deliver(&DispatchArgs::One(projected), &self.errors);
                    }
                    None => continue,
                }
            }
        }

        if self.vararg_applies(&[ty]) {
            let bundle: [&dyn Any; 1] = [message.payload()];
            for sub in self.manager.vararg_exact(ty).iter() {
                delivered += sub.deliver(&DispatchArgs::Array(&bundle), &self.errors);
            }
            for entry in self.manager.vararg_super(ty).iter() {
                if let Some(projected) = self.project(entry, 0, message.payload(), &[ty]) {
                    let bundle: [&dyn Any; 1] = [projected];
                    delivered += entry.sub.deliver(&DispatchArgs::Array(&bundle), &self.errors);
                }
            }
        }

        if delivered == 0 {
            self.publish_dead(smallvec![message.clone()]);
        }
    }

    /// Two-message publish.
    pub(crate) fn publish_two(&self, first: &AnyMessage, second: &AnyMessage) {
        let types = [first.message_type(), second.message_type()];
        let payloads = [first.payload(), second.payload()];
        let mut delivered = 0;

        for sub in self.manager.exact_multi(&types) {
            delivered += sub.deliver(
                &DispatchArgs::Two(payloads[0], payloads[1]),
                &self.errors,
            );
        }

        if self.mode.includes_supertypes() {
            for entry in self.manager.super_entries_tuple(&types).iter() {
                if let Some(projected) = self.project_all(entry, &payloads, &types) {
                    delivered += entry.sub.deliver(
                        &DispatchArgs::Two(projected[0], projected[1]),
                        &self.errors,
                    );
                }
            }
        }

        delivered += self.vararg_bundle(&types, &payloads);

        if delivered == 0 {
            self.publish_dead(smallvec![first.clone(), second.clone()]);
        }
    }

    /// Three-message publish.
    pub(crate) fn publish_three(
        &self,
        first: &AnyMessage,
        second: &AnyMessage,
        third: &AnyMessage,
    ) {
        let types = [
            first.message_type(),
            second.message_type(),
            third.message_type(),
        ];
        let payloads = [first.payload(), second.payload(), third.payload()];
        let mut delivered = 0;

        for sub in self.manager.exact_multi(&types) {
            delivered += sub.deliver(
                &DispatchArgs::Three(payloads[0], payloads[1], payloads[2]),
                &self.errors,
            );
        }

        if self.mode.includes_supertypes() {
            for entry in self.manager.super_entries_tuple(&types).iter() {
                if let Some(projected) = self.project_all(entry, &payloads, &types) {
                    delivered += entry.sub.deliver(
                        &DispatchArgs::Three(projected[0], projected[1], projected[2]),
                        &self.errors,
                    );
                }
            }
        }

        delivered += self.vararg_bundle(&types, &payloads);

        if delivered == 0 {
            self.publish_dead(smallvec![first.clone(), second.clone(), third.clone()]);
        }
    }

    /// Publish of an actual array of messages: matches `[M]` handlers
    /// exactly plus array-promoted supertypes. No var-arg fan-out: the
    /// argument already is an array.
    pub(crate) fn publish_array(&self, elements: &[AnyMessage], element_ty: MessageType) {
        let Some(array_ty) = element_ty.as_array() else {
            return;
        };
        let payloads: SmallVec<[&dyn Any; 8]> =
            elements.iter().map(AnyMessage::payload).collect();
        let mut delivered = 0;

        for sub in self.manager.exact(array_ty) {
            delivered += sub.deliver(&DispatchArgs::Array(&payloads), &self.errors);
        }

        if self.mode.includes_supertypes() {
            for entry in self.manager.super_entries(array_ty).iter() {
                let projected: Option<SmallVec<[&dyn Any; 8]>> = payloads
                    .iter()
                    .map(|payload| self.project(entry, 0, *payload, &[array_ty]))
                    .collect();
                if let Some(projected) = projected {
                    delivered += entry.sub.deliver(&DispatchArgs::Array(&projected), &self.errors);
                }
            }
        }

        if delivered == 0 {
            self.publish_dead(elements.iter().cloned().collect());
        }
    }

    /// Var-arg tiers for multi-message publishes: identical argument types
    /// bundle directly; mixed types go through the common-supertype set.
    fn vararg_bundle(&self, types: &[MessageType], payloads: &[&dyn Any]) -> usize {
        if !self.vararg_applies(types) {
            return 0;
        }
        let mut delivered = 0;

        let all_same = types.windows(2).all(|pair| pair[0] == pair[1]);
        if all_same {
            for sub in self.manager.vararg_exact(types[0]).iter() {
                delivered += sub.deliver(&DispatchArgs::Array(payloads), &self.errors);
            }
            for entry in self.manager.vararg_super(types[0]).iter() {
                let projected: Option<SmallVec<[&dyn Any; 3]>> = payloads
                    .iter()
                    .map(|payload| self.project(entry, 0, *payload, types))
                    .collect();
                if let Some(projected) = projected {
                    delivered += entry.sub.deliver(&DispatchArgs::Array(&projected), &self.errors);
                }
            }
        } else {
            for entry in self.manager.vararg_super_tuple(types).iter() {
                let projected: Option<SmallVec<[&dyn Any; 3]>> = payloads
                    .iter()
                    .enumerate()
                    .map(|(position, payload)| self.project(entry, position, *payload, types))
                    .collect();
                if let Some(projected) = projected {
                    delivered += entry.sub.deliver(&DispatchArgs::Array(&projected), &self.errors);
                }
            }
        }
        delivered
    }

    fn vararg_applies(&self, types: &[MessageType]) -> bool {
        self.mode.includes_varargs()
            && self.manager.has_vararg_possibility()
            && types.iter().all(|ty| !ty.is_array())
    }

    /// Applies one positional projection, reporting a mismatch on failure.
    fn project<'a>(
        &self,
        entry: &SuperEntry,
        position: usize,
        payload: &'a dyn Any,
        types: &[MessageType],
    ) -> Option<&'a dyn Any> {
        let projected = entry
            .projections
            .get(position)
            .and_then(|projection| (**projection)(payload));
        if projected.is_none() {
            self.errors.report(
                PublicationError::new(DispatchError::TypeMismatch {
                    detail: format!(
                        "supertype projection failed for handler {}",
                        entry.sub.descriptor().label()
                    ),
                })
                .with_listener(entry.sub.descriptor().listener())
                .with_handler(entry.sub.descriptor().label())
                .with_message_types(types.iter().copied()),
            );
        }
        projected
    }

    /// Projects every argument of a tuple entry; `None` aborts the handler.
    fn project_all<'a>(
        &self,
        entry: &SuperEntry,
        payloads: &[&'a dyn Any],
        types: &[MessageType],
    ) -> Option<SmallVec<[&'a dyn Any; 3]>> {
        payloads
            .iter()
            .enumerate()
            .map(|(position, payload)| self.project(entry, position, *payload, types))
            .collect()
    }

    /// DeadMessage fallback: exact-match subscribers only, never recursive.
    fn publish_dead(&self, messages: SmallVec<[AnyMessage; 3]>) {
        let subs = self.manager.exact(MessageType::of::<DeadMessage>());
        if subs.is_empty() {
            return;
        }
        let dead = DeadMessage::new(messages);
        for sub in subs {
            sub.deliver(&DispatchArgs::One(&dead), &self.errors);
        }
    }
}
