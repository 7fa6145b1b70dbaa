//! # Per-manager listener metadata reader.
//!
//! Runs [`Listener::configure`] exactly once per listener type, filters out
//! disabled handlers, and caches the surviving descriptors by type identity.
//! The cache is append-only and shared by every subscribe of that type.
//!
//! A panic inside `configure` is caught here; the caller records the type as
//! a non-listener and reports the failure once.

use std::any::TypeId;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;

use crate::listener::handler::{HandlerDescriptor, Handlers};
use crate::listener::Listener;

/// Outcome of a failed registration: the extracted panic payload.
#[derive(Debug)]
pub(crate) struct RegistrationPanic {
    pub info: String,
}

#[derive(Default)]
pub(crate) struct ListenerMetadata {
    cache: DashMap<TypeId, Arc<[Arc<HandlerDescriptor>]>>,
}

impl ListenerMetadata {
    /// Returns the enabled handler descriptors of `L`, in registration order.
    ///
    /// An empty slice marks a type with no enabled handlers; the caller
    /// treats it as a non-listener. Deterministic per type, so a redundant
    /// concurrent computation would be harmless, but in practice this runs
    /// inside the manager's write lock.
    pub(crate) fn describe<L: Listener>(
        &self,
    ) -> Result<Arc<[Arc<HandlerDescriptor>]>, RegistrationPanic> {
        let key = TypeId::of::<L>();
        if let Some(descriptors) = self.cache.get(&key) {
            return Ok(descriptors.value().clone());
        }

        let collected = catch_unwind(AssertUnwindSafe(|| {
            let mut handlers = Handlers::<L>::new();
            L::configure(&mut handlers);
            handlers.into_descriptors()
        }))
        .map_err(|panic_err| {
            let any = &*panic_err;
            let info = if let Some(msg) = any.downcast_ref::<&'static str>() {
                (*msg).to_string()
            } else if let Some(msg) = any.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            };
            RegistrationPanic { info }
        })?;

        let descriptors: Arc<[Arc<HandlerDescriptor>]> = collected
            .into_iter()
            .filter(|descriptor| descriptor.enabled())
            .map(Arc::new)
            .collect();

        self.cache.insert(key, descriptors.clone());
        Ok(descriptors)
    }

    pub(crate) fn clear(&self) {
        self.cache.clear();
    }
}
