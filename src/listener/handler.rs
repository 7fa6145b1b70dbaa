//! # Handler descriptors and the registration collector.
//!
//! A listener type declares its handlers inside [`Listener::configure`] by
//! calling the `on*` methods of [`Handlers`]. Each call produces one
//! immutable [`HandlerDescriptor`]: the declared message-type signature, the
//! option flags, and a type-erased invoker built from the user closure at
//! registration time.
//!
//! ## Rules
//! - Descriptor order is registration order and stable across runs.
//! - Options are set through the [`HandlerConfig`] builder returned by each
//!   `on*` call; the defaults match the common case (`accepts_subtypes` on,
//!   `enabled` on, `exclusive` off).
//! - A disabled handler is dropped before indexing and leaves no trace.
//!
//! [`Listener::configure`]: crate::Listener::configure

use std::any::{Any, TypeId};
use std::marker::PhantomData;

use smallvec::SmallVec;
use thiserror::Error;

use crate::listener::Listener;
use crate::message::{Message, MessageType};

/// Raised by a handler adapter when a payload does not downcast to the type
/// the closure was built for. Converted to a
/// [`DispatchError::TypeMismatch`](crate::DispatchError::TypeMismatch) report.
#[derive(Error, Debug)]
pub(crate) enum InvokeError {
    #[error("listener is not a {expected}")]
    Listener { expected: &'static str },
    #[error("message is not a {expected}")]
    Payload { expected: &'static str },
    #[error("handler arity does not match the dispatched arguments")]
    Arity,
}

/// Type-erased invoker variants, one per handler shape.
pub(crate) enum HandlerFn {
    One(Box<dyn Fn(&dyn Any, &dyn Any) -> Result<(), InvokeError> + Send + Sync>),
    Two(Box<dyn Fn(&dyn Any, &dyn Any, &dyn Any) -> Result<(), InvokeError> + Send + Sync>),
    Three(
        Box<
            dyn Fn(&dyn Any, &dyn Any, &dyn Any, &dyn Any) -> Result<(), InvokeError>
                + Send
                + Sync,
        >,
    ),
    Array(Box<dyn Fn(&dyn Any, &[&dyn Any]) -> Result<(), InvokeError> + Send + Sync>),
}

/// Immutable description of one registered handler.
///
/// Binds the declaring listener type, the declared message-type signature,
/// the option flags, and the erased invoker. Built by [`Handlers`]; never
/// mutated after [`Listener::configure`](crate::Listener::configure) returns.
pub struct HandlerDescriptor {
    listener: &'static str,
    listener_id: TypeId,
    index: usize,
    name: Option<&'static str>,
    message_types: SmallVec<[MessageType; 3]>,
    accepts_subtypes: bool,
    enabled: bool,
    exclusive: bool,
    is_vararg: bool,
    priority: i32,
    invoke: HandlerFn,
}

impl HandlerDescriptor {
    /// Type name of the declaring listener.
    #[inline]
    pub fn listener(&self) -> &'static str {
        self.listener
    }

    /// Type identity of the declaring listener.
    #[inline]
    pub fn listener_id(&self) -> TypeId {
        self.listener_id
    }

    /// Declared message-type signature, in parameter order. Var-arg handlers
    /// have a single array-kinded entry.
    #[inline]
    pub fn message_types(&self) -> &[MessageType] {
        &self.message_types
    }

    /// Whether strict subtypes of the declared types also match.
    #[inline]
    pub fn accepts_subtypes(&self) -> bool {
        self.accepts_subtypes
    }

    /// Whether the handler participates in dispatch at all.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether invocations are serialised per listener instance.
    #[inline]
    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    /// Whether the handler is declared over an array of messages.
    #[inline]
    pub fn is_vararg(&self) -> bool {
        self.is_vararg
    }

    /// Reserved ordering hint. Carried but not honored by index traversal.
    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Stable human-readable label: `Listener::name` or `Listener#index`.
    pub fn label(&self) -> String {
        match self.name {
            Some(name) => format!("{}::{}", self.listener, name),
            None => format!("{}#{}", self.listener, self.index),
        }
    }

    #[inline]
    pub(crate) fn invoker(&self) -> &HandlerFn {
        &self.invoke
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("handler", &self.label())
            .field("message_types", &self.message_types)
            .field("accepts_subtypes", &self.accepts_subtypes)
            .field("enabled", &self.enabled)
            .field("exclusive", &self.exclusive)
            .field("is_vararg", &self.is_vararg)
            .finish()
    }
}

/// Collects handler registrations for listener type `L`.
///
/// Passed to [`Listener::configure`](crate::Listener::configure). Every `on*`
/// call appends a descriptor and returns a [`HandlerConfig`] for setting
/// options on it.
pub struct Handlers<L> {
    descriptors: Vec<HandlerDescriptor>,
    listener: PhantomData<fn(&L)>,
}

fn listener_ref<'a, L: Listener>(listener: &'a dyn Any) -> Result<&'a L, InvokeError> {
    listener.downcast_ref::<L>().ok_or(InvokeError::Listener {
        expected: std::any::type_name::<L>(),
    })
}

fn payload_ref<'a, M: Message>(message: &'a dyn Any) -> Result<&'a M, InvokeError> {
    message.downcast_ref::<M>().ok_or(InvokeError::Payload {
        expected: std::any::type_name::<M>(),
    })
}

impl<L: Listener> Handlers<L> {
    pub(crate) fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            listener: PhantomData,
        }
    }

    fn push(
        &mut self,
        message_types: SmallVec<[MessageType; 3]>,
        is_vararg: bool,
        invoke: HandlerFn,
    ) -> HandlerConfig<'_> {
        let index = self.descriptors.len();
        self.descriptors.push(HandlerDescriptor {
            listener: std::any::type_name::<L>(),
            listener_id: TypeId::of::<L>(),
            index,
            name: None,
            message_types,
            accepts_subtypes: true,
            enabled: true,
            exclusive: false,
            is_vararg,
            priority: 0,
            invoke,
        });
        HandlerConfig {
            descriptor: &mut self.descriptors[index],
        }
    }

    /// Registers a single-message handler for `M`.
    pub fn on<M: Message>(
        &mut self,
        handler: impl Fn(&L, &M) + Send + Sync + 'static,
    ) -> HandlerConfig<'_> {
        self.push(
            SmallVec::from_slice(&[MessageType::of::<M>()]),
            false,
            HandlerFn::One(Box::new(move |listener, message| {
                handler(listener_ref::<L>(listener)?, payload_ref::<M>(message)?);
                Ok(())
            })),
        )
    }

    /// Registers a two-message handler for `(M1, M2)`.
    pub fn on_pair<M1: Message, M2: Message>(
        &mut self,
        handler: impl Fn(&L, &M1, &M2) + Send + Sync + 'static,
    ) -> HandlerConfig<'_> {
        self.push(
            SmallVec::from_slice(&[MessageType::of::<M1>(), MessageType::of::<M2>()]),
            false,
            HandlerFn::Two(Box::new(move |listener, first, second| {
                handler(
                    listener_ref::<L>(listener)?,
                    payload_ref::<M1>(first)?,
                    payload_ref::<M2>(second)?,
                );
                Ok(())
            })),
        )
    }

    /// Registers a three-message handler for `(M1, M2, M3)`.
    pub fn on_triple<M1: Message, M2: Message, M3: Message>(
        &mut self,
        handler: impl Fn(&L, &M1, &M2, &M3) + Send + Sync + 'static,
    ) -> HandlerConfig<'_> {
        self.push(
            SmallVec::from_slice(&[
                MessageType::of::<M1>(),
                MessageType::of::<M2>(),
                MessageType::of::<M3>(),
            ]),
            false,
            HandlerFn::Three(Box::new(move |listener, first, second, third| {
                handler(
                    listener_ref::<L>(listener)?,
                    payload_ref::<M1>(first)?,
                    payload_ref::<M2>(second)?,
                    payload_ref::<M3>(third)?,
                );
                Ok(())
            })),
        )
    }

    /// Registers a var-arg handler over `[M]`.
    ///
    /// Receives an explicitly published array, or a bundle built from scalar
    /// publishes whose argument types share `M` as a common type.
    pub fn on_array<M: Message>(
        &mut self,
        handler: impl Fn(&L, &[&M]) + Send + Sync + 'static,
    ) -> HandlerConfig<'_> {
        self.push(
            SmallVec::from_slice(&[MessageType::array_of::<M>()]),
            true,
            HandlerFn::Array(Box::new(move |listener, elements| {
                let listener = listener_ref::<L>(listener)?;
                let mut typed: SmallVec<[&M; 8]> = SmallVec::with_capacity(elements.len());
                for element in elements {
                    typed.push(payload_ref::<M>(*element)?);
                }
                handler(listener, &typed);
                Ok(())
            })),
        )
    }

    /// Descriptors in registration order, enabled or not.
    pub(crate) fn into_descriptors(self) -> Vec<HandlerDescriptor> {
        self.descriptors
    }
}

/// Option builder for the most recently registered handler.
pub struct HandlerConfig<'a> {
    descriptor: &'a mut HandlerDescriptor,
}

impl HandlerConfig<'_> {
    /// Whether strict subtypes of the declared types also match this handler.
    /// Defaults to `true`.
    pub fn accepts_subtypes(self, accepts: bool) -> Self {
        self.descriptor.accepts_subtypes = accepts;
        self
    }

    /// Whether the handler participates in dispatch. Defaults to `true`;
    /// a disabled handler leaves no trace in any index.
    pub fn enabled(self, enabled: bool) -> Self {
        self.descriptor.enabled = enabled;
        self
    }

    /// Serialises invocations per listener instance. Defaults to `false`.
    pub fn exclusive(self, exclusive: bool) -> Self {
        self.descriptor.exclusive = exclusive;
        self
    }

    /// Names the handler for error reports and logs.
    pub fn named(self, name: &'static str) -> Self {
        self.descriptor.name = Some(name);
        self
    }

    /// Reserved ordering hint; not honored by index traversal.
    pub fn priority(self, priority: i32) -> Self {
        self.descriptor.priority = priority;
        self
    }
}
