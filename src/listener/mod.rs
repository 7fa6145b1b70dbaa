//! Listener surface: the [`Listener`] trait, handler registration, and the
//! per-manager metadata reader that turns a listener type into descriptors.

pub(crate) mod handler;
pub(crate) mod metadata;

pub use handler::{HandlerConfig, HandlerDescriptor, Handlers};

/// A type whose instances receive messages from the bus.
///
/// `configure` declares the handlers once per type; subscribing an instance
/// attaches it to every subscription the type's handlers map to.
///
/// ## Example
/// ```rust
/// use typebus::{Handlers, Listener, Message};
///
/// struct Tick;
/// impl Message for Tick {}
///
/// struct Clock;
///
/// impl Listener for Clock {
///     fn configure(handlers: &mut Handlers<Self>) {
///         handlers.on::<Tick>(|_clock, _tick| {
///             // react to the tick
///         });
///     }
/// }
/// ```
pub trait Listener: Send + Sync + 'static {
    /// Declares the handlers of this listener type.
    ///
    /// Runs once per type per bus; the result is cached. Registration order
    /// is the stable handler order used everywhere else.
    fn configure(handlers: &mut Handlers<Self>)
    where
        Self: Sized;
}
