//! # Publication errors and the error-handler plumbing.
//!
//! No failure is allowed to escape a publish operation: every handler panic,
//! registration panic, and post-shutdown publish is converted into a
//! [`PublicationError`] and routed to the registered [`ErrorHandler`]s, then
//! dispatch continues with the next listener.
//!
//! If no handler has been registered by the time the first error must be
//! reported, a [`ConsoleReporter`] is installed and a one-time notice is
//! logged.

use std::fmt;
use std::sync::{Arc, Once};

use parking_lot::RwLock;
use smallvec::SmallVec;
use thiserror::Error;

use crate::message::MessageType;

/// Classification of failures raised on the publish and subscribe paths.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// User handler code panicked. The panic is caught and iteration
    /// continues with the next listener.
    #[error("message handler panicked: {info}")]
    HandlerPanicked {
        /// Extracted panic payload.
        info: String,
    },

    /// A listener type's handler registration panicked. The type is treated
    /// as a non-listener for the rest of the process lifetime; reported once.
    #[error("handler registration panicked for listener '{listener}': {info}")]
    RegistrationPanicked {
        /// Listener type name.
        listener: &'static str,
        /// Extracted panic payload.
        info: String,
    },

    /// A handler adapter or hierarchy projection received a payload of an
    /// unexpected type. Indicates a mis-declared parent link.
    #[error("payload type mismatch: {detail}")]
    TypeMismatch {
        /// What the adapter expected and what it got.
        detail: String,
    },

    /// Publish was called after shutdown. Safe no-op.
    #[error("publish rejected: the bus is shut down")]
    ShutdownInProgress,
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::HandlerPanicked { .. } => "handler_panicked",
            DispatchError::RegistrationPanicked { .. } => "registration_panicked",
            DispatchError::TypeMismatch { .. } => "type_mismatch",
            DispatchError::ShutdownInProgress => "shutdown_in_progress",
        }
    }
}

/// One reported failure: the error plus everything known about where it
/// happened, including the listener, the handler, and the published
/// message types.
#[derive(Debug)]
pub struct PublicationError {
    /// What went wrong.
    pub error: DispatchError,
    /// Type name of the listener whose handler failed, if known.
    pub listener: Option<&'static str>,
    /// Label of the failing handler (`Listener::name` or `Listener#index`).
    pub handler: Option<String>,
    /// Types of the messages involved in the publish, in publish order.
    pub message_types: SmallVec<[MessageType; 3]>,
}

impl PublicationError {
    /// Creates a report carrying only the error itself.
    pub fn new(error: DispatchError) -> Self {
        Self {
            error,
            listener: None,
            handler: None,
            message_types: SmallVec::new(),
        }
    }

    /// Attaches the listener type name.
    pub fn with_listener(mut self, listener: &'static str) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Attaches the handler label.
    pub fn with_handler(mut self, handler: String) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attaches the published message types.
    pub fn with_message_types(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.message_types.extend(types);
        self
    }
}

impl fmt::Display for PublicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(handler) = &self.handler {
            write!(f, " handler={handler}")?;
        } else if let Some(listener) = self.listener {
            write!(f, " listener={listener}")?;
        }
        if !self.message_types.is_empty() {
            write!(f, " messages=[")?;
            for (i, ty) in self.message_types.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{ty}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// Receives every [`PublicationError`] raised by the bus.
///
/// Implementations should return quickly: they run inline on the publishing
/// (or dispatch-worker) thread. Handle failures internally; a panicking
/// error handler is not isolated.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Processes one error report.
    fn handle(&self, error: &PublicationError);

    /// Returns the handler name for logging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Built-in error handler that prints reports to stderr.
///
/// Installed automatically when an error must be reported and no handler has
/// been registered.
pub struct ConsoleReporter;

impl ErrorHandler for ConsoleReporter {
    fn handle(&self, error: &PublicationError) {
        eprintln!("[publication-error] {error}");
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

/// Registered error handlers plus the install-on-first-use fallback.
pub(crate) struct ErrorHandlers {
    handlers: RwLock<Vec<Arc<dyn ErrorHandler>>>,
    fallback_notice: Once,
}

impl Default for ErrorHandlers {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            fallback_notice: Once::new(),
        }
    }
}

impl ErrorHandlers {
    pub(crate) fn add(&self, handler: Arc<dyn ErrorHandler>) {
        self.handlers.write().push(handler);
    }

    /// Routes one report to every registered handler, installing the console
    /// fallback first if the list is empty.
    pub(crate) fn report(&self, error: PublicationError) {
        {
            let handlers = self.handlers.read();
            if !handlers.is_empty() {
                for handler in handlers.iter() {
                    handler.handle(&error);
                }
                return;
            }
        }

        let mut handlers = self.handlers.write();
        if handlers.is_empty() {
            self.fallback_notice.call_once(|| {
                log::warn!(
                    "no error handler configured; installing console reporter \
                     (register one with MessageBus::add_error_handler)"
                );
            });
            handlers.push(Arc::new(ConsoleReporter));
        }
        for handler in handlers.iter() {
            handler.handle(&error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl ErrorHandler for Counting {
        fn handle(&self, _error: &PublicationError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn labels_are_stable() {
        let err = DispatchError::HandlerPanicked {
            info: "boom".into(),
        };
        assert_eq!(err.as_label(), "handler_panicked");
        assert_eq!(
            DispatchError::ShutdownInProgress.as_label(),
            "shutdown_in_progress"
        );
    }

    #[test]
    fn report_reaches_every_registered_handler() {
        let handlers = ErrorHandlers::default();
        let first = Arc::new(Counting(AtomicUsize::new(0)));
        let second = Arc::new(Counting(AtomicUsize::new(0)));
        handlers.add(first.clone());
        handlers.add(second.clone());

        handlers.report(PublicationError::new(DispatchError::ShutdownInProgress));

        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fallback_console_reporter_is_installed_once() {
        let handlers = ErrorHandlers::default();
        handlers.report(PublicationError::new(DispatchError::ShutdownInProgress));
        handlers.report(PublicationError::new(DispatchError::ShutdownInProgress));
        assert_eq!(handlers.handlers.read().len(), 1);
    }
}
