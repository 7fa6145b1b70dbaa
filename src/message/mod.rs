//! Message model: typed values, erased envelopes, and the declared hierarchy.
//!
//! - [`Message`] is the trait published values implement; its
//!   [`parents`](Message::parents) hook declares the supertype edges.
//! - [`MessageType`] is the identity used as a key everywhere in the bus.
//! - [`AnyMessage`] is the erased envelope the dispatch path and the async
//!   queue move around.
//! - [`DeadMessage`] wraps publishes that matched nothing.

mod dead;
mod message;

pub use dead::DeadMessage;
pub use message::{AnyMessage, Message, MessageType, ParentLink};

pub(crate) use message::{identity_projection, ProjectFn};
