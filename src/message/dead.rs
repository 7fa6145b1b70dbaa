//! # Fallback message for publishes that matched no handler.

use smallvec::SmallVec;

use super::message::{AnyMessage, Message};

/// Wrapper dispatched when a publish reached no handler in any tier.
///
/// `DeadMessage` is itself a regular message type: register a handler over it
/// to observe undeliverable traffic. It is matched exactly: subtype
/// expansion and var-arg fan-out never apply to it, and an undelivered
/// `DeadMessage` is dropped rather than wrapped again.
#[derive(Debug)]
pub struct DeadMessage {
    messages: SmallVec<[AnyMessage; 3]>,
}

impl DeadMessage {
    pub(crate) fn new(messages: SmallVec<[AnyMessage; 3]>) -> Self {
        Self { messages }
    }

    /// The originally published messages, in publish order.
    pub fn messages(&self) -> &[AnyMessage] {
        &self.messages
    }
}

impl Message for DeadMessage {}
