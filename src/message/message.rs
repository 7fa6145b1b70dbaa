//! # Message identity and the declared type hierarchy.
//!
//! Rust has no runtime subtyping, so the bus models "a `B` is also an `A`"
//! explicitly: every [`Message`] type lists its direct parents via
//! [`Message::parents`], and each [`ParentLink`] carries a projection from the
//! child value to an embedded parent value. Handlers therefore always receive
//! exactly the type they declared; supertype delivery hands them the parent
//! view of the published message.
//!
//! ## Rules
//! - [`MessageType`] is compared and hashed by identity (scalar or array kind
//!   over `TypeId`); the human-readable name and the parent accessor ride
//!   along but never participate in equality.
//! - The parent graph is a DAG. Closure computation guards against revisiting
//!   a parent reachable through multiple paths.
//! - Array identities (`[T]`) are derived structurally from their element
//!   type; the parents of `[T]` are the parents of `T`, promoted to arrays.
//!
//! ## Example
//! ```rust
//! use typebus::{Message, MessageType, ParentLink};
//!
//! struct Order;
//! impl Message for Order {}
//!
//! struct RushOrder {
//!     base: Order,
//! }
//! impl Message for RushOrder {
//!     fn parents() -> Vec<ParentLink> {
//!         vec![ParentLink::to::<RushOrder, Order>(|r| &r.base)]
//!     }
//! }
//!
//! assert_ne!(MessageType::of::<Order>(), MessageType::of::<RushOrder>());
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A value that can be published on the bus.
///
/// Implementations are plain data types. The only hook is [`parents`], which
/// declares the direct supertypes this message also matches when a handler
/// opts into subtype delivery.
///
/// [`parents`]: Message::parents
pub trait Message: Any + Send + Sync {
    /// Direct parent links, nearest first.
    ///
    /// The default is an empty list: the type matches only handlers declared
    /// over it exactly (or over `[Self]` through var-arg fan-out).
    fn parents() -> Vec<ParentLink>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

/// Projection applied during supertype delivery.
///
/// Maps a type-erased child value to the type-erased parent view embedded in
/// it. Returns `None` when the input is not the type the projection was built
/// for; dispatch skips the handler and reports the mismatch.
pub(crate) type ProjectFn =
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;

/// Returns the projection that hands the value through unchanged.
pub(crate) fn identity_projection() -> ProjectFn {
    Arc::new(|message| Some(message))
}

/// One edge of the declared type hierarchy: "a `C` is also a `P`".
///
/// The projection is a plain field accessor in the common case. Marker-style
/// parents with no payload are zero-sized embedded fields.
#[derive(Clone)]
pub struct ParentLink {
    ty: MessageType,
    project: ProjectFn,
}

impl ParentLink {
    /// Builds a link from child `C` to parent `P` through an accessor.
    pub fn to<C: Message, P: Message>(project: fn(&C) -> &P) -> Self {
        Self {
            ty: MessageType::of::<P>(),
            project: Arc::new(move |message: &dyn Any| {
                message.downcast_ref::<C>().map(|child| project(child) as &dyn Any)
            }),
        }
    }

    /// Identity of the parent type.
    #[inline]
    pub fn parent_type(&self) -> MessageType {
        self.ty
    }

    #[inline]
    pub(crate) fn projection(&self) -> ProjectFn {
        self.project.clone()
    }
}

impl fmt::Debug for ParentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParentLink").field(&self.ty).finish()
    }
}

/// Scalar vs array identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum TypeKind {
    Scalar(TypeId),
    Array(TypeId),
}

/// Stable identity of a message type, usable as a map key.
///
/// Carries the kind (scalar or array of a scalar), a display name, and the
/// parent accessor of the underlying element type. Equality and hashing use
/// the kind only.
#[derive(Clone, Copy)]
pub struct MessageType {
    kind: TypeKind,
    name: &'static str,
    parents: fn() -> Vec<ParentLink>,
}

impl MessageType {
    /// Identity of the scalar message type `M`.
    pub fn of<M: Message>() -> Self {
        Self {
            kind: TypeKind::Scalar(TypeId::of::<M>()),
            name: std::any::type_name::<M>(),
            parents: M::parents,
        }
    }

    /// Identity of the array form `[M]`.
    pub fn array_of<M: Message>() -> Self {
        Self {
            kind: TypeKind::Array(TypeId::of::<M>()),
            name: std::any::type_name::<M>(),
            parents: M::parents,
        }
    }

    /// Promotes a scalar identity to its array form. `None` for arrays:
    /// there is no array-of-array form in the model.
    pub fn as_array(self) -> Option<Self> {
        match self.kind {
            TypeKind::Scalar(id) => Some(Self {
                kind: TypeKind::Array(id),
                ..self
            }),
            TypeKind::Array(_) => None,
        }
    }

    /// Element identity of an array form; scalars return themselves.
    pub(crate) fn element(self) -> Self {
        match self.kind {
            TypeKind::Scalar(_) => self,
            TypeKind::Array(id) => Self {
                kind: TypeKind::Scalar(id),
                ..self
            },
        }
    }

    /// True for `[T]` identities.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array(_))
    }

    /// Display name of the underlying type (without array brackets).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct parent links of the underlying element type.
    pub(crate) fn direct_parents(&self) -> Vec<ParentLink> {
        (self.parents)()
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array() {
            write!(f, "[{}]", self.name)
        } else {
            f.write_str(self.name)
        }
    }
}

/// A published message with its type erased.
///
/// Carries the value behind an `Arc` plus its [`MessageType`], which is all
/// the dispatch path needs: the identity keys the indices and the parent
/// accessor drives supertype resolution. Cloning is an `Arc` clone.
#[derive(Clone)]
pub struct AnyMessage {
    value: Arc<dyn Any + Send + Sync>,
    ty: MessageType,
}

impl AnyMessage {
    /// Erases a message value.
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            value: Arc::new(message),
            ty: MessageType::of::<M>(),
        }
    }

    /// Identity of the wrapped value.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.ty
    }

    /// Typed view of the wrapped value.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.value.downcast_ref::<M>()
    }

    /// True if the wrapped value is an `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.value.is::<M>()
    }

    /// Erased payload handed to handler adapters.
    #[inline]
    pub(crate) fn payload(&self) -> &dyn Any {
        &*self.value
    }
}

impl fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyMessage").field(&self.ty).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    impl Message for Base {}

    struct Derived {
        base: Base,
    }
    impl Message for Derived {
        fn parents() -> Vec<ParentLink> {
            vec![ParentLink::to::<Derived, Base>(|d| &d.base)]
        }
    }

    #[test]
    fn identity_is_per_type_and_kind() {
        assert_eq!(MessageType::of::<Base>(), MessageType::of::<Base>());
        assert_ne!(MessageType::of::<Base>(), MessageType::of::<Derived>());
        assert_ne!(
            MessageType::of::<Base>(),
            MessageType::of::<Base>().as_array().unwrap()
        );
    }

    #[test]
    fn array_promotion_round_trips() {
        let scalar = MessageType::of::<Base>();
        let array = scalar.as_array().unwrap();
        assert!(array.is_array());
        assert!(array.as_array().is_none());
        assert_eq!(array.element(), scalar);
        assert_eq!(array, MessageType::array_of::<Base>());
    }

    #[test]
    fn parent_link_projects_embedded_value() {
        let link = &Derived::parents()[0];
        assert_eq!(link.parent_type(), MessageType::of::<Base>());

        let derived = Derived { base: Base };
        let project = link.projection();
        let projected = (*project)(&derived as &dyn Any).unwrap();
        assert!(projected.downcast_ref::<Base>().is_some());

        // Projection built for Derived rejects anything else.
        assert!((*project)(&Base as &dyn Any).is_none());
    }

    #[test]
    fn any_message_downcasts() {
        let erased = AnyMessage::new(Derived { base: Base });
        assert!(erased.is::<Derived>());
        assert!(erased.downcast_ref::<Derived>().is_some());
        assert!(erased.downcast_ref::<Base>().is_none());
        assert_eq!(erased.message_type(), MessageType::of::<Derived>());
    }
}
