//! Matching policies and the tiered publisher they gate.

pub(crate) mod publisher;

pub(crate) use publisher::Publisher;

/// How a publish resolves handlers.
///
/// Selected once, at bus construction. Every mode falls back to
/// [`DeadMessage`](crate::DeadMessage) when no handler was invoked across
/// the tiers it enables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishMode {
    /// Only handlers declared over the exact runtime type of the arguments.
    Exact,
    /// Exact handlers plus handlers declared over a supertype that accept
    /// subtypes.
    ExactWithSuperTypes,
    /// The previous tiers plus var-arg fan-out: scalar publishes bundled
    /// into arrays for `[T]` handlers, including the common-supertype form.
    ExactWithSuperTypesAndVarArgs,
}

impl PublishMode {
    #[inline]
    pub(crate) fn includes_supertypes(self) -> bool {
        !matches!(self, PublishMode::Exact)
    }

    #[inline]
    pub(crate) fn includes_varargs(self) -> bool {
        matches!(self, PublishMode::ExactWithSuperTypesAndVarArgs)
    }
}
