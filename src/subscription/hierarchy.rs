//! # Memoised supertype closures.
//!
//! Flattens the declared parent graph of a message type into an ordered
//! closure: direct parents first, in declaration order, then their parents,
//! breadth-first. A visited set keyed by type identity guards against
//! revisiting a parent reachable through multiple paths, since the graph
//! is a DAG, not a tree.
//!
//! Each closure entry pairs the supertype with the projection composed along
//! the path that first reached it, so supertype dispatch can hand a handler
//! the parent view of the published value directly.
//!
//! Closures never change at runtime: entries are computed on first
//! observation and kept until shutdown. The memo table is a concurrent map,
//! so publish-path reads are lock-free; a race to fill the same entry just
//! computes the same deterministic value twice.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use fxhash::FxHashSet;

use crate::message::{MessageType, ProjectFn};

/// One entry of a supertype closure: the supertype and the projection from
/// the original type's value to the supertype's view of it.
#[derive(Clone)]
pub(crate) struct SuperType {
    pub(crate) ty: MessageType,
    pub(crate) project: ProjectFn,
}

#[derive(Default)]
pub(crate) struct TypeHierarchy {
    closures: DashMap<MessageType, Arc<[SuperType]>>,
}

impl TypeHierarchy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Ordered strict-supertype closure of `ty`, excluding `ty` itself.
    ///
    /// For an array type `[E]` the closure is the closure of `E` with every
    /// entry promoted to its array form; the projections stay element-wise.
    pub(crate) fn supertypes(&self, ty: MessageType) -> Arc<[SuperType]> {
        if let Some(closure) = self.closures.get(&ty) {
            return closure.value().clone();
        }
        let computed = self.compute(ty);
        self.closures.insert(ty, computed.clone());
        computed
    }

    fn compute(&self, ty: MessageType) -> Arc<[SuperType]> {
        if ty.is_array() {
            let element_closure = self.supertypes(ty.element());
            return element_closure
                .iter()
                .filter_map(|entry| {
                    entry.ty.as_array().map(|array_ty| SuperType {
                        ty: array_ty,
                        project: entry.project.clone(),
                    })
                })
                .collect();
        }

        let mut seen: FxHashSet<MessageType> = FxHashSet::default();
        seen.insert(ty);

        let mut queue: VecDeque<SuperType> = ty
            .direct_parents()
            .into_iter()
            .map(|link| SuperType {
                ty: link.parent_type(),
                project: link.projection(),
            })
            .collect();

        let mut closure = Vec::new();
        while let Some(entry) = queue.pop_front() {
            if !seen.insert(entry.ty) {
                continue;
            }
            for link in entry.ty.direct_parents() {
                queue.push_back(SuperType {
                    ty: link.parent_type(),
                    project: compose(entry.project.clone(), link.projection()),
                });
            }
            closure.push(entry);
        }
        closure.into()
    }

    pub(crate) fn clear(&self) {
        self.closures.clear();
    }
}

/// Chains two projections: child → mid, then mid → parent.
fn compose(outer: ProjectFn, inner: ProjectFn) -> ProjectFn {
    Arc::new(move |payload| (*outer)(payload).and_then(|mid| (*inner)(mid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, ParentLink};
    use std::any::Any;

    struct Root;
    impl Message for Root {}

    struct Marker;
    impl Message for Marker {}

    struct Mid {
        root: Root,
        marker: Marker,
    }
    impl Message for Mid {
        fn parents() -> Vec<ParentLink> {
            vec![
                ParentLink::to::<Mid, Root>(|m| &m.root),
                ParentLink::to::<Mid, Marker>(|m| &m.marker),
            ]
        }
    }

    struct Leaf {
        mid: Mid,
        marker: Marker,
    }
    impl Message for Leaf {
        fn parents() -> Vec<ParentLink> {
            vec![
                ParentLink::to::<Leaf, Mid>(|l| &l.mid),
                // Second path to Marker; the closure must keep one entry.
                ParentLink::to::<Leaf, Marker>(|l| &l.marker),
            ]
        }
    }

    fn types(closure: &[SuperType]) -> Vec<MessageType> {
        closure.iter().map(|entry| entry.ty).collect()
    }

    #[test]
    fn closure_is_breadth_first_in_declaration_order() {
        let hierarchy = TypeHierarchy::new();
        let closure = hierarchy.supertypes(MessageType::of::<Leaf>());
        assert_eq!(
            types(&closure),
            vec![
                MessageType::of::<Mid>(),
                MessageType::of::<Marker>(),
                MessageType::of::<Root>(),
            ]
        );
    }

    #[test]
    fn diamond_paths_are_visited_once() {
        let hierarchy = TypeHierarchy::new();
        let closure = hierarchy.supertypes(MessageType::of::<Leaf>());
        let marker_entries = closure
            .iter()
            .filter(|entry| entry.ty == MessageType::of::<Marker>())
            .count();
        assert_eq!(marker_entries, 1);
    }

    #[test]
    fn transitive_projection_reaches_the_grandparent() {
        let hierarchy = TypeHierarchy::new();
        let closure = hierarchy.supertypes(MessageType::of::<Leaf>());
        let root_entry = closure
            .iter()
            .find(|entry| entry.ty == MessageType::of::<Root>())
            .expect("Root in closure");

        let leaf = Leaf {
            mid: Mid {
                root: Root,
                marker: Marker,
            },
            marker: Marker,
        };
        let projected = (*root_entry.project)(&leaf as &dyn Any).expect("projection");
        assert!(projected.downcast_ref::<Root>().is_some());
    }

    #[test]
    fn array_closure_is_the_promoted_element_closure() {
        let hierarchy = TypeHierarchy::new();
        let closure = hierarchy.supertypes(MessageType::array_of::<Mid>());
        assert_eq!(
            types(&closure),
            vec![
                MessageType::array_of::<Root>(),
                MessageType::array_of::<Marker>(),
            ]
        );
    }

    #[test]
    fn leaf_types_have_empty_closures() {
        let hierarchy = TypeHierarchy::new();
        assert!(hierarchy.supertypes(MessageType::of::<Root>()).is_empty());
    }
}
