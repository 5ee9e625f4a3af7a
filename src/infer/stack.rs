//! Equivalence classes of stack slots.
//!
//! Program points that share a stack depth along different control flow paths are merged into a
//! single class so that they are described by a single type set. Classes are kept in a union-find
//! table.

use std::sync::Arc;

use ena::unify::{NoError, UnifyKey, UnifyValue};

use super::{InferResult, TypeCompartment, TypeSetId};

/// A node in the stack table. Nodes that have been merged share a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId(u32);

impl UnifyKey for StackId {
    type Value = StackClass;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(index: u32) -> Self {
        StackId(index)
    }

    fn tag() -> &'static str {
        "StackId"
    }
}

/// The data shared by every node of a merged class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackClass {
    /// Types of values in this stack slot
    pub types: TypeSetId,
    /// The stack slot directly below this one, if any
    pub inner: Option<StackId>,
    /// Whether the slot holds a value bound to a `with` scope
    pub bound_with: bool,
    /// Whether the compiler should ignore the known type tag of the slot
    pub ignore_type_tag: bool,
    /// The `let` variable the slot holds, if any
    pub let_variable: Option<Arc<str>>,
}

impl UnifyValue for StackClass {
    type Error = NoError;

    fn unify_values(class1: &Self, class2: &Self) -> Result<Self, Self::Error> {
        Ok(Self {
            // Merged classes already have subset edges in both directions
            types: class1.types,
            inner: class1.inner.or(class2.inner),
            bound_with: class1.bound_with || class2.bound_with,
            ignore_type_tag: class1.ignore_type_tag || class2.ignore_type_tag,
            let_variable: class2.let_variable.clone().or_else(|| class1.let_variable.clone()),
        })
    }
}

/// Flags that can be set on a stack class after it is created
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StackFlags {
    pub bound_with: bool,
    pub ignore_type_tag: bool,
    pub let_variable: Option<Arc<str>>,
}

impl TypeCompartment {
    /// Creates a stack node with a fresh type set, sitting on top of `inner`
    pub fn new_stack_node(&mut self, inner: Option<StackId>) -> InferResult<StackId> {
        let types = self.new_type_set()?;
        Ok(self.stacks.new_key(StackClass {
            types,
            inner,
            bound_with: false,
            ignore_type_tag: false,
            let_variable: None,
        }))
    }

    /// Sets the slot below `node`. If the node already has one, the two are merged instead.
    pub fn set_inner_stack(&mut self, node: StackId, inner: StackId) -> InferResult<()> {
        match self.stacks.probe_value(node).inner {
            Some(existing) => self.merge_stacks(existing, inner),
            None => {
                let mut class = self.stacks.probe_value(node);
                class.inner = Some(inner);
                self.stacks.union_value(node, class);
                Ok(())
            },
        }
    }

    /// Merges two stack nodes and, pairwise, every slot below them
    pub fn merge_stacks(&mut self, one: StackId, two: StackId) -> InferResult<()> {
        let mut pending = vec![(one, two)];

        while let Some((one, two)) = pending.pop() {
            if self.stacks.unioned(one, two) {
                continue;
            }

            let class1 = self.stacks.probe_value(one);
            let class2 = self.stacks.probe_value(two);

            if let (Some(inner1), Some(inner2)) = (class1.inner, class2.inner) {
                pending.push((inner1, inner2));
            }

            if class1.types != class2.types {
                self.add_subset(class1.types, class2.types)?;
                self.add_subset(class2.types, class1.types)?;
            }

            self.stacks.union(one, two);
        }

        Ok(())
    }

    /// Ors the given flags into the class of `node`. A `let_variable` replaces any existing one.
    pub fn set_stack_flags(&mut self, node: StackId, flags: StackFlags) {
        let StackFlags {bound_with, ignore_type_tag, let_variable} = flags;
        let class = self.stacks.probe_value(node);
        let flagged = StackClass {
            bound_with: class.bound_with || bound_with,
            ignore_type_tag: class.ignore_type_tag || ignore_type_tag,
            let_variable: let_variable.or_else(|| class.let_variable.clone()),
            ..class
        };

        // Unifying with an already merged value leaves it unchanged
        self.stacks.union_value(node, flagged);
    }

    /// The class that `node` currently belongs to
    pub fn stack_group(&mut self, node: StackId) -> StackClass {
        self.stacks.probe_value(node)
    }

    pub fn stack_types(&mut self, node: StackId) -> TypeSetId {
        self.stacks.probe_value(node).types
    }

    /// Returns true if the two nodes have been merged
    pub fn same_stack_group(&mut self, one: StackId, two: StackId) -> bool {
        self.stacks.unioned(one, two)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::{InferOptions, Type};

    #[test]
    fn merged_stacks_share_types() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let a = comp.new_stack_node(None).unwrap();
        let b = comp.new_stack_node(None).unwrap();

        let a_types = comp.stack_types(a);
        comp.add_type(a_types, Type::Int32).unwrap();
        comp.merge_stacks(a, b).unwrap();
        let b_types = comp.stack_types(b);
        comp.add_type(b_types, Type::String).unwrap();

        assert!(comp.same_stack_group(a, b));
        for &node in &[a, b] {
            let types = comp.stack_types(node);
            assert!(comp.has_type(types, Type::Int32));
            assert!(comp.has_type(types, Type::String));
        }
    }

    #[test]
    fn merging_walks_inner_stacks() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let inner1 = comp.new_stack_node(None).unwrap();
        let inner2 = comp.new_stack_node(None).unwrap();
        let outer1 = comp.new_stack_node(Some(inner1)).unwrap();
        let outer2 = comp.new_stack_node(None).unwrap();
        comp.set_inner_stack(outer2, inner2).unwrap();

        comp.merge_stacks(outer1, outer2).unwrap();
        assert!(comp.same_stack_group(inner1, inner2));
    }

    #[test]
    fn legacy_flags_are_combined() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let a = comp.new_stack_node(None).unwrap();
        let b = comp.new_stack_node(None).unwrap();

        comp.set_stack_flags(a, StackFlags {bound_with: true, let_variable: Some("x".into()), ..StackFlags::default()});
        comp.set_stack_flags(b, StackFlags {ignore_type_tag: true, let_variable: Some("y".into()), ..StackFlags::default()});
        comp.merge_stacks(a, b).unwrap();

        let class = comp.stack_group(a);
        assert!(class.bound_with);
        assert!(class.ignore_type_tag);
        assert_eq!(class.let_variable.as_deref(), Some("y"));
    }

    #[test]
    fn setting_flags_keeps_earlier_ones() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let node = comp.new_stack_node(None).unwrap();

        comp.set_stack_flags(node, StackFlags {bound_with: true, let_variable: Some("x".into()), ..StackFlags::default()});
        comp.set_stack_flags(node, StackFlags {ignore_type_tag: true, ..StackFlags::default()});

        let class = comp.stack_group(node);
        assert!(class.bound_with);
        assert!(class.ignore_type_tag);
        assert_eq!(class.let_variable.as_deref(), Some("x"));
    }
}
