use std::collections::HashSet;

use super::{ConstraintId, InferError, InferResult, ObjectId, Type, TypeFlags, ValueTag};

/// The set of types that may be observed at a single program location
///
/// Sets only ever grow. Once `Unknown` is added the set stands for every type and further
/// additions are ignored.
#[derive(Debug, Default, Clone)]
pub struct TypeSet {
    /// Flags for the coarse kinds of types in this set
    flags: TypeFlags,
    /// Every type in this set, in the order it was added
    types: Vec<Type>,
    /// The objects in `types`, for fast membership checks
    objects: HashSet<ObjectId>,
    /// Constraints that propagate changes out of this set, in registration order
    constraints: Vec<ConstraintId>,
}

impl TypeSet {
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    /// Returns true if this set contains the given type
    ///
    /// A set containing `Unknown` contains every type.
    pub fn has_type(&self, ty: Type) -> bool {
        if self.is_unknown() {
            return true;
        }

        match ty {
            Type::Object(id) => self.objects.contains(&id),
            ty => self.flags.contains(ty.flag()),
        }
    }

    pub fn has_any_flag(&self, flags: TypeFlags) -> bool {
        self.flags.intersects(flags)
    }

    pub fn is_unknown(&self) -> bool {
        self.flags.contains(TypeFlags::UNKNOWN)
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// The types in this set in the order they were added
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// The objects in this set in the order they were added
    pub fn objects(&self) -> impl Iterator<Item=ObjectId> + '_ {
        self.types.iter().filter_map(|ty| ty.as_object())
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn constraints(&self) -> &[ConstraintId] {
        &self.constraints
    }

    /// Returns the type tag shared by every value in this set (if any)
    pub fn known_type_tag(&self) -> Option<ValueTag> {
        ValueTag::from_flags(self.flags)
    }

    /// The number of distinct types in this set, or `None` if the set is unknown
    pub fn type_count(&self) -> Option<usize> {
        if self.is_unknown() {
            return None;
        }

        let primitives = (self.flags - TypeFlags::OBJECT).bits().count_ones() as usize;
        Some(primitives + self.objects.len())
    }

    /// Records a type in this set. Returns false if the set already had the type.
    pub(in crate::infer) fn insert(&mut self, ty: Type) -> InferResult<bool> {
        if self.has_type(ty) {
            return Ok(false);
        }

        self.types.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "type set"})?;
        if let Type::Object(id) = ty {
            self.objects.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "type set"})?;
            self.objects.insert(id);
        }

        self.flags |= ty.flag();
        self.types.push(ty);

        Ok(true)
    }

    pub(in crate::infer) fn push_constraint(&mut self, constraint: ConstraintId) -> InferResult<()> {
        self.constraints.try_reserve(1)
            .map_err(|_| InferError::OutOfMemory {what: "constraint list"})?;
        self.constraints.push(constraint);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut set = TypeSet::default();
        assert!(set.insert(Type::Int32).unwrap());
        assert!(!set.insert(Type::Int32).unwrap());
        assert_eq!(set.types(), &[Type::Int32]);
    }

    #[test]
    fn unknown_absorbs_later_types() {
        let mut set = TypeSet::default();
        set.insert(Type::String).unwrap();
        set.insert(Type::Unknown).unwrap();

        assert!(set.has_type(Type::Double));
        assert!(set.has_type(Type::Object(ObjectId::new(3))));
        assert!(!set.insert(Type::Double).unwrap());
        assert_eq!(set.types(), &[Type::String, Type::Unknown]);
        assert_eq!(set.known_type_tag(), None);
        assert_eq!(set.type_count(), None);
    }

    #[test]
    fn objects_are_tracked_by_identity() {
        let mut set = TypeSet::default();
        let a = ObjectId::new(0);
        let b = ObjectId::new(1);

        set.insert(Type::Object(a)).unwrap();
        assert!(set.has_type(Type::Object(a)));
        assert!(!set.has_type(Type::Object(b)));
        assert_eq!(set.known_type_tag(), Some(ValueTag::Object));

        set.insert(Type::Object(b)).unwrap();
        set.insert(Type::Null).unwrap();
        assert_eq!(set.objects().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(set.type_count(), Some(3));
        assert_eq!(set.known_type_tag(), None);
    }
}
