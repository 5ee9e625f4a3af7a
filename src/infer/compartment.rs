use std::fmt;
use std::sync::Arc;
use std::collections::{HashMap, HashSet};

use ena::unify::InPlaceUnificationTable;
use static_assertions::assert_impl_all;

use crate::{
    infer_spew,
    cformat,
    value::{Value, get_value_type},
};

use super::{
    BytecodeId,
    ConstraintId,
    FilterMode,
    ArithOp,
    FixedTypeObject,
    InferError,
    InferOptions,
    InferResult,
    InferStats,
    NativeHandler,
    ObjectId,
    ObjectKind,
    Property,
    PropertyKey,
    Recompiler,
    ScriptId,
    ScriptTypes,
    StackId,
    TYPE_COUNT_LIMIT,
    Type,
    TypeCallsite,
    TypeConstraint,
    TypeFunction,
    TypeObject,
    TypeSet,
    TypeSetId,
    ValueTag,
    solver::Worklist,
};

/// Owns every type set, constraint and type object of one compilation unit
///
/// All state is released together when the compartment is dropped. Separate compartments share
/// nothing and can be used from different threads.
pub struct TypeCompartment {
    pub(in crate::infer) options: InferOptions,
    pub(in crate::infer) sets: Vec<TypeSet>,
    pub(in crate::infer) constraints: Vec<TypeConstraint>,
    pub(in crate::infer) objects: Vec<TypeObject>,
    pub(in crate::infer) sites: Vec<TypeCallsite>,
    /// Every object by its unique name
    object_names: HashMap<Arc<str>, ObjectId>,
    pub(in crate::infer) fixed_objects: [Option<ObjectId>; FixedTypeObject::COUNT],
    global_object: ObjectId,
    /// A set containing `Unknown`, returned for properties of objects with unknown properties
    universal: TypeSetId,
    /// Subset edges that have already been added
    subset_edges: HashSet<(TypeSetId, TypeSetId)>,
    pub(in crate::infer) scripts: HashMap<ScriptId, ScriptTypes>,
    /// Objects created by initializers, keyed by location and whether they are arrays
    init_objects: HashMap<(BytecodeId, bool), ObjectId>,
    /// Bytecode locations that need a type check at runtime
    monitored: HashSet<BytecodeId>,
    pub(in crate::infer) stacks: InPlaceUnificationTable<StackId>,
    pub(in crate::infer) worklist: Worklist,
    /// Scripts to recompile. May contain duplicates.
    pending_recompiles: Vec<ScriptId>,
    pub(in crate::infer) stats: InferStats,
}

assert_impl_all!(TypeCompartment: Send);

impl fmt::Debug for TypeCompartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCompartment")
            .field("sets", &self.sets.len())
            .field("constraints", &self.constraints.len())
            .field("objects", &self.objects.len())
            .field("sites", &self.sites.len())
            .field("scripts", &self.scripts.len())
            .field("pending_work", &self.worklist.len())
            .field("pending_recompiles", &self.pending_recompiles)
            .field("stats", &self.stats)
            .finish()
    }
}

impl TypeCompartment {
    pub fn new(options: InferOptions) -> Self {
        let mut universal_set = TypeSet::default();
        universal_set.insert(Type::Unknown)
            .expect("bug: inserting into an empty set should not allocate beyond its capacity");

        let global_name: Arc<str> = "Global".into();
        let global = TypeObject::new(global_name.clone(), None);

        let mut object_names = HashMap::new();
        object_names.insert(global_name, ObjectId::new(0));

        Self {
            worklist: Worklist::with_capacity(options.worklist_capacity),
            options,
            sets: vec![universal_set],
            constraints: Vec::new(),
            objects: vec![global],
            sites: Vec::new(),
            object_names,
            fixed_objects: [None; FixedTypeObject::COUNT],
            global_object: ObjectId::new(0),
            universal: TypeSetId::new(0),
            subset_edges: HashSet::new(),
            scripts: HashMap::new(),
            init_objects: HashMap::new(),
            monitored: HashSet::new(),
            stacks: InPlaceUnificationTable::new(),
            pending_recompiles: Vec::new(),
            stats: InferStats::default(),
        }
    }

    pub fn options(&self) -> &InferOptions {
        &self.options
    }

    /// The set that contains every type
    pub fn universal_set(&self) -> TypeSetId {
        self.universal
    }

    pub fn new_type_set(&mut self) -> InferResult<TypeSetId> {
        self.sets.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "type set table"})?;
        let id = TypeSetId::new(self.sets.len());
        self.sets.push(TypeSet::default());

        Ok(id)
    }

    pub fn type_set(&self, set: TypeSetId) -> &TypeSet {
        &self.sets[set.index()]
    }

    pub fn has_type(&self, set: TypeSetId, ty: Type) -> bool {
        self.sets[set.index()].has_type(ty)
    }

    pub fn constraint(&self, constraint: ConstraintId) -> &TypeConstraint {
        &self.constraints[constraint.index()]
    }

    /// Adds a type to a set and propagates it through every constraint on that set
    pub fn add_type(&mut self, set: TypeSetId, ty: Type) -> InferResult<()> {
        if !self.sets[set.index()].insert(ty)? {
            return Ok(());
        }

        infer_spew!(ops, "addType: T{} {}", set.index(), cformat!(&*self, "{}", ty));

        // Constraints added after this point get the type when they are registered
        let count = self.sets[set.index()].constraints().len();
        for i in 0..count {
            let constraint = self.sets[set.index()].constraints()[i];
            self.enqueue(constraint, set, ty)?;
        }

        self.resolve_pending()
    }

    /// Registers a constraint on `set`. With `call_existing`, the constraint is run once for
    /// every type already in the set, in the order the types were added.
    pub fn add_constraint(
        &mut self,
        set: TypeSetId,
        constraint: TypeConstraint,
        call_existing: bool,
    ) -> InferResult<ConstraintId> {
        infer_spew!(ops, "addConstraint: T{} {}", set.index(), constraint.kind());

        self.constraints.try_reserve(1)
            .map_err(|_| InferError::OutOfMemory {what: "constraint table"})?;
        let id = ConstraintId::new(self.constraints.len());
        self.constraints.push(constraint);
        self.sets[set.index()].push_constraint(id)?;

        if call_existing {
            let count = self.sets[set.index()].types().len();
            for i in 0..count {
                let ty = self.sets[set.index()].types()[i];
                self.enqueue(id, set, ty)?;
            }

            self.resolve_pending()?;
        }

        Ok(id)
    }

    /// Makes every type of `source` flow into `target`
    pub fn add_subset(&mut self, source: TypeSetId, target: TypeSetId) -> InferResult<()> {
        if source == target || self.subset_edges.contains(&(source, target)) {
            return Ok(());
        }

        self.subset_edges.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "subset table"})?;
        self.subset_edges.insert((source, target));
        self.add_constraint(source, TypeConstraint::Subset {target}, true)?;
        Ok(())
    }

    /// Reads of `key` on the objects in `objects` flow into `target`
    pub fn add_get_property(
        &mut self,
        objects: TypeSetId,
        code: Option<BytecodeId>,
        target: TypeSetId,
        key: PropertyKey,
    ) -> InferResult<()> {
        self.add_constraint(objects, TypeConstraint::Prop {code, key, target, assign: false}, true)?;
        Ok(())
    }

    /// Writes of the types in `values` to `key` on the objects in `objects`
    pub fn add_set_property(
        &mut self,
        objects: TypeSetId,
        code: Option<BytecodeId>,
        values: TypeSetId,
        key: PropertyKey,
    ) -> InferResult<()> {
        self.add_constraint(objects, TypeConstraint::Prop {code, key, target: values, assign: true}, true)?;
        Ok(())
    }

    /// Reads of `objects[indexes]` flow into `target`
    pub fn add_get_elem(
        &mut self,
        objects: TypeSetId,
        indexes: TypeSetId,
        code: Option<BytecodeId>,
        target: TypeSetId,
    ) -> InferResult<()> {
        let constraint = TypeConstraint::Elem {code, object: objects, target, assign: false, wired: false};
        self.add_constraint(indexes, constraint, true)?;
        Ok(())
    }

    /// Writes of the types in `values` to `objects[indexes]`
    pub fn add_set_elem(
        &mut self,
        objects: TypeSetId,
        indexes: TypeSetId,
        code: Option<BytecodeId>,
        values: TypeSetId,
    ) -> InferResult<()> {
        let constraint = TypeConstraint::Elem {code, object: objects, target: values, assign: true, wired: false};
        self.add_constraint(indexes, constraint, true)?;
        Ok(())
    }

    /// The result of `lhs op rhs` (or `op lhs` if `rhs` is `None`) flows into `target`
    pub fn add_arith(
        &mut self,
        lhs: TypeSetId,
        rhs: Option<TypeSetId>,
        target: TypeSetId,
        op: ArithOp,
    ) -> InferResult<()> {
        self.add_constraint(lhs, TypeConstraint::Arith {op, target, other: rhs}, true)?;
        if let Some(rhs) = rhs {
            self.add_constraint(rhs, TypeConstraint::Arith {op, target, other: Some(lhs)}, true)?;
        }

        Ok(())
    }

    pub fn add_transform_this(&mut self, source: TypeSetId, target: TypeSetId) -> InferResult<()> {
        self.add_constraint(source, TypeConstraint::TransformThis {target}, true)?;
        Ok(())
    }

    pub fn add_filter_primitives(&mut self, source: TypeSetId, target: TypeSetId, mode: FilterMode) -> InferResult<()> {
        self.add_constraint(source, TypeConstraint::FilterPrimitives {target, mode}, true)?;
        Ok(())
    }

    pub fn add_monitor_read(&mut self, source: TypeSetId, code: BytecodeId, target: TypeSetId) -> InferResult<()> {
        self.add_constraint(source, TypeConstraint::MonitorRead {code, target}, true)?;
        Ok(())
    }

    pub fn object(&self, object: ObjectId) -> &TypeObject {
        &self.objects[object.index()]
    }

    pub fn object_by_name(&self, name: &str) -> Option<ObjectId> {
        self.object_names.get(name).copied()
    }

    /// Every object in the order it was created
    pub fn objects(&self) -> impl Iterator<Item=ObjectId> {
        (0..self.objects.len()).map(ObjectId::new)
    }

    /// Returns the object with the given name, creating it if it does not exist yet
    ///
    /// With a script, the name is scoped to that script. A new object gets `prototype` as its
    /// prototype. An existing object is returned unchanged.
    pub fn get_type_object(
        &mut self,
        script: Option<ScriptId>,
        name: &str,
        is_function: bool,
        prototype: Option<ObjectId>,
    ) -> InferResult<ObjectId> {
        let name: Arc<str> = match script {
            Some(script) => format!("{}:{}", script, name).into(),
            None => name.into(),
        };

        if let Some(&id) = self.object_names.get(&name) {
            return match (is_function, self.objects[id.index()].is_function()) {
                (true, false) => Err(InferError::NotAFunction {name}),
                (false, true) => Err(InferError::UnexpectedFunction {name}),
                _ => Ok(id),
            };
        }

        let function = if is_function {
            let return_types = self.new_type_set()?;
            let this_types = self.new_type_set()?;
            Some(TypeFunction::new(return_types, this_types))
        } else {
            None
        };

        self.objects.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "object table"})?;
        self.object_names.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "object table"})?;

        let id = ObjectId::new(self.objects.len());
        infer_spew!(ops, "newObject: {}", name);
        self.objects.push(TypeObject::new(name.clone(), function));
        self.object_names.insert(name, id);

        // Nothing inherits from a new object yet, so it cannot be on the chain of `prototype`
        if let Some(prototype) = prototype {
            self.link_prototype(id, prototype)?;
        }

        Ok(id)
    }

    fn function_mut(&mut self, object: ObjectId) -> InferResult<&mut TypeFunction> {
        let object = &mut self.objects[object.index()];
        match &mut object.function {
            Some(function) => Ok(function),
            None => Err(InferError::NotAFunction {name: object.name.clone()}),
        }
    }

    /// Associates an interpreted function with its script and declares its parameters
    pub fn set_function_script(&mut self, object: ObjectId, script: ScriptId, nargs: usize) -> InferResult<()> {
        // Check before creating any sets
        self.function_mut(object)?;

        let mut arg_types = Vec::new();
        arg_types.try_reserve(nargs).map_err(|_| InferError::OutOfMemory {what: "argument list"})?;
        for _ in 0..nargs {
            arg_types.push(self.new_type_set()?);
        }

        let function = self.function_mut(object)?;
        function.script = Some(script);
        function.arg_types = arg_types;
        Ok(())
    }

    /// Makes a function native, with an optional handler run at each call
    pub fn set_native_handler(
        &mut self,
        object: ObjectId,
        handler: Option<NativeHandler>,
        is_generic: bool,
    ) -> InferResult<()> {
        let function = self.function_mut(object)?;
        function.script = None;
        function.handler = handler;
        function.is_generic = is_generic;
        Ok(())
    }

    /// Returns the singleton object for a builtin, creating it on first request
    pub fn make_fixed_type_object(&mut self, fixed: FixedTypeObject) -> InferResult<ObjectId> {
        if let Some(id) = self.fixed_objects[fixed.index()] {
            return Ok(id);
        }

        let id = self.get_type_object(None, fixed.name(), fixed.is_function(), None)?;
        self.fixed_objects[fixed.index()] = Some(id);

        if let Some(function) = &mut self.objects[id.index()].function {
            function.is_builtin = true;
        }

        if let Some(proto) = fixed.prototype() {
            let proto = self.make_fixed_type_object(proto)?;
            if self.objects[id.index()].prototype.is_none() {
                self.add_prototype(id, proto)?;
            }
        }

        if fixed.has_unknown_properties() {
            self.mark_unknown(id)?;
        }
        if fixed == FixedTypeObject::UnknownArray {
            self.mark_array_not_packed(id, true)?;
        }

        Ok(id)
    }

    pub fn global_object(&self) -> ObjectId {
        self.global_object
    }

    /// Returns true if `Array.prototype` is on the prototype chain of `object`
    pub fn is_array(&self, object: ObjectId) -> bool {
        let array_proto = match self.fixed_objects[FixedTypeObject::ArrayPrototype.index()] {
            Some(array_proto) => array_proto,
            None => return false,
        };

        let mut current = self.objects[object.index()].prototype;
        while let Some(proto) = current {
            if proto == array_proto {
                return true;
            }
            current = self.objects[proto.index()].prototype;
        }

        false
    }

    /// Returns the types of a property, creating the property if it does not exist
    ///
    /// `assign` selects the types directly assigned to this object instead of the types that
    /// include everything inherited from prototypes. Objects with unknown properties answer with
    /// the universal set.
    pub fn get_property(&mut self, object: ObjectId, key: &PropertyKey, assign: bool) -> InferResult<TypeSetId> {
        if self.objects[object.index()].unknown_properties {
            return Ok(self.universal);
        }

        let prop = match self.objects[object.index()].properties.get(key) {
            Some(prop) => prop.clone(),
            None => self.add_property(object, key)?,
        };

        Ok(if assign { prop.own_types } else { prop.types })
    }

    /// Creates `key` on `object` and on every ancestor up to the first one that already has it
    ///
    /// The chain is walked with a loop so that long prototype chains do not grow the native stack.
    fn add_property(&mut self, object: ObjectId, key: &PropertyKey) -> InferResult<Property> {
        // Nearest first
        let mut missing = vec![object];
        let mut inherited = None;
        let mut current = self.objects[object.index()].prototype;
        while let Some(proto) = current {
            let obj = &self.objects[proto.index()];
            if obj.unknown_properties {
                inherited = Some(self.universal);
                break;
            }
            if let Some(prop) = obj.properties.get(key) {
                inherited = Some(prop.types);
                break;
            }

            missing.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "prototype chain"})?;
            missing.push(proto);
            current = obj.prototype;
        }

        let mut created = Vec::new();
        created.try_reserve(missing.len()).map_err(|_| InferError::OutOfMemory {what: "prototype chain"})?;
        for &owner in missing.iter().rev() {
            created.push((owner, self.insert_property(owner, key)?));
        }

        // Wire each property to the one above it, from the top of the chain down
        let mut proto_types = inherited;
        for &(owner, ref prop) in &created {
            self.add_subset(prop.own_types, prop.types)?;
            if let Some(proto_types) = proto_types {
                self.add_subset(proto_types, prop.types)?;
            }
            proto_types = Some(prop.types);

            self.store_to_instances(owner, key)?;
        }

        let (_, prop) = created.pop().expect("bug: the requested object is always missing the property");
        Ok(prop)
    }

    fn insert_property(&mut self, object: ObjectId, key: &PropertyKey) -> InferResult<Property> {
        let types = self.new_type_set()?;
        let own_types = self.new_type_set()?;
        let prop = Property {key: key.clone(), types, own_types};

        let properties = &mut self.objects[object.index()].properties;
        properties.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "property table"})?;
        properties.insert(key.clone(), prop.clone());

        infer_spew!(ops, "addProperty: {} {} T{} own T{}",
            self.objects[object.index()].name, key, types.index(), own_types.index());

        Ok(prop)
    }

    /// Makes the types of property `key` of `object` flow into the same property of every
    /// object that has `object` on its prototype chain
    ///
    /// Instances that do not have the property yet pick it up when it is created.
    pub fn store_to_instances(&mut self, object: ObjectId, key: &PropertyKey) -> InferResult<()> {
        let base = match self.objects[object.index()].properties.get(key) {
            Some(prop) => prop.types,
            None => return Ok(()),
        };

        let mut pending = self.objects[object.index()].instances.clone();
        while let Some(instance) = pending.pop() {
            let instance_types = self.objects[instance.index()].properties.get(key).map(|prop| prop.types);
            match instance_types {
                Some(types) => self.add_subset(base, types)?,
                None => pending.extend_from_slice(&self.objects[instance.index()].instances),
            }
        }

        Ok(())
    }

    /// Sets the prototype of an object. This can only be done once.
    pub fn add_prototype(&mut self, object: ObjectId, proto: ObjectId) -> InferResult<()> {
        if self.objects[object.index()].prototype.is_some() {
            return Err(InferError::PrototypeAlreadySet {name: self.objects[object.index()].name.clone()});
        }

        let mut current = Some(proto);
        while let Some(ancestor) = current {
            if ancestor == object {
                return Err(InferError::PrototypeCycle {
                    name: self.objects[object.index()].name.clone(),
                    proto: self.objects[proto.index()].name.clone(),
                });
            }
            current = self.objects[ancestor.index()].prototype;
        }

        self.link_prototype(object, proto)
    }

    /// Links an object that has no prototype yet to `proto`, without checking for cycles
    fn link_prototype(&mut self, object: ObjectId, proto: ObjectId) -> InferResult<()> {
        let instances = &mut self.objects[proto.index()].instances;
        instances.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "instance list"})?;
        instances.push(object);
        self.objects[object.index()].prototype = Some(proto);

        infer_spew!(ops, "addPrototype: {} {}", self.objects[object.index()].name, self.objects[proto.index()].name);

        if self.objects[proto.index()].unknown_properties {
            return self.mark_unknown(object);
        }

        let props: Vec<_> = self.objects[object.index()].properties.values()
            .map(|prop| (prop.key.clone(), prop.types))
            .collect();
        for (key, types) in props {
            let proto_types = self.get_property(proto, &key, false)?;
            self.add_subset(proto_types, types)?;
        }

        if self.is_array(object) && !self.objects[object.index()].unknown_properties {
            let object = &mut self.objects[object.index()];
            object.dense_array = true;
            object.packed_array = true;
        }

        Ok(())
    }

    /// Makes every property of `object` and of every object inheriting from it unknown. This
    /// cannot be undone.
    pub fn mark_unknown(&mut self, object: ObjectId) -> InferResult<()> {
        let mut pending = vec![object];

        while let Some(object) = pending.pop() {
            if self.objects[object.index()].unknown_properties {
                continue;
            }

            infer_spew!(dynamic, "markUnknown: {}", self.objects[object.index()].name);

            self.mark_array_not_packed(object, true)?;
            self.objects[object.index()].unknown_properties = true;
            self.notify_kind_listeners(object);

            let props: Vec<_> = self.objects[object.index()].properties.values()
                .map(|prop| (prop.types, prop.own_types))
                .collect();
            for (types, own_types) in props {
                self.add_type(types, Type::Unknown)?;
                self.add_type(own_types, Type::Unknown)?;
            }

            pending.extend_from_slice(&self.objects[object.index()].instances);
        }

        Ok(())
    }

    /// Records that an array object is no longer packed, and with `not_dense` no longer dense
    ///
    /// Compiled code that assumed otherwise is queued for recompilation.
    pub fn mark_array_not_packed(&mut self, object: ObjectId, not_dense: bool) -> InferResult<()> {
        let obj = &mut self.objects[object.index()];
        if !obj.packed_array && !(not_dense && obj.dense_array) {
            return Ok(());
        }

        obj.packed_array = false;
        if not_dense {
            obj.dense_array = false;
        }

        infer_spew!(dynamic, "markArrayNotPacked: {}{}", obj.name, if not_dense { " (not dense)" } else { "" });

        self.notify_kind_listeners(object);
        Ok(())
    }

    /// Tells the object kind listeners on the element types of `object` about its current kind
    fn notify_kind_listeners(&mut self, object: ObjectId) {
        let elements = match self.objects[object.index()].properties.get(&PropertyKey::Index) {
            Some(prop) => prop.types,
            None => return,
        };

        let kind = self.object_kind(object);
        let constraints = self.sets[elements.index()].constraints().to_vec();
        for constraint in constraints {
            self.object_kind_changed(constraint, kind);
        }
    }

    /// Returns the object used for instances constructed with `object` as their prototype
    pub fn get_new_object(&mut self, object: ObjectId) -> InferResult<ObjectId> {
        if let Some(new_object) = self.objects[object.index()].new_object {
            return Ok(new_object);
        }

        let name = format!("{}:new", self.objects[object.index()].name);
        let new_object = self.get_type_object(None, &name, false, Some(object))?;
        self.objects[object.index()].new_object = Some(new_object);

        Ok(new_object)
    }

    /// Returns the default `prototype` object of a function, creating it on first request
    pub fn function_prototype_object(&mut self, function: ObjectId) -> InferResult<ObjectId> {
        if let Some(proto) = self.function_mut(function)?.prototype_object {
            return Ok(proto);
        }

        let object_proto = self.make_fixed_type_object(FixedTypeObject::ObjectPrototype)?;
        let name = format!("{}:prototype", self.objects[function.index()].name);
        let proto = self.get_type_object(None, &name, false, Some(object_proto))?;
        self.function_mut(function)?.prototype_object = Some(proto);

        Ok(proto)
    }

    /// Returns the object created by an object or array initializer at `code`
    pub(in crate::infer) fn init_object(&mut self, code: BytecodeId, is_array: bool) -> InferResult<ObjectId> {
        if let Some(&object) = self.init_objects.get(&(code, is_array)) {
            return Ok(object);
        }

        let proto = self.make_fixed_type_object(if is_array {
            FixedTypeObject::ArrayPrototype
        } else {
            FixedTypeObject::ObjectPrototype
        })?;

        let name = format!("{:05}:{}", code.offset, if is_array { "Array" } else { "Object" });
        let object = self.get_type_object(Some(code.script), &name, false, Some(proto))?;
        if is_array {
            self.objects[object.index()].possible_packed_array = true;
        }

        self.init_objects.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "initializer table"})?;
        self.init_objects.insert((code, is_array), object);

        Ok(object)
    }

    /// The kind of a single object
    pub fn object_kind(&self, object: ObjectId) -> ObjectKind {
        let obj = &self.objects[object.index()];
        if obj.packed_array && !obj.dense_array {
            self.type_failure(&format!("array `{}` is packed but not dense", obj.name));
        }

        if obj.unknown_properties {
            ObjectKind::Unknown
        } else if obj.packed_array {
            ObjectKind::PackedArray
        } else if obj.dense_array {
            ObjectKind::DenseArray
        } else {
            match &obj.function {
                Some(function) if function.script.is_some() => ObjectKind::ScriptedFunction,
                Some(_) => ObjectKind::NativeFunction,
                None => ObjectKind::Unknown,
            }
        }
    }

    /// The combined kind of every object in a set, without registering any constraint
    pub fn known_object_kind(&self, set: TypeSetId) -> ObjectKind {
        let set = &self.sets[set.index()];
        if set.is_unknown() {
            return ObjectKind::Unknown;
        }

        set.objects().fold(ObjectKind::None, |kind, object| kind.combine(self.object_kind(object)))
    }

    /// Returns the type tag of every value in `set`, if there is a single one
    ///
    /// With a script, that script is recompiled once the answer changes.
    pub fn get_known_type_tag(&mut self, set: TypeSetId, script: Option<ScriptId>) -> InferResult<Option<ValueTag>> {
        let tag = self.sets[set.index()].known_type_tag();

        if let (Some(script), Some(tag)) = (script, tag) {
            self.add_constraint(set, TypeConstraint::FreezeTypeTag {script, tag, spent: false}, false)?;
        }

        Ok(tag)
    }

    /// Returns the combined kind of the objects in `set`
    ///
    /// With a script, that script is recompiled once the answer changes, including when one of
    /// the objects in the set later gets a weaker kind (an array stops being packed or dense, or
    /// any object gets unknown properties).
    pub fn get_known_object_kind(&mut self, set: TypeSetId, script: Option<ScriptId>) -> InferResult<ObjectKind> {
        let kind = self.known_object_kind(set);

        let script = match script {
            Some(script) if kind != ObjectKind::Unknown => script,
            _ => return Ok(kind),
        };

        self.add_constraint(set, TypeConstraint::FreezeObjectKind {script, kind, spent: false}, false)?;

        let objects: Vec<_> = self.sets[set.index()].objects().collect();
        for object in objects {
            let elements = self.get_property(object, &PropertyKey::Index, false)?;
            self.add_constraint(elements, TypeConstraint::FreezeElementKind {script, kind, spent: false}, false)?;
        }

        Ok(kind)
    }

    /// Returns true if `set` has any type
    ///
    /// With a script, an empty answer recompiles that script once the set gains a type.
    pub fn known_non_empty(&mut self, set: TypeSetId, script: Option<ScriptId>) -> InferResult<bool> {
        if !self.sets[set.index()].is_empty() {
            return Ok(true);
        }

        if let Some(script) = script {
            self.add_constraint(set, TypeConstraint::FreezeNonEmpty {script, spent: false}, false)?;
        }

        Ok(false)
    }

    /// Records a type observed at runtime for a set
    pub fn add_dynamic_type(&mut self, set: TypeSetId, ty: Type) -> InferResult<()> {
        if self.sets[set.index()].has_type(ty) {
            return Ok(());
        }

        infer_spew!(dynamic, "addDynamicType: T{} {}", set.index(), cformat!(&*self, "{}", ty));
        self.add_type(set, ty)
    }

    /// Records a type pushed at runtime that the analysis did not predict. The script is
    /// recompiled so its compiled code can handle the new type.
    pub fn add_dynamic_push(&mut self, code: BytecodeId, index: u32, ty: Type) -> InferResult<()> {
        let pushed = self.pushed_types(code, index)?;
        if self.sets[pushed.index()].has_type(ty) {
            return Ok(());
        }

        infer_spew!(dynamic, "addDynamicPush: {} {}: {}", code, index, cformat!(&*self, "{}", ty));
        self.add_type(pushed, ty)?;
        self.add_pending_recompile(code.script);
        Ok(())
    }

    /// Records a runtime assignment of `value` to property `key` of `object`
    pub fn dynamic_assign(&mut self, object: ObjectId, key: &PropertyKey, value: &Value) -> InferResult<()> {
        if key.is_named("__proto__") {
            // Changing the prototype invalidates everything known about the properties
            return self.mark_unknown(object);
        }

        if self.objects[object.index()].unknown_properties {
            return Ok(());
        }

        let ty = match get_value_type(value) {
            Some(ty) => ty,
            None => return Ok(()),
        };

        let own_types = self.get_property(object, key, true)?;
        if self.sets[own_types.index()].has_type(ty) {
            return Ok(());
        }

        infer_spew!(dynamic, "dynamicAssign: {} {}: {}",
            self.objects[object.index()].name, key, cformat!(&*self, "{}", ty));
        self.add_type(own_types, ty)
    }

    /// Makes the bytecode at `code` check the types it produces at runtime
    pub fn monitor_bytecode(&mut self, code: BytecodeId) -> InferResult<()> {
        if self.monitored.contains(&code) {
            return Ok(());
        }

        self.monitored.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "monitor table"})?;
        self.monitored.insert(code);
        infer_spew!(dynamic, "monitorBytecode: {}", code);

        self.add_pending_recompile(code.script);
        Ok(())
    }

    pub fn is_monitored(&self, code: BytecodeId) -> bool {
        self.monitored.contains(&code)
    }

    pub fn add_pending_recompile(&mut self, script: ScriptId) {
        infer_spew!(dynamic, "addPendingRecompile: {}", script);
        self.pending_recompiles.push(script);
    }

    pub fn has_pending_recompiles(&self) -> bool {
        !self.pending_recompiles.is_empty()
    }

    /// Hands every script queued for recompilation to `recompiler`, once per script, in the
    /// order they were first queued. Returns the number of scripts recompiled.
    pub fn process_pending_recompiles<R: Recompiler>(&mut self, recompiler: &mut R) -> usize {
        let pending = std::mem::take(&mut self.pending_recompiles);

        let mut seen = HashSet::new();
        let mut count = 0;
        for script in pending {
            if seen.insert(script) {
                recompiler.recompile(script);
                count += 1;
            }
        }

        self.stats.recompilations += count;
        count
    }

    /// Statistics gathered so far
    pub fn stats(&self) -> InferStats {
        InferStats {
            max_solver_depth: self.worklist.max_depth,
            ..self.stats.clone()
        }
    }

    /// Finishes the analysis: buckets the pushed sets by size, emits the final state on the
    /// result channel and returns the statistics
    pub fn finish(&mut self) -> InferStats {
        let mut type_counts = [0; TYPE_COUNT_LIMIT];
        let mut type_count_over = 0;
        for script in self.scripts.values() {
            for &types in script.pushed.values() {
                match self.sets[types.index()].type_count() {
                    Some(count) if count < TYPE_COUNT_LIMIT => type_counts[count] += 1,
                    _ => type_count_over += 1,
                }
            }
        }
        self.stats.type_counts = type_counts;
        self.stats.type_count_over = type_count_over;

        if self.options.spew.is_enabled(crate::debug_log::SpewChannel::Result) {
            for line in self.dump().lines() {
                infer_spew!(result, "{}", line);
            }
        }

        let stats = self.stats();
        infer_spew!(result, "finished: {} recompilations, max solver depth {}, {} failures",
            stats.recompilations, stats.max_solver_depth, stats.failures);
        stats
    }

    /// Reports a broken internal invariant and aborts
    pub(in crate::infer) fn type_failure(&self, message: &str) -> ! {
        tracing::error!(target: "typeflow::dynamic", "type failure: {}", message);
        eprintln!("{}", self.dump());
        panic!("bug: type failure: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_constraints_see_existing_types_in_order() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let source = comp.new_type_set().unwrap();
        let target = comp.new_type_set().unwrap();

        comp.add_type(source, Type::String).unwrap();
        comp.add_type(source, Type::Int32).unwrap();
        comp.add_subset(source, target).unwrap();

        assert_eq!(comp.type_set(target).types(), &[Type::String, Type::Int32]);
    }

    #[test]
    fn subset_edges_are_deduplicated() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let source = comp.new_type_set().unwrap();
        let target = comp.new_type_set().unwrap();

        comp.add_subset(source, target).unwrap();
        comp.add_subset(source, target).unwrap();
        comp.add_subset(source, source).unwrap();

        assert_eq!(comp.type_set(source).constraints().len(), 1);
    }

    #[test]
    fn fixed_objects_are_singletons() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let array = comp.make_fixed_type_object(FixedTypeObject::Array).unwrap();
        assert_eq!(comp.make_fixed_type_object(FixedTypeObject::Array).unwrap(), array);

        let function_proto = comp.make_fixed_type_object(FixedTypeObject::FunctionPrototype).unwrap();
        assert_eq!(comp.object(array).prototype(), Some(function_proto));
        assert!(comp.object(array).is_function());
        assert!(comp.object(array).as_function().unwrap().is_builtin());
    }

    #[test]
    fn unknown_array_is_not_dense() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let array = comp.make_fixed_type_object(FixedTypeObject::UnknownArray).unwrap();
        let string_split = comp.make_fixed_type_object(FixedTypeObject::StringSplitArray).unwrap();

        assert!(comp.is_array(array));
        assert_eq!(comp.object_kind(array), ObjectKind::Unknown);
        assert_eq!(comp.object_kind(string_split), ObjectKind::PackedArray);
    }

    #[test]
    fn prototype_errors() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let a = comp.get_type_object(None, "a", false, None).unwrap();
        let b = comp.get_type_object(None, "b", false, Some(a)).unwrap();

        assert_eq!(comp.add_prototype(a, b), Err(InferError::PrototypeCycle {name: "a".into(), proto: "b".into()}));
        assert_eq!(comp.add_prototype(b, a), Err(InferError::PrototypeAlreadySet {name: "b".into()}));
    }

    #[test]
    fn script_scoped_names() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let scoped = comp.get_type_object(Some(ScriptId(3)), "f", true, None).unwrap();
        let global = comp.get_type_object(None, "f", true, None).unwrap();

        assert_ne!(scoped, global);
        assert_eq!(comp.object(scoped).name(), "#3:f");
        assert_eq!(comp.object_by_name("#3:f"), Some(scoped));
    }

    #[test]
    fn recompiles_are_deduplicated() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        comp.add_pending_recompile(ScriptId(2));
        comp.add_pending_recompile(ScriptId(1));
        comp.add_pending_recompile(ScriptId(2));

        let mut recompiled = Vec::new();
        let count = comp.process_pending_recompiles(&mut |script: ScriptId| recompiled.push(script));

        assert_eq!(count, 2);
        assert_eq!(recompiled, vec![ScriptId(2), ScriptId(1)]);
        assert!(!comp.has_pending_recompiles());
        assert_eq!(comp.stats().recompilations, 2);
    }

    #[test]
    fn pushed_sets_are_bucketed_by_size() {
        let mut comp = TypeCompartment::new(InferOptions::default());
        let code = BytecodeId::new(ScriptId(0), 4);
        comp.add_dynamic_push(code, 0, Type::Int32).unwrap();
        comp.add_dynamic_push(code, 1, Type::Unknown).unwrap();
        comp.pushed_types(BytecodeId::new(ScriptId(0), 8), 0).unwrap();

        let stats = comp.finish();
        assert_eq!(stats.type_counts, [1, 1, 0, 0]);
        assert_eq!(stats.type_count_over, 1);
    }
}
