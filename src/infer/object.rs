use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::{InferResult, ObjectId, PropertyKey, ScriptId, TypeCallsite, TypeCompartment, TypeSetId};

/// Runs at every call of a native function with the call site being processed
///
/// Natives do not have scripts that can be analyzed, so the handler is responsible for wiring the
/// argument and return types of the call site.
pub type NativeHandler = fn(&mut TypeCompartment, &TypeCallsite) -> InferResult<()>;

/// Type information about a single property of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: PropertyKey,
    /// Possible types for this property, including types inherited from prototypes
    pub types: TypeSetId,
    /// Types for this property resulting from direct assignments to the object
    pub own_types: TypeSetId,
}

/// Type information about an object accessed by a script
#[derive(Debug)]
pub struct TypeObject {
    /// Unique among all objects in the compartment
    pub(in crate::infer) name: Arc<str>,
    /// Filled in lazily as scripts access properties
    pub(in crate::infer) properties: IndexMap<PropertyKey, Property>,
    /// Immutable once set. Changing the prototype of an object makes its properties unknown.
    pub(in crate::infer) prototype: Option<ObjectId>,
    /// Objects using this one as their prototype
    pub(in crate::infer) instances: Vec<ObjectId>,
    /// The object used for instances constructed with this object as their prototype
    pub(in crate::infer) new_object: Option<ObjectId>,
    pub(in crate::infer) unknown_properties: bool,
    pub(in crate::infer) dense_array: bool,
    /// Implies `dense_array`
    pub(in crate::infer) packed_array: bool,
    /// Heuristic: this came from an array initializer that looked like it was filling the array
    pub(in crate::infer) possible_packed_array: bool,
    /// Present for function objects only
    pub(in crate::infer) function: Option<TypeFunction>,
}

impl TypeObject {
    pub(in crate::infer) fn new(name: Arc<str>, function: Option<TypeFunction>) -> Self {
        Self {
            name,
            properties: IndexMap::new(),
            prototype: None,
            instances: Vec::new(),
            new_object: None,
            unknown_properties: false,
            dense_array: false,
            packed_array: false,
            possible_packed_array: false,
            function,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prototype(&self) -> Option<ObjectId> {
        self.prototype
    }

    pub fn instances(&self) -> &[ObjectId] {
        &self.instances
    }

    pub fn unknown_properties(&self) -> bool {
        self.unknown_properties
    }

    pub fn is_dense_array(&self) -> bool {
        self.dense_array
    }

    pub fn is_packed_array(&self) -> bool {
        self.packed_array
    }

    pub fn possible_packed_array(&self) -> bool {
        self.possible_packed_array
    }

    pub fn is_function(&self) -> bool {
        self.function.is_some()
    }

    /// Narrows this object to a function, if it is one
    pub fn as_function(&self) -> Option<&TypeFunction> {
        self.function.as_ref()
    }

    /// Looks up a property without creating it
    pub fn property(&self, key: &PropertyKey) -> Option<&Property> {
        self.properties.get(key)
    }

    /// The properties of this object in the order they were first accessed
    pub fn properties(&self) -> impl Iterator<Item=&Property> {
        self.properties.values()
    }
}

/// Type information about an interpreted or native function
#[derive(Clone)]
pub struct TypeFunction {
    /// If this function is interpreted, the corresponding script
    pub(in crate::infer) script: Option<ScriptId>,
    /// If this function is native, the handler to use at calls to it
    pub(in crate::infer) handler: Option<NativeHandler>,
    /// Possible return types of the function
    pub(in crate::infer) return_types: TypeSetId,
    /// Possible types of `this` within the function
    pub(in crate::infer) this_types: TypeSetId,
    /// Possible types of each declared parameter
    pub(in crate::infer) arg_types: Vec<TypeSetId>,
    /// Default prototype object, the `prototype` property of the function
    pub(in crate::infer) prototype_object: Option<ObjectId>,
    /// Whether this is the constructor of a builtin class
    pub(in crate::infer) is_builtin: bool,
    /// Whether this native treats its first argument the way it would its `this` value, e.g.
    /// `Array.reverse(arr)` instead of `arr.reverse()`
    pub(in crate::infer) is_generic: bool,
}

impl fmt::Debug for TypeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {script, handler, return_types, this_types, arg_types, prototype_object, is_builtin, is_generic} = self;

        f.debug_struct("TypeFunction")
            .field("script", script)
            .field("handler", &handler.map(|handler| handler as *const ()))
            .field("return_types", return_types)
            .field("this_types", this_types)
            .field("arg_types", arg_types)
            .field("prototype_object", prototype_object)
            .field("is_builtin", is_builtin)
            .field("is_generic", is_generic)
            .finish()
    }
}

impl TypeFunction {
    pub(in crate::infer) fn new(return_types: TypeSetId, this_types: TypeSetId) -> Self {
        Self {
            script: None,
            handler: None,
            return_types,
            this_types,
            arg_types: Vec::new(),
            prototype_object: None,
            is_builtin: false,
            is_generic: false,
        }
    }

    pub fn script(&self) -> Option<ScriptId> {
        self.script
    }

    pub fn return_types(&self) -> TypeSetId {
        self.return_types
    }

    pub fn this_types(&self) -> TypeSetId {
        self.this_types
    }

    /// The number of declared parameters
    pub fn nargs(&self) -> usize {
        self.arg_types.len()
    }

    pub fn arg_types(&self, index: usize) -> Option<TypeSetId> {
        self.arg_types.get(index).copied()
    }

    pub fn is_builtin(&self) -> bool {
        self.is_builtin
    }

    pub fn is_generic(&self) -> bool {
        self.is_generic
    }

    pub fn is_native(&self) -> bool {
        self.script.is_none()
    }
}

/// Categories of fixed type objects, used to decide their prototype and properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixedCategory {
    Function,
    Prototype,
    UnknownProperties,
    Array,
    Object,
    Internal,
}

macro_rules! fixed_type_objects {
    ($($(#[$attr:meta])* $variant:ident => ($name:literal, $category:ident),)*) => {
        /// Singleton type objects referred to at various points in the system. At most one of each
        /// exists per compartment.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum FixedTypeObject {
            $($(#[$attr])* $variant,)*
        }

        impl FixedTypeObject {
            pub const ALL: &'static [FixedTypeObject] = &[$(FixedTypeObject::$variant,)*];
            pub const COUNT: usize = Self::ALL.len();

            pub fn name(self) -> &'static str {
                match self {
                    $(FixedTypeObject::$variant => $name,)*
                }
            }

            fn category(self) -> FixedCategory {
                match self {
                    $(FixedTypeObject::$variant => FixedCategory::$category,)*
                }
            }
        }
    };
}

fixed_type_objects! {
    Object => ("Object", Function),
    Function => ("Function", Function),
    Array => ("Array", Function),
    FunctionPrototype => ("Function.prototype", Function),
    EmptyFunction => ("EmptyFunction", Function),

    ObjectPrototype => ("Object.prototype", Prototype),
    ArrayPrototype => ("Array.prototype", Prototype),
    NewBoolean => ("new Boolean", Prototype),
    NewNumber => ("new Number", Prototype),
    NewString => ("new String", Prototype),
    NewRegExp => ("new RegExp", Prototype),
    NewIterator => ("new Iterator", Prototype),
    NewGenerator => ("new Generator", Prototype),
    NewArrayBuffer => ("new ArrayBuffer", Prototype),

    Xml => ("XML", UnknownProperties),
    Arguments => ("Arguments", UnknownProperties),
    NoSuchMethod => ("NoSuchMethod", UnknownProperties),
    NoSuchMethodArguments => ("NoSuchMethodArguments", UnknownProperties),
    PropertyDescriptor => ("PropertyDescriptor", UnknownProperties),
    KeyValuePair => ("KeyValuePair", UnknownProperties),
    Json => ("JSON", UnknownProperties),
    Proxy => ("Proxy", UnknownProperties),

    RegExpMatchArray => ("RegExpMatchArray", Array),
    StringSplitArray => ("StringSplitArray", Array),
    UnknownArray => ("UnknownArray", Array),
    CloneArray => ("CloneArray", Array),
    PropertyArray => ("PropertyArray", Array),
    ReflectArray => ("ReflectArray", Array),

    UnknownObject => ("UnknownObject", Object),
    CloneObject => ("CloneObject", Object),
    ReflectObject => ("ReflectObject", Object),
    XmlSettings => ("XMLSettings", Object),

    /// Stands in for properties with a scripted getter or setter
    GetSet => ("GetSet", Internal),
    RegExpStatics => ("RegExpStatics", Internal),
    Call => ("Call", Internal),
    DeclEnv => ("DeclEnv", Internal),
    SharpArray => ("SharpArray", Internal),
    With => ("With", Internal),
    Block => ("Block", Internal),
    NullClosure => ("NullClosure", Internal),
    PropertyIterator => ("PropertyIterator", Internal),
    Script => ("Script", Internal),
}

impl FixedTypeObject {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_function(self) -> bool {
        self.category() == FixedCategory::Function
    }

    /// Builtins whose properties are never tracked
    pub fn has_unknown_properties(self) -> bool {
        self.category() == FixedCategory::UnknownProperties
    }

    pub fn is_array(self) -> bool {
        self.category() == FixedCategory::Array
    }

    /// The fixed object used as the prototype of this one
    pub fn prototype(self) -> Option<FixedTypeObject> {
        use FixedTypeObject::*;
        match self {
            ObjectPrototype => None,
            FunctionPrototype | ArrayPrototype => Some(ObjectPrototype),
            _ => Some(match self.category() {
                FixedCategory::Function => FunctionPrototype,
                FixedCategory::Array => ArrayPrototype,
                FixedCategory::Prototype |
                FixedCategory::UnknownProperties |
                FixedCategory::Object |
                FixedCategory::Internal => ObjectPrototype,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_objects_are_indexed_densely() {
        for (i, fixed) in FixedTypeObject::ALL.iter().enumerate() {
            assert_eq!(fixed.index(), i);
        }
        assert_eq!(FixedTypeObject::COUNT, 42);
    }

    #[test]
    fn fixed_object_prototypes() {
        use FixedTypeObject::*;

        assert_eq!(ObjectPrototype.prototype(), None);
        assert_eq!(FunctionPrototype.prototype(), Some(ObjectPrototype));
        assert_eq!(Array.prototype(), Some(FunctionPrototype));
        assert_eq!(UnknownArray.prototype(), Some(ArrayPrototype));
        assert_eq!(Json.prototype(), Some(ObjectPrototype));
        assert!(Json.has_unknown_properties());
        assert!(FunctionPrototype.is_function());
        assert!(!NewNumber.is_function());
    }
}
