use std::fmt;
use std::mem;
use std::str::FromStr;
use std::sync::Arc;

use bitflags::bitflags;
use static_assertions::const_assert_eq;

macro_rules! arena_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            pub(in crate::infer) fn new(index: usize) -> Self {
                debug_assert!(index <= u32::MAX as usize, "bug: arena index overflowed u32");
                $name(index as u32)
            }

            pub(in crate::infer) fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id! {
    /// A handle to a `TypeObject` owned by a `TypeCompartment`
    ObjectId
}

arena_id! {
    /// A handle to a `TypeSet` owned by a `TypeCompartment`
    TypeSetId
}

arena_id! {
    /// A handle to a registered `TypeConstraint`
    ConstraintId
}

arena_id! {
    /// A handle to a `TypeCallsite`
    SiteId
}

/// An opaque identifier for a script, assigned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScriptId(pub u32);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A bytecode location: the script it belongs to and its offset within that script
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BytecodeId {
    pub script: ScriptId,
    pub offset: u32,
}

impl BytecodeId {
    pub fn new(script: ScriptId, offset: u32) -> Self {
        Self {script, offset}
    }
}

impl fmt::Display for BytecodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:05}", self.script, self.offset)
    }
}

/// A single concrete type
///
/// Either one of the primitive kinds, the `Unknown` sentinel that stands for any type at all, or
/// a particular type object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Undefined,
    Null,
    Boolean,
    Int32,
    Double,
    String,
    /// Could be anything. Adding this to a set makes every later addition redundant.
    Unknown,
    Object(ObjectId),
}

// Types are passed around by value everywhere, keep them small
const_assert_eq!(mem::size_of::<Type>(), 8);

impl Type {
    /// Returns true for the six primitive kinds. `Unknown` is neither primitive nor object.
    pub fn is_primitive(self) -> bool {
        use Type::*;
        match self {
            Undefined | Null | Boolean | Int32 | Double | String => true,
            Unknown | Object(_) => false,
        }
    }

    pub fn is_object(self) -> bool {
        matches!(self, Type::Object(_))
    }

    pub fn as_object(self) -> Option<ObjectId> {
        match self {
            Type::Object(id) => Some(id),
            _ => None,
        }
    }

    /// The coarse flag that records this type in a `TypeSet`
    pub fn flag(self) -> TypeFlags {
        use Type::*;
        match self {
            Undefined => TypeFlags::UNDEFINED,
            Null => TypeFlags::NULL,
            Boolean => TypeFlags::BOOLEAN,
            Int32 => TypeFlags::INT32,
            Double => TypeFlags::DOUBLE,
            String => TypeFlags::STRING,
            Unknown => TypeFlags::UNKNOWN,
            Object(_) => TypeFlags::OBJECT,
        }
    }

    /// The name of this type if it is not an object
    pub fn primitive_name(self) -> Option<&'static str> {
        use Type::*;
        Some(match self {
            Undefined => "undefined",
            Null => "null",
            Boolean => "boolean",
            Int32 => "int32",
            Double => "double",
            String => "string",
            Unknown => "unknown",
            Object(_) => return None,
        })
    }
}

/// Parses any non-object type name
impl FromStr for Type {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        use Type::*;
        Ok(match name {
            "undefined" => Undefined,
            "null" => Null,
            "boolean" => Boolean,
            "int32" => Int32,
            "double" => Double,
            "string" => String,
            "unknown" => Unknown,
            _ => return Err(()),
        })
    }
}

bitflags! {
    /// Coarse flags for the kinds of types present in a set
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u32 {
        const UNDEFINED = 1 << 1;
        const NULL = 1 << 2;
        const BOOLEAN = 1 << 3;
        const INT32 = 1 << 4;
        const DOUBLE = 1 << 5;
        const STRING = 1 << 6;
        const UNKNOWN = 1 << 7;
        const OBJECT = 0x1000;

        /// Values that convert to an integer without leaving the int32 range
        const INT_LIKE = Self::NULL.bits() | Self::BOOLEAN.bits() | Self::INT32.bits();
        /// Primitive values that take part in numeric addition
        const NUMBER_LIKE = Self::INT_LIKE.bits() | Self::UNDEFINED.bits() | Self::DOUBLE.bits();
    }
}

/// The type tag that every value in a set is known to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Undefined,
    Null,
    Boolean,
    Int32,
    Double,
    String,
    Object,
}

impl ValueTag {
    /// Returns the single tag described by `flags`, or `None` if there is no single tag
    pub fn from_flags(flags: TypeFlags) -> Option<Self> {
        use ValueTag::*;
        let tag = if flags == TypeFlags::UNDEFINED {
            Undefined
        } else if flags == TypeFlags::NULL {
            Null
        } else if flags == TypeFlags::BOOLEAN {
            Boolean
        } else if flags == TypeFlags::INT32 {
            Int32
        } else if flags == TypeFlags::DOUBLE {
            Double
        } else if flags == TypeFlags::STRING {
            String
        } else if flags == TypeFlags::OBJECT {
            Object
        } else {
            return None;
        };

        Some(tag)
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ValueTag::*;
        match self {
            Undefined => write!(f, "undefined"),
            Null => write!(f, "null"),
            Boolean => write!(f, "boolean"),
            Int32 => write!(f, "int32"),
            Double => write!(f, "double"),
            String => write!(f, "string"),
            Object => write!(f, "object"),
        }
    }
}

/// Coarse kinds of a set of objects. These form the following lattice:
///
/// ```text
///                    None
///       ___________ /  | \______________
///      /               |                \
/// PackedArray  ScriptedFunction  NativeFunction
///      |               |                 |
/// DenseArray           |                 |
///      \____________   |   _____________/
///                   \  |  /
///                   Unknown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    None,
    Unknown,
    PackedArray,
    DenseArray,
    ScriptedFunction,
    NativeFunction,
}

impl ObjectKind {
    /// The meet of two kinds in the lattice
    pub fn combine(self, other: Self) -> Self {
        use ObjectKind::*;
        match (self, other) {
            (None, kind) | (kind, None) => kind,
            (kind1, kind2) if kind1 == kind2 => kind1,
            (PackedArray, DenseArray) | (DenseArray, PackedArray) => DenseArray,
            _ => Unknown,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, ObjectKind::PackedArray | ObjectKind::DenseArray)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ObjectKind::*;
        match self {
            None => write!(f, "none"),
            Unknown => write!(f, "unknown"),
            PackedArray => write!(f, "packed-array"),
            DenseArray => write!(f, "dense-array"),
            ScriptedFunction => write!(f, "scripted-function"),
            NativeFunction => write!(f, "native-function"),
        }
    }
}

/// Identifies a property of a type object or a variable of a script
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// The aggregate property shared by every integer-indexed element
    Index,
    Named(Arc<str>),
}

impl PropertyKey {
    /// Creates a key from a property name, folding array index names into `Index`
    pub fn from_name(name: &str) -> Self {
        if is_index_name(name) {
            PropertyKey::Index
        } else {
            PropertyKey::Named(name.into())
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, PropertyKey::Index)
    }

    pub fn is_named(&self, target: &str) -> bool {
        match self {
            PropertyKey::Named(name) => &**name == target,
            PropertyKey::Index => false,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Index => write!(f, "[]"),
            PropertyKey::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Returns true if `name` is the canonical spelling of an array index
fn is_index_name(name: &str) -> bool {
    if name == "0" {
        return true;
    }

    !name.is_empty()
        && !name.starts_with('0')
        && name.bytes().all(|byte| byte.is_ascii_digit())
        && name.parse::<u32>().map(|index| index != u32::MAX).unwrap_or(false)
}
