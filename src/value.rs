use std::{fmt, mem};
use std::sync::Arc;

use static_assertions::const_assert_eq;

use crate::infer::{ObjectId, Type};

/// A runtime value observed by the host
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(Arc<str>),
    /// An object, identified by its type object
    Object(ObjectId),
    /// Internal values such as array holes that inference does not track
    Magic,
}

// Make sure value doesn't grow beyond what we expect it to be
const_assert_eq!(mem::size_of::<Value>(), 24);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Value::*;
        match self {
            Undefined => write!(f, "undefined"),
            Null => write!(f, "null"),
            Boolean(value) => write!(f, "{}", value),
            Int32(value) => write!(f, "{}", value),
            Double(value) => write!(f, "{:?}", value),
            String(value) => write!(f, "{:?}", value),
            Object(id) => write!(f, "{:?}", id),
            Magic => write!(f, "<magic>"),
        }
    }
}

/// Returns the type of a value, or `None` for values that inference does not track
pub fn get_value_type(value: &Value) -> Option<Type> {
    use Value::*;
    Some(match value {
        Undefined => Type::Undefined,
        Null => Type::Null,
        Boolean(_) => Type::Boolean,
        Int32(_) => Type::Int32,
        Double(_) => Type::Double,
        String(_) => Type::String,
        Object(id) => Type::Object(*id),
        Magic => return None,
    })
}
