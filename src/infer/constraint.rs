//! Constraints and how they react to new types.

use crate::infer_spew;

use super::{
    BytecodeId,
    FixedTypeObject,
    InferResult,
    ObjectKind,
    PropertyKey,
    ScriptId,
    SiteId,
    Type,
    TypeCompartment,
    TypeFlags,
    TypeSet,
    TypeSetId,
    ValueTag,
    solver::PendingWork,
};

/// The arithmetic operation that an `Arith` constraint models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// `+`, which concatenates if either side is a string
    Add,
    /// Every other arithmetic operator. The result is always a number.
    Numeric,
}

/// Which types a `FilterPrimitives` constraint lets through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Only objects (and unknown) are forwarded
    AllPrimitives,
    /// Everything except `null` and `undefined` is forwarded
    NullVoid,
}

/// A rule listening to additions to one type set and propagating them elsewhere
#[derive(Debug, Clone, PartialEq)]
pub enum TypeConstraint {
    /// Every type in the source is added to `target`
    Subset {target: TypeSetId},

    /// Reads (`assign == false`) or writes of property `key` on the objects in the source. Reads
    /// flow the property types into `target`, writes flow `target` into the own types of the
    /// property.
    Prop {
        code: Option<BytecodeId>,
        key: PropertyKey,
        target: TypeSetId,
        assign: bool,
    },

    /// Element reads or writes `object[index]`, registered on the index types
    Elem {
        code: Option<BytecodeId>,
        object: TypeSetId,
        target: TypeSetId,
        assign: bool,
        /// Set once the integer index property has been wired up
        wired: bool,
    },

    /// Calls where the source holds the possible callees
    Call {site: SiteId},

    /// The result of an arithmetic operation. `other` holds the types of the other operand for
    /// binary operations.
    Arith {
        op: ArithOp,
        target: TypeSetId,
        other: Option<TypeSetId>,
    },

    /// Converts primitive `this` values into their boxed objects
    TransformThis {target: TypeSetId},

    FilterPrimitives {target: TypeSetId, mode: FilterMode},

    /// Forwards read results to `target`, marking `code` as monitored if the read may go through
    /// a scripted getter
    MonitorRead {code: BytecodeId, target: TypeSetId},

    /// Recompiles `script` if the type tag of the source stops being `tag`
    FreezeTypeTag {script: ScriptId, tag: ValueTag, spent: bool},

    /// Recompiles `script` if the object kind of the source changes from `kind`
    FreezeObjectKind {script: ScriptId, kind: ObjectKind, spent: bool},

    /// Recompiles `script` once the source gains any type
    FreezeNonEmpty {script: ScriptId, spent: bool},

    /// Registered on the element types of each object in a set whose kind was frozen as `kind`.
    /// Recompiles `script` once that object is demoted to a kind outside of `kind`.
    FreezeElementKind {script: ScriptId, kind: ObjectKind, spent: bool},
}

impl TypeConstraint {
    /// A short name for this kind of constraint, for logging
    pub fn kind(&self) -> &'static str {
        use TypeConstraint::*;
        match self {
            Subset {..} => "subset",
            Prop {assign: false, ..} => "getProperty",
            Prop {assign: true, ..} => "setProperty",
            Elem {assign: false, ..} => "getElem",
            Elem {assign: true, ..} => "setElem",
            Call {..} => "call",
            Arith {..} => "arith",
            TransformThis {..} => "transformThis",
            FilterPrimitives {..} => "filter",
            MonitorRead {..} => "monitorRead",
            FreezeTypeTag {..} => "freezeTypeTag",
            FreezeObjectKind {..} => "freezeObjectKind",
            FreezeNonEmpty {..} => "freezeNonEmpty",
            FreezeElementKind {..} => "freezeElementKind",
        }
    }
}

impl TypeCompartment {
    /// Runs a single constraint for a type newly added to its source set
    pub(in crate::infer) fn fire(&mut self, work: PendingWork) -> InferResult<()> {
        let PendingWork {constraint: id, source, ty} = work;
        let constraint = self.constraints[id.index()].clone();

        use TypeConstraint::*;
        match constraint {
            Subset {target} => self.add_type(target, ty),

            Prop {code, key, target, assign} => self.fire_prop(code, &key, target, assign, ty),

            Elem {code, object, target, assign, wired} => {
                match ty {
                    // Integer index accesses are all covered by the aggregate index property
                    Type::Undefined | Type::Null | Type::Boolean | Type::Int32 | Type::Double => {
                        if wired {
                            return Ok(());
                        }
                        if let Elem {wired, ..} = &mut self.constraints[id.index()] {
                            *wired = true;
                        }

                        if assign {
                            self.add_set_property(object, code, target, PropertyKey::Index)
                        } else {
                            self.add_get_property(object, code, target, PropertyKey::Index)
                        }
                    },

                    // Access to a potentially arbitrary element
                    _ => if assign {
                        match code {
                            Some(code) => self.monitor_bytecode(code),
                            None => Ok(()),
                        }
                    } else {
                        self.add_type(target, Type::Unknown)
                    },
                }
            },

            Call {site} => self.fire_call(site, ty),

            Arith {op, target, other} => {
                let other = other.map(|other| &self.sets[other.index()]);
                let (first, second) = arith_result(op, ty, other);
                if let Some(result) = first {
                    self.add_type(target, result)?;
                }
                if let Some(result) = second {
                    self.add_type(target, result)?;
                }
                Ok(())
            },

            TransformThis {target} => {
                let fixed = match ty {
                    Type::Object(_) | Type::Unknown => return self.add_type(target, ty),
                    Type::Undefined | Type::Null => {
                        let global = self.global_object();
                        return self.add_type(target, Type::Object(global));
                    },
                    Type::Int32 | Type::Double => FixedTypeObject::NewNumber,
                    Type::Boolean => FixedTypeObject::NewBoolean,
                    Type::String => FixedTypeObject::NewString,
                };

                let object = self.make_fixed_type_object(fixed)?;
                self.add_type(target, Type::Object(object))
            },

            FilterPrimitives {target, mode} => {
                let filtered = match mode {
                    FilterMode::AllPrimitives => ty.is_primitive(),
                    FilterMode::NullVoid => matches!(ty, Type::Null | Type::Undefined),
                };

                if filtered {
                    Ok(())
                } else {
                    self.add_type(target, ty)
                }
            },

            MonitorRead {code, target} => {
                let getset = self.fixed_objects[FixedTypeObject::GetSet.index()];
                match ty {
                    Type::Object(object) if Some(object) == getset => self.monitor_bytecode(code),
                    _ => self.add_type(target, ty),
                }
            },

            FreezeTypeTag {script, tag, spent} => {
                if spent || self.sets[source.index()].known_type_tag() == Some(tag) {
                    return Ok(());
                }

                self.spend(id);
                self.add_pending_recompile(script);
                Ok(())
            },

            FreezeObjectKind {script, kind, spent} => {
                if spent {
                    return Ok(());
                }

                let new_kind = match ty {
                    Type::Object(object) => kind.combine(self.object_kind(object)),
                    Type::Unknown => ObjectKind::Unknown,
                    // Primitives are covered by the type tag
                    _ => kind,
                };

                if new_kind != kind {
                    self.spend(id);
                    self.add_pending_recompile(script);
                }
                Ok(())
            },

            FreezeNonEmpty {script, spent} => {
                if !spent {
                    self.spend(id);
                    self.add_pending_recompile(script);
                }
                Ok(())
            },

            // Only reacts to the owning object being demoted
            FreezeElementKind {..} => Ok(()),
        }
    }

    /// Notifies a constraint that the object owning its source set now has kind `new_kind`
    pub(in crate::infer) fn object_kind_changed(&mut self, id: super::ConstraintId, new_kind: ObjectKind) {
        if let TypeConstraint::FreezeElementKind {script, kind, spent: false} = self.constraints[id.index()] {
            if kind.combine(new_kind) != kind {
                self.spend(id);
                self.add_pending_recompile(script);
            }
        }
    }

    /// Marks a freeze constraint as having triggered its recompilation
    fn spend(&mut self, id: super::ConstraintId) {
        use TypeConstraint::*;
        match &mut self.constraints[id.index()] {
            FreezeTypeTag {spent, ..} |
            FreezeObjectKind {spent, ..} |
            FreezeNonEmpty {spent, ..} |
            FreezeElementKind {spent, ..} => *spent = true,
            _ => unreachable!("bug: only freeze constraints can be spent"),
        }
    }

    fn fire_prop(
        &mut self,
        code: Option<BytecodeId>,
        key: &PropertyKey,
        target: TypeSetId,
        assign: bool,
        ty: Type,
    ) -> InferResult<()> {
        let object = match ty {
            Type::Unknown => {
                if !assign {
                    return self.add_type(target, Type::Unknown);
                }

                // Writes to an unknown object can go anywhere, watch them at runtime
                return match code {
                    Some(code) => self.monitor_bytecode(code),
                    None => Ok(()),
                };
            },

            Type::Object(object) => object,

            // Writes to primitives are lost, reads go through the builtin wrapper objects
            _ if assign => return Ok(()),
            Type::Int32 | Type::Double => self.make_fixed_type_object(FixedTypeObject::NewNumber)?,
            Type::Boolean => self.make_fixed_type_object(FixedTypeObject::NewBoolean)?,
            Type::String => self.make_fixed_type_object(FixedTypeObject::NewString)?,
            // Reads from these would throw
            Type::Undefined | Type::Null => return Ok(()),
        };

        if assign {
            if self.objects[object.index()].unknown_properties {
                return Ok(());
            }

            let own_types = self.get_property(object, key, true)?;
            self.add_subset(target, own_types)
        } else {
            let types = self.get_property(object, key, false)?;
            self.add_subset(types, target)
        }
    }

    fn fire_call(&mut self, site_id: SiteId, ty: Type) -> InferResult<()> {
        let site = self.sites[site_id.index()].clone();

        let callee = match ty {
            Type::Unknown => {
                infer_spew!(ops, "call: unknown callee at {}", site.code);
                return match site.return_types {
                    Some(return_types) => self.add_type(return_types, Type::Unknown),
                    None => Ok(()),
                };
            },

            Type::Object(callee) => callee,

            // Calling a primitive throws
            _ => return Ok(()),
        };

        let function = match self.objects[callee.index()].function.clone() {
            Some(function) => function,
            // Calling a non-function object throws
            None => return Ok(()),
        };

        if let Some(handler) = function.handler {
            handler(self, &site)?;
        }

        if function.script.is_some() {
            for (i, &arg_types) in site.argument_types.iter().enumerate() {
                if let Some(&param_types) = function.arg_types.get(i) {
                    self.add_subset(arg_types, param_types)?;
                }
            }

            // Missing arguments are undefined
            for &param_types in function.arg_types.iter().skip(site.argument_types.len()) {
                self.add_type(param_types, Type::Undefined)?;
            }
        } else if function.is_generic {
            if let Some(&first) = site.argument_types.first() {
                self.add_subset(first, function.this_types)?;
            }
        }

        if site.is_new {
            let prototype = self.function_prototype_object(callee)?;
            let new_object = self.get_new_object(prototype)?;
            self.add_type(function.this_types, Type::Object(new_object))?;

            if let Some(return_types) = site.return_types {
                self.add_type(return_types, Type::Object(new_object))?;
                // Only objects returned from a constructor replace the new object
                self.add_filter_primitives(function.return_types, return_types, FilterMode::AllPrimitives)?;
            }
        } else {
            if let Some(this_types) = site.this_types {
                self.add_subset(this_types, function.this_types)?;
            }
            if let Some(this_type) = site.this_type {
                self.add_type(function.this_types, this_type)?;
            }
            if let Some(return_types) = site.return_types {
                self.add_subset(function.return_types, return_types)?;
            }
        }

        Ok(())
    }
}

/// Computes the result types of an arithmetic operation when `ty` is added to one operand and the
/// other operand currently holds `other`
///
/// Results for combinations with types the other operand gains later are produced when the
/// constraint on that operand fires.
fn arith_result(op: ArithOp, ty: Type, other: Option<&TypeSet>) -> (Option<Type>, Option<Type>) {
    let other = match other {
        Some(other) => other,
        None => return (Some(unary_result(ty)), None),
    };

    match (op, ty) {
        (ArithOp::Add, Type::String) => (Some(Type::String), None),
        // Objects may convert to strings or numbers
        (ArithOp::Add, Type::Object(_)) |
        (_, Type::Unknown) => (Some(Type::Unknown), None),

        (_, Type::Null) | (_, Type::Boolean) | (_, Type::Int32) => {
            let int = if other.has_any_flag(TypeFlags::INT_LIKE) {
                Some(Type::Int32)
            } else {
                None
            };

            let double_flags = match op {
                ArithOp::Add => TypeFlags::UNDEFINED | TypeFlags::DOUBLE,
                ArithOp::Numeric => TypeFlags::UNDEFINED | TypeFlags::DOUBLE | TypeFlags::STRING | TypeFlags::OBJECT,
            };
            let double = if other.has_any_flag(double_flags) {
                Some(Type::Double)
            } else {
                None
            };

            (int, double)
        },

        (ArithOp::Add, Type::Undefined) | (ArithOp::Add, Type::Double) => {
            if other.has_any_flag(TypeFlags::NUMBER_LIKE) {
                (Some(Type::Double), None)
            } else {
                (None, None)
            }
        },

        // Undefined, doubles, strings and objects always make a non-integer number
        (ArithOp::Numeric, _) => {
            if other.is_empty() {
                (None, None)
            } else {
                (Some(Type::Double), None)
            }
        },
    }
}

/// The result of a unary numeric operation
fn unary_result(ty: Type) -> Type {
    match ty {
        Type::Null | Type::Boolean | Type::Int32 => Type::Int32,
        Type::Undefined | Type::Double | Type::String | Type::Object(_) => Type::Double,
        Type::Unknown => Type::Unknown,
    }
}
