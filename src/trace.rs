//! Replays trace scripts against a fresh compartment.
//!
//! A trace declares type sets and objects, feeds observations into them and prints the answers
//! to queries. This exercises the engine end to end without a compiler or interpreter.

mod parser;

pub use parser::*;

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::collections::HashMap;

use thiserror::Error;

use crate::{
    ErrorsEmitted,
    cformat,
    diagnostics::{Diagnostics, DiagnosticsWriter, LinePos},
    infer::{
        ArithOp,
        BytecodeId,
        FilterMode,
        FixedTypeObject,
        InferError,
        InferOptions,
        ObjectId,
        PropertyKey,
        ScriptId,
        Type,
        TypeCallsite,
        TypeCompartment,
        TypeFunction,
        TypeSetId,
    },
    value::Value,
};

/// Locations in a trace belong to this script, at the offset of their line number
const TRACE_SCRIPT: ScriptId = ScriptId(0);

#[derive(Debug, Error)]
enum ReplayError {
    #[error("unknown set `{0}`")]
    UnknownSet(String),
    #[error("unknown object `{0}`")]
    UnknownObject(String),
    #[error("`{0}` is already declared")]
    Redeclared(String),
    #[error(transparent)]
    Infer(#[from] InferError),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Runs the trace script at `path`
pub fn run_path<W: DiagnosticsWriter>(
    path: &Path,
    options: InferOptions,
    out: &mut impl Write,
    diag: &Diagnostics<W>,
) -> Result<TypeCompartment, ErrorsEmitted> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            diag.error(format!("Could not read trace file `{}`: {}", path.display(), err)).emit();
            return Err(ErrorsEmitted::new(diag.emitted_errors()));
        },
    };

    run_script(path, &source, options, out, diag)
}

/// Parses the whole script, then replays it command by command, writing query answers to `out`
///
/// Every parse error is reported before anything runs. Replay stops at the first failing
/// command.
pub fn run_script<W: DiagnosticsWriter>(
    path: &Path,
    source: &str,
    options: InferOptions,
    out: &mut impl Write,
    diag: &Diagnostics<W>,
) -> Result<TypeCompartment, ErrorsEmitted> {
    let path: Arc<Path> = path.into();

    let mut commands = Vec::new();
    for (i, line) in source.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(command)) => commands.push((i + 1, command)),
            Ok(None) => {},
            Err(err) => diag.line_error(LinePos {path: path.clone(), line: i + 1}, err.to_string()).emit(),
        }
    }
    if diag.emitted_errors() > 0 {
        return Err(ErrorsEmitted::new(diag.emitted_errors()));
    }

    let mut replay = Replay::new(options);
    for (line, command) in commands {
        if let Err(err) = replay.run(line, command, out) {
            diag.line_error(LinePos {path: path.clone(), line}, err.to_string()).emit();
            return Err(ErrorsEmitted::new(diag.emitted_errors()));
        }
    }

    Ok(replay.comp)
}

struct Replay {
    comp: TypeCompartment,
    sets: HashMap<String, TypeSetId>,
    objects: HashMap<String, ObjectId>,
}

impl Replay {
    fn new(options: InferOptions) -> Self {
        Self {
            comp: TypeCompartment::new(options),
            sets: HashMap::new(),
            objects: HashMap::new(),
        }
    }

    fn run(&mut self, line: usize, command: Command, out: &mut impl Write) -> Result<(), ReplayError> {
        let code = BytecodeId::new(TRACE_SCRIPT, line as u32);

        use Command::*;
        match command {
            Set {name} => {
                let set = self.comp.new_type_set()?;
                self.declare_set(name, set)?;
            },

            Object {name, proto} => {
                let proto = proto.map(|proto| self.object(&proto)).transpose()?;
                self.declare_object(&name, false, proto)?;
            },

            Array {name} => {
                let proto = self.comp.make_fixed_type_object(FixedTypeObject::ArrayPrototype)?;
                self.declare_object(&name, false, Some(proto))?;
            },

            Function {name, script, nargs} => {
                let object = self.declare_function(&name)?;
                if let Some(script) = script {
                    self.comp.set_function_script(object, ScriptId(script), nargs)?;
                    let function = self.function(object)?;
                    let arg_types: Vec<_> = (0..nargs).filter_map(|i| function.arg_types(i)).collect();
                    for (i, types) in arg_types.into_iter().enumerate() {
                        self.declare_set(format!("{}.arg{}", name, i), types)?;
                    }
                }
            },

            Native {name, generic} => {
                let object = self.declare_function(&name)?;
                self.comp.set_native_handler(object, None, generic)?;
            },

            Add {set, ty} => {
                let set = self.set(&set)?;
                let ty = self.ty(ty)?;
                self.comp.add_type(set, ty)?;
            },

            Subset {source, target} => {
                let (source, target) = (self.set(&source)?, self.set(&target)?);
                self.comp.add_subset(source, target)?;
            },

            GetProp {objects, prop, target} => {
                let (objects, target) = (self.set(&objects)?, self.set(&target)?);
                self.comp.add_get_property(objects, Some(code), target, PropertyKey::from_name(&prop))?;
            },

            SetProp {objects, prop, source} => {
                let (objects, source) = (self.set(&objects)?, self.set(&source)?);
                self.comp.add_set_property(objects, Some(code), source, PropertyKey::from_name(&prop))?;
            },

            GetElem {objects, indexes, target} => {
                let (objects, indexes, target) = (self.set(&objects)?, self.set(&indexes)?, self.set(&target)?);
                self.comp.add_get_elem(objects, indexes, Some(code), target)?;
            },

            SetElem {objects, indexes, source} => {
                let (objects, indexes, source) = (self.set(&objects)?, self.set(&indexes)?, self.set(&source)?);
                self.comp.add_set_elem(objects, indexes, Some(code), source)?;
            },

            Arith {lhs, rhs, target, numeric} => {
                let lhs = self.set(&lhs)?;
                let rhs = rhs.map(|rhs| self.set(&rhs)).transpose()?;
                let target = self.set(&target)?;
                let op = if numeric { ArithOp::Numeric } else { ArithOp::Add };
                self.comp.add_arith(lhs, rhs, target, op)?;
            },

            Filter {source, target, null_void} => {
                let (source, target) = (self.set(&source)?, self.set(&target)?);
                let mode = if null_void { FilterMode::NullVoid } else { FilterMode::AllPrimitives };
                self.comp.add_filter_primitives(source, target, mode)?;
            },

            Call {is_new, callee, args, target} => {
                let callee = self.set(&callee)?;
                let args = args.iter().map(|arg| self.set(arg)).collect::<Result<Vec<_>, _>>()?;
                let mut site = TypeCallsite::new(code, is_new, args);
                site.return_types = target.map(|target| self.set(&target)).transpose()?;

                let site = self.comp.new_callsite(site)?;
                self.comp.add_call(callee, site)?;
            },

            Prop {object, prop, set, own} => {
                let object = self.object(&object)?;
                let types = self.comp.get_property(object, &PropertyKey::from_name(&prop), own)?;
                // Rebinding a name to the same property is allowed
                self.sets.insert(set, types);
            },

            Assign {object, prop, value} => {
                let object = self.object(&object)?;
                let value = self.value(value)?;
                self.comp.dynamic_assign(object, &PropertyKey::from_name(&prop), &value)?;
            },

            Push {script, offset, index, ty} => {
                let ty = self.ty(ty)?;
                self.comp.add_dynamic_push(BytecodeId::new(ScriptId(script), offset), index, ty)?;
            },

            Unknown {object} => {
                let object = self.object(&object)?;
                self.comp.mark_unknown(object)?;
            },

            NotPacked {object, dense} => {
                let object = self.object(&object)?;
                self.comp.mark_array_not_packed(object, dense)?;
            },

            Tag {set: name, script} => {
                let set = self.set(&name)?;
                match self.comp.get_known_type_tag(set, script.map(ScriptId))? {
                    Some(tag) => writeln!(out, "tag {}: {}", name, tag)?,
                    None => writeln!(out, "tag {}: none", name)?,
                }
            },

            Kind {set: name, script} => {
                let set = self.set(&name)?;
                let kind = self.comp.get_known_object_kind(set, script.map(ScriptId))?;
                writeln!(out, "kind {}: {}", name, kind)?;
            },

            NonEmpty {set: name, script} => {
                let set = self.set(&name)?;
                let non_empty = self.comp.known_non_empty(set, script.map(ScriptId))?;
                writeln!(out, "nonempty {}: {}", name, non_empty)?;
            },

            Print {set: name} => {
                let set = self.set(&name)?;
                writeln!(out, "{}", cformat!(&self.comp, "{}: {}", name.as_str(), set))?;
            },

            Recompile => {
                let mut scripts = Vec::new();
                self.comp.process_pending_recompiles(&mut |script: ScriptId| scripts.push(script));
                for script in scripts {
                    writeln!(out, "recompile {}", script)?;
                }
            },
        }

        Ok(())
    }

    fn declare_set(&mut self, name: String, set: TypeSetId) -> Result<(), ReplayError> {
        if self.sets.contains_key(&name) {
            return Err(ReplayError::Redeclared(name));
        }
        self.sets.insert(name, set);
        Ok(())
    }

    fn declare_object(&mut self, name: &str, is_function: bool, proto: Option<ObjectId>) -> Result<ObjectId, ReplayError> {
        if self.objects.contains_key(name) {
            return Err(ReplayError::Redeclared(name.to_string()));
        }

        let object = self.comp.get_type_object(None, name, is_function, proto)?;
        self.objects.insert(name.to_string(), object);
        Ok(object)
    }

    /// Declares a function object along with sets for its `this` and return types
    fn declare_function(&mut self, name: &str) -> Result<ObjectId, ReplayError> {
        let proto = self.comp.make_fixed_type_object(FixedTypeObject::FunctionPrototype)?;
        let object = self.declare_object(name, true, Some(proto))?;

        let function = self.function(object)?;
        let (this_types, return_types) = (function.this_types(), function.return_types());
        self.declare_set(format!("{}.this", name), this_types)?;
        self.declare_set(format!("{}.return", name), return_types)?;

        Ok(object)
    }

    fn function(&self, object: ObjectId) -> Result<&TypeFunction, ReplayError> {
        let object = self.comp.object(object);
        object.as_function().ok_or_else(|| InferError::NotAFunction {name: object.name().into()}.into())
    }

    fn set(&self, name: &str) -> Result<TypeSetId, ReplayError> {
        self.sets.get(name).copied().ok_or_else(|| ReplayError::UnknownSet(name.to_string()))
    }

    /// Looks up an object declared by the trace, falling back to objects created by the engine
    /// and then to builtins
    fn object(&mut self, name: &str) -> Result<ObjectId, ReplayError> {
        if let Some(&object) = self.objects.get(name) {
            return Ok(object);
        }
        if let Some(object) = self.comp.object_by_name(name) {
            return Ok(object);
        }

        match FixedTypeObject::ALL.iter().find(|fixed| fixed.name() == name) {
            Some(&fixed) => Ok(self.comp.make_fixed_type_object(fixed)?),
            None => Err(ReplayError::UnknownObject(name.to_string())),
        }
    }

    fn ty(&mut self, ty: TypeRef) -> Result<Type, ReplayError> {
        match ty {
            TypeRef::Primitive(ty) => Ok(ty),
            TypeRef::Object(name) => Ok(Type::Object(self.object(&name)?)),
        }
    }

    fn value(&mut self, value: ValueLit) -> Result<Value, ReplayError> {
        Ok(match value {
            ValueLit::Undefined => Value::Undefined,
            ValueLit::Null => Value::Null,
            ValueLit::Boolean(value) => Value::Boolean(value),
            ValueLit::Int32(value) => Value::Int32(value),
            ValueLit::Double(value) => Value::Double(value),
            ValueLit::String(value) => Value::String(value.into()),
            ValueLit::Magic => Value::Magic,
            ValueLit::Object(name) => Value::Object(self.object(&name)?),
        })
    }
}
