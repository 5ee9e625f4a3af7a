use std::fmt::{self, Write};

use crate::{cwrite, cwriteln, fmt_ctx::DisplayCtx};

use super::{ObjectId, PropertyKey, Type, TypeCompartment, TypeSetId};

impl DisplayCtx<TypeCompartment> for Type {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, ctx: &TypeCompartment) -> fmt::Result {
        match (self.primitive_name(), self.as_object()) {
            (Some(name), _) => write!(f, "{}", name),
            (None, Some(object)) => object.fmt_ctx(f, ctx),
            (None, None) => unreachable!("bug: every type is either a primitive or an object"),
        }
    }
}

impl DisplayCtx<TypeCompartment> for ObjectId {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, ctx: &TypeCompartment) -> fmt::Result {
        write!(f, "{}", ctx.object(*self).name())
    }
}

impl DisplayCtx<TypeCompartment> for PropertyKey {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, _ctx: &TypeCompartment) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Lists the types of a set, or `unknown` if the set contains every type
impl DisplayCtx<TypeCompartment> for TypeSetId {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, ctx: &TypeCompartment) -> fmt::Result {
        let set = ctx.type_set(*self);
        if set.is_unknown() {
            return write!(f, "unknown");
        }
        if set.is_empty() {
            return write!(f, "(empty)");
        }

        let mut types = set.types().iter();
        if let Some(ty) = types.next() {
            cwrite!(f, ctx, "{}", ty)?;
        }
        for ty in types {
            cwrite!(f, ctx, " {}", ty)?;
        }

        Ok(())
    }
}

impl TypeCompartment {
    /// Writes a description of a single object, its prototype and its properties
    pub fn print_object(&self, out: &mut impl Write, object: ObjectId) -> fmt::Result {
        let obj = self.object(object);

        write!(out, "{}", obj.name())?;
        if let Some(proto) = obj.prototype() {
            cwrite!(out, self, " : {}", proto)?;
        }
        if obj.unknown_properties() {
            write!(out, " (unknown properties)")?;
        }
        if obj.is_packed_array() {
            write!(out, " (packed)")?;
        } else if obj.is_dense_array() {
            write!(out, " (dense)")?;
        }
        writeln!(out)?;

        if let Some(function) = obj.as_function() {
            if let Some(script) = function.script() {
                writeln!(out, "    script {}", script)?;
            }
            cwriteln!(out, self, "    this: {}", function.this_types())?;
            for i in 0..function.nargs() {
                if let Some(types) = function.arg_types(i) {
                    write!(out, "    arg{}: ", i)?;
                    cwriteln!(out, self, "{}", types)?;
                }
            }
            cwriteln!(out, self, "    returns: {}", function.return_types())?;
        }

        for prop in obj.properties() {
            cwriteln!(out, self, "    {}: {}", prop.key, prop.types)?;
        }

        Ok(())
    }

    /// Describes every object and script of the compartment
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.write_dump(&mut out).expect("bug: writing to a String should not fail");
        out
    }

    fn write_dump(&self, out: &mut String) -> fmt::Result {
        for object in self.objects() {
            self.print_object(out, object)?;
        }

        let mut scripts: Vec<_> = self.scripts.iter().collect();
        scripts.sort_by_key(|&(&script, _)| script);
        for (script, types) in scripts {
            writeln!(out, "script {}", script)?;
            for var in types.variables() {
                write!(out, "    var {}: ", var.name)?;
                cwriteln!(out, self, "{}", var.types)?;
            }
            for (offset, index, pushed) in types.pushed() {
                write!(out, "    push {:05}[{}]: ", offset, index)?;
                cwriteln!(out, self, "{}", pushed)?;
            }
        }

        Ok(())
    }
}
