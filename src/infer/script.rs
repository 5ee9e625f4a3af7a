use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use super::{BytecodeId, InferError, InferResult, ScriptId, TypeCompartment, TypeSetId};

/// A local variable or argument of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: Arc<str>,
    pub types: TypeSetId,
}

/// The type sets owned by a single script
#[derive(Debug, Default)]
pub struct ScriptTypes {
    /// Variables in the order they were first accessed
    pub(in crate::infer) variables: IndexMap<Arc<str>, Variable>,
    /// Types pushed onto the stack, keyed by (bytecode offset, stack index)
    pub(in crate::infer) pushed: BTreeMap<(u32, u32), TypeSetId>,
}

impl ScriptTypes {
    pub fn variables(&self) -> impl Iterator<Item=&Variable> {
        self.variables.values()
    }

    /// Every pushed set with the offset and stack index it belongs to, ordered by location
    pub fn pushed(&self) -> impl Iterator<Item=(u32, u32, TypeSetId)> + '_ {
        self.pushed.iter().map(|(&(offset, index), &types)| (offset, index, types))
    }
}

impl TypeCompartment {
    /// The types owned by `script`, if it has any yet
    pub fn script_types(&self, script: ScriptId) -> Option<&ScriptTypes> {
        self.scripts.get(&script)
    }

    fn script_types_mut(&mut self, script: ScriptId) -> InferResult<&mut ScriptTypes> {
        if !self.scripts.contains_key(&script) {
            self.scripts.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "script table"})?;
        }

        Ok(self.scripts.entry(script).or_default())
    }

    /// Returns the set of a script variable, creating it on first access
    pub fn variable(&mut self, script: ScriptId, name: &str) -> InferResult<TypeSetId> {
        if let Some(var) = self.scripts.get(&script).and_then(|types| types.variables.get(name)) {
            return Ok(var.types);
        }

        let types = self.new_type_set()?;
        let name: Arc<str> = name.into();
        let vars = &mut self.script_types_mut(script)?.variables;
        vars.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "variable table"})?;
        vars.insert(name.clone(), Variable {name, types});

        Ok(types)
    }

    /// Returns the set of types pushed at stack `index` by the bytecode at `code`, creating it on
    /// first access
    pub fn pushed_types(&mut self, code: BytecodeId, index: u32) -> InferResult<TypeSetId> {
        let key = (code.offset, index);
        if let Some(&types) = self.scripts.get(&code.script).and_then(|script| script.pushed.get(&key)) {
            return Ok(types);
        }

        let types = self.new_type_set()?;
        self.script_types_mut(code.script)?.pushed.insert(key, types);

        Ok(types)
    }
}
