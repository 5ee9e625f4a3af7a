use super::{BytecodeId, InferError, InferResult, ObjectId, SiteId, Type, TypeCompartment, TypeConstraint, TypeSetId};

/// A call (or `new`) of a function, and the type sets of its arguments and result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCallsite {
    /// The location of the call
    pub code: BytecodeId,
    /// Whether this is a `new` expression
    pub is_new: bool,
    /// Types of each argument passed
    pub argument_types: Vec<TypeSetId>,
    /// Types of the `this` value, if not known statically
    pub this_types: Option<TypeSetId>,
    /// Type of the `this` value, if known statically
    pub this_type: Option<Type>,
    /// Where the result of the call goes. `None` if the result is unused.
    pub return_types: Option<TypeSetId>,
}

impl TypeCallsite {
    pub fn new(code: BytecodeId, is_new: bool, argument_types: Vec<TypeSetId>) -> Self {
        Self {
            code,
            is_new,
            argument_types,
            this_types: None,
            this_type: None,
            return_types: None,
        }
    }
}

impl TypeCompartment {
    /// Registers a call site so that call constraints can refer to it
    pub fn new_callsite(&mut self, site: TypeCallsite) -> InferResult<SiteId> {
        self.sites.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "call site table"})?;
        let id = SiteId::new(self.sites.len());
        self.sites.push(site);

        Ok(id)
    }

    pub fn callsite(&self, site: SiteId) -> &TypeCallsite {
        &self.sites[site.index()]
    }

    /// Makes the call site track `this` types with a set of its own, and returns that set
    pub fn force_this_types(&mut self, site: SiteId) -> InferResult<TypeSetId> {
        if let Some(types) = self.sites[site.index()].this_types {
            return Ok(types);
        }

        let types = self.new_type_set()?;
        self.sites[site.index()].this_types = Some(types);
        Ok(types)
    }

    /// Makes the call site's result flow into a set of its own, and returns that set
    pub fn force_return_types(&mut self, site: SiteId) -> InferResult<TypeSetId> {
        if let Some(types) = self.sites[site.index()].return_types {
            return Ok(types);
        }

        let types = self.new_type_set()?;
        self.sites[site.index()].return_types = Some(types);
        Ok(types)
    }

    /// The object created by an object or array initializer at the call site's location
    pub fn get_init_object(&mut self, site: SiteId, is_array: bool) -> InferResult<ObjectId> {
        let code = self.sites[site.index()].code;
        self.init_object(code, is_array)
    }

    /// Registers a call constraint on the possible callees
    pub fn add_call(&mut self, callees: TypeSetId, site: SiteId) -> InferResult<()> {
        self.add_constraint(callees, TypeConstraint::Call {site}, true)?;
        Ok(())
    }
}
