// SPDX-License-Identifier: BSD-3-Clause
//! Input facts and the indexed, read-only fact store
//!
//! The raw input ([`Facts`]) is a bag of string tuples, one `Vec` per input
//! relation, as produced by an external fact extractor. [`FactStore::new`]
//! interns every identifier, checks that the tuples are consistent with each
//! other, and groups the statements by enclosing method so that the rules can
//! visit exactly the bodies of reachable methods.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::LazyLock;

use regex::RegexSet;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod name;
pub mod reader;

pub use error::FactError;
pub use name::{FieldId, Handle, HeapId, Interner, InvokeId, MethodId, NameId, TypeId, VarId};

use crate::analysis::dispatch::Dispatch;

// ------------------------------------------------------------------
// Rows

/// `x = new T()`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Allocation {
    pub variable: String,
    pub site: String,
    pub method: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct AllocationType {
    pub site: String,
    pub r#type: String,
}

/// `to = from`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Move {
    pub from: String,
    pub to: String,
    pub method: String,
}

/// `to = base.field`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Load {
    pub to: String,
    pub base: String,
    pub field: String,
    pub method: String,
}

/// `base.field = from`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Store {
    pub base: String,
    pub field: String,
    pub from: String,
    pub method: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct StaticInvocation {
    pub invocation: String,
    pub callee: String,
    pub method: String,
}

/// Constructors and `super` calls
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SpecialInvocation {
    pub invocation: String,
    pub base: String,
    pub callee: String,
    pub method: String,
}

/// Calls dispatched on the runtime type of `base`. Only the simple name of
/// the callee is known.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct VirtualInvocation {
    pub invocation: String,
    pub base: String,
    pub name: String,
    pub method: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ActualParam {
    pub index: usize,
    pub invocation: String,
    pub variable: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FormalParam {
    pub index: usize,
    pub method: String,
    pub variable: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ReturnVar {
    pub variable: String,
    pub method: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ThisVar {
    pub method: String,
    pub variable: String,
}

/// `variable = invocation(...)`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct AssignReturnValue {
    pub invocation: String,
    pub variable: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct MethodMeta {
    pub method: String,
    pub name: String,
    pub declaring_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Method {
    pub method: String,
}

/// One row of any input relation
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fact {
    Allocation(Allocation),
    AllocationType(AllocationType),
    Move(Move),
    Load(Load),
    Store(Store),
    StaticInvocation(StaticInvocation),
    SpecialInvocation(SpecialInvocation),
    VirtualInvocation(VirtualInvocation),
    ActualParam(ActualParam),
    FormalParam(FormalParam),
    ReturnVar(ReturnVar),
    ThisVar(ThisVar),
    AssignReturnValue(AssignReturnValue),
    MethodMeta(MethodMeta),
    Method(Method),
}

impl Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fact::Allocation(r) => {
                write!(f, "Allocation({}, {}, {})", r.variable, r.site, r.method)
            }
            Fact::AllocationType(r) => write!(f, "AllocationType({}, {})", r.site, r.r#type),
            Fact::Move(r) => write!(f, "Move({}, {}, {})", r.from, r.to, r.method),
            Fact::Load(r) => {
                write!(f, "Load({}, {}, {}, {})", r.to, r.base, r.field, r.method)
            }
            Fact::Store(r) => {
                write!(f, "Store({}, {}, {}, {})", r.base, r.field, r.from, r.method)
            }
            Fact::StaticInvocation(r) => write!(
                f,
                "StaticInvocation({}, {}, {})",
                r.invocation, r.callee, r.method
            ),
            Fact::SpecialInvocation(r) => write!(
                f,
                "SpecialInvocation({}, {}, {}, {})",
                r.invocation, r.base, r.callee, r.method
            ),
            Fact::VirtualInvocation(r) => write!(
                f,
                "VirtualInvocation({}, {}, {}, {})",
                r.invocation, r.base, r.name, r.method
            ),
            Fact::ActualParam(r) => {
                write!(f, "ActualParam({}, {}, {})", r.index, r.invocation, r.variable)
            }
            Fact::FormalParam(r) => {
                write!(f, "FormalParam({}, {}, {})", r.index, r.method, r.variable)
            }
            Fact::ReturnVar(r) => write!(f, "ReturnVar({}, {})", r.variable, r.method),
            Fact::ThisVar(r) => write!(f, "ThisVar({}, {})", r.method, r.variable),
            Fact::AssignReturnValue(r) => {
                write!(f, "AssignReturnValue({}, {})", r.invocation, r.variable)
            }
            Fact::MethodMeta(r) => write!(
                f,
                "MethodMeta({}, {}, {})",
                r.method, r.name, r.declaring_type
            ),
            Fact::Method(r) => write!(f, "Method({})", r.method),
        }
    }
}

// ------------------------------------------------------------------
// Raw input

/// All input relations, as strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Facts {
    pub allocations: Vec<Allocation>,
    pub allocation_types: Vec<AllocationType>,
    pub moves: Vec<Move>,
    pub loads: Vec<Load>,
    pub stores: Vec<Store>,
    pub static_invocations: Vec<StaticInvocation>,
    pub special_invocations: Vec<SpecialInvocation>,
    pub virtual_invocations: Vec<VirtualInvocation>,
    pub actual_params: Vec<ActualParam>,
    pub formal_params: Vec<FormalParam>,
    pub return_vars: Vec<ReturnVar>,
    pub this_vars: Vec<ThisVar>,
    pub assign_return_values: Vec<AssignReturnValue>,
    pub method_metas: Vec<MethodMeta>,
    pub methods: Vec<Method>,
}

impl Facts {
    pub fn len(&self) -> usize {
        self.allocations.len()
            + self.allocation_types.len()
            + self.moves.len()
            + self.loads.len()
            + self.stores.len()
            + self.static_invocations.len()
            + self.special_invocations.len()
            + self.virtual_invocations.len()
            + self.actual_params.len()
            + self.formal_params.len()
            + self.return_vars.len()
            + self.this_vars.len()
            + self.assign_return_values.len()
            + self.method_metas.len()
            + self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn method(&mut self, method: &str) -> &mut Self {
        self.methods.push(Method {
            method: method.to_string(),
        });
        self
    }

    pub fn method_meta(&mut self, method: &str, name: &str, declaring_type: &str) -> &mut Self {
        self.method_metas.push(MethodMeta {
            method: method.to_string(),
            name: name.to_string(),
            declaring_type: declaring_type.to_string(),
        });
        self
    }

    pub fn allocation(&mut self, variable: &str, site: &str, method: &str) -> &mut Self {
        self.allocations.push(Allocation {
            variable: variable.to_string(),
            site: site.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn allocation_type(&mut self, site: &str, r#type: &str) -> &mut Self {
        self.allocation_types.push(AllocationType {
            site: site.to_string(),
            r#type: r#type.to_string(),
        });
        self
    }

    /// A `Move` row: `to = from`
    pub fn assign(&mut self, from: &str, to: &str, method: &str) -> &mut Self {
        self.moves.push(Move {
            from: from.to_string(),
            to: to.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn load(&mut self, to: &str, base: &str, field: &str, method: &str) -> &mut Self {
        self.loads.push(Load {
            to: to.to_string(),
            base: base.to_string(),
            field: field.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn store(&mut self, base: &str, field: &str, from: &str, method: &str) -> &mut Self {
        self.stores.push(Store {
            base: base.to_string(),
            field: field.to_string(),
            from: from.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn static_call(&mut self, invocation: &str, callee: &str, method: &str) -> &mut Self {
        self.static_invocations.push(StaticInvocation {
            invocation: invocation.to_string(),
            callee: callee.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn special_call(
        &mut self,
        invocation: &str,
        base: &str,
        callee: &str,
        method: &str,
    ) -> &mut Self {
        self.special_invocations.push(SpecialInvocation {
            invocation: invocation.to_string(),
            base: base.to_string(),
            callee: callee.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn virtual_call(
        &mut self,
        invocation: &str,
        base: &str,
        name: &str,
        method: &str,
    ) -> &mut Self {
        self.virtual_invocations.push(VirtualInvocation {
            invocation: invocation.to_string(),
            base: base.to_string(),
            name: name.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn actual_param(&mut self, index: usize, invocation: &str, variable: &str) -> &mut Self {
        self.actual_params.push(ActualParam {
            index,
            invocation: invocation.to_string(),
            variable: variable.to_string(),
        });
        self
    }

    pub fn formal_param(&mut self, index: usize, method: &str, variable: &str) -> &mut Self {
        self.formal_params.push(FormalParam {
            index,
            method: method.to_string(),
            variable: variable.to_string(),
        });
        self
    }

    pub fn return_var(&mut self, variable: &str, method: &str) -> &mut Self {
        self.return_vars.push(ReturnVar {
            variable: variable.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn this_var(&mut self, method: &str, variable: &str) -> &mut Self {
        self.this_vars.push(ThisVar {
            method: method.to_string(),
            variable: variable.to_string(),
        });
        self
    }

    pub fn assign_return(&mut self, invocation: &str, variable: &str) -> &mut Self {
        self.assign_return_values.push(AssignReturnValue {
            invocation: invocation.to_string(),
            variable: variable.to_string(),
        });
        self
    }
}

// ------------------------------------------------------------------
// Indexed store

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Statement {
    Alloc {
        var: VarId,
        heap: HeapId,
    },
    Move {
        from: VarId,
        to: VarId,
    },
    Load {
        to: VarId,
        base: VarId,
        field: FieldId,
    },
    Store {
        base: VarId,
        field: FieldId,
        from: VarId,
    },
    Invoke(InvokeId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static { callee: MethodId },
    Special { base: VarId, callee: MethodId },
    Virtual { base: VarId, name: NameId },
}

#[derive(Clone, Debug)]
pub struct Invocation {
    method: MethodId,
    kind: InvokeKind,
    actuals: BTreeMap<usize, VarId>,
    target: Option<VarId>,
}

impl Invocation {
    /// The enclosing method
    #[inline]
    pub fn method(&self) -> MethodId {
        self.method
    }

    #[inline]
    pub fn kind(&self) -> InvokeKind {
        self.kind
    }

    pub fn actuals(&self) -> impl Iterator<Item = (usize, VarId)> + '_ {
        self.actuals.iter().map(|(k, v)| (*k, *v))
    }

    /// The variable receiving the return value, if any
    #[inline]
    pub fn target(&self) -> Option<VarId> {
        self.target
    }
}

#[derive(Clone, Debug, Default)]
pub struct MethodInfo {
    declared: bool,
    name: Option<NameId>,
    declaring_type: Option<TypeId>,
    params: BTreeMap<usize, VarId>,
    this: Option<VarId>,
    returns: Vec<VarId>,
    body: Vec<Statement>,
}

impl MethodInfo {
    /// Whether a `Method` fact declares this method. Undeclared methods are
    /// callees outside the extracted program; they have no body.
    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub fn name(&self) -> Option<NameId> {
        self.name
    }

    pub fn declaring_type(&self) -> Option<TypeId> {
        self.declaring_type
    }

    pub fn param(&self, index: usize) -> Option<VarId> {
        self.params.get(&index).copied()
    }

    pub fn params(&self) -> impl Iterator<Item = (usize, VarId)> + '_ {
        self.params.iter().map(|(k, v)| (*k, *v))
    }

    pub fn this(&self) -> Option<VarId> {
        self.this
    }

    pub fn returns(&self) -> &[VarId] {
        &self.returns
    }

    pub fn body(&self) -> &[Statement] {
        &self.body
    }
}

#[derive(Clone, Debug)]
struct HeapInfo {
    method: MethodId,
    ty: Option<TypeId>,
}

/// Immutable, indexed view over the input relations.
#[derive(Debug)]
pub struct FactStore {
    methods: Interner<String, MethodId>,
    method_info: Vec<MethodInfo>,
    vars: Interner<(MethodId, String), VarId>,
    heaps: Interner<String, HeapId>,
    heap_info: Vec<HeapInfo>,
    fields: Interner<String, FieldId>,
    invokes: Interner<String, InvokeId>,
    invocations: Vec<Invocation>,
    types: Interner<String, TypeId>,
    names: Interner<String, NameId>,
    dispatch: Dispatch,
}

static MAIN_METHOD: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"main\(java\.lang\.String\[\]\)",
        r"main\(java\.lang\.String\)",
        r"\bmain\(\)",
        r": void main\(",
    ])
    .expect("main method patterns are valid")
});

impl FactStore {
    pub fn new(facts: &Facts) -> Result<Self, FactError> {
        let mut store = FactStore {
            methods: Interner::default(),
            method_info: Vec::new(),
            vars: Interner::default(),
            heaps: Interner::default(),
            heap_info: Vec::new(),
            fields: Interner::default(),
            invokes: Interner::default(),
            invocations: Vec::new(),
            types: Interner::default(),
            names: Interner::default(),
            dispatch: Dispatch::default(),
        };

        for r in &facts.methods {
            let m = store.method_handle(&r.method)?;
            store.method_info[m.index()].declared = true;
        }

        for r in &facts.method_metas {
            let fact = || Fact::MethodMeta(r.clone());
            let m = store.declared(&r.method, fact)?;
            let name = store.names.intern(r.name.clone())?;
            let ty = store.types.intern(r.declaring_type.clone())?;
            let info = &mut store.method_info[m.index()];
            if info.name.is_some_and(|n| n != name) || info.declaring_type.is_some_and(|t| t != ty)
            {
                return Err(FactError::malformed(fact(), "conflicting method metadata"));
            }
            info.name = Some(name);
            info.declaring_type = Some(ty);
        }

        for r in &facts.static_invocations {
            let fact = || Fact::StaticInvocation(r.clone());
            let m = store.declared(&r.method, fact)?;
            let callee = store.method_handle(&r.callee)?;
            store.invocation(&r.invocation, m, InvokeKind::Static { callee }, fact)?;
        }
        for r in &facts.special_invocations {
            let fact = || Fact::SpecialInvocation(r.clone());
            let m = store.declared(&r.method, fact)?;
            let base = store.vars.intern((m, r.base.clone()))?;
            let callee = store.method_handle(&r.callee)?;
            store.invocation(&r.invocation, m, InvokeKind::Special { base, callee }, fact)?;
        }
        for r in &facts.virtual_invocations {
            let fact = || Fact::VirtualInvocation(r.clone());
            let m = store.declared(&r.method, fact)?;
            let base = store.vars.intern((m, r.base.clone()))?;
            let name = store.names.intern(r.name.clone())?;
            store.invocation(&r.invocation, m, InvokeKind::Virtual { base, name }, fact)?;
        }

        for r in &facts.allocations {
            let fact = || Fact::Allocation(r.clone());
            let m = store.declared(&r.method, fact)?;
            let var = store.vars.intern((m, r.variable.clone()))?;
            let heap = store.heaps.intern(r.site.clone())?;
            if heap.index() == store.heap_info.len() {
                store.heap_info.push(HeapInfo {
                    method: m,
                    ty: None,
                });
            } else if store.heap_info[heap.index()].method != m {
                return Err(FactError::malformed(
                    fact(),
                    "allocation site appears in two methods",
                ));
            }
            store.push_statement(m, Statement::Alloc { var, heap });
        }

        for r in &facts.allocation_types {
            let fact = || Fact::AllocationType(r.clone());
            let Some(heap) = store.heaps.get(r.site.as_str()) else {
                return Err(FactError::malformed(fact(), "no allocation at this site"));
            };
            let ty = store.types.intern(r.r#type.clone())?;
            let info = &mut store.heap_info[heap.index()];
            if info.ty.is_some_and(|t| t != ty) {
                return Err(FactError::malformed(fact(), "allocation site has two types"));
            }
            info.ty = Some(ty);
        }

        for r in &facts.moves {
            let m = store.declared(&r.method, || Fact::Move(r.clone()))?;
            let from = store.vars.intern((m, r.from.clone()))?;
            let to = store.vars.intern((m, r.to.clone()))?;
            store.push_statement(m, Statement::Move { from, to });
        }
        for r in &facts.loads {
            let m = store.declared(&r.method, || Fact::Load(r.clone()))?;
            let to = store.vars.intern((m, r.to.clone()))?;
            let base = store.vars.intern((m, r.base.clone()))?;
            let field = store.fields.intern(r.field.clone())?;
            store.push_statement(m, Statement::Load { to, base, field });
        }
        for r in &facts.stores {
            let m = store.declared(&r.method, || Fact::Store(r.clone()))?;
            let base = store.vars.intern((m, r.base.clone()))?;
            let field = store.fields.intern(r.field.clone())?;
            let from = store.vars.intern((m, r.from.clone()))?;
            store.push_statement(m, Statement::Store { base, field, from });
        }

        for r in &facts.actual_params {
            let fact = || Fact::ActualParam(r.clone());
            let i = store.declared_invocation(&r.invocation, fact)?;
            let m = store.invocations[i.index()].method;
            let var = store.vars.intern((m, r.variable.clone()))?;
            let actuals = &mut store.invocations[i.index()].actuals;
            if actuals.get(&r.index).is_some_and(|v| *v != var) {
                return Err(FactError::malformed(fact(), "two actual parameters at one index"));
            }
            actuals.insert(r.index, var);
        }
        for r in &facts.assign_return_values {
            let fact = || Fact::AssignReturnValue(r.clone());
            let i = store.declared_invocation(&r.invocation, fact)?;
            let m = store.invocations[i.index()].method;
            let var = store.vars.intern((m, r.variable.clone()))?;
            let inv = &mut store.invocations[i.index()];
            if inv.target.is_some_and(|v| v != var) {
                return Err(FactError::malformed(fact(), "invocation assigns two variables"));
            }
            inv.target = Some(var);
        }

        for r in &facts.formal_params {
            let fact = || Fact::FormalParam(r.clone());
            let m = store.declared(&r.method, fact)?;
            let var = store.vars.intern((m, r.variable.clone()))?;
            let params = &mut store.method_info[m.index()].params;
            if params.get(&r.index).is_some_and(|v| *v != var) {
                return Err(FactError::malformed(fact(), "two formal parameters at one index"));
            }
            params.insert(r.index, var);
        }
        for r in &facts.return_vars {
            let m = store.declared(&r.method, || Fact::ReturnVar(r.clone()))?;
            let var = store.vars.intern((m, r.variable.clone()))?;
            let returns = &mut store.method_info[m.index()].returns;
            if !returns.contains(&var) {
                returns.push(var);
            }
        }
        for r in &facts.this_vars {
            let fact = || Fact::ThisVar(r.clone());
            let m = store.declared(&r.method, fact)?;
            let var = store.vars.intern((m, r.variable.clone()))?;
            let info = &mut store.method_info[m.index()];
            if info.this.is_some_and(|v| v != var) {
                return Err(FactError::malformed(fact(), "method has two `this` variables"));
            }
            info.this = Some(var);
        }

        for info in &mut store.method_info {
            let mut seen = FxHashSet::default();
            info.body.retain(|s| seen.insert(*s));
        }

        store.dispatch = Dispatch::new(store.method_info.iter().enumerate().filter_map(
            |(i, info)| Some((info.declaring_type?, info.name?, MethodId::from_index(i as u32))),
        ));

        tracing::debug!(
            methods = store.methods.len(),
            variables = store.vars.len(),
            heaps = store.heaps.len(),
            fields = store.fields.len(),
            invocations = store.invokes.len(),
            "loaded facts"
        );
        Ok(store)
    }

    fn method_handle(&mut self, method: &str) -> Result<MethodId, FactError> {
        let m = self.methods.intern(method.to_string())?;
        if m.index() == self.method_info.len() {
            self.method_info.push(MethodInfo::default());
        }
        Ok(m)
    }

    fn declared(&self, method: &str, fact: impl FnOnce() -> Fact) -> Result<MethodId, FactError> {
        match self.methods.get(method) {
            Some(m) if self.method_info[m.index()].declared => Ok(m),
            _ => Err(FactError::malformed(
                fact(),
                format!("method {method} is not declared"),
            )),
        }
    }

    fn declared_invocation(
        &self,
        invocation: &str,
        fact: impl FnOnce() -> Fact,
    ) -> Result<InvokeId, FactError> {
        self.invokes.get(invocation).ok_or_else(|| {
            FactError::malformed(fact(), format!("invocation {invocation} is not declared"))
        })
    }

    fn invocation(
        &mut self,
        invocation: &str,
        method: MethodId,
        kind: InvokeKind,
        fact: impl FnOnce() -> Fact,
    ) -> Result<(), FactError> {
        let i = self.invokes.intern(invocation.to_string())?;
        if i.index() < self.invocations.len() {
            let existing = &self.invocations[i.index()];
            if existing.method == method && existing.kind == kind {
                return Ok(());
            }
            return Err(FactError::malformed(
                fact(),
                "invocation is declared more than once",
            ));
        }
        self.invocations.push(Invocation {
            method,
            kind,
            actuals: BTreeMap::new(),
            target: None,
        });
        self.push_statement(method, Statement::Invoke(i));
        Ok(())
    }

    fn push_statement(&mut self, method: MethodId, stmt: Statement) {
        self.method_info[method.index()].body.push(stmt);
    }

    // ------------------------------------------------------------------
    // Entities

    #[inline]
    pub fn method(&self, m: MethodId) -> &MethodInfo {
        &self.method_info[m.index()]
    }

    #[inline]
    pub fn invocation_info(&self, i: InvokeId) -> &Invocation {
        &self.invocations[i.index()]
    }

    /// The declared type of an allocation site
    #[inline]
    pub fn heap_type(&self, h: HeapId) -> Option<TypeId> {
        self.heap_info[h.index()].ty
    }

    /// The method containing an allocation site
    #[inline]
    pub fn heap_method(&self, h: HeapId) -> MethodId {
        self.heap_info[h.index()].method
    }

    /// The method a variable is scoped to
    #[inline]
    pub fn var_method(&self, v: VarId) -> MethodId {
        self.vars.key(v).0
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn methods(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.methods.handles()
    }

    pub fn num_methods(&self) -> usize {
        self.methods.len()
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_heaps(&self) -> usize {
        self.heaps.len()
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn num_invocations(&self) -> usize {
        self.invokes.len()
    }

    // ------------------------------------------------------------------
    // Lookup by name

    pub fn method_id(&self, method: &str) -> Option<MethodId> {
        self.methods.get(method)
    }

    pub fn var_id(&self, method: &str, variable: &str) -> Option<VarId> {
        let m = self.methods.get(method)?;
        self.vars.get(&(m, variable.to_string()))
    }

    pub fn heap_id(&self, site: &str) -> Option<HeapId> {
        self.heaps.get(site)
    }

    pub fn field_id(&self, field: &str) -> Option<FieldId> {
        self.fields.get(field)
    }

    pub fn invoke_id(&self, invocation: &str) -> Option<InvokeId> {
        self.invokes.get(invocation)
    }

    // ------------------------------------------------------------------
    // Names

    pub fn method_name(&self, m: MethodId) -> &str {
        self.methods.key(m)
    }

    pub fn var_name(&self, v: VarId) -> &str {
        &self.vars.key(v).1
    }

    pub fn heap_name(&self, h: HeapId) -> &str {
        self.heaps.key(h)
    }

    pub fn field_name(&self, f: FieldId) -> &str {
        self.fields.key(f)
    }

    pub fn invoke_name(&self, i: InvokeId) -> &str {
        self.invokes.key(i)
    }

    pub fn type_name(&self, t: TypeId) -> &str {
        self.types.key(t)
    }

    pub fn simple_name(&self, n: NameId) -> &str {
        self.names.key(n)
    }

    // ------------------------------------------------------------------
    // Flat views of the body statements, for the Datalog evaluation

    fn statements(&self) -> impl Iterator<Item = (MethodId, &Statement)> + '_ {
        self.methods()
            .flat_map(move |m| self.method(m).body.iter().map(move |s| (m, s)))
    }

    pub fn allocations(&self) -> impl Iterator<Item = (VarId, HeapId, MethodId)> + '_ {
        self.statements().filter_map(|(m, s)| match s {
            Statement::Alloc { var, heap } => Some((*var, *heap, m)),
            _ => None,
        })
    }

    pub fn moves(&self) -> impl Iterator<Item = (VarId, VarId, MethodId)> + '_ {
        self.statements().filter_map(|(m, s)| match s {
            Statement::Move { from, to } => Some((*from, *to, m)),
            _ => None,
        })
    }

    pub fn loads(&self) -> impl Iterator<Item = (VarId, VarId, FieldId, MethodId)> + '_ {
        self.statements().filter_map(|(m, s)| match s {
            Statement::Load { to, base, field } => Some((*to, *base, *field, m)),
            _ => None,
        })
    }

    pub fn stores(&self) -> impl Iterator<Item = (VarId, FieldId, VarId, MethodId)> + '_ {
        self.statements().filter_map(|(m, s)| match s {
            Statement::Store { base, field, from } => Some((*base, *field, *from, m)),
            _ => None,
        })
    }

    pub fn invocations(&self) -> impl Iterator<Item = (InvokeId, &Invocation)> + '_ {
        self.invocations
            .iter()
            .enumerate()
            .map(|(i, inv)| (InvokeId::from_index(i as u32), inv))
    }

    pub fn heap_types(&self) -> impl Iterator<Item = (HeapId, TypeId)> + '_ {
        self.heap_info
            .iter()
            .enumerate()
            .filter_map(|(i, info)| Some((HeapId::from_index(i as u32), info.ty?)))
    }

    // ------------------------------------------------------------------
    // Entry point

    /// Guess the entry method: the first declared method, in name order,
    /// that looks like a `main` method.
    pub fn find_entry(&self) -> Option<MethodId> {
        let mut candidates: Vec<MethodId> = self
            .methods()
            .filter(|m| self.method(*m).declared)
            .filter(|m| {
                MAIN_METHOD.is_match(self.method_name(*m))
                    || self
                        .method(*m)
                        .name
                        .is_some_and(|n| self.simple_name(n) == "main")
            })
            .collect();
        candidates.sort_by_key(|m| self.method_name(*m));
        candidates.first().copied()
    }
}
