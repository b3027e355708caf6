// SPDX-License-Identifier: BSD-3-Clause
//! Derivation rules
//!
//! Each rule reads the fact store and a snapshot of the relations and
//! proposes new tuples. Rules never observe each other's output from the
//! same pass; the driver merges all proposals after every rule has run.
//!
//! Statements only contribute while their enclosing method is reachable,
//! which is why the statement rules walk the bodies of reachable methods
//! rather than the flat fact tables.

use tracing::trace_span;

use crate::{
    analysis::relations::{CallSite, Derivations, Relations},
    facts::{FactStore, InvokeKind, MethodId, Statement},
};

pub type Apply = fn(&FactStore, &Relations, &mut Derivations<'_>);

#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub apply: Apply,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

pub const RULES: [Rule; 9] = [
    Rule {
        name: "alloc",
        apply: alloc,
    },
    Rule {
        name: "move",
        apply: assign,
    },
    Rule {
        name: "load",
        apply: load,
    },
    Rule {
        name: "store",
        apply: store,
    },
    Rule {
        name: "static_call",
        apply: static_call,
    },
    Rule {
        name: "special_call",
        apply: special_call,
    },
    Rule {
        name: "virtual_call",
        apply: virtual_call,
    },
    Rule {
        name: "param",
        apply: param,
    },
    Rule {
        name: "return",
        apply: ret,
    },
];

fn reachable_bodies<'s>(
    facts: &'s FactStore,
    rels: &'s Relations,
) -> impl Iterator<Item = (MethodId, &'s Statement)> + 's {
    rels.reachable()
        .flat_map(move |m| facts.method(m).body().iter().map(move |s| (m, s)))
}

/// `v = new T()` makes `v` point to the allocation site.
pub fn alloc(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("alloc").entered();
    for (_, stmt) in reachable_bodies(facts, rels) {
        if let Statement::Alloc { var, heap } = *stmt {
            out.var_points_to(var, heap);
        }
    }
}

/// `to = from` copies the whole points-to set of `from`.
pub fn assign(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("move").entered();
    for (_, stmt) in reachable_bodies(facts, rels) {
        if let Statement::Move { from, to } = *stmt {
            for h in rels.points_to(from) {
                out.var_points_to(to, h);
            }
        }
    }
}

/// `to = base.field`
pub fn load(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("load").entered();
    for (_, stmt) in reachable_bodies(facts, rels) {
        if let Statement::Load { to, base, field } = *stmt {
            for base_heap in rels.points_to(base) {
                for h in rels.field_points_to(base_heap, field) {
                    out.var_points_to(to, h);
                }
            }
        }
    }
}

/// `base.field = from`
pub fn store(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("store").entered();
    for (_, stmt) in reachable_bodies(facts, rels) {
        if let Statement::Store { base, field, from } = *stmt {
            for base_heap in rels.points_to(base) {
                for h in rels.points_to(from) {
                    out.fld_points_to(base_heap, field, h);
                }
            }
        }
    }
}

/// Static calls have exactly one target.
pub fn static_call(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("static_call").entered();
    for (_, stmt) in reachable_bodies(facts, rels) {
        if let Statement::Invoke(i) = *stmt {
            if let InvokeKind::Static { callee } = facts.invocation_info(i).kind() {
                out.call_edge(CallSite::Invoke(i), callee);
            }
        }
    }
}

/// Constructors and `super` calls have exactly one target, and bind the
/// callee's `this` to the receiver.
pub fn special_call(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("special_call").entered();
    for (_, stmt) in reachable_bodies(facts, rels) {
        if let Statement::Invoke(i) = *stmt {
            if let InvokeKind::Special { base, callee } = facts.invocation_info(i).kind() {
                out.call_edge(CallSite::Invoke(i), callee);
                if let Some(this) = facts.method(callee).this() {
                    for h in rels.points_to(base) {
                        out.var_points_to(this, h);
                    }
                }
            }
        }
    }
}

/// Virtual calls dispatch on the type of each object the receiver may point
/// to. Every resolved target gets an edge and its `this` bound to that
/// object; objects whose type has no matching method are skipped.
pub fn virtual_call(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("virtual_call").entered();
    for (_, stmt) in reachable_bodies(facts, rels) {
        if let Statement::Invoke(i) = *stmt {
            if let InvokeKind::Virtual { base, name } = facts.invocation_info(i).kind() {
                for h in rels.points_to(base) {
                    let Some(ty) = facts.heap_type(h) else {
                        continue;
                    };
                    for callee in facts.dispatch().resolve(ty, name) {
                        out.call_edge(CallSite::Invoke(i), *callee);
                        if let Some(this) = facts.method(*callee).this() {
                            out.var_points_to(this, h);
                        }
                    }
                }
            }
        }
    }
}

/// Actual parameters flow into the formal parameter at the same index, for
/// every call-graph edge regardless of call kind.
pub fn param(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("param").entered();
    for (site, callee) in rels.call_graph() {
        let CallSite::Invoke(i) = site else {
            continue;
        };
        let callee = facts.method(callee);
        for (k, actual) in facts.invocation_info(i).actuals() {
            if let Some(formal) = callee.param(k) {
                for h in rels.points_to(actual) {
                    out.var_points_to(formal, h);
                }
            }
        }
    }
}

/// Return variables flow into the variable assigned the call's result.
pub fn ret(facts: &FactStore, rels: &Relations, out: &mut Derivations<'_>) {
    let _span = trace_span!("return").entered();
    for (site, callee) in rels.call_graph() {
        let CallSite::Invoke(i) = site else {
            continue;
        };
        let Some(target) = facts.invocation_info(i).target() else {
            continue;
        };
        for r in facts.method(callee).returns() {
            for h in rels.points_to(*r) {
                out.var_points_to(target, h);
            }
        }
    }
}
