// SPDX-License-Identifier: BSD-3-Clause
//! The rules as a Datalog program
//!
//! Same semantics as the naive driver, evaluated semi-naively by ascent.
//! Reachability gating is a join against `reachable` on the enclosing method
//! of each statement.

#[cfg(not(feature = "par"))]
use ascent::ascent_run;
#[cfg(feature = "par")]
use ascent::ascent_run_par as ascent_run;

use tracing::trace_span;

use crate::{
    analysis::{
        pointer::{OutputRelations, Sizes, Statistics, Strategy},
        relations::CallSite,
    },
    facts::{FactStore, FieldId, HeapId, InvokeId, InvokeKind, MethodId, NameId, TypeId, VarId},
};

#[allow(clippy::clone_on_copy)]
#[allow(clippy::collapsible_if)]
#[allow(clippy::collapsible_match)]
#[allow(clippy::let_unit_value)]
#[allow(clippy::type_complexity)]
#[allow(clippy::unused_unit)]
pub fn analysis(facts: &FactStore, entry: MethodId, debug: bool) -> OutputRelations {
    #[allow(clippy::clone_on_copy)]
    #[allow(clippy::redundant_clone)]
    #[allow(single_use_lifetimes)]
    #[allow(unreachable_code)]
    #[allow(unused_variables)]
    let outs = ascent_run! {
        #![measure_rule_times]

        struct Outs;

        // ----------------------------------------------------------
        // Facts
        // ----------------------------------------------------------

        relation allocation(VarId, HeapId, MethodId);
        allocation(v, h, m) <-- for (v, h, m) in facts.allocations();

        relation assign(VarId, VarId, MethodId);
        assign(from, to, m) <-- for (from, to, m) in facts.moves();

        relation field_load(VarId, VarId, FieldId, MethodId);
        field_load(to, base, f, m) <-- for (to, base, f, m) in facts.loads();

        relation field_store(VarId, FieldId, VarId, MethodId);
        field_store(base, f, from, m) <-- for (base, f, from, m) in facts.stores();

        relation heap_type(HeapId, TypeId);
        heap_type(h, t) <-- for (h, t) in facts.heap_types();

        relation static_invocation(InvokeId, MethodId, MethodId);
        static_invocation(i, callee, inv.method()) <--
          for (i, inv) in facts.invocations(),
          if let InvokeKind::Static { callee } = inv.kind();

        relation special_invocation(InvokeId, VarId, MethodId, MethodId);
        special_invocation(i, base, callee, inv.method()) <--
          for (i, inv) in facts.invocations(),
          if let InvokeKind::Special { base, callee } = inv.kind();

        relation virtual_invocation(InvokeId, VarId, NameId, MethodId);
        virtual_invocation(i, base, name, inv.method()) <--
          for (i, inv) in facts.invocations(),
          if let InvokeKind::Virtual { base, name } = inv.kind();

        relation actual_param(usize, InvokeId, VarId);
        actual_param(k, i, v) <--
          for (i, inv) in facts.invocations(),
          for (k, v) in inv.actuals();

        relation assign_return_value(InvokeId, VarId);
        assign_return_value(i, t) <--
          for (i, inv) in facts.invocations(),
          if let Some(t) = inv.target();

        relation formal_param(usize, MethodId, VarId);
        formal_param(k, m, v) <--
          for m in facts.methods(),
          for (k, v) in facts.method(m).params();

        relation return_var(VarId, MethodId);
        return_var(r, m) <--
          for m in facts.methods(),
          for r in facts.method(m).returns().iter().copied();

        relation this_var(MethodId, VarId);
        this_var(m, this) <--
          for m in facts.methods(),
          if let Some(this) = facts.method(m).this();

        // ----------------------------------------------------------
        // Callgraph
        // ----------------------------------------------------------

        relation call_graph(CallSite, MethodId);

        call_graph(CallSite::Entry, m) <-- for m in std::iter::once(entry);

        relation reachable(MethodId);

        reachable(m.clone()) <-- call_graph(_, m);

        // Edges from real invocations, for the parameter and return rules
        relation invoke_edge(InvokeId, MethodId);

        invoke_edge(i.clone(), c.clone()) <--
          call_graph(site, c),
          if let CallSite::Invoke(i) = site;

        call_graph(CallSite::Invoke(i.clone()), c.clone()) <--
          let span = trace_span!("static_call"),
          let _span = span.enter(),
          //
          static_invocation(i, c, m),
          reachable(m);

        call_graph(CallSite::Invoke(i.clone()), c.clone()) <--
          let span = trace_span!("special_call"),
          let _span = span.enter(),
          //
          special_invocation(i, _, c, m),
          reachable(m);

        var_points_to(this.clone(), h.clone()) <--
          let span = trace_span!("special_call"),
          let _span = span.enter(),
          //
          special_invocation(_, base, c, m),
          reachable(m),
          this_var(c, this),
          var_points_to(base, h);

        // Targets of virtual calls, per receiver object
        relation resolved(InvokeId, HeapId, MethodId);

        resolved(i.clone(), h.clone(), c) <--
          let span = trace_span!("virtual_call"),
          let _span = span.enter(),
          //
          virtual_invocation(i, base, name, m),
          reachable(m),
          var_points_to(base, h),
          heap_type(h, t),
          for c in facts.dispatch().resolve(t.clone(), name.clone()).iter().copied();

        call_graph(CallSite::Invoke(i.clone()), c.clone()) <-- resolved(i, _, c);

        var_points_to(this.clone(), h.clone()) <--
          resolved(_, h, c),
          this_var(c, this);

        // ----------------------------------------------------------
        // Points-to
        // ----------------------------------------------------------

        relation var_points_to(VarId, HeapId);
        relation fld_points_to(HeapId, FieldId, HeapId);

        var_points_to(v.clone(), h.clone()) <--
          let span = trace_span!("alloc"),
          let _span = span.enter(),
          //
          allocation(v, h, m),
          reachable(m);

        var_points_to(to.clone(), h.clone()) <--
          let span = trace_span!("move"),
          let _span = span.enter(),
          //
          assign(from, to, m),
          reachable(m),
          var_points_to(from, h);

        var_points_to(to.clone(), h2.clone()) <--
          let span = trace_span!("load"),
          let _span = span.enter(),
          //
          field_load(to, base, f, m),
          reachable(m),
          var_points_to(base, h1),
          fld_points_to(h1, f, h2);

        fld_points_to(h1.clone(), f.clone(), h2.clone()) <--
          let span = trace_span!("store"),
          let _span = span.enter(),
          //
          field_store(base, f, from, m),
          reachable(m),
          var_points_to(base, h1),
          var_points_to(from, h2);

        var_points_to(formal.clone(), h.clone()) <--
          let span = trace_span!("param"),
          let _span = span.enter(),
          //
          invoke_edge(i, c),
          actual_param(k, i, actual),
          formal_param(k, c, formal),
          var_points_to(actual, h);

        var_points_to(t.clone(), h.clone()) <--
          let span = trace_span!("return"),
          let _span = span.enter(),
          //
          invoke_edge(i, c),
          assign_return_value(i, t),
          return_var(r, c),
          var_points_to(r, h);
    };

    if debug {
        eprintln!("{}", outs.summary());
        eprintln!("{}", outs.scc_times_summary());
    }

    let var_points_to: Vec<_> = outs.var_points_to.into_iter().collect();
    let fld_points_to: Vec<_> = outs.fld_points_to.into_iter().collect();
    let call_graph: Vec<_> = outs.call_graph.into_iter().collect();
    let reachable: Vec<_> = outs.reachable.into_iter().map(|tup| tup.0).collect();
    let sizes = Sizes {
        var_points_to: var_points_to.len(),
        fld_points_to: fld_points_to.len(),
        call_graph: call_graph.len(),
        reachable: reachable.len(),
    };
    OutputRelations::new(
        var_points_to,
        fld_points_to,
        call_graph,
        reachable,
        Statistics {
            strategy: Strategy::Datalog,
            iterations: None,
            derived_by_rule: Vec::new(),
            sizes,
        },
    )
}
