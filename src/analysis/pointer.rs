// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;

#[cfg(feature = "par")]
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, debug_span, info};

use crate::{
    analysis::{
        datalog,
        relations::{CallSite, Derivations, Derived, Relations},
        rules::{Rule, RULES},
    },
    facts::{FactStore, FieldId, HeapId, MethodId, VarId},
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Re-evaluate every rule against the whole relations until nothing changes
    #[default]
    Naive,
    /// Semi-naive evaluation of the same rules with ascent
    Datalog,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Naive => write!(f, "naive"),
            Strategy::Datalog => write!(f, "datalog"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Fully-qualified signature of the entry method. When absent, the entry
    /// is the first declared method that looks like `main`.
    pub entry: Option<String>,
    /// Number of passes after which the naive strategy gives up. Defaults to
    /// a bound on the size of the relations, which a correct analysis can
    /// never reach.
    pub max_iterations: Option<usize>,
    pub strategy: Strategy,
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Entry method {0} is not declared by any Method fact")]
    MissingEntry(String),
    #[error("No entry method given, and no declared method looks like main")]
    NoEntry,
    #[error("No fixed point after {iterations} iterations")]
    NonConvergence { iterations: usize },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Seeding,
    Iterating,
    Converged,
}

/// Sizes of the final relations
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Sizes {
    pub var_points_to: usize,
    pub fld_points_to: usize,
    pub call_graph: usize,
    pub reachable: usize,
}

impl Sizes {
    fn of(rels: &Relations) -> Self {
        Sizes {
            var_points_to: rels.var_points_to_len(),
            fld_points_to: rels.fld_points_to_len(),
            call_graph: rels.call_graph_len(),
            reachable: rels.reachable_len(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Statistics {
    pub strategy: Strategy,
    /// Passes of the naive driver, including the final one that adds nothing
    pub iterations: Option<usize>,
    /// Tuples added by each rule, summed over all passes. A tuple several
    /// rules derive in the same pass goes to the first in rule order. Only
    /// the naive driver tracks these.
    pub derived_by_rule: Vec<(&'static str, usize)>,
    pub sizes: Sizes,
}

/// The final relations, as sorted tuples of handles.
#[derive(Clone, Debug, Default)]
pub struct OutputRelations {
    pub var_points_to: Vec<(VarId, HeapId)>,
    pub fld_points_to: Vec<(HeapId, FieldId, HeapId)>,
    pub call_graph: Vec<(CallSite, MethodId)>,
    pub reachable: Vec<MethodId>,
    pub statistics: Statistics,
}

impl OutputRelations {
    pub(crate) fn new(
        mut var_points_to: Vec<(VarId, HeapId)>,
        mut fld_points_to: Vec<(HeapId, FieldId, HeapId)>,
        mut call_graph: Vec<(CallSite, MethodId)>,
        mut reachable: Vec<MethodId>,
        statistics: Statistics,
    ) -> Self {
        var_points_to.sort_unstable();
        var_points_to.dedup();
        fld_points_to.sort_unstable();
        fld_points_to.dedup();
        call_graph.sort_unstable();
        call_graph.dedup();
        reachable.sort_unstable();
        reachable.dedup();
        OutputRelations {
            var_points_to,
            fld_points_to,
            call_graph,
            reachable,
            statistics,
        }
    }

    fn from_relations(rels: &Relations, statistics: Statistics) -> Self {
        Self::new(
            rels.var_points_to().collect(),
            rels.fld_points_to().collect(),
            rels.call_graph().collect(),
            rels.reachable().collect(),
            statistics,
        )
    }

    pub fn points_to(&self, v: VarId) -> impl Iterator<Item = HeapId> + '_ {
        let start = self.var_points_to.partition_point(|(w, _)| *w < v);
        self.var_points_to[start..]
            .iter()
            .take_while(move |(w, _)| *w == v)
            .map(|(_, h)| *h)
    }

    pub fn field_points_to(&self, base: HeapId, f: FieldId) -> impl Iterator<Item = HeapId> + '_ {
        let start = self
            .fld_points_to
            .partition_point(|(b, g, _)| (*b, *g) < (base, f));
        self.fld_points_to[start..]
            .iter()
            .take_while(move |(b, g, _)| (*b, *g) == (base, f))
            .map(|(_, _, h)| *h)
    }

    pub fn callees(&self, site: CallSite) -> impl Iterator<Item = MethodId> + '_ {
        let start = self.call_graph.partition_point(|(s, _)| *s < site);
        self.call_graph[start..]
            .iter()
            .take_while(move |(s, _)| *s == site)
            .map(|(_, m)| *m)
    }

    pub fn is_reachable(&self, m: MethodId) -> bool {
        self.reachable.binary_search(&m).is_ok()
    }

    /// Same tuples, ignoring statistics
    pub fn same_relations(&self, other: &OutputRelations) -> bool {
        self.var_points_to == other.var_points_to
            && self.fld_points_to == other.fld_points_to
            && self.call_graph == other.call_graph
            && self.reachable == other.reachable
    }
}

/// Largest number of passes a terminating analysis can need: every pass but
/// the last adds at least one tuple, and the relations are bounded.
pub fn iteration_bound(facts: &FactStore) -> usize {
    let v = facts.num_vars();
    let h = facts.num_heaps();
    let f = facts.num_fields();
    let i = facts.num_invocations();
    let m = facts.num_methods();
    v.saturating_mul(h)
        .saturating_add(h.saturating_mul(f).saturating_mul(h))
        .saturating_add((i + 1).saturating_mul(m))
        .saturating_add(2)
}

/// Resolve the entry method named in the options, or guess one.
pub fn entry(facts: &FactStore, entry: Option<&str>) -> Result<MethodId, AnalysisError> {
    match entry {
        Some(name) => facts
            .method_id(name)
            .filter(|m| facts.method(*m).is_declared())
            .ok_or_else(|| AnalysisError::MissingEntry(name.to_string())),
        None => facts.find_entry().ok_or(AnalysisError::NoEntry),
    }
}

// Profiling machinery
#[inline]
#[allow(unused_variables)]
fn count(rule: &Rule, derived: usize) {
    #[cfg(feature = "count")]
    eprintln!("{} {}", rule.name, derived);
}

fn apply(rule: &Rule, facts: &FactStore, rels: &Relations) -> Derived {
    let mut out = Derivations::new(rels);
    (rule.apply)(facts, rels, &mut out);
    out.finish()
}

#[cfg(not(feature = "par"))]
fn apply_all(facts: &FactStore, rels: &Relations) -> Vec<Derived> {
    RULES.iter().map(|rule| apply(rule, facts, rels)).collect()
}

#[cfg(feature = "par")]
fn apply_all(facts: &FactStore, rels: &Relations) -> Vec<Derived> {
    RULES
        .par_iter()
        .map(|rule| apply(rule, facts, rels))
        .collect()
}

/// Jacobi-style fixed-point driver
///
/// Every pass evaluates all rules against the relations as they stood at
/// the start of the pass, then merges the results. A pass that adds nothing
/// is the fixed point.
#[derive(Debug)]
pub struct Solver<'f> {
    facts: &'f FactStore,
    entry: MethodId,
    rels: Relations,
    phase: Phase,
    iterations: usize,
    derived_by_rule: [usize; RULES.len()],
}

impl<'f> Solver<'f> {
    pub fn new(facts: &'f FactStore, entry: MethodId) -> Self {
        Solver {
            facts,
            entry,
            rels: Relations::default(),
            phase: Phase::Seeding,
            iterations: 0,
            derived_by_rule: [0; RULES.len()],
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn relations(&self) -> &Relations {
        &self.rels
    }

    /// Advance by one pass, returning the number of new tuples.
    ///
    /// Seeding adds the edge to the entry method. Once converged, this
    /// does nothing.
    pub fn step(&mut self) -> usize {
        match self.phase {
            Phase::Seeding => {
                self.rels.insert_call_edge(CallSite::Entry, self.entry);
                self.phase = Phase::Iterating;
                1
            }
            Phase::Iterating => {
                let added = self.pass();
                if added == 0 {
                    self.phase = Phase::Converged;
                }
                added
            }
            Phase::Converged => 0,
        }
    }

    fn pass(&mut self) -> usize {
        self.iterations += 1;
        let _span = debug_span!("pass", n = self.iterations).entered();
        let derived = apply_all(self.facts, &self.rels);
        let mut added = 0;
        for (k, (rule, derived)) in RULES.iter().zip(derived).enumerate() {
            let new = self.rels.merge(derived);
            count(rule, new);
            self.derived_by_rule[k] += new;
            added += new;
        }
        debug!(
            added,
            var_points_to = self.rels.var_points_to_len(),
            fld_points_to = self.rels.fld_points_to_len(),
            call_graph = self.rels.call_graph_len(),
            "Pass {}",
            self.iterations
        );
        added
    }

    /// Run to the fixed point, giving up after `max_iterations` passes.
    pub fn run(&mut self, max_iterations: usize) -> Result<(), AnalysisError> {
        while self.phase != Phase::Converged {
            if self.phase == Phase::Iterating && self.iterations >= max_iterations {
                return Err(AnalysisError::NonConvergence {
                    iterations: self.iterations,
                });
            }
            self.step();
        }
        info!("Fixed point reached after {} iterations", self.iterations);
        Ok(())
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            strategy: Strategy::Naive,
            iterations: Some(self.iterations),
            derived_by_rule: RULES
                .iter()
                .zip(self.derived_by_rule)
                .map(|(rule, n)| (rule.name, n))
                .collect(),
            sizes: Sizes::of(&self.rels),
        }
    }

    pub fn finish(self) -> OutputRelations {
        OutputRelations::from_relations(&self.rels, self.statistics())
    }
}

/// Points-to and call-graph analysis
///
/// Sources of unsoundness:
///
/// - Callees without facts (library code) contribute nothing
/// - Arrays, exceptions, reflection and closures are not modeled
pub fn analysis(facts: &FactStore, opts: &Options) -> Result<OutputRelations, AnalysisError> {
    let entry = entry(facts, opts.entry.as_deref())?;
    let _span = debug_span!("analysis", strategy = %opts.strategy).entered();
    info!("Analyzing from {}", facts.method_name(entry));
    match opts.strategy {
        Strategy::Naive => {
            let mut solver = Solver::new(facts, entry);
            solver.run(
                opts.max_iterations
                    .unwrap_or_else(|| iteration_bound(facts)),
            )?;
            if opts.debug {
                for (rule, n) in solver.statistics().derived_by_rule {
                    eprintln!("{rule}: {n}");
                }
            }
            Ok(solver.finish())
        }
        Strategy::Datalog => Ok(datalog::analysis(facts, entry, opts.debug)),
    }
}
