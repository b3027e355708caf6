// SPDX-License-Identifier: BSD-3-Clause
//! The output relations
//!
//! Relations only ever grow. Each one is stored as an index from its leading
//! column(s) to a hash set, which is the access pattern of every rule.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::facts::{FieldId, HeapId, InvokeId, MethodId, VarId};

/// The source of a call-graph edge
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize)]
pub enum CallSite {
    /// The synthetic call of the entry method
    Entry,
    Invoke(InvokeId),
}

#[derive(Clone, Debug, Default)]
pub struct Relations {
    var_points_to: FxHashMap<VarId, FxHashSet<HeapId>>,
    var_points_to_len: usize,
    fld_points_to: FxHashMap<(HeapId, FieldId), FxHashSet<HeapId>>,
    fld_points_to_len: usize,
    call_graph: FxHashMap<CallSite, FxHashSet<MethodId>>,
    call_graph_len: usize,
    // Projection of the call-graph targets, maintained on insert
    reachable: FxHashSet<MethodId>,
}

impl Relations {
    // ------------------------------------------------------------------
    // Insertion

    pub fn insert_var_points_to(&mut self, v: VarId, h: HeapId) -> bool {
        let new = self.var_points_to.entry(v).or_default().insert(h);
        self.var_points_to_len += usize::from(new);
        new
    }

    pub fn insert_fld_points_to(&mut self, base: HeapId, f: FieldId, h: HeapId) -> bool {
        let new = self.fld_points_to.entry((base, f)).or_default().insert(h);
        self.fld_points_to_len += usize::from(new);
        new
    }

    pub fn insert_call_edge(&mut self, site: CallSite, m: MethodId) -> bool {
        let new = self.call_graph.entry(site).or_default().insert(m);
        if new {
            self.call_graph_len += 1;
            self.reachable.insert(m);
        }
        new
    }

    /// Union in a batch of derived tuples, returning how many were new.
    pub fn merge(&mut self, derived: Derived) -> usize {
        let mut added = 0;
        for (v, h) in derived.var_points_to {
            added += usize::from(self.insert_var_points_to(v, h));
        }
        for (base, f, h) in derived.fld_points_to {
            added += usize::from(self.insert_fld_points_to(base, f, h));
        }
        for (site, m) in derived.call_graph {
            added += usize::from(self.insert_call_edge(site, m));
        }
        added
    }

    // ------------------------------------------------------------------
    // Queries

    pub fn points_to(&self, v: VarId) -> impl Iterator<Item = HeapId> + '_ {
        self.var_points_to.get(&v).into_iter().flatten().copied()
    }

    pub fn contains_var_points_to(&self, v: VarId, h: HeapId) -> bool {
        self.var_points_to.get(&v).is_some_and(|hs| hs.contains(&h))
    }

    pub fn field_points_to(&self, base: HeapId, f: FieldId) -> impl Iterator<Item = HeapId> + '_ {
        self.fld_points_to
            .get(&(base, f))
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn contains_fld_points_to(&self, base: HeapId, f: FieldId, h: HeapId) -> bool {
        self.fld_points_to
            .get(&(base, f))
            .is_some_and(|hs| hs.contains(&h))
    }

    pub fn callees(&self, site: CallSite) -> impl Iterator<Item = MethodId> + '_ {
        self.call_graph.get(&site).into_iter().flatten().copied()
    }

    pub fn contains_call_edge(&self, site: CallSite, m: MethodId) -> bool {
        self.call_graph.get(&site).is_some_and(|ms| ms.contains(&m))
    }

    #[inline]
    pub fn is_reachable(&self, m: MethodId) -> bool {
        self.reachable.contains(&m)
    }

    pub fn reachable(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.reachable.iter().copied()
    }

    pub fn var_points_to(&self) -> impl Iterator<Item = (VarId, HeapId)> + '_ {
        self.var_points_to
            .iter()
            .flat_map(|(v, hs)| hs.iter().map(move |h| (*v, *h)))
    }

    pub fn fld_points_to(&self) -> impl Iterator<Item = (HeapId, FieldId, HeapId)> + '_ {
        self.fld_points_to
            .iter()
            .flat_map(|((base, f), hs)| hs.iter().map(move |h| (*base, *f, *h)))
    }

    pub fn call_graph(&self) -> impl Iterator<Item = (CallSite, MethodId)> + '_ {
        self.call_graph
            .iter()
            .flat_map(|(site, ms)| ms.iter().map(move |m| (*site, *m)))
    }

    // ------------------------------------------------------------------
    // Sizes

    pub fn var_points_to_len(&self) -> usize {
        self.var_points_to_len
    }

    pub fn fld_points_to_len(&self) -> usize {
        self.fld_points_to_len
    }

    pub fn call_graph_len(&self) -> usize {
        self.call_graph_len
    }

    pub fn reachable_len(&self) -> usize {
        self.reachable.len()
    }

    /// Total cardinality of the three relations. Since nothing is ever
    /// removed, an unchanged total means nothing was added.
    pub fn len(&self) -> usize {
        self.var_points_to_len + self.fld_points_to_len + self.call_graph_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every tuple of `self` is also in `other`
    pub fn is_subset(&self, other: &Relations) -> bool {
        self.var_points_to()
            .all(|(v, h)| other.contains_var_points_to(v, h))
            && self
                .fld_points_to()
                .all(|(b, f, h)| other.contains_fld_points_to(b, f, h))
            && self
                .call_graph()
                .all(|(s, m)| other.contains_call_edge(s, m))
    }
}

/// Tuples proposed by one rule against a snapshot of the relations. Tuples
/// already in the snapshot are dropped on the spot.
#[derive(Debug)]
pub struct Derivations<'a> {
    snapshot: &'a Relations,
    derived: Derived,
}

#[derive(Debug, Default)]
pub struct Derived {
    var_points_to: Vec<(VarId, HeapId)>,
    fld_points_to: Vec<(HeapId, FieldId, HeapId)>,
    call_graph: Vec<(CallSite, MethodId)>,
}

impl Derived {
    pub fn len(&self) -> usize {
        self.var_points_to.len() + self.fld_points_to.len() + self.call_graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> Derivations<'a> {
    pub fn new(snapshot: &'a Relations) -> Self {
        Derivations {
            snapshot,
            derived: Derived::default(),
        }
    }

    #[inline]
    pub fn var_points_to(&mut self, v: VarId, h: HeapId) {
        if !self.snapshot.contains_var_points_to(v, h) {
            self.derived.var_points_to.push((v, h));
        }
    }

    #[inline]
    pub fn fld_points_to(&mut self, base: HeapId, f: FieldId, h: HeapId) {
        if !self.snapshot.contains_fld_points_to(base, f, h) {
            self.derived.fld_points_to.push((base, f, h));
        }
    }

    #[inline]
    pub fn call_edge(&mut self, site: CallSite, m: MethodId) {
        if !self.snapshot.contains_call_edge(site, m) {
            self.derived.call_graph.push((site, m));
        }
    }

    pub fn finish(self) -> Derived {
        self.derived
    }
}

#[cfg(test)]
mod tests {
    use super::{CallSite, Derivations, Relations};
    use crate::facts::{FieldId, Handle, HeapId, InvokeId, MethodId, VarId};

    #[test]
    fn insert_if_absent() {
        let mut rels = Relations::default();
        let v = VarId::from_index(0);
        let h = HeapId::from_index(0);
        assert!(rels.insert_var_points_to(v, h));
        assert!(!rels.insert_var_points_to(v, h));
        assert_eq!(1, rels.len());

        let f = FieldId::from_index(0);
        assert!(rels.insert_fld_points_to(h, f, h));
        assert!(!rels.insert_fld_points_to(h, f, h));
        assert_eq!(2, rels.len());
    }

    #[test]
    fn reachable_is_projection_of_call_graph() {
        let mut rels = Relations::default();
        let main = MethodId::from_index(0);
        let f = MethodId::from_index(1);
        assert!(!rels.is_reachable(main));
        rels.insert_call_edge(CallSite::Entry, main);
        rels.insert_call_edge(CallSite::Invoke(InvokeId::from_index(0)), f);
        rels.insert_call_edge(CallSite::Invoke(InvokeId::from_index(1)), f);
        assert!(rels.is_reachable(main));
        assert!(rels.is_reachable(f));
        assert_eq!(2, rels.reachable_len());
        assert_eq!(3, rels.call_graph_len());
    }

    #[test]
    fn derivations_skip_known_tuples() {
        let mut rels = Relations::default();
        let v = VarId::from_index(0);
        let h1 = HeapId::from_index(0);
        let h2 = HeapId::from_index(1);
        rels.insert_var_points_to(v, h1);

        let mut d = Derivations::new(&rels);
        d.var_points_to(v, h1);
        d.var_points_to(v, h2);
        d.var_points_to(v, h2);
        let derived = d.finish();
        assert_eq!(2, derived.len());

        let before = rels.clone();
        assert_eq!(1, rels.merge(derived));
        assert!(before.is_subset(&rels));
        assert!(!rels.is_subset(&before));
        assert_eq!(vec![h1, h2], {
            let mut hs: Vec<_> = rels.points_to(v).collect();
            hs.sort();
            hs
        });
    }
}
