// To debug or develop a test, try `eprintln!("{:#?}", out.report())`

use std::collections::BTreeSet;
use std::path::Path;

use andersen::{
    analysis::{
        pointer::{self, AnalysisError, Options, OutputRelations, Phase, Solver, Strategy},
        relations::{CallSite, Derivations, Relations},
        rules::RULES,
    },
    facts::{reader, FactError, FactStore, Facts},
    report::Report,
};

// ------------------------------------------------------------------
// Helpers

struct Analyzed {
    store: FactStore,
    out: OutputRelations,
}

impl Analyzed {
    fn report(&self) -> Report {
        Report::new(&self.store, &self.out)
    }

    fn points_to(&self, method: &str, var: &str) -> BTreeSet<&str> {
        let v = self
            .store
            .var_id(method, var)
            .unwrap_or_else(|| panic!("no variable {var} in {method}"));
        self.out
            .points_to(v)
            .map(|h| self.store.heap_name(h))
            .collect()
    }

    fn field_points_to(&self, heap: &str, field: &str) -> BTreeSet<&str> {
        let h = self.store.heap_id(heap).unwrap();
        let f = self.store.field_id(field).unwrap();
        self.out
            .field_points_to(h, f)
            .map(|h| self.store.heap_name(h))
            .collect()
    }

    fn callees(&self, invocation: &str) -> BTreeSet<&str> {
        let i = self.store.invoke_id(invocation).unwrap();
        self.out
            .callees(CallSite::Invoke(i))
            .map(|m| self.store.method_name(m))
            .collect()
    }

    fn reachable(&self, method: &str) -> bool {
        self.out.is_reachable(self.store.method_id(method).unwrap())
    }
}

fn set<'a>(items: &[&'a str]) -> BTreeSet<&'a str> {
    items.iter().copied().collect()
}

/// Run both strategies, check they agree, and return the naive result.
fn check(facts: &Facts, entry: Option<&str>) -> Analyzed {
    let store = FactStore::new(facts).unwrap();
    let naive = pointer::analysis(
        &store,
        &Options {
            entry: entry.map(str::to_string),
            ..Options::default()
        },
    )
    .unwrap();
    let datalog = pointer::analysis(
        &store,
        &Options {
            entry: entry.map(str::to_string),
            strategy: Strategy::Datalog,
            ..Options::default()
        },
    )
    .unwrap();
    assert!(
        naive.same_relations(&datalog),
        "strategies disagree:\n{naive:#?}\n{datalog:#?}"
    );
    Analyzed { store, out: naive }
}

fn benchmark(program: &str) -> Analyzed {
    let facts = reader::read_dir(&Path::new("tests/facts").join(program)).unwrap();
    check(&facts, None)
}

/// Every intermediate state of the naive driver, from seeding to the fixed
/// point.
fn passes(store: &FactStore, entry: &str) -> Vec<Relations> {
    let mut solver = Solver::new(store, store.method_id(entry).unwrap());
    let mut states = vec![solver.relations().clone()];
    while solver.phase() != Phase::Converged {
        solver.step();
        states.push(solver.relations().clone());
    }
    states
}

// ------------------------------------------------------------------
// Benchmarks

const MOVE: &str = "<Move: void main(java.lang.String[])>";
const LOAD: &str = "<Load: void main(java.lang.String[])>";
const SPECIAL: &str = "<SpecialCall: void main(java.lang.String[])>";
const VIRTUAL: &str = "<VirtualCall: void main(java.lang.String[])>";
const OBJECT_INIT: &str = "<java.lang.Object: void <init>()>";

#[test]
fn move_benchmark() {
    let a = benchmark("move");
    let h1 = "<Move: void main(java.lang.String[])>/HeapAlloc_1_A";
    let h2 = "<Move: void main(java.lang.String[])>/HeapAlloc_2_B";
    let v = |name: &str| a.points_to(MOVE, &format!("{MOVE}/{name}"));
    assert_eq!(set(&[h1]), v("$r1"));
    assert_eq!(set(&[h2]), v("$r2"));
    // Both branches are visible
    assert_eq!(set(&[h1, h2]), v("r4"));
    assert_eq!(set(&[h1, h2]), v("r5"));

    assert_eq!(
        set(&[h1]),
        a.points_to("<A: void <init>()>", "<A: void <init>()>/r0")
    );
    assert!(a.reachable(OBJECT_INIT));
    assert_eq!(4, a.out.reachable.len());
    assert_eq!(5, a.out.call_graph.len());
    assert!(a.out.fld_points_to.is_empty());
    assert_eq!(10, a.out.var_points_to.len());
}

#[test]
fn load_benchmark() {
    let a = benchmark("load");
    let h1 = "<Load: void main(java.lang.String[])>/HeapAlloc_1_A";
    let h2 = "<Load: void main(java.lang.String[])>/HeapAlloc_2_B";
    assert_eq!(set(&[h2]), a.field_points_to(h1, "<A: java.lang.Object fld>"));
    assert_eq!(set(&[h1]), a.field_points_to(h2, "<B: java.lang.Object fld>"));
    assert!(a.field_points_to(h1, "<B: java.lang.Object fld>").is_empty());
    assert_eq!(2, a.out.fld_points_to.len());

    let o1 = a.points_to(LOAD, &format!("{LOAD}/$r3"));
    let o2 = a.points_to(LOAD, &format!("{LOAD}/$r4"));
    assert_eq!(set(&[h2]), o1);
    assert_eq!(set(&[h1]), o2);
    assert!(o1.is_disjoint(&o2));
}

#[test]
fn special_call_benchmark() {
    let a = benchmark("special_call");
    let c = "<SpecialCall: void main(java.lang.String[])>/HeapAlloc_1_C";
    let ha = "<SpecialCall: void main(java.lang.String[])>/HeapAlloc_2_A";
    let hb = "<SpecialCall: void main(java.lang.String[])>/HeapAlloc_3_B";
    let a_init = "<A: void <init>(java.lang.Object)>";
    assert_eq!(
        set(&[a_init]),
        a.callees(&format!("{SPECIAL}/SpecialInvocation_2"))
    );
    assert_eq!(set(&[ha]), a.points_to(a_init, &format!("{a_init}/r0")));
    assert_eq!(set(&[c]), a.points_to(a_init, &format!("{a_init}/r1")));
    // a.fld == b.fld
    assert_eq!(set(&[c]), a.field_points_to(ha, "<A: java.lang.Object fld>"));
    assert_eq!(set(&[c]), a.field_points_to(hb, "<B: java.lang.Object fld>"));

    // Declared but never called
    let id = "<SpecialCall: java.lang.Object id(java.lang.Object)>";
    assert!(!a.reachable(id));
    assert!(a.points_to(id, &format!("{id}/r0")).is_empty());
}

#[test]
fn virtual_call_benchmark() {
    let a = benchmark("virtual_call");
    let ha = "<VirtualCall: void main(java.lang.String[])>/HeapAlloc_1_A";
    let hb = "<VirtualCall: void main(java.lang.String[])>/HeapAlloc_2_B";
    let hc = "<VirtualCall: void main(java.lang.String[])>/HeapAlloc_3_C";
    let id = "<C: java.lang.Object id(java.lang.Object)>";
    assert_eq!(set(&[id]), a.callees(&format!("{VIRTUAL}/VirtualInvocation_4")));
    assert_eq!(set(&[id]), a.callees(&format!("{VIRTUAL}/VirtualInvocation_5")));
    assert_eq!(set(&[hc]), a.points_to(id, &format!("{id}/r0")));
    assert_eq!(set(&[ha, hb]), a.points_to(id, &format!("{id}/r1")));
    // Context insensitivity merges the two calls
    assert_eq!(set(&[ha, hb]), a.points_to(VIRTUAL, &format!("{VIRTUAL}/$r4")));
    assert_eq!(set(&[ha, hb]), a.points_to(VIRTUAL, &format!("{VIRTUAL}/$r5")));
}

#[test]
fn benchmarks_match_json_facts() {
    let facts = reader::read_dir(Path::new("tests/facts/virtual_call")).unwrap();
    let json = serde_json::to_string(&facts).unwrap();
    let parsed: Facts = serde_json::from_str(&json).unwrap();
    assert_eq!(facts, parsed);
}

// ------------------------------------------------------------------
// Small programs

const MAIN: &str = "main";

#[test]
fn branches_merge() {
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .allocation("objA", "h1", MAIN)
        .allocation("objB", "h2", MAIN)
        // then
        .assign("objB", "v1", MAIN)
        .assign("objA", "v2", MAIN)
        // else
        .assign("objA", "v1", MAIN)
        .assign("objB", "v2", MAIN);
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&["h1", "h2"]), a.points_to(MAIN, "v1"));
    assert_eq!(set(&["h1", "h2"]), a.points_to(MAIN, "v2"));
    assert_eq!(set(&["h1"]), a.points_to(MAIN, "objA"));
}

#[test]
fn fields_carry_objects() {
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .allocation("a", "h1", MAIN)
        .allocation_type("h1", "A")
        .allocation("b", "h2", MAIN)
        .allocation_type("h2", "B")
        .store("a", "fld", "b", MAIN)
        .store("b", "fld", "a", MAIN)
        .load("o1", "a", "fld", MAIN)
        .load("o2", "b", "fld", MAIN);
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&["h2"]), a.field_points_to("h1", "fld"));
    assert_eq!(set(&["h1"]), a.field_points_to("h2", "fld"));
    assert_eq!(set(&["h2"]), a.points_to(MAIN, "o1"));
    assert_eq!(set(&["h1"]), a.points_to(MAIN, "o2"));
}

const ID: &str = "<C: java.lang.Object id(java.lang.Object)>";

fn dispatch_program() -> Facts {
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .method(ID)
        .method_meta(ID, "id", "C")
        .allocation("c", "hc", MAIN)
        .allocation_type("hc", "C")
        .allocation("a", "ha", MAIN)
        .allocation("b", "hb", MAIN)
        .virtual_call("i1", "c", "id", MAIN)
        .actual_param(0, "i1", "a")
        .assign_return("i1", "r1")
        .virtual_call("i2", "c", "id", MAIN)
        .actual_param(0, "i2", "b")
        .assign_return("i2", "r2")
        .this_var(ID, "this")
        .formal_param(0, ID, "v")
        .return_var("v", ID);
    facts
}

#[test]
fn virtual_dispatch() {
    let a = check(&dispatch_program(), Some(MAIN));
    assert_eq!(set(&[ID]), a.callees("i1"));
    assert_eq!(set(&[ID]), a.callees("i2"));
    assert_eq!(set(&["ha", "hb"]), a.points_to(ID, "v"));
    assert_eq!(set(&["hc"]), a.points_to(ID, "this"));
    assert_eq!(set(&["ha", "hb"]), a.points_to(MAIN, "r1"));
    assert_eq!(set(&["ha", "hb"]), a.points_to(MAIN, "r2"));
}

#[test]
fn unreachable_body_ignored() {
    let dead = "<Dead: void f()>";
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .method(dead)
        .allocation("x", "h1", MAIN)
        .allocation("y", "h2", dead)
        .assign("y", "z", dead)
        .store("y", "fld", "y", dead)
        .static_call("i1", MAIN, dead);
    let a = check(&facts, Some(MAIN));
    assert!(!a.reachable(dead));
    assert!(a.points_to(dead, "y").is_empty());
    assert!(a.points_to(dead, "z").is_empty());
    assert!(a.out.fld_points_to.is_empty());
    assert!(a.callees("i1").is_empty());
    assert_eq!(1, a.out.var_points_to.len());
}

// ------------------------------------------------------------------
// Properties

#[test]
fn monotone() {
    let store = FactStore::new(&dispatch_program()).unwrap();
    let states = passes(&store, MAIN);
    for pair in states.windows(2) {
        assert!(pair[0].is_subset(&pair[1]));
        assert!(pair[0].len() <= pair[1].len());
    }
    // The last pass adds nothing
    let n = states.len();
    assert_eq!(states[n - 2].len(), states[n - 1].len());
}

#[test]
fn idempotent_at_fixed_point() {
    let store = FactStore::new(&dispatch_program()).unwrap();
    let mut solver = Solver::new(&store, store.method_id(MAIN).unwrap());
    solver.run(100).unwrap();
    let rels = solver.relations();
    for rule in RULES {
        let mut out = Derivations::new(rels);
        (rule.apply)(&store, rels, &mut out);
        assert!(out.finish().is_empty(), "{} derived more", rule.name);
    }
    assert_eq!(0, solver.step());
}

#[test]
fn gated_by_reachability() {
    let store = FactStore::new(&dispatch_program()).unwrap();
    for rels in passes(&store, MAIN) {
        for (v, h) in rels.var_points_to() {
            assert!(rels.is_reachable(store.var_method(v)));
            assert!(rels.is_reachable(store.heap_method(h)));
        }
        for (base, _, h) in rels.fld_points_to() {
            assert!(rels.is_reachable(store.heap_method(base)));
            assert!(rels.is_reachable(store.heap_method(h)));
        }
        for (site, _) in rels.call_graph() {
            if let CallSite::Invoke(i) = site {
                assert!(rels.is_reachable(store.invocation_info(i).method()));
            }
        }
    }
}

#[test]
fn sites_stay_distinct() {
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .allocation("x", "h1", MAIN)
        .allocation("y", "h2", MAIN)
        .allocation_type("h1", "A")
        .allocation_type("h2", "A");
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&["h1"]), a.points_to(MAIN, "x"));
    assert_eq!(set(&["h2"]), a.points_to(MAIN, "y"));
}

// ------------------------------------------------------------------
// Calls

#[test]
fn polymorphic_site() {
    let c_run = "<C: void run()>";
    let d_run = "<D: void run()>";
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .method(c_run)
        .method(d_run)
        .method_meta(c_run, "run", "C")
        .method_meta(d_run, "run", "D")
        .this_var(c_run, "this")
        .this_var(d_run, "this")
        .allocation("x", "hc", MAIN)
        .allocation_type("hc", "C")
        .allocation("x", "hd", MAIN)
        .allocation_type("hd", "D")
        .virtual_call("i1", "x", "run", MAIN);
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&[c_run, d_run]), a.callees("i1"));
    // Each target only sees objects of its own type
    assert_eq!(set(&["hc"]), a.points_to(c_run, "this"));
    assert_eq!(set(&["hd"]), a.points_to(d_run, "this"));
}

#[test]
fn overloads_all_resolve() {
    let obj = "<C: void put(java.lang.Object)>";
    let string = "<C: void put(java.lang.String)>";
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .method(obj)
        .method(string)
        .method_meta(obj, "put", "C")
        .method_meta(string, "put", "C")
        .allocation("c", "hc", MAIN)
        .allocation_type("hc", "C")
        .virtual_call("i1", "c", "put", MAIN);
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&[obj, string]), a.callees("i1"));
}

#[test]
fn unresolved_dispatch_is_silent() {
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .allocation("x", "h", MAIN)
        .allocation_type("h", "Unknown")
        .virtual_call("i1", "x", "run", MAIN)
        .assign_return("i1", "r");
    let a = check(&facts, Some(MAIN));
    assert!(a.callees("i1").is_empty());
    assert!(a.points_to(MAIN, "r").is_empty());
    assert_eq!(1, a.out.reachable.len());
}

#[test]
fn recursion_converges() {
    let f = "<R: java.lang.Object f(java.lang.Object)>";
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .method(f)
        .allocation("a", "h", MAIN)
        .static_call("i1", f, MAIN)
        .actual_param(0, "i1", "a")
        .assign_return("i1", "r")
        .formal_param(0, f, "p")
        .allocation("q", "hf", f)
        .static_call("i2", f, f)
        .actual_param(0, "i2", "q")
        .assign_return("i2", "ret")
        .assign("p", "ret", f)
        .return_var("ret", f);
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&[f]), a.callees("i2"));
    assert_eq!(set(&["h", "hf"]), a.points_to(f, "p"));
    assert_eq!(set(&["h", "hf"]), a.points_to(f, "ret"));
    assert_eq!(set(&["h", "hf"]), a.points_to(MAIN, "r"));
}

#[test]
fn library_callee_still_gets_an_edge() {
    let lib = "<java.io.PrintStream: void println(java.lang.Object)>";
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .allocation("x", "h", MAIN)
        .static_call("i1", lib, MAIN)
        .actual_param(0, "i1", "x");
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&[lib]), a.callees("i1"));
    assert!(a.reachable(lib));
}

#[test]
fn special_call_on_empty_base_gets_an_edge() {
    let init = "<A: void <init>()>";
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .method(init)
        .this_var(init, "this")
        .special_call("i1", "nowhere", init, MAIN);
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&[init]), a.callees("i1"));
    assert!(a.reachable(init));
    assert!(a.points_to(MAIN, "nowhere").is_empty());
    assert!(a.points_to(init, "this").is_empty());
    assert_eq!(2, a.out.call_graph.len());
}

#[test]
fn special_call_without_this_gets_an_edge() {
    let init = "<A: void <init>()>";
    let mut facts = Facts::default();
    facts
        .method(MAIN)
        .method(init)
        .allocation("x", "h", MAIN)
        .special_call("i1", "x", init, MAIN);
    let a = check(&facts, Some(MAIN));
    assert_eq!(set(&[init]), a.callees("i1"));
    assert!(a.reachable(init));
    // Only x points anywhere; nothing is bound in the callee
    let report = a.report();
    assert_eq!(1, report.var_points_to.len());
    assert!(report.var_points_to.iter().all(|row| row.method == MAIN));
}

// ------------------------------------------------------------------
// Errors

#[test]
fn malformed_facts_name_the_tuple() {
    let mut facts = Facts::default();
    facts.method(MAIN).formal_param(0, "<Missing: void f()>", "p");
    match FactStore::new(&facts) {
        Err(err @ FactError::Malformed { .. }) => {
            assert!(err.to_string().contains("FormalParam"));
            assert!(err.to_string().contains("<Missing: void f()>"));
        }
        other => panic!("expected malformed fact, got {other:?}"),
    }
}

#[test]
fn missing_entry() {
    let mut facts = Facts::default();
    facts.method(MAIN);
    let store = FactStore::new(&facts).unwrap();
    for strategy in [Strategy::Naive, Strategy::Datalog] {
        let opts = Options {
            entry: Some("absent".to_string()),
            strategy,
            ..Options::default()
        };
        assert!(matches!(
            pointer::analysis(&store, &opts),
            Err(AnalysisError::MissingEntry(name)) if name == "absent"
        ));
    }
}

#[test]
fn iteration_cap() {
    let store = FactStore::new(&dispatch_program()).unwrap();
    let opts = Options {
        entry: Some(MAIN.to_string()),
        max_iterations: Some(1),
        ..Options::default()
    };
    assert!(matches!(
        pointer::analysis(&store, &opts),
        Err(AnalysisError::NonConvergence { iterations: 1 })
    ));
}
