// SPDX-License-Identifier: BSD-3-Clause
//! The output relations with every handle resolved back to its name
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::{
    analysis::{
        pointer::{OutputRelations, Statistics},
        relations::CallSite,
    },
    facts::FactStore,
};

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct VarPointsTo {
    pub method: String,
    pub variable: String,
    pub heap: String,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FldPointsTo {
    pub base: String,
    pub field: String,
    pub heap: String,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CallEdge {
    /// `None` for the edge to the entry method
    pub invocation: Option<String>,
    pub method: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Report {
    pub reachable: Vec<String>,
    pub var_points_to: Vec<VarPointsTo>,
    pub fld_points_to: Vec<FldPointsTo>,
    pub call_graph: Vec<CallEdge>,
    pub summary: Statistics,
}

impl Report {
    pub fn new(facts: &FactStore, outs: &OutputRelations) -> Self {
        let mut reachable: Vec<String> = outs
            .reachable
            .iter()
            .map(|m| facts.method_name(*m).to_string())
            .collect();
        reachable.sort();

        let mut var_points_to: Vec<VarPointsTo> = outs
            .var_points_to
            .iter()
            .map(|(v, h)| VarPointsTo {
                method: facts.method_name(facts.var_method(*v)).to_string(),
                variable: facts.var_name(*v).to_string(),
                heap: facts.heap_name(*h).to_string(),
            })
            .collect();
        var_points_to.sort();

        let mut fld_points_to: Vec<FldPointsTo> = outs
            .fld_points_to
            .iter()
            .map(|(base, f, h)| FldPointsTo {
                base: facts.heap_name(*base).to_string(),
                field: facts.field_name(*f).to_string(),
                heap: facts.heap_name(*h).to_string(),
            })
            .collect();
        fld_points_to.sort();

        let mut call_graph: Vec<CallEdge> = outs
            .call_graph
            .iter()
            .map(|(site, m)| CallEdge {
                invocation: match site {
                    CallSite::Entry => None,
                    CallSite::Invoke(i) => Some(facts.invoke_name(*i).to_string()),
                },
                method: facts.method_name(*m).to_string(),
            })
            .collect();
        call_graph.sort();

        Report {
            reachable,
            var_points_to,
            fld_points_to,
            call_graph,
            summary: outs.statistics.clone(),
        }
    }

    /// Number of variables with a non-empty points-to set, per method
    pub fn variables_by_method(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        let mut last = None;
        // Rows are sorted, so each (method, variable) pair is contiguous
        for row in &self.var_points_to {
            let key = (row.method.as_str(), row.variable.as_str());
            if last != Some(key) {
                *counts.entry(key.0).or_default() += 1;
                last = Some(key);
            }
        }
        counts
    }

    /// Write `VarPointsTo.facts`, `FieldPointsTo.facts` and
    /// `CallGraph.facts` into `dir`, in the tab-separated format the fact
    /// reader accepts.
    pub fn write_facts(&self, dir: &Path) -> csv::Result<()> {
        fs::create_dir_all(dir)?;

        let mut w = facts_writer(
            &dir.join(VAR_POINTS_TO),
            "Variable\\tHeapAllocation\\tMethod",
            self.var_points_to.len(),
        )?;
        for row in &self.var_points_to {
            w.serialize((&row.variable, &row.heap, &row.method))?;
        }
        w.flush()?;

        let mut w = facts_writer(
            &dir.join(FIELD_POINTS_TO),
            "BaseHeap\\tField\\tTargetHeap",
            self.fld_points_to.len(),
        )?;
        for row in &self.fld_points_to {
            w.serialize((&row.base, &row.field, &row.heap))?;
        }
        w.flush()?;

        let mut w = facts_writer(
            &dir.join(CALL_GRAPH),
            "Invocation\\tMethod",
            self.call_graph.len(),
        )?;
        for edge in &self.call_graph {
            let site = edge.invocation.as_deref().unwrap_or(ENTRY_SITE);
            w.serialize((site, &edge.method))?;
        }
        w.flush()?;

        tracing::info!("Wrote result facts to {}", dir.display());
        Ok(())
    }

    pub fn write_json(&self, w: impl Write) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(w, self)
    }

    pub fn write_text(&self, mut w: impl Write, stats: bool) -> io::Result<()> {
        section(&mut w, "reachable")?;
        for m in &self.reachable {
            writeln!(w, "{m}")?;
        }
        writeln!(w)?;
        section(&mut w, "var_points_to")?;
        for row in &self.var_points_to {
            // Extracted variable names are usually already qualified
            if row
                .variable
                .strip_prefix(row.method.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
            {
                writeln!(w, "{} --> {}", row.variable, row.heap)?;
            } else {
                writeln!(w, "{}/{} --> {}", row.method, row.variable, row.heap)?;
            }
        }
        writeln!(w)?;
        section(&mut w, "fld_points_to")?;
        for row in &self.fld_points_to {
            writeln!(w, "{}.{} --> {}", row.base, row.field, row.heap)?;
        }
        writeln!(w)?;
        section(&mut w, "call_graph")?;
        for edge in &self.call_graph {
            let site = edge.invocation.as_deref().unwrap_or(ENTRY_SITE);
            writeln!(w, "{site} --> {}", edge.method)?;
        }

        if stats {
            writeln!(w)?;
            self.write_stats(&mut w)?;
        }
        Ok(())
    }

    pub fn write_stats(&self, mut w: impl Write) -> io::Result<()> {
        let s = &self.summary;
        section(&mut w, "statistics")?;
        writeln!(w, "strategy: {}", s.strategy)?;
        if let Some(n) = s.iterations {
            writeln!(w, "iterations: {n}")?;
        }
        writeln!(w, "reachable methods: {}", s.sizes.reachable)?;
        writeln!(w, "var_points_to: {}", s.sizes.var_points_to)?;
        writeln!(w, "fld_points_to: {}", s.sizes.fld_points_to)?;
        writeln!(w, "call_graph: {}", s.sizes.call_graph)?;
        for (rule, n) in &s.derived_by_rule {
            writeln!(w, "derived by {rule}: {n}")?;
        }
        let by_method = self.variables_by_method();
        if !by_method.is_empty() {
            writeln!(w, "methods with variables: {}", by_method.len())?;
            for (method, n) in by_method {
                writeln!(w, "  {method}: {n} variables")?;
            }
        }
        Ok(())
    }
}

const VAR_POINTS_TO: &str = "VarPointsTo.facts";
const FIELD_POINTS_TO: &str = "FieldPointsTo.facts";
const CALL_GRAPH: &str = "CallGraph.facts";

/// Invocation column of the synthetic edge to the entry method
const ENTRY_SITE: &str = "<entry>";

fn section(w: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(w, "{title}")?;
    writeln!(w, "{}", "-".repeat(title.len()))
}

/// A tab-separated writer whose file opens with a format and count comment.
fn facts_writer(path: &Path, format: &str, rows: usize) -> csv::Result<csv::Writer<File>> {
    let mut file = File::create(path)?;
    writeln!(file, "# Format: {format}")?;
    writeln!(file, "# Total: {rows}")?;
    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(file))
}
