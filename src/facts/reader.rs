// SPDX-License-Identifier: BSD-3-Clause
//! Reader for directories of tab-separated `.facts` files

use std::path::Path;

use serde::de::DeserializeOwned;

use super::{FactError, Facts};

pub const ALLOCATION: &str = "HeapAllocation.facts";
pub const ALLOCATION_TYPE: &str = "HeapAllocation-Type.facts";
pub const MOVE: &str = "Move.facts";
pub const LOAD: &str = "Load.facts";
pub const STORE: &str = "Store.facts";
pub const STATIC_INVOCATION: &str = "StaticMethodInvocation.facts";
pub const SPECIAL_INVOCATION: &str = "SpecialMethodInvocation.facts";
pub const VIRTUAL_INVOCATION: &str = "VirtualMethodInvocation.facts";
pub const ACTUAL_PARAM: &str = "ActualParam.facts";
pub const FORMAL_PARAM: &str = "FormalParam.facts";
pub const RETURN_VAR: &str = "ReturnVar.facts";
pub const THIS_VAR: &str = "ThisVar.facts";
pub const ASSIGN_RETURN_VALUE: &str = "AssignReturnValue.facts";
pub const METHOD_META: &str = "Method-Name-Type.facts";
pub const METHOD: &str = "Method.facts";

/// Read every input relation from `dir`.
///
/// A missing file is an empty relation. Rows are tab-separated; blank lines
/// and lines starting with `#` are skipped.
pub fn read_dir(dir: &Path) -> Result<Facts, FactError> {
    let _span = tracing::debug_span!("read_facts", dir = %dir.display()).entered();
    Ok(Facts {
        allocations: relation(dir, ALLOCATION, 3)?,
        allocation_types: relation(dir, ALLOCATION_TYPE, 2)?,
        moves: relation(dir, MOVE, 3)?,
        loads: relation(dir, LOAD, 4)?,
        stores: relation(dir, STORE, 4)?,
        static_invocations: relation(dir, STATIC_INVOCATION, 3)?,
        special_invocations: relation(dir, SPECIAL_INVOCATION, 4)?,
        virtual_invocations: relation(dir, VIRTUAL_INVOCATION, 4)?,
        actual_params: relation(dir, ACTUAL_PARAM, 3)?,
        formal_params: relation(dir, FORMAL_PARAM, 3)?,
        return_vars: relation(dir, RETURN_VAR, 2)?,
        this_vars: relation(dir, THIS_VAR, 2)?,
        assign_return_values: relation(dir, ASSIGN_RETURN_VALUE, 2)?,
        method_metas: relation(dir, METHOD_META, 3)?,
        methods: relation(dir, METHOD, 1)?,
    })
}

fn relation<T: DeserializeOwned>(
    dir: &Path,
    file: &str,
    arity: usize,
) -> Result<Vec<T>, FactError> {
    let path = dir.join(file);
    if !path.is_file() {
        tracing::warn!("{} not found, treating it as empty", path.display());
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .quoting(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .map_err(|source| FactError::Read {
            path: path.clone(),
            source,
        })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| FactError::Read {
            path: path.clone(),
            source,
        })?;
        // Blank, or a comment after leading whitespace
        match record.iter().find(|f| !f.is_empty()) {
            None => continue,
            Some(first) if first.starts_with('#') => continue,
            Some(_) => (),
        }
        let line = record.position().map_or(0, |p| p.line());
        if record.len() != arity {
            return Err(FactError::Arity {
                path,
                line,
                expected: arity,
                found: record.len(),
            });
        }
        let row = record
            .deserialize(None)
            .map_err(|source| FactError::Row {
                path: path.clone(),
                line,
                source,
            })?;
        rows.push(row);
    }
    tracing::trace!(rows = rows.len(), "read {file}");
    Ok(rows)
}
