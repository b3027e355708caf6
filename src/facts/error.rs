// SPDX-License-Identifier: BSD-3-Clause
use std::path::PathBuf;

use super::Fact;

#[derive(Debug, thiserror::Error)]
pub enum FactError {
    #[error("Malformed fact {fact}: {reason}")]
    Malformed { fact: Box<Fact>, reason: String },

    #[error("{}:{line}: expected {expected} columns, found {found}", .path.display())]
    Arity {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("{}:{line}: {source}", .path.display())]
    Row {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("Couldn't read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Too many {0}s to intern")]
    TooMany(&'static str),
}

impl FactError {
    pub(crate) fn malformed(fact: Fact, reason: impl Into<String>) -> Self {
        FactError::Malformed {
            fact: Box::new(fact),
            reason: reason.into(),
        }
    }
}
