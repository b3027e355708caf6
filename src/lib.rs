// SPDX-License-Identifier: BSD-3-Clause
//! Andersen-style points-to and call-graph analysis
//!
//! [`facts`] loads and validates the input relations, [`analysis`] computes
//! their fixed point and [`report`] names the result.
pub mod analysis;
pub mod facts;
pub mod layers;
pub mod report;

pub use analysis::pointer::{analysis, AnalysisError, Options, OutputRelations, Strategy};
pub use facts::{FactError, FactStore, Facts};
