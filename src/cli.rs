// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;
use std::path::PathBuf;

use andersen::analysis::pointer::Strategy;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
    /// Tab-separated `.facts` files in `--output`
    Facts,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Text => write!(f, "text"),
            Format::Json => write!(f, "json"),
            Format::Facts => write!(f, "facts"),
        }
    }
}

/// Andersen-style points-to and call-graph analysis over extracted facts
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory of tab-separated .facts files, or a JSON file of facts
    #[arg()]
    pub facts: PathBuf,

    /// Entry method signature (default: the method that looks like main)
    #[arg(short, long)]
    pub entry: Option<String>,

    /// Evaluation strategy
    #[arg(long, default_value_t = Strategy::Naive)]
    pub strategy: Strategy,

    /// Give up after this many passes (naive strategy only)
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Output format
    #[arg(long, default_value_t = Format::Text)]
    pub format: Format,

    /// Directory for `--format facts`
    #[arg(short, long, default_value = "results")]
    pub output: PathBuf,

    /// Debug
    #[arg(long)]
    pub debug: bool,

    /// Quiet
    #[arg(long)]
    pub quiet: bool,

    /// Report statistics
    #[arg(long)]
    pub stats: bool,

    /// Tracing
    #[arg(long)]
    pub tracing: bool,

    /// Log more (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
