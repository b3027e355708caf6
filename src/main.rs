// SPDX-License-Identifier: BSD-3-Clause
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use tracing_flame::FlameLayer;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

use andersen::{
    analysis::pointer,
    facts::{reader, FactStore, Facts},
    layers::RuleTimes,
    report::Report,
};

mod cli;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn setup_global_subscriber(args: &cli::Args, times: &RuleTimes) -> Result<Option<impl Drop>> {
    let fmt_layer = fmt::Layer::default()
        .with_writer(io::stderr)
        .with_filter(level(args.verbose));
    if !args.tracing {
        tracing_subscriber::registry().with(fmt_layer).init();
        return Ok(None);
    }
    let (flame_layer, guard) = FlameLayer::with_file("./tracing.folded")
        .context("Couldn't create ./tracing.folded")?;
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(flame_layer)
        .with(times.layer())
        .init();
    Ok(Some(guard))
}

fn load(path: &Path) -> Result<Facts> {
    if path.is_dir() {
        return reader::read_dir(path)
            .with_context(|| format!("Couldn't read facts from {}", path.display()));
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Couldn't read {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Couldn't deserialize facts in {}", path.display()))
}

fn main() -> Result<()> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = cli::Args::parse();

    let times = RuleTimes::default();
    let _guard = setup_global_subscriber(&args, &times)?;

    let facts = load(&args.facts)?;
    let store = FactStore::new(&facts).context("Malformed facts")?;
    drop(facts);

    let opts = pointer::Options {
        entry: args.entry.clone(),
        max_iterations: args.max_iterations,
        strategy: args.strategy,
        debug: args.debug,
    };
    let outs = pointer::analysis(&store, &opts).context("Analysis failed")?;
    let report = Report::new(&store, &outs);

    let mut stdout = io::stdout().lock();
    if !args.quiet {
        match args.format {
            cli::Format::Text => report.write_text(&mut stdout, args.stats)?,
            cli::Format::Json => {
                report.write_json(&mut stdout)?;
                writeln!(stdout)?;
            }
            cli::Format::Facts => {
                report.write_facts(&args.output).with_context(|| {
                    format!("Couldn't write facts to {}", args.output.display())
                })?;
                if args.stats {
                    report.write_stats(&mut stdout)?;
                }
            }
        }
    } else if args.stats {
        report.write_stats(&mut stdout)?;
    }

    if args.tracing {
        eprintln!("{}", times.summary());
    }

    Ok(())
}
