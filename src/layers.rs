// SPDX-License-Identifier: BSD-3-Clause
//! Accumulated time spent in each span, keyed by span name. Every rule runs
//! in a span named after it, so this is a per-rule profile.
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{Id, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Timing {
    /// Times the span was entered
    pub count: u64,
    pub nanos: u128,
}

/// Shared handle to the timings collected by a [`RuleTimesLayer`]
#[derive(Clone, Debug, Default)]
pub struct RuleTimes(Arc<DashMap<&'static str, Timing>>);

impl RuleTimes {
    pub fn layer(&self) -> RuleTimesLayer {
        RuleTimesLayer {
            times: Arc::clone(&self.0),
        }
    }

    pub fn get(&self, name: &str) -> Option<Timing> {
        self.0.get(name).map(|t| *t)
    }

    /// One line per span name, slowest first
    pub fn summary(&self) -> String {
        let mut rows: Vec<(&'static str, Timing)> =
            self.0.iter().map(|e| (*e.key(), *e.value())).collect();
        rows.sort_by(|(n1, t1), (n2, t2)| t2.nanos.cmp(&t1.nanos).then(n1.cmp(n2)));
        let mut out = String::new();
        for (name, t) in rows {
            let _ = writeln!(
                out,
                "{name}: {:.3}ms over {} entries",
                t.nanos as f64 / 1e6,
                t.count
            );
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct RuleTimesLayer {
    times: Arc<DashMap<&'static str, Timing>>,
}

impl<S> Layer<S> for RuleTimesLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(Instant::now());
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(start) = span.extensions_mut().remove::<Instant>() {
                let mut t = self.times.entry(span.name()).or_default();
                t.count += 1;
                t.nanos += start.elapsed().as_nanos();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::prelude::*;

    use super::RuleTimes;

    #[test]
    fn accumulates_per_name() {
        let times = RuleTimes::default();
        let subscriber = tracing_subscriber::registry().with(times.layer());
        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..3 {
                let _span = tracing::trace_span!("move").entered();
            }
            let _span = tracing::trace_span!("load").entered();
        });
        assert_eq!(3, times.get("move").unwrap().count);
        assert_eq!(1, times.get("load").unwrap().count);
        assert!(times.get("store").is_none());
        let summary = times.summary();
        assert!(summary.contains("move: "));
        assert_eq!(2, summary.lines().count());
    }
}
