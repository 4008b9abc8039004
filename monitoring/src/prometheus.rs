//! Prometheus text exposition (text/plain; version=0.0.4).
//!
//! The exporter is a single loop over the snapshot's [`Sample`] list: the
//! `HELP`/`TYPE` preamble and the value lines all derive from the typed
//! [`Observation`], so no metric is ever rendered by hand.

use {
    crate::{Observation, Sample},
    std::fmt::Write,
};

/// Render a snapshot into Prometheus text format.
pub fn encode(samples: &[Sample]) -> String {
    let mut out = String::with_capacity(samples.len() * 96);
    for sample in samples {
        render(&mut out, sample);
    }
    out
}

fn render(out: &mut String, sample: &Sample) {
    let kind = match sample.value {
        Observation::Counter(_) => "counter",
        Observation::Gauge(_) => "gauge",
        Observation::Histogram { .. } => "histogram",
    };
    // Writing into a String cannot fail; the results are discarded.
    let _ = writeln!(out, "# HELP {} {}", sample.name, sample.help);
    let _ = writeln!(out, "# TYPE {} {kind}", sample.name);

    match &sample.value {
        Observation::Counter(total) => {
            let _ = writeln!(out, "{} {total}", sample.name);
        }
        Observation::Gauge(level) => {
            let _ = writeln!(out, "{} {level}", sample.name);
        }
        Observation::Histogram { buckets, sum, count } => {
            for (bound, below) in buckets {
                let _ = writeln!(out, "{}_bucket{{le=\"{bound}\"}} {below}", sample.name);
            }
            let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {count}", sample.name);
            let _ = writeln!(out, "{}_sum {sum}", sample.name);
            let _ = writeln!(out, "{}_count {count}", sample.name);
        }
    }
    out.push('\n');
}
