//! Rankings and text rendering of benchmark results. Zero or missing timings
//! never take part in a comparison.

use std::collections::BTreeSet;
use std::fmt;

use super::BenchmarkResult;

/// One strategy's timing relative to the fastest valid timing.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub strategy: String,
    pub seconds: f64,
    pub relative: f64,
}

fn rank(timings: Vec<(String, f64)>) -> Vec<Ranked> {
    let mut valid: Vec<(String, f64)> = timings.into_iter().filter(|(_, t)| *t > 0.0 && t.is_finite()).collect();
    valid.sort_by(|a, b| a.1.total_cmp(&b.1));
    let Some(min) = valid.first().map(|(_, t)| *t) else { return Vec::new() };
    valid.into_iter().map(|(strategy, seconds)| Ranked { strategy, seconds, relative: seconds / min }).collect()
}

pub fn load_ranking(results: &[BenchmarkResult]) -> Vec<Ranked> {
    rank(results.iter().map(|r| (r.strategy.clone(), r.load_time)).collect())
}

pub fn query_ranking(results: &[BenchmarkResult], query: &str) -> Vec<Ranked> {
    rank(results.iter().filter_map(|r| r.query_times.get(query).map(|t| (r.strategy.clone(), *t))).collect())
}

pub fn fastest_loader(results: &[BenchmarkResult]) -> Option<&BenchmarkResult> {
    let best = load_ranking(results).into_iter().next()?;
    results.iter().find(|r| r.strategy == best.strategy)
}

/// Strategy with the lowest mean query time.
pub fn fastest_querier(results: &[BenchmarkResult]) -> Option<&BenchmarkResult> {
    let best = rank(results.iter().filter_map(|r| r.mean_query_time().map(|t| (r.strategy.clone(), t))).collect()).into_iter().next()?;
    results.iter().find(|r| r.strategy == best.strategy)
}

fn rule(out: &mut String, c: char, n: usize) {
    out.push_str(&c.to_string().repeat(n));
    out.push('\n');
}

fn ranking_table(out: &mut String, rows: &[Ranked]) {
    out.push_str(&format!("{:<20} {:>12} {:>12}\n", "Strategy", "Time (s)", "Relative"));
    rule(out, '-', 46);
    for r in rows {
        out.push_str(&format!("{:<20} {:>12.3} {:>11.2}x\n", r.strategy, r.seconds, r.relative));
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Strategy: {}", self.strategy)?;
        writeln!(f, "{}", "=".repeat(60))?;
        write!(f, "Load Time: {:.3}s", self.load_time)?;
        if !self.row_counts.is_empty() {
            write!(f, "\n\nRow Counts:")?;
            for (table, n) in &self.row_counts { write!(f, "\n  {}: {}", table, n)?; }
        }
        if !self.query_times.is_empty() {
            write!(f, "\n\nQuery Times:")?;
            for (name, t) in &self.query_times { write!(f, "\n  {}: {:.3}s", name, t)?; }
        }
        if self.memory_usage > 0 {
            write!(f, "\n\nMemory Usage: {:.2} MB", self.memory_usage as f64 / 1024.0 / 1024.0)?;
        }
        if !self.errors.is_empty() {
            write!(f, "\n\nErrors:")?;
            for e in &self.errors { write!(f, "\n  - {}", e)?; }
        }
        Ok(())
    }
}

/// Per-strategy blocks followed, for more than one strategy, by the load-time and
/// per-query ranking tables.
pub fn summary(results: &[BenchmarkResult]) -> String {
    let mut out = String::new();
    rule(&mut out, '=', 60);
    out.push_str("BENCHMARK SUMMARY\n");
    for r in results {
        out.push_str(&format!("\n{}\n", r));
    }
    if results.len() < 2 {
        return out;
    }
    out.push('\n');
    rule(&mut out, '=', 60);
    out.push_str("COMPARISON\n");
    out.push_str("\nLoad Times:\n");
    ranking_table(&mut out, &load_ranking(results));
    let names: BTreeSet<&String> = results.iter().flat_map(|r| r.query_times.keys()).collect();
    for name in names {
        out.push_str(&format!("\nQuery: {}\n", name));
        ranking_table(&mut out, &query_ranking(results, name));
    }
    if let Some(r) = fastest_loader(results) {
        out.push_str(&format!("\nFastest loader: {} ({:.3}s)\n", r.strategy, r.load_time));
    }
    if let Some(r) = fastest_querier(results) {
        out.push_str(&format!("Fastest queries: {} (mean {:.3}s)\n", r.strategy, r.mean_query_time().unwrap_or_default()));
    }
    out
}
