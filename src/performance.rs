//! Benchmark registry.
//!
//! Advisory observability: timed runs of registered closures with
//! percentile statistics and regression detection against a stored
//! baseline. Registration is explicit (`register(name, func, suite, tags)`),
//! never implicit discovery, and nothing here sits on a business path.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

const REGRESSION_THRESHOLD_PCT: f64 = 20.0;

type BenchFn = Arc<dyn Fn() + Send + Sync>;

/// Statistics from a single benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub iterations: usize,
    pub total_time_ms: f64,
    pub mean_time_ms: f64,
    pub median_time_ms: f64,
    pub p95_time_ms: f64,
    pub p99_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
    pub std_dev_ms: f64,
    pub throughput_per_sec: f64,
    pub started_at: DateTime<Utc>,
}

/// Comparison of a run against the stored baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub benchmark_name: String,
    pub baseline_mean_ms: f64,
    pub current_mean_ms: f64,
    pub mean_change_pct: f64,
    pub regression_detected: bool,
    pub improvement_detected: bool,
}

struct Registered {
    func: BenchFn,
    suite: Option<String>,
    tags: Vec<String>,
}

#[derive(Default)]
struct RegistryInner {
    benchmarks: HashMap<String, Registered>,
    baselines: HashMap<String, BenchmarkResult>,
    results: HashMap<String, Vec<BenchmarkResult>>,
}

/// Explicit-registration benchmark registry
#[derive(Clone, Default)]
pub struct BenchmarkRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl BenchmarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        func: impl Fn() + Send + Sync + 'static,
        suite: Option<&str>,
        tags: &[&str],
    ) {
        let mut inner = self.inner.write();
        inner.benchmarks.insert(
            name.to_string(),
            Registered {
                func: Arc::new(func),
                suite: suite.map(str::to_string),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
        );
        inner.results.entry(name.to_string()).or_default();
        info!(name, suite, "benchmark registered");
    }

    pub fn benchmark_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().benchmarks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn suite_members(&self, suite: &str) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner
            .benchmarks
            .iter()
            .filter(|(_, r)| r.suite.as_deref() == Some(suite))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn tags_for(&self, name: &str) -> Vec<String> {
        self.inner
            .read()
            .benchmarks
            .get(name)
            .map(|r| r.tags.clone())
            .unwrap_or_default()
    }

    /// Run one benchmark: warmup iterations, then timed iterations.
    pub fn run(
        &self,
        name: &str,
        iterations: usize,
        warmup_iterations: usize,
    ) -> Option<BenchmarkResult> {
        let func = self.inner.read().benchmarks.get(name)?.func.clone();
        let started_at = Utc::now();

        for _ in 0..warmup_iterations {
            func();
        }

        let mut samples_ms: Vec<f64> = Vec::with_capacity(iterations);
        let run_start = Instant::now();
        for _ in 0..iterations.max(1) {
            let start = Instant::now();
            func();
            samples_ms.push(start.elapsed().as_secs_f64() * 1000.0);
        }
        let total_time_ms = run_start.elapsed().as_secs_f64() * 1000.0;

        let mut sorted = samples_ms.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let result = BenchmarkResult {
            name: name.to_string(),
            iterations: samples_ms.len(),
            total_time_ms,
            mean_time_ms: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median_time_ms: percentile(&sorted, 0.50),
            p95_time_ms: percentile(&sorted, 0.95),
            p99_time_ms: percentile(&sorted, 0.99),
            min_time_ms: sorted[0],
            max_time_ms: sorted[sorted.len() - 1],
            std_dev_ms: if sorted.len() > 1 {
                sorted.iter().copied().std_dev()
            } else {
                0.0
            },
            throughput_per_sec: samples_ms.len() as f64 / (total_time_ms / 1000.0).max(1e-9),
            started_at,
        };

        self.inner
            .write()
            .results
            .entry(name.to_string())
            .or_default()
            .push(result.clone());

        Some(result)
    }

    /// Promote a run to the baseline for future comparisons.
    pub fn set_baseline(&self, result: BenchmarkResult) {
        self.inner
            .write()
            .baselines
            .insert(result.name.clone(), result);
    }

    pub fn compare_to_baseline(&self, current: &BenchmarkResult) -> Option<BenchmarkComparison> {
        let inner = self.inner.read();
        let baseline = inner.baselines.get(&current.name)?;
        let change_pct = if baseline.mean_time_ms > 0.0 {
            (current.mean_time_ms - baseline.mean_time_ms) / baseline.mean_time_ms * 100.0
        } else {
            0.0
        };
        Some(BenchmarkComparison {
            benchmark_name: current.name.clone(),
            baseline_mean_ms: baseline.mean_time_ms,
            current_mean_ms: current.mean_time_ms,
            mean_change_pct: change_pct,
            regression_detected: change_pct > REGRESSION_THRESHOLD_PCT,
            improvement_detected: change_pct < -REGRESSION_THRESHOLD_PCT,
        })
    }

    pub fn history(&self, name: &str) -> Vec<BenchmarkResult> {
        self.inner
            .read()
            .results
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * q).ceil() as usize).saturating_sub(1);
    sorted[index.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_run() {
        let registry = BenchmarkRegistry::new();
        registry.register(
            "spin",
            || {
                std::hint::black_box((0..100).sum::<u64>());
            },
            Some("micro"),
            &["cpu"],
        );

        let result = registry.run("spin", 50, 5).unwrap();
        assert_eq!(result.iterations, 50);
        assert!(result.mean_time_ms >= 0.0);
        assert!(result.p99_time_ms >= result.median_time_ms);
        assert!(result.throughput_per_sec > 0.0);
        assert_eq!(registry.history("spin").len(), 1);
    }

    #[test]
    fn test_unknown_benchmark_returns_none() {
        assert!(BenchmarkRegistry::new().run("missing", 10, 0).is_none());
    }

    #[test]
    fn test_suite_and_tags() {
        let registry = BenchmarkRegistry::new();
        registry.register("a", || {}, Some("suite1"), &["fast"]);
        registry.register("b", || {}, Some("suite1"), &[]);
        registry.register("c", || {}, None, &[]);

        assert_eq!(registry.suite_members("suite1"), vec!["a", "b"]);
        assert_eq!(registry.tags_for("a"), vec!["fast"]);
        assert_eq!(registry.benchmark_names().len(), 3);
    }

    #[test]
    fn test_baseline_comparison_flags_regression() {
        let registry = BenchmarkRegistry::new();
        registry.register("noop", || {}, None, &[]);
        let baseline = registry.run("noop", 10, 0).unwrap();

        let mut slow = baseline.clone();
        slow.mean_time_ms = baseline.mean_time_ms.max(1e-6) * 2.0;
        registry.set_baseline(baseline);

        let comparison = registry.compare_to_baseline(&slow).unwrap();
        assert!(comparison.regression_detected);
        assert!(!comparison.improvement_detected);
    }
}
