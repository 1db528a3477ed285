//! Pipeline health monitor.
//!
//! Derives freshness, ingest lag, volume anomalies, gaps, and error rates
//! from the last 24 hours of ledger and primary-store data, and rolls them
//! into one overall status with actionable recommendations.

use crate::config::Config;
use crate::db::SignalStore;
use crate::ledger::LedgerStore;
use crate::models::fmt_ts;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const VOLUME_ANOMALY_FACTOR: f64 = 3.0;
const HIGH_LAG_SECONDS: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStatus {
    Fresh,
    Stale,
    Outdated,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    Normal,
    Spike,
    Drought,
    NoBaseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

/// A silent window between consecutive ingests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalGap {
    pub start: String,
    pub end: String,
    pub duration_minutes: f64,
}

/// Snapshot of pipeline health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub last_signal_at: Option<String>,
    pub freshness_status: FreshnessStatus,
    /// -1 when no signal has ever been ingested.
    pub minutes_since_last: f64,
    pub avg_ingest_lag_seconds: f64,
    pub max_ingest_lag_seconds: f64,
    pub signals_last_hour: i64,
    pub signals_last_24h: i64,
    pub avg_hourly_volume: f64,
    pub volume_status: VolumeStatus,
    pub gaps_detected: Vec<SignalGap>,
    pub error_rate_24h: f64,
    pub total_ingested_24h: i64,
    pub total_errors_24h: i64,
    pub overall_status: OverallStatus,
    pub recommendations: Vec<String>,
}

/// Monitors the upstream → primary-store signal pipeline
#[derive(Clone)]
pub struct PipelineHealthMonitor {
    signals: SignalStore,
    ledger: LedgerStore,
    stale_minutes: i64,
    outdated_minutes: i64,
    gap_threshold_minutes: i64,
}

impl PipelineHealthMonitor {
    pub fn new(signals: SignalStore, ledger: LedgerStore, config: &Config) -> Self {
        Self {
            signals,
            ledger,
            stale_minutes: config.freshness_stale_minutes,
            outdated_minutes: config.freshness_outdated_minutes,
            gap_threshold_minutes: config.gap_threshold_minutes,
        }
    }

    pub fn check_health(&self, tenant_id: &str) -> Result<PipelineHealth> {
        let now = Utc::now();
        let mut recommendations: Vec<String> = Vec::new();

        // Freshness
        let last_at = self.signals.last_ingested_at(tenant_id)?;
        let minutes_since = last_at
            .map(|t| (now - t).num_seconds() as f64 / 60.0)
            .unwrap_or(-1.0);
        let freshness = self.classify_freshness(last_at, minutes_since);

        match freshness {
            FreshnessStatus::NoData => recommendations.push(
                "No signals ever received. Verify the upstream integration is configured."
                    .to_string(),
            ),
            FreshnessStatus::Outdated => recommendations.push(format!(
                "No signals for {minutes_since:.0}m. Check upstream connectivity."
            )),
            FreshnessStatus::Stale => recommendations.push(format!(
                "Last signal was {minutes_since:.0}m ago. Monitor the upstream pipeline."
            )),
            FreshnessStatus::Fresh => {}
        }

        // Ingest lag: ingested_at - emitted_at, only non-negative pairs count.
        let day_ago = now - Duration::hours(24);
        let lags: Vec<f64> = self
            .signals
            .lag_pairs_since(tenant_id, day_ago)?
            .into_iter()
            .map(|(emitted, ingested)| (ingested - emitted).num_milliseconds() as f64 / 1000.0)
            .filter(|lag| *lag >= 0.0)
            .collect();
        let (avg_lag, max_lag) = if lags.is_empty() {
            (0.0, 0.0)
        } else {
            (
                lags.iter().sum::<f64>() / lags.len() as f64,
                lags.iter().cloned().fold(0.0, f64::max),
            )
        };
        if max_lag > HIGH_LAG_SECONDS {
            recommendations.push(format!(
                "High ingest lag detected (max {max_lag:.0}s). Check network or processing bottlenecks."
            ));
        }

        // Volume
        let hour_ago = now - Duration::hours(1);
        let last_hour = self.signals.count_since(tenant_id, hour_ago)?;
        let last_24h = self.signals.count_since(tenant_id, day_ago)?;
        let avg_hourly = last_24h as f64 / 24.0;
        let volume_status = classify_volume(last_hour, avg_hourly);

        match volume_status {
            VolumeStatus::Spike => recommendations.push(format!(
                "Signal volume spike: {last_hour} in last hour (avg {avg_hourly:.0}/h). Investigate source."
            )),
            VolumeStatus::Drought => recommendations
                .push("Signal volume is unusually low. Check data sources.".to_string()),
            _ => {}
        }

        // Gaps: consecutive ingested-at deltas above the threshold.
        let times = self.signals.ingested_times_since(tenant_id, day_ago)?;
        let gaps = detect_gaps(&times, self.gap_threshold_minutes);
        if !gaps.is_empty() {
            recommendations.push(format!(
                "Detected {} signal gap(s) in the last 24h. Run reconciliation to replay missed signals.",
                gaps.len()
            ));
        }

        // Error rate: failed ledger entries vs successful primary inserts.
        let total_errors = self.ledger.failed_count_since(tenant_id, day_ago)?;
        let total = last_24h + total_errors;
        let error_rate = total_errors as f64 / (total.max(1)) as f64;
        if error_rate > 0.05 {
            recommendations.push(format!(
                "Error rate is {:.1}%. Review ingest errors.",
                error_rate * 100.0
            ));
        }

        let overall = overall_status(freshness, error_rate, gaps.len(), volume_status);
        metrics::gauge!("riskcast_pipeline_freshness_minutes", minutes_since.max(0.0));

        Ok(PipelineHealth {
            last_signal_at: last_at.map(fmt_ts),
            freshness_status: freshness,
            minutes_since_last: minutes_since,
            avg_ingest_lag_seconds: avg_lag,
            max_ingest_lag_seconds: max_lag,
            signals_last_hour: last_hour,
            signals_last_24h: last_24h,
            avg_hourly_volume: avg_hourly,
            volume_status,
            gaps_detected: gaps,
            error_rate_24h: error_rate,
            total_ingested_24h: last_24h,
            total_errors_24h: total_errors,
            overall_status: overall,
            recommendations,
        })
    }

    fn classify_freshness(
        &self,
        last_at: Option<DateTime<Utc>>,
        minutes_since: f64,
    ) -> FreshnessStatus {
        if last_at.is_none() {
            FreshnessStatus::NoData
        } else if minutes_since < self.stale_minutes as f64 {
            FreshnessStatus::Fresh
        } else if minutes_since < self.outdated_minutes as f64 {
            FreshnessStatus::Stale
        } else {
            FreshnessStatus::Outdated
        }
    }
}

fn classify_volume(last_hour: i64, avg_hourly: f64) -> VolumeStatus {
    if avg_hourly < 0.5 {
        VolumeStatus::NoBaseline
    } else if (last_hour as f64) > avg_hourly * VOLUME_ANOMALY_FACTOR {
        VolumeStatus::Spike
    } else if avg_hourly > 1.0 && (last_hour as f64) < avg_hourly * 0.1 {
        VolumeStatus::Drought
    } else {
        VolumeStatus::Normal
    }
}

fn detect_gaps(times: &[DateTime<Utc>], threshold_minutes: i64) -> Vec<SignalGap> {
    let mut gaps = Vec::new();
    for pair in times.windows(2) {
        let delta_minutes = (pair[1] - pair[0]).num_seconds() as f64 / 60.0;
        if delta_minutes > threshold_minutes as f64 {
            gaps.push(SignalGap {
                start: fmt_ts(pair[0]),
                end: fmt_ts(pair[1]),
                duration_minutes: delta_minutes,
            });
        }
    }
    gaps
}

fn overall_status(
    freshness: FreshnessStatus,
    error_rate: f64,
    gap_count: usize,
    volume: VolumeStatus,
) -> OverallStatus {
    if matches!(freshness, FreshnessStatus::Outdated | FreshnessStatus::NoData)
        || error_rate > 0.1
    {
        OverallStatus::Critical
    } else if freshness == FreshnessStatus::Stale || error_rate > 0.05 || gap_count > 2 {
        OverallStatus::Degraded
    } else if gap_count > 0 || volume == VolumeStatus::Spike {
        OverallStatus::Warning
    } else {
        OverallStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_detection_threshold() {
        let base = Utc::now() - Duration::hours(10);
        let times = vec![
            base,
            base + Duration::minutes(30),
            base + Duration::minutes(30 + 121), // 121-minute silence
            base + Duration::minutes(30 + 121 + 10),
        ];
        let gaps = detect_gaps(&times, 120);
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0].duration_minutes > 120.0);
    }

    #[test]
    fn test_volume_classification() {
        assert_eq!(classify_volume(0, 0.2), VolumeStatus::NoBaseline);
        assert_eq!(classify_volume(40, 10.0), VolumeStatus::Spike);
        assert_eq!(classify_volume(0, 10.0), VolumeStatus::Drought);
        assert_eq!(classify_volume(9, 10.0), VolumeStatus::Normal);
    }

    #[test]
    fn test_overall_status_ladder() {
        assert_eq!(
            overall_status(FreshnessStatus::NoData, 0.0, 0, VolumeStatus::Normal),
            OverallStatus::Critical
        );
        assert_eq!(
            overall_status(FreshnessStatus::Fresh, 0.2, 0, VolumeStatus::Normal),
            OverallStatus::Critical
        );
        assert_eq!(
            overall_status(FreshnessStatus::Stale, 0.0, 0, VolumeStatus::Normal),
            OverallStatus::Degraded
        );
        assert_eq!(
            overall_status(FreshnessStatus::Fresh, 0.0, 1, VolumeStatus::Normal),
            OverallStatus::Warning
        );
        assert_eq!(
            overall_status(FreshnessStatus::Fresh, 0.0, 0, VolumeStatus::Normal),
            OverallStatus::Healthy
        );
    }

    #[test]
    fn test_no_data_health_snapshot() {
        let db = crate::db::Database::open_in_memory().unwrap();
        let monitor = PipelineHealthMonitor::new(
            SignalStore::new(db.clone()),
            LedgerStore::new(db),
            &Config::default(),
        );
        let health = monitor.check_health("t").unwrap();
        assert_eq!(health.freshness_status, FreshnessStatus::NoData);
        assert_eq!(health.overall_status, OverallStatus::Critical);
        assert_eq!(health.minutes_since_last, -1.0);
        assert!(!health.recommendations.is_empty());
    }
}
