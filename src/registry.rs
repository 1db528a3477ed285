//! Application-wide service registry.
//!
//! All services are constructed once at startup and passed by reference
//! (cloned handles over shared state). No lazy globals: initialization is
//! an explicit method called from `main`, and tests build their own
//! registry against an in-memory database.

use crate::alerts::AlertDispatcher;
use crate::audit::AuditLog;
use crate::config::Config;
use crate::db::{Database, InternalSignalStore, OrderStore, SignalStore};
use crate::decisions::DecisionEngine;
use crate::engine::RiskEngine;
use crate::ingest::{IngestCounters, IngestService};
use crate::ledger::LedgerStore;
use crate::outcomes::{
    AccuracyCalculator, FlywheelEngine, OutcomeRecorder, OutcomeStore, PriorStore, RoiCalculator,
};
use crate::performance::BenchmarkRegistry;
use crate::pipeline::{IntegrityChecker, PipelineHealthMonitor, Tracer};
use crate::reconcile::Reconciler;
use crate::upstream::UpstreamMonitor;
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Every service the API layer needs, wired once.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub db: Database,
    pub audit: AuditLog,
    pub ledger: LedgerStore,
    pub signals: SignalStore,
    pub internal_signals: InternalSignalStore,
    pub orders: OrderStore,
    pub ingest: IngestService,
    pub counters: Arc<IngestCounters>,
    pub reconciler: Reconciler,
    pub health_monitor: PipelineHealthMonitor,
    pub integrity: IntegrityChecker,
    pub tracer: Tracer,
    pub risk_engine: RiskEngine,
    pub decision_engine: DecisionEngine,
    pub outcome_recorder: OutcomeRecorder,
    pub outcomes: OutcomeStore,
    pub accuracy: AccuracyCalculator,
    pub roi: RoiCalculator,
    pub flywheel: FlywheelEngine,
    pub priors: PriorStore,
    pub upstream: UpstreamMonitor,
    pub benchmarks: BenchmarkRegistry,
    /// None when a recorder is already installed (tests share a process).
    pub prometheus: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl Services {
    /// Build the full service graph over an opened database. `alerts` is
    /// optional so jobs and tests can run without a dispatch worker.
    pub fn init(
        config: Arc<Config>,
        db: Database,
        alerts: Option<AlertDispatcher>,
    ) -> Result<Self> {
        let audit = AuditLog::new(db.clone());
        let ledger = LedgerStore::new(db.clone());
        let signals = SignalStore::new(db.clone());
        let internal_signals = InternalSignalStore::new(db.clone());
        let orders = OrderStore::new(db.clone());
        let outcomes = OutcomeStore::new(db.clone());
        let priors = PriorStore::new(db.clone());

        // Each alert firing point sits behind its own flag.
        let ingest_alerts = config.alert_on_ingest.then(|| alerts.clone()).flatten();
        let decision_alerts = config.alert_on_decision.then(|| alerts.clone()).flatten();

        let ingest = IngestService::new(
            ledger.clone(),
            signals.clone(),
            audit.clone(),
            ingest_alerts,
        );
        let counters = ingest.counters();

        let reconciler = Reconciler::new(
            db.clone(),
            ledger.clone(),
            signals.clone(),
            ingest.clone(),
            audit.clone(),
        );

        let health_monitor = PipelineHealthMonitor::new(signals.clone(), ledger.clone(), &config);
        let integrity = IntegrityChecker::new(ledger.clone(), signals.clone());
        let tracer = Tracer::new(ledger.clone(), signals.clone(), outcomes.clone());

        let risk_engine = RiskEngine::new(
            Arc::clone(&config),
            internal_signals.clone(),
            priors.clone(),
        );
        let decision_engine = DecisionEngine::new(
            Arc::clone(&config),
            risk_engine.clone(),
            internal_signals.clone(),
            orders.clone(),
            audit.clone(),
            decision_alerts,
        );

        let outcome_recorder = OutcomeRecorder::new(outcomes.clone());
        let accuracy = AccuracyCalculator::new(outcomes.clone());
        let roi = RoiCalculator::new(outcomes.clone());
        let flywheel = FlywheelEngine::new(outcomes.clone(), priors.clone(), &config);
        let upstream = UpstreamMonitor::new(&config);
        let benchmarks = BenchmarkRegistry::new();

        let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .ok();

        info!("service registry initialized");

        Ok(Self {
            config,
            db,
            audit,
            ledger,
            signals,
            internal_signals,
            orders,
            ingest,
            counters,
            reconciler,
            health_monitor,
            integrity,
            tracer,
            risk_engine,
            decision_engine,
            outcome_recorder,
            outcomes,
            accuracy,
            roi,
            flywheel,
            priors,
            upstream,
            benchmarks,
            prometheus,
            started_at: Instant::now(),
        })
    }

    /// In-memory registry for tests.
    pub fn init_for_tests() -> Result<Self> {
        Self::init(
            Arc::new(Config::default()),
            Database::open_in_memory()?,
            None,
        )
    }
}
