// SME Credibility Score - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod records;        // Normalized records, month keys, boundary validation
pub mod ingest;         // Snapshot loading (JSON / CSV)
pub mod policy;         // Tunable weights and thresholds
pub mod layer;          // Layer scores, flags, metric tables
pub mod ledger;         // Monthly inflow/outflow + statistics
pub mod anomaly;        // Anomaly Detector
pub mod reconciliation; // Cross-Source Reconciler
pub mod evidence;       // Evidence Quality Scorer
pub mod stability;      // Stability & Growth Scorer
pub mod compliance;     // Compliance Readiness Scorer
pub mod tier;           // Trust Tier Classifier
pub mod composer;       // Credibility Score Composer
pub mod config;         // Process configuration
pub mod telemetry;      // tracing subscriber

#[cfg(feature = "server")]
pub mod api;            // axum router

// Re-export commonly used types
pub use records::{
    Attestation, AttestationKind, BalanceSheetRecord, Direction, InvoiceRecord, Minor,
    MonthKey, NormalizedRecord, ProfitLossRecord, Provenance, ReceiptRecord, RecordError,
    RecordMeta, SourceType, TransactionRecord,
    format_amount, snapshot_digest, validate_records,
};
pub use ingest::{load_records_json, load_snapshot, load_transactions_csv};
pub use policy::{PolicyError, ScoringPolicy};
pub use layer::{ActionCategory, Effort, FlagKind, LayerScore, ScoreFactor, ScoreFlag};
pub use anomaly::{AnomalyDetector, AnomalyFinding, AnomalyType, Severity};
pub use reconciliation::{CrossSourceReconciler, PairingGroup, ReconciliationResult, SourceCheck};
pub use evidence::EvidenceScorer;
pub use stability::StabilityScorer;
pub use compliance::{ComplianceAssessment, ComplianceScorer, RiskLevel};
pub use tier::{TierEvidence, TrustTier, TrustTierClassifier, TrustTierInfo};
pub use composer::{
    compute_credibility_score, ConfidenceLevel, CredibilityEngine, CredibilityScore,
    ImprovementAction, Priority,
};
pub use config::{AppConfig, ConfigError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
