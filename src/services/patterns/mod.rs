//! Pattern detection: detectors, engine and shared numeric routines

pub mod anomaly;
pub mod correlation;
pub mod engine;
pub mod models;
pub mod numeric;
pub mod statistical;
pub mod timeseries;

pub use anomaly::{AnomalyDetector, AnomalyDetectorConfig, Sensitivity};
pub use correlation::{CorrelationDetector, CorrelationDetectorConfig};
pub use engine::{PatternEngine, PatternEngineConfig};
pub use models::{
    AnalysisMetadata, AnalysisReport, AnalysisSummary, Detector, DetectorConfig, Impact, Insight,
    Pattern, PatternContext, PatternEvidence, PatternType, Recommendation, canonical_json,
};
pub use statistical::{StatisticalDetector, StatisticalDetectorConfig};
pub use timeseries::{TimeSeriesDetector, TimeSeriesDetectorConfig};
