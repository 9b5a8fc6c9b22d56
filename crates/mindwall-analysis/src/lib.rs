//! MindWall Analysis Engine
//!
//! Multi-stage scoring of inbound messages for psychological manipulation:
//! - Rule-based pre-filter (zero-inference fast path)
//! - Per-sender behavioral baselines with online EMA updates
//! - Deviation scoring against the baseline
//! - Inference-service scoring of the 12 manipulation dimensions
//! - Weighted aggregation, alerting, and real-time broadcast

pub mod baseline;
pub mod broadcast;
pub mod cross_channel;
pub mod deviation;
pub mod inference;
pub mod memory;
pub mod pipeline;
pub mod prefilter;
pub mod prompt;
pub mod repository;
pub mod scorer;
pub mod text_metrics;

pub use baseline::{BaselineEngine, BaselineMailbox, BaselineUpdate, BaselineUpdateHandle};
pub use broadcast::{AlertEvent, AlertHub};
pub use cross_channel::{CoordinationReport, CrossChannelDetector};
pub use deviation::{DeviationReport, DeviationScorer};
pub use inference::{InferenceClient, InferenceError, InferenceVerdict, OllamaClient};
pub use pipeline::{AnalysisPipeline, AnalyzeRequest, AnalyzeResponse, FieldError};
pub use prefilter::{PreFilter, PreFilterResult};
pub use repository::{
    AlertRepository, AnalysisInsert, AnalysisRepository, BaselineRepository, EmployeeRepository,
    RepoError, RepoResult, SummaryStats,
};
pub use scorer::ScoreAggregator;
