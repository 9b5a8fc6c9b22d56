//! MindWall Common - Shared domain types for the analysis engine and proxy
//!
//! This crate provides the vocabulary both MindWall processes speak:
//! - The 12 manipulation dimensions and their aggregation weights
//! - Severity, recommended action, and ingest channel enums
//! - Persisted record shapes (analyses, alerts, baselines, employees)

pub mod dimensions;
pub mod records;
pub mod severity;

pub use dimensions::*;
pub use records::*;
pub use severity::*;
