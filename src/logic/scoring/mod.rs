//! Scoring Module - Anomaly & Failure Scoring
//!
//! Turns a RawSample into a ScoredRecord: static range rules, failure
//! probability accumulation and an optional ONNX classifier.
//!
//! ## Structure
//! - `thresholds.rs` - normal ranges and category weights
//! - `record.rs` - ScoredRecord and its parts
//! - `scorer.rs` - rule pass and AnomalyScorer
//! - `classifier.rs` - classifier contract, feature vector, ONNX model

pub mod classifier;
pub mod record;
pub mod scorer;
pub mod thresholds;

#[cfg(test)]
mod tests;

pub use classifier::{Classifier, FeatureVector, MachineType, OnnxClassifier};
pub use record::{AnomalyFlags, FailureAssessment, FailureType, Prediction, ScoredRecord};
pub use scorer::{score_rules, AnomalyScorer};
