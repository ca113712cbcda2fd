//! Scored record types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::logic::sensor::RawSample;

/// Failure category claimed by the first matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureType {
    Overheating,
    #[serde(rename = "Bearing Failure")]
    BearingFailure,
    #[serde(rename = "Pressure Issue")]
    PressureIssue,
    #[serde(rename = "Motor Issue")]
    MotorIssue,
    Unknown,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Overheating => "Overheating",
            FailureType::BearingFailure => "Bearing Failure",
            FailureType::PressureIssue => "Pressure Issue",
            FailureType::MotorIssue => "Motor Issue",
            FailureType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field out-of-range flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyFlags {
    pub temp_anomaly: bool,
    pub vibration_anomaly: bool,
    pub pressure_anomaly: bool,
    pub rpm_anomaly: bool,
}

impl AnomalyFlags {
    pub fn any(&self) -> bool {
        self.temp_anomaly || self.vibration_anomaly || self.pressure_anomaly || self.rpm_anomaly
    }
}

/// Present only when an anomaly was detected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailureAssessment {
    pub failure_probability: f64,
    pub failure_type: FailureType,
}

/// Classifier output. Absent when no classifier is configured or it failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_label: u8,
    pub prediction_score: f64,
}

/// A raw sample plus everything the scorer derived from it. Never mutated
/// after creation.
///
/// A record without `prediction` is a valid, rule-only record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub sample: RawSample,
    #[serde(flatten)]
    pub flags: AnomalyFlags,
    pub anomaly_detected: bool,
    #[serde(flatten)]
    pub failure: Option<FailureAssessment>,
    pub vibration_to_rpm_ratio: f64,
    pub temperature_pressure_ratio: f64,
    #[serde(flatten)]
    pub prediction: Option<Prediction>,
}

impl ScoredRecord {
    pub fn machine_id(&self) -> &str {
        &self.sample.machine_id
    }

    pub fn failure_probability(&self) -> Option<f64> {
        self.failure.map(|f| f.failure_probability)
    }

    pub fn failure_type(&self) -> Option<FailureType> {
        self.failure.map(|f| f.failure_type)
    }

    pub fn predicts_failure(&self) -> bool {
        matches!(self.prediction, Some(p) if p.prediction_label == 1)
    }
}
