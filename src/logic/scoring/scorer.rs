//! Anomaly Scorer
//!
//! Rules first, classifier second. The rule pass is a pure function of the
//! sample; the classifier pass can only add a `prediction`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::classifier::{classify_guarded, Classifier, FeatureVector, MachineType};
use super::record::{AnomalyFlags, FailureAssessment, FailureType, ScoredRecord};
use super::thresholds::{
    BEARING_WEIGHT, MAX_FAILURE_PROBABILITY, MOTOR_WEIGHT, OVERHEATING_WEIGHT, PRESSURE,
    PRESSURE_WEIGHT, RPM, TEMPERATURE, VIBRATION,
};
use crate::logic::sensor::RawSample;

/// Per-field flags for a sample.
pub fn flag_anomalies(sample: &RawSample) -> AnomalyFlags {
    AnomalyFlags {
        temp_anomaly: TEMPERATURE.is_anomalous(sample.temperature),
        vibration_anomaly: VIBRATION.is_anomalous(sample.vibration),
        pressure_anomaly: PRESSURE.is_anomalous(sample.pressure),
        rpm_anomaly: RPM.is_anomalous(sample.rpm),
    }
}

/// Failure probability and type. `None` when nothing is anomalous.
///
/// Categories are visited in a fixed order; the first match claims the type
/// and every match adds its weight. Temperature and vibration only count
/// above their upper bound.
pub fn assess_failure(sample: &RawSample, flags: &AnomalyFlags) -> Option<FailureAssessment> {
    if !flags.any() {
        return None;
    }

    let categories = [
        (
            flags.temp_anomaly && TEMPERATURE.is_above(sample.temperature),
            OVERHEATING_WEIGHT,
            FailureType::Overheating,
        ),
        (
            flags.vibration_anomaly && VIBRATION.is_above(sample.vibration),
            BEARING_WEIGHT,
            FailureType::BearingFailure,
        ),
        (flags.pressure_anomaly, PRESSURE_WEIGHT, FailureType::PressureIssue),
        (flags.rpm_anomaly, MOTOR_WEIGHT, FailureType::MotorIssue),
    ];

    let mut probability = 0.0;
    let mut failure_type = FailureType::Unknown;

    for (matched, weight, kind) in categories {
        if !matched {
            continue;
        }
        probability += weight;
        if failure_type == FailureType::Unknown {
            failure_type = kind;
        }
    }

    // Two decimals keeps 0.3 + 0.4 printing as 0.7
    let probability = ((probability * 100.0).round() / 100.0).min(MAX_FAILURE_PROBABILITY);

    Some(FailureAssessment {
        failure_probability: probability,
        failure_type,
    })
}

/// Rule-only scoring.
pub fn score_rules(sample: RawSample) -> ScoredRecord {
    let flags = flag_anomalies(&sample);
    let failure = assess_failure(&sample, &flags);

    ScoredRecord {
        vibration_to_rpm_ratio: sample.vibration / sample.rpm.max(1.0),
        temperature_pressure_ratio: sample.temperature / sample.pressure.max(0.1),
        anomaly_detected: flags.any(),
        flags,
        failure,
        prediction: None,
        sample,
    }
}

/// Scorer with an optional classifier attached.
pub struct AnomalyScorer {
    classifier: Option<Arc<dyn Classifier>>,
    machine_type: MachineType,
    classifier_errors: AtomicU64,
}

impl AnomalyScorer {
    pub fn rules_only() -> Self {
        Self {
            classifier: None,
            machine_type: MachineType::default(),
            classifier_errors: AtomicU64::new(0),
        }
    }

    pub fn with_classifier(classifier: Arc<dyn Classifier>, machine_type: MachineType) -> Self {
        Self {
            classifier: Some(classifier),
            machine_type,
            classifier_errors: AtomicU64::new(0),
        }
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Score one sample. A classifier failure is logged and counted; the
    /// record then carries the rule fields only.
    pub fn score(&self, sample: RawSample) -> ScoredRecord {
        let features = self
            .classifier
            .as_ref()
            .map(|_| FeatureVector::from_sample(&sample, self.machine_type));

        let mut record = score_rules(sample);

        if let (Some(classifier), Some(features)) = (self.classifier.as_deref(), features) {
            match classify_guarded(classifier, &features) {
                Ok(prediction) => record.prediction = Some(prediction),
                Err(e) => {
                    self.classifier_errors.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Classifier failed, using rule-only score: {}", e);
                }
            }
        }

        record
    }

    pub fn classifier_errors(&self) -> u64 {
        self.classifier_errors.load(Ordering::Relaxed)
    }
}
