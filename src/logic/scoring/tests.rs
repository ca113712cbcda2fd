use std::sync::Arc;

use proptest::prelude::*;

use super::*;
use crate::logic::error::ClassifierError;
use crate::logic::sensor::RawSample;

fn sample(temperature: f64, vibration: f64, pressure: f64, rpm: f64) -> RawSample {
    RawSample::new("m1", temperature, vibration, pressure, rpm)
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_overheating_claims_type_over_bearing() {
    let record = score_rules(sample(95.0, 6.0, 1.0, 2000.0));

    assert!(record.flags.temp_anomaly);
    assert!(record.flags.vibration_anomaly);
    assert!(!record.flags.pressure_anomaly);
    assert!(!record.flags.rpm_anomaly);
    assert!(record.anomaly_detected);
    assert_eq!(record.failure_type(), Some(FailureType::Overheating));
    assert!((record.failure_probability().unwrap() - 0.7).abs() < 1e-9);
}

#[test]
fn test_normal_sample_has_no_failure_fields() {
    let record = score_rules(sample(70.0, 2.0, 1.0, 2000.0));

    assert!(!record.anomaly_detected);
    assert_eq!(record.flags, AnomalyFlags::default());
    assert!(record.failure.is_none());
    assert!(record.prediction.is_none());

    let json = serde_json::to_value(&record).unwrap();
    assert!(json.get("failure_probability").is_none());
    assert!(json.get("failure_type").is_none());
}

#[test]
fn test_low_temperature_is_anomalous_but_unknown() {
    let record = score_rules(sample(20.0, 2.0, 1.0, 2000.0));

    assert!(record.anomaly_detected);
    assert_eq!(record.failure_type(), Some(FailureType::Unknown));
    assert_eq!(record.failure_probability(), Some(0.0));
}

#[test]
fn test_all_categories_cap_probability() {
    let record = score_rules(sample(120.0, 9.0, 2.0, 5000.0));
    assert_eq!(record.failure_probability(), Some(0.95));
    assert_eq!(record.failure_type(), Some(FailureType::Overheating));
}

#[test]
fn test_later_category_claims_type_when_earlier_absent() {
    let record = score_rules(sample(70.0, 2.0, 0.5, 500.0));
    assert_eq!(record.failure_type(), Some(FailureType::PressureIssue));
    assert!((record.failure_probability().unwrap() - 0.3).abs() < 1e-9);
}

#[test]
fn test_derived_ratios() {
    let record = score_rules(sample(80.0, 0.0, 0.0, 0.0));
    assert_eq!(record.vibration_to_rpm_ratio, 0.0);
    assert!((record.temperature_pressure_ratio - 800.0).abs() < 1e-9);

    let record = score_rules(sample(60.0, 3.0, 1.5, 1500.0));
    assert!((record.vibration_to_rpm_ratio - 0.002).abs() < 1e-12);
    assert!((record.temperature_pressure_ratio - 40.0).abs() < 1e-12);
}

#[test]
fn test_serialized_record_is_flat() {
    let record = score_rules(sample(95.0, 6.0, 1.0, 2000.0));
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["machine_id"], "m1");
    assert_eq!(json["temp_anomaly"], true);
    assert_eq!(json["failure_type"], "Overheating");
    assert_eq!(json["anomaly_detected"], true);
}

// ============================================================================
// CLASSIFIER DEGRADATION
// ============================================================================

struct Fixed(f64);

impl Classifier for Fixed {
    fn classify(&self, _: &FeatureVector) -> Result<Prediction, ClassifierError> {
        Ok(classifier::prediction_from_score(self.0))
    }
}

struct Failing;

impl Classifier for Failing {
    fn classify(&self, _: &FeatureVector) -> Result<Prediction, ClassifierError> {
        Err(ClassifierError::Inference("session closed".into()))
    }
}

struct Panicking;

impl Classifier for Panicking {
    fn classify(&self, _: &FeatureVector) -> Result<Prediction, ClassifierError> {
        panic!("bad input tensor");
    }
}

#[test]
fn test_classifier_prediction_attached() {
    let scorer = AnomalyScorer::with_classifier(Arc::new(Fixed(0.83)), MachineType::L);
    let record = scorer.score(sample(70.0, 2.0, 1.0, 2000.0));

    assert!(record.predicts_failure());
    assert_eq!(record.prediction.unwrap().prediction_score, 0.83);
    assert!(!record.anomaly_detected);
}

#[test]
fn test_failing_classifier_degrades_to_rules() {
    let scorer = AnomalyScorer::with_classifier(Arc::new(Failing), MachineType::L);
    let record = scorer.score(sample(95.0, 6.0, 1.0, 2000.0));

    assert!(record.prediction.is_none());
    assert_eq!(record.failure_type(), Some(FailureType::Overheating));
    assert_eq!(scorer.classifier_errors(), 1);
}

#[test]
fn test_panicking_classifier_degrades_to_rules() {
    let scorer = AnomalyScorer::with_classifier(Arc::new(Panicking), MachineType::H);

    let record = scorer.score(sample(95.0, 6.0, 1.0, 2000.0));
    assert!(record.prediction.is_none());
    assert!(record.anomaly_detected);

    // Still usable afterwards
    let record = scorer.score(sample(70.0, 2.0, 1.0, 2000.0));
    assert!(!record.anomaly_detected);
    assert_eq!(scorer.classifier_errors(), 2);
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn around(lo: f64, hi: f64) -> impl Strategy<Value = f64> {
    let span = hi - lo;
    prop_oneof![
        lo - span..lo,
        lo..=hi,
        hi..hi + span,
        Just(lo),
        Just(hi),
    ]
}

fn any_sample() -> impl Strategy<Value = RawSample> {
    (
        around(50.0, 90.0),
        around(0.1, 5.0),
        around(0.8, 1.2),
        around(1000.0, 3000.0),
    )
        .prop_map(|(t, v, p, r)| sample(t, v, p, r))
}

fn first_match(s: &RawSample) -> FailureType {
    if s.temperature > 90.0 {
        FailureType::Overheating
    } else if s.vibration > 5.0 {
        FailureType::BearingFailure
    } else if !(0.8..=1.2).contains(&s.pressure) {
        FailureType::PressureIssue
    } else if !(1000.0..=3000.0).contains(&s.rpm) {
        FailureType::MotorIssue
    } else {
        FailureType::Unknown
    }
}

proptest! {
    #[test]
    fn prop_flags_match_range_checks(s in any_sample()) {
        let record = score_rules(s.clone());

        prop_assert_eq!(record.flags.temp_anomaly, s.temperature < 50.0 || s.temperature > 90.0);
        prop_assert_eq!(record.flags.vibration_anomaly, s.vibration < 0.1 || s.vibration > 5.0);
        prop_assert_eq!(record.flags.pressure_anomaly, s.pressure < 0.8 || s.pressure > 1.2);
        prop_assert_eq!(record.flags.rpm_anomaly, s.rpm < 1000.0 || s.rpm > 3000.0);
        prop_assert_eq!(record.anomaly_detected, record.flags.any());
        prop_assert_eq!(record.failure.is_some(), record.anomaly_detected);
    }

    #[test]
    fn prop_probability_is_capped(s in any_sample()) {
        if let Some(p) = score_rules(s).failure_probability() {
            prop_assert!((0.0..=0.95).contains(&p));
        }
    }

    #[test]
    fn prop_first_match_claims_type(s in any_sample()) {
        let record = score_rules(s.clone());
        if record.anomaly_detected {
            prop_assert_eq!(record.failure_type(), Some(first_match(&s)));
        }
    }

    #[test]
    fn prop_extra_category_never_lowers_probability(s in any_sample()) {
        let base = score_rules(s.clone()).failure_probability().unwrap_or(0.0);

        // Push rpm out of range: one more category can only add
        let mut worse = s;
        worse.rpm = 5000.0;
        let more = score_rules(worse).failure_probability().unwrap_or(0.0);
        prop_assert!(more >= base);
    }
}
