//! Classifier collaborator
//!
//! An optional trained model consulted after the rules. Whatever it does
//! (error or panic) is contained at [`classify_guarded`] and never reaches the
//! pipeline.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::str::FromStr;

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::record::Prediction;
use crate::logic::error::ClassifierError;
use crate::logic::sensor::RawSample;

pub const FEATURE_COUNT: usize = 10;

/// Score at or above which the label is 1
pub const LABEL_THRESHOLD: f64 = 0.5;

/// Product quality variant, one-hot encoded as the first three features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineType {
    H,
    #[default]
    L,
    M,
}

impl FromStr for MachineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "H" => Ok(MachineType::H),
            "L" => Ok(MachineType::L),
            "M" => Ok(MachineType::M),
            other => Err(format!("unknown machine type '{}' (expected L, M or H)", other)),
        }
    }
}

/// `[type_h, type_l, type_m, tool_wear, rotation_speed, torque, air_temp,
/// process_temp, temp_diff, power]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f32; FEATURE_COUNT]);

impl FeatureVector {
    /// Missing process fields become 0. Rotation speed falls back to rpm.
    pub fn from_sample(sample: &RawSample, machine_type: MachineType) -> Self {
        let one_hot = |t: MachineType| if machine_type == t { 1.0 } else { 0.0 };
        let v = |o: Option<f64>| o.unwrap_or(0.0) as f32;

        FeatureVector([
            one_hot(MachineType::H),
            one_hot(MachineType::L),
            one_hot(MachineType::M),
            v(sample.tool_wear),
            sample.rotation_speed.unwrap_or(sample.rpm) as f32,
            v(sample.torque),
            v(sample.air_temp),
            v(sample.process_temp),
            v(sample.temp_diff),
            v(sample.power),
        ])
    }
}

/// Binary failure classifier. Implementations may fail; they should not panic,
/// but callers go through [`classify_guarded`] regardless.
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &FeatureVector) -> Result<Prediction, ClassifierError>;
}

/// Run the classifier with panics converted to `ClassifierError::Panicked`.
pub fn classify_guarded(
    classifier: &dyn Classifier,
    features: &FeatureVector,
) -> Result<Prediction, ClassifierError> {
    match catch_unwind(AssertUnwindSafe(|| classifier.classify(features))) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ClassifierError::Panicked(msg))
        }
    }
}

// ============================================================================
// ONNX IMPLEMENTATION
// ============================================================================

/// ONNX model taking a `[1, 10]` float input. The first output is either a
/// pair of class probabilities or a single failure probability.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    output_name: String,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        log::info!("Loading classifier from: {}", model_path.display());

        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| ClassifierError::Load(format!("session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ClassifierError::Load(format!("optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| ClassifierError::Load(format!("{}: {}", model_path.display(), e)))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ClassifierError::Load("model defines no outputs".to_string()))?;

        log::info!("Classifier loaded (output '{}')", output_name);

        Ok(Self {
            session: Mutex::new(session),
            output_name,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, features: &FeatureVector) -> Result<Prediction, ClassifierError> {
        let input = Array2::<f32>::from_shape_vec((1, FEATURE_COUNT), features.0.to_vec())
            .map_err(|e| ClassifierError::Inference(format!("array error: {}", e)))?;
        let tensor = Value::from_array(input)
            .map_err(|e| ClassifierError::Inference(format!("tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| ClassifierError::Inference("missing output".to_string()))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("extract error: {}", e)))?;

        let score = match data {
            [_, failure] => *failure as f64,
            [failure] => *failure as f64,
            other => {
                return Err(ClassifierError::Inference(format!(
                    "unexpected output of {} values",
                    other.len()
                )))
            }
        };

        Ok(prediction_from_score(score))
    }
}

/// Clamp to [0, 1] and derive the label.
pub fn prediction_from_score(score: f64) -> Prediction {
    let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
    Prediction {
        prediction_label: u8::from(score >= LABEL_THRESHOLD),
        prediction_score: score,
    }
}
