use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::flow::FEATURE_LEN;

/// Binary crash classifier over flow features. `0.0` means no crash, any
/// other label a crash.
pub trait CrashClassifier {
    fn predict(&self, features: &[f32]) -> f32;

    #[inline]
    fn is_crash(&self, features: &[f32]) -> bool {
        self.predict(features) != 0.0
    }
}

/// Linear decision function `sign(w . x + b)` stored as JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl LinearModel {
    pub fn new(weights: Vec<f32>, bias: f32) -> Result<Self, Error> {
        if weights.len() != FEATURE_LEN {
            return Err(Error::ModelShape {
                expected: FEATURE_LEN,
                got: weights.len(),
            });
        }

        Ok(Self { weights, bias })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        let model: LinearModel = serde_json::from_reader(std::io::BufReader::new(file))?;

        Self::new(model.weights, model.bias)
    }

    #[inline]
    pub fn decision(&self, features: &[f32]) -> f32 {
        self.weights
            .iter()
            .zip(features)
            .fold(self.bias, |acc, (w, x)| acc + w * x)
    }
}

impl CrashClassifier for LinearModel {
    fn predict(&self, features: &[f32]) -> f32 {
        if self.decision(features) > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

impl<C: CrashClassifier + ?Sized> CrashClassifier for Box<C> {
    #[inline]
    fn predict(&self, features: &[f32]) -> f32 {
        (**self).predict(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_feature_count() {
        let err = LinearModel::new(vec![0.0; 304], 0.0).unwrap_err();

        assert!(matches!(err, Error::ModelShape { expected: 320, got: 304 }));
    }

    #[test]
    fn predicts_by_sign_of_decision() {
        let mut weights = vec![0.0; FEATURE_LEN];
        weights[0] = 2.0;
        let model = LinearModel::new(weights, -1.0).unwrap();

        let mut features = vec![0.0; FEATURE_LEN];
        assert_eq!(model.predict(&features), 0.0);

        features[0] = 1.0;
        assert_eq!(model.predict(&features), 1.0);
        assert!(model.is_crash(&features));
    }

    #[test]
    fn loads_from_json() {
        let path = std::env::temp_dir().join(format!("crashwatch-model-{}.json", std::process::id()));
        let model = LinearModel::new(vec![0.5; FEATURE_LEN], 0.25).unwrap();
        std::fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();

        assert_eq!(LinearModel::from_file(&path).unwrap(), model);
        std::fs::remove_file(&path).ok();
    }
}
