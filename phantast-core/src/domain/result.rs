//! Step result domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output of one step run against one image
///
/// Immutable once created; recomputation produces a new result with a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: Uuid,
    pub step_id: Uuid,
    /// Reference to the produced artifact (a path or URL)
    pub image_url: String,
    pub confluency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram: Option<Vec<f64>>,
}

/// What a step executor hands back before the engine assigns ids
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepOutput {
    pub image_url: String,
    pub confluency: Option<f64>,
    pub histogram: Option<Vec<f64>>,
}

impl StepOutput {
    /// Output that only carries an artifact reference
    pub fn artifact(image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            ..Default::default()
        }
    }

    pub fn with_confluency(mut self, confluency: f64) -> Self {
        self.confluency = Some(confluency);
        self
    }

    pub fn with_histogram(mut self, histogram: Vec<f64>) -> Self {
        self.histogram = Some(histogram);
        self
    }
}

impl StepResult {
    /// Wraps executor output into a fresh result for `step_id`
    pub fn from_output(step_id: Uuid, output: StepOutput) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_id,
            image_url: output.image_url,
            confluency: output.confluency,
            histogram: output.histogram,
        }
    }

    /// Rough in-memory footprint, used for byte-bounded caches
    pub fn approximate_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.image_url.len()
            + self
                .histogram
                .as_ref()
                .map(|h| h.len() * std::mem::size_of::<f64>())
                .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_output_assigns_fresh_ids() {
        let step_id = Uuid::new_v4();
        let output = StepOutput::artifact("/tmp/out.png").with_confluency(42.5);
        let a = StepResult::from_output(step_id, output.clone());
        let b = StepResult::from_output(step_id, output);
        assert_ne!(a.id, b.id);
        assert_eq!(a.step_id, step_id);
        assert_eq!(a.confluency, Some(42.5));
    }

    #[test]
    fn test_approximate_size_counts_histogram() {
        let small = StepResult::from_output(Uuid::new_v4(), StepOutput::artifact("a"));
        let large = StepResult::from_output(
            Uuid::new_v4(),
            StepOutput::artifact("a").with_histogram(vec![0.0; 256]),
        );
        assert_eq!(
            large.approximate_size() - small.approximate_size(),
            256 * std::mem::size_of::<f64>()
        );
    }
}
