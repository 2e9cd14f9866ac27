//! Step fingerprints
//!
//! A fingerprint is a SHA-256 digest over the operation id, the canonical form
//! of the step parameters and the upstream fingerprint. Equal inputs always
//! produce the same fingerprint regardless of key order in the parameters.

use phantast_core::domain::image::Image;
use phantast_core::domain::result::StepResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::error::FingerprintError;

/// Maximum nesting depth accepted in step parameters
pub const MAX_PARAM_DEPTH: usize = 32;

const STEP_DOMAIN: &[u8] = b"phantast/step/v1";
const SOURCE_DOMAIN: &[u8] = b"phantast/source/v1";
const UPSTREAM_DOMAIN: &[u8] = b"phantast/upstream/v1";

/// Largest integer an f64 represents exactly
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Content-derived identifier of a step invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Sentinel fingerprint for the raw image, used upstream of the first step
    ///
    /// Covers the file's modification time and size, so a file rewritten in
    /// place starts a new chain even though its id is unchanged.
    pub fn source(image: &Image) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(SOURCE_DOMAIN);
        hasher.update(image.id.as_bytes());
        update_str(&mut hasher, &image.path.to_string_lossy());
        hasher.update(image.dimensions.width.to_le_bytes());
        hasher.update(image.dimensions.height.to_le_bytes());
        hasher.update(image.uploaded_at.timestamp().to_le_bytes());
        hasher.update(image.uploaded_at.timestamp_subsec_nanos().to_le_bytes());
        hasher.update(image.size_bytes.to_le_bytes());
        Self(hasher.finalize().into())
    }

    /// Folds a step's result into its fingerprint to form the upstream state
    /// of the next step.
    ///
    /// Only the result content takes part (artifact and numeric outputs); the
    /// result's own ids do not.
    pub fn chain(&self, result: &StepResult) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(UPSTREAM_DOMAIN);
        hasher.update(self.0);
        update_str(&mut hasher, &result.image_url);
        match result.confluency {
            Some(value) => {
                hasher.update([1u8]);
                hasher.update(value.to_bits().to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        match &result.histogram {
            Some(bins) => {
                hasher.update([1u8]);
                hasher.update((bins.len() as u64).to_le_bytes());
                for bin in bins {
                    hasher.update(bin.to_bits().to_le_bytes());
                }
            }
            None => hasher.update([0u8]),
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes the fingerprint of one step invocation
///
/// # Errors
/// Returns `FingerprintError::InvalidParameter` when the parameters cannot be
/// serialized to JSON, contain an empty key or nest deeper than
/// [`MAX_PARAM_DEPTH`].
pub fn compute_fingerprint<P: Serialize + ?Sized>(
    params: &P,
    upstream: &Fingerprint,
    operation_id: &str,
) -> Result<Fingerprint, FingerprintError> {
    let value = serde_json::to_value(params)
        .map_err(|e| FingerprintError::invalid("<params>", e.to_string()))?;
    let canonical = canonicalize(value, "<params>", 0)?;
    let encoded = serde_json::to_vec(&canonical)
        .map_err(|e| FingerprintError::invalid("<params>", e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(STEP_DOMAIN);
    update_str(&mut hasher, operation_id);
    hasher.update(upstream.0);
    hasher.update((encoded.len() as u64).to_le_bytes());
    hasher.update(&encoded);
    Ok(Fingerprint(hasher.finalize().into()))
}

/// Length-prefixed so adjacent fields cannot run into each other
fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn canonicalize(value: Value, key: &str, depth: usize) -> Result<Value, FingerprintError> {
    if depth > MAX_PARAM_DEPTH {
        return Err(FingerprintError::invalid(
            key,
            format!("nested deeper than {} levels", MAX_PARAM_DEPTH),
        ));
    }

    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut canonical = Map::new();
            for (child_key, child) in entries {
                if child_key.is_empty() {
                    return Err(FingerprintError::invalid(key, "empty parameter name"));
                }
                let child = canonicalize(child, &child_key, depth + 1)?;
                canonical.insert(child_key, child);
            }
            Ok(Value::Object(canonical))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| canonicalize(item, key, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Number(number) => Ok(Value::Number(canonical_number(number))),
        other => Ok(other),
    }
}

/// `2.0` and `2` are the same parameter value
fn canonical_number(number: Number) -> Number {
    match number.as_f64() {
        Some(f) if number.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT => {
            Number::from(f as i64)
        }
        _ => number,
    }
}
