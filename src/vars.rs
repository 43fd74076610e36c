//! Protocol variables: the fixed-size, range-checked, read-only input vector.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SketchError};

/// Number of protocol variables every execution sees.
pub const VAR_COUNT: usize = 10;
/// Smallest accepted value.
pub const VAR_MIN: f64 = 0.0;
/// Largest accepted value.
pub const VAR_MAX: f64 = 100.0;

/// Exactly ten numbers in `[0, 100]`.
///
/// There is no mutation API: once normalized the vector can only be read,
/// copied or serialized. A sketch's write attempt is answered by
/// [`ProtocolVariables::reject_write`], which borrows the vector immutably.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct ProtocolVariables {
    values: [f64; VAR_COUNT],
}

impl ProtocolVariables {
    /// Validate `vars` and zero-pad it on the right to ten elements.
    ///
    /// More than ten elements, a non-finite element, or an element outside
    /// `[0, 100]` is a validation error; nothing is clamped or truncated.
    pub fn normalize(vars: &[f64]) -> Result<Self> {
        if vars.len() > VAR_COUNT {
            return Err(SketchError::Validation(format!(
                "VAR must have at most {VAR_COUNT} elements, got {}",
                vars.len()
            )));
        }

        let mut values = [0.0; VAR_COUNT];
        for (i, &v) in vars.iter().enumerate() {
            if !v.is_finite() {
                return Err(SketchError::Validation(format!(
                    "VAR[{i}] must be a finite number, got {v}"
                )));
            }
            if !(VAR_MIN..=VAR_MAX).contains(&v) {
                return Err(SketchError::Validation(format!(
                    "VAR[{i}] = {v} is out of range, values must be {VAR_MIN}-{VAR_MAX}"
                )));
            }
            values[i] = v;
        }

        Ok(Self { values })
    }

    /// Ten zeros.
    pub fn zeros() -> Self {
        Self {
            values: [0.0; VAR_COUNT],
        }
    }

    /// Read one variable; an index outside `0..10` is tagged with that index.
    pub fn get(&self, index: i64) -> Result<f64> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.values.get(i).copied())
            .ok_or(SketchError::ProtocolVariable { index })
    }

    /// The error a write, delete or define attempt on `index` raises.
    pub fn reject_write(&self, index: i64) -> SketchError {
        tracing::warn!(index, "sketch attempted to write a protocol variable");
        SketchError::ProtocolVariable { index }
    }

    /// The ten values in order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Copy of the ten values.
    pub fn to_array(&self) -> [f64; VAR_COUNT] {
        self.values
    }
}

impl Default for ProtocolVariables {
    fn default() -> Self {
        Self::zeros()
    }
}

impl Index<usize> for ProtocolVariables {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

impl TryFrom<Vec<f64>> for ProtocolVariables {
    type Error = SketchError;

    fn try_from(vars: Vec<f64>) -> Result<Self> {
        Self::normalize(&vars)
    }
}

impl From<ProtocolVariables> for Vec<f64> {
    fn from(vars: ProtocolVariables) -> Self {
        vars.values.to_vec()
    }
}
