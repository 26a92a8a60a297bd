use crate::errors::{NetworkError, Result};
use crate::types::Scope;

/// Scales `weights` so that the heaviest edge of the scope gets `width_factor`.
///
/// An empty scope yields an empty list. A scope whose heaviest edge weighs
/// nothing cannot be scaled and reports [`NetworkError::EmptyGraph`].
pub fn scaled_widths(weights: &[usize], width_factor: f64, scope: Scope) -> Result<Vec<f64>> {
    let Some(&max) = weights.iter().max() else {
        return Ok(Vec::new());
    };
    if max == 0 {
        return Err(NetworkError::EmptyGraph { scope });
    }
    let max = max as f64;
    Ok(weights
        .iter()
        .map(|&w| w as f64 / max * width_factor)
        .collect())
}

/// Weights of one scope together with the widths derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeWeights {
    pub weights: Vec<usize>,
    pub widths: Vec<f64>,
}

impl ScopeWeights {
    pub fn compute(weights: Vec<usize>, width_factor: f64, scope: Scope) -> Result<Self> {
        let widths = scaled_widths(&weights, width_factor, scope)?;
        Ok(ScopeWeights { weights, widths })
    }

    /// True when every edge weighs the same.
    pub fn is_uniform(&self) -> bool {
        match (self.weights.iter().min(), self.weights.iter().max()) {
            (Some(min), Some(max)) => min == max,
            _ => true,
        }
    }
}
