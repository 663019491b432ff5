//! Run configuration shared by the command line tool and the Python bindings.

use crate::design::TimeLabels;
use crate::error::{LufError, Result};

/// Default generalized-metric exponents.
pub const DEFAULT_ALPHAS: [f64; 3] = [0.0, 0.5, 1.0];

/// Parameters of a longitudinal UniFrac run.
///
/// - `alphas`: exponents of the generalized metrics, in output order
/// - `time_labels`: sample sheet labels of the two time points
/// - `threads`: size of a dedicated rayon pool (`None` uses the global pool)
#[derive(Debug, Clone, PartialEq)]
pub struct LufConfig {
    pub alphas: Vec<f64>,
    pub time_labels: TimeLabels,
    pub threads: Option<usize>,
}

impl Default for LufConfig {
    fn default() -> Self {
        Self {
            alphas: DEFAULT_ALPHAS.to_vec(),
            time_labels: TimeLabels::default(),
            threads: None,
        }
    }
}

impl LufConfig {
    pub fn with_alphas(mut self, alphas: Vec<f64>) -> Self {
        self.alphas = alphas;
        self
    }

    pub fn with_time_labels(mut self, labels: TimeLabels) -> Self {
        self.time_labels = labels;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Check the configuration before any data is touched.
    pub fn validate(&self) -> Result<()> {
        if self.alphas.is_empty() {
            return Err(LufError::InvalidParameter(
                "at least one alpha is required".to_string(),
            ));
        }
        if let Some(alpha) = self.alphas.iter().find(|a| !a.is_finite() || **a < 0.0) {
            return Err(LufError::InvalidParameter(format!(
                "alpha must be a finite, non-negative number (got {alpha})"
            )));
        }
        for (k, alpha) in self.alphas.iter().enumerate() {
            if self.alphas[..k].contains(alpha) {
                return Err(LufError::InvalidParameter(format!("alpha {alpha} given twice")));
            }
        }

        let TimeLabels { first, second } = &self.time_labels;
        if first.trim().is_empty() || second.trim().is_empty() {
            return Err(LufError::InvalidParameter(
                "time labels must not be empty".to_string(),
            ));
        }
        if first.trim() == second.trim() {
            return Err(LufError::InvalidParameter(format!(
                "both time points use the label '{first}'"
            )));
        }

        if self.threads == Some(0) {
            return Err(LufError::InvalidParameter(
                "thread count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LufConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alphas, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_rejects_bad_alphas() {
        for alphas in [vec![], vec![-0.5], vec![f64::NAN], vec![0.5, 1.0, 0.5]] {
            let config = LufConfig::default().with_alphas(alphas.clone());
            assert!(
                matches!(config.validate(), Err(LufError::InvalidParameter(_))),
                "{alphas:?}"
            );
        }
    }

    #[test]
    fn test_rejects_identical_time_labels() {
        let config = LufConfig::default().with_time_labels(TimeLabels::new("T0", "T0"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_threads() {
        let config = LufConfig::default().with_threads(Some(0));
        assert!(config.validate().is_err());
    }
}
