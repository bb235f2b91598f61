//! Coarsening configuration shared by the dependency classifier, the
//! aggregator and the hierarchy builder.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AmgError, Result};

/// Bounds and thresholds that control how a level is aggregated and when the
/// hierarchy stops growing.
///
/// Can be read from a JSON file where missing fields take their defaults:
///
/// ```json
/// { "alpha": 0.33, "max_aggregate_size": 10, "coarsen_target": 50 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseningCriterion {
    /// Edge (v, w) is a strong dependency if `|a_vw| >= alpha * max_k |a_vk|`.
    pub alpha: f64,
    /// A vertex whose largest off-diagonal magnitude is below
    /// `beta * |a_vv|` has no strong dependencies at all.
    pub beta: f64,
    pub min_aggregate_size: usize,
    pub max_aggregate_size: usize,
    /// Maximum graph distance (in hops) from the seed of an aggregate.
    pub max_distance: usize,
    /// Maximum number of levels including the finest one.
    pub max_levels: usize,
    /// Required ratio `fine unknowns / coarse unknowns` for a level to be
    /// accepted. Coarsening below this rate counts as stalled.
    pub min_coarsening_rate: f64,
    /// Levels with at most this many unknowns are not coarsened further.
    pub coarsen_target: usize,
}

impl Default for CoarseningCriterion {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            beta: 1.0e-5,
            min_aggregate_size: 4,
            max_aggregate_size: 6,
            max_distance: 2,
            max_levels: 100,
            min_coarsening_rate: 1.2,
            coarsen_target: 1000,
        }
    }
}

impl CoarseningCriterion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let criterion: Self = serde_json::from_reader(reader)?;
        criterion.validate()?;
        Ok(criterion)
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_aggregate_size(mut self, min: usize, max: usize) -> Self {
        self.min_aggregate_size = min;
        self.max_aggregate_size = max;
        self
    }

    pub fn with_max_distance(mut self, max_distance: usize) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    pub fn with_min_coarsening_rate(mut self, rate: f64) -> Self {
        self.min_coarsening_rate = rate;
        self
    }

    pub fn with_coarsen_target(mut self, coarsen_target: usize) -> Self {
        self.coarsen_target = coarsen_target;
        self
    }

    /// Rejects contradictory bounds before any work is done.
    pub fn validate(&self) -> Result<()> {
        if self.min_aggregate_size == 0 || self.max_aggregate_size == 0 {
            return Err(AmgError::InvalidCriterion(format!(
                "aggregate sizes must be positive (min: {}, max: {})",
                self.min_aggregate_size, self.max_aggregate_size
            )));
        }
        if self.min_aggregate_size > self.max_aggregate_size {
            return Err(AmgError::InvalidCriterion(format!(
                "min aggregate size {} exceeds max aggregate size {}",
                self.min_aggregate_size, self.max_aggregate_size
            )));
        }
        if !(self.alpha >= 0.0) || !(self.beta >= 0.0) {
            return Err(AmgError::InvalidCriterion(format!(
                "thresholds must be non-negative (alpha: {}, beta: {})",
                self.alpha, self.beta
            )));
        }
        if self.max_levels == 0 {
            return Err(AmgError::InvalidCriterion(
                "a hierarchy needs at least one level".into(),
            ));
        }
        if !(self.min_coarsening_rate > 1.0) {
            return Err(AmgError::InvalidCriterion(format!(
                "min coarsening rate must be greater than 1, got {}",
                self.min_coarsening_rate
            )));
        }
        Ok(())
    }

    /// True if coarsening `fine` unknowns down to `coarse` unknowns is too
    /// slow to be worth another level.
    pub fn is_stalled(&self, fine: usize, coarse: usize) -> bool {
        coarse as f64 * self.min_coarsening_rate > fine as f64
    }
}

#[cfg(test)]
mod tests {
    use super::CoarseningCriterion;
    use crate::error::AmgError;
    use std::io::Write;

    #[test]
    fn default_is_valid() {
        let criterion = CoarseningCriterion::default();
        assert!(criterion.validate().is_ok());
        assert_eq!(criterion.alpha, 0.0);
    }

    #[test]
    fn min_above_max_is_rejected() {
        let criterion = CoarseningCriterion::new().with_aggregate_size(8, 4);
        assert!(matches!(
            criterion.validate(),
            Err(AmgError::InvalidCriterion(_))
        ));
    }

    #[test]
    fn non_positive_sizes_are_rejected() {
        let criterion = CoarseningCriterion::new().with_aggregate_size(0, 4);
        assert!(matches!(
            criterion.validate(),
            Err(AmgError::InvalidCriterion(_))
        ));
        let criterion = CoarseningCriterion::new().with_min_coarsening_rate(1.0);
        assert!(criterion.validate().is_err());
        let criterion = CoarseningCriterion::new().with_alpha(-0.5);
        assert!(criterion.validate().is_err());
    }

    #[test]
    fn stall_detection() {
        let criterion = CoarseningCriterion::new().with_min_coarsening_rate(2.0);
        assert!(!criterion.is_stalled(100, 50));
        assert!(criterion.is_stalled(100, 51));
        assert!(criterion.is_stalled(10, 10));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let path = std::env::temp_dir().join("paamg_partial_criterion.json");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{ "alpha": 0.25, "max_aggregate_size": 10 }}"#).unwrap();
        drop(file);

        let criterion = CoarseningCriterion::from_json_file(&path).unwrap();
        assert_eq!(criterion.alpha, 0.25);
        assert_eq!(criterion.max_aggregate_size, 10);
        assert_eq!(criterion.min_aggregate_size, 4);
        std::fs::remove_file(&path).unwrap();
    }
}
