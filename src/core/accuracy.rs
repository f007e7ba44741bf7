use crate::core::accumulator::Accumulator;
use crate::prelude::*;
use crate::utils::argmax_rows;

/// Regression predictions within `stddev(targets) / PRECISION_DIVISOR`
/// count as correct.
const PRECISION_DIVISOR: f64 = 250.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    /// predictions: class-index column; targets: index column or one-hot
    Categorical,
    Binary,
    Regression,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AccuracyMetric {
    pub accuracy: Accuracy,
    #[serde(default)]
    precision: Option<f64>,
    #[serde(skip)]
    accumulated: Accumulator,
}

impl AccuracyMetric {
    pub fn new(accuracy: Accuracy) -> Self {
        Self {
            accuracy,
            precision: None,
            accumulated: Accumulator::default(),
        }
    }

    pub fn precision(&self) -> Option<f64> {
        self.precision
    }

    /// Derives the regression tolerance from the targets once, or again
    /// when `reinit` is set. No-op for the other kinds.
    pub fn init(&mut self, targets: &Array2<f64>, reinit: bool) {
        if self.accuracy != Accuracy::Regression || (self.precision.is_some() && !reinit) {
            return;
        }
        let precision = sample_std(targets) / PRECISION_DIVISOR;
        tracing::debug!(precision, "regression accuracy precision");
        self.precision = Some(precision);
    }

    /// Elementwise hit/miss of `predictions` against `targets`.
    pub fn compare(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Result<Array2<bool>> {
        match self.accuracy {
            Accuracy::Categorical => {
                if predictions.ncols() != 1 || predictions.nrows() != targets.nrows() {
                    return Err(NNError::InvalidTargetShape(format!(
                        "categorical accuracy expects an index column, got predictions {:?} and targets {:?}",
                        predictions.dim(),
                        targets.dim()
                    )));
                }
                let classes: Array1<f64> = if targets.ncols() == 1 {
                    targets.column(0).to_owned()
                } else {
                    argmax_rows(targets).mapv(|i| i as f64)
                };
                Ok(Zip::from(predictions.column(0))
                    .and(&classes)
                    .map_collect(|&p, &t| p as i64 == t as i64)
                    .insert_axis(Axis(1)))
            }
            Accuracy::Binary => {
                check_same_shape(predictions, targets)?;
                Ok(Zip::from(predictions)
                    .and(targets)
                    .map_collect(|&p, &t| p as i64 == t as i64))
            }
            Accuracy::Regression => {
                check_same_shape(predictions, targets)?;
                let precision = self.precision.ok_or_else(|| {
                    NNError::InvalidConfig("regression accuracy used before init".to_string())
                })?;
                Ok(Zip::from(predictions)
                    .and(targets)
                    .map_collect(|&p, &t| (p - t).abs() < precision))
            }
        }
    }

    /// Fraction of hits in the batch; also added to the epoch accumulator.
    pub fn calculate(&mut self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Result<f64> {
        let comparisons = self.compare(predictions, targets)?;
        let hits = comparisons.iter().filter(|&&hit| hit).count() as f64;
        let count = comparisons.len() as u64;
        self.accumulated.add(hits, count);
        Ok(if count == 0 { 0.0 } else { hits / count as f64 })
    }

    pub fn add_accumulated(&mut self, sum: f64, count: u64) {
        self.accumulated.add(sum, count);
    }

    pub fn accumulated_accuracy(&self) -> f64 {
        self.accumulated.mean()
    }

    pub fn reset_accumulated(&mut self) {
        self.accumulated.reset();
    }
}

fn check_same_shape(predictions: &Array2<f64>, targets: &Array2<f64>) -> Result<()> {
    if predictions.dim() != targets.dim() {
        return Err(NNError::InvalidTargetShape(format!(
            "prediction shape {:?} doesn't match target shape {:?}",
            predictions.dim(),
            targets.dim()
        )));
    }
    Ok(())
}

/// Sample standard deviation over all elements; 0 for fewer than two values.
fn sample_std(values: &Array2<f64>) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.sum() / n as f64;
    let squares = values.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean));
    (squares / (n - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_categorical_accuracy() {
        let mut metric = AccuracyMetric::new(Accuracy::Categorical);
        let predictions = array![[0.0], [2.0], [1.0], [1.0]];
        let accuracy = metric
            .calculate(&predictions, &array![[0.0], [2.0], [0.0], [1.0]])
            .unwrap();
        assert_eq!(accuracy, 0.75);

        let one_hot = array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert_eq!(
            metric.compare(&predictions, &one_hot).unwrap().column(0).to_vec(),
            vec![true, true, false, true]
        );
    }

    #[test]
    fn test_binary_accuracy() {
        let mut metric = AccuracyMetric::new(Accuracy::Binary);
        let accuracy = metric
            .calculate(&array![[1.0, 0.0], [1.0, 1.0]], &array![[1.0, 1.0], [1.0, 1.0]])
            .unwrap();
        assert_eq!(accuracy, 0.75);
    }

    #[test]
    fn test_regression_precision() {
        let mut metric = AccuracyMetric::new(Accuracy::Regression);
        let targets = array![[2.0], [4.0], [4.0], [4.0], [5.0], [5.0], [7.0], [9.0]];
        metric.init(&targets, false);
        let expected = (32.0f64 / 7.0).sqrt() / 250.0;
        assert_abs_diff_eq!(metric.precision().unwrap(), expected, epsilon = 1e-12);

        // kept unless reinit is requested
        metric.init(&array![[0.0], [100.0]], false);
        assert_abs_diff_eq!(metric.precision().unwrap(), expected, epsilon = 1e-12);

        let predictions = targets.mapv(|t| t + expected / 2.0);
        assert_eq!(metric.calculate(&predictions, &targets).unwrap(), 1.0);
    }

    #[test]
    fn test_regression_requires_init() {
        let metric = AccuracyMetric::new(Accuracy::Regression);
        assert!(metric.compare(&array![[1.0]], &array![[1.0]]).is_err());
    }

    #[test]
    fn test_accumulated_accuracy() {
        let mut metric = AccuracyMetric::new(Accuracy::Binary);
        metric.calculate(&array![[1.0]], &array![[1.0]]).unwrap();
        metric.calculate(&array![[0.0], [0.0], [1.0]], &array![[1.0], [1.0], [1.0]]).unwrap();
        assert_eq!(metric.accumulated_accuracy(), 0.5);
        metric.reset_accumulated();
        assert_eq!(metric.accumulated_accuracy(), 0.0);
    }
}
