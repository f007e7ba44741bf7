use crate::core::accumulator::Accumulator;
use crate::core::layers::Layer;
use crate::prelude::*;
use crate::utils::argmax_rows;

const CLIP_MIN: f64 = 1e-7;
const CLIP_MAX: f64 = 1.0 - 1e-7;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    /// targets: class-index column or one-hot rows
    CategoricalCrossentropy,
    /// CCE fused with a trailing softmax; backward skips the Jacobian
    SoftmaxCategoricalCrossentropy,
    /// targets: same shape as predictions, values in `{0, 1}`
    BinaryCrossentropy,
    MeanSquaredError,
    MeanAbsoluteError,
}

impl Loss {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CategoricalCrossentropy => "CategoricalCrossentropy",
            Self::SoftmaxCategoricalCrossentropy => "SoftmaxCategoricalCrossentropy",
            Self::BinaryCrossentropy => "BinaryCrossentropy",
            Self::MeanSquaredError => "MeanSquaredError",
            Self::MeanAbsoluteError => "MeanAbsoluteError",
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            Self::CategoricalCrossentropy | Self::SoftmaxCategoricalCrossentropy
        )
    }
}

/// A loss function together with its gradient buffer and the running
/// epoch statistics.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Criterion {
    pub loss: Loss,
    #[serde(skip)]
    dinputs: Array2<f64>,
    #[serde(skip)]
    accumulated: Accumulator,
}

fn clip(p: f64) -> f64 {
    p.clamp(CLIP_MIN, CLIP_MAX)
}

/// Class index per sample, from an index column or one-hot rows.
fn class_indices(predictions: &Array2<f64>, targets: &Array2<f64>) -> Result<Vec<usize>> {
    let classes = predictions.ncols();
    if targets.nrows() != predictions.nrows() {
        return Err(NNError::InvalidTargetShape(format!(
            "{} targets for {} predictions",
            targets.nrows(),
            predictions.nrows()
        )));
    }
    if targets.ncols() == 1 && classes != 1 {
        return targets
            .iter()
            .map(|&t| {
                if t < 0.0 || t.fract() != 0.0 || t as usize >= classes {
                    Err(NNError::InvalidTargetShape(format!(
                        "class index {} outside 0..{}",
                        t, classes
                    )))
                } else {
                    Ok(t as usize)
                }
            })
            .collect();
    }
    if targets.ncols() == classes {
        return Ok(argmax_rows(targets).to_vec());
    }
    Err(NNError::InvalidTargetShape(format!(
        "targets {:?} are neither class indices nor one-hot for predictions {:?}",
        targets.dim(),
        predictions.dim()
    )))
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

impl Criterion {
    pub fn new(loss: Loss) -> Self {
        Self {
            loss,
            dinputs: Array2::zeros((0, 0)),
            accumulated: Accumulator::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.loss.name()
    }

    /// Per-sample data loss.
    pub fn forward(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Result<Array1<f64>> {
        match self.loss {
            Loss::CategoricalCrossentropy | Loss::SoftmaxCategoricalCrossentropy => {
                let indices = class_indices(predictions, targets)?;
                Ok(indices
                    .iter()
                    .enumerate()
                    .map(|(i, &class)| -clip(predictions[[i, class]]).ln())
                    .collect())
            }
            Loss::BinaryCrossentropy => {
                check_same_shape(predictions, targets)?;
                let losses = Zip::from(predictions).and(targets).map_collect(|&p, &y| {
                    let p = clip(p);
                    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                });
                Ok(row_means(&losses))
            }
            Loss::MeanSquaredError => {
                check_same_shape(predictions, targets)?;
                let losses = Zip::from(predictions)
                    .and(targets)
                    .map_collect(|&p, &y| (y - p) * (y - p));
                Ok(row_means(&losses))
            }
            Loss::MeanAbsoluteError => {
                check_same_shape(predictions, targets)?;
                let losses = Zip::from(predictions)
                    .and(targets)
                    .map_collect(|&p, &y| (y - p).abs());
                Ok(row_means(&losses))
            }
        }
    }

    /// Mean data loss of the batch; also added to the epoch accumulator.
    pub fn calculate(&mut self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Result<f64> {
        let losses = self.forward(predictions, targets)?;
        let sum = losses.sum();
        let count = losses.len() as u64;
        self.accumulated.add(sum, count);
        Ok(if count == 0 { 0.0 } else { sum / count as f64 })
    }

    /// L1/L2 penalty summed over the given layers.
    pub fn regularization_loss(&self, layers: &[Layer]) -> f64 {
        layers.iter().map(Layer::regularization_loss).sum()
    }

    /// Gradient of the mean loss wrt `dvalues` (the predictions; for the
    /// fused variant, the softmax outputs).
    pub fn backward(&mut self, dvalues: &Array2<f64>, targets: &Array2<f64>) -> Result<()> {
        let samples = dvalues.nrows() as f64;
        let outputs = dvalues.ncols() as f64;

        self.dinputs = match self.loss {
            Loss::CategoricalCrossentropy => {
                let indices = class_indices(dvalues, targets)?;
                let mut dinputs = Array2::zeros(dvalues.raw_dim());
                for (i, &class) in indices.iter().enumerate() {
                    dinputs[[i, class]] = -1.0 / clip(dvalues[[i, class]]) / samples;
                }
                dinputs
            }
            Loss::SoftmaxCategoricalCrossentropy => {
                let indices = class_indices(dvalues, targets)?;
                let mut dinputs = dvalues.to_owned();
                for (i, &class) in indices.iter().enumerate() {
                    dinputs[[i, class]] -= 1.0;
                }
                dinputs / samples
            }
            Loss::BinaryCrossentropy => {
                check_same_shape(dvalues, targets)?;
                Zip::from(dvalues).and(targets).map_collect(|&p, &y| {
                    let p = clip(p);
                    -(y / p - (1.0 - y) / (1.0 - p)) / outputs / samples
                })
            }
            Loss::MeanSquaredError => {
                check_same_shape(dvalues, targets)?;
                Zip::from(dvalues)
                    .and(targets)
                    .map_collect(|&p, &y| -2.0 * (y - p) / outputs / samples)
            }
            Loss::MeanAbsoluteError => {
                check_same_shape(dvalues, targets)?;
                Zip::from(dvalues)
                    .and(targets)
                    .map_collect(|&p, &y| sign(p - y) / outputs / samples)
            }
        };
        Ok(())
    }

    pub fn dinputs(&self) -> &Array2<f64> {
        &self.dinputs
    }

    pub fn add_accumulated(&mut self, sum: f64, count: u64) {
        self.accumulated.add(sum, count);
    }

    pub fn accumulated_loss(&self) -> f64 {
        self.accumulated.mean()
    }

    pub fn reset_accumulated(&mut self) {
        self.accumulated.reset();
    }
}

fn row_means(values: &Array2<f64>) -> Array1<f64> {
    let cols = values.ncols().max(1) as f64;
    values.sum_axis(Axis(1)) / cols
}

/// `sign(0) = 0`, unlike `f64::signum`.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::activations::Softmax;
    use crate::core::layers::{Dense, LayerTrait, Regularizer};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_categorical_forward() {
        let criterion = Criterion::new(Loss::CategoricalCrossentropy);
        let predictions = array![[0.7, 0.2, 0.1], [0.1, 0.5, 0.4]];
        let losses = criterion.forward(&predictions, &array![[0.0], [1.0]]).unwrap();
        assert_abs_diff_eq!(losses[0], -(0.7f64).ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(losses[1], -(0.5f64).ln(), epsilon = 1e-12);

        // one-hot rows select the same classes
        let one_hot = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert_eq!(criterion.forward(&predictions, &one_hot).unwrap(), losses);
    }

    #[test]
    fn test_categorical_clips_zero_probability() {
        let criterion = Criterion::new(Loss::CategoricalCrossentropy);
        let losses = criterion.forward(&array![[0.0, 1.0]], &array![[0.0]]).unwrap();
        assert!(losses[0].is_finite());
        assert_abs_diff_eq!(losses[0], -(1e-7f64).ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_categorical_backward() {
        let mut criterion = Criterion::new(Loss::CategoricalCrossentropy);
        criterion
            .backward(&array![[0.5, 0.5], [0.25, 0.75]], &array![[0.0], [1.0]])
            .unwrap();
        let d = criterion.dinputs();
        assert_abs_diff_eq!(d[[0, 0]], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[[1, 1]], -2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(d[[0, 1]], 0.0);
        assert_eq!(d[[1, 0]], 0.0);
    }

    #[test]
    fn test_fused_matches_softmax_then_categorical() {
        let logits = array![[0.3, -1.2, 0.8], [2.0, 0.1, -0.5], [0.0, 0.0, 0.0]];
        let targets = array![[2.0], [0.0], [1.0]];

        let mut softmax = Softmax::default();
        softmax.forward(&logits, true).unwrap();

        let mut categorical = Criterion::new(Loss::CategoricalCrossentropy);
        categorical.backward(softmax.output(), &targets).unwrap();
        softmax.backward(categorical.dinputs()).unwrap();

        let mut fused = Criterion::new(Loss::SoftmaxCategoricalCrossentropy);
        fused.backward(softmax.output(), &targets).unwrap();

        for (a, b) in fused.dinputs().iter().zip(softmax.dinputs().iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_binary_crossentropy() {
        let mut criterion = Criterion::new(Loss::BinaryCrossentropy);
        let predictions = array![[0.8, 0.4]];
        let targets = array![[1.0, 0.0]];
        let losses = criterion.forward(&predictions, &targets).unwrap();
        let expected = (-(0.8f64).ln() - (0.6f64).ln()) / 2.0;
        assert_abs_diff_eq!(losses[0], expected, epsilon = 1e-12);

        criterion.backward(&predictions, &targets).unwrap();
        assert_abs_diff_eq!(criterion.dinputs()[[0, 0]], -1.0 / 0.8 / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(criterion.dinputs()[[0, 1]], 1.0 / 0.6 / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mean_squared_error() {
        let mut criterion = Criterion::new(Loss::MeanSquaredError);
        let predictions = array![[1.0, 2.0], [0.0, 0.0]];
        let targets = array![[0.0, 2.0], [2.0, 0.0]];
        assert_eq!(criterion.forward(&predictions, &targets).unwrap().to_vec(), vec![0.5, 2.0]);

        criterion.backward(&predictions, &targets).unwrap();
        assert_eq!(criterion.dinputs(), &array![[0.5, 0.0], [-1.0, 0.0]]);
    }

    #[test]
    fn test_mean_absolute_error_sign_of_zero() {
        let mut criterion = Criterion::new(Loss::MeanAbsoluteError);
        let predictions = array![[1.0, 3.0]];
        let targets = array![[1.0, 1.0]];
        assert_eq!(criterion.forward(&predictions, &targets).unwrap()[0], 1.0);

        criterion.backward(&predictions, &targets).unwrap();
        assert_eq!(criterion.dinputs(), &array![[0.0, 0.5]]);
    }

    #[test]
    fn test_accumulation_spans_batches() {
        let mut criterion = Criterion::new(Loss::MeanSquaredError);
        criterion.calculate(&array![[1.0]], &array![[0.0]]).unwrap();
        criterion
            .calculate(&array![[0.0], [0.0]], &array![[0.0], [0.0]])
            .unwrap();
        assert_abs_diff_eq!(criterion.accumulated_loss(), 1.0 / 3.0, epsilon = 1e-12);

        criterion.reset_accumulated();
        assert_eq!(criterion.accumulated_loss(), 0.0);
    }

    #[test]
    fn test_regularization_loss_over_layers() {
        let dense = Dense::from_params(array![[1.0, -1.0]], array![[0.5, 0.5]])
            .unwrap()
            .with_regularization(Regularizer::new(0.1, 0.0), Regularizer::new(0.0, 1.0));
        let layers = vec![Layer::Dense(dense), Layer::Relu(Default::default())];
        let criterion = Criterion::new(Loss::MeanSquaredError);
        assert_abs_diff_eq!(criterion.regularization_loss(&layers), 0.2 + 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_target_shape_errors() {
        let criterion = Criterion::new(Loss::CategoricalCrossentropy);
        assert!(criterion.forward(&array![[0.5, 0.5]], &array![[2.0]]).is_err());
        assert!(criterion.forward(&array![[0.5, 0.5]], &array![[0.0], [1.0]]).is_err());

        let mse = Criterion::new(Loss::MeanSquaredError);
        assert!(mse.forward(&array![[0.5, 0.5]], &array![[0.5]]).is_err());
    }
}
