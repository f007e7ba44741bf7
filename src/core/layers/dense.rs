use crate::core::layers::{LayerTrait, Regularizer};
use crate::core::optimizers::{Optimization, Param, ParamState};
use crate::prelude::*;
use crate::rand_array;

/// Fully-connected layer: `output = inputs · weights + biases`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dense {
    /// inputs × neurons; each column holds the weights of one neuron
    pub weights: Array2<f64>,
    /// 1 × neurons
    pub biases: Array2<f64>,
    pub l1: Regularizer,
    pub l2: Regularizer,
    #[serde(default)]
    pub weight_state: ParamState,
    #[serde(default)]
    pub bias_state: ParamState,

    #[serde(skip)]
    pub dweights: Array2<f64>,
    #[serde(skip)]
    pub dbiases: Array2<f64>,
    #[serde(skip)]
    inputs: Array2<f64>,
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

impl Dense {
    pub fn new(inputs: usize, neurons: usize) -> Result<Self> {
        if inputs == 0 || neurons == 0 {
            return Err(NNError::InvalidLayerConfiguration(
                "Layer dimensions must be greater than 0".to_string(),
            ));
        }
        Self::from_params(rand_array!(inputs, neurons), Array2::zeros((1, neurons)))
    }

    /// Builds a layer around existing parameters, e.g. restored ones.
    pub fn from_params(weights: Array2<f64>, biases: Array2<f64>) -> Result<Self> {
        if biases.nrows() != 1 || biases.ncols() != weights.ncols() {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "biases {:?} do not match weights {:?}",
                biases.dim(),
                weights.dim()
            )));
        }
        Ok(Self {
            weights,
            biases,
            l1: Regularizer::default(),
            l2: Regularizer::default(),
            weight_state: ParamState::default(),
            bias_state: ParamState::default(),
            dweights: Array2::zeros((0, 0)),
            dbiases: Array2::zeros((0, 0)),
            inputs: Array2::zeros((0, 0)),
            output: Array2::zeros((0, 0)),
            dinputs: Array2::zeros((0, 0)),
        })
    }

    pub fn with_regularization(mut self, l1: Regularizer, l2: Regularizer) -> Self {
        self.l1 = l1;
        self.l2 = l2;
        self
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn neurons(&self) -> usize {
        self.weights.ncols()
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// L1/L2 penalty of this layer's current parameters.
    pub fn regularization_loss(&self) -> f64 {
        let mut value = 0.0;
        if self.l1.weight > 0.0 {
            value += self.l1.weight * self.weights.mapv(f64::abs).sum();
        }
        if self.l1.bias > 0.0 {
            value += self.l1.bias * self.biases.mapv(f64::abs).sum();
        }
        if self.l2.weight > 0.0 {
            value += self.l2.weight * self.weights.mapv(|w| w * w).sum();
        }
        if self.l2.bias > 0.0 {
            value += self.l2.bias * self.biases.mapv(|b| b * b).sum();
        }
        value
    }
}

/// Gradient of `strength·Σ|p|`; zero counts as positive.
fn l1_gradient(param: &Array2<f64>, strength: f64) -> Array2<f64> {
    param.mapv(|p| if p >= 0.0 { strength } else { -strength })
}

impl LayerTrait for Dense {
    fn name(&self) -> &'static str {
        "Dense"
    }

    fn forward(&mut self, inputs: &Array2<f64>, _training: bool) -> Result<()> {
        if inputs.ncols() != self.weights.nrows() {
            return Err(NNError::LayerShapeMismatch(format!(
                "Dense expects {} input features, got {:?}",
                self.weights.nrows(),
                inputs.dim()
            )));
        }
        self.inputs = inputs.to_owned();
        self.output = inputs.dot(&self.weights) + &self.biases;
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        if dvalues.nrows() != self.inputs.nrows() || dvalues.ncols() != self.weights.ncols() {
            return Err(NNError::LayerShapeMismatch(format!(
                "Dense backward got dvalues {:?}, forward produced {:?}",
                dvalues.dim(),
                (self.inputs.nrows(), self.weights.ncols())
            )));
        }

        let mut dbiases = dvalues.sum_axis(Axis(0)).insert_axis(Axis(0));
        let mut dweights = self.inputs.t().dot(dvalues);

        if self.l1.weight > 0.0 {
            dweights += &l1_gradient(&self.weights, self.l1.weight);
        }
        if self.l1.bias > 0.0 {
            dbiases += &l1_gradient(&self.biases, self.l1.bias);
        }
        if self.l2.weight > 0.0 {
            dweights.scaled_add(2.0 * self.l2.weight, &self.weights);
        }
        if self.l2.bias > 0.0 {
            dbiases.scaled_add(2.0 * self.l2.bias, &self.biases);
        }

        self.dinputs = dvalues.dot(&self.weights.t());
        self.dweights = dweights;
        self.dbiases = dbiases;
        Ok(())
    }

    fn output(&self) -> &Array2<f64> {
        &self.output
    }

    fn dinputs(&self) -> &Array2<f64> {
        &self.dinputs
    }
}

impl Optimization for Dense {
    fn params(&mut self) -> Result<Vec<Param<'_>>> {
        Ok(vec![
            Param {
                value: &mut self.weights,
                gradient: &self.dweights,
                state: &mut self.weight_state,
            },
            Param {
                value: &mut self.biases,
                gradient: &self.dbiases,
                state: &mut self.bias_state,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> Dense {
        Dense::from_params(
            array![[1.0, -2.0, 0.5], [0.0, 3.0, -1.0]],
            array![[0.1, 0.2, 0.3]],
        )
        .unwrap()
    }

    #[test]
    fn test_forward_broadcasts_biases() {
        let mut dense = layer();
        dense.forward(&array![[1.0, 1.0], [2.0, 0.0]], true).unwrap();
        let expected = array![[1.1, 1.2, -0.2], [2.1, -3.8, 1.3]];
        for (got, want) in dense.output().iter().zip(expected.iter()) {
            approx::assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_forward_caches_a_copy() {
        let mut dense = layer();
        let mut inputs = array![[1.0, 1.0]];
        dense.forward(&inputs, true).unwrap();
        inputs[[0, 0]] = 100.0;
        dense.backward(&array![[1.0, 0.0, 0.0]]).unwrap();
        assert_eq!(dense.dweights[[0, 0]], 1.0);
    }

    #[test]
    fn test_backward_gradients() {
        let mut dense = layer();
        let inputs = array![[1.0, 2.0], [3.0, 4.0]];
        let dvalues = array![[1.0, 0.0, 2.0], [0.5, 1.0, 0.0]];
        dense.forward(&inputs, true).unwrap();
        dense.backward(&dvalues).unwrap();

        assert_eq!(dense.dbiases, array![[1.5, 1.0, 2.0]]);
        assert_eq!(dense.dweights, inputs.t().dot(&dvalues));
        assert_eq!(dense.dinputs(), &dvalues.dot(&dense.weights.t()));
    }

    #[test]
    fn test_regularization_gradients() {
        let mut dense = layer().with_regularization(
            Regularizer::new(0.1, 0.0),
            Regularizer::new(0.0, 0.5),
        );
        let inputs = Array2::<f64>::zeros((1, 2));
        dense.forward(&inputs, true).unwrap();
        dense.backward(&Array2::zeros((1, 3))).unwrap();

        // zero weight is treated as positive
        assert_eq!(dense.dweights, array![[0.1, -0.1, 0.1], [0.1, 0.1, -0.1]]);
        assert_eq!(dense.dbiases, array![[0.1, 0.2, 0.3]]);
    }

    #[test]
    fn test_regularization_loss() {
        let dense = layer().with_regularization(
            Regularizer::new(1.0, 0.0),
            Regularizer::new(0.0, 2.0),
        );
        let expected = 7.5 + 2.0 * (0.01 + 0.04 + 0.09);
        assert!((dense.regularization_loss() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let mut dense = layer();
        assert!(dense.forward(&Array2::zeros((2, 3)), true).is_err());
        dense.forward(&Array2::zeros((2, 2)), true).unwrap();
        assert!(dense.backward(&Array2::zeros((2, 2))).is_err());
    }

    #[test]
    fn test_zero_sized_layer_rejected() {
        assert!(Dense::new(0, 3).is_err());
    }
}
