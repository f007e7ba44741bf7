#[allow(unused)]
use crate::prelude::*;
use crate::core::layers::{Layer, LayerTrait};
use crate::utils::argmax_rows;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Softmax,
}

impl Activation {
    pub fn into_layer(self) -> Layer {
        match self {
            Self::Linear => Layer::Linear(Linear::default()),
            Self::Relu => Layer::Relu(Relu::default()),
            Self::Sigmoid => Layer::Sigmoid(Sigmoid::default()),
            Self::Softmax => Layer::Softmax(Softmax::default()),
        }
    }
}

/// Row-wise argmax as an `n × 1` column of class indices.
fn argmax_column(outputs: &Array2<f64>) -> Array2<f64> {
    let indices = argmax_rows(outputs).mapv(|i| i as f64);
    indices.insert_axis(Axis(1))
}

fn check_backward(name: &str, cached: &Array2<f64>, dvalues: &Array2<f64>) -> Result<()> {
    if cached.dim() != dvalues.dim() {
        return Err(NNError::LayerShapeMismatch(format!(
            "{} backward got dvalues {:?}, forward produced {:?}",
            name,
            dvalues.dim(),
            cached.dim()
        )));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Relu {
    #[serde(skip)]
    inputs: Array2<f64>,
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

impl Relu {
    pub fn predictions(&self, outputs: &Array2<f64>) -> Array2<f64> {
        argmax_column(outputs)
    }
}

impl LayerTrait for Relu {
    fn name(&self) -> &'static str {
        "ReLU"
    }

    fn forward(&mut self, inputs: &Array2<f64>, _training: bool) -> Result<()> {
        self.inputs = inputs.to_owned();
        self.output = inputs.mapv(|x| x.max(0.0));
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        check_backward(self.name(), &self.inputs, dvalues)?;
        let mut dinputs = dvalues.to_owned();
        Zip::from(&mut dinputs)
            .and(&self.inputs)
            .for_each(|d, &x| {
                if x <= 0.0 {
                    *d = 0.0;
                }
            });
        self.dinputs = dinputs;
        Ok(())
    }

    fn output(&self) -> &Array2<f64> {
        &self.output
    }

    fn dinputs(&self) -> &Array2<f64> {
        &self.dinputs
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Sigmoid {
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

impl Sigmoid {
    /// Thresholds at 0.5 into `{0, 1}`.
    pub fn predictions(&self, outputs: &Array2<f64>) -> Array2<f64> {
        outputs.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 })
    }
}

impl LayerTrait for Sigmoid {
    fn name(&self) -> &'static str {
        "Sigmoid"
    }

    fn forward(&mut self, inputs: &Array2<f64>, _training: bool) -> Result<()> {
        self.output = inputs.mapv(|z| 1.0 / (1.0 + (-z).exp()));
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        check_backward(self.name(), &self.output, dvalues)?;
        self.dinputs = Zip::from(dvalues)
            .and(&self.output)
            .map_collect(|&d, &s| d * s * (1.0 - s));
        Ok(())
    }

    fn output(&self) -> &Array2<f64> {
        &self.output
    }

    fn dinputs(&self) -> &Array2<f64> {
        &self.dinputs
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Softmax {
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

impl Softmax {
    pub fn predictions(&self, outputs: &Array2<f64>) -> Array2<f64> {
        argmax_column(outputs)
    }

    /// Gradient wrt inputs through the per-sample Jacobian
    /// `diag(s) - s·sᵀ`.
    fn jacobian_backward(output: &Array2<f64>, dvalues: &Array2<f64>) -> Array2<f64> {
        let mut dinputs = Array2::zeros(dvalues.raw_dim());
        for ((s, d), mut row) in output
            .outer_iter()
            .zip(dvalues.outer_iter())
            .zip(dinputs.outer_iter_mut())
        {
            let column = s.to_owned().insert_axis(Axis(1));
            let jacobian = Array2::from_diag(&s) - column.dot(&column.t());
            row.assign(&jacobian.dot(&d));
        }
        dinputs
    }

    /// Row-wise softmax with the row max subtracted first.
    pub fn softmax(inputs: &Array2<f64>) -> Array2<f64> {
        let mut output = inputs.to_owned();
        for mut row in output.outer_iter_mut() {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }
        output
    }
}

impl LayerTrait for Softmax {
    fn name(&self) -> &'static str {
        "Softmax"
    }

    fn forward(&mut self, inputs: &Array2<f64>, _training: bool) -> Result<()> {
        self.output = Self::softmax(inputs);
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        check_backward(self.name(), &self.output, dvalues)?;
        self.dinputs = Self::jacobian_backward(&self.output, dvalues);
        Ok(())
    }

    fn output(&self) -> &Array2<f64> {
        &self.output
    }

    fn dinputs(&self) -> &Array2<f64> {
        &self.dinputs
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Linear {
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

impl Linear {
    pub fn predictions(&self, outputs: &Array2<f64>) -> Array2<f64> {
        outputs.clone()
    }
}

impl LayerTrait for Linear {
    fn name(&self) -> &'static str {
        "Linear"
    }

    fn forward(&mut self, inputs: &Array2<f64>, _training: bool) -> Result<()> {
        self.output = inputs.to_owned();
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        check_backward(self.name(), &self.output, dvalues)?;
        self.dinputs = dvalues.to_owned();
        Ok(())
    }

    fn output(&self) -> &Array2<f64> {
        &self.output
    }

    fn dinputs(&self) -> &Array2<f64> {
        &self.dinputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_relu() {
        let mut relu = Relu::default();
        relu.forward(&array![[-1.0, 0.0, 2.0]], true).unwrap();
        assert_eq!(relu.output(), &array![[0.0, 0.0, 2.0]]);

        relu.backward(&array![[5.0, 5.0, 5.0]]).unwrap();
        assert_eq!(relu.dinputs(), &array![[0.0, 0.0, 5.0]]);
        assert_eq!(relu.predictions(&array![[0.0, 3.0, 1.0]]), array![[1.0]]);
    }

    #[test]
    fn test_sigmoid() {
        let mut sigmoid = Sigmoid::default();
        sigmoid.forward(&array![[0.0]], true).unwrap();
        assert_abs_diff_eq!(sigmoid.output()[[0, 0]], 0.5, epsilon = 1e-12);

        sigmoid.backward(&array![[1.0]]).unwrap();
        assert_abs_diff_eq!(sigmoid.dinputs()[[0, 0]], 0.25, epsilon = 1e-12);
        assert_eq!(sigmoid.predictions(&array![[0.2, 0.7]]), array![[0.0, 1.0]]);
    }

    #[test]
    fn test_softmax_uniform_row() {
        let mut softmax = Softmax::default();
        softmax.forward(&array![[1.0, 1.0, 1.0]], true).unwrap();
        for p in softmax.output().iter() {
            assert_abs_diff_eq!(*p, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let out = Softmax::softmax(&array![[1.0, 2.0, 3.0], [-5.0, 0.0, 700.0]]);
        for row in out.outer_iter() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|p| p.is_finite()));
        }
    }

    #[test]
    fn test_softmax_shift_invariant() {
        let a = Softmax::softmax(&array![[1.0, 2.0, 3.0]]);
        let b = Softmax::softmax(&array![[101.0, 102.0, 103.0]]);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_softmax_backward_matches_finite_difference() {
        let inputs = array![[0.3, -1.2, 0.8]];
        let dvalues = array![[1.0, -2.0, 0.5]];
        let mut softmax = Softmax::default();
        softmax.forward(&inputs, true).unwrap();
        softmax.backward(&dvalues).unwrap();

        let h = 1e-6;
        for j in 0..3 {
            let mut plus = inputs.clone();
            let mut minus = inputs.clone();
            plus[[0, j]] += h;
            minus[[0, j]] -= h;
            let f = |x: &Array2<f64>| (Softmax::softmax(x) * &dvalues).sum();
            let numeric = (f(&plus) - f(&minus)) / (2.0 * h);
            assert_abs_diff_eq!(softmax.dinputs()[[0, j]], numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_linear_identity() {
        let mut linear = Linear::default();
        linear.forward(&array![[1.5, -2.0]], false).unwrap();
        assert_eq!(linear.output(), &array![[1.5, -2.0]]);
        linear.backward(&array![[0.1, 0.2]]).unwrap();
        assert_eq!(linear.dinputs(), &array![[0.1, 0.2]]);
    }

    #[test]
    fn test_backward_shape_mismatch() {
        let mut sigmoid = Sigmoid::default();
        sigmoid.forward(&array![[0.0, 1.0]], true).unwrap();
        assert!(sigmoid.backward(&array![[1.0]]).is_err());
    }
}
