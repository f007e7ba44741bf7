use rand::rngs::StdRng;
use rand::SeedableRng;
use ndarray_rand::rand_distr::Bernoulli;

use crate::core::layers::LayerTrait;
use crate::prelude::*;

/// Inverted dropout: kept units are scaled by `1 / (1 - rate)` during
/// training so inference needs no rescaling.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dropout {
    /// fraction of units dropped
    pub rate: f64,

    #[serde(skip)]
    rng: Option<StdRng>,
    #[serde(skip)]
    mask: Array2<f64>,
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

impl Dropout {
    pub fn new(rate: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "dropout rate must be in [0, 1), got {}",
                rate
            )));
        }
        Ok(Self {
            rate,
            rng: None,
            mask: Array2::zeros((0, 0)),
            output: Array2::zeros((0, 0)),
            dinputs: Array2::zeros((0, 0)),
        })
    }

    /// Reproducible masks.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    fn sample_mask(&mut self, shape: (usize, usize)) -> Result<Array2<f64>> {
        let keep = 1.0 - self.rate;
        let bernoulli = Bernoulli::new(keep).map_err(|e| {
            NNError::InvalidLayerConfiguration(format!("dropout rate {}: {}", self.rate, e))
        })?;
        let mask = match self.rng.as_mut() {
            Some(rng) => Array2::random_using(shape, bernoulli, rng),
            None => Array2::random(shape, bernoulli),
        };
        Ok(mask.mapv(|kept| if kept { 1.0 / keep } else { 0.0 }))
    }
}

impl LayerTrait for Dropout {
    fn name(&self) -> &'static str {
        "Dropout"
    }

    fn forward(&mut self, inputs: &Array2<f64>, training: bool) -> Result<()> {
        if !training {
            self.mask = Array2::ones(inputs.raw_dim());
            self.output = inputs.to_owned();
            return Ok(());
        }
        self.mask = self.sample_mask(inputs.dim())?;
        self.output = inputs * &self.mask;
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        if dvalues.dim() != self.mask.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "Dropout backward got dvalues {:?}, forward produced {:?}",
                dvalues.dim(),
                self.mask.dim()
            )));
        }
        self.dinputs = dvalues * &self.mask;
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

    #[test]
    fn test_inference_passes_through() {
        let mut dropout = Dropout::new(0.5).unwrap();
        let inputs = array![[1.0, 2.0], [3.0, 4.0]];
        dropout.forward(&inputs, false).unwrap();
        assert_eq!(dropout.output(), &inputs);
    }

    #[test]
    fn test_training_mask_scales_kept_units() {
        let mut dropout = Dropout::new(0.5).unwrap().with_seed(7);
        let inputs = Array2::<f64>::ones((20, 50));
        dropout.forward(&inputs, true).unwrap();

        assert!(dropout.output().iter().all(|&v| v == 0.0 || v == 2.0));
        let kept = dropout.output().iter().filter(|&&v| v == 2.0).count();
        assert!(kept > 350 && kept < 650, "kept {}", kept);

        dropout.backward(&Array2::ones((20, 50))).unwrap();
        assert_eq!(dropout.dinputs(), dropout.output());
    }

    #[test]
    fn test_seeded_masks_repeat() {
        let inputs = Array2::<f64>::ones((4, 8));
        let mut a = Dropout::new(0.3).unwrap().with_seed(42);
        let mut b = Dropout::new(0.3).unwrap().with_seed(42);
        a.forward(&inputs, true).unwrap();
        b.forward(&inputs, true).unwrap();
        assert_eq!(a.output(), b.output());
    }

    #[test]
    fn test_rate_out_of_range() {
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(-0.1).is_err());
    }
}
