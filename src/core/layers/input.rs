use crate::core::layers::LayerTrait;
use crate::prelude::*;

/// Entry point of a model; forwards its inputs unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct InputLayer {
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

impl LayerTrait for InputLayer {
    fn name(&self) -> &'static str {
        "Input"
    }

    fn forward(&mut self, inputs: &Array2<f64>, _training: bool) -> Result<()> {
        self.output = inputs.to_owned();
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
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
