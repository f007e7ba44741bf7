pub mod convolution;
pub mod dense;
pub mod dropout;
pub mod input;
pub mod max_pooling;
pub mod shape;

pub use convolution::Convolution;
pub use dense::Dense;
pub use dropout::Dropout;
pub use input::InputLayer;
pub use max_pooling::MaxPooling;
pub use shape::InputShape;

use crate::core::activations::{Linear, Relu, Sigmoid, Softmax};
use crate::core::optimizers::Optimization;
use crate::prelude::*;

/// Penalty strengths for one regularization norm.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Regularizer {
    pub weight: f64,
    pub bias: f64,
}

impl Regularizer {
    pub fn new(weight: f64, bias: f64) -> Self {
        Self { weight, bias }
    }
}

/// Shared interface of layers and activations.
///
/// `forward` and `backward` keep their results inside the layer; read them
/// back with `output` and `dinputs`.
pub trait LayerTrait {
    fn name(&self) -> &'static str;

    /// `training` only toggles stochastic behavior such as dropout.
    fn forward(&mut self, inputs: &Array2<f64>, training: bool) -> Result<()>;

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()>;

    fn output(&self) -> &Array2<f64>;

    fn dinputs(&self) -> &Array2<f64>;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Layer {
    Input(InputLayer),
    Dense(Dense),
    Convolution(Convolution),
    MaxPooling(MaxPooling),
    Dropout(Dropout),
    Relu(Relu),
    Sigmoid(Sigmoid),
    Softmax(Softmax),
    Linear(Linear),
}

macro_rules! dispatch {
    ($layer:expr, $inner:ident => $body:expr) => {
        match $layer {
            Layer::Input($inner) => $body,
            Layer::Dense($inner) => $body,
            Layer::Convolution($inner) => $body,
            Layer::MaxPooling($inner) => $body,
            Layer::Dropout($inner) => $body,
            Layer::Relu($inner) => $body,
            Layer::Sigmoid($inner) => $body,
            Layer::Softmax($inner) => $body,
            Layer::Linear($inner) => $body,
        }
    };
}

impl LayerTrait for Layer {
    fn name(&self) -> &'static str {
        dispatch!(self, l => l.name())
    }

    fn forward(&mut self, inputs: &Array2<f64>, training: bool) -> Result<()> {
        dispatch!(self, l => l.forward(inputs, training))
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        dispatch!(self, l => l.backward(dvalues))
    }

    fn output(&self) -> &Array2<f64> {
        dispatch!(self, l => l.output())
    }

    fn dinputs(&self) -> &Array2<f64> {
        dispatch!(self, l => l.dinputs())
    }
}

impl Layer {
    /// Layers the optimizer updates.
    pub fn trainable_mut(&mut self) -> Option<&mut dyn Optimization> {
        match self {
            Layer::Dense(l) => Some(l as &mut dyn Optimization),
            Layer::Convolution(l) => Some(l as &mut dyn Optimization),
            _ => None,
        }
    }

    pub fn is_trainable(&self) -> bool {
        matches!(self, Layer::Dense(_) | Layer::Convolution(_))
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            Layer::Dense(l) => l.parameter_count(),
            Layer::Convolution(l) => l.parameter_count(),
            _ => 0,
        }
    }

    pub fn regularization_loss(&self) -> f64 {
        match self {
            Layer::Dense(l) => l.regularization_loss(),
            _ => 0.0,
        }
    }

    /// Features per sample this layer emits, when fixed by its parameters.
    pub fn output_size(&self) -> Option<usize> {
        match self {
            Layer::Dense(l) => Some(l.neurons()),
            Layer::Convolution(l) => Some(l.output_shape.total_size()),
            Layer::MaxPooling(l) => Some(l.output_shape.total_size()),
            _ => None,
        }
    }

    /// Turns raw outputs into class indices, binary labels or values.
    /// Non-activation layers pass their outputs through.
    pub fn predictions(&self, outputs: &Array2<f64>) -> Array2<f64> {
        match self {
            Layer::Relu(l) => l.predictions(outputs),
            Layer::Sigmoid(l) => l.predictions(outputs),
            Layer::Softmax(l) => l.predictions(outputs),
            Layer::Linear(l) => l.predictions(outputs),
            _ => outputs.clone(),
        }
    }
}

impl From<Dense> for Layer {
    fn from(layer: Dense) -> Self {
        Layer::Dense(layer)
    }
}

impl From<Convolution> for Layer {
    fn from(layer: Convolution) -> Self {
        Layer::Convolution(layer)
    }
}

impl From<MaxPooling> for Layer {
    fn from(layer: MaxPooling) -> Self {
        Layer::MaxPooling(layer)
    }
}

impl From<Dropout> for Layer {
    fn from(layer: Dropout) -> Self {
        Layer::Dropout(layer)
    }
}

impl From<InputLayer> for Layer {
    fn from(layer: InputLayer) -> Self {
        Layer::Input(layer)
    }
}
