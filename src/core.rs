// src/core.rs
pub mod accumulator;
pub mod accuracy;
pub mod activations;
pub mod layers;
pub mod losses;
pub mod ops;
pub mod optimizers;
pub mod output;

// Re-export commonly used items
pub use accumulator::Accumulator;
pub use accuracy::{Accuracy, AccuracyMetric};
pub use activations::{Activation, Linear, Relu, Sigmoid, Softmax};
pub use layers::{
    Convolution, Dense, Dropout, InputLayer, InputShape, Layer, LayerTrait, MaxPooling,
    Regularizer,
};
pub use losses::{Criterion, Loss};
pub use optimizers::{Optimization, Optimizer, OptimizerType, Param, ParamState};
