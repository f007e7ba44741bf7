pub use serde::{Deserialize, Serialize};

pub use ndarray::{array, s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, Zip};
pub use ndarray_rand::rand_distr::{StandardNormal, Uniform};
pub use ndarray_rand::RandomExt;

pub use crate::error::*;
pub use crate::models::{ModelData, Sequential};

// Internal re-exports
pub use crate::core::{
    Accuracy,
    AccuracyMetric,
    Activation,
    Criterion,
    InputShape,
    Layer,
    LayerTrait,
    Loss,
    Optimization,
    Optimizer,
    OptimizerType,
    ParamState,
    Regularizer,
};
