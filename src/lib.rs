pub mod config;
pub mod core;
pub mod datasets;
pub mod error;
pub mod models;
pub mod prelude;
pub mod utils;

// Re-export types
pub use crate::core::{Activation, Criterion, Layer, LayerTrait, Loss, Optimizer};
pub use crate::error::{NNError, Result};
pub use crate::models::Sequential;
