use thiserror::Error;

#[derive(Debug, Error)]
pub enum NNError {
    // Model related errors
    #[error("Invalid layer configuration: {0}")]
    InvalidLayerConfiguration(String),
    #[error("Layer shape mismatch: {0}")]
    LayerShapeMismatch(String),
    #[error("Model has no layers")]
    EmptyModel,

    // Training related errors
    #[error("Invalid target shape: {0}")]
    InvalidTargetShape(String),
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    // Optimizer related errors
    #[error("Optimizer not set. Call set() or the builder's optimizer() before training")]
    OptimizerNotSet,
    #[error("Invalid optimizer configuration: {0}")]
    InvalidOptimizer(String),

    // Loss / accuracy related errors
    #[error("Loss function not set. Call set() or the builder's loss() before training")]
    LossNotSet,
    #[error("Accuracy metric not set. Call set() or the builder's accuracy() before training")]
    AccuracyNotSet,

    // File operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] Box<bincode::ErrorKind>),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, NNError>;
