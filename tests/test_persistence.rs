// Save/load round trips through bincode.

use neuralcore::config::TrainConfig;
use neuralcore::core::layers::{Convolution, Dense};
use neuralcore::datasets::sine_data;
use neuralcore::prelude::*;

#[test]
fn test_dense_parameters_round_trip_exactly() {
    let dense = Dense::new(5, 7).unwrap().with_regularization(
        Regularizer::new(1e-4, 0.0),
        Regularizer::new(5e-4, 5e-4),
    );
    let encoded = bincode::serialize(&dense).unwrap();
    let decoded: Dense = bincode::deserialize(&encoded).unwrap();

    assert_eq!(decoded.weights, dense.weights);
    assert_eq!(decoded.biases, dense.biases);
    assert_eq!(decoded.l1, dense.l1);
    assert_eq!(decoded.l2, dense.l2);
}

#[test]
fn test_convolution_round_trip() {
    let conv = Convolution::new(InputShape::new(2, 5, 5), 3, 2).unwrap();
    let encoded = bincode::serialize(&conv).unwrap();
    let decoded: Convolution = bincode::deserialize(&encoded).unwrap();

    assert_eq!(decoded.kernels, conv.kernels);
    assert_eq!(decoded.biases, conv.biases);
    assert_eq!(decoded.output_shape, conv.output_shape);
}

#[test]
fn test_trained_model_save_and_load() {
    let data = sine_data(64).unwrap();
    let mut model = Sequential::builder()
        .add_dense(1, 8, Activation::Relu)
        .unwrap()
        .add_dense(8, 1, Activation::Linear)
        .unwrap()
        .loss(Loss::MeanSquaredError)
        .optimizer(Optimizer::adam(0.01, 1e-3, 1e-7, 0.9, 0.999).unwrap())
        .accuracy(Accuracy::Regression)
        .build()
        .unwrap();
    let config = TrainConfig {
        epochs: 5,
        batch_size: Some(16),
        print_every: 5,
    };
    model.train(&data, &config, None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sine.model");
    let path = path.to_str().unwrap();
    model.save(path).unwrap();
    let mut restored = Sequential::load(path).unwrap();

    assert_eq!(restored.layers.len(), model.layers.len());
    let (original, loaded) = (model.optimizer.as_ref().unwrap(), restored.optimizer.as_ref().unwrap());
    assert_eq!(loaded.iterations(), original.iterations());
    assert_eq!(loaded.current_learning_rate(), original.current_learning_rate());

    let (Layer::Dense(a), Layer::Dense(b)) = (&model.layers[0], &restored.layers[0]) else {
        panic!("expected Dense layers");
    };
    assert_eq!(a.weights, b.weights);
    assert_eq!(a.weight_state, b.weight_state);
    assert!(b.weight_state.cache.is_some());

    let expected = model.predict(&data.inputs, None).unwrap();
    let got = restored.predict(&data.inputs, None).unwrap();
    assert_eq!(expected, got);

    // training continues from the restored optimizer state
    restored.train(&data, &config, None).unwrap();
    assert_eq!(restored.optimizer.as_ref().unwrap().iterations(), 40);
}

#[test]
fn test_load_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.model");
    std::fs::write(&path, [0xff_u8; 16]).unwrap();
    let result = Sequential::load(path.to_str().unwrap());
    assert!(matches!(
        result,
        Err(NNError::SerializationError(_)) | Err(NNError::EmptyModel)
    ));
}

#[test]
fn test_load_missing_file() {
    let result = Sequential::load("./definitely/not/here.model");
    assert!(matches!(result, Err(NNError::IoError(_))));
}
