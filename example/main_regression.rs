use neuralcore::config::TrainConfig;
use neuralcore::datasets::sine_data;
use neuralcore::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let data = sine_data(1000)?;

    let mut model = Sequential::builder()
        .add_dense(1, 64, Activation::Relu)?
        .add_dense(64, 64, Activation::Relu)?
        .add_dense(64, 1, Activation::Linear)?
        .loss(Loss::MeanSquaredError)
        .optimizer(Optimizer::adam(0.005, 1e-3, 1e-7, 0.9, 0.999)?)
        .accuracy(Accuracy::Regression)
        .build()?;

    model.summary();

    let config = TrainConfig {
        epochs: 10000,
        batch_size: None,
        print_every: 500,
    };
    model.train(&data, &config, None)?;

    let x_test = array![[0.25], [0.5], [0.75]];
    let prediction = model.predict(&x_test, None)?;
    println!("sin(2πx) at 0.25, 0.5, 0.75: {}", prediction.t());

    Ok(())
}
