use neuralcore::config::{load_config, TrainConfig};
use neuralcore::core::output::write_history_csv;
use neuralcore::datasets::spiral_data;
use neuralcore::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // optional JSON config path as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path)?,
        None => TrainConfig {
            epochs: 1000,
            batch_size: Some(128),
            print_every: 100,
        },
    };

    let train = spiral_data(1000, 3)?;
    let test = spiral_data(100, 3)?;

    let mut model = Sequential::builder()
        .add_dense(2, 64, Activation::Relu)?
        .regularize(Regularizer::new(0.0, 0.0), Regularizer::new(5e-4, 5e-4))?
        .add_dropout(0.1)?
        .add_dense(64, 3, Activation::Softmax)?
        .loss(Loss::SoftmaxCategoricalCrossentropy)
        .optimizer(Optimizer::adam(0.05, 5e-5, 1e-7, 0.9, 0.999)?)
        .accuracy(Accuracy::Categorical)
        .build()?;

    model.summary();

    let history = model.train(&train, &config, Some(&test))?;
    write_history_csv(&history, "./spiral_history.csv")?;

    let evaluation = model.evaluate(&test, None)?;
    println!(
        "\nvalidation, acc: {:.3}, loss: {:.3}\n",
        evaluation.accuracy, evaluation.loss
    );

    model.save("./spiral.model")?;
    let mut restored = Sequential::load("./spiral.model")?;
    let classes = restored.predict_classes(&test.inputs.slice(s![..5, ..]).to_owned(), None)?;
    println!("first predictions: {}", classes.t());

    Ok(())
}
