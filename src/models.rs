use crate::config::TrainConfig;
use crate::core::layers::{Convolution, Dense, Dropout, MaxPooling};
use crate::prelude::*;
use std::fs::File;
use std::io::{Read, Write};
use tracing::{debug, info, warn};

/// Inputs with their targets; row `i` of both belongs to sample `i`.
#[derive(Debug, Clone)]
pub struct ModelData {
    pub inputs: Array2<f64>,
    pub targets: Array2<f64>,
}

impl ModelData {
    pub fn new(inputs: Array2<f64>, targets: Array2<f64>) -> Result<Self> {
        if inputs.nrows() != targets.nrows() {
            return Err(NNError::InvalidTargetShape(format!(
                "{} input rows but {} target rows",
                inputs.nrows(),
                targets.nrows()
            )));
        }
        Ok(Self { inputs, targets })
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows `[step * batch_size, min((step + 1) * batch_size, len))`.
    pub fn batch(&self, step: usize, batch_size: usize) -> (Array2<f64>, Array2<f64>) {
        let start = (step * batch_size).min(self.len());
        let end = ((step + 1) * batch_size).min(self.len());
        (
            self.inputs.slice(s![start..end, ..]).to_owned(),
            self.targets.slice(s![start..end, ..]).to_owned(),
        )
    }
}

/// Number of steps and rows per step; no batch size means one full batch.
fn batch_plan(samples: usize, batch_size: Option<usize>) -> (usize, usize) {
    if samples == 0 {
        warn!("no samples to iterate over");
        return (0, 0);
    }
    match batch_size {
        Some(size) if size > 0 && size < samples => (samples.div_ceil(size), size),
        _ => (1, samples),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub data_loss: f64,
    pub regularization_loss: f64,
    pub accuracy: f64,
    pub learning_rate: f64,
    pub validation: Option<Evaluation>,
}

impl EpochStats {
    pub fn loss(&self) -> f64 {
        self.data_loss + self.regularization_loss
    }
}

struct StepStats {
    data_loss: f64,
    regularization_loss: f64,
    accuracy: f64,
}

fn forward_layers(layers: &mut [Layer], inputs: &Array2<f64>, training: bool) -> Result<()> {
    let mut iter = layers.iter_mut();
    let first = iter.next().ok_or(NNError::EmptyModel)?;
    first.forward(inputs, training)?;
    let mut prev: &Layer = first;
    for layer in iter {
        layer.forward(prev.output(), training)?;
        prev = layer;
    }
    Ok(())
}

fn backward_layers(layers: &mut [Layer], dvalues: &Array2<f64>) -> Result<()> {
    let mut iter = layers.iter_mut().rev();
    let Some(last) = iter.next() else {
        return Ok(());
    };
    last.backward(dvalues)?;
    let mut next: &Layer = last;
    for layer in iter {
        layer.backward(next.dinputs())?;
        next = layer;
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Sequential {
    pub layers: Vec<Layer>,
    pub loss: Option<Criterion>,
    pub optimizer: Option<Optimizer>,
    pub accuracy: Option<AccuracyMetric>,
}

impl Sequential {
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(NNError::EmptyModel);
        }
        Ok(Self {
            layers,
            loss: None,
            optimizer: None,
            accuracy: None,
        })
    }

    pub fn builder() -> SequentialBuilder {
        SequentialBuilder::default()
    }

    pub fn set(&mut self, loss: Loss, optimizer: Optimizer, accuracy: Accuracy) {
        self.loss = Some(Criterion::new(loss));
        self.optimizer = Some(optimizer);
        self.accuracy = Some(AccuracyMetric::new(accuracy));
    }

    /// Checks that the layers chain and that the loss fits the output layer.
    pub fn finalize(&self) -> Result<()> {
        let last = self.layers.last().ok_or(NNError::EmptyModel)?;

        if let Some(criterion) = &self.loss {
            if criterion.loss == Loss::SoftmaxCategoricalCrossentropy && !matches!(last, Layer::Softmax(_)) {
                return Err(NNError::InvalidConfig(format!(
                    "{} needs a Softmax output layer, found {}",
                    criterion.name(),
                    last.name()
                )));
            }
        }

        let mut width: Option<usize> = None;
        for (i, layer) in self.layers.iter().enumerate() {
            let expected = match layer {
                Layer::Dense(dense) => Some(dense.input_size()),
                Layer::Convolution(conv) => Some(conv.input_shape.total_size()),
                Layer::MaxPooling(pool) => Some(pool.input_shape.total_size()),
                _ => None,
            };
            if let (Some(have), Some(want)) = (width, expected) {
                if have != want {
                    return Err(NNError::LayerShapeMismatch(format!(
                        "layer {} ({}) expects {} inputs, previous layers produce {}",
                        i,
                        layer.name(),
                        want,
                        have
                    )));
                }
            }
            if let Some(size) = layer.output_size() {
                width = Some(size);
            }
        }
        Ok(())
    }

    /// Runs every layer; returns the output of the last one.
    pub fn forward(&mut self, x: &Array2<f64>, training: bool) -> Result<&Array2<f64>> {
        forward_layers(&mut self.layers, x, training)?;
        self.output()
    }

    pub fn output(&self) -> Result<&Array2<f64>> {
        Ok(self.layers.last().ok_or(NNError::EmptyModel)?.output())
    }

    /// Backpropagates the loss of the last forward pass. With the fused
    /// softmax loss the trailing Softmax layer is skipped.
    pub fn backward(&mut self, targets: &Array2<f64>) -> Result<()> {
        let criterion = self.loss.as_mut().ok_or(NNError::LossNotSet)?;
        let last = self.layers.last().ok_or(NNError::EmptyModel)?;
        criterion.backward(last.output(), targets)?;

        let end = if criterion.loss == Loss::SoftmaxCategoricalCrossentropy {
            self.layers.len() - 1
        } else {
            self.layers.len()
        };
        backward_layers(&mut self.layers[..end], criterion.dinputs())
    }

    fn train_step(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<StepStats> {
        let Self {
            layers,
            loss,
            optimizer,
            accuracy,
        } = self;
        let criterion = loss.as_mut().ok_or(NNError::LossNotSet)?;
        let optimizer = optimizer.as_mut().ok_or(NNError::OptimizerNotSet)?;
        let metric = accuracy.as_mut().ok_or(NNError::AccuracyNotSet)?;

        forward_layers(layers, x, true)?;
        let last = layers.last().ok_or(NNError::EmptyModel)?;
        let data_loss = criterion.calculate(last.output(), y)?;
        let regularization_loss = criterion.regularization_loss(layers);
        let predictions = last.predictions(last.output());
        let accuracy = metric.calculate(&predictions, y)?;

        criterion.backward(last.output(), y)?;
        let end = if criterion.loss == Loss::SoftmaxCategoricalCrossentropy {
            layers.len() - 1
        } else {
            layers.len()
        };
        backward_layers(&mut layers[..end], criterion.dinputs())?;

        optimizer.pre_update();
        for layer in layers.iter_mut() {
            if let Some(trainable) = layer.trainable_mut() {
                optimizer.update_params(trainable)?;
            }
        }
        optimizer.post_update();

        Ok(StepStats {
            data_loss,
            regularization_loss,
            accuracy,
        })
    }

    pub fn train(
        &mut self,
        data: &ModelData,
        config: &TrainConfig,
        validation: Option<&ModelData>,
    ) -> Result<Vec<EpochStats>> {
        config.validate()?;
        self.finalize()?;
        if self.optimizer.is_none() {
            return Err(NNError::OptimizerNotSet);
        }
        if self.loss.is_none() {
            return Err(NNError::LossNotSet);
        }
        self.accuracy
            .as_mut()
            .ok_or(NNError::AccuracyNotSet)?
            .init(&data.targets, true);

        let (steps, batch_size) = batch_plan(data.len(), config.batch_size);
        let mut history = Vec::with_capacity(config.epochs);

        for epoch in 1..=config.epochs {
            if let (Some(criterion), Some(metric)) = (self.loss.as_mut(), self.accuracy.as_mut()) {
                criterion.reset_accumulated();
                metric.reset_accumulated();
            }

            for step in 0..steps {
                let (x, y) = data.batch(step, batch_size);
                let stats = self.train_step(&x, &y)?;
                if step % config.print_every == 0 || step + 1 == steps {
                    info!(
                        epoch,
                        step,
                        accuracy = stats.accuracy,
                        loss = stats.data_loss + stats.regularization_loss,
                        data_loss = stats.data_loss,
                        reg_loss = stats.regularization_loss,
                        "training step"
                    );
                }
            }

            let (data_loss, regularization_loss, accuracy, learning_rate) =
                match (&self.loss, &self.accuracy, &self.optimizer) {
                    (Some(criterion), Some(metric), Some(optimizer)) => (
                        criterion.accumulated_loss(),
                        criterion.regularization_loss(&self.layers),
                        metric.accumulated_accuracy(),
                        optimizer.current_learning_rate(),
                    ),
                    _ => return Err(NNError::LossNotSet),
                };

            let validation = match validation {
                Some(validation) => Some(self.evaluate(validation, config.batch_size)?),
                None => None,
            };

            let stats = EpochStats {
                epoch,
                data_loss,
                regularization_loss,
                accuracy,
                learning_rate,
                validation,
            };
            if epoch % config.print_every == 0 || epoch == config.epochs {
                info!(
                    epoch,
                    accuracy = stats.accuracy,
                    loss = stats.loss(),
                    data_loss,
                    reg_loss = regularization_loss,
                    lr = learning_rate,
                    "epoch finished"
                );
                if let Some(evaluation) = validation {
                    info!(
                        epoch,
                        accuracy = evaluation.accuracy,
                        loss = evaluation.loss,
                        "validation"
                    );
                }
            }
            history.push(stats);
        }

        Ok(history)
    }

    /// Inference-mode pass over `data`; loss and accuracy are averaged over
    /// every sample, not just the last batch.
    pub fn evaluate(&mut self, data: &ModelData, batch_size: Option<usize>) -> Result<Evaluation> {
        let Self {
            layers,
            loss,
            accuracy,
            ..
        } = self;
        let criterion = loss.as_mut().ok_or(NNError::LossNotSet)?;
        let metric = accuracy.as_mut().ok_or(NNError::AccuracyNotSet)?;
        metric.init(&data.targets, false);

        criterion.reset_accumulated();
        metric.reset_accumulated();

        let (steps, batch_size) = batch_plan(data.len(), batch_size);
        for step in 0..steps {
            let (x, y) = data.batch(step, batch_size);
            forward_layers(layers, &x, false)?;
            let last = layers.last().ok_or(NNError::EmptyModel)?;
            criterion.calculate(last.output(), &y)?;
            metric.calculate(&last.predictions(last.output()), &y)?;
        }

        Ok(Evaluation {
            loss: criterion.accumulated_loss(),
            accuracy: metric.accumulated_accuracy(),
        })
    }

    /// Raw outputs of the last layer for every row of `x`.
    pub fn predict(&mut self, x: &Array2<f64>, batch_size: Option<usize>) -> Result<Array2<f64>> {
        let (steps, batch_size) = batch_plan(x.nrows(), batch_size);
        let mut outputs = Vec::with_capacity(steps);
        for step in 0..steps {
            let start = step * batch_size;
            let end = ((step + 1) * batch_size).min(x.nrows());
            let batch = x.slice(s![start..end, ..]).to_owned();
            outputs.push(self.forward(&batch, false)?.clone());
        }
        if outputs.is_empty() {
            return Ok(Array2::zeros((0, 0)));
        }
        let views: Vec<ArrayView2<f64>> = outputs.iter().map(|o| o.view()).collect();
        Ok(ndarray::concatenate(Axis(0), &views)?)
    }

    /// Class indices, labels or values depending on the output activation.
    pub fn predict_classes(&mut self, x: &Array2<f64>, batch_size: Option<usize>) -> Result<Array2<f64>> {
        let outputs = self.predict(x, batch_size)?;
        let last = self.layers.last().ok_or(NNError::EmptyModel)?;
        Ok(last.predictions(&outputs))
    }

    pub fn count_parameters(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    pub fn summary(&self) -> String {
        let mut res = "\nModel Sequential\n".to_string();
        res.push_str("-------------------------------------------------------------\n");
        res.push_str("Layer (Type)\t\t Output shape\t\t No.of params\n");
        let mut width: Option<usize> = None;
        for layer in self.layers.iter() {
            if let Some(size) = layer.output_size() {
                width = Some(size);
            }
            let shape = match width {
                Some(w) => format!("(None, {})", w),
                None => "(None, ?)".to_string(),
            };
            res.push_str(&format!(
                "{:<16}\t {:<16}\t {}\n",
                layer.name(),
                shape,
                layer.parameter_count()
            ));
        }
        res.push_str("-------------------------------------------------------------\n");
        res.push_str(&format!("Total params: {}\n", self.count_parameters()));
        res.push_str(&format!(
            "Trainable layers: {}\n",
            self.layers.iter().filter(|l| l.is_trainable()).count()
        ));
        if let Some(criterion) = &self.loss {
            res.push_str(&format!("Loss: {}\n", criterion.name()));
        }
        if let Some(optimizer) = &self.optimizer {
            res.push_str(&format!(
                "Optimizer: {} (lr {})\n",
                optimizer.name(),
                optimizer.learning_rate
            ));
        }
        info!("{}", res);
        res
    }

    /// Stores layers, parameters, optimizer state and settings.
    pub fn save(&self, path: &str) -> Result<()> {
        let encoded: Vec<u8> = bincode::serialize(self)?;
        File::create(path)?.write_all(&encoded)?;
        info!(path, bytes = encoded.len(), "model saved");
        Ok(())
    }

    pub fn load(path: &str) -> Result<Sequential> {
        let mut buffer = Vec::new();
        File::open(path)?.read_to_end(&mut buffer)?;
        let model: Sequential = bincode::deserialize(&buffer)?;
        model.finalize()?;
        info!(path, layers = model.layers.len(), "model loaded");
        Ok(model)
    }
}

#[derive(Debug, Default)]
pub struct SequentialBuilder {
    layers: Vec<Layer>,
    loss: Option<Loss>,
    optimizer: Option<Optimizer>,
    accuracy: Option<Accuracy>,
}

impl SequentialBuilder {
    pub fn add(mut self, layer: impl Into<Layer>) -> Self {
        let layer = layer.into();
        debug!(layer = layer.name(), position = self.layers.len(), "layer added");
        self.layers.push(layer);
        self
    }

    pub fn activation(self, activation: Activation) -> Self {
        self.add(activation.into_layer())
    }

    /// Dense layer followed by its activation.
    pub fn add_dense(self, inputs: usize, neurons: usize, activation: Activation) -> Result<Self> {
        Ok(self.add(Dense::new(inputs, neurons)?).activation(activation))
    }

    /// Sets the penalties of the most recently added Dense layer.
    pub fn regularize(mut self, l1: Regularizer, l2: Regularizer) -> Result<Self> {
        let dense = self
            .layers
            .iter_mut()
            .rev()
            .find_map(|layer| match layer {
                Layer::Dense(dense) => Some(dense),
                _ => None,
            })
            .ok_or_else(|| {
                NNError::InvalidLayerConfiguration("no Dense layer to regularize".to_string())
            })?;
        dense.l1 = l1;
        dense.l2 = l2;
        Ok(self)
    }

    pub fn add_convolution(
        self,
        input_shape: InputShape,
        depth: usize,
        kernel_size: usize,
        activation: Activation,
    ) -> Result<Self> {
        Ok(self
            .add(Convolution::new(input_shape, depth, kernel_size)?)
            .activation(activation))
    }

    pub fn add_max_pooling(self, input_shape: InputShape, pool_size: usize) -> Result<Self> {
        Ok(self.add(MaxPooling::new(input_shape, pool_size)?))
    }

    pub fn add_dropout(self, rate: f64) -> Result<Self> {
        Ok(self.add(Dropout::new(rate)?))
    }

    pub fn loss(mut self, loss: Loss) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn build(self) -> Result<Sequential> {
        let mut model = Sequential::new(self.layers)?;
        model.loss = self.loss.map(Criterion::new);
        model.optimizer = self.optimizer;
        model.accuracy = self.accuracy.map(AccuracyMetric::new);
        model.finalize()?;
        Ok(model)
    }
}
