use crate::prelude::*;

/// Moving averages an optimizer keeps for one parameter matrix.
/// Both stay `None` until the first update touches them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ParamState {
    pub momentums: Option<Array2<f64>>,
    pub cache: Option<Array2<f64>>,
}

impl ParamState {
    fn momentums_like(&mut self, value: &Array2<f64>) -> &mut Array2<f64> {
        self.momentums
            .get_or_insert_with(|| Array2::zeros(value.raw_dim()))
    }

    fn cache_like(&mut self, value: &Array2<f64>) -> &mut Array2<f64> {
        self.cache.get_or_insert_with(|| Array2::zeros(value.raw_dim()))
    }
}

/// One trainable matrix with its latest gradient and optimizer state.
pub struct Param<'a> {
    pub value: &'a mut Array2<f64>,
    pub gradient: &'a Array2<f64>,
    pub state: &'a mut ParamState,
}

/// Implemented by layers that own trainable parameters.
pub trait Optimization {
    /// Errors when the gradients do not line up with the parameters,
    /// e.g. before the first `backward`.
    fn params(&mut self) -> Result<Vec<Param<'_>>>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum OptimizerType {
    Sgd { momentum: f64 },
    AdaGrad { epsilon: f64 },
    RmsProp { epsilon: f64, rho: f64 },
    Adam { epsilon: f64, beta1: f64, beta2: f64 },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Optimizer {
    pub optimizer_type: OptimizerType,
    pub learning_rate: f64,
    pub decay: f64,
    /// clamp bound applied to every gradient element before the update
    pub gradient_clip: Option<f64>,
    current_learning_rate: f64,
    iterations: u64,
}

impl Optimizer {
    pub fn new(optimizer_type: OptimizerType, learning_rate: f64, decay: f64) -> Result<Self> {
        if !(learning_rate > 0.0) || learning_rate.is_infinite() {
            return Err(NNError::InvalidOptimizer(format!(
                "learning rate must be positive, got {}",
                learning_rate
            )));
        }
        if !(decay >= 0.0) {
            return Err(NNError::InvalidOptimizer(format!(
                "decay must be non-negative, got {}",
                decay
            )));
        }
        let valid = match optimizer_type {
            OptimizerType::Sgd { momentum } => (0.0..1.0).contains(&momentum),
            OptimizerType::AdaGrad { epsilon } => epsilon > 0.0,
            OptimizerType::RmsProp { epsilon, rho } => epsilon > 0.0 && (0.0..1.0).contains(&rho),
            OptimizerType::Adam { epsilon, beta1, beta2 } => {
                epsilon > 0.0 && (0.0..1.0).contains(&beta1) && (0.0..1.0).contains(&beta2)
            }
        };
        if !valid {
            return Err(NNError::InvalidOptimizer(format!(
                "invalid hyper-parameters {:?}",
                optimizer_type
            )));
        }

        Ok(Self {
            optimizer_type,
            learning_rate,
            decay,
            gradient_clip: None,
            current_learning_rate: learning_rate,
            iterations: 0,
        })
    }

    pub fn sgd(learning_rate: f64, decay: f64, momentum: f64) -> Result<Self> {
        Self::new(OptimizerType::Sgd { momentum }, learning_rate, decay)
    }

    pub fn adagrad(learning_rate: f64, decay: f64, epsilon: f64) -> Result<Self> {
        Self::new(OptimizerType::AdaGrad { epsilon }, learning_rate, decay)
    }

    pub fn rmsprop(learning_rate: f64, decay: f64, epsilon: f64, rho: f64) -> Result<Self> {
        Self::new(OptimizerType::RmsProp { epsilon, rho }, learning_rate, decay)
    }

    pub fn adam(learning_rate: f64, decay: f64, epsilon: f64, beta1: f64, beta2: f64) -> Result<Self> {
        Self::new(
            OptimizerType::Adam { epsilon, beta1, beta2 },
            learning_rate,
            decay,
        )
    }

    pub fn with_gradient_clip(mut self, value: f64) -> Result<Self> {
        if !(value > 0.0) {
            return Err(NNError::InvalidOptimizer(format!(
                "gradient clip must be positive, got {}",
                value
            )));
        }
        self.gradient_clip = Some(value);
        Ok(self)
    }

    pub fn name(&self) -> &'static str {
        match self.optimizer_type {
            OptimizerType::Sgd { .. } => "SGD",
            OptimizerType::AdaGrad { .. } => "AdaGrad",
            OptimizerType::RmsProp { .. } => "RMSProp",
            OptimizerType::Adam { .. } => "Adam",
        }
    }

    pub fn current_learning_rate(&self) -> f64 {
        self.current_learning_rate
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Applies learning-rate decay: `lr / (1 + decay * iterations)`.
    pub fn pre_update(&mut self) {
        if self.decay > 0.0 {
            self.current_learning_rate =
                self.learning_rate / (1.0 + self.decay * self.iterations as f64);
        }
    }

    pub fn update_params(&self, layer: &mut dyn Optimization) -> Result<()> {
        for param in layer.params()? {
            self.update_param(param)?;
        }
        Ok(())
    }

    pub fn post_update(&mut self) {
        self.iterations += 1;
    }

    fn update_param(&self, param: Param<'_>) -> Result<()> {
        let Param { value, gradient, state } = param;
        if value.dim() != gradient.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "gradient {:?} does not match parameter {:?}",
                gradient.dim(),
                value.dim()
            )));
        }

        let clipped;
        let gradient = match self.gradient_clip {
            Some(bound) => {
                clipped = clip_gradients(gradient, bound);
                &clipped
            }
            None => gradient,
        };
        let lr = self.current_learning_rate;

        match self.optimizer_type {
            OptimizerType::Sgd { momentum } if momentum > 0.0 => {
                let velocity = state.momentums_like(value);
                Zip::from(&mut *velocity)
                    .and(gradient)
                    .for_each(|v, &g| *v = momentum * *v - lr * g);
                *value += &*velocity;
            }
            OptimizerType::Sgd { .. } => {
                value.scaled_add(-lr, gradient);
            }
            OptimizerType::AdaGrad { epsilon } => {
                let cache = state.cache_like(value);
                Zip::from(&mut *cache).and(gradient).for_each(|c, &g| *c += g * g);
                Zip::from(&mut *value)
                    .and(gradient)
                    .and(&*cache)
                    .for_each(|p, &g, &c| *p -= lr * g / (c.sqrt() + epsilon));
            }
            OptimizerType::RmsProp { epsilon, rho } => {
                let cache = state.cache_like(value);
                Zip::from(&mut *cache)
                    .and(gradient)
                    .for_each(|c, &g| *c = rho * *c + (1.0 - rho) * g * g);
                Zip::from(&mut *value)
                    .and(gradient)
                    .and(&*cache)
                    .for_each(|p, &g, &c| *p -= lr * g / (c.sqrt() + epsilon));
            }
            OptimizerType::Adam { epsilon, beta1, beta2 } => {
                let step = (self.iterations + 1) as f64;
                let momentum_correction = 1.0 - beta1.powf(step);
                let cache_correction = 1.0 - beta2.powf(step);

                Zip::from(state.momentums_like(value))
                    .and(gradient)
                    .for_each(|m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
                Zip::from(state.cache_like(value))
                    .and(gradient)
                    .for_each(|c, &g| *c = beta2 * *c + (1.0 - beta2) * g * g);

                let (Some(momentums), Some(cache)) = (&state.momentums, &state.cache) else {
                    return Ok(());
                };
                Zip::from(&mut *value)
                    .and(momentums)
                    .and(cache)
                    .for_each(|p, &m, &c| {
                        let m_hat = m / momentum_correction;
                        let c_hat = c / cache_correction;
                        *p -= lr * m_hat / (c_hat.sqrt() + epsilon);
                    });
            }
        }
        Ok(())
    }
}

fn clip_gradients(grad: &Array2<f64>, clip_value: f64) -> Array2<f64> {
    grad.mapv(|x| x.clamp(-clip_value, clip_value))
}
