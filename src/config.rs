//! Training loop settings, loadable from JSON.
//!
//! ```json
//! { "epochs": 10001, "batch_size": 128, "print_every": 100 }
//! ```

use crate::prelude::*;
use std::fs;

fn default_print_every() -> usize {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainConfig {
    pub epochs: usize,
    /// `None` trains on the whole set as one batch
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// log cadence, in steps within an epoch and in epochs
    #[serde(default = "default_print_every")]
    pub print_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: None,
            print_every: default_print_every(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(NNError::InvalidConfig("epochs must be greater than 0".to_string()));
        }
        if self.batch_size == Some(0) {
            return Err(NNError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.print_every == 0 {
            return Err(NNError::InvalidConfig(
                "print_every must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads and validates a `TrainConfig` from the JSON file at `path`.
pub fn load_config(path: &str) -> Result<TrainConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
