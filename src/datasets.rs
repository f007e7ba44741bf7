//! Synthetic toy datasets for classification and regression demos.

use rand::{thread_rng, Rng};
use std::f64::consts::PI;

use crate::prelude::*;

/// `classes` interleaved spiral arms of `samples` points each, with class
/// indices as a single target column.
pub fn spiral_data(samples: usize, classes: usize) -> Result<ModelData> {
    spiral_data_using(samples, classes, &mut thread_rng())
}

pub fn spiral_data_using<R: Rng>(samples: usize, classes: usize, rng: &mut R) -> Result<ModelData> {
    if samples < 2 || classes == 0 {
        return Err(NNError::InvalidConfig(format!(
            "spiral data needs at least 2 samples and 1 class, got {} and {}",
            samples, classes
        )));
    }
    let mut x = Array2::<f64>::zeros((samples * classes, 2));
    let mut y = Array2::<f64>::zeros((samples * classes, 1));

    for class in 0..classes {
        for i in 0..samples {
            let radius = i as f64 / (samples - 1) as f64;
            let noise: f64 = rng.sample(StandardNormal);
            let theta = (class * 4) as f64 + i as f64 * 4.0 / samples as f64 + noise * 0.2;
            let row = class * samples + i;
            x[[row, 0]] = radius * (theta * 2.5).sin();
            x[[row, 1]] = radius * (theta * 2.5).cos();
            y[[row, 0]] = class as f64;
        }
    }
    ModelData::new(x, y)
}

/// Vertically separated point clouds, one per class.
pub fn vertical_data(samples: usize, classes: usize) -> Result<ModelData> {
    vertical_data_using(samples, classes, &mut thread_rng())
}

pub fn vertical_data_using<R: Rng>(samples: usize, classes: usize, rng: &mut R) -> Result<ModelData> {
    if samples == 0 || classes == 0 {
        return Err(NNError::InvalidConfig(
            "vertical data needs at least 1 sample and 1 class".to_string(),
        ));
    }
    let mut x = Array2::<f64>::zeros((samples * classes, 2));
    let mut y = Array2::<f64>::zeros((samples * classes, 1));

    for class in 0..classes {
        for i in 0..samples {
            let row = class * samples + i;
            let jitter_x = rng.gen_range(0..100) as f64 / 100.0;
            let jitter_y = rng.gen_range(0..100) as f64 / 100.0;
            x[[row, 0]] = jitter_x * 0.1 + class as f64 / 3.0;
            x[[row, 1]] = jitter_y * 0.1 + 0.5;
            y[[row, 0]] = class as f64;
        }
    }
    ModelData::new(x, y)
}

/// One period of `sin(2πx)` sampled at `x = i / samples`.
pub fn sine_data(samples: usize) -> Result<ModelData> {
    if samples == 0 {
        return Err(NNError::InvalidConfig("sine data needs at least 1 sample".to_string()));
    }
    let x = Array2::from_shape_fn((samples, 1), |(i, _)| i as f64 / samples as f64);
    let y = x.mapv(|v| (2.0 * PI * v).sin());
    ModelData::new(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_spiral_shapes_and_labels() {
        let data = spiral_data_using(50, 3, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(data.inputs.dim(), (150, 2));
        assert_eq!(data.targets.dim(), (150, 1));
        assert_eq!(data.targets[[0, 0]], 0.0);
        assert_eq!(data.targets[[149, 0]], 2.0);
        // radius grows from 0 to 1 along each arm
        assert_eq!(data.inputs.row(0).to_vec(), vec![0.0, 0.0]);
        assert!(data.inputs.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_vertical_clusters() {
        let data = vertical_data_using(20, 3, &mut StdRng::seed_from_u64(2)).unwrap();
        for (row, target) in data.inputs.outer_iter().zip(data.targets.iter()) {
            let base = target / 3.0;
            assert!(row[0] >= base && row[0] < base + 0.1);
            assert!(row[1] >= 0.5 && row[1] < 0.6);
        }
    }

    #[test]
    fn test_sine_data() {
        let data = sine_data(4).unwrap();
        assert_eq!(data.inputs.column(0).to_vec(), vec![0.0, 0.25, 0.5, 0.75]);
        approx::assert_abs_diff_eq!(data.targets[[1, 0]], 1.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(data.targets[[3, 0]], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(spiral_data(1, 3).is_err());
        assert!(vertical_data(0, 3).is_err());
        assert!(sine_data(0).is_err());
    }
}
