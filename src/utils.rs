#[allow(unused)]
use crate::prelude::*;

/// Uniform weights in [-0.01, 0.01).
#[macro_export]
macro_rules! rand_array {
    ($($x:expr),*) => {
        {
            Array2::random(($($x,)*), Uniform::new(-0.01, 0.01))
        }
    };
}

/// Column index of the largest value in every row; the first one wins on ties.
pub fn argmax_rows(values: &Array2<f64>) -> Array1<usize> {
    values
        .outer_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(best, max), (i, &v)| {
                    if v > max { (i, v) } else { (best, max) }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_rows() {
        let values = array![[0.1, 0.7, 0.2], [0.5, 0.5, 0.0], [-1.0, -2.0, -0.5]];
        assert_eq!(argmax_rows(&values).to_vec(), vec![1, 0, 2]);
    }

    #[test]
    fn test_rand_array_range() {
        let values = rand_array!(4, 5);
        assert_eq!(values.dim(), (4, 5));
        assert!(values.iter().all(|v: &f64| v.abs() <= 0.01));
    }
}
