/// Running sum/count pair used to report epoch-level loss and accuracy
/// instead of the last batch only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    sum: f64,
    count: u64,
}

impl Accumulator {
    pub fn add(&mut self, sum: f64, count: u64) {
        self.sum += sum;
        self.count += count;
    }

    /// Mean of everything added since the last reset; `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_spans_batches() {
        let mut acc = Accumulator::default();
        acc.add(3.0, 2);
        acc.add(1.0, 2);
        assert_eq!(acc.mean(), 1.0);

        acc.reset();
        assert_eq!(acc, Accumulator::default());
        assert_eq!(acc.mean(), 0.0);
    }
}
