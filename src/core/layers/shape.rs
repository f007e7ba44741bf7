use crate::prelude::*;

/// Logical `(depth, height, width)` volume packed row-major into one sample row.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub depths: usize,
    pub height: usize,
    pub width: usize,
}

impl InputShape {
    pub fn new(depths: usize, height: usize, width: usize) -> Self {
        Self { depths, height, width }
    }

    pub fn total_size(&self) -> usize {
        self.depths * self.height * self.width
    }

    /// Reshapes one flat sample row into its `depths` 2-D slices.
    pub fn unpack(&self, row: ArrayView1<f64>) -> Result<Array3<f64>> {
        if row.len() != self.total_size() {
            return Err(NNError::LayerShapeMismatch(format!(
                "unexpected sample size {} for input shape {:?}",
                row.len(),
                self
            )));
        }
        Ok(row
            .to_owned()
            .into_shape_with_order((self.depths, self.height, self.width))?)
    }
}
