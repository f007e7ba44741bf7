use rayon::prelude::*;

use crate::core::layers::{InputShape, LayerTrait};
use crate::prelude::*;

/// Non-overlapping `pool_size × pool_size` max pooling per depth slice.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MaxPooling {
    pub pool_size: usize,
    pub input_shape: InputShape,
    pub output_shape: InputShape,

    #[serde(skip)]
    inputs: Array2<f64>,
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

impl MaxPooling {
    /// Height and width must be multiples of `pool_size`.
    pub fn new(input_shape: InputShape, pool_size: usize) -> Result<Self> {
        if pool_size == 0 || input_shape.total_size() == 0 {
            return Err(NNError::InvalidLayerConfiguration(
                "MaxPooling needs a non-empty input and a pool size above 0".to_string(),
            ));
        }
        if input_shape.height % pool_size != 0 || input_shape.width % pool_size != 0 {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "input shape {:?} is not divisible by pool size {}",
                input_shape, pool_size
            )));
        }
        let output_shape = InputShape::new(
            input_shape.depths,
            input_shape.height / pool_size,
            input_shape.width / pool_size,
        );
        tracing::debug!(?input_shape, ?output_shape, pool_size, "max pooling layer created");

        Ok(Self {
            pool_size,
            input_shape,
            output_shape,
            inputs: Array2::zeros((0, 0)),
            output: Array2::zeros((0, 0)),
            dinputs: Array2::zeros((0, 0)),
        })
    }

    fn window<'a>(&self, slice: ArrayView2<'a, f64>, row: usize, col: usize) -> ArrayView2<'a, f64> {
        let p = self.pool_size;
        slice.slice_move(s![row * p..(row + 1) * p, col * p..(col + 1) * p])
    }

    fn forward_sample(&self, row: ArrayView1<f64>) -> Result<Vec<f64>> {
        let volume = self.input_shape.unpack(row)?;
        let mut result = Vec::with_capacity(self.output_shape.total_size());
        for slice in volume.outer_iter() {
            for i in 0..self.output_shape.height {
                for j in 0..self.output_shape.width {
                    let window = self.window(slice, i, j);
                    result.push(window.fold(f64::NEG_INFINITY, |m, &v| m.max(v)));
                }
            }
        }
        Ok(result)
    }

    fn backward_sample(&self, input: ArrayView1<f64>, dvalues: ArrayView1<f64>) -> Result<Vec<f64>> {
        let volume = self.input_shape.unpack(input)?;
        let dvolume = self.output_shape.unpack(dvalues)?;
        let mut dinputs = Array3::<f64>::zeros(volume.raw_dim());
        let p = self.pool_size;

        for ((slice, dslice), mut target) in volume
            .outer_iter()
            .zip(dvolume.outer_iter())
            .zip(dinputs.outer_iter_mut())
        {
            for i in 0..self.output_shape.height {
                for j in 0..self.output_shape.width {
                    let window = self.window(slice, i, j);
                    let max = window.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                    let gradient = dslice[[i, j]];
                    // every cell equal to the max receives the gradient
                    let mut dwindow = target.slice_mut(s![i * p..(i + 1) * p, j * p..(j + 1) * p]);
                    Zip::from(&mut dwindow).and(&window).for_each(|d, &v| {
                        if v == max {
                            *d = gradient;
                        }
                    });
                }
            }
        }
        Ok(dinputs.iter().copied().collect())
    }
}

impl LayerTrait for MaxPooling {
    fn name(&self) -> &'static str {
        "MaxPooling"
    }

    fn forward(&mut self, inputs: &Array2<f64>, _training: bool) -> Result<()> {
        if inputs.ncols() != self.input_shape.total_size() {
            return Err(NNError::LayerShapeMismatch(format!(
                "MaxPooling expects {} values per sample ({:?}), got {:?}",
                self.input_shape.total_size(),
                self.input_shape,
                inputs.dim()
            )));
        }

        let this = &*self;
        let rows = (0..inputs.nrows())
            .into_par_iter()
            .map(|k| this.forward_sample(inputs.row(k)))
            .collect::<Result<Vec<_>>>()?;

        self.output = Array2::from_shape_vec(
            (inputs.nrows(), self.output_shape.total_size()),
            rows.concat(),
        )?;
        self.inputs = inputs.to_owned();
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        if dvalues.nrows() != self.inputs.nrows() || dvalues.ncols() != self.output_shape.total_size() {
            return Err(NNError::LayerShapeMismatch(format!(
                "MaxPooling backward got dvalues {:?}, forward produced {:?}",
                dvalues.dim(),
                (self.inputs.nrows(), self.output_shape.total_size())
            )));
        }

        let this = &*self;
        let rows = (0..dvalues.nrows())
            .into_par_iter()
            .map(|k| this.backward_sample(this.inputs.row(k), dvalues.row(k)))
            .collect::<Result<Vec<_>>>()?;

        self.dinputs = Array2::from_shape_vec(
            (dvalues.nrows(), self.input_shape.total_size()),
            rows.concat(),
        )?;
        Ok(())
    }

    fn output(&self) -> &Array2<f64> {
        &self.output
    }

    fn dinputs(&self) -> &Array2<f64> {
        &self.dinputs
    }
}
