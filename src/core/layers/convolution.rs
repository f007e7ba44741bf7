use rayon::prelude::*;

use crate::core::layers::{InputShape, LayerTrait};
use crate::core::ops::{convolve2d_full, correlate2d_valid};
use crate::core::optimizers::{Optimization, Param, ParamState};
use crate::prelude::*;

const INIT_SCALE: f64 = 0.01;

/// Stride-1, unpadded convolution over `(depth, height, width)` samples.
///
/// Kernel gradients are summed over the batch during `backward`, so one
/// optimizer step per batch applies them, the same way `Dense` works.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Convolution {
    pub input_shape: InputShape,
    pub output_shape: InputShape,
    pub kernel_size: usize,
    /// `kernels[output_depth][input_depth]`, each `kernel_size × kernel_size`
    pub kernels: Vec<Vec<Array2<f64>>>,
    /// one matrix per output depth, sized to the output spatial extent
    pub biases: Vec<Array2<f64>>,
    #[serde(default)]
    pub kernel_states: Vec<Vec<ParamState>>,
    #[serde(default)]
    pub bias_states: Vec<ParamState>,

    #[serde(skip)]
    pub dkernels: Vec<Vec<Array2<f64>>>,
    #[serde(skip)]
    pub dbiases: Vec<Array2<f64>>,
    #[serde(skip)]
    inputs: Array2<f64>,
    #[serde(skip)]
    output: Array2<f64>,
    #[serde(skip)]
    dinputs: Array2<f64>,
}

/// Gradients produced by one sample; summed across the batch afterwards.
struct SampleGradients {
    dinputs: Vec<f64>,
    dkernels: Vec<Vec<Array2<f64>>>,
    dbiases: Vec<Array2<f64>>,
}

impl Convolution {
    pub fn new(input_shape: InputShape, depth: usize, kernel_size: usize) -> Result<Self> {
        if depth == 0 || input_shape.depths == 0 {
            return Err(NNError::InvalidLayerConfiguration(
                "Convolution needs at least one input and one output depth".to_string(),
            ));
        }
        if kernel_size == 0 || kernel_size > input_shape.height || kernel_size > input_shape.width {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "kernel size {} does not fit input shape {:?}",
                kernel_size, input_shape
            )));
        }

        let output_shape = InputShape::new(
            depth,
            input_shape.height - kernel_size + 1,
            input_shape.width - kernel_size + 1,
        );
        let kernels = (0..depth)
            .map(|_| {
                (0..input_shape.depths)
                    .map(|_| Array2::random((kernel_size, kernel_size), StandardNormal) * INIT_SCALE)
                    .collect()
            })
            .collect();
        let biases = (0..depth)
            .map(|_| {
                Array2::random((output_shape.height, output_shape.width), StandardNormal) * INIT_SCALE
            })
            .collect();

        tracing::debug!(?input_shape, ?output_shape, kernel_size, "convolution layer created");
        Self::from_params(input_shape, kernel_size, kernels, biases)
    }

    /// Builds a layer around existing kernels and biases, validating their shapes.
    pub fn from_params(
        input_shape: InputShape,
        kernel_size: usize,
        kernels: Vec<Vec<Array2<f64>>>,
        biases: Vec<Array2<f64>>,
    ) -> Result<Self> {
        if kernel_size == 0 || kernel_size > input_shape.height || kernel_size > input_shape.width {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "kernel size {} does not fit input shape {:?}",
                kernel_size, input_shape
            )));
        }
        let output_shape = InputShape::new(
            kernels.len(),
            input_shape.height - kernel_size + 1,
            input_shape.width - kernel_size + 1,
        );
        let kernels_ok = !kernels.is_empty()
            && kernels.iter().all(|per_input| {
                per_input.len() == input_shape.depths
                    && per_input.iter().all(|k| k.dim() == (kernel_size, kernel_size))
            });
        let biases_ok = biases.len() == kernels.len()
            && biases
                .iter()
                .all(|b| b.dim() == (output_shape.height, output_shape.width));
        if !kernels_ok || !biases_ok {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "kernels/biases do not match input shape {:?} and kernel size {}",
                input_shape, kernel_size
            )));
        }

        let depth = kernels.len();
        Ok(Self {
            input_shape,
            output_shape,
            kernel_size,
            kernels,
            biases,
            kernel_states: vec![vec![ParamState::default(); input_shape.depths]; depth],
            bias_states: vec![ParamState::default(); depth],
            dkernels: Vec::new(),
            dbiases: Vec::new(),
            inputs: Array2::zeros((0, 0)),
            output: Array2::zeros((0, 0)),
            dinputs: Array2::zeros((0, 0)),
        })
    }

    pub fn depth(&self) -> usize {
        self.output_shape.depths
    }

    pub fn parameter_count(&self) -> usize {
        let kernels: usize = self.kernels.iter().flatten().map(|k| k.len()).sum();
        let biases: usize = self.biases.iter().map(|b| b.len()).sum();
        kernels + biases
    }

    fn forward_sample(&self, row: ArrayView1<f64>) -> Result<Vec<f64>> {
        let volume = self.input_shape.unpack(row)?;
        let mut result = Vec::with_capacity(self.output_shape.total_size());

        for (kernels, bias) in self.kernels.iter().zip(self.biases.iter()) {
            // per-sample local accumulator; nothing shared between threads
            let mut channel = bias.clone();
            for (slice, kernel) in volume.outer_iter().zip(kernels.iter()) {
                channel += &correlate2d_valid(slice, kernel.view())?;
            }
            result.extend(channel.iter().copied());
        }
        Ok(result)
    }

    fn backward_sample(&self, input: ArrayView1<f64>, dvalues: ArrayView1<f64>) -> Result<SampleGradients> {
        let volume = self.input_shape.unpack(input)?;
        let dvolume = self.output_shape.unpack(dvalues)?;

        let mut dinputs = Array3::<f64>::zeros((
            self.input_shape.depths,
            self.input_shape.height,
            self.input_shape.width,
        ));
        let mut dkernels = Vec::with_capacity(self.kernels.len());
        let mut dbiases = Vec::with_capacity(self.kernels.len());

        for (kernels, dchannel) in self.kernels.iter().zip(dvolume.outer_iter()) {
            let mut per_input = Vec::with_capacity(kernels.len());
            for ((kernel, slice), mut dslice) in kernels
                .iter()
                .zip(volume.outer_iter())
                .zip(dinputs.outer_iter_mut())
            {
                per_input.push(correlate2d_valid(slice, dchannel)?);
                dslice += &convolve2d_full(dchannel, kernel.view())?;
            }
            dkernels.push(per_input);
            dbiases.push(dchannel.to_owned());
        }

        Ok(SampleGradients {
            dinputs: dinputs.iter().copied().collect(),
            dkernels,
            dbiases,
        })
    }
}

impl LayerTrait for Convolution {
    fn name(&self) -> &'static str {
        "Convolution"
    }

    fn forward(&mut self, inputs: &Array2<f64>, _training: bool) -> Result<()> {
        if inputs.ncols() != self.input_shape.total_size() {
            return Err(NNError::LayerShapeMismatch(format!(
                "Convolution expects {} values per sample ({:?}), got {:?}",
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

        let output = Array2::from_shape_vec(
            (inputs.nrows(), self.output_shape.total_size()),
            rows.concat(),
        )?;
        self.inputs = inputs.to_owned();
        self.output = output;
        Ok(())
    }

    fn backward(&mut self, dvalues: &Array2<f64>) -> Result<()> {
        if dvalues.nrows() != self.inputs.nrows() || dvalues.ncols() != self.output_shape.total_size() {
            return Err(NNError::LayerShapeMismatch(format!(
                "Convolution backward got dvalues {:?}, forward produced {:?}",
                dvalues.dim(),
                (self.inputs.nrows(), self.output_shape.total_size())
            )));
        }

        let this = &*self;
        let samples = (0..dvalues.nrows())
            .into_par_iter()
            .map(|k| this.backward_sample(this.inputs.row(k), dvalues.row(k)))
            .collect::<Result<Vec<_>>>()?;

        let mut dkernels: Vec<Vec<Array2<f64>>> = self
            .kernels
            .iter()
            .map(|per_input| per_input.iter().map(|k| Array2::zeros(k.raw_dim())).collect())
            .collect();
        let mut dbiases: Vec<Array2<f64>> =
            self.biases.iter().map(|b| Array2::zeros(b.raw_dim())).collect();
        let mut rows = Vec::with_capacity(samples.len() * self.input_shape.total_size());

        for sample in samples {
            for (total, part) in dkernels.iter_mut().flatten().zip(sample.dkernels.iter().flatten()) {
                *total += part;
            }
            for (total, part) in dbiases.iter_mut().zip(sample.dbiases.iter()) {
                *total += part;
            }
            rows.extend(sample.dinputs);
        }

        self.dinputs =
            Array2::from_shape_vec((dvalues.nrows(), self.input_shape.total_size()), rows)?;
        self.dkernels = dkernels;
        self.dbiases = dbiases;
        Ok(())
    }

    fn output(&self) -> &Array2<f64> {
        &self.output
    }

    fn dinputs(&self) -> &Array2<f64> {
        &self.dinputs
    }
}

impl Optimization for Convolution {
    fn params(&mut self) -> Result<Vec<Param<'_>>> {
        let matching = self.dkernels.len() == self.kernels.len()
            && self.dbiases.len() == self.biases.len()
            && self.kernels.iter().zip(&self.dkernels).all(|(k, dk)| k.len() == dk.len());
        if !matching {
            return Err(NNError::LayerShapeMismatch(format!(
                "convolution has {} kernel gradient sets for {} kernels; run backward first",
                self.dkernels.len(),
                self.kernels.len()
            )));
        }

        let mut params = Vec::new();
        for ((kernels, dkernels), states) in self
            .kernels
            .iter_mut()
            .zip(self.dkernels.iter())
            .zip(self.kernel_states.iter_mut())
        {
            for ((value, gradient), state) in kernels.iter_mut().zip(dkernels.iter()).zip(states.iter_mut()) {
                params.push(Param { value, gradient, state });
            }
        }
        for ((value, gradient), state) in self
            .biases
            .iter_mut()
            .zip(self.dbiases.iter())
            .zip(self.bias_states.iter_mut())
        {
            params.push(Param { value, gradient, state });
        }
        Ok(params)
    }
}
