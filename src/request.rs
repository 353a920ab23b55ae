use tch::{kind::Kind, Device, Tensor};

use crate::{encoder::Image, error::Result};

/// Wraps an image as the `[1, N, N, C]` float tensor the classifier expects.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequestBuilder {
    device: Device,
}

impl Default for InferenceRequestBuilder {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
        }
    }
}

impl InferenceRequestBuilder {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    pub fn build(&self, image: &Image) -> Result<Tensor> {
        let n = image.size() as i64;
        let c = image.channels() as i64;
        let t = Tensor::f_from_slice(image.as_slice())?
            .f_reshape([1, n, n, c])?
            .f_to_device(self.device)?;
        Ok(t)
    }
}

/// Flattens a classifier output (any shape) into a score vector.
pub fn scores_from_tensor(output: &Tensor) -> Result<Vec<f32>> {
    let flat = output.f_to_kind(Kind::Float)?.f_flatten(0, -1)?;
    Ok(Vec::<f32>::try_from(&flat)?)
}
