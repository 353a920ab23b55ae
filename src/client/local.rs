use std::{path::Path, sync::Arc};

use futures::future::BoxFuture;
use tch::{kind::Kind, CModule, Device, Tensor};

use super::InferenceClient;
use crate::error::{Error, Result};

/// Runs a TorchScript classifier in-process.
pub struct LocalClient {
    model: Arc<CModule>,
    device: Device,
    pub n_classes: i64,
}

impl LocalClient {
    pub fn load(model_path: impl AsRef<Path>, grid_size: usize, channels: usize) -> Result<Self> {
        let device = Device::Cpu;
        let model_path = model_path.as_ref();
        let model = CModule::load_on_device(model_path, device)?;

        // Warm up on an empty image and check the output is [1, classes]
        let dummy = Tensor::f_zeros(
            [1, grid_size as i64, grid_size as i64, channels as i64],
            (Kind::Float, device),
        )?;
        let out = model.forward_ts(&[dummy])?;
        let n_classes = out.size().last().copied().unwrap_or(0);
        if n_classes == 0 {
            return Err(Error::Transport(format!(
                "unexpected model output size: {:?}",
                out.size()
            )));
        }
        tracing::info!(path = %model_path.display(), n_classes, "loaded TorchScript model");

        Ok(Self {
            model: Arc::new(model),
            device,
            n_classes,
        })
    }

    /// Blocking forward pass.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let input = input.f_to_device(self.device)?;
        Ok(self.model.forward_ts(&[input])?)
    }
}

impl InferenceClient for LocalClient {
    fn name(&self) -> &str {
        "local"
    }

    fn submit(&self, input: Tensor) -> BoxFuture<'_, Result<Tensor>> {
        let model = Arc::clone(&self.model);
        let device = self.device;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || -> Result<Tensor> {
                let input = input.f_to_device(device)?;
                Ok(model.forward_ts(&[input])?)
            })
            .await
            .map_err(|e| Error::Transport(format!("forward task failed: {e}")))?
        })
    }
}
