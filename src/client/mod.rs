//! Inference transports. The executor only sees [`InferenceClient`]; which
//! variant backs it is decided once at startup from configuration.

use std::time::Duration;

use futures::future::BoxFuture;
use tch::Tensor;

use crate::{config::ClientKind, error::Result};

mod local;
mod remote;

pub use local::LocalClient;
pub use remote::{InferRequest, InferResponse, RemoteClient, INFER_ROUTE};

pub trait InferenceClient: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the classifier on a `[1, N, N, C]` request; resolves to its raw output.
    fn submit(&self, input: Tensor) -> BoxFuture<'_, Result<Tensor>>;
}

pub fn from_config(
    kind: &ClientKind,
    grid_size: usize,
    channels: usize,
    timeout: Duration,
) -> Result<Box<dyn InferenceClient>> {
    let client: Box<dyn InferenceClient> = match kind {
        ClientKind::Local { model_path } => {
            Box::new(LocalClient::load(model_path, grid_size, channels)?)
        }
        ClientKind::Remote { address, port } => {
            Box::new(RemoteClient::new(address, *port, timeout)?)
        }
    };
    tracing::info!(client = client.name(), "inference client ready");
    Ok(client)
}
