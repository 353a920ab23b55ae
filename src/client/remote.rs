use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tch::Tensor;

use super::InferenceClient;
use crate::{
    config::{address_has_port, ConfigError},
    error::{Error, Result},
};

pub const INFER_ROUTE: &str = "/v1/infer";

/// Body of a remote inference call: the request tensor, flattened.
#[derive(Debug, Serialize, Deserialize)]
pub struct InferRequest {
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InferResponse {
    pub scores: Vec<f32>,
}

impl InferRequest {
    pub fn from_tensor(t: &Tensor) -> Result<Self> {
        let data = Vec::<f32>::try_from(&t.f_flatten(0, -1)?)?;
        Ok(Self {
            shape: t.size(),
            data,
        })
    }

    pub fn into_tensor(self) -> Result<Tensor> {
        let expected: i64 = self.shape.iter().product();
        if expected != self.data.len() as i64 {
            return Err(Error::Transport(format!(
                "shape {:?} does not match {} values",
                self.shape,
                self.data.len()
            )));
        }
        Ok(Tensor::f_from_slice(&self.data)?.f_reshape(self.shape.as_slice())?)
    }
}

/// Ships requests to an `inference_server` over HTTP.
pub struct RemoteClient {
    client: Client,
    endpoint: String,
}

impl RemoteClient {
    pub fn new(address: &str, port: u16, timeout: Duration) -> Result<Self> {
        if address_has_port(address) {
            return Err(ConfigError::Invalid {
                field: "address",
                reason: format!("`{address}` carries a port; set `port` instead"),
            }
            .into());
        }
        let client = Client::builder().timeout(timeout).build()?;
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{address}")
        };
        Ok(Self {
            client,
            endpoint: format!("{base}:{port}{INFER_ROUTE}"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl InferenceClient for RemoteClient {
    fn name(&self) -> &str {
        "remote"
    }

    fn submit(&self, input: Tensor) -> BoxFuture<'_, Result<Tensor>> {
        Box::pin(async move {
            let body = InferRequest::from_tensor(&input)?;
            drop(input);
            let resp = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            let out: InferResponse = resp.json().await?;
            Ok(Tensor::f_from_slice(&out.scores)?)
        })
    }
}
