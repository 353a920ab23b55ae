use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};
use thiserror::Error;

pub const DEFAULT_GRID_SIZE: usize = 224;
pub const CHANNELS: usize = 3;
pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_COLLECTION: &str = "slimmedJetsAK8";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required parameter `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Which inference transport the runner talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKind {
    Local { model_path: PathBuf },
    Remote { address: String, port: u16 },
}

/// `events_path` may name one file or a list of files, read in order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EventPaths {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl EventPaths {
    fn into_vec(self) -> Vec<PathBuf> {
        match self {
            EventPaths::One(p) => vec![p],
            EventPaths::Many(ps) => ps,
        }
    }
}

/// Unvalidated parameters, as found in the JSON file and the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub grid_size: Option<usize>,
    pub channels: Option<usize>,
    pub top_n: Option<usize>,
    pub label_list_path: Option<PathBuf>,
    pub output_log_path: Option<PathBuf>,
    pub input_collection_id: Option<String>,
    pub events_path: Option<EventPaths>,
    /// Negative means no limit.
    pub max_events: Option<i64>,
    pub client: Option<String>,
    pub model_path: Option<PathBuf>,
    pub address: Option<String>,
    pub port: Option<i64>,
    pub inference_timeout_secs: Option<u64>,
    pub streams: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub grid_size: usize,
    pub channels: usize,
    pub top_n: usize,
    pub label_list_path: PathBuf,
    pub output_log_path: PathBuf,
    pub input_collection_id: String,
    pub events_paths: Vec<PathBuf>,
    pub max_events: Option<usize>,
    pub client: ClientKind,
    pub inference_timeout: Duration,
    pub streams: usize,
}

impl RawConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.into(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.into(),
            source,
        })
    }

    /// Overlay every `JET_IMAGE_*` variable that is set.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = var("JET_IMAGE_GRID_SIZE") {
            self.grid_size = Some(parse_num("grid_size", &v)?);
        }
        if let Some(v) = var("JET_IMAGE_TOP_N") {
            self.top_n = Some(parse_num("top_n", &v)?);
        }
        if let Some(v) = var("JET_IMAGE_LABELS") {
            self.label_list_path = Some(v.into());
        }
        if let Some(v) = var("JET_IMAGE_OUTPUT") {
            self.output_log_path = Some(v.into());
        }
        if let Some(v) = var("JET_IMAGE_COLLECTION") {
            self.input_collection_id = Some(v);
        }
        if let Some(v) = var("JET_IMAGE_EVENTS") {
            let paths = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
            self.events_path = Some(EventPaths::Many(paths));
        }
        if let Some(v) = var("JET_IMAGE_MAX_EVENTS") {
            self.max_events = Some(parse_num("max_events", &v)?);
        }
        if let Some(v) = var("JET_IMAGE_CLIENT") {
            self.client = Some(v);
        }
        if let Some(v) = var("JET_IMAGE_MODEL") {
            self.model_path = Some(v.into());
        }
        if let Some(v) = var("JET_IMAGE_ADDRESS") {
            self.address = Some(v);
        }
        if let Some(v) = var("JET_IMAGE_PORT") {
            self.port = Some(parse_num("port", &v)?);
        }
        if let Some(v) = var("JET_IMAGE_TIMEOUT_SECS") {
            self.inference_timeout_secs = Some(parse_num("inference_timeout_secs", &v)?);
        }
        if let Some(v) = var("JET_IMAGE_STREAMS") {
            self.streams = Some(parse_num("streams", &v)?);
        }
        Ok(())
    }

    pub fn validate(self) -> Result<Config, ConfigError> {
        let grid_size = positive("grid_size", self.grid_size.unwrap_or(DEFAULT_GRID_SIZE))?;
        let channels = self.channels.unwrap_or(CHANNELS);
        if channels != CHANNELS {
            return Err(ConfigError::Invalid {
                field: "channels",
                reason: format!("must be {CHANNELS}, got {channels}"),
            });
        }
        let top_n = positive("top_n", self.top_n.unwrap_or(DEFAULT_TOP_N))?;
        let timeout_secs = self.inference_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "inference_timeout_secs",
                reason: "must be positive".into(),
            });
        }
        let streams = positive("streams", self.streams.unwrap_or(1))?;

        let events_paths: Vec<PathBuf> = self
            .events_path
            .map(EventPaths::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        if events_paths.is_empty() {
            return Err(ConfigError::Missing("events_path"));
        }
        let max_events = self.max_events.and_then(|n| usize::try_from(n).ok());

        let client = match self.client.as_deref().unwrap_or("remote") {
            "local" => ClientKind::Local {
                model_path: self.model_path.ok_or(ConfigError::Missing("model_path"))?,
            },
            "remote" => {
                let address = self
                    .address
                    .filter(|a| !a.trim().is_empty())
                    .ok_or(ConfigError::Missing("address"))?;
                if address_has_port(&address) {
                    return Err(ConfigError::Invalid {
                        field: "address",
                        reason: format!("`{address}` carries a port; set `port` instead"),
                    });
                }
                let port = self.port.ok_or(ConfigError::Missing("port"))?;
                let port = u16::try_from(port)
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| ConfigError::Invalid {
                        field: "port",
                        reason: format!("{port} is not a usable port"),
                    })?;
                ClientKind::Remote { address, port }
            }
            other => {
                return Err(ConfigError::Invalid {
                    field: "client",
                    reason: format!("expected `local` or `remote`, got `{other}`"),
                })
            }
        };

        Ok(Config {
            grid_size,
            channels,
            top_n,
            label_list_path: self
                .label_list_path
                .ok_or(ConfigError::Missing("label_list_path"))?,
            output_log_path: self
                .output_log_path
                .ok_or(ConfigError::Missing("output_log_path"))?,
            input_collection_id: self
                .input_collection_id
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            events_paths,
            max_events,
            client,
            inference_timeout: Duration::from_secs(timeout_secs),
            streams,
        })
    }
}

impl Config {
    /// File named by `JET_IMAGE_CONFIG` (if any), then env overrides, then validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = match std::env::var("JET_IMAGE_CONFIG") {
            Ok(path) => RawConfig::load(&path)?,
            Err(_) => RawConfig::default(),
        };
        raw.apply_env()?.validate()
    }
}

fn parse_num<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field,
        reason: format!("`{value}`: {e}"),
    })
}

/// True when `address` (optionally with a scheme) already names a port.
pub fn address_has_port(address: &str) -> bool {
    let rest = address
        .split_once("://")
        .map_or(address, |(_, rest)| rest);
    let host = rest.split('/').next().unwrap_or(rest);
    match host.rfind(']') {
        // bracketed IPv6, port only after the bracket
        Some(end) => host[end + 1..].starts_with(':'),
        None => host.contains(':'),
    }
}

fn positive(field: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be positive".into(),
        });
    }
    Ok(value)
}
