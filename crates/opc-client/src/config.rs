//! Endpoint and reconnect settings.
//!
//! Each value is resolved from an explicit override (CLI flag) first, then the
//! `OPC_*` environment variables, then a default that depends on `OPC_ENV`.

use crate::error::{ClientError, Result};
use crate::push::{PushConfig, DEFAULT_RECONNECT_DELAY};
use opc_core::parse_bool_flag;
use std::fmt;
use std::time::Duration;
use tracing::error;
use url::Url;

pub const DEV_API_URL: &str = "http://127.0.0.1:8787/api";
pub const DEV_WS_URL: &str = "ws://127.0.0.1:8787/ws";
pub const RELATIVE_API_PATH: &str = "/api";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" | "release" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Base URL for snapshot requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiBase {
    Absolute(Url),
    /// A path with no origin to resolve it against; requests fail until configured.
    Relative(String),
}

impl ApiBase {
    pub fn url(&self) -> Result<&Url> {
        match self {
            ApiBase::Absolute(url) => Ok(url),
            ApiBase::Relative(path) => Err(ClientError::Config(format!(
                "api base '{path}' is relative; set OPC_API_URL"
            ))),
        }
    }
}

impl fmt::Display for ApiBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiBase::Absolute(url) => write!(f, "{url}"),
            ApiBase::Relative(path) => f.write_str(path),
        }
    }
}

/// Values supplied on the command line; `None` falls through to the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub environment: Option<String>,
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub reconnect: Option<bool>,
    pub reconnect_delay_ms: Option<u64>,
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment: Environment,
    pub api_base: ApiBase,
    pub push_url: Option<Url>,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
    pub http_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env(overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(overrides: &ConfigOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |flag: &Option<String>, key: &str| -> Option<String> {
            flag.clone()
                .or_else(|| lookup(key))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let environment = pick(&overrides.environment, "OPC_ENV")
            .map(|value| Environment::parse(&value))
            .unwrap_or_default();
        let explicit_api = pick(&overrides.api_url, "OPC_API_URL")
            .map(|value| Url::parse(&value))
            .transpose()?;
        let explicit_ws = pick(&overrides.ws_url, "OPC_WS_URL")
            .map(|value| Url::parse(&value))
            .transpose()?;

        let (api_base, push_url) = match (explicit_api, explicit_ws) {
            (Some(api), Some(ws)) => (ApiBase::Absolute(api), Some(ws)),
            (Some(api), None) => {
                let ws = push_url_from_api(&api);
                (ApiBase::Absolute(api), ws)
            }
            (None, ws) => match environment {
                Environment::Development => {
                    let api = Url::parse(DEV_API_URL)?;
                    let ws = match ws {
                        Some(ws) => ws,
                        None => Url::parse(DEV_WS_URL)?,
                    };
                    (ApiBase::Absolute(api), Some(ws))
                }
                Environment::Production => {
                    error!(
                        event = "api_url_missing",
                        fallback = RELATIVE_API_PATH,
                        "OPC_API_URL is not set; falling back to a relative api path"
                    );
                    let api = match ws.as_ref().and_then(|ws| origin_http_url(ws, RELATIVE_API_PATH)) {
                        Some(url) => ApiBase::Absolute(url),
                        None => ApiBase::Relative(RELATIVE_API_PATH.to_string()),
                    };
                    (api, ws)
                }
            },
        };

        let reconnect = overrides
            .reconnect
            .or_else(|| lookup("OPC_RECONNECT").and_then(|value| parse_bool_flag(&value)))
            .unwrap_or(true);
        let reconnect_delay = overrides
            .reconnect_delay_ms
            .or_else(|| lookup("OPC_RECONNECT_DELAY_MS").and_then(|value| value.trim().parse().ok()))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RECONNECT_DELAY);
        let http_timeout = overrides
            .http_timeout_secs
            .or_else(|| lookup("OPC_HTTP_TIMEOUT_SECS").and_then(|value| value.trim().parse().ok()))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);

        Ok(Self {
            environment,
            api_base,
            push_url,
            reconnect,
            reconnect_delay,
            http_timeout,
        })
    }

    pub fn push_config(&self) -> Option<PushConfig> {
        self.push_url.as_ref().map(|url| PushConfig {
            url: url.clone(),
            reconnect: self.reconnect,
            reconnect_delay: self.reconnect_delay,
        })
    }
}

/// `http://host/api` becomes `ws://host/ws`; `https` maps to `wss`.
pub fn push_url_from_api(api: &Url) -> Option<Url> {
    let scheme = match api.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return None,
    };
    let mut url = api.clone();
    url.set_scheme(scheme).ok()?;
    url.set_path("/ws");
    url.set_query(None);
    Some(url)
}

fn origin_http_url(push: &Url, path: &str) -> Option<Url> {
    let scheme = match push.scheme() {
        "ws" => "http",
        "wss" => "https",
        _ => return None,
    };
    let mut url = push.clone();
    url.set_scheme(scheme).ok()?;
    url.set_path(path);
    url.set_query(None);
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn development_defaults_point_at_local_hub() {
        let config = ClientConfig::resolve(&ConfigOverrides::default(), lookup(&[])).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.api_base.to_string(), DEV_API_URL);
        assert_eq!(config.push_url.unwrap().as_str(), DEV_WS_URL);
        assert!(config.reconnect);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn production_without_api_url_degrades_to_relative_path() {
        let config =
            ClientConfig::resolve(&ConfigOverrides::default(), lookup(&[("OPC_ENV", "production")]))
                .unwrap();
        assert_eq!(config.api_base, ApiBase::Relative("/api".to_string()));
        assert!(config.api_base.url().is_err());
        assert!(config.push_config().is_none());
    }

    #[test]
    fn production_relative_api_resolves_against_push_origin() {
        let config = ClientConfig::resolve(
            &ConfigOverrides::default(),
            lookup(&[("OPC_ENV", "prod"), ("OPC_WS_URL", "wss://ops.example.test/live")]),
        )
        .unwrap();
        assert_eq!(
            config.api_base.url().unwrap().as_str(),
            "https://ops.example.test/api"
        );
    }

    #[test]
    fn flags_override_environment_and_ws_is_derived_from_api() {
        let overrides = ConfigOverrides {
            api_url: Some("https://console.example.test/api".to_string()),
            reconnect_delay_ms: Some(250),
            ..ConfigOverrides::default()
        };
        let config = ClientConfig::resolve(
            &overrides,
            lookup(&[
                ("OPC_API_URL", "http://ignored.test/api"),
                ("OPC_RECONNECT", "off"),
            ]),
        )
        .unwrap();
        assert_eq!(config.api_base.to_string(), "https://console.example.test/api");
        assert_eq!(
            config.push_url.as_ref().unwrap().as_str(),
            "wss://console.example.test/ws"
        );
        let push = config.push_config().unwrap();
        assert!(!push.reconnect);
        assert_eq!(push.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn invalid_explicit_url_is_an_error() {
        let err = ClientConfig::resolve(
            &ConfigOverrides::default(),
            lookup(&[("OPC_API_URL", "not a url")]),
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Url(_)));
    }
}
