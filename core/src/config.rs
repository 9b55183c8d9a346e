//! Client configuration.
//!
//! `ClientConfig` deserializes from any serde format with sensible defaults,
//! or is read from `PROFILES_*` environment variables. Builders only see the
//! derived `RequestOptions`, which every clone shares.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::http::HttpMethod;

pub const ENV_BASE_URL: &str = "PROFILES_BASE_URL";
pub const ENV_ODATA: &str = "PROFILES_ODATA";
pub const ENV_TIMEOUT_SECS: &str = "PROFILES_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How much OData metadata the service should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ODataMode {
    #[default]
    Verbose,
    Minimal,
    NoMetadata,
}

impl ODataMode {
    pub fn accept(&self) -> &'static str {
        match self {
            ODataMode::Verbose => "application/json;odata=verbose",
            ODataMode::Minimal => "application/json;odata=minimalmetadata",
            ODataMode::NoMetadata => "application/json;odata=nometadata",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ODataMode::Verbose => "application/json;odata=verbose;charset=utf-8",
            ODataMode::Minimal | ODataMode::NoMetadata => "application/json;charset=utf-8",
        }
    }
}

impl std::str::FromStr for ODataMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verbose" => Ok(ODataMode::Verbose),
            "minimal" | "minimalmetadata" => Ok(ODataMode::Minimal),
            "nometadata" => Ok(ODataMode::NoMetadata),
            other => Err(ApiError::Config(format!("unknown odata mode `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Absolute URL of the site the API calls are rooted at.
    pub base_url: String,
    #[serde(default)]
    pub odata: ODataMode,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            odata: ODataMode::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            headers: Vec::new(),
        }
    }

    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let base_url = lookup(ENV_BASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ApiError::Config(format!("{ENV_BASE_URL} is not set")))?;
        let mut config = Self::new(base_url.trim());
        if let Some(mode) = lookup(ENV_ODATA) {
            config.odata = mode.parse()?;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout_secs = secs
                .trim()
                .parse()
                .map_err(|e| ApiError::Config(format!("{ENV_TIMEOUT_SECS}: {e}")))?;
        }
        tracing::debug!(
            base_url = %config.base_url,
            odata = ?config.odata,
            timeout_secs = config.timeout_secs,
            "loaded client config"
        );
        Ok(config)
    }

    pub fn request_options(&self) -> Arc<RequestOptions> {
        Arc::new(RequestOptions {
            odata: self.odata,
            headers: self.headers.clone(),
        })
    }
}

/// Per-request settings shared by a builder and all of its clones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub odata: ODataMode,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    /// Headers for a request issued with `method`.
    pub fn headers_for(&self, method: HttpMethod, has_body: bool) -> Vec<(String, String)> {
        let mut headers = vec![("accept".to_string(), self.odata.accept().to_string())];
        if method == HttpMethod::Post && has_body {
            headers.push(("content-type".to_string(), self.odata.content_type().to_string()));
        }
        headers.extend(self.headers.iter().cloned());
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_requires_base_url() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn from_lookup_reads_all_keys() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://contoso.sharepoint.com/sites/dev/"),
            (ENV_ODATA, "nometadata"),
            (ENV_TIMEOUT_SECS, "5"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://contoso.sharepoint.com/sites/dev");
        assert_eq!(config.odata, ODataMode::NoMetadata);
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn from_lookup_rejects_bad_timeout() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://contoso"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"https://contoso"}"#).unwrap();
        assert_eq!(config.odata, ODataMode::Verbose);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn post_with_body_gets_content_type() {
        let options = RequestOptions::default();
        let headers = options.headers_for(HttpMethod::Post, true);
        assert!(headers.contains(&(
            "content-type".to_string(),
            "application/json;odata=verbose;charset=utf-8".to_string()
        )));
        let headers = options.headers_for(HttpMethod::Get, false);
        assert_eq!(headers.len(), 1);
    }
}
