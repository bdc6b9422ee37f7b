//! HTTP listener settings
//!
//! The `http` section of the gateway configuration: where to listen, which
//! browser origins may call the gateway and how large a request body may
//! get.

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// JSON envelope allowance on top of the encoded write payload
const BODY_ENVELOPE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Largest accepted request body. Unset, it is sized to fit a
    /// base64-encoded write of the maximum write size.
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8085
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_body_bytes: None,
        }
    }
}

impl HttpServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// `host:port`, as handed to the listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Body limit for a gateway whose writes may carry up to
    /// `max_write_size_in_bytes` of data
    pub fn body_limit(&self, max_write_size_in_bytes: u64) -> usize {
        self.max_body_bytes.unwrap_or_else(|| {
            let max_write = usize::try_from(max_write_size_in_bytes).unwrap_or(usize::MAX);
            max_write
                .saturating_add(2)
                .saturating_div(3)
                .saturating_mul(4)
                .saturating_add(BODY_ENVELOPE_BYTES)
        })
    }

    fn origin(origin: &str) -> Option<HeaderValue> {
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return None;
        }
        HeaderValue::from_str(origin.trim_end_matches('/')).ok()
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let allow_origin = if self.cors_origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(self.cors_origins.iter().filter_map(|o| Self::origin(o)))
        };
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(Any)
            .allow_headers(Any)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("http.host must not be empty".into());
        }
        if let Some(origin) = self.cors_origins.iter().find(|o| Self::origin(o).is_none()) {
            return Err(format!(
                "http.cors_origins entry '{}' is not an http(s) origin",
                origin
            ));
        }
        if self.max_body_bytes == Some(0) {
            return Err("http.max_body_bytes must be > 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let config: HttpServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.address(), "0.0.0.0:9000");
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.max_body_bytes, None);
    }

    #[test]
    fn test_body_limit_fits_encoded_write() {
        let config = HttpServerConfig::default();
        let limit = config.body_limit(3 * 1024 * 1024);
        assert_eq!(limit, 4 * 1024 * 1024 + BODY_ENVELOPE_BYTES);

        let explicit = HttpServerConfig {
            max_body_bytes: Some(1024),
            ..Default::default()
        };
        assert_eq!(explicit.body_limit(u64::MAX), 1024);
    }

    #[test]
    fn test_validate_origins() {
        let mut config = HttpServerConfig::with_port(8080);
        config.cors_origins = vec!["https://files.example.com/".into()];
        assert!(config.validate().is_ok());

        config.cors_origins.push("files.example.com".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_body_limit_rejected() {
        let config = HttpServerConfig {
            max_body_bytes: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
