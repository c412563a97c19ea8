//! Download configuration. Mirrors the teacher's `Config`/`*Config` split
//! (`src/config.rs`, `src/configs/sources.rs`) but as a library-level struct
//! the caller constructs directly — this crate has no CLI or file-loading
//! surface of its own (`spec.md` §1 Non-goals).

use crate::error::{HlsError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Per-track/session download settings. `license_only` and `max_workers`
/// correspond to `spec.md` §5/§9; `headers`/`cookies`/`proxy` are localized
/// once before Phase 1 and never mutated mid-track.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    pub max_workers: usize,
    pub proxy: Option<ProxyConfig>,
    pub headers: HashMap<String, String>,
    pub cookies: Option<String>,
    pub license_only: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_workers: 16,
            proxy: None,
            headers: HashMap::new(),
            cookies: None,
            license_only: false,
        }
    }
}

impl DownloadConfig {
    /// Build a `reqwest` client with `proxy`/`headers`/`cookies` localized
    /// once, up front — per `spec.md` §9 supplement #2, these are never
    /// mutated mid-track, so construction happens before Phase 1 rather than
    /// per-request.
    pub fn build_client(&self) -> Result<reqwest::blocking::Client> {
        let mut builder = reqwest::blocking::Client::builder();

        if let Some(proxy_cfg) = &self.proxy {
            let mut proxy = reqwest::Proxy::all(&proxy_cfg.url).map_err(|e| {
                HlsError::ManifestInvalid(format!("invalid proxy url {:?}: {e}", proxy_cfg.url))
            })?;
            if let (Some(user), Some(pass)) = (&proxy_cfg.username, &proxy_cfg.password) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HlsError::ManifestInvalid(format!("invalid header name {name:?}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| HlsError::ManifestInvalid(format!("invalid header value for {name:?}: {e}")))?;
            headers.insert(header_name, header_value);
        }
        if let Some(cookies) = &self.cookies {
            let value = HeaderValue::from_str(cookies)
                .map_err(|e| HlsError::ManifestInvalid(format!("invalid cookie header: {e}")))?;
            headers.insert(COOKIE, value);
        }
        builder = builder.default_headers(headers);

        builder
            .build()
            .map_err(|e| HlsError::ManifestInvalid(format!("failed to build http client: {e}")))
    }
}
