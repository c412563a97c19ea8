//! Blocking HTTP access. Ground truth: the teacher's own
//! `src/sources/youtube/hls/resolver.rs::fetch_text` and
//! `fetcher.rs::fetch_segment_into` — same `reqwest::blocking::Client`,
//! same status-check-then-read shape, generalized behind a trait so the
//! pipeline can be exercised against a fake transport in tests.

use crate::error::{HlsError, Result};
use std::io::Read;

pub trait PlaylistFetcher: Send + Sync {
    fn fetch_text(&self, url: &str) -> Result<String>;
    fn fetch_bytes(&self, url: &str, range_header: Option<&str>) -> Result<Vec<u8>>;
}

pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl PlaylistFetcher for ReqwestFetcher {
    #[tracing::instrument(skip(self), fields(url = %url))]
    fn fetch_text(&self, url: &str) -> Result<String> {
        let mut res = self
            .client
            .get(url)
            .header("Accept", "application/x-mpegURL, */*")
            .send()
            .map_err(|e| HlsError::TransportError {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !res.status().is_success() {
            tracing::warn!(status = %res.status(), "playlist fetch returned non-success status");
            return Err(HlsError::TransportError {
                url: url.to_string(),
                message: format!("HTTP {}", res.status()),
            });
        }

        let mut text = String::new();
        res.read_to_string(&mut text)
            .map_err(|e| HlsError::TransportError {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(bytes = text.len(), "fetched playlist text");
        Ok(text)
    }

    #[tracing::instrument(skip(self), fields(url = %url, range = tracing::field::debug(range_header)))]
    fn fetch_bytes(&self, url: &str, range_header: Option<&str>) -> Result<Vec<u8>> {
        let mut req = self.client.get(url).header("Accept", "*/*");
        if let Some(range) = range_header {
            req = req.header("Range", range.to_string());
        }

        let mut res = req.send().map_err(|e| HlsError::TransportError {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !res.status().is_success() {
            tracing::warn!(status = %res.status(), "segment fetch returned non-success status");
            return Err(HlsError::TransportError {
                url: url.to_string(),
                message: format!("HTTP {}", res.status()),
            });
        }

        let mut buf = Vec::new();
        res.copy_to(&mut buf).map_err(|e| HlsError::TransportError {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(buf)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory fetcher for pipeline tests: URL -> bytes.
    #[derive(Default)]
    pub struct FakeFetcher {
        pub texts: Mutex<HashMap<String, String>>,
        pub blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl PlaylistFetcher for FakeFetcher {
        fn fetch_text(&self, url: &str) -> Result<String> {
            self.texts
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| HlsError::TransportError {
                    url: url.to_string(),
                    message: "not found in fake fetcher".into(),
                })
        }

        fn fetch_bytes(&self, url: &str, _range_header: Option<&str>) -> Result<Vec<u8>> {
            self.blobs
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| HlsError::TransportError {
                    url: url.to_string(),
                    message: "not found in fake fetcher".into(),
                })
        }
    }
}
