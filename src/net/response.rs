//! Buffered backend response.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Fallback name for downloads without a usable `Content-Disposition`.
pub const DEFAULT_DOWNLOAD_FILENAME: &str = "raport.pdf";

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as text, lossy on invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Download filename from `Content-Disposition`, or [`DEFAULT_DOWNLOAD_FILENAME`].
    pub fn filename(&self) -> String {
        self.headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_FILENAME.to_string())
    }
}

fn filename_from_disposition(disposition: &str) -> Option<String> {
    let (_, rest) = disposition.split_once("filename=")?;
    let raw = rest.split(';').next().unwrap_or_default().trim();

    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            raw.strip_prefix(*q)
                .and_then(|s| s.strip_suffix(*q))
        })
        .unwrap_or(raw);

    (!unquoted.is_empty()).then(|| unquoted.to_string())
}
