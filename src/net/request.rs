//! Outgoing request description.
//!
//! An [`ApiRequest`] is plain data so the pipeline can replay it after a
//! token refresh without re-running the caller.

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::auth::Token;
use crate::error::{Error, Result};

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Bytes(Bytes),
}

/// How the caller intends to consume the response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    Json,
    Text,
    /// Binary download (reports, exports).
    Blob,
}

impl ResponseType {
    pub fn accept(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain, */*",
            Self::Blob => "*/*",
        }
    }
}

/// A request flowing through the [`HttpClient`](super::HttpClient) pipeline.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Relative to the backend base URL; absolute URLs are used as-is.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub response_type: ResponseType,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            response_type: ResponseType::default(),
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json<T: serde::Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Whether this request already had its one authorization retry.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Set `Authorization: Bearer <token>`.
    pub fn set_bearer(&mut self, token: &Token) -> Result<()> {
        let mut value = HeaderValue::from_str(&token.bearer_header())
            .map_err(|_| Error::InvalidRequest("token is not a valid header value".into()))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Bearer token currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }

    /// Headers to send, with `Accept` defaulted from the response type.
    pub fn effective_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(self.response_type.accept()));
        }
        headers
    }
}
